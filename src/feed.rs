// The detector appends one JSON object per frame:
// {"hands":[[{"x":..,"y":..,"z":..}, ...21 points...]]}

use log::{debug, info, warn};
use serde::Deserialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader, ErrorKind, Seek, SeekFrom};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use crate::landmarks::{DetectorError, Landmark, LandmarkSet, LandmarkSource};
use crate::session::{Frame, FramePoll, MediaStream, StreamFailure};

pub const LAYOUT_MEDIAPIPE_HANDS: &str = "mediapipe-hands-21";

/// Longest unterminated line kept while waiting for its newline.
pub const MAX_PARTIAL_LINE: usize = 64 * 1024;

pub struct FeedStream {
    path: PathBuf,
    follow: bool,
    reader: Option<BufReader<File>>,
    partial: Vec<u8>,
    seq: u64,
}

impl FeedStream {
    /// Live mode: skip what is already in the file and hand out only the newest frame.
    pub fn follow(path: impl Into<PathBuf>) -> Self {
        Self::new(path.into(), true)
    }

    pub fn replay(path: impl Into<PathBuf>) -> Self {
        Self::new(path.into(), false)
    }

    fn new(path: PathBuf, follow: bool) -> Self {
        Self {
            path,
            follow,
            reader: None,
            partial: Vec::new(),
            seq: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn frame(&mut self, payload: String) -> FramePoll {
        self.seq += 1;
        FramePoll::Ready(Frame {
            seq: self.seq,
            payload,
        })
    }

    // Non-UTF-8 bytes still make a frame; the decoder then reports no hand.
    fn decode_line(&self, bytes: Vec<u8>) -> String {
        match String::from_utf8(bytes) {
            Ok(line) => line.trim().to_string(),
            Err(e) => {
                warn!("feed {}: frame is not valid UTF-8", self.path.display());
                String::from_utf8_lossy(e.as_bytes()).trim().to_string()
            }
        }
    }

    // `Ok(None)` is EOF; an unterminated tail stays in `self.partial`.
    fn read_line(&mut self) -> io::Result<Option<String>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        let n = reader.read_until(b'\n', &mut self.partial)?;
        if n == 0 {
            return Ok(None);
        }
        if self.partial.last() != Some(&b'\n') {
            if self.partial.len() > MAX_PARTIAL_LINE {
                warn!(
                    "feed {}: dropping {} bytes without a newline",
                    self.path.display(),
                    self.partial.len()
                );
                self.partial.clear();
            }
            return Ok(None);
        }
        let line = std::mem::take(&mut self.partial);
        Ok(Some(self.decode_line(line)))
    }

    // A restarted detector may truncate the feed or replace the file.
    fn follow_rotation(&mut self) -> io::Result<()> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(());
        };
        let open = reader.get_ref().metadata()?;
        let replaced = match std::fs::metadata(&self.path) {
            Ok(on_disk) => on_disk.ino() != open.ino() || on_disk.dev() != open.dev(),
            Err(_) => false,
        };
        if replaced {
            if let Ok(file) = File::open(&self.path) {
                info!("feed {}: file replaced, reading it from the start", self.path.display());
                *reader = BufReader::new(file);
                self.partial.clear();
            }
            return Ok(());
        }
        if open.len() < reader.stream_position()? {
            info!("feed {}: file truncated, reading it from the start", self.path.display());
            reader.seek(SeekFrom::Start(0))?;
            self.partial.clear();
        }
        Ok(())
    }

    fn poll_follow(&mut self) -> FramePoll {
        if let Err(e) = self.follow_rotation() {
            warn!("feed {}: {e}", self.path.display());
            return FramePoll::Ended;
        }
        let mut latest = None;
        loop {
            match self.read_line() {
                Ok(Some(line)) if !line.is_empty() => latest = Some(line),
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(e) => {
                    warn!("feed {}: read failed: {e}", self.path.display());
                    return FramePoll::Ended;
                }
            }
        }
        match latest {
            Some(line) => self.frame(line),
            None => FramePoll::Pending,
        }
    }

    fn poll_replay(&mut self) -> FramePoll {
        loop {
            match self.read_line() {
                Ok(Some(line)) if line.is_empty() => continue,
                Ok(Some(line)) => return self.frame(line),
                Ok(None) => {
                    // an unterminated last line still counts as a frame
                    let rest = std::mem::take(&mut self.partial);
                    let rest = self.decode_line(rest);
                    if rest.is_empty() {
                        return FramePoll::Ended;
                    }
                    return self.frame(rest);
                }
                Err(e) => {
                    warn!("feed {}: read failed: {e}", self.path.display());
                    return FramePoll::Ended;
                }
            }
        }
    }
}

fn open_failure(path: &Path, e: &io::Error) -> StreamFailure {
    let shown = path.display().to_string();
    match e.kind() {
        ErrorKind::NotFound => StreamFailure::NoDevice(shown),
        ErrorKind::PermissionDenied => StreamFailure::PermissionDenied(shown),
        ErrorKind::ResourceBusy | ErrorKind::WouldBlock => StreamFailure::DeviceBusy(shown),
        _ => StreamFailure::Io {
            path: shown,
            reason: e.to_string(),
        },
    }
}

impl MediaStream for FeedStream {
    fn open(&mut self) -> Result<(), StreamFailure> {
        let mut file = File::open(&self.path).map_err(|e| open_failure(&self.path, &e))?;
        if self.follow {
            file.seek(SeekFrom::End(0))
                .map_err(|e| open_failure(&self.path, &e))?;
        }
        debug!(
            "feed: opened {} ({})",
            self.path.display(),
            if self.follow { "follow" } else { "replay" }
        );
        self.reader = Some(BufReader::new(file));
        self.partial.clear();
        self.seq = 0;
        Ok(())
    }

    fn poll_frame(&mut self) -> FramePoll {
        if self.reader.is_none() {
            return FramePoll::Ended;
        }
        if self.follow {
            self.poll_follow()
        } else {
            self.poll_replay()
        }
    }

    fn release(&mut self) {
        if self.reader.take().is_some() {
            debug!("feed: released {}", self.path.display());
        }
        self.partial.clear();
    }
}

#[derive(Deserialize)]
struct FeedFrame {
    #[serde(default)]
    hands: Vec<Vec<Landmark>>,
}

/// Landmark source for frames that already carry detector output as JSON.
pub struct JsonLandmarkDecoder {
    layout: String,
    loaded: bool,
}

impl JsonLandmarkDecoder {
    pub fn new(layout: impl Into<String>) -> Self {
        Self {
            layout: layout.into(),
            loaded: false,
        }
    }
}

impl LandmarkSource for JsonLandmarkDecoder {
    fn load(&mut self) -> Result<(), DetectorError> {
        if self.layout != LAYOUT_MEDIAPIPE_HANDS {
            return Err(DetectorError::UnsupportedLayout(self.layout.clone()));
        }
        self.loaded = true;
        Ok(())
    }

    fn estimate(&mut self, frame: &Frame) -> Option<LandmarkSet> {
        if !self.loaded {
            return None;
        }
        match serde_json::from_str::<FeedFrame>(&frame.payload) {
            // only the first hand drives gestures
            Ok(parsed) => parsed.hands.into_iter().next().map(LandmarkSet::new),
            Err(e) => {
                warn!("feed: frame {} is not valid landmark JSON: {e}", frame.seq);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;

    fn temp_feed(tag: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "handctl-feed-{}-{}.jsonl",
            tag,
            std::process::id()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn payload(poll: FramePoll) -> Option<String> {
        match poll {
            FramePoll::Ready(f) => Some(f.payload),
            _ => None,
        }
    }

    #[test]
    fn test_open_missing_feed_is_no_device() {
        let mut s = FeedStream::follow("/nonexistent/handctl.landmarks");
        assert_eq!(
            s.open(),
            Err(StreamFailure::NoDevice("/nonexistent/handctl.landmarks".to_string()))
        );
        assert_eq!(s.poll_frame(), FramePoll::Ended);
    }

    #[test]
    fn test_replay_yields_every_line_then_ends() {
        let path = temp_feed("replay", "a\n\nb\nc");
        let mut s = FeedStream::replay(&path);
        s.open().unwrap();
        assert_eq!(payload(s.poll_frame()).as_deref(), Some("a"));
        assert_eq!(payload(s.poll_frame()).as_deref(), Some("b"));
        assert_eq!(payload(s.poll_frame()).as_deref(), Some("c"));
        assert_eq!(s.poll_frame(), FramePoll::Ended);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_follow_skips_history_and_returns_newest_frame() {
        let path = temp_feed("follow", "old\n");
        let mut s = FeedStream::follow(&path);
        s.open().unwrap();
        assert_eq!(s.poll_frame(), FramePoll::Pending);

        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        write!(f, "one\ntwo\nthr").unwrap();
        f.flush().unwrap();
        match s.poll_frame() {
            FramePoll::Ready(frame) => {
                assert_eq!(frame.payload, "two");
                assert_eq!(frame.seq, 1);
            }
            other => panic!("expected a frame, got {other:?}"),
        }
        assert_eq!(s.poll_frame(), FramePoll::Pending);

        writeln!(f, "ee").unwrap();
        f.flush().unwrap();
        assert_eq!(payload(s.poll_frame()).as_deref(), Some("three"));

        s.release();
        assert_eq!(s.poll_frame(), FramePoll::Ended);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_replay_keeps_going_past_non_utf8_line() {
        let path = temp_feed(
            "replay-bytes",
            b"{\"hands\":[]}\n\xff\xfe garbage\n{\"hands\":[]}\n{\"hands\":[]}\n",
        );
        let mut s = FeedStream::replay(&path);
        s.open().unwrap();
        let mut d = JsonLandmarkDecoder::new(LAYOUT_MEDIAPIPE_HANDS);
        d.load().unwrap();

        let mut payloads = vec![];
        while let FramePoll::Ready(f) = s.poll_frame() {
            assert_eq!(d.estimate(&f), None);
            payloads.push(f.payload);
        }
        assert_eq!(payloads.len(), 4);
        assert!(payloads[1].ends_with(" garbage"));
        assert_eq!(payloads[3], r#"{"hands":[]}"#);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_follow_survives_non_utf8_line() {
        let path = temp_feed("follow-bytes", "old\n");
        let mut s = FeedStream::follow(&path);
        s.open().unwrap();

        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"\xff\n{\"hands\":[]}\n").unwrap();
        f.flush().unwrap();
        assert_eq!(payload(s.poll_frame()).as_deref(), Some(r#"{"hands":[]}"#));

        f.write_all(b"\xff\n").unwrap();
        f.flush().unwrap();
        assert!(matches!(s.poll_frame(), FramePoll::Ready(_)));
        assert_eq!(s.poll_frame(), FramePoll::Pending);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_follow_restarts_after_truncation() {
        let path = temp_feed("truncate", "old\n");
        let mut s = FeedStream::follow(&path);
        s.open().unwrap();

        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        write!(f, "a\nb\n").unwrap();
        f.flush().unwrap();
        assert_eq!(payload(s.poll_frame()).as_deref(), Some("b"));

        std::fs::write(&path, "c\n").unwrap();
        assert_eq!(payload(s.poll_frame()).as_deref(), Some("c"));
        assert_eq!(s.poll_frame(), FramePoll::Pending);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_follow_picks_up_replaced_file() {
        let path = temp_feed("replace", "old\n");
        let mut s = FeedStream::follow(&path);
        s.open().unwrap();

        let next = path.with_extension("next");
        std::fs::write(&next, "fresh\n").unwrap();
        std::fs::rename(&next, &path).unwrap();
        assert_eq!(payload(s.poll_frame()).as_deref(), Some("fresh"));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_follow_drops_oversized_partial_line() {
        let path = temp_feed("oversized", "");
        let mut s = FeedStream::follow(&path);
        s.open().unwrap();

        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(&vec![b'x'; MAX_PARTIAL_LINE + 10]).unwrap();
        f.flush().unwrap();
        assert_eq!(s.poll_frame(), FramePoll::Pending);
        assert!(s.partial.is_empty());

        f.write_all(b"\n{\"hands\":[]}\n").unwrap();
        f.flush().unwrap();
        assert_eq!(payload(s.poll_frame()).as_deref(), Some(r#"{"hands":[]}"#));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_open_failure_maps_each_io_kind() {
        let path = Path::new("/dev/video0");
        let denied = open_failure(path, &io::Error::from(ErrorKind::PermissionDenied));
        let busy = open_failure(path, &io::Error::from(ErrorKind::ResourceBusy));
        let would_block = open_failure(path, &io::Error::from(ErrorKind::WouldBlock));
        let missing = open_failure(path, &io::Error::from(ErrorKind::NotFound));
        let other = open_failure(path, &io::Error::other("bad descriptor"));

        assert_eq!(denied, StreamFailure::PermissionDenied("/dev/video0".to_string()));
        assert_eq!(busy, StreamFailure::DeviceBusy("/dev/video0".to_string()));
        assert_eq!(would_block, busy);
        assert_eq!(missing, StreamFailure::NoDevice("/dev/video0".to_string()));
        assert!(matches!(&other, StreamFailure::Io { path, .. } if path == "/dev/video0"));

        let messages: Vec<String> = [&denied, &busy, &missing, &other]
            .iter()
            .map(|f| f.to_string())
            .collect();
        assert!(messages[0].contains("denied"));
        assert!(messages[1].contains("busy"));
        assert!(messages[2].contains("no camera"));
        assert!(messages[3].contains("failed to open") && messages[3].contains("bad descriptor"));
        for (i, a) in messages.iter().enumerate() {
            for b in &messages[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    fn hand_json(x0: f32) -> String {
        let pts: Vec<String> = (0..21)
            .map(|i| format!(r#"{{"x":{},"y":{}}}"#, x0 + i as f32, i))
            .collect();
        format!("[{}]", pts.join(","))
    }

    fn frame(payload: String) -> Frame {
        Frame { seq: 1, payload }
    }

    #[test]
    fn test_decoder_rejects_unknown_layout() {
        let mut d = JsonLandmarkDecoder::new("openpose-25");
        assert_eq!(
            d.load(),
            Err(DetectorError::UnsupportedLayout("openpose-25".to_string()))
        );
        let f = frame(format!(r#"{{"hands":[{}]}}"#, hand_json(0.0)));
        assert_eq!(d.estimate(&f), None);
    }

    #[test]
    fn test_decoder_takes_first_hand() {
        let mut d = JsonLandmarkDecoder::new(LAYOUT_MEDIAPIPE_HANDS);
        d.load().unwrap();
        let f = frame(format!(
            r#"{{"hands":[{},{}]}}"#,
            hand_json(100.0),
            hand_json(500.0)
        ));
        let set = d.estimate(&f).unwrap();
        assert_eq!(set.len(), 21);
        assert_eq!(set.get(0).unwrap().x, 100.0);
        assert_eq!(set.get(0).unwrap().z, 0.0);
    }

    #[test]
    fn test_decoder_treats_empty_and_garbage_as_no_hand() {
        let mut d = JsonLandmarkDecoder::new(LAYOUT_MEDIAPIPE_HANDS);
        d.load().unwrap();
        assert_eq!(d.estimate(&frame(r#"{"hands":[]}"#.to_string())), None);
        assert_eq!(d.estimate(&frame("{}".to_string())), None);
        assert_eq!(d.estimate(&frame("not json".to_string())), None);
    }
}
