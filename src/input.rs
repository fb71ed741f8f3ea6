//! Device discovery (evdev 0.13.2 compatible) and the pointer event stream.

use evdev::{Device, EventType, KeyCode, RelativeAxisCode, SynchronizationCode};
use log::{info, warn};

use crate::pointer::{PointerInput, PointerTracker};

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
}

fn event_nodes() -> Vec<std::path::PathBuf> {
    let mut out = vec![];
    if let Ok(rd) = std::fs::read_dir("/dev/input") {
        for e in rd.flatten() {
            let p = e.path();
            if p.file_name()
                .and_then(|s| s.to_str())
                .map(|s| s.starts_with("event"))
                .unwrap_or(false)
            {
                out.push(p);
            }
        }
    }
    out.sort();
    out
}

fn is_pointer(dev: &Device) -> bool {
    let has_rel = dev.supported_events().contains(EventType::RELATIVE);
    let has_xy = dev.supported_relative_axes().map_or(false, |a| {
        a.contains(RelativeAxisCode::REL_X) && a.contains(RelativeAxisCode::REL_Y)
    });
    let has_button = dev
        .supported_keys()
        .map_or(false, |k| k.contains(KeyCode::BTN_LEFT));
    has_rel && has_xy && has_button
}

pub fn discover_pointers() -> Vec<DeviceInfo> {
    let mut out = vec![];
    for p in event_nodes() {
        if let Ok(dev) = Device::open(&p) {
            if is_pointer(&dev) {
                out.push(DeviceInfo {
                    path: p.display().to_string(),
                    name: dev.name().unwrap_or("unknown").to_string(),
                });
            }
        }
    }
    out
}

pub fn discover_video_devices() -> Vec<String> {
    let mut out = vec![];
    if let Ok(rd) = std::fs::read_dir("/dev") {
        for e in rd.flatten() {
            if let Some(name) = e.file_name().to_str() {
                if name.starts_with("video") {
                    out.push(e.path().display().to_string());
                }
            }
        }
    }
    out.sort();
    out
}

/// Open pointer devices polled without blocking once per frame.
pub struct PointerDevices {
    devs: Vec<(Device, PointerTracker)>,
}

impl PointerDevices {
    pub fn none() -> Self {
        Self { devs: vec![] }
    }

    pub fn open_all() -> Self {
        let mut devs = vec![];
        for d in discover_pointers() {
            match Device::open(&d.path) {
                Ok(mut dev) => {
                    if let Err(e) = dev.set_nonblocking(true) {
                        warn!("pointer {}: cannot set non-blocking: {e}", d.path);
                        continue;
                    }
                    info!("pointer: using {} ({})", d.name, d.path);
                    devs.push((dev, PointerTracker::new()));
                }
                Err(e) => warn!("failed to open {}: {e}", d.path),
            }
        }
        if devs.is_empty() {
            info!("pointer: no readable pointer devices; pointer fallback idle");
        }
        Self { devs }
    }

    pub fn len(&self) -> usize {
        self.devs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devs.is_empty()
    }

    pub fn poll(&mut self) -> Vec<PointerInput> {
        let mut out = vec![];
        for (dev, tracker) in self.devs.iter_mut() {
            let Ok(events) = dev.fetch_events() else {
                continue;
            };
            for ev in events {
                if ev.event_type() == EventType::RELATIVE {
                    match ev.code() {
                        c if c == RelativeAxisCode::REL_X.0 => tracker.on_motion(ev.value(), 0),
                        c if c == RelativeAxisCode::REL_Y.0 => tracker.on_motion(0, ev.value()),
                        c if c == RelativeAxisCode::REL_WHEEL.0 => tracker.on_wheel(ev.value()),
                        _ => {}
                    }
                } else if ev.event_type() == EventType::KEY {
                    if ev.code() == KeyCode::BTN_LEFT.0 {
                        tracker.on_button(ev.value() != 0);
                    }
                } else if ev.event_type() == EventType::SYNCHRONIZATION
                    && ev.code() == SynchronizationCode::SYN_REPORT.0
                {
                    out.extend(tracker.on_syn_report());
                }
            }
        }
        out
    }
}
