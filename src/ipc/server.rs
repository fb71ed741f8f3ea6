use anyhow::{Result, anyhow};
use log::{error, info, warn};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use serde_json::json;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::{
    io::{BufRead, BufReader, ErrorKind, Write},
    os::unix::net::{UnixListener, UnixStream},
    sync::mpsc::{Receiver, Sender, channel},
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use super::dispatch::{Request, parse_request};
use super::pipeline::{Pipeline, PipelineMsg, StatusSnapshot};
use super::runtime::socket_path;
use crate::config::DaemonConfigState;

const REPLY_TIMEOUT: Duration = Duration::from_secs(3);

type Reply = Sender<Result<String, String>>;

enum IpcMsg {
    /// `None` when the profile watcher asks; nobody waits for the answer.
    Reload(Option<Reply>),
    UseProfile(String, Reply),
    Shutdown,
}

pub fn run_daemon() -> Result<()> {
    // socket
    let sock = socket_path();
    if sock.exists() {
        let _ = std::fs::remove_file(&sock);
    }
    let listener = UnixListener::bind(&sock)?;
    info!("daemon: listening on {}", sock.display());

    // state
    let mut state = DaemonState::new()?;
    info!("daemon: active profile '{}'", state.cfg.active_name);

    let (tx_req, rx_req) = channel::<IpcMsg>();

    // frame loop
    let mut pipeline = Pipeline::start(state.cfg.profile.clone())?;

    let _watcher = watch_profiles(&state.cfg, tx_req.clone())?;
    watch_signals(tx_req.clone())?;

    // accept loop
    listener.set_nonblocking(true)?;
    loop {
        match listener.accept() {
            Ok((stream, _)) => {
                let ctx = ClientCtx {
                    cfg: state.clone_shallow(),
                    tx: tx_req.clone(),
                    frames: pipeline.sender(),
                    status: pipeline.status_handle(),
                };
                thread::spawn(move || {
                    if let Err(e) = handle_client(stream, ctx) {
                        error!("ipc client error: {e}");
                    }
                });
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => warn!("ipc accept failed: {e}"),
        }

        while let Ok(msg) = rx_req.try_recv() {
            match msg {
                IpcMsg::Reload(reply) => {
                    let r = state.cfg.reload().map_err(|e| e.to_string());
                    match &r {
                        Ok(()) => {
                            pipeline.update_profile(state.cfg.profile.clone());
                            info!("profile reloaded");
                        }
                        Err(e) => error!("reload failed, keeping last good profile: {e}"),
                    }
                    if let Some(reply) = reply {
                        let _ = reply.send(r.map(|_| state.cfg.active_name.clone()));
                    }
                }
                IpcMsg::UseProfile(name, reply) => {
                    let r = state.cfg.set_active(&name).map_err(|e| e.to_string());
                    match &r {
                        Ok(()) => {
                            pipeline.update_profile(state.cfg.profile.clone());
                            info!("switched active profile to {}", state.cfg.active_name);
                        }
                        Err(e) => error!("use profile failed: {e}"),
                    }
                    let _ = reply.send(r.map(|_| state.cfg.active_name.clone()));
                }
                IpcMsg::Shutdown => {
                    info!("daemon: shutting down");
                    pipeline.stop();
                    let _ = std::fs::remove_file(&sock);
                    return Ok(());
                }
            }
        }

        thread::sleep(Duration::from_millis(5));
    }
}

fn watch_profiles(cfg: &DaemonConfigState, tx: Sender<IpcMsg>) -> Result<notify::RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(ev) => {
            let touched_profile = ev
                .paths
                .iter()
                .any(|p| p.extension().is_some_and(|e| e == "toml"));
            if touched_profile && matches!(ev.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                let _ = tx.send(IpcMsg::Reload(None));
            }
        }
        Err(e) => warn!("profile watcher: {e}"),
    })?;
    watcher.watch(&cfg.profiles_dir, RecursiveMode::NonRecursive)?;
    info!("daemon: watching {}", cfg.profiles_dir.display());
    Ok(watcher)
}

fn watch_signals(tx: Sender<IpcMsg>) -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!("daemon: received signal {sig}");
            let _ = tx.send(IpcMsg::Shutdown);
        }
    });
    Ok(())
}

struct ClientCtx {
    cfg: DaemonState,
    tx: Sender<IpcMsg>,
    frames: Sender<PipelineMsg>,
    status: Arc<Mutex<StatusSnapshot>>,
}

fn await_reply<T>(rx: Receiver<T>) -> Result<T> {
    rx.recv_timeout(REPLY_TIMEOUT)
        .map_err(|_| anyhow!("daemon did not answer in time"))
}

fn send_daemon(ctx: &ClientCtx, msg: IpcMsg) -> Result<()> {
    ctx.tx.send(msg).map_err(|_| anyhow!("daemon is shutting down"))
}

fn send_frames(ctx: &ClientCtx, msg: PipelineMsg) -> Result<()> {
    ctx.frames
        .send(msg)
        .map_err(|_| anyhow!("frame loop is not running"))
}

fn ok(data: serde_json::Value) -> serde_json::Value {
    json!({"ok": true, "data": data})
}

fn fail(e: impl std::fmt::Display) -> serde_json::Value {
    json!({"ok": false, "error": e.to_string()})
}

fn handle_client(mut stream: UnixStream, ctx: ClientCtx) -> Result<()> {
    stream.set_nonblocking(false)?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if line.trim().is_empty() {
        return Ok(());
    }

    let req = match parse_request(&line) {
        Ok(req) => req,
        Err(e) => {
            writeln!(stream, "{}", fail(e))?;
            return Ok(());
        }
    };

    if req == Request::Shutdown {
        // answer first; the daemon exits right after
        writeln!(stream, "{}", ok(json!("shutting down")))?;
        let _ = ctx.tx.send(IpcMsg::Shutdown);
        return Ok(());
    }

    let resp = match respond(req, &ctx) {
        Ok(v) => v,
        Err(e) => fail(e),
    };
    writeln!(stream, "{resp}")?;
    Ok(())
}

fn respond(req: Request, ctx: &ClientCtx) -> Result<serde_json::Value> {
    let resp = match req {
        Request::Status => {
            let frames = ctx.status.lock().unwrap_or_else(|e| e.into_inner()).clone();
            ok(json!({
                "active_profile": ctx.cfg.cfg.active_name,
                "socket": socket_path(),
                "pid": std::process::id(),
                "frames": frames,
            }))
        }
        Request::Reload => {
            let (reply, rx) = channel();
            send_daemon(ctx, IpcMsg::Reload(Some(reply)))?;
            match await_reply(rx)? {
                Ok(name) => ok(json!({"active_profile": name})),
                Err(e) => fail(e),
            }
        }
        Request::Use(name) => {
            let (reply, rx) = channel();
            send_daemon(ctx, IpcMsg::UseProfile(name, reply))?;
            match await_reply(rx)? {
                Ok(name) => ok(json!({"active_profile": name})),
                Err(e) => fail(e),
            }
        }
        Request::List => ok(json!({
            "profiles": ctx.cfg.cfg.list_profiles(),
            "active": ctx.cfg.cfg.active_name,
        })),
        Request::Doctor => ok(ctx.cfg.cfg.doctor_report()),
        Request::Camera(on) => {
            let (reply, rx) = channel();
            send_frames(ctx, PipelineMsg::Camera(on, reply))?;
            let state = if on { "on" } else { "off" };
            match await_reply(rx)? {
                Ok(()) => ok(json!({"camera": state})),
                Err(e) => fail(e),
            }
        }
        Request::Model(name) => {
            let (reply, rx) = channel();
            send_frames(ctx, PipelineMsg::Model(name.clone(), reply))?;
            match await_reply(rx)? {
                Ok(changed) => ok(json!({"model": name, "changed": changed})),
                Err(e) => fail(e),
            }
        }
        Request::Reset => {
            send_frames(ctx, PipelineMsg::Reset)?;
            ok(json!("view reset"))
        }
        Request::Spin(state) => {
            let (reply, rx) = channel();
            send_frames(ctx, PipelineMsg::Spin(state, reply))?;
            ok(json!({"auto_rotate": await_reply(rx)?}))
        }
        Request::Shutdown => ok(json!("shutting down")),
    };
    Ok(resp)
}

struct DaemonState {
    cfg: DaemonConfigState,
}

impl DaemonState {
    fn new() -> Result<Self> {
        let cfg = DaemonConfigState::load_or_install_default()?;
        Ok(Self { cfg })
    }

    fn clone_shallow(&self) -> Self {
        Self {
            cfg: self.cfg.clone(),
        }
    }
}

// client helper
pub fn client_request(req: serde_json::Value) -> Result<serde_json::Value> {
    let sock = socket_path();
    if !sock.exists() {
        return Err(anyhow!(
            "handctl daemon is not running (socket missing at {})",
            sock.display()
        ));
    }
    let mut stream = UnixStream::connect(sock)?;
    let line = serde_json::to_string(&req)? + "\n";
    stream.write_all(line.as_bytes())?;
    let mut reader = BufReader::new(stream);
    let mut resp = String::new();
    reader.read_line(&mut resp)?;
    let v: serde_json::Value = serde_json::from_str(&resp)?;
    Ok(v)
}
