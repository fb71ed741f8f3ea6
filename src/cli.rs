use anyhow::{Result, anyhow};
use pico_args::Arguments;
use std::{
    env,
    path::{Path, PathBuf},
    process::Command,
};

use crate::actions::StatusBoard;
use crate::config::{DaemonConfigState, Profile};
use crate::feed::{FeedStream, JsonLandmarkDecoder};
use crate::gestures::is_idle;
use crate::ipc;
use crate::scene::Scene;
use crate::session::{FrameHost, TickOutcome, TrackingSession};

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // consumed by logging::init
    let _ = pargs.contains(["-v", "--verbose"]);

    // Hidden daemon mode (spawned by `start`)
    if pargs.contains("--daemon") {
        return ipc::run_daemon();
    }

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    // Flags-based help (-h/--help)
    if pargs.contains(["-h", "--help"]) {
        print_help();
        return Ok(());
    }

    // First free arg is the subcommand
    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("start") => {
            let exe = std::env::current_exe()?;
            let child = Command::new(exe).arg("--daemon").spawn()?;
            println!("handctl: started daemon (pid={})", child.id());
            Ok(())
        }

        Some("stop") => request(serde_json::json!({"op":"shutdown"})),
        Some("status") => request(serde_json::json!({"op":"status"})),
        Some("reload") => request(serde_json::json!({"op":"reload"})),

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl use <profile_name>"))?;
            request(serde_json::json!({"op":"use","profile":name}))
        }

        Some("list") => request(serde_json::json!({"op":"list"})),
        Some("doctor") => request(serde_json::json!({"op":"doctor"})),

        Some("camera") => {
            let state: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl camera <on|off>"))?;
            if state != "on" && state != "off" {
                return Err(anyhow!("usage: handctl camera <on|off>"));
            }
            request(serde_json::json!({"op":"camera","state":state}))
        }

        Some("model") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl model <name>"))?;
            request(serde_json::json!({"op":"model","name":name}))
        }

        Some("reset") => request(serde_json::json!({"op":"reset"})),

        Some("spin") => {
            let state: Option<String> = pargs.free_from_str().ok();
            match state {
                Some(s) => request(serde_json::json!({"op":"spin","state":s})),
                None => request(serde_json::json!({"op":"spin"})),
            }
        }

        Some("replay") => {
            let profile: Option<String> = pargs.opt_value_from_str("--profile")?;
            let all_ticks = pargs.contains("--all");
            let file: PathBuf = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl replay <file> [--profile <name>] [--all]"))?;
            replay(&file, profile.as_deref(), all_ticks)
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

fn request(req: serde_json::Value) -> Result<()> {
    let r = ipc::client_request(req)?;
    print_response(&r);
    Ok(())
}

fn load_profile(name: Option<&str>) -> Result<Profile> {
    let cfg = DaemonConfigState::load_or_install_default()?;
    match name {
        Some(name) => cfg.profile_named(name),
        None => Ok(cfg.profile),
    }
}

/// Frame host for offline runs. Idle ticks are counted but only printed with `--all`.
struct ReplayHost {
    scene: Scene,
    ticks: u64,
    all_ticks: bool,
}

impl ReplayHost {
    fn tick_line(&mut self, outcome: &TickOutcome) -> Option<String> {
        let TickOutcome::Processed(events) = outcome else {
            return None;
        };
        self.ticks += 1;
        if !self.all_ticks && is_idle(events) {
            return None;
        }
        Some(serde_json::json!({"tick": self.ticks, "events": events}).to_string())
    }
}

impl FrameHost for ReplayHost {
    fn wait_for_frame(&mut self) -> bool {
        self.scene.advance_frame();
        true
    }

    fn scene(&mut self) -> &mut Scene {
        &mut self.scene
    }

    fn on_tick(&mut self, outcome: &TickOutcome) {
        if let Some(line) = self.tick_line(outcome) {
            println!("{line}");
        }
    }
}

fn replay(file: &Path, profile_name: Option<&str>, all_ticks: bool) -> Result<()> {
    let profile = load_profile(profile_name)?;
    let th = &profile.thresholds;
    let mut scene = Scene::new(&profile.scene.initial_model, th.zoom_min, th.zoom_max)?;
    scene.set_auto_rotate(profile.scene.auto_rotate);

    let mut session = TrackingSession::new(
        JsonLandmarkDecoder::new(profile.session.layout.clone()),
        StatusBoard::default(),
        th,
    );
    session.start(FeedStream::replay(file))?;

    let mut host = ReplayHost {
        scene,
        ticks: 0,
        all_ticks,
    };
    session.run(&mut host);

    let model = host.scene.current_model();
    let summary = serde_json::json!({
        "ticks": host.ticks,
        "model": model.name,
        "camera_z": host.scene.camera().position[2],
        "rotation": model.rotation,
        "ui": session.ui(),
    });
    print_response(&summary);
    Ok(())
}

fn print_help() {
    println!(
        r#"handctl - hand-gesture control for a 3D model viewer

USAGE:
  handctl help [command]                 Show general or command-specific help
  handctl start                          Start the daemon
  handctl stop                           Stop the daemon
  handctl status                         Show tracking state, UI indicators, transforms
  handctl reload                         Reload active profile
  handctl use <name>                     Switch active profile
  handctl list                           List profiles
  handctl doctor                         Diagnose permissions, feed, devices
  handctl camera <on|off>                Start or stop hand tracking
  handctl model <name>                   Show another model
  handctl reset                          Frame the visible model again
  handctl spin [on|off]                  Toggle auto-rotate
  handctl replay <file> [--profile <p>]  Run a recorded landmark feed offline

FLAGS:
  -v, --verbose                          Debug logging (RUST_LOG overrides)

TIPS:
  - Landmark feed: ~/.local/run/handctl.landmarks (one JSON frame per line)
  - Profiles: ~/.config/handctl/profiles
  - Active profile pointer: ~/.config/handctl/active
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "start" => println!("usage: handctl start\nStarts the background daemon."),
        "stop" => println!("usage: handctl stop\nStops tracking and the running daemon."),
        "status" => println!(
            "usage: handctl status\nShows active profile, tracking state, indicators, camera and model transforms."
        ),
        "reload" => println!(
            "usage: handctl reload\nReloads the current profile; keeps last good on error."
        ),
        "use" => {
            println!("usage: handctl use <name>\nSwitches active profile to <name> and reloads.")
        }
        "list" => {
            println!("usage: handctl list\nLists available profiles and the active one.")
        }
        "doctor" => println!(
            "usage: handctl doctor\nChecks group membership, video and pointer devices, and the landmark feed."
        ),
        "camera" => println!(
            "usage: handctl camera <on|off>\nStarts tracking on the landmark feed, or stops it. Pointer control keeps working either way."
        ),
        "model" => println!(
            "usage: handctl model <name>\nShows <name> and hides the rest. Models: earth, blackhole, human-body, supernova, galaxy."
        ),
        "reset" => println!("usage: handctl reset\nMoves the camera back to frame the visible model."),
        "spin" => println!("usage: handctl spin [on|off]\nSets or toggles auto-rotate of the visible model."),
        "replay" => println!(
            "usage: handctl replay <file> [--profile <name>] [--all]\nFeeds each line of <file> through the gesture pipeline and prints the events per tick, then the final transforms. --all also prints idle ticks."
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}
