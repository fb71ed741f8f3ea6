use anyhow::{Result, anyhow};
use directories::UserDirs;
use log::info;
use serde::Deserialize;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::feed::LAYOUT_MEDIAPIPE_HANDS;
use crate::input;
use crate::scene;

#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub deadzone_px: f32,
    pub pinch_threshold: f32,
    pub rotate_gain: f32,
    pub zoom_gain: f32,
    pub zoom_min: f32,
    pub zoom_max: f32,
    pub pulse_ms: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            deadzone_px: 5.0,
            pinch_threshold: 50.0,
            rotate_gain: 0.01,
            zoom_gain: 0.01,
            zoom_min: 1.0,
            zoom_max: 20.0,
            pulse_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PointerSettings {
    pub enabled: bool,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
}

impl Default for PointerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Landmark feed file; empty means the runtime default.
    pub feed: String,
    pub layout: String,
    pub frame_interval_ms: u64,
    pub autostart: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            feed: String::new(),
            layout: LAYOUT_MEDIAPIPE_HANDS.to_string(),
            frame_interval_ms: 16,
            autostart: false,
        }
    }
}

impl SessionSettings {
    pub fn feed_path(&self) -> PathBuf {
        let feed = self.feed.trim();
        if feed.is_empty() {
            crate::ipc::default_feed_path()
        } else if let Some(rest) = feed.strip_prefix("~/") {
            home_dir().join(rest)
        } else {
            PathBuf::from(feed)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SceneSettings {
    pub initial_model: String,
    pub auto_rotate: bool,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            initial_model: "earth".to_string(),
            auto_rotate: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub meta: Meta,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub pointer: PointerSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub scene: SceneSettings,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            meta: Meta {
                name: Some("default".to_string()),
            },
            thresholds: Thresholds::default(),
            pointer: PointerSettings::default(),
            session: SessionSettings::default(),
            scene: SceneSettings::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DaemonConfigState {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

pub(crate) fn home_dir() -> PathBuf {
    UserDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(std::env::temp_dir)
}

fn config_dir() -> PathBuf {
    home_dir().join(".config").join("handctl")
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl DaemonConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        Self::load_from(config_dir())
    }

    pub fn load_from(cfgdir: PathBuf) -> Result<Self> {
        let profdir = cfgdir.join("profiles");
        fs::create_dir_all(&profdir)?;

        let def_path = profdir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = cfgdir.join("active");
        if !active_ptr.exists() {
            let mut f = fs::File::create(&active_ptr)?;
            f.write_all(b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = load_profile(&profdir, &active_name)?;

        Ok(Self {
            active_name,
            profile,
            config_dir: cfgdir,
            profiles_dir: profdir,
            active_ptr,
        })
    }

    /// Re-reads the active profile; on error the last good profile stays in place.
    pub fn reload(&mut self) -> Result<()> {
        self.profile = load_profile(&self.profiles_dir, &self.active_name)?;
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profiles_dir.join(format!("{name}.toml"));
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        let profile = load_profile(&self.profiles_dir, name)?;
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.profile = profile;
        Ok(())
    }

    /// Loads another profile from the profiles dir without changing the active pointer.
    pub fn profile_named(&self, name: &str) -> Result<Profile> {
        load_profile(&self.profiles_dir, name)
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                if let Some(ext) = e.path().extension() {
                    if ext == "toml" {
                        if let Some(stem) = e.path().file_stem().and_then(|s| s.to_str()) {
                            v.push(stem.to_string());
                        }
                    }
                }
            }
        }
        v.sort();
        v
    }

    pub fn doctor_report(&self) -> serde_json::Value {
        let feed = self.profile.session.feed_path();
        serde_json::json!({
            "video_devices": input::discover_video_devices(),
            "pointer_devices": input::discover_pointers()
                .into_iter()
                .map(|d| format!("{} ({})", d.name, d.path))
                .collect::<Vec<_>>(),
            "video_group_member": check_in_group("video"),
            "input_group_member": check_in_group("input"),
            "feed": feed,
            "feed_present": feed.exists(),
            "profiles_dir": self.profiles_dir,
            "active_profile": self.active_name,
            "hints": {
                "feed": "run the landmark detector so it appends one JSON frame per line to the feed",
                "add_user_to_input_group": "sudo usermod -aG input $USER && newgrp input",
                "add_user_to_video_group": "sudo usermod -aG video $USER && newgrp video"
            }
        })
    }
}

pub fn parse_profile(txt: &str) -> Result<Profile> {
    let profile: Profile = toml::from_str(txt)?;
    validate_profile(&profile)?;
    Ok(profile)
}

fn load_profile(dir: &Path, name: &str) -> Result<Profile> {
    let path = dir.join(format!("{name}.toml"));
    let txt = fs::read_to_string(&path)
        .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
    parse_profile(&txt).map_err(|e| anyhow!("failed to load {}: {e}", path.display()))
}

pub fn validate_profile(p: &Profile) -> Result<()> {
    let th = &p.thresholds;
    if !(th.deadzone_px >= 0.0 && th.deadzone_px.is_finite()) {
        return Err(anyhow!("thresholds.deadzone_px must be a finite value >= 0"));
    }
    if !(th.pinch_threshold > 0.0 && th.pinch_threshold.is_finite()) {
        return Err(anyhow!("thresholds.pinch_threshold must be positive"));
    }
    if !th.rotate_gain.is_finite() || !th.zoom_gain.is_finite() {
        return Err(anyhow!("thresholds gains must be finite"));
    }
    if !(th.zoom_min > 0.0 && th.zoom_min < th.zoom_max && th.zoom_max.is_finite()) {
        return Err(anyhow!(
            "thresholds.zoom_min/zoom_max must satisfy 0 < zoom_min < zoom_max"
        ));
    }
    if th.pulse_ms == 0 || th.pulse_ms > 1000 {
        return Err(anyhow!("thresholds.pulse_ms must be in 1..=1000"));
    }

    if !(p.pointer.rotate_speed > 0.0 && p.pointer.zoom_speed > 0.0) {
        return Err(anyhow!("pointer speeds must be positive"));
    }

    if p.session.layout != LAYOUT_MEDIAPIPE_HANDS {
        return Err(anyhow!(
            "session.layout '{}' is not supported (expected '{}')",
            p.session.layout,
            LAYOUT_MEDIAPIPE_HANDS
        ));
    }
    if p.session.frame_interval_ms == 0 || p.session.frame_interval_ms > 1000 {
        return Err(anyhow!("session.frame_interval_ms must be in 1..=1000"));
    }

    if scene::model_spec(&p.scene.initial_model).is_none() {
        return Err(anyhow!(
            "scene.initial_model '{}' is not a known model",
            p.scene.initial_model
        ));
    }
    Ok(())
}

fn check_in_group(group: &str) -> bool {
    if let Ok(s) = fs::read_to_string("/etc/group") {
        let user = whoami::username();
        let prefix = format!("{group}:");
        for line in s.lines() {
            if line.starts_with(&prefix)
                && line
                    .split(':')
                    .nth(3)
                    .unwrap_or("")
                    .split(',')
                    .any(|u| u == user)
            {
                return true;
            }
        }
    }
    false
}
