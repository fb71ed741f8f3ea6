use anyhow::{Result, anyhow};

/// A parsed client request. The wire form is one JSON object per line with an `op` field.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Status,
    Reload,
    Use(String),
    List,
    Doctor,
    Shutdown,
    Camera(bool),
    Model(String),
    Reset,
    /// `None` toggles.
    Spin(Option<bool>),
}

fn str_field<'a>(req: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    req.get(key).and_then(|v| v.as_str())
}

fn on_off(word: &str) -> Result<bool> {
    match word {
        "on" | "true" => Ok(true),
        "off" | "false" => Ok(false),
        other => Err(anyhow!("expected on|off, got '{other}'")),
    }
}

pub fn parse_request(line: &str) -> Result<Request> {
    let req: serde_json::Value = serde_json::from_str(line)?;
    let op = str_field(&req, "op").unwrap_or("");

    let parsed = match op {
        "status" => Request::Status,
        "reload" => Request::Reload,
        "use" => {
            let name = str_field(&req, "profile")
                .filter(|s| !s.is_empty())
                .ok_or_else(|| anyhow!("use: missing profile name"))?;
            Request::Use(name.to_string())
        }
        "list" => Request::List,
        "doctor" => Request::Doctor,
        "shutdown" => Request::Shutdown,
        "camera" => {
            let state = str_field(&req, "state").ok_or_else(|| anyhow!("camera: missing state"))?;
            Request::Camera(on_off(state)?)
        }
        "model" => {
            let name = str_field(&req, "name")
                .filter(|s| !s.is_empty())
                .ok_or_else(|| anyhow!("model: missing model name"))?;
            Request::Model(name.to_string())
        }
        "reset" => Request::Reset,
        "spin" => match str_field(&req, "state") {
            Some(s) => Request::Spin(Some(on_off(s)?)),
            None => Request::Spin(None),
        },
        _ => return Err(anyhow!("unknown op: {op}")),
    };
    Ok(parsed)
}
