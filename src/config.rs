use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::endpoint::DEFAULT_API_VERSION;

pub const DEFAULT_BASE_URL: &str = "https://demo.lizard.net";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Portal root, e.g. `https://demo.lizard.net`.
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// API version, the `3` in `/api/v3/`.
    pub version: String,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_BASE_URL.to_string(),
            username: None,
            password: None,
            version: DEFAULT_API_VERSION.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

const RC_KEYS: [&str; 4] = ["url", "username", "password", "version"];

#[derive(Debug, Default, PartialEq)]
struct RcConfig {
    url: Option<String>,
    username: Option<String>,
    password: Option<String>,
    version: Option<String>,
}

pub(crate) fn load_config(
    url: Option<String>,
    username: Option<String>,
    password: Option<String>,
) -> Result<ClientConfig> {
    load_config_with(url, username, password, |k| std::env::var(k).ok())
}

fn load_config_with(
    url: Option<String>,
    username: Option<String>,
    password: Option<String>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ClientConfig> {
    let mut url = url.or_else(|| env("LIZARD_URL"));
    let mut username = username.or_else(|| env("LIZARD_USERNAME"));
    let mut password = password.or_else(|| env("LIZARD_PASSWORD"));
    let mut version = env("LIZARD_API_VERSION");

    if url.is_none() || username.is_none() || password.is_none() || version.is_none() {
        for rc_path in rc_candidates(env("LIZARD_RC")) {
            if rc_path.exists() {
                let cfg = read_rc(&rc_path).with_context(|| {
                    format!("failed to read configuration file {}", rc_path.display())
                })?;
                tracing::debug!(path = %rc_path.display(), "Loaded Lizard configuration file");

                url = url.or(cfg.url);
                username = username.or(cfg.username);
                password = password.or(cfg.password);
                version = version.or(cfg.version);
                break;
            }
        }
    }

    let defaults = ClientConfig::default();
    Ok(ClientConfig {
        url: url.unwrap_or(defaults.url),
        username,
        password,
        version: version.unwrap_or(defaults.version),
        timeout: defaults.timeout,
    })
}

fn read_rc(path: &Path) -> Result<RcConfig> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_rc(&text))
}

fn parse_rc(text: &str) -> RcConfig {
    let mut cfg = RcConfig::default();

    // A key may have its value on the following line.
    let mut pending_key: Option<String> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(pk) = pending_key.take() {
            let is_key_line = line
                .split_once(':')
                .is_some_and(|(k, _)| RC_KEYS.contains(&k.trim()));
            if !is_key_line {
                set_rc_value(&mut cfg, &pk, strip_quotes(line));
                continue;
            }
        }

        if let Some((k, v)) = line.split_once(':') {
            let k = k.trim();
            let v = strip_quotes(v.trim());
            if v.is_empty() {
                pending_key = Some(k.to_string());
            } else {
                set_rc_value(&mut cfg, k, v);
            }
        }
    }

    cfg
}

fn set_rc_value(cfg: &mut RcConfig, key: &str, value: &str) {
    let value = Some(value.to_string());
    match key {
        "url" => cfg.url = value,
        "username" => cfg.username = value,
        "password" => cfg.password = value,
        "version" => cfg.version = value,
        _ => {}
    }
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn rc_candidates(explicit: Option<String>) -> Vec<PathBuf> {
    // 1) LIZARD_RC
    // 2) ./.lizardrc
    // 3) ~/.lizardrc
    if let Some(p) = explicit {
        return vec![PathBuf::from(p)];
    }

    let mut v = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        v.push(cwd.join(".lizardrc"));
    }
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(".lizardrc"));
    }
    v
}
