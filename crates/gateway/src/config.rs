use std::{collections::HashMap, fs};

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub bind_addr: String,
    pub backend_url: String,
    pub auth_secret: String,
    pub auth_cookie: String,
    pub session_ttl_minutes: i64,
    pub dashboard_prefix: String,
    pub meeting_poll_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8090".into(),
            backend_url: "http://127.0.0.1:8000".into(),
            auth_secret: "dev-secret-change-me".into(),
            auth_cookie: session::AUTH_COOKIE_NAME.into(),
            session_ttl_minutes: 60,
            dashboard_prefix: "/dashboard".into(),
            meeting_poll_seconds: 4,
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("gateway.toml") {
        apply_file_config(&mut settings, &raw);
    }

    if let Ok(v) = std::env::var("GATEWAY_BIND") {
        settings.bind_addr = v;
    }
    if let Ok(v) = std::env::var("APP__BIND_ADDR") {
        settings.bind_addr = v;
    }

    if let Ok(v) = std::env::var("BACKEND_URL") {
        settings.backend_url = v;
    }
    if let Ok(v) = std::env::var("APP__BACKEND_URL") {
        settings.backend_url = v;
    }

    if let Ok(v) = std::env::var("AUTH_SECRET") {
        settings.auth_secret = v;
    }
    if let Ok(v) = std::env::var("APP__AUTH_SECRET") {
        settings.auth_secret = v;
    }

    if let Ok(v) = std::env::var("AUTH_COOKIE_NAME") {
        settings.auth_cookie = v;
    }
    if let Ok(v) = std::env::var("APP__AUTH_COOKIE") {
        settings.auth_cookie = v;
    }

    if let Ok(v) = std::env::var("APP__DASHBOARD_PREFIX") {
        settings.dashboard_prefix = v;
    }

    if let Ok(v) = std::env::var("APP__SESSION_TTL_MINUTES") {
        if let Ok(parsed) = v.parse::<i64>() {
            settings.session_ttl_minutes = parsed;
        }
    }

    if let Ok(v) = std::env::var("APP__MEETING_POLL_SECONDS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.meeting_poll_seconds = parsed;
        }
    }

    settings.dashboard_prefix = normalize_prefix(&settings.dashboard_prefix);
    settings
}

fn apply_file_config(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(raw) else {
        return;
    };

    if let Some(v) = file_cfg.get("bind_addr").and_then(|v| v.as_str()) {
        settings.bind_addr = v.to_string();
    }
    if let Some(v) = file_cfg.get("backend_url").and_then(|v| v.as_str()) {
        settings.backend_url = v.to_string();
    }
    if let Some(v) = file_cfg.get("auth_secret").and_then(|v| v.as_str()) {
        settings.auth_secret = v.to_string();
    }
    if let Some(v) = file_cfg.get("auth_cookie").and_then(|v| v.as_str()) {
        settings.auth_cookie = v.to_string();
    }
    if let Some(v) = file_cfg.get("dashboard_prefix").and_then(|v| v.as_str()) {
        settings.dashboard_prefix = v.to_string();
    }
    if let Some(v) = file_cfg.get("session_ttl_minutes").and_then(|v| v.as_integer()) {
        settings.session_ttl_minutes = v;
    }
    if let Some(v) = file_cfg.get("meeting_poll_seconds").and_then(|v| v.as_integer()) {
        if let Ok(parsed) = u64::try_from(v) {
            settings.meeting_poll_seconds = parsed;
        }
    }
}

/// Route prefixes must start with `/` and carry no trailing slash; an empty
/// prefix falls back to the default so the auth gate never unmounts.
fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Settings::default().dashboard_prefix;
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
