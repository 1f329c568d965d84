use std::{collections::HashMap, fs, time::Duration};

use client_core::ClientOptions;

pub const CONFIG_FILE: &str = "portal.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_url: String,
    pub api_token: Option<String>,
    pub database_url: String,
    pub request_timeout_secs: u64,
    pub search_debounce_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8080/api".into(),
            api_token: None,
            database_url: "sqlite://./data/portal.db".into(),
            request_timeout_secs: 30,
            search_debounce_ms: 300,
        }
    }
}

impl Settings {
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            api_token: self.api_token.clone(),
            request_timeout: Some(Duration::from_secs(self.request_timeout_secs)),
        }
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    /// `database_url` in the form sqlx expects. A bare path becomes a
    /// `sqlite://` URL; `Storage::new` creates the parent directory.
    pub fn draft_database_url(&self) -> String {
        let raw = self.database_url.trim();
        if raw.is_empty() {
            return Settings::default().database_url;
        }
        if raw.starts_with("sqlite::memory:") || raw.contains("://") {
            return raw.to_string();
        }
        let path = raw.strip_prefix("sqlite:").unwrap_or(raw);
        format!("sqlite://{}", path.replace('\\', "/"))
    }
}

/// Defaults, then `portal.toml`, then the environment.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();
    if let Ok(raw) = fs::read_to_string(CONFIG_FILE) {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings
}

fn apply_file(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(raw) else {
        tracing::warn!("ignoring unreadable {CONFIG_FILE}");
        return;
    };
    let text = |key: &str| match file_cfg.get(key) {
        Some(toml::Value::String(value)) => Some(value.clone()),
        Some(toml::Value::Integer(value)) => Some(value.to_string()),
        _ => None,
    };

    if let Some(v) = text("api_url") {
        settings.api_url = v;
    }
    if let Some(v) = text("api_token") {
        settings.api_token = Some(v);
    }
    if let Some(v) = text("database_url") {
        settings.database_url = v;
    }
    if let Some(v) = text("request_timeout_secs").and_then(|v| v.parse().ok()) {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = text("search_debounce_ms").and_then(|v| v.parse().ok()) {
        settings.search_debounce_ms = v;
    }
}

/// `APP__*` names win over the plain ones.
fn apply_env(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("PORTAL_API_URL") {
        settings.api_url = v;
    }
    if let Some(v) = lookup("APP__API_URL") {
        settings.api_url = v;
    }

    if let Some(v) = lookup("PORTAL_API_TOKEN") {
        settings.api_token = Some(v);
    }
    if let Some(v) = lookup("APP__API_TOKEN") {
        settings.api_token = Some(v);
    }

    if let Some(v) = lookup("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = lookup("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(parsed) = lookup("APP__REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        settings.request_timeout_secs = parsed;
    }
    if let Some(parsed) = lookup("APP__SEARCH_DEBOUNCE_MS").and_then(|v| v.parse().ok()) {
        settings.search_debounce_ms = parsed;
    }
}
