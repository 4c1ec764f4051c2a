use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "Pharmassist";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Idle time after which a session expires (1 hour).
pub const SESSION_TIMEOUT_MS: u64 = 3_600_000;

/// How often the event loop sweeps abandoned sessions.
pub const SESSION_SWEEP_INTERVAL_SECS: u64 = 60;

/// Length of a generated session token.
pub const SESSION_TOKEN_LEN: usize = 32;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session_token";

/// Per-collection capacity ceilings.
pub const MAX_USERS: usize = 64;
pub const MAX_PATIENTS: usize = 128;
pub const MAX_PRESCRIPTIONS: usize = 256;
pub const MAX_NOTIFICATIONS: usize = 256;

/// Defaults applied to self-registered accounts.
pub const REGISTERED_LICENSE: &str = "MD-NEW";
pub const REGISTERED_DEPARTMENT: &str = "General Practice";

/// Default `tracing` filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "pharmassist=info,warn"
}

/// Get the application data directory.
/// ~/Pharmassist/ on all platforms; falls back to the working directory.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Get the directory holding the CSV collections.
pub fn default_records_dir() -> PathBuf {
    app_data_dir().join("data")
}

/// Runtime settings, read from the environment with defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub session_timeout: Duration,
    pub sweep_interval: Duration,
    /// Load the demo accounts and records when storage is empty.
    pub seed_demo_data: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_records_dir(),
            session_timeout: Duration::from_millis(SESSION_TIMEOUT_MS),
            sweep_interval: Duration::from_secs(SESSION_SWEEP_INTERVAL_SECS),
            seed_demo_data: true,
        }
    }
}

impl Settings {
    /// Build settings from `PHARMASSIST_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup. Unparseable values fall back to
    /// defaults with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();

        if let Some(dir) = lookup("PHARMASSIST_DATA_DIR").filter(|d| !d.trim().is_empty()) {
            settings.data_dir = PathBuf::from(dir);
        }
        if let Some(secs) = parse_secs(&lookup, "PHARMASSIST_SESSION_TIMEOUT_SECS") {
            settings.session_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_secs(&lookup, "PHARMASSIST_SWEEP_INTERVAL_SECS") {
            settings.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup("PHARMASSIST_SEED_DEMO") {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => settings.seed_demo_data = true,
                "0" | "false" | "no" | "off" => settings.seed_demo_data = false,
                other => tracing::warn!(value = other, "Ignoring PHARMASSIST_SEED_DEMO"),
            }
        }
        settings
    }
}

fn parse_secs(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Some(secs),
        _ => {
            tracing::warn!(key, value = %raw, "Ignoring invalid duration");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn records_dir_under_app_data() {
        let records = default_records_dir();
        assert!(records.starts_with(app_data_dir()));
        assert!(records.ends_with("data"));
    }

    #[test]
    fn app_name_is_pharmassist() {
        assert_eq!(APP_NAME, "Pharmassist");
    }

    #[test]
    fn defaults_without_environment() {
        let settings = Settings::from_lookup(|_| None);
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.session_timeout, Duration::from_secs(3600));
        assert_eq!(settings.sweep_interval, Duration::from_secs(60));
        assert!(settings.seed_demo_data);
    }

    #[test]
    fn environment_overrides_defaults() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("PHARMASSIST_DATA_DIR", "/tmp/rx"),
            ("PHARMASSIST_SESSION_TIMEOUT_SECS", "120"),
            ("PHARMASSIST_SWEEP_INTERVAL_SECS", "5"),
            ("PHARMASSIST_SEED_DEMO", "off"),
        ]));
        assert_eq!(settings.data_dir, PathBuf::from("/tmp/rx"));
        assert_eq!(settings.session_timeout, Duration::from_secs(120));
        assert_eq!(settings.sweep_interval, Duration::from_secs(5));
        assert!(!settings.seed_demo_data);
    }

    #[test]
    fn invalid_values_fall_back() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("PHARMASSIST_SESSION_TIMEOUT_SECS", "soon"),
            ("PHARMASSIST_SWEEP_INTERVAL_SECS", "0"),
            ("PHARMASSIST_SEED_DEMO", "maybe"),
        ]));
        assert_eq!(settings, Settings::default());
    }
}
