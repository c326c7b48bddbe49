use facegate_core::service::DEFAULT_DESCRIPTOR_DIM;
use facegate_core::MatchConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Daemon configuration: defaults, then an optional TOML file, then `FACEGATE_*` env vars.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Euclidean distance threshold for a positive authentication.
    pub auth_threshold: f32,
    /// Similarity threshold for counting population matches.
    pub match_threshold: f32,
    /// Expected descriptor length (0 disables the check).
    pub descriptor_dim: usize,
    /// Fixed seed for the simulated sub-model jitter.
    pub simulator_seed: Option<u64>,
    /// Timeout in seconds for a single engine request.
    pub request_timeout_secs: u64,
    /// Register on the system bus instead of the session bus.
    pub system_bus: bool,
}

/// Optional overrides read from the TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    db_path: Option<PathBuf>,
    auth_threshold: Option<f32>,
    match_threshold: Option<f32>,
    descriptor_dim: Option<usize>,
    simulator_seed: Option<u64>,
    request_timeout_secs: Option<u64>,
    system_bus: Option<bool>,
}

impl Default for Config {
    fn default() -> Self {
        let defaults = MatchConfig::default();
        Self {
            db_path: data_dir().join("faces.db"),
            auth_threshold: defaults.auth_threshold,
            match_threshold: defaults.match_threshold,
            descriptor_dim: DEFAULT_DESCRIPTOR_DIM,
            simulator_seed: None,
            request_timeout_secs: 10,
            system_bus: false,
        }
    }
}

impl Config {
    /// Resolve the full configuration from the process environment.
    pub fn load() -> Self {
        let path = std::env::var("FACEGATE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("facegated.toml"));

        let mut config = Self::default();
        if let Some(file) = read_file(&path) {
            config.apply_file(file);
        }
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.db_path {
            self.db_path = v;
        }
        if let Some(v) = file.auth_threshold {
            self.auth_threshold = v;
        }
        if let Some(v) = file.match_threshold {
            self.match_threshold = v;
        }
        if let Some(v) = file.descriptor_dim {
            self.descriptor_dim = v;
        }
        if file.simulator_seed.is_some() {
            self.simulator_seed = file.simulator_seed;
        }
        if let Some(v) = file.request_timeout_secs {
            self.request_timeout_secs = v;
        }
        if let Some(v) = file.system_bus {
            self.system_bus = v;
        }
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("FACEGATE_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        self.auth_threshold = env_parse(&var, "FACEGATE_AUTH_THRESHOLD", self.auth_threshold);
        self.match_threshold = env_parse(&var, "FACEGATE_MATCH_THRESHOLD", self.match_threshold);
        self.descriptor_dim = env_parse(&var, "FACEGATE_DESCRIPTOR_DIM", self.descriptor_dim);
        self.request_timeout_secs =
            env_parse(&var, "FACEGATE_REQUEST_TIMEOUT_SECS", self.request_timeout_secs);
        if let Some(v) = var("FACEGATE_SYSTEM_BUS") {
            self.system_bus = v != "0";
        }
        if let Some(raw) = var("FACEGATE_SIMULATOR_SEED") {
            match raw.parse() {
                Ok(seed) => self.simulator_seed = Some(seed),
                Err(_) => tracing::warn!(value = %raw, "ignoring unparsable FACEGATE_SIMULATOR_SEED"),
            }
        }
    }

    /// Thresholds and dimensionality handed to the matching service.
    pub fn match_config(&self) -> MatchConfig {
        MatchConfig {
            auth_threshold: self.auth_threshold,
            match_threshold: self.match_threshold,
            descriptor_dim: (self.descriptor_dim > 0).then_some(self.descriptor_dim),
        }
    }
}

fn read_file(path: &Path) -> Option<FileConfig> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "config file unreadable; using defaults");
            return None;
        }
    };
    match toml::from_str::<FileConfig>(&raw) {
        Ok(file) => {
            tracing::info!(path = %path.display(), "config file loaded");
            Some(file)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "bad config TOML; using defaults");
            None
        }
    }
}

fn env_parse<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match var(key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment value");
            default
        }),
    }
}

fn xdg_dir(var: &str, fallback: &str) -> PathBuf {
    std::env::var(var).map(PathBuf::from).unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home).join(fallback)
    })
}

fn data_dir() -> PathBuf {
    xdg_dir("XDG_DATA_HOME", ".local/share").join("facegate")
}

fn config_dir() -> PathBuf {
    xdg_dir("XDG_CONFIG_HOME", ".config").join("facegate")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.auth_threshold, 0.6);
        assert_eq!(config.match_threshold, 0.75);
        assert_eq!(config.descriptor_dim, 128);
        assert_eq!(config.simulator_seed, None);
        assert!(!config.system_bus);
        assert!(config.db_path.ends_with("facegate/faces.db"));
    }

    #[test]
    fn test_file_then_env_layering() {
        let file: FileConfig = toml::from_str(
            "auth_threshold = 0.5\nmatch_threshold = 0.8\nsimulator_seed = 7\ndb_path = \"/var/lib/facegate/faces.db\"",
        )
        .unwrap();
        let mut config = Config::default();
        config.apply_file(file);
        config.apply_env(env(&[("FACEGATE_AUTH_THRESHOLD", "0.45"), ("FACEGATE_DESCRIPTOR_DIM", "0")]));

        assert_eq!(config.auth_threshold, 0.45);
        assert_eq!(config.match_threshold, 0.8);
        assert_eq!(config.simulator_seed, Some(7));
        assert_eq!(config.db_path, PathBuf::from("/var/lib/facegate/faces.db"));
        assert_eq!(config.match_config().descriptor_dim, None);
    }

    #[test]
    fn test_bad_env_value_keeps_previous_layer() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("FACEGATE_MATCH_THRESHOLD", "high"),
            ("FACEGATE_SIMULATOR_SEED", "42"),
            ("FACEGATE_SYSTEM_BUS", "1"),
        ]));
        assert_eq!(config.match_threshold, 0.75);
        assert_eq!(config.simulator_seed, Some(42));
        assert!(config.system_bus);
    }

    #[test]
    fn test_unknown_file_keys_rejected() {
        assert!(toml::from_str::<FileConfig>("threshold = 1.0").is_err());
    }

    #[test]
    fn test_match_config_mapping() {
        let config = Config {
            descriptor_dim: 64,
            ..Config::default()
        };
        let mc = config.match_config();
        assert_eq!(mc.descriptor_dim, Some(64));
        assert_eq!(mc.auth_threshold, 0.6);
    }
}
