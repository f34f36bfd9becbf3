//! `dllbridge-serverd` configuration: bind address, DLL search/translation
//! paths, and session limits. Loadable from a TOML file with `DLLBRIDGE_*`
//! environment overrides, mirroring the compiler crate's `CompilerConfig`
//! builder style.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {var}: {value}")]
    InvalidEnvValue { var: String, value: String },
}

/// Server-side tunables (spec.md §4.7, SPEC_FULL.md §2's "ambient stack"
/// Configuration entry).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Address `dllbridge-serverd` listens on.
    pub bind_addr: String,

    /// Directories searched, in order, for a DLL named by `library_name`
    /// alone (no path component) in `access_library`.
    pub dll_search_paths: Vec<PathBuf>,

    /// Unix-visible path -> Wine-visible path, used when a client's
    /// `library_path_native` is empty (spec.md §4.7).
    pub path_translations: HashMap<String, String>,

    /// Seconds of inactivity before an idle session's resources are
    /// released (spec.md §5).
    pub idle_session_timeout_secs: u64,

    /// Upper bound on the total bytes a single `call_routine`'s memsync
    /// snapshots may carry, guarding against a misdeclared length blowing
    /// up the server's memory.
    pub max_memory_snapshot_bytes: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            bind_addr: "127.0.0.1:7878".to_string(),
            dll_search_paths: Vec::new(),
            path_translations: HashMap::new(),
            idle_session_timeout_secs: 300,
            max_memory_snapshot_bytes: 64 * 1024 * 1024,
        }
    }
}

impl BridgeConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: "<string>".into(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Apply `DLLBRIDGE_*` environment overrides on top of whatever was
    /// loaded from the TOML file (or the defaults).
    pub fn apply_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(v) = std::env::var("DLLBRIDGE_BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Ok(v) = std::env::var("DLLBRIDGE_IDLE_SESSION_TIMEOUT_SECS") {
            self.idle_session_timeout_secs = v.parse().map_err(|_| ConfigError::InvalidEnvValue {
                var: "DLLBRIDGE_IDLE_SESSION_TIMEOUT_SECS".into(),
                value: v,
            })?;
        }
        if let Ok(v) = std::env::var("DLLBRIDGE_MAX_MEMORY_SNAPSHOT_BYTES") {
            self.max_memory_snapshot_bytes =
                v.parse().map_err(|_| ConfigError::InvalidEnvValue {
                    var: "DLLBRIDGE_MAX_MEMORY_SNAPSHOT_BYTES".into(),
                    value: v,
                })?;
        }
        if let Ok(v) = std::env::var("DLLBRIDGE_DLL_SEARCH_PATHS") {
            self.dll_search_paths = std::env::split_paths(&v).collect();
        }
        Ok(self)
    }

    /// Translate a client-visible path into the path the server should
    /// actually open, following the table built from `path_translations`.
    /// Falls back to the input unchanged when no entry matches.
    pub fn translate_path<'a>(&'a self, local_path: &'a str) -> &'a str {
        self.path_translations
            .get(local_path)
            .map(String::as_str)
            .unwrap_or(local_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = BridgeConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:7878");
        assert_eq!(config.idle_session_timeout_secs, 300);
    }

    #[test]
    fn loads_from_toml() {
        let toml = r#"
            bind_addr = "0.0.0.0:9000"
            idle_session_timeout_secs = 60

            [path_translations]
            "/home/user/libs/foo.dll" = "Z:\\home\\user\\libs\\foo.dll"
        "#;
        let config = BridgeConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.idle_session_timeout_secs, 60);
        assert_eq!(
            config.translate_path("/home/user/libs/foo.dll"),
            "Z:\\home\\user\\libs\\foo.dll"
        );
    }

    #[test]
    fn untranslated_path_passes_through() {
        let config = BridgeConfig::default();
        assert_eq!(config.translate_path("/tmp/x.dll"), "/tmp/x.dll");
    }

    #[test]
    fn env_override_wins_over_file_value() {
        // SAFETY (test-only): no other test in this process reads this var
        // concurrently; `cfg(test)` env mutation is the accepted pattern for
        // exercising override precedence without a live process tree.
        unsafe { std::env::set_var("DLLBRIDGE_BIND_ADDR", "10.0.0.1:1") };
        let config = BridgeConfig::default().apply_env_overrides().unwrap();
        assert_eq!(config.bind_addr, "10.0.0.1:1");
        unsafe { std::env::remove_var("DLLBRIDGE_BIND_ADDR") };
    }
}
