//! Engine location and client settings.
//!
//! Settings come from environment variables, with command-line flags applied
//! on top by the binary:
//!
//! | Variable                  | Meaning                                  |
//! |---------------------------|------------------------------------------|
//! | `BASSBOX_PATH`            | engine executable                        |
//! | `BASSBOX_ARGS`            | whitespace separated engine arguments    |
//! | `BASSBOX_CALL_TIMEOUT_MS` | per-call deadline; unset waits forever   |
//! | `BASSBOX_SCOPES`          | comma separated service scope names      |

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::DEFAULT_SCOPES;

/// File name of the engine executable on this platform.
fn engine_file_name() -> &'static str {
    if cfg!(windows) {
        "bassbox.exe"
    } else {
        "bassbox"
    }
}

/// Resolve the default engine executable.
///
/// Resolution order:
/// 1. `<data_local_dir>/bassbox/bassbox` if it exists
///    (`~/.local/share` on Linux, `~/Library/Application Support` on macOS)
/// 2. `bassbox` looked up on `PATH`
pub fn default_engine_path() -> PathBuf {
    if let Some(data_dir) = dirs::data_local_dir() {
        let installed = data_dir.join("bassbox").join(engine_file_name());
        if installed.exists() {
            return installed;
        }
    }

    PathBuf::from(engine_file_name())
}

/// Client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Engine executable.
    pub engine_path: PathBuf,
    /// Arguments passed to the engine; `-e speaker` plays to the default output.
    pub engine_args: Vec<String>,
    /// Deadline for each call in milliseconds. `None` waits forever.
    pub call_timeout_ms: Option<u64>,
    /// Names treated as service scopes by the namespace router.
    pub scopes: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine_path: default_engine_path(),
            engine_args: vec!["-e".to_string(), "speaker".to_string()],
            call_timeout_ms: None,
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Config {
    /// Build from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("BASSBOX_PATH").filter(|p| !p.trim().is_empty()) {
            config.engine_path = PathBuf::from(path.trim());
        }

        if let Some(args) = lookup("BASSBOX_ARGS") {
            config.engine_args = args.split_whitespace().map(str::to_string).collect();
        }

        if let Some(raw) = lookup("BASSBOX_CALL_TIMEOUT_MS") {
            match raw.trim().parse::<u64>() {
                Ok(0) => config.call_timeout_ms = None,
                Ok(ms) => config.call_timeout_ms = Some(ms),
                Err(e) => warn!("Ignoring invalid BASSBOX_CALL_TIMEOUT_MS={}: {}", raw, e),
            }
        }

        if let Some(scopes) = lookup("BASSBOX_SCOPES") {
            config.scopes = scopes
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        config
    }

    /// Per-call deadline, if configured.
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}
