use crate::refresh::ScanSchedule;
use crate::serve::HEALTH_PATH;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// System skills bundled with the npm package on Homebrew installs.
const DEFAULT_SYSTEM_SKILLS_DIR: &str = "/opt/homebrew/lib/node_modules/openclaw/skills";

/// Optional configuration file (`--config`), TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub web: WebConfig,
    pub openclaw: OpenclawConfig,
    pub scan: ScanConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub listen_address: String,
    pub telemetry_path: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct OpenclawConfig {
    /// Workspace directory.
    pub dir: Option<PathBuf>,
    /// Home directory (default `~/.openclaw`).
    pub home: Option<PathBuf>,
    /// System-level skills directory.
    pub skills_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

// --- Default implementations ---

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen_address: ":9101".to_string(),
            telemetry_path: "/metrics".to_string(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            timeout_secs: 10,
        }
    }
}

impl FileConfig {
    /// Load and parse a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Values given on the command line (or through their environment
/// variables), which take precedence over the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub listen_address: Option<String>,
    pub telemetry_path: Option<String>,
    pub dir: Option<PathBuf>,
    pub home: Option<PathBuf>,
    pub interval_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
}

/// Fully resolved exporter settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ExporterConfig {
    /// Socket address to bind, e.g. `0.0.0.0:9101`.
    pub listen_address: String,
    pub telemetry_path: String,
    pub workspace: PathBuf,
    pub home: PathBuf,
    pub user_skills_dir: Option<PathBuf>,
    pub system_skills_dir: Option<PathBuf>,
    pub schedule: ScanSchedule,
}

impl ExporterConfig {
    /// Merge overrides, file config and environment.
    ///
    /// `env` looks up process environment variables; empty values count as
    /// unset.
    pub fn resolve(
        overrides: Overrides,
        file: FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let env = |key: &str| env(key).filter(|v| !v.is_empty());
        let home_env = env("HOME").map(PathBuf::from);

        let workspace = non_empty(overrides.dir)
            .or(non_empty(file.openclaw.dir))
            .ok_or(ConfigError::MissingWorkspace)?;

        let home = non_empty(overrides.home)
            .or(non_empty(file.openclaw.home))
            .or_else(|| home_env.as_ref().map(|h| h.join(".openclaw")))
            .ok_or(ConfigError::MissingHome)?;

        let user_skills_dir = home_env.as_ref().map(|h| h.join(".openclaw").join("skills"));

        let system_skills_dir = env("OPENCLAW_SKILLS_DIR")
            .map(PathBuf::from)
            .or(non_empty(file.openclaw.skills_dir))
            .or_else(default_system_skills_dir);

        let interval_secs = overrides.interval_secs.unwrap_or(file.scan.interval_secs);
        let timeout_secs = overrides.timeout_secs.unwrap_or(file.scan.timeout_secs);
        if interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "scan.interval",
                reason: "must be at least 1 second".to_string(),
            });
        }
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "scan.timeout",
                reason: "must be at least 1 second".to_string(),
            });
        }

        let telemetry_path = overrides
            .telemetry_path
            .unwrap_or(file.web.telemetry_path);
        if !telemetry_path.starts_with('/') || telemetry_path == "/" {
            return Err(ConfigError::Invalid {
                field: "web.telemetry-path",
                reason: format!("{telemetry_path:?} must start with '/' and not be the root"),
            });
        }
        if telemetry_path == HEALTH_PATH {
            return Err(ConfigError::Invalid {
                field: "web.telemetry-path",
                reason: format!("{HEALTH_PATH} is reserved for the health endpoint"),
            });
        }

        let listen_address = normalize_listen_address(
            &overrides
                .listen_address
                .unwrap_or(file.web.listen_address),
        );

        Ok(Self {
            listen_address,
            telemetry_path,
            workspace,
            home,
            user_skills_dir,
            system_skills_dir,
            schedule: ScanSchedule {
                interval: Duration::from_secs(interval_secs),
                timeout: Duration::from_secs(timeout_secs),
            },
        })
    }
}

fn non_empty(path: Option<PathBuf>) -> Option<PathBuf> {
    path.filter(|p| !p.as_os_str().is_empty())
}

/// The Homebrew location is only probed on macOS.
fn default_system_skills_dir() -> Option<PathBuf> {
    if cfg!(target_os = "macos") {
        Some(PathBuf::from(DEFAULT_SYSTEM_SKILLS_DIR))
    } else {
        None
    }
}

/// `:9101` binds every interface, as in other Prometheus exporters.
fn normalize_listen_address(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}

/// Startup configuration errors. All of them are fatal.
#[derive(Debug)]
pub enum ConfigError {
    MissingWorkspace,
    MissingHome,
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    Invalid {
        field: &'static str,
        reason: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingWorkspace => write!(
                f,
                "openclaw.dir must be specified via flag, OPENCLAW_DIR environment variable, or config file"
            ),
            ConfigError::MissingHome => write!(
                f,
                "openclaw.home is not set and HOME is unavailable to derive ~/.openclaw"
            ),
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
            ConfigError::Invalid { field, reason } => write!(f, "invalid {field}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}
