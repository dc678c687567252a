//! Configuration for the taskboard client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskboard/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use taskboard_proto::task::UserId;

use crate::session::Session;
use crate::transport::channel::validate_url;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// A setting has an unusable value.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Offending setting.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// A setting needed to log in is absent.
    #[error("missing {0} (set it on the command line or under [client] in the config file)")]
    Missing(&'static str),
}

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    client: ClientFileConfig,
}

/// `[client]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ClientFileConfig {
    server_url: Option<String>,
    user_id: Option<String>,
    email: Option<String>,
    connect_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    log_file: Option<PathBuf>,
}

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server WebSocket URL.
    pub server_url: String,
    /// Identity used to log in.
    pub user_id: Option<UserId>,
    /// Email registered for the identity.
    pub email: Option<String>,
    /// Timeout for connecting and identifying.
    pub connect_timeout: Duration,
    /// Deadline for each authoritative request.
    pub request_timeout: Duration,
    /// Log level filter string.
    pub log_level: String,
    /// Log file path.
    pub log_file: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:9100/ws".to_string(),
            user_id: None,
            email: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            log_level: "info".to_string(),
            log_file: std::env::temp_dir().join("taskboard.log"),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, or a value is malformed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let server_url = cli
            .server_url
            .clone()
            .or_else(|| file.client.server_url.clone())
            .unwrap_or(defaults.server_url);
        validate_url(&server_url).map_err(|e| ConfigError::InvalidValue {
            field: "server_url",
            reason: e.to_string(),
        })?;

        let user_id = cli
            .user_id
            .as_deref()
            .or(file.client.user_id.as_deref())
            .map(|raw| {
                raw.parse::<UserId>().map_err(|e| ConfigError::InvalidValue {
                    field: "user_id",
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let email = cli.email.clone().or_else(|| file.client.email.clone());
        if email.as_deref().is_some_and(|e| !e.contains('@')) {
            return Err(ConfigError::InvalidValue {
                field: "email",
                reason: "expected an address like name@example.com".to_string(),
            });
        }

        let request_timeout = cli
            .request_timeout_secs
            .or(file.client.request_timeout_secs)
            .map_or(defaults.request_timeout, Duration::from_secs);
        if request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_secs",
                reason: "must be at least one second".to_string(),
            });
        }

        Ok(Self {
            server_url,
            user_id,
            email,
            connect_timeout: file
                .client
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            request_timeout,
            log_level: cli.log_level.clone(),
            log_file: cli
                .log_file
                .clone()
                .or_else(|| file.client.log_file.clone())
                .unwrap_or(defaults.log_file),
        })
    }

    /// Builds a login session from the configured identity.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if the user id or email is unset.
    pub fn session(&self) -> Result<Session, ConfigError> {
        let user_id = self.user_id.ok_or(ConfigError::Missing("user_id"))?;
        let email = self.email.clone().ok_or(ConfigError::Missing("email"))?;
        Ok(Session::new(user_id, email, self.server_url.clone()))
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Real-time Kanban task board")]
pub struct CliArgs {
    /// WebSocket URL of the taskboard server.
    #[arg(long, env = "TASKBOARD_SERVER")]
    pub server_url: Option<String>,

    /// Your user id (generate one with `taskboard new-id`).
    #[arg(long, env = "TASKBOARD_USER")]
    pub user_id: Option<String>,

    /// Your email address.
    #[arg(long, env = "TASKBOARD_EMAIL")]
    pub email: Option<String>,

    /// Path to config file (default: `~/.config/taskboard/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Deadline for each server request in seconds.
    #[arg(long)]
    pub request_timeout_secs: Option<u64>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKBOARD_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/taskboard.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// What to do.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Client subcommands.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print a fresh user id.
    NewId,
    /// List the projects you own or belong to.
    Projects,
    /// Create a project owned by you.
    NewProject {
        /// Project name.
        name: String,
    },
    /// Add a registered user to a project.
    Invite {
        /// Project id.
        project: String,
        /// Email of the user to add.
        email: String,
    },
    /// Print a project's board.
    Board {
        /// Project id.
        project: String,
    },
    /// Print the board and reprint it on every live update until Ctrl-C.
    Watch {
        /// Project id.
        project: String,
    },
    /// Create a task.
    Create {
        /// Project id.
        project: String,
        /// Task title.
        title: String,
        /// Initial column (todo, in_progress, done).
        #[arg(long)]
        status: Option<String>,
        /// Longer description.
        #[arg(long)]
        description: Option<String>,
        /// User id of the assignee.
        #[arg(long)]
        assignee: Option<String>,
    },
    /// Drop a task over a column key or another task.
    Move {
        /// Project id.
        project: String,
        /// Task id.
        task: String,
        /// Column key or task id to drop over.
        over: String,
    },
    /// Delete a task.
    Delete {
        /// Project id.
        project: String,
        /// Task id.
        task: String,
    },
    /// Print a project's board as JSON.
    Export {
        /// Project id.
        project: String,
    },
    /// Delete a project you own.
    DeleteProject {
        /// Project id.
        project: String,
    },
    /// Rename a project you own.
    RenameProject {
        /// Project id.
        project: String,
        /// New name.
        name: String,
    },
    /// Find registered users by email.
    SearchUsers {
        /// Email fragment, matched without regard to case.
        query: String,
    },
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist.
/// Otherwise the default path is tried and a missing file is treated as
/// empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("taskboard").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
