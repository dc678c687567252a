//! `taskboard` command-line client.
//!
//! Configuration via CLI flags, environment variables, or config file
//! (`~/.config/taskboard/config.toml`). Logs go to a file.
//!
//! ```bash
//! # Get an identity once
//! cargo run --bin taskboard -- new-id
//!
//! # Create a project and watch its board
//! export TASKBOARD_USER=<id> TASKBOARD_EMAIL=alice@example.com
//! cargo run --bin taskboard -- new-project "Launch"
//! cargo run --bin taskboard -- projects
//! cargo run --bin taskboard -- watch <project-id>
//!
//! # From another terminal
//! cargo run --bin taskboard -- create <project-id> "Write docs"
//! cargo run --bin taskboard -- move <project-id> <task-id> done
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use taskboard::board::BoardError;
use taskboard::config::{CliArgs, ClientConfig, Command, ConfigError};
use taskboard::sync::BoardSync;
use taskboard::transport::{ChannelClient, TransportError};
use taskboard_proto::task::{ProjectId, TaskDraft, TaskId, TaskStatus, UserId};
use taskboard_proto::wire::GatewayError;

/// Errors surfaced to the user by the CLI.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not connect: {0}")]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Board(#[from] BoardError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("invalid {what} '{value}'")]
    InvalidArgument { what: &'static str, value: String },
    #[error("no command given (try --help)")]
    NoCommand,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = init_logging(&config.log_level, &config.log_file);
    tracing::info!(server_url = %config.server_url, "taskboard starting");

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown so buffered
/// entries are flushed.
fn init_logging(level: &str, log_path: &Path) -> Option<WorkerGuard> {
    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

async fn run(command: Option<Command>, config: &ClientConfig) -> Result<(), CliError> {
    let command = command.ok_or(CliError::NoCommand)?;
    if command == Command::NewId {
        println!("{}", UserId::new());
        return Ok(());
    }

    let session = config.session()?;
    let client = Arc::new(ChannelClient::connect(&session, config.connect_timeout).await?);
    let open_board = |project: &str| -> Result<Arc<BoardSync<ChannelClient>>, CliError> {
        let project_id = parse_arg::<ProjectId>("project id", project)?;
        Ok(Arc::new(
            BoardSync::new(&session, project_id, Arc::clone(&client))
                .with_deadline(config.request_timeout),
        ))
    };

    match command {
        Command::NewId => {}
        Command::Projects => {
            for project in client.list_projects().await? {
                println!(
                    "{}  {}  ({} members)",
                    project.project_id, project.name, project.member_count
                );
            }
        }
        Command::NewProject { name } => {
            let project_id = client.create_project(&name).await?;
            println!("{project_id}");
        }
        Command::Invite { project, email } => {
            let project_id = parse_arg::<ProjectId>("project id", &project)?;
            let member = client.invite_member(project_id, &email).await?;
            println!("added {} ({})", member.email, member.user_id);
        }
        Command::Board { project } => {
            let board = open_board(&project)?;
            print!("{}", board.load().await?);
        }
        Command::Export { project } => {
            let board = open_board(&project)?;
            println!("{}", board.load().await?.export_json()?);
        }
        Command::Watch { project } => {
            let board = open_board(&project)?;
            board.on_board_changed(|view| {
                println!("{view}");
            });
            let token = board.attach(&*client).await?;
            board.load().await?;
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for Ctrl-C");
            }
            board.detach(&*client, token).await?;
        }
        Command::Create {
            project,
            title,
            status,
            description,
            assignee,
        } => {
            let board = open_board(&project)?;
            let mut draft = TaskDraft::new(board.project_id(), title);
            draft.status = status
                .as_deref()
                .map(|s| parse_arg::<TaskStatus>("status", s))
                .transpose()?;
            draft.assignee = assignee
                .as_deref()
                .map(|a| parse_arg::<UserId>("assignee", a))
                .transpose()?;
            draft.description = description;
            let task = board.submit_create(draft).await?;
            println!("{}", task.id);
        }
        Command::Move { project, task, over } => {
            let board = open_board(&project)?;
            let task_id = parse_arg::<TaskId>("task id", &task)?;
            board.load().await?;
            let outcome = board.submit_drop(task_id, &over).await?;
            println!("{outcome}");
        }
        Command::Delete { project, task } => {
            let board = open_board(&project)?;
            let task_id = parse_arg::<TaskId>("task id", &task)?;
            board.submit_delete(task_id).await?;
            println!("deleted {task_id}");
        }
        Command::DeleteProject { project } => {
            let project_id = parse_arg::<ProjectId>("project id", &project)?;
            client.delete_project(project_id).await?;
            println!("deleted project {project_id}");
        }
        Command::RenameProject { project, name } => {
            let project_id = parse_arg::<ProjectId>("project id", &project)?;
            let renamed = client.rename_project(project_id, &name).await?;
            println!("renamed {} to {}", renamed.project_id, renamed.name);
        }
        Command::SearchUsers { query } => {
            for user in client.search_users(&query).await? {
                println!("{}  {}", user.user_id, user.email);
            }
        }
    }

    client.close().await;
    session.logout();
    Ok(())
}

fn parse_arg<T: FromStr>(what: &'static str, value: &str) -> Result<T, CliError> {
    value.parse().map_err(|_| CliError::InvalidArgument {
        what,
        value: value.to_string(),
    })
}
