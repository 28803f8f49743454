//! Command-line front end for taskpad.
//!
//! # Responsibility
//! - Map one invocation to one event turn on the task list service.
//! - Own process setup: database path, logging directory and level.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use taskpad_core::db::open_db;
use taskpad_core::{
    core_version, default_log_level, init_logging, ping, CommandOutcome, Filter, KeyValueStore,
    SqliteStore, TaskCommand, TaskId, TaskListService,
};

#[derive(Parser, Debug)]
#[command(name = "taskpad", version, about = "Single-list to-do manager")]
struct Cli {
    /// SQLite file holding the task list
    #[arg(long, env = "TASKPAD_DB", default_value = "taskpad.sqlite3", global = true)]
    db: PathBuf,
    /// Directory for rolling log files; logging is off when unset
    #[arg(long, env = "TASKPAD_LOG_DIR", global = true)]
    log_dir: Option<PathBuf>,
    /// trace|debug|info|warn|error
    #[arg(long, env = "TASKPAD_LOG_LEVEL", global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add a task
    Add { text: String },
    /// List tasks
    List {
        #[arg(long, default_value_t = Filter::All)]
        filter: Filter,
        /// Print the visible tasks as JSON
        #[arg(long)]
        json: bool,
    },
    /// Flip a task between active and completed
    Toggle { id: TaskId },
    /// Replace a task's text; blank text keeps the old one
    Edit { id: TaskId, text: String },
    /// Delete a task
    Remove { id: TaskId },
    /// Delete every completed task
    ClearCompleted,
    /// Check core and database wiring
    Ping,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    setup_logging(cli.log_dir.as_deref(), cli.log_level.as_deref())?;

    let conn = open_db(&cli.db)
        .with_context(|| format!("failed to open task database `{}`", cli.db.display()))?;
    let mut service = TaskListService::initialize(SqliteStore::new(&conn));

    match cli.command {
        Command::Add { text } => {
            let outcomes =
                service.dispatch_turn([TaskCommand::SetDraft(text), TaskCommand::SubmitDraft])?;
            match outcomes.last() {
                Some(CommandOutcome::Added(id)) => println!("added #{id}"),
                _ => println!("nothing added: task text is empty"),
            }
        }
        Command::List { filter, json } => {
            service.set_filter(filter);
            print_list(&service, json)?;
        }
        Command::Toggle { id } => {
            if let Some(CommandOutcome::Toggled { id, completed }) =
                service.dispatch_turn([TaskCommand::Toggle(id)])?.pop()
            {
                let state = if completed { "completed" } else { "active" };
                println!("#{id} is now {state}");
            }
        }
        Command::Edit { id, text } => {
            let outcomes = service.dispatch_turn([
                TaskCommand::BeginEdit(id),
                TaskCommand::SetEditText(text),
                TaskCommand::CommitEdit(id),
            ])?;
            match outcomes.last() {
                Some(CommandOutcome::EditCommitted { changed: true, .. }) => {
                    println!("updated #{id}")
                }
                _ => println!("#{id} unchanged"),
            }
        }
        Command::Remove { id } => {
            if let Some(CommandOutcome::Removed(task)) =
                service.dispatch_turn([TaskCommand::Remove(id)])?.pop()
            {
                println!("removed #{}", task.id);
            }
        }
        Command::ClearCompleted => {
            if let Some(CommandOutcome::Cleared(removed)) =
                service.dispatch_turn([TaskCommand::ClearCompleted])?.pop()
            {
                println!("cleared {removed} completed task(s)");
            }
        }
        Command::Ping => {
            println!("taskpad_core ping={}", ping());
            println!("taskpad_core version={}", core_version());
            println!("tasks={}", service.len());
        }
    }

    Ok(())
}

fn setup_logging(log_dir: Option<&Path>, level: Option<&str>) -> Result<()> {
    let Some(log_dir) = log_dir else {
        return Ok(());
    };
    let log_dir = std::path::absolute(log_dir)
        .with_context(|| format!("invalid log directory `{}`", log_dir.display()))?;
    let level = level
        .map(str::to_string)
        .unwrap_or_else(|| default_log_level().to_string());

    init_logging(&level, &log_dir.to_string_lossy()).map_err(|err| anyhow!("{err}"))?;
    info!("event=cli_start module=cli status=ok");
    Ok(())
}

fn print_list<S: KeyValueStore>(service: &TaskListService<S>, json: bool) -> Result<()> {
    if json {
        let tasks: Vec<_> = service.visible().map(|(_, task)| task).collect();
        println!("{}", serde_json::to_string_pretty(&tasks)?);
        return Ok(());
    }

    for (id, task) in service.visible() {
        let mark = if task.completed { "x" } else { " " };
        println!("[{mark}] {id:>3}  {}", task.text);
    }

    let counts = service.counts();
    println!(
        "{} task(s): {} active, {} completed (showing {})",
        counts.all,
        counts.active,
        counts.completed,
        service.filter()
    );
    if service.has_completed() {
        println!("run `taskpad clear-completed` to remove completed tasks");
    }
    Ok(())
}
