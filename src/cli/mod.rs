//! CLI command definitions for taskdeck.
//!
//! `serve` runs the API server; every other subcommand is a client of a
//! running server and keeps its session cookies between invocations.

pub mod tasks;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::format::OutputFormat;
use tasks::{EditArgs, ListArgs};

/// File in the user config directory holding the CLI's session cookies.
pub const SESSION_FILE: &str = "session.json";

/// Taskdeck API server and command-line client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<PathBuf>,

    /// Base URL of the API server (overrides config)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Output format for client commands
    #[arg(short, long, value_enum, default_value_t, global = true)]
    pub format: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the API server (default if no subcommand given)
    Serve(ServeArgs),

    /// Create an account and start a session
    Register(RegisterArgs),

    /// Start a session
    Login(LoginArgs),

    /// End the current session
    Logout,

    /// Show the signed-in user
    Whoami,

    /// List tasks
    List(ListArgs),

    /// Add a task
    Add {
        /// Task title (words are joined with spaces)
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
    },

    /// Change a task's title or status
    Edit(EditArgs),

    /// Mark a task done (no change if it already is)
    Done {
        /// Task id
        id: i64,
    },

    /// Flip a task between pending and done
    Toggle {
        /// Task id
        id: i64,
    },

    /// Delete a task
    Rm {
        /// Task id
        id: i64,
    },
}

/// Arguments for the serve subcommand
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Interface to bind (overrides config)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Arguments for the register subcommand
#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// Display name (at least 2 characters)
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub email: String,

    /// Password (at least 6 characters)
    #[arg(long)]
    pub password: String,
}

/// Arguments for the login subcommand
#[derive(Args, Debug)]
pub struct LoginArgs {
    #[arg(long)]
    pub email: String,

    #[arg(long)]
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskStatus;

    #[test]
    fn no_subcommand_parses() {
        let cli = Cli::try_parse_from(["taskdeck"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log, "2");
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn list_flags_parse() {
        let cli = Cli::try_parse_from([
            "taskdeck", "list", "--status", "done", "--search", "milk", "--page", "2",
        ])
        .unwrap();
        match cli.command {
            Some(Command::List(args)) => {
                assert_eq!(args.status, Some(TaskStatus::Done));
                assert_eq!(args.search.as_deref(), Some("milk"));
                assert_eq!(args.page, 2);
                assert_eq!(args.limit, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn add_joins_words() {
        let cli = Cli::try_parse_from(["taskdeck", "add", "Buy", "milk"]).unwrap();
        match cli.command {
            Some(Command::Add { title }) => assert_eq!(title.join(" "), "Buy milk"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn done_and_toggle_are_distinct() {
        let cli = Cli::try_parse_from(["taskdeck", "done", "3"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Done { id: 3 })));
        let cli = Cli::try_parse_from(["taskdeck", "toggle", "3"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Toggle { id: 3 })));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["taskdeck", "whoami", "--api-url", "http://x:1", "-f", "json"])
            .unwrap();
        assert_eq!(cli.api_url.as_deref(), Some("http://x:1"));
        assert_eq!(cli.format, OutputFormat::Json);
    }
}
