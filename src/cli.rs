//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// `CollabTodo` login and session tool
#[derive(Parser, Debug)]
#[command(name = "collabtodo-auth")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "COLLABTODO_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "warn",
        env = "COLLABTODO_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "COLLABTODO_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in through the browser and store tokens
    Login {
        /// Do not start the loopback listener; paste the callback URL instead
        #[arg(long)]
        manual: bool,
    },

    /// Show whether a session is active and when it expires
    Status,

    /// Refresh tokens now if they are close to expiry
    Refresh,

    /// Print a stored token
    Token {
        /// Which token to print
        #[arg(short, long, value_enum, default_value_t = TokenKind::Id)]
        kind: TokenKind,
    },

    /// Call `GET /v1/me` with the current session
    Me,

    /// Create a list through the API
    CreateList {
        /// List title
        #[arg(required = true)]
        title: String,

        /// Optional description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Clear the session and print the provider logout URL
    Logout,
}

/// Token selector for [`Command::Token`]
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// ID token (used as the API bearer credential)
    Id,
    /// Access token
    Access,
}
