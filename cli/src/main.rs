//! toldyou CLI - timestamp phrases now, prove them later
//!
//! Usage:
//!   export TOLDYOU_CALENDAR_URL=https://calendar.example
//!   export TOLDYOU_VERIFY_URL=https://calendar.example/verify?
//!   toldyou stamp --user 42 "It will rain tomorrow"
//!   toldyou list --user 42
//!   toldyou watch --interval-secs 600

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use toldyou_core::{Config, UserId};
use tracing::info;

mod commands;
mod ui;

use commands::CommandHandler;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Data directory
    #[arg(short, long, env = "TOLDYOU_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Calendar server base URL
    #[arg(long, env = "TOLDYOU_CALENDAR_URL")]
    calendar_url: Option<String>,

    /// Timeout for every calendar request, in seconds
    #[arg(long, env = "TOLDYOU_CALENDAR_TIMEOUT", default_value_t = 10)]
    calendar_timeout_secs: u64,

    /// Prefix of the public verification link
    #[arg(long, env = "TOLDYOU_VERIFY_URL")]
    verify_base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Timestamp a phrase for a user
    Stamp {
        #[arg(short, long, allow_negative_numbers = true)]
        user: i64,

        /// Display name stored with the record
        #[arg(long)]
        username: Option<String>,

        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Show a user's records, upgrading pending proofs first
    List {
        #[arg(short, long, allow_negative_numbers = true)]
        user: i64,
    },

    /// Run a single upgrade pass over all pending records
    Upgrade,

    /// Keep upgrading pending records until Ctrl-C
    Watch {
        /// Seconds between passes
        #[arg(long, env = "TOLDYOU_UPGRADE_INTERVAL")]
        interval_secs: Option<u64>,
    },

    /// Delete every record of a user
    Purge {
        #[arg(short, long, allow_negative_numbers = true)]
        user: i64,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Decode a proof given as hex or as a file path
    Inspect { proof: String },
}

impl Args {
    fn config(&self) -> Config {
        let mut config = Config {
            calendar_url: self.calendar_url.clone().unwrap_or_default(),
            calendar_timeout: Duration::from_secs(self.calendar_timeout_secs),
            verify_base_url: self.verify_base_url.clone().unwrap_or_default(),
            ..Default::default()
        };
        if let Some(data_dir) = &self.data_dir {
            config.storage_path = data_dir.clone();
        }
        if let Command::Watch {
            interval_secs: Some(secs),
        } = self.command
        {
            config.upgrade_interval = Duration::from_secs(secs);
        }
        config
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        ui::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    if let Command::Inspect { proof } = &args.command {
        return commands::cmd_inspect(proof);
    }

    let config = args.config();
    info!("Using config: {:?}", config);

    ui::print_banner();
    let handler = CommandHandler::new(config)?;

    match args.command {
        Command::Stamp {
            user,
            username,
            text,
        } => {
            handler
                .cmd_stamp(UserId(user), username.as_deref(), &text.join(" "))
                .await
        }
        Command::List { user } => handler.cmd_list(UserId(user)).await,
        Command::Upgrade => handler.cmd_upgrade().await,
        Command::Watch { interval_secs } => {
            handler
                .cmd_watch(interval_secs.map(Duration::from_secs))
                .await
        }
        Command::Purge { user, yes } => handler.cmd_purge(UserId(user), yes),
        Command::Inspect { .. } => Ok(()),
    }
}
