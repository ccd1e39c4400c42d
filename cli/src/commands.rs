//! Command handlers for CLI

use crate::ui;
use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use toldyou_core::{
    codec, ChannelNotifier, Config, DetachedTimestampFile, Notary, Storage, UpgradeWorker, UserId,
};

pub struct CommandHandler {
    config: Config,
    storage: Arc<Storage>,
    notary: Arc<Notary>,
}

impl CommandHandler {
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context(
            "configure a toldyou calendar with --calendar-url (TOLDYOU_CALENDAR_URL) \
             and a proof viewer with --verify-base-url (TOLDYOU_VERIFY_URL)",
        )?;

        let storage = Arc::new(
            Storage::open(&config.storage_path)
                .with_context(|| format!("opening {}", config.storage_path.display()))?,
        );
        let calendar = Arc::new(config.calendar()?);
        let notary = Arc::new(Notary::new(
            storage.clone(),
            calendar,
            config.verify_base_url.clone(),
        ));

        Ok(Self {
            config,
            storage,
            notary,
        })
    }

    pub async fn cmd_stamp(&self, user: UserId, username: Option<&str>, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            bail!("Nothing to stamp");
        }

        let id = self.notary.store_phrase(user, username, text).await?;
        ui::print_success(&format!("Stored record {}", id));

        let record = self
            .storage
            .get_record(id)?
            .context("record vanished right after storing it")?;
        let file = codec::deserialize(&record.stamp)?;
        if file.timestamp.frontier().is_none() {
            ui::print_warning(&format!(
                "{} did not acknowledge the commitment; it will be resubmitted on upgrade",
                self.config.calendar_url
            ));
        }
        ui::print_info(&self.notary.certificate(&record).to_string());
        Ok(())
    }

    pub async fn cmd_list(&self, user: UserId) -> Result<()> {
        let records = self.notary.records_for_user(user).await?;
        if records.is_empty() {
            ui::print_info(&format!("No records for user {}", user));
            return Ok(());
        }

        println!();
        for record in &records {
            ui::print_record(record, &self.notary.certificate(record));
        }
        Ok(())
    }

    pub async fn cmd_upgrade(&self) -> Result<()> {
        let (notifier, mut rx) = ChannelNotifier::new();
        let worker = UpgradeWorker::new(
            self.notary.clone(),
            Arc::new(notifier),
            self.config.upgrade_interval,
        );

        let (_shutdown_tx, mut shutdown) = watch::channel(false);
        let summary = worker.run_once(&mut shutdown).await;

        while let Ok(verified) = rx.try_recv() {
            ui::print_verified(&verified);
        }
        ui::print_summary(&summary);
        Ok(())
    }

    pub async fn cmd_watch(&self, interval: Option<Duration>) -> Result<()> {
        let interval = interval.unwrap_or(self.config.upgrade_interval);
        if interval.is_zero() {
            bail!("Upgrade interval must be positive");
        }

        let (notifier, mut rx) = ChannelNotifier::new();
        let handle = UpgradeWorker::new(self.notary.clone(), Arc::new(notifier), interval).spawn();

        ui::print_info(&format!(
            "Upgrading pending records every {}s, Ctrl-C to stop",
            interval.as_secs()
        ));

        loop {
            tokio::select! {
                verified = rx.recv() => match verified {
                    Some(verified) => ui::print_verified(&verified),
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => {
                    println!("{}", "^C".yellow());
                    break;
                }
            }
        }

        handle.shutdown().await;
        ui::print_success("Worker stopped");
        Ok(())
    }

    pub fn cmd_purge(&self, user: UserId, yes: bool) -> Result<()> {
        if !yes {
            ui::print_warning(&format!(
                "This deletes every record of user {}. Type YES to continue:",
                user
            ));
            print!("> ");
            io::stdout().flush()?;

            let mut answer = String::new();
            io::stdin().lock().read_line(&mut answer)?;
            if !confirmed(&answer) {
                ui::print_info("Aborted");
                return Ok(());
            }
        }

        let count = self.notary.delete_all(user)?;
        ui::print_success(&format!("Deleted {} record(s) of user {}", count, user));
        Ok(())
    }
}

/// Only an exact uppercase YES confirms a purge
pub fn confirmed(answer: &str) -> bool {
    answer.trim() == "YES"
}

/// Proof bytes from a file path or a hex string
pub fn load_proof(input: &str) -> Result<Vec<u8>> {
    let path = Path::new(input);
    if path.is_file() {
        return std::fs::read(path).with_context(|| format!("reading {}", path.display()));
    }

    hex::decode(input.trim()).context("argument is neither a proof file nor hex")
}

pub fn cmd_inspect(input: &str) -> Result<()> {
    let bytes = load_proof(input)?;
    let file: DetachedTimestampFile = codec::deserialize(&bytes)?;

    println!();
    println!("{}", file);

    let status = if file.timestamp.is_verified() {
        "Bitcoin verified".bright_green()
    } else if file.timestamp.frontier().is_some() {
        "Pending".yellow()
    } else {
        "Not acknowledged by any calendar".bright_red()
    };
    println!("{} {}", "Status:".bright_green(), status);
    Ok(())
}
