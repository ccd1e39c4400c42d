//! Runtime configuration

use crate::calendar::RemoteCalendar;
use crate::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Hosts that speak the OpenTimestamps wire format, which cannot carry
/// toldyou proofs
const OPENTIMESTAMPS_DOMAIN: &str = "opentimestamps.org";

/// Notary configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Storage directory
    pub storage_path: PathBuf,

    /// Calendar server base URL. There is no default: the server must speak
    /// the toldyou proof format.
    pub calendar_url: String,

    /// Bound on every calendar request
    pub calendar_timeout: Duration,

    /// Pause between upgrade passes
    pub upgrade_interval: Duration,

    /// Prefix of the public verification link, a page that decodes toldyou
    /// proofs given as hex
    pub verify_base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("./toldyou-data"),
            calendar_url: String::new(),
            calendar_timeout: Duration::from_secs(10),
            upgrade_interval: Duration::from_secs(600),
            verify_base_url: String::new(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let url = self.calendar_url.trim();
        if url.is_empty() {
            return Err(Error::Config("calendar URL is not set".to_string()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "calendar URL must be http(s): {}",
                self.calendar_url
            )));
        }
        if is_opentimestamps_host(url) {
            return Err(Error::Config(format!(
                "{} serves OpenTimestamps proofs, not toldyou proofs",
                url
            )));
        }

        let verify = self.verify_base_url.trim();
        if verify.is_empty() {
            return Err(Error::Config("verification base URL is not set".to_string()));
        }
        if is_opentimestamps_host(verify) {
            return Err(Error::Config(format!(
                "{} cannot decode toldyou proofs",
                verify
            )));
        }

        if self.calendar_timeout.is_zero() {
            return Err(Error::Config("calendar timeout must be positive".to_string()));
        }
        if self.upgrade_interval.is_zero() {
            return Err(Error::Config("upgrade interval must be positive".to_string()));
        }
        Ok(())
    }

    /// HTTP calendar client for the configured server
    pub fn calendar(&self) -> Result<RemoteCalendar> {
        self.validate()?;
        RemoteCalendar::new(self.calendar_url.trim(), self.calendar_timeout)
    }
}

fn is_opentimestamps_host(url: &str) -> bool {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = authority
        .rsplit('@')
        .next()
        .unwrap_or_default()
        .split(':')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    host == OPENTIMESTAMPS_DOMAIN || host.ends_with(&format!(".{}", OPENTIMESTAMPS_DOMAIN))
}
