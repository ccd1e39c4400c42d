//! Notifications to the user-facing front end when a proof gets verified

use crate::types::UserId;
use crate::{Error, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// A record whose proof just became Bitcoin verified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified {
    pub user_id: UserId,
    pub text: String,
    pub link: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_user_verified(
        &self,
        user_id: UserId,
        original_text: &str,
        verification_link: &str,
    ) -> Result<()>;
}

/// Forwards notifications over a channel to whoever renders them
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Verified>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Verified>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify_user_verified(
        &self,
        user_id: UserId,
        original_text: &str,
        verification_link: &str,
    ) -> Result<()> {
        self.tx
            .send(Verified {
                user_id,
                text: original_text.to_string(),
                link: verification_link.to_string(),
            })
            .map_err(|_| Error::Other(anyhow::anyhow!("Notification receiver dropped")))
    }
}

/// Only logs; for running the worker without a front end
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_user_verified(
        &self,
        user_id: UserId,
        original_text: &str,
        verification_link: &str,
    ) -> Result<()> {
        tracing::info!(
            user_id = %user_id,
            text = %original_text,
            link = %verification_link,
            "Record verified"
        );
        Ok(())
    }
}
