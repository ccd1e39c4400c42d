//! Calendar server client
//!
//! A calendar aggregates submitted digests into a Merkle tree and commits its
//! root to Bitcoin. Submitting returns a pending proof (or a deferred token);
//! once the block is mined the complete proof can be fetched by digest.

use crate::codec;
use crate::timestamp::Timestamp;
use crate::version;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

/// Accept header value understood by calendar servers
pub const CALENDAR_ACCEPT: &str = "application/vnd.opentimestamps.v1";

/// Largest response body accepted from a calendar
pub const MAX_RESPONSE_SIZE: usize = 10_000;

/// Outcome of submitting a digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// The calendar answered with a proof rooted at the submitted digest
    Immediate(Timestamp),

    /// The calendar accepted the digest but has nothing to return yet
    Deferred(String),
}

/// Remote aggregation service
#[async_trait]
pub trait Calendar: Send + Sync {
    /// Base URL, used for logging
    fn url(&self) -> &str;

    async fn submit(&self, digest: &[u8]) -> Result<Submission>;

    /// Fails with [`Error::CommitmentNotFound`] until the calendar holds a
    /// completed proof for `digest`
    async fn get_timestamp(&self, digest: &[u8]) -> Result<Timestamp>;
}

/// HTTP(S) calendar client
pub struct RemoteCalendar {
    url: String,
    client: reqwest::Client,
}

impl RemoteCalendar {
    /// Every request made by this client is bounded by `timeout`
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = url.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(version::user_agent())
            .build()
            .map_err(|e| Error::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { url, client })
    }

    /// Read the body chunk by chunk, giving up as soon as it passes
    /// [`MAX_RESPONSE_SIZE`]
    async fn read_body(mut response: reqwest::Response) -> Result<Vec<u8>> {
        if let Some(len) = response.content_length() {
            if len as usize > MAX_RESPONSE_SIZE {
                return Err(oversized(len as usize));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::Transport(format!("Failed to read calendar response: {}", e)))?
        {
            if body.len() + chunk.len() > MAX_RESPONSE_SIZE {
                return Err(oversized(body.len() + chunk.len()));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    fn decode_rooted(body: &[u8], digest: &[u8]) -> Result<Timestamp> {
        let timestamp = codec::decode_timestamp(body)?;
        if timestamp.msg() != digest {
            return Err(Error::MalformedProof(format!(
                "calendar returned proof for {} instead of {}",
                hex::encode(timestamp.msg()),
                hex::encode(digest)
            )));
        }
        Ok(timestamp)
    }
}

fn oversized(len: usize) -> Error {
    Error::MalformedProof(format!(
        "calendar response of at least {} bytes exceeds {}",
        len, MAX_RESPONSE_SIZE
    ))
}

#[async_trait]
impl Calendar for RemoteCalendar {
    fn url(&self) -> &str {
        &self.url
    }

    async fn submit(&self, digest: &[u8]) -> Result<Submission> {
        let submit_url = format!("{}/digest", self.url);

        let response = self
            .client
            .post(&submit_url)
            .header(ACCEPT, CALENDAR_ACCEPT)
            .body(digest.to_vec())
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Failed to submit to {}: {}", self.url, e)))?;

        match response.status() {
            StatusCode::OK => {
                let body = Self::read_body(response).await?;
                let timestamp = Self::decode_rooted(&body, digest)?;
                debug!(calendar = %self.url, "Calendar returned an immediate proof");
                Ok(Submission::Immediate(timestamp))
            }
            StatusCode::ACCEPTED => {
                let body = Self::read_body(response).await?;
                let token = String::from_utf8_lossy(&body).trim().to_string();
                debug!(calendar = %self.url, token = %token, "Calendar deferred the submission");
                Ok(Submission::Deferred(token))
            }
            status => Err(Error::Transport(format!(
                "Calendar {} rejected submission: {}",
                self.url, status
            ))),
        }
    }

    async fn get_timestamp(&self, digest: &[u8]) -> Result<Timestamp> {
        let fetch_url = format!("{}/timestamp/{}", self.url, hex::encode(digest));

        let response = self
            .client
            .get(&fetch_url)
            .header(ACCEPT, CALENDAR_ACCEPT)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Failed to query {}: {}", self.url, e)))?;

        match response.status() {
            StatusCode::OK => {
                let body = Self::read_body(response).await?;
                Self::decode_rooted(&body, digest)
            }
            StatusCode::NOT_FOUND => Err(Error::CommitmentNotFound),
            status => Err(Error::Transport(format!(
                "Calendar {} answered {} for {}",
                self.url,
                status,
                hex::encode(digest)
            ))),
        }
    }
}
