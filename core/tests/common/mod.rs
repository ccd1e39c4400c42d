//! Local calendar server for integration tests
//!
//! Speaks the calendar HTTP protocol on 127.0.0.1 with answers scripted by
//! the test.

#![allow(dead_code)]

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use toldyou_core::{codec, Attestation, Op, RemoteCalendar, Timestamp};

pub const PENDING_URI: &str = "https://fake.calendar.test";

/// Initialize logging for tests (call once per test)
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    /// 200 with a pending proof
    Immediate,
    /// 202 with a token
    Deferred,
    /// 200 with a pending proof in OpenTimestamps serialization
    OpenTimestamps,
    /// 500
    Reject,
}

struct CalendarState {
    mode: Mutex<SubmitMode>,
    delay: Mutex<Option<Duration>>,
    proofs: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
    submissions: Mutex<Vec<Vec<u8>>>,
    headers: Mutex<Option<HeaderMap>>,
}

pub struct FakeCalendar {
    pub url: String,
    state: Arc<CalendarState>,
}

impl FakeCalendar {
    pub async fn start() -> Self {
        let state = Arc::new(CalendarState {
            mode: Mutex::new(SubmitMode::Immediate),
            delay: Mutex::new(None),
            proofs: Mutex::new(HashMap::new()),
            submissions: Mutex::new(Vec::new()),
            headers: Mutex::new(None),
        });

        let app = Router::new()
            .route("/digest", post(submit))
            .route("/timestamp/:digest", get(timestamp))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{}", addr),
            state,
        }
    }

    pub fn client(&self) -> RemoteCalendar {
        self.client_with_timeout(Duration::from_secs(5))
    }

    pub fn client_with_timeout(&self, timeout: Duration) -> RemoteCalendar {
        RemoteCalendar::new(self.url.clone(), timeout).unwrap()
    }

    pub fn set_mode(&self, mode: SubmitMode) {
        *self.state.mode.lock().unwrap() = mode;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock().unwrap() = Some(delay);
    }

    /// Serve a Bitcoin-anchored proof for `digest`
    pub fn confirm(&self, digest: &[u8], height: u64) {
        let mut proof = Timestamp::new(digest.to_vec());
        proof
            .add_op(Op::Append(b"merkle sibling".to_vec()))
            .unwrap()
            .add_op(Op::sha256())
            .unwrap()
            .add_attestation(Attestation::BitcoinBlockHeader { height });
        self.publish_raw(digest, codec::encode_timestamp(&proof));
    }

    /// Serve `body` verbatim for `digest`
    pub fn publish_raw(&self, digest: &[u8], body: Vec<u8>) {
        self.state
            .proofs
            .lock()
            .unwrap()
            .insert(digest.to_vec(), body);
    }

    pub fn submissions(&self) -> Vec<Vec<u8>> {
        self.state.submissions.lock().unwrap().clone()
    }

    /// Header of the most recent submission
    pub fn last_header(&self, name: &str) -> Option<String> {
        self.state
            .headers
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|headers| headers.get(name))
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }
}

async fn submit(
    State(state): State<Arc<CalendarState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Vec<u8>) {
    *state.headers.lock().unwrap() = Some(headers);

    let delay = *state.delay.lock().unwrap();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    state.submissions.lock().unwrap().push(body.to_vec());

    let mode = *state.mode.lock().unwrap();
    match mode {
        SubmitMode::Immediate => {
            let mut proof = Timestamp::new(body.to_vec());
            proof.add_attestation(Attestation::Pending {
                uri: PENDING_URI.to_string(),
            });
            (StatusCode::OK, codec::encode_timestamp(&proof))
        }
        SubmitMode::OpenTimestamps => (StatusCode::OK, opentimestamps_pending(PENDING_URI)),
        SubmitMode::Deferred => (StatusCode::ACCEPTED, b"queued-1".to_vec()),
        SubmitMode::Reject => (StatusCode::INTERNAL_SERVER_ERROR, Vec::new()),
    }
}

/// A pending attestation the way an OpenTimestamps calendar sends it: no node
/// value, attestation tag followed by a length-prefixed payload
pub fn opentimestamps_pending(uri: &str) -> Vec<u8> {
    let mut payload = vec![uri.len() as u8];
    payload.extend_from_slice(uri.as_bytes());

    let mut body = vec![0x00];
    body.extend_from_slice(&[0x83, 0xdf, 0xe3, 0x0d, 0x2e, 0xf9, 0x0c, 0x8e]);
    body.push(payload.len() as u8);
    body.extend_from_slice(&payload);
    body
}

/// Calendar that answers every request with a chunked body that never ends
/// and carries no Content-Length
pub async fn start_endless_calendar() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = [0u8; 4096];
                if socket.read(&mut request).await.is_err() {
                    return;
                }

                let head = "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n";
                if socket.write_all(head.as_bytes()).await.is_err() {
                    return;
                }

                let chunk = [0u8; 1024];
                loop {
                    let mut frame = format!("{:x}\r\n", chunk.len()).into_bytes();
                    frame.extend_from_slice(&chunk);
                    frame.extend_from_slice(b"\r\n");
                    if socket.write_all(&frame).await.is_err() {
                        return;
                    }
                }
            });
        }
    });

    format!("http://{}", addr)
}

async fn timestamp(
    State(state): State<Arc<CalendarState>>,
    Path(digest): Path<String>,
) -> (StatusCode, Vec<u8>) {
    let Ok(digest) = hex::decode(&digest) else {
        return (StatusCode::BAD_REQUEST, Vec::new());
    };

    match state.proofs.lock().unwrap().get(&digest) {
        Some(body) => (StatusCode::OK, body.clone()),
        None => (StatusCode::NOT_FOUND, Vec::new()),
    }
}
