//! Upstream ingestion task
//!
//! One long-lived task per frame cache. Each loop iteration is one connection
//! attempt:
//!
//! ```text
//!   Stopped ──start──► Connecting ──200──► Streaming
//!                          ▲                   │ error / EOF / read timeout
//!                          │                   ▼
//!                          └────sleep───── Backoff
//! ```
//!
//! Cancellation is observed at every await point; any state moves to
//! `Stopped` once the token fires.

use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{Error, Result};

use super::backoff::Backoff;
use super::config::CacheConfig;
use super::demux::MjpegDemuxer;
use super::frame_cache::CacheShared;

/// Ingestion state, exposed through cache stats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    /// No ingestion task is running
    Stopped,
    /// Waiting for the upstream to accept the request
    Connecting,
    /// Reading frames
    Streaming,
    /// Sleeping before the next attempt
    Backoff,
}

impl IngestState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            IngestState::Stopped => 0,
            IngestState::Connecting => 1,
            IngestState::Streaming => 2,
            IngestState::Backoff => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => IngestState::Connecting,
            2 => IngestState::Streaming,
            3 => IngestState::Backoff,
            _ => IngestState::Stopped,
        }
    }
}

pub(crate) struct Ingest {
    url: Url,
    config: Arc<CacheConfig>,
    client: reqwest::Client,
    shared: Arc<CacheShared>,
    token: CancellationToken,
}

impl Ingest {
    pub(crate) fn new(
        url: Url,
        config: Arc<CacheConfig>,
        client: reqwest::Client,
        shared: Arc<CacheShared>,
        token: CancellationToken,
    ) -> Self {
        Self {
            url,
            config,
            client,
            shared,
            token,
        }
    }

    /// Run until cancelled
    pub(crate) async fn run(self) {
        let mut backoff = Backoff::new(self.config.backoff.clone());
        let mut demuxer =
            MjpegDemuxer::new(self.config.max_buffer_size, self.config.buffer_trim_size);

        while !self.token.is_cancelled() {
            self.shared.set_state(IngestState::Connecting);
            tracing::info!(url = %self.url, "Connecting to upstream");

            let result = tokio::select! {
                _ = self.token.cancelled() => break,
                result = self.stream_once(&mut demuxer, &mut backoff) => result,
            };

            let error = match result {
                Ok(()) => break,
                Err(e) => e,
            };

            let errors = self.shared.record_error();
            let delay = backoff.on_failure();
            tracing::warn!(
                url = %self.url,
                error = %error,
                errors = errors,
                retry_in_ms = delay.as_millis() as u64,
                "Upstream connection error"
            );

            self.shared.set_state(IngestState::Backoff);
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.shared.set_state(IngestState::Stopped);
        tracing::debug!(url = %self.url, "Ingestion task exited");
    }

    /// One connection: request, then read until failure
    ///
    /// Returns `Ok(())` only when cancelled mid-stream.
    async fn stream_once(&self, demuxer: &mut MjpegDemuxer, backoff: &mut Backoff) -> Result<()> {
        let request = self
            .client
            .get(self.url.clone())
            .header(reqwest::header::USER_AGENT, self.config.user_agent.as_str())
            .send();
        let response = within(self.config.connect_timeout, request).await??;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamStatus(status));
        }

        backoff.reset();
        self.shared.record_connection();
        self.shared.set_state(IngestState::Streaming);
        tracing::info!(url = %self.url, status = %status, "Connected to upstream");

        // A partial frame from a previous connection can never complete
        demuxer.reset();

        let body = response.bytes_stream().map_err(std::io::Error::other);
        let mut reader = StreamReader::new(Box::pin(body));
        let mut chunk = vec![0u8; self.config.read_chunk_size];

        loop {
            let read = within(self.config.read_timeout, reader.read(&mut chunk)).await??;
            if read == 0 {
                return Err(Error::UpstreamClosed);
            }

            for frame in demuxer.push(&chunk[..read]) {
                if self.token.is_cancelled() {
                    return Ok(());
                }
                self.shared.record_frame(frame);
            }
        }
    }
}

async fn within<F: std::future::Future>(limit: Duration, future: F) -> Result<F::Output> {
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| Error::Timeout(limit))
}
