//! Sequential dispatch of a store subscription into a synchronous handler.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{Subscription, Update};

/// Capacity of the per-subscription error channel.
pub const ERROR_CHANNEL_CAPACITY: usize = 64;

/// Labels attached to logs and metrics of one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub runner: String,
    pub message: String,
}

impl Metadata {
    pub fn new(runner: impl Into<String>, message: impl Into<String>) -> Self {
        Self { runner: runner.into(), message: message.into() }
    }
}

/// Send side of the error channel handed to subscription handlers.
///
/// `report` never waits: when the host is not keeping up the error is logged
/// and dropped.
#[derive(Clone)]
pub struct ErrorSink {
    tx: mpsc::Sender<anyhow::Error>,
    meta: Arc<Metadata>,
}

impl ErrorSink {
    pub fn channel(meta: Metadata, cap: usize) -> (Self, mpsc::Receiver<anyhow::Error>) {
        let (tx, rx) = mpsc::channel(cap.max(1));
        (Self { tx, meta: Arc::new(meta) }, rx)
    }

    pub fn report(&self, err: impl Into<anyhow::Error>) {
        match self.tx.try_send(err.into()) {
            Ok(()) => {}
            Err(TrySendError::Full(e)) => {
                warn!(runner = %self.meta.runner, message = %self.meta.message, error = %format!("{e:#}"), "error channel full; dropping error");
                counter!("watchable_errors_dropped_total", 1, "runner" => self.meta.runner.clone(), "message" => self.meta.message.clone());
            }
            Err(TrySendError::Closed(e)) => {
                error!(runner = %self.meta.runner, message = %self.meta.message, error = %format!("{e:#}"), "error channel closed");
            }
        }
    }
}

/// Feed every update of `subscription` to `handle`, one at a time.
///
/// The handler runs to completion before the next update is awaited, and
/// `cancel` is only observed while waiting. Errors reported through the
/// [`ErrorSink`] are logged by a companion task. Returns when the
/// subscription closes or `cancel` fires.
pub async fn handle_subscription<K, V, F>(
    meta: Metadata,
    mut subscription: Subscription<K, V>,
    cancel: CancellationToken,
    mut handle: F,
) where
    F: FnMut(Update<K, V>, &ErrorSink),
{
    let (sink, mut err_rx) = ErrorSink::channel(meta.clone(), ERROR_CHANNEL_CAPACITY);
    let drain_meta = meta.clone();
    let drain = tokio::spawn(async move {
        while let Some(err) = err_rx.recv().await {
            error!(runner = %drain_meta.runner, message = %drain_meta.message, error = %format!("{err:#}"), "observed an error");
            counter!("watchable_errors_total", 1, "runner" => drain_meta.runner.clone(), "message" => drain_meta.message.clone());
        }
    });

    loop {
        let update = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(runner = %meta.runner, message = %meta.message, "subscription cancelled");
                break;
            }
            maybe = subscription.recv() => match maybe {
                Some(u) => u,
                None => {
                    debug!(runner = %meta.runner, message = %meta.message, "subscription closed");
                    break;
                }
            },
        };
        let started = Instant::now();
        counter!("watchable_subscribe_total", 1, "runner" => meta.runner.clone(), "message" => meta.message.clone());
        handle(update, &sink);
        histogram!(
            "watchable_subscribe_duration_ms",
            started.elapsed().as_secs_f64() * 1000.0,
            "runner" => meta.runner.clone(),
            "message" => meta.message.clone()
        );
    }

    drop(handle);
    drop(sink);
    let _ = drain.await;
    info!(runner = %meta.runner, message = %meta.message, "subscription handler stopped");
}
