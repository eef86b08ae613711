//! Forwarding of server-pushed "visit created" updates into loaded state.
//!
//! The transport (Mercure hub subscription) lives outside this crate. It is
//! expected to decode each update with [`parse_created_visit`] and push it
//! into the channel consumed by [`forward_live_updates`].

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::config::LiveUpdatesConfig;
use crate::models::CreatedVisit;
use crate::reducer::VisitsEvent;
use crate::traits::VisitsSink;

/// Decode one update payload, e.g. `{"shortUrl": {...}, "visit": {...}}`.
pub fn parse_created_visit(payload: &str) -> Result<CreatedVisit, serde_json::Error> {
    serde_json::from_str(payload)
}

/// How long updates are buffered before being flushed, if at all.
pub fn flush_interval(config: &LiveUpdatesConfig) -> Option<Duration> {
    config
        .interval_mins
        .filter(|mins| *mins > 0)
        .map(|mins| Duration::from_secs(mins * 60))
}

/// Forward created visits according to `config` until the channel closes.
///
/// When live updates are disabled the channel is still drained so senders
/// never block, but nothing reaches `sink`.
pub async fn forward_live_updates<K>(
    mut rx: mpsc::Receiver<CreatedVisit>,
    config: &LiveUpdatesConfig,
    sink: &K,
) where
    K: VisitsSink + ?Sized,
{
    if !config.enabled {
        let mut dropped = 0usize;
        while rx.recv().await.is_some() {
            dropped += 1;
        }
        tracing::debug!(dropped, "Live updates disabled, created visits ignored");
        return;
    }

    forward_created_visits(rx, flush_interval(config), sink).await;
}

/// Dispatch created visits into `sink` until the channel closes.
///
/// Without an interval each visit is dispatched as soon as it arrives.
/// With one, visits are accumulated and dispatched as a single batch on every
/// tick; anything pending when the channel closes is flushed.
pub async fn forward_created_visits<K>(
    mut rx: mpsc::Receiver<CreatedVisit>,
    interval: Option<Duration>,
    sink: &K,
) where
    K: VisitsSink + ?Sized,
{
    let Some(period) = interval else {
        while let Some(created) = rx.recv().await {
            sink.dispatch(VisitsEvent::VisitsCreated(vec![created]));
        }
        return;
    };

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick completes immediately
    ticker.tick().await;

    let mut pending = Vec::new();
    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(created) => pending.push(created),
                None => break,
            },
            _ = ticker.tick() => flush(&mut pending, sink),
        }
    }
    flush(&mut pending, sink);
    tracing::debug!("Live updates channel closed");
}

fn flush<K: VisitsSink + ?Sized>(pending: &mut Vec<CreatedVisit>, sink: &K) {
    if pending.is_empty() {
        return;
    }
    tracing::debug!(count = pending.len(), "Flushing created visits");
    sink.dispatch(VisitsEvent::VisitsCreated(std::mem::take(pending)));
}
