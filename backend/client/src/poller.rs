//! Shared timer loop for both pollers.
//!
//! A tick awaits its own fetch before the next one can fire, so results from one
//! poller are always applied in the order the requests were issued.
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::reaction::{Reaction, ReactionSender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

#[async_trait]
pub trait Poll: Send {
    const NAME: &'static str;

    async fn poll_once(&mut self) -> Flow;
}

/// Floor for a poll period. A zero period would otherwise spin or panic.
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

pub async fn run<P: Poll>(mut poller: P, period: Duration, cancel: CancellationToken) {
    let mut ticker = interval(period.max(MIN_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let flow = tokio::select! {
            _ = cancel.cancelled() => break,
            flow = poller.poll_once() => flow,
        };

        if flow == Flow::Stop {
            break;
        }
    }

    debug!("{} poller stopped", P::NAME);
}

/// Counts consecutive auth rejections.
#[derive(Debug)]
pub struct AuthGuard {
    failures: u32,
    limit: u32,
}

impl AuthGuard {
    pub fn new(limit: u32) -> Self {
        Self { failures: 0, limit }
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// True once the limit is reached.
    pub fn reject(&mut self) -> bool {
        self.failures += 1;
        self.failures >= self.limit.max(1)
    }
}

/// Stops the poller when the receiving UI context is gone.
pub fn emit(sender: &ReactionSender, reactions: Vec<Reaction>) -> Flow {
    for reaction in reactions {
        if sender.send(reaction).is_err() {
            return Flow::Stop;
        }
    }

    Flow::Continue
}
