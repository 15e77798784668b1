//! # Sync Client
//!
//! Browser-side half of the sync mechanism, run as two independent tokio tasks.
//!
//! ## Pollers
//! - [`versions::VersionPoller`]: diffs `/system-state` against a baseline
//! - [`events::EventPoller`]: follows `/sync-events` with a server-stamped cursor
//!
//! ## Reactions
//! Both pollers push [`reaction::Reaction`]s into one channel owned by the UI
//! context. Dropping the receiver stops the pollers on their next reaction, and
//! dropping the [`SyncHandle`] cancels them right away.
//!
//! ## Failure
//! - Network errors, timeouts and bad statuses skip the tick silently
//! - Repeated 401/403 stop the poller with [`reaction::Reaction::SessionExpired`]
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

pub mod config;
pub mod error;
pub mod events;
pub mod poller;
pub mod reaction;
pub mod source;
pub mod versions;

use config::ClientConfig;
use error::PollError;
use events::EventPoller;
use poller::run;
use reaction::ReactionReceiver;
use source::{HttpSource, SyncSource};
use versions::VersionPoller;

pub struct SyncHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncHandle {
    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(JoinHandle::is_finished)
    }

    /// Cancels both pollers and waits for them to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();

        for task in std::mem::take(&mut self.tasks) {
            let _ = task.await;
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Starts both pollers over HTTP.
pub fn connect(
    config: &ClientConfig,
    session_start: DateTime<Utc>,
) -> Result<(SyncHandle, ReactionReceiver), PollError> {
    let source = Arc::new(HttpSource::new(config)?);

    Ok(spawn(source, config, session_start))
}

pub fn spawn(
    source: Arc<dyn SyncSource>,
    config: &ClientConfig,
    session_start: DateTime<Utc>,
) -> (SyncHandle, ReactionReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let versions = VersionPoller::new(source.clone(), sender.clone(), config.max_auth_failures);
    let events = EventPoller::new(source, sender, session_start, config.max_auth_failures);

    let tasks = vec![
        tokio::spawn(run(versions, config.version_interval, cancel.clone())),
        tokio::spawn(run(events, config.event_interval, cancel.clone())),
    ];

    (SyncHandle { cancel, tasks }, receiver)
}
