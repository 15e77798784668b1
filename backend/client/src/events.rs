//! # Event Poller
//!
//! Asks for events strictly after `last_sync_time`, starting from the session
//! start. The cursor only moves when a batch actually arrived, and then to the
//! server's own timestamp. A failed or empty poll asks again from the same point.
//!
//! Delivery is at-least-once, so every reaction has to be repeatable.
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use payloads::{EventRecord, SyncEventsResponse};
use tracing::{debug, warn};

use crate::{
    error::PollError,
    poller::{AuthGuard, Flow, Poll, emit},
    reaction::{Reaction, ReactionSender, for_events},
    source::SyncSource,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventCursor {
    last_sync_time: DateTime<Utc>,
}

impl EventCursor {
    pub fn new(session_start: DateTime<Utc>) -> Self {
        Self {
            last_sync_time: session_start,
        }
    }

    pub fn last_sync_time(&self) -> DateTime<Utc> {
        self.last_sync_time
    }

    /// Takes the batch out of a response, advancing only if it is non-empty.
    pub fn accept(&mut self, response: SyncEventsResponse) -> Vec<EventRecord> {
        if !response.events.is_empty() {
            self.last_sync_time = response.timestamp;
        }

        response.events
    }
}

pub struct EventPoller {
    source: Arc<dyn SyncSource>,
    cursor: EventCursor,
    auth: AuthGuard,
    sender: ReactionSender,
}

impl EventPoller {
    pub fn new(
        source: Arc<dyn SyncSource>,
        sender: ReactionSender,
        session_start: DateTime<Utc>,
        max_auth_failures: u32,
    ) -> Self {
        Self {
            source,
            cursor: EventCursor::new(session_start),
            auth: AuthGuard::new(max_auth_failures),
            sender,
        }
    }

    pub fn cursor(&self) -> EventCursor {
        self.cursor
    }
}

#[async_trait]
impl Poll for EventPoller {
    const NAME: &'static str = "event";

    async fn poll_once(&mut self) -> Flow {
        match self.source.fetch_events(self.cursor.last_sync_time()).await {
            Ok(response) => {
                self.auth.reset();

                let events = self.cursor.accept(response);
                if !events.is_empty() {
                    debug!("Received {} events", events.len());
                }

                emit(&self.sender, for_events(events))
            }
            Err(PollError::Unauthorized(status)) => {
                if self.auth.reject() {
                    warn!("Event polling stopped after repeated {status}");
                    emit(&self.sender, vec![Reaction::SessionExpired]);
                    return Flow::Stop;
                }

                Flow::Continue
            }
            Err(e) => {
                debug!("Event poll skipped: {e}");
                Flow::Continue
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use chrono::Duration;
    use payloads::VersionMap;
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::reaction::{Notice, RefreshCause};

    #[derive(Default)]
    struct Scripted {
        responses: Mutex<VecDeque<Result<SyncEventsResponse, PollError>>>,
        requested: Mutex<Vec<DateTime<Utc>>>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<SyncEventsResponse, PollError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requested: Mutex::default(),
            })
        }

        fn requested(&self) -> Vec<DateTime<Utc>> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SyncSource for Scripted {
        async fn fetch_versions(&self) -> Result<VersionMap, PollError> {
            Err(PollError::Unavailable("not scripted".into()))
        }

        async fn fetch_events(
            &self,
            since: DateTime<Utc>,
        ) -> Result<SyncEventsResponse, PollError> {
            self.requested.lock().unwrap().push(since);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(PollError::Unavailable("script exhausted".into())))
        }
    }

    fn batch(
        events: Vec<EventRecord>,
        timestamp: DateTime<Utc>,
    ) -> Result<SyncEventsResponse, PollError> {
        Ok(SyncEventsResponse { events, timestamp })
    }

    #[tokio::test]
    async fn failed_poll_retries_from_same_cursor() {
        let t0 = Utc::now();
        let server_now = t0 + Duration::seconds(30);
        let event = EventRecord::new("USER_UPDATE", json!({"id": 4}), t0 + Duration::seconds(1));

        let source = Scripted::new(vec![
            Err(PollError::Unavailable("offline".into())),
            batch(vec![event.clone()], server_now),
        ]);
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let mut poller = EventPoller::new(source.clone(), sender, t0, 3);

        poller.poll_once().await;
        assert_eq!(poller.cursor().last_sync_time(), t0);

        poller.poll_once().await;
        assert_eq!(source.requested(), vec![t0, t0]);
        assert_eq!(poller.cursor().last_sync_time(), server_now);

        assert_eq!(
            receiver.try_recv().unwrap(),
            Reaction::Event {
                event,
                notice: Notice::AccessChanged
            }
        );
        assert_eq!(
            receiver.try_recv().unwrap(),
            Reaction::SoftRefresh(RefreshCause::Events(1))
        );
    }

    #[tokio::test]
    async fn empty_batch_keeps_cursor() {
        let t0 = Utc::now();
        let source = Scripted::new(vec![batch(Vec::new(), t0 + Duration::seconds(5))]);
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let mut poller = EventPoller::new(source, sender, t0, 3);

        poller.poll_once().await;

        assert_eq!(poller.cursor().last_sync_time(), t0);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn cursor_takes_server_timestamp_not_event_time() {
        let t0 = Utc::now();
        let server_now = t0 - Duration::seconds(90);
        let event = EventRecord::new("MENU_UPDATE", json!({}), t0 + Duration::seconds(1));

        let mut cursor = EventCursor::new(t0);
        let events = cursor.accept(SyncEventsResponse {
            events: vec![event],
            timestamp: server_now,
        });

        assert_eq!(events.len(), 1);
        assert_eq!(cursor.last_sync_time(), server_now);
    }
}
