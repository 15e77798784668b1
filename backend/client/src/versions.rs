//! # Version Poller
//!
//! `Idle` until the first non-empty version map arrives, which becomes the
//! baseline without any reaction. Every later map is diffed against the baseline
//! and changed keys turn into notices plus one soft refresh.
//!
//! Failed polls leave the baseline alone and are retried on the next tick.
use std::{collections::hash_map::Entry, sync::Arc};

use async_trait::async_trait;
use payloads::VersionMap;
use tracing::{debug, warn};

use crate::{
    error::PollError,
    poller::{AuthGuard, Flow, Poll, emit},
    reaction::{Reaction, ReactionSender, for_changed_keys},
    source::SyncSource,
};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum VersionTracker {
    #[default]
    Idle,
    Tracking(VersionMap),
}

impl VersionTracker {
    pub fn baseline(&self) -> Option<&VersionMap> {
        match self {
            VersionTracker::Idle => None,
            VersionTracker::Tracking(baseline) => Some(baseline),
        }
    }

    /// Sorted keys whose token differs from the baseline. Updates the baseline.
    pub fn observe(&mut self, current: VersionMap) -> Vec<String> {
        // empty means the server knows of no changes, never that everything changed
        if current.is_empty() {
            return Vec::new();
        }

        let baseline = match self {
            VersionTracker::Idle => {
                *self = VersionTracker::Tracking(current);
                return Vec::new();
            }
            VersionTracker::Tracking(baseline) => baseline,
        };

        let mut changed = Vec::new();
        for (key, token) in current {
            match baseline.entry(key) {
                Entry::Occupied(mut entry) => {
                    if *entry.get() != token {
                        changed.push(entry.key().clone());
                        entry.insert(token);
                    }
                }
                Entry::Vacant(entry) => {
                    changed.push(entry.key().clone());
                    entry.insert(token);
                }
            }
        }

        changed.sort();
        changed
    }
}

pub struct VersionPoller {
    source: Arc<dyn SyncSource>,
    tracker: VersionTracker,
    auth: AuthGuard,
    sender: ReactionSender,
}

impl VersionPoller {
    pub fn new(
        source: Arc<dyn SyncSource>,
        sender: ReactionSender,
        max_auth_failures: u32,
    ) -> Self {
        Self {
            source,
            tracker: VersionTracker::Idle,
            auth: AuthGuard::new(max_auth_failures),
            sender,
        }
    }

    pub fn tracker(&self) -> &VersionTracker {
        &self.tracker
    }
}

#[async_trait]
impl Poll for VersionPoller {
    const NAME: &'static str = "version";

    async fn poll_once(&mut self) -> Flow {
        match self.source.fetch_versions().await {
            Ok(current) => {
                self.auth.reset();

                let changed = self.tracker.observe(current);
                if !changed.is_empty() {
                    debug!("Version change detected for {changed:?}");
                }

                emit(&self.sender, for_changed_keys(&changed))
            }
            Err(PollError::Unauthorized(status)) => {
                if self.auth.reject() {
                    warn!("Version polling stopped after repeated {status}");
                    emit(&self.sender, vec![Reaction::SessionExpired]);
                    return Flow::Stop;
                }

                Flow::Continue
            }
            Err(e) => {
                debug!("Version poll skipped: {e}");
                Flow::Continue
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use chrono::{DateTime, Utc};
    use payloads::{
        SyncEventsResponse,
        keys::{GLOBAL, MENU},
    };
    use reqwest::StatusCode;
    use tokio::sync::mpsc;

    use super::*;
    use crate::reaction::{Notice, RefreshCause};

    fn map(pairs: &[(&str, &str)]) -> VersionMap {
        pairs
            .iter()
            .map(|(key, token)| (key.to_string(), token.to_string()))
            .collect()
    }

    struct Scripted {
        responses: Mutex<VecDeque<Result<VersionMap, PollError>>>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<VersionMap, PollError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
            })
        }
    }

    #[async_trait]
    impl SyncSource for Scripted {
        async fn fetch_versions(&self) -> Result<VersionMap, PollError> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(PollError::Unavailable("script exhausted".into())))
        }

        async fn fetch_events(&self, _: DateTime<Utc>) -> Result<SyncEventsResponse, PollError> {
            Err(PollError::Unavailable("not scripted".into()))
        }
    }

    #[test]
    fn first_map_is_baseline_only() {
        for size in [1, 5, 50] {
            let current: VersionMap = (0..size)
                .map(|i| (format!("key-{i}"), format!("v{i}")))
                .collect();

            let mut tracker = VersionTracker::default();
            assert!(tracker.observe(current.clone()).is_empty());
            assert_eq!(tracker.baseline(), Some(&current));
        }
    }

    #[test]
    fn detects_exactly_the_changed_key() {
        let mut tracker = VersionTracker::default();
        tracker.observe(map(&[("a", "v1"), ("b", "v1")]));

        let changed = tracker.observe(map(&[("a", "v2"), ("b", "v1")]));

        assert_eq!(changed, vec!["a".to_string()]);
        assert_eq!(tracker.baseline(), Some(&map(&[("a", "v2"), ("b", "v1")])));
    }

    #[test]
    fn empty_map_changes_nothing() {
        let mut tracker = VersionTracker::default();
        assert!(tracker.observe(VersionMap::new()).is_empty());
        assert_eq!(tracker, VersionTracker::Idle);

        tracker.observe(map(&[("a", "v1")]));
        assert!(tracker.observe(VersionMap::new()).is_empty());
        assert_eq!(tracker.baseline(), Some(&map(&[("a", "v1")])));
    }

    #[test]
    fn new_keys_count_as_changed() {
        let mut tracker = VersionTracker::default();
        tracker.observe(map(&[("a", "v1")]));

        assert_eq!(
            tracker.observe(map(&[("a", "v1"), ("b", "v1")])),
            vec!["b".to_string()]
        );
    }

    #[test]
    fn reverted_token_is_still_a_change() {
        let mut tracker = VersionTracker::default();
        tracker.observe(map(&[("a", "v1")]));
        tracker.observe(map(&[("a", "v2")]));

        assert_eq!(tracker.observe(map(&[("a", "v1")])), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn failure_keeps_baseline_then_menu_update_refreshes_once() {
        let source = Scripted::new(vec![
            Ok(map(&[(GLOBAL, "g1"), (MENU, "m1")])),
            Err(PollError::Unavailable("connection reset".into())),
            Ok(map(&[(GLOBAL, "g2"), (MENU, "m2")])),
        ]);
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let mut poller = VersionPoller::new(source, sender, 3);

        assert_eq!(poller.poll_once().await, Flow::Continue);
        assert!(receiver.try_recv().is_err());

        assert_eq!(poller.poll_once().await, Flow::Continue);
        assert_eq!(
            poller.tracker().baseline(),
            Some(&map(&[(GLOBAL, "g1"), (MENU, "m1")]))
        );

        assert_eq!(poller.poll_once().await, Flow::Continue);
        assert_eq!(
            receiver.try_recv().unwrap(),
            Reaction::Notice(Notice::ConfigurationChanged)
        );
        assert_eq!(
            receiver.try_recv().unwrap(),
            Reaction::SoftRefresh(RefreshCause::Versions(vec![
                GLOBAL.to_string(),
                MENU.to_string()
            ]))
        );
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn repeated_auth_failures_stop_polling() {
        let source = Scripted::new(vec![
            Err(PollError::Unauthorized(StatusCode::UNAUTHORIZED)),
            Err(PollError::Unauthorized(StatusCode::FORBIDDEN)),
        ]);
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let mut poller = VersionPoller::new(source, sender, 2);

        assert_eq!(poller.poll_once().await, Flow::Continue);
        assert_eq!(poller.poll_once().await, Flow::Stop);
        assert_eq!(receiver.try_recv().unwrap(), Reaction::SessionExpired);
    }

    #[tokio::test]
    async fn closed_receiver_stops_polling() {
        let source = Scripted::new(vec![
            Ok(map(&[("a", "v1")])),
            Ok(map(&[("a", "v2")])),
        ]);
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut poller = VersionPoller::new(source, sender, 3);

        assert_eq!(poller.poll_once().await, Flow::Continue);
        drop(receiver);
        assert_eq!(poller.poll_once().await, Flow::Stop);
    }
}
