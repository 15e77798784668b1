//! UI side effects the pollers ask for. Every reaction is safe to repeat.
use payloads::{
    EventRecord,
    keys::{GLOBAL, PERMISSIONS, SETTINGS},
};
use tokio::sync::mpsc;

pub type ReactionSender = mpsc::UnboundedSender<Reaction>;
pub type ReactionReceiver = mpsc::UnboundedReceiver<Reaction>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    ConfigurationChanged,
    AccessChanged,
    Activity(String),
}

impl Notice {
    pub fn for_event(event_type: &str) -> Self {
        match event_type {
            "SETTINGS_UPDATE" => Notice::ConfigurationChanged,
            "PERMISSIONS_UPDATE" | "USER_UPDATE" | "ROLE_UPDATE" => Notice::AccessChanged,
            other => Notice::Activity(other.to_string()),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Notice::ConfigurationChanged => "System configuration was updated".to_string(),
            Notice::AccessChanged => "Your access may have changed".to_string(),
            Notice::Activity(event_type) => {
                format!("{} recorded", event_type.replace('_', " ").to_lowercase())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshCause {
    Versions(Vec<String>),
    Events(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reaction {
    Notice(Notice),
    Event { event: EventRecord, notice: Notice },
    /// Re-fetch server-rendered data for the current view.
    SoftRefresh(RefreshCause),
    SessionExpired,
}

/// Reactions for one poll's worth of changed keys: notices, then a single refresh.
pub fn for_changed_keys(changed: &[String]) -> Vec<Reaction> {
    if changed.is_empty() {
        return Vec::new();
    }

    let touched = |key: &str| changed.iter().any(|changed| changed == key);
    let mut reactions = Vec::new();

    if touched(SETTINGS) || touched(GLOBAL) {
        reactions.push(Reaction::Notice(Notice::ConfigurationChanged));
    }
    if touched(PERMISSIONS) {
        reactions.push(Reaction::Notice(Notice::AccessChanged));
    }

    reactions.push(Reaction::SoftRefresh(RefreshCause::Versions(changed.to_vec())));
    reactions
}

/// Reactions for one batch of events, oldest first, then a single refresh.
pub fn for_events(events: Vec<EventRecord>) -> Vec<Reaction> {
    if events.is_empty() {
        return Vec::new();
    }

    let count = events.len();
    let mut reactions: Vec<_> = events
        .into_iter()
        .rev()
        .map(|event| {
            let notice = Notice::for_event(&event.event_type);
            Reaction::Event { event, notice }
        })
        .collect();

    reactions.push(Reaction::SoftRefresh(RefreshCause::Events(count)));
    reactions
}
