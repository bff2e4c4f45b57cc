use crate::store::ChangeEvent;
use crate::store::EventType;

/// What a change event means for the watching caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchEventKind {
    Create,
    Modify,
    Delete,
}

impl WatchEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchEventKind::Create => "create",
            WatchEventKind::Modify => "modify",
            WatchEventKind::Delete => "delete",
        }
    }
}

/// Maps a store event to its notification kind.
///
/// A `Put` whose `create_revision` equals its `mod_revision` is the first
/// write since the key was last absent. Tags this crate does not know yield
/// `None`.
pub fn classify(event: &ChangeEvent) -> Option<WatchEventKind> {
    match event.event_type {
        EventType::Put if event.is_create() => Some(WatchEventKind::Create),
        EventType::Put => Some(WatchEventKind::Modify),
        EventType::Delete => Some(WatchEventKind::Delete),
        EventType::Unrecognized(_) => None,
    }
}
