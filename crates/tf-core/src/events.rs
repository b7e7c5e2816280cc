//! Operator-facing activity events.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel with a bounded
//! ring-buffer of recent events so that late-joining SSE clients can catch up.
//! These events describe what the pipeline did; they are not the pipeline's
//! own channels and nothing downstream consumes them for correctness.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::ids::JobId;
use crate::model::{Branch, BranchSet, Route};

/// Maximum number of events retained in the ring buffer.
const MAX_RECENT_EVENTS: usize = 100;

// ---------------------------------------------------------------------------
// EventCategory
// ---------------------------------------------------------------------------

/// Pipeline stage that emitted an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    /// Submission, classification and fan-out.
    Intake,
    /// Branch worker activity.
    Branch,
    /// Join barrier transitions.
    Join,
    /// Outbound notification delivery.
    Notify,
}

impl EventCategory {
    /// Parse a lowercase category name as used in query strings.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "intake" => Some(EventCategory::Intake),
            "branch" => Some(EventCategory::Branch),
            "join" => Some(EventCategory::Join),
            "notify" => Some(EventCategory::Notify),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// EventPayload
// ---------------------------------------------------------------------------

/// Payload describing what happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    // -- Intake --------------------------------------------------------------
    JobAccepted {
        job_id: JobId,
        file_name: String,
        route: Route,
        expected: BranchSet,
    },
    JobRejected {
        file_name: Option<String>,
        reason: String,
    },
    BranchDispatched {
        job_id: JobId,
        branch: Branch,
    },
    DispatchFailed {
        job_id: JobId,
        channel: String,
        error: String,
    },

    // -- Branches ------------------------------------------------------------
    BranchCompleted {
        job_id: JobId,
        branch: Branch,
        success: bool,
        detail: String,
    },

    // -- Join ----------------------------------------------------------------
    JoinFired {
        job_id: JobId,
        failed_branches: usize,
    },
    JoinExpired {
        job_id: JobId,
        missing: Vec<Branch>,
    },

    // -- Notification --------------------------------------------------------
    NotificationSent {
        job_id: JobId,
        email: String,
    },
    NotificationFailed {
        job_id: JobId,
        email: String,
        error: String,
    },
}

impl EventPayload {
    /// Stage category this payload belongs to.
    pub fn category(&self) -> EventCategory {
        match self {
            EventPayload::JobAccepted { .. }
            | EventPayload::JobRejected { .. }
            | EventPayload::BranchDispatched { .. }
            | EventPayload::DispatchFailed { .. } => EventCategory::Intake,
            EventPayload::BranchCompleted { .. } => EventCategory::Branch,
            EventPayload::JoinFired { .. } | EventPayload::JoinExpired { .. } => {
                EventCategory::Join
            }
            EventPayload::NotificationSent { .. } | EventPayload::NotificationFailed { .. } => {
                EventCategory::Notify
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A timestamped, categorised event ready for broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    pub category: EventCategory,
    /// What happened.
    pub payload: EventPayload,
}

impl Event {
    /// Create a new event with a fresh UUID and the current timestamp.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            category: payload.category(),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast channel with a bounded ring buffer of recent events.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    recent: RwLock<VecDeque<Event>>,
}

impl EventBus {
    /// Create a new event bus.
    ///
    /// `capacity` controls the broadcast channel buffer size (not the ring
    /// buffer, which is always [`MAX_RECENT_EVENTS`]).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT_EVENTS)),
        }
    }

    /// Subscribe to the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Broadcast an event to all current subscribers and store it in the
    /// ring buffer.
    pub fn broadcast(&self, payload: EventPayload) {
        let event = Event::new(payload);

        {
            let mut recent = self.recent.write();
            if recent.len() >= MAX_RECENT_EVENTS {
                recent.pop_back();
            }
            recent.push_front(event.clone());
        }

        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    /// Return the `n` most recent events (newest first).
    pub fn recent_events(&self, n: usize) -> Vec<Event> {
        let recent = self.recent.read();
        recent.iter().take(n).cloned().collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let job_id = JobId::new();
        bus.broadcast(EventPayload::BranchDispatched {
            job_id,
            branch: Branch::Thumbnail,
        });

        let event = rx.try_recv().unwrap();
        assert_eq!(event.category, EventCategory::Intake);
        match &event.payload {
            EventPayload::BranchDispatched { job_id: received, .. } => {
                assert_eq!(*received, job_id)
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn recent_events_capped() {
        let bus = EventBus::new(256);
        let job_id = JobId::new();

        for _ in 0..150 {
            bus.broadcast(EventPayload::JoinFired {
                job_id,
                failed_branches: 0,
            });
        }

        assert_eq!(bus.recent_events(200).len(), MAX_RECENT_EVENTS);
    }

    #[test]
    fn recent_events_newest_first() {
        let bus = EventBus::new(16);
        let job_id = JobId::new();

        for _ in 0..5 {
            bus.broadcast(EventPayload::BranchDispatched {
                job_id,
                branch: Branch::FrameCapture,
            });
        }
        bus.broadcast(EventPayload::NotificationSent {
            job_id,
            email: "a@x.com".into(),
        });

        let recent = bus.recent_events(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].category, EventCategory::Notify);
    }

    #[test]
    fn categories_follow_payload() {
        let job_id = JobId::new();
        let cases = [
            (
                EventPayload::JobRejected {
                    file_name: None,
                    reason: "no file".into(),
                },
                EventCategory::Intake,
            ),
            (
                EventPayload::BranchCompleted {
                    job_id,
                    branch: Branch::AnimatedGif,
                    success: false,
                    detail: "exit 1".into(),
                },
                EventCategory::Branch,
            ),
            (
                EventPayload::JoinExpired {
                    job_id,
                    missing: vec![Branch::AnimatedGif],
                },
                EventCategory::Join,
            ),
            (
                EventPayload::NotificationFailed {
                    job_id,
                    email: "a@x.com".into(),
                    error: "relay down".into(),
                },
                EventCategory::Notify,
            ),
        ];
        for (payload, category) in cases {
            assert_eq!(Event::new(payload).category, category);
        }
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = Event::new(EventPayload::JobAccepted {
            job_id: JobId::new(),
            file_name: "clip.mp4".into(),
            route: Route::Video,
            expected: [Branch::FrameCapture, Branch::AnimatedGif].into_iter().collect(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["category"], "intake");
        assert_eq!(json["payload"]["type"], "job_accepted");
        assert_eq!(json["payload"]["route"], "video");
    }

    #[test]
    fn category_parse() {
        assert_eq!(EventCategory::parse("join"), Some(EventCategory::Join));
        assert_eq!(EventCategory::parse("admin"), None);
    }

    #[test]
    fn no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.broadcast(EventPayload::JoinFired {
            job_id: JobId::new(),
            failed_branches: 1,
        });
        assert_eq!(bus.recent_events(10).len(), 1);
    }
}
