//! Observer notifications published by the core.
//!
//! Subscribers receive every notification on their own unbounded channel;
//! closed subscribers are pruned on the next publish.

use crate::alert::Alert;
use crate::contour::{Contour, ContourType};
use crate::descriptor_input::InputKinds;
use crate::event::{EventId, EventRating};
use crate::event_types::{EventGroup, EventInfo, EventTypeId};
use crate::geometry::Polygon;
use crate::metadata::GeoCoordinate;
use crate::timestamp::TimeStamp;
use crate::track::TrackModelId;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use vsplay_env::DataSourceStatus;

/// Kind of data feed a status change refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Video,
    Track,
    Descriptor,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CoreNotification {
    /// Something displayable changed
    Updated,

    // === Tracks ===
    TrackAdded(TrackModelId),
    TrackChanged(TrackModelId),
    TrackClosed(TrackModelId),
    TrackNoteChanged {
        track: TrackModelId,
        note: Option<String>,
    },
    FollowedTrackState {
        time: TimeStamp,
        coordinate: GeoCoordinate,
    },

    // === Events ===
    EventAdded(EventId),
    EventChanged(EventId),
    EventRemoved(EventId),
    EventRatingChanged {
        event: EventId,
        rating: EventRating,
    },
    EventStatusChanged {
        event: EventId,
        status: i32,
    },
    EventNoteChanged {
        event: EventId,
        note: Option<String>,
    },
    ManualEventCreated(EventId),
    EventGroupExpected(EventGroup),
    UserEventTypeAdded {
        info: EventInfo,
        threshold: f64,
    },
    ManualEventTypesUpdated(Vec<EventInfo>),

    // === Alerts ===
    AlertAdded {
        id: EventTypeId,
        alert: Alert,
    },
    AlertChanged {
        id: EventTypeId,
        alert: Alert,
    },
    AlertEnabledChanged {
        id: EventTypeId,
        enabled: bool,
    },
    AlertRemoved {
        id: EventTypeId,
        events_removed: bool,
    },
    AlertMatchesChanged {
        id: EventTypeId,
        count: usize,
    },

    // === Contours ===
    ContourAdded(Contour),
    ContourNameChanged {
        id: i32,
        name: String,
    },
    ContourTypeChanged {
        id: i32,
        kind: ContourType,
    },
    ContourPointsChanged {
        id: i32,
        points: Polygon,
    },
    ContourRemoved(i32),

    // === Sources ===
    AcceptedInputsChanged(InputKinds),
    SourceStatusChanged {
        kind: SourceKind,
        status: DataSourceStatus,
    },
    StatusMessage(String),
}

/// Fan-out of notifications to any number of subscribers.
#[derive(Debug, Default)]
pub struct NotificationBus {
    subscribers: Vec<UnboundedSender<CoreNotification>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> UnboundedReceiver<CoreNotification> {
        let (tx, rx) = unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn publish(&mut self, notification: CoreNotification) {
        self.subscribers
            .retain(|tx| tx.send(notification.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_to_all_and_prune_closed() {
        let mut bus = NotificationBus::new();
        let mut a = bus.subscribe();
        let b = bus.subscribe();
        drop(b);

        bus.publish(CoreNotification::Updated);
        assert_eq!(a.try_recv().unwrap(), CoreNotification::Updated);
        assert_eq!(bus.subscriber_count(), 1);
    }
}
