//! Alert lifecycle: Created -> (Enabled <-> Disabled) -> Removed.

use super::{AlertRecord, Core, CoreError};
use crate::alert::Alert;
use crate::descriptor_input::{DescriptorInput, InputKind};
use crate::event_types::{EventGroup, EventTypeId};
use crate::notification::CoreNotification;
use std::collections::BTreeSet;
use tracing::info;

impl Core {
    /// Registers an alert under a fresh alert type, emits its query, and
    /// returns the type id.
    pub fn add_alert(&mut self, mut alert: Alert) -> EventTypeId {
        let id = self.event_types.allocate_alert_type();
        alert.event_info.type_id = id;
        self.event_types.register(alert.event_info.clone());
        self.event_types.set_threshold(id, alert.display_threshold);
        self.expect_event_group(EventGroup::Alert);
        info!("Alert '{}' added as type {}", alert.name(), id);

        self.notify(CoreNotification::AlertAdded {
            id,
            alert: alert.clone(),
        });
        let input = self.emit_input(DescriptorInput::Query {
            alert_type: id,
            query: alert.query.clone(),
        });
        self.alerts.insert(
            id,
            AlertRecord {
                alert,
                enabled: true,
                input_ids: vec![input],
                matches: BTreeSet::new(),
            },
        );
        id
    }

    /// Enabling re-emits the query; disabling withdraws only the most
    /// recently emitted query input.
    pub fn set_alert_enabled(&mut self, id: EventTypeId, enabled: bool) -> Result<(), CoreError> {
        let record = self.alerts.get(&id).ok_or(CoreError::UnknownAlert(id))?;
        if record.enabled == enabled {
            return Ok(());
        }

        if enabled {
            let query = record.alert.query.clone();
            let input = self.emit_input(DescriptorInput::Query {
                alert_type: id,
                query,
            });
            if let Some(record) = self.alerts.get_mut(&id) {
                record.input_ids.push(input);
            }
        } else if let Some(last) = record.input_ids.last().copied() {
            self.revoke_input(InputKind::Query, last, false);
        }

        if let Some(record) = self.alerts.get_mut(&id) {
            record.enabled = enabled;
        }
        self.notify(CoreNotification::AlertEnabledChanged { id, enabled });
        Ok(())
    }

    /// Replaces the alert's display information. The type id is kept and
    /// the query is not re-emitted.
    pub fn update_alert(&mut self, id: EventTypeId, alert: Alert) -> Result<(), CoreError> {
        let record = self.alerts.get_mut(&id).ok_or(CoreError::UnknownAlert(id))?;
        record.alert.event_info = alert.event_info;
        record.alert.event_info.type_id = id;
        let info = record.alert.event_info.clone();
        let updated = record.alert.clone();

        self.event_types.register(info);
        self.notify(CoreNotification::AlertChanged { id, alert: updated });
        Ok(())
    }

    /// Withdraws every query input the alert ever emitted. With
    /// `remove_events`, sources also drop matching events and the type is
    /// unregistered.
    pub fn remove_alert(&mut self, id: EventTypeId, remove_events: bool) -> Result<Alert, CoreError> {
        let record = self.alerts.remove(&id).ok_or(CoreError::UnknownAlert(id))?;
        for input in &record.input_ids {
            self.revoke_input(InputKind::Query, *input, remove_events);
        }
        if remove_events {
            self.event_types.unregister(id);
        }
        info!("Alert '{}' ({}) removed", record.alert.name(), id);
        self.notify(CoreNotification::AlertRemoved {
            id,
            events_removed: remove_events,
        });
        Ok(record.alert)
    }

    pub fn alert(&self, id: EventTypeId) -> Option<&Alert> {
        self.alerts.get(&id).map(|r| &r.alert)
    }

    pub fn alert_ids(&self) -> impl Iterator<Item = EventTypeId> + '_ {
        self.alerts.keys().copied()
    }

    pub fn is_alert_enabled(&self, id: EventTypeId) -> Option<bool> {
        self.alerts.get(&id).map(|r| r.enabled)
    }

    /// Number of admitted events whose sole classifier is the alert's type.
    pub fn alert_matches(&self, id: EventTypeId) -> Option<usize> {
        self.alerts.get(&id).map(|r| r.matches.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::SimilarityQuery;
    use crate::descriptor_input::InputId;
    use crate::engine::inputs::recording::RecordingSource;
    use crate::engine::tests_support::{drain, ts};
    use crate::event::{Event, EventOrigin};
    use crate::event_types::QUERY_ALERT;
    use vsplay_env::SourceId;

    fn alert(name: &str) -> Alert {
        Alert::new(
            name,
            SimilarityQuery {
                query_id: format!("{}-q", name),
                descriptors: vec!["motion".into()],
                similarity_threshold: 0.2,
            },
            0.5,
        )
    }

    fn origin() -> EventOrigin {
        EventOrigin::Source(SourceId::from_seed(7))
    }

    #[test]
    fn test_alert_types_descend() {
        let mut core = Core::with_defaults();
        let a = core.add_alert(alert("a"));
        let b = core.add_alert(alert("b"));
        assert_eq!(a, QUERY_ALERT);
        assert_eq!(b, QUERY_ALERT - 1);
        assert_eq!(core.alert(a).unwrap().event_info.type_id, a);
        assert!(core.event_types().contains(b));
        assert!(core.expected_event_groups().contains(&EventGroup::Alert));
    }

    #[test]
    fn test_match_counts_net_to_zero() {
        let mut core = Core::with_defaults();
        let a = core.add_alert(alert("a"));
        let b = core.add_alert(alert("b"));

        core.add_event(origin(), Event::new(1).with_classifier(a, 0.9).with_span(ts(0), ts(1)));
        assert_eq!(core.alert_matches(a), Some(1));
        assert_eq!(core.alert_matches(b), Some(0));

        // Re-submission does not count twice
        core.add_event(origin(), Event::new(1).with_classifier(a, 0.95).with_span(ts(0), ts(1)));
        assert_eq!(core.alert_matches(a), Some(1));

        assert!(core.remove_event(origin(), 1));
        assert_eq!(core.alert_matches(a), Some(0));
        assert_eq!(core.alert_matches(b), Some(0));
    }

    #[test]
    fn test_manual_events_never_match() {
        let mut core = Core::with_defaults();
        let a = core.add_alert(alert("a"));
        core.create_manual_event(a, &[], ts(0));
        assert_eq!(core.alert_matches(a), Some(0));
    }

    #[test]
    fn test_disable_revokes_only_latest_query() {
        let mut core = Core::with_defaults();
        let (src, log) = RecordingSource::new(InputKind::Query.into());
        let sid = core.add_descriptor_source(Box::new(src));
        core.connect_descriptor_inputs(sid).unwrap();

        let a = core.add_alert(alert("a"));
        core.set_alert_enabled(a, false).unwrap();
        core.set_alert_enabled(a, true).unwrap();
        core.set_alert_enabled(a, false).unwrap();
        assert_eq!(core.is_alert_enabled(a), Some(false));

        {
            let log = log.lock().unwrap();
            let injected: Vec<InputId> = log.injected.iter().map(|(id, _)| *id).collect();
            assert_eq!(injected.len(), 2);
            let revoked: Vec<InputId> = log.revoked.iter().map(|(id, _)| *id).collect();
            assert_eq!(revoked, injected);
        }

        // Removal revokes every query input, including already-revoked ones
        core.remove_alert(a, true).unwrap();
        let log = log.lock().unwrap();
        assert_eq!(log.revoked.len(), 4);
        assert!(log.revoked[2..].iter().all(|(_, events)| *events));
        assert!(!core.event_types().contains(a));
    }

    #[test]
    fn test_update_keeps_type_and_query() {
        let mut core = Core::with_defaults();
        let mut rx = core.subscribe();
        let a = core.add_alert(alert("a"));
        let live = core.live_input_count();

        let mut edited = alert("renamed");
        edited.query.similarity_threshold = 0.9;
        core.update_alert(a, edited).unwrap();

        let stored = core.alert(a).unwrap();
        assert_eq!(stored.name(), "renamed");
        assert_eq!(stored.event_info.type_id, a);
        assert_eq!(stored.query.similarity_threshold, 0.2);
        assert_eq!(core.event_types().get(a).unwrap().name, "renamed");
        assert_eq!(core.live_input_count(), live);
        assert!(drain(&mut rx)
            .iter()
            .any(|n| matches!(n, CoreNotification::AlertChanged { id, .. } if *id == a)));
    }

    #[test]
    fn test_unknown_alert() {
        let mut core = Core::with_defaults();
        assert_eq!(
            core.set_alert_enabled(-4100, true),
            Err(CoreError::UnknownAlert(-4100))
        );
        assert!(core.remove_alert(-4100, false).is_err());
    }
}
