//! Analyst-drawn contours.

use super::{ContourRecord, Core, CoreError};
use crate::contour::{Contour, ContourType};
use crate::descriptor_input::{DescriptorInput, InputId, InputKind};
use crate::event::EventId;
use crate::event_types::EventTypeId;
use crate::notification::CoreNotification;
use crate::timestamp::TimeStamp;
use tracing::warn;

impl Core {
    pub fn create_contour_id(&mut self) -> i32 {
        let id = self.next_contour_id;
        self.next_contour_id += 1;
        id
    }

    fn emit_contour(&mut self, contour: &Contour) -> InputId {
        if contour.kind == ContourType::Tripwire {
            self.ensure_tripwire_source();
        }
        self.emit_input(DescriptorInput::Contour(contour.clone()))
    }

    pub fn add_contour(&mut self, contour: Contour) {
        let input_id = self.emit_contour(&contour);
        self.contours.insert(
            contour.id,
            ContourRecord {
                contour: contour.clone(),
                input_id,
            },
        );
        self.notify(CoreNotification::ContourAdded(contour));
    }

    /// Renames a contour. Returns false for unknown ids.
    pub fn set_contour_name(&mut self, id: i32, name: &str) -> bool {
        let Some(record) = self.contours.get_mut(&id) else {
            return false;
        };
        if record.contour.name != name {
            record.contour.name = name.to_string();
            self.notify(CoreNotification::ContourNameChanged {
                id,
                name: name.to_string(),
            });
        }
        true
    }

    /// Changes a contour's type, re-emitting it so descriptors rebuild their
    /// state.
    ///
    /// Loop types need a closed polygon; an open one is closed if it has at
    /// least three points. Otherwise the change is rejected: a status
    /// message is published along with a type notification carrying the
    /// unchanged type, and `Ok(false)` is returned.
    pub fn set_contour_type(&mut self, id: i32, kind: ContourType) -> Result<bool, CoreError> {
        let record = self.contours.get_mut(&id).ok_or(CoreError::UnknownContour(id))?;
        let old = record.contour.kind;
        if old == kind {
            return Ok(true);
        }

        if kind.is_loop_type() && !record.contour.is_closed() {
            if !record.contour.close() {
                warn!(
                    "Contour {} has {} points, too few to become {:?}",
                    id,
                    record.contour.points.len(),
                    kind
                );
                self.notify(CoreNotification::StatusMessage(
                    "Not enough points in region".to_string(),
                ));
                self.notify(CoreNotification::ContourTypeChanged { id, kind: old });
                return Ok(false);
            }
            let points = record.contour.points.clone();
            self.notify(CoreNotification::ContourPointsChanged { id, points });
        }

        let (previous_input, contour) = match self.contours.get_mut(&id) {
            Some(record) => {
                record.contour.kind = kind;
                (record.input_id, record.contour.clone())
            }
            None => return Err(CoreError::UnknownContour(id)),
        };
        self.revoke_input(InputKind::Contour, previous_input, true);
        let input_id = self.emit_contour(&contour);
        if let Some(record) = self.contours.get_mut(&id) {
            record.input_id = input_id;
        }

        self.notify(CoreNotification::ContourTypeChanged { id, kind });
        self.notify(CoreNotification::Updated);
        Ok(true)
    }

    pub fn remove_contour(&mut self, id: i32, remove_events: bool) -> Result<Contour, CoreError> {
        let record = self.contours.remove(&id).ok_or(CoreError::UnknownContour(id))?;
        self.revoke_input(InputKind::Contour, record.input_id, remove_events);
        self.notify(CoreNotification::ContourRemoved(id));
        self.notify(CoreNotification::Updated);
        Ok(record.contour)
    }

    /// Turns a contour into a manual event of `type_id` at `time`, then
    /// removes the contour.
    pub fn convert_contour_to_event(
        &mut self,
        id: i32,
        type_id: EventTypeId,
        time: TimeStamp,
    ) -> Result<EventId, CoreError> {
        let points = self
            .contours
            .get(&id)
            .map(|r| r.contour.points.clone())
            .ok_or(CoreError::UnknownContour(id))?;
        let event = self.create_manual_event(type_id, &points, time);
        self.remove_contour(id, true)?;
        Ok(event)
    }

    pub fn contour(&self, id: i32) -> Option<&Contour> {
        self.contours.get(&id).map(|r| &r.contour)
    }

    pub fn contours(&self) -> impl Iterator<Item = &Contour> {
        self.contours.values().map(|r| &r.contour)
    }
}
