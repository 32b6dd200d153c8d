//! The descriptor-source seam.
//!
//! A descriptor source is an analytic component that consumes the core's
//! descriptor-input stream and produces events (and related data) back.
//! Sources never call into the core directly: whatever they produce is
//! queued and collected by the core at the end of the processing turn.

use crate::descriptor::Descriptor;
use crate::descriptor_input::{DescriptorInput, InputId, InputKinds};
use crate::event::Event;
use crate::event_types::{EventGroup, EventInfo};
use crate::track::{TrackClassification, TrackId};
use std::sync::Arc;
use vsplay_env::DataSourceStatus;

/// Something a descriptor source hands back to the core.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutput {
    /// New or updated event (keyed by the event's source-local id)
    Event(Event),
    /// Withdraw a previously reported event by source-local id
    RevokeEvent(i64),
    /// Source-local event type to be mapped into the user range
    EventType { info: EventInfo, threshold: f64 },
    ExpectGroup(EventGroup),
    Descriptor(Descriptor),
    TrackClassification {
        track: TrackId,
        classification: TrackClassification,
    },
    Status(DataSourceStatus),
}

/// A pluggable consumer/producer of descriptor inputs.
pub trait DescriptorSource: Send {
    fn name(&self) -> &str;

    /// Input kinds this source wants delivered.
    fn accepted_inputs(&self) -> InputKinds;

    /// Delivers one input (live or replayed).
    fn inject_input(&mut self, id: InputId, input: Arc<DescriptorInput>);

    /// Withdraws a previously delivered input.
    ///
    /// `revoke_events` asks the source to also withdraw any events it
    /// derived from that input.
    fn revoke_input(&mut self, id: InputId, revoke_events: bool);

    /// Takes everything produced since the last call.
    fn drain_output(&mut self) -> Vec<SourceOutput>;
}
