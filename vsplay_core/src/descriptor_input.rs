//! Descriptor inputs: the normalized stream broadcast to descriptor sources.
//!
//! Every accepted mutation is wrapped in an immutable [`DescriptorInput`],
//! assigned a strictly increasing [`InputId`], and kept in the
//! [`InputHistory`] until revoked so late-attaching sources can be replayed.

use crate::alert::SimilarityQuery;
use crate::contour::Contour;
use crate::event::{Event, IqrClassification, LogicalEventId};
use crate::event_types::EventTypeId;
use crate::metadata::FrameMetadata;
use crate::timestamp::TimeStamp;
use crate::track::{TrackClassification, TrackId, TrackState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

// ============================================================================
// KINDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputKind {
    Metadata,
    TrackUpdate,
    TrackClosure,
    TrackClassification,
    Event,
    EventRating,
    EventNote,
    TrackNote,
    Contour,
    Query,
}

impl InputKind {
    pub const ALL: [InputKind; 10] = [
        InputKind::Metadata,
        InputKind::TrackUpdate,
        InputKind::TrackClosure,
        InputKind::TrackClassification,
        InputKind::Event,
        InputKind::EventRating,
        InputKind::EventNote,
        InputKind::TrackNote,
        InputKind::Contour,
        InputKind::Query,
    ];

    const fn bit(self) -> u16 {
        1 << (self as u16)
    }

    /// Kinds whose revocation is announced to subscribers.
    ///
    /// Other kinds leave the history silently.
    pub fn is_revocable(&self) -> bool {
        matches!(self, InputKind::Event | InputKind::Contour | InputKind::Query)
    }
}

/// Set of input kinds (a source's accepted-input mask).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct InputKinds(u16);

impl InputKinds {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        InputKind::ALL.iter().copied().collect()
    }

    pub fn contains(&self, kind: InputKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn insert(&mut self, kind: InputKind) {
        self.0 |= kind.bit();
    }

    pub fn with(mut self, kind: InputKind) -> Self {
        self.insert(kind);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = InputKind> + '_ {
        InputKind::ALL.into_iter().filter(|k| self.contains(*k))
    }
}

impl From<InputKind> for InputKinds {
    fn from(kind: InputKind) -> Self {
        Self(kind.bit())
    }
}

impl FromIterator<InputKind> for InputKinds {
    fn from_iter<I: IntoIterator<Item = InputKind>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), |acc, k| acc.with(k))
    }
}

impl BitOr for InputKinds {
    type Output = InputKinds;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOr<InputKind> for InputKinds {
    type Output = InputKinds;
    fn bitor(self, rhs: InputKind) -> Self {
        self.with(rhs)
    }
}

impl BitOr for InputKind {
    type Output = InputKinds;
    fn bitor(self, rhs: Self) -> InputKinds {
        InputKinds::from(self).with(rhs)
    }
}

impl BitOrAssign for InputKinds {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

// ============================================================================
// ENVELOPE
// ============================================================================

/// Strictly increasing id of an emitted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InputId(pub u64);

impl fmt::Display for InputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "input#{}", self.0)
    }
}

/// Immutable payload of one emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DescriptorInput {
    Metadata(FrameMetadata),
    /// Stabilized track state
    TrackUpdate { track: TrackId, state: TrackState },
    TrackClosure { track: TrackId },
    TrackClassification {
        track: TrackId,
        classification: TrackClassification,
    },
    Event { id: LogicalEventId, event: Event },
    EventRating {
        id: LogicalEventId,
        classification: IqrClassification,
    },
    EventNote {
        id: LogicalEventId,
        note: String,
        start: TimeStamp,
        end: TimeStamp,
    },
    TrackNote {
        track: TrackId,
        note: String,
        start: Option<TimeStamp>,
        end: Option<TimeStamp>,
    },
    Contour(Contour),
    Query {
        alert_type: EventTypeId,
        query: SimilarityQuery,
    },
}

impl DescriptorInput {
    pub fn kind(&self) -> InputKind {
        match self {
            DescriptorInput::Metadata(_) => InputKind::Metadata,
            DescriptorInput::TrackUpdate { .. } => InputKind::TrackUpdate,
            DescriptorInput::TrackClosure { .. } => InputKind::TrackClosure,
            DescriptorInput::TrackClassification { .. } => InputKind::TrackClassification,
            DescriptorInput::Event { .. } => InputKind::Event,
            DescriptorInput::EventRating { .. } => InputKind::EventRating,
            DescriptorInput::EventNote { .. } => InputKind::EventNote,
            DescriptorInput::TrackNote { .. } => InputKind::TrackNote,
            DescriptorInput::Contour(_) => InputKind::Contour,
            DescriptorInput::Query { .. } => InputKind::Query,
        }
    }
}

// ============================================================================
// HISTORY
// ============================================================================

/// All live (not yet revoked) inputs, ordered by id.
#[derive(Debug, Clone)]
pub struct InputHistory {
    next_id: u64,
    entries: BTreeMap<InputId, Arc<DescriptorInput>>,
}

impl InputHistory {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            entries: BTreeMap::new(),
        }
    }

    /// Assigns the next id and records the input.
    pub fn push(&mut self, input: DescriptorInput) -> (InputId, Arc<DescriptorInput>) {
        let id = InputId(self.next_id);
        self.next_id += 1;
        let input = Arc::new(input);
        self.entries.insert(id, Arc::clone(&input));
        (id, input)
    }

    pub fn remove(&mut self, id: InputId) -> Option<Arc<DescriptorInput>> {
        self.entries.remove(&id)
    }

    pub fn get(&self, id: InputId) -> Option<&Arc<DescriptorInput>> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: InputId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Live entries accepted by `mask`, in emission order.
    pub fn replay(&self, mask: InputKinds) -> Vec<(InputId, Arc<DescriptorInput>)> {
        self.entries
            .iter()
            .filter(|(_, input)| mask.contains(input.kind()))
            .map(|(id, input)| (*id, Arc::clone(input)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for InputHistory {
    fn default() -> Self {
        Self::new()
    }
}
