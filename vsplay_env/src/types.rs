//! Common types shared between the vsPlay core and its collaborators.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an attached descriptor source.
///
/// Uses UUID v4 for global uniqueness without coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(pub Uuid);

impl SourceId {
    /// Creates a new random SourceId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic SourceId from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Status reported by a video, track, or descriptor data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataSourceStatus {
    /// Nothing attached
    #[default]
    NoSource,
    StreamingIdle,
    StreamingActive,
    StreamingStopped,
    ArchivedIdle,
    ArchivedActive,
    ArchivedSuspended,
    InProcessIdle,
    InProcessActive,
    /// Several sources of one kind, mixed status
    MultipleSources,
}

impl DataSourceStatus {
    /// True when the source is currently delivering data.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::StreamingActive | Self::ArchivedActive | Self::InProcessActive
        )
    }

    /// True for live feeds (which never report an end of data).
    pub fn is_streaming(&self) -> bool {
        matches!(
            self,
            Self::StreamingIdle | Self::StreamingActive | Self::StreamingStopped
        )
    }

    /// Combines the status of two sources of the same kind.
    ///
    /// Identical statuses collapse; `NoSource` is neutral; anything else
    /// becomes `MultipleSources`.
    pub fn combine(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (Self::NoSource, b) => b,
            (a, Self::NoSource) => a,
            _ => Self::MultipleSources,
        }
    }
}

impl std::fmt::Display for DataSourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::NoSource => "No source",
            Self::StreamingIdle => "Streaming (idle)",
            Self::StreamingActive => "Streaming",
            Self::StreamingStopped => "Streaming (stopped)",
            Self::ArchivedIdle => "Archived (idle)",
            Self::ArchivedActive => "Archived",
            Self::ArchivedSuspended => "Archived (suspended)",
            Self::InProcessIdle => "Processing (idle)",
            Self::InProcessActive => "Processing",
            Self::MultipleSources => "Multiple sources",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_id_from_seed_is_stable() {
        assert_eq!(SourceId::from_seed(4), SourceId::from_seed(4));
        assert_ne!(SourceId::from_seed(4), SourceId::from_seed(5));
    }

    #[test]
    fn test_status_combine() {
        use DataSourceStatus::*;
        assert_eq!(NoSource.combine(ArchivedActive), ArchivedActive);
        assert_eq!(StreamingIdle.combine(StreamingIdle), StreamingIdle);
        assert_eq!(StreamingIdle.combine(ArchivedIdle), MultipleSources);
        assert!(InProcessActive.is_active());
        assert!(!ArchivedSuspended.is_active());
        assert!(StreamingStopped.is_streaming());
    }
}
