//! Alerts: persistent similarity queries surfaced as event types.

use crate::event_types::{Color, EventInfo};
use serde::{Deserialize, Serialize};

/// A similarity query handed to query-capable descriptors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimilarityQuery {
    pub query_id: String,
    /// Opaque descriptor names/identifiers making up the query plan
    pub descriptors: Vec<String>,
    pub similarity_threshold: f64,
}

/// A named query plus its display attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub event_info: EventInfo,
    pub query: SimilarityQuery,
    pub display_threshold: f64,
}

impl Alert {
    pub fn new(name: impl Into<String>, query: SimilarityQuery, display_threshold: f64) -> Self {
        Self {
            event_info: EventInfo::new(0, name, Color::rgb(255, 0, 255)),
            query,
            display_threshold,
        }
    }

    pub fn name(&self) -> &str {
        &self.event_info.name
    }
}
