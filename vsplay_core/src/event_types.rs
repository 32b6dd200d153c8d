//! Event classifier types and the type registry.
//!
//! Classifier types share one signed id space:
//!
//! ```text
//!   > 0              classifier types reported by descriptors
//!   -3000 ..= -3999  built-in general types (tripwire, region entry/exit)
//!   -4000 ..= -4999  alert types, allocated downward
//!   <= -5000         user ("manual") types, allocated downward
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub type EventTypeId = i32;

pub const TRIPWIRE: EventTypeId = -3000;
pub const ENTERING_REGION: EventTypeId = -3001;
pub const EXITING_REGION: EventTypeId = -3002;
pub const ANNOTATION: EventTypeId = -3003;

/// First (highest) alert type id.
pub const QUERY_ALERT: EventTypeId = -4000;

/// First (highest) user type id.
pub const USER_TYPE: EventTypeId = -5000;

/// Display grouping of event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventGroup {
    Classifier,
    General,
    Alert,
    User,
}

impl EventGroup {
    pub fn of(type_id: EventTypeId) -> Self {
        if type_id > 0 {
            EventGroup::Classifier
        } else if type_id <= USER_TYPE {
            EventGroup::User
        } else if type_id <= QUERY_ALERT {
            EventGroup::Alert
        } else {
            EventGroup::General
        }
    }
}

// ============================================================================
// COLORS
// ============================================================================

/// 8-bit RGB color, serialized as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseColorError(pub String);

impl fmt::Display for ParseColorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid color '{}'", self.0)
    }
}

impl std::error::Error for ParseColorError {}

impl FromStr for Color {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().strip_prefix('#').unwrap_or(s.trim());
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(ParseColorError(s.to_string()));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| ParseColorError(s.to_string()))
        };
        Ok(Color::rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl Serialize for Color {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// EVENT INFO & REGISTRY
// ============================================================================

/// Display information for one event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventInfo {
    #[serde(default)]
    pub type_id: EventTypeId,
    pub name: String,
    pub pen_color: Color,
    pub foreground_color: Color,
    pub background_color: Color,
}

impl EventInfo {
    pub fn new(type_id: EventTypeId, name: impl Into<String>, pen_color: Color) -> Self {
        Self {
            type_id,
            name: name.into(),
            pen_color,
            foreground_color: Color::rgb(255, 255, 255),
            background_color: Color::rgb(0, 0, 0),
        }
    }

    pub fn group(&self) -> EventGroup {
        EventGroup::of(self.type_id)
    }
}

/// Registry of known event types and their display thresholds.
#[derive(Debug, Clone)]
pub struct EventTypeRegistry {
    types: BTreeMap<EventTypeId, EventInfo>,
    thresholds: BTreeMap<EventTypeId, f64>,
    next_alert_type: EventTypeId,
    next_user_type: EventTypeId,
}

impl EventTypeRegistry {
    /// Creates a registry pre-populated with the built-in general types.
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            types: BTreeMap::new(),
            thresholds: BTreeMap::new(),
            next_alert_type: QUERY_ALERT,
            next_user_type: USER_TYPE,
        };
        for info in [
            EventInfo::new(TRIPWIRE, "Tripwire", Color::rgb(255, 128, 0)),
            EventInfo::new(ENTERING_REGION, "Entering Region", Color::rgb(0, 200, 0)),
            EventInfo::new(EXITING_REGION, "Exiting Region", Color::rgb(200, 0, 0)),
            EventInfo::new(ANNOTATION, "Annotation", Color::rgb(255, 255, 0)),
        ] {
            registry.register(info);
        }
        registry
    }

    /// Adds or replaces a type. Returns true if the type was new.
    pub fn register(&mut self, info: EventInfo) -> bool {
        self.types.insert(info.type_id, info).is_none()
    }

    pub fn unregister(&mut self, type_id: EventTypeId) -> Option<EventInfo> {
        self.thresholds.remove(&type_id);
        self.types.remove(&type_id)
    }

    pub fn get(&self, type_id: EventTypeId) -> Option<&EventInfo> {
        self.types.get(&type_id)
    }

    pub fn contains(&self, type_id: EventTypeId) -> bool {
        self.types.contains_key(&type_id)
    }

    pub fn set_threshold(&mut self, type_id: EventTypeId, threshold: f64) {
        self.thresholds.insert(type_id, threshold);
    }

    pub fn threshold(&self, type_id: EventTypeId) -> Option<f64> {
        self.thresholds.get(&type_id).copied()
    }

    pub fn types(&self) -> impl Iterator<Item = &EventInfo> {
        self.types.values()
    }

    pub fn allocate_alert_type(&mut self) -> EventTypeId {
        let id = self.next_alert_type;
        self.next_alert_type -= 1;
        id
    }

    pub fn allocate_user_type(&mut self) -> EventTypeId {
        let id = self.next_user_type;
        self.next_user_type -= 1;
        id
    }
}

impl Default for EventTypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
