//! Reconciliation stress scenarios.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// Every homography arrives before the states of its frame
    InOrder,

    /// States arrive several frames before their homographies
    HomographyLag,

    /// Shuffled, delayed delivery of states and metadata within a window
    Jitter,

    /// A recording descriptor attaches halfway through the run
    LateJoiner,

    /// Every event is submitted again and again, some before their tracks
    DuplicateEvents,

    /// Alerts come and go while a query responder reports matches
    AlertChurn,

    /// A tripwire contour is drawn across the movers' paths mid-run
    Tripwire,

    /// The scene is replayed as an archived feed into a spawned service
    Playback,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::InOrder,
            ScenarioId::HomographyLag,
            ScenarioId::Jitter,
            ScenarioId::LateJoiner,
            ScenarioId::DuplicateEvents,
            ScenarioId::AlertChurn,
            ScenarioId::Tripwire,
            ScenarioId::Playback,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::InOrder => "in_order",
            ScenarioId::HomographyLag => "homography_lag",
            ScenarioId::Jitter => "jitter",
            ScenarioId::LateJoiner => "late_joiner",
            ScenarioId::DuplicateEvents => "duplicate_events",
            ScenarioId::AlertChurn => "alert_churn",
            ScenarioId::Tripwire => "tripwire",
            ScenarioId::Playback => "playback",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::InOrder => "Homographies ahead of states; baseline reconciliation",
            ScenarioId::HomographyLag => "States 1-6 frames ahead of homographies; deferral and replay",
            ScenarioId::Jitter => "Random per-message delays and shuffled turns",
            ScenarioId::LateJoiner => "Descriptor attaches mid-stream and must see the same history",
            ScenarioId::DuplicateEvents => "Events re-submitted every frame, some before their tracks",
            ScenarioId::AlertChurn => "Alerts added, toggled, edited and removed under live matches",
            ScenarioId::Tripwire => "Tripwire across the scene; crossings become events",
            ScenarioId::Playback => "Archived feed paced on the virtual clock into a spawned service",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "in_order" | "inorder" => Ok(ScenarioId::InOrder),
            "homography_lag" | "lag" => Ok(ScenarioId::HomographyLag),
            "jitter" => Ok(ScenarioId::Jitter),
            "late_joiner" | "latejoiner" => Ok(ScenarioId::LateJoiner),
            "duplicate_events" | "duplicates" => Ok(ScenarioId::DuplicateEvents),
            "alert_churn" | "alerts" => Ok(ScenarioId::AlertChurn),
            "tripwire" => Ok(ScenarioId::Tripwire),
            "playback" | "archive" => Ok(ScenarioId::Playback),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for id in ScenarioId::all() {
            assert_eq!(id.name().parse::<ScenarioId>(), Ok(id));
            assert_eq!(id.to_string(), id.name());
        }
    }

    #[test]
    fn test_aliases_and_unknown() {
        assert_eq!("Late-Joiner".parse(), Ok(ScenarioId::LateJoiner));
        assert_eq!("lag".parse(), Ok(ScenarioId::HomographyLag));
        assert_eq!("archive".parse(), Ok(ScenarioId::Playback));
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }
}
