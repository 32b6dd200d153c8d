//! Event filter settings (`.vpefs`).

use super::kst::{self, KstRecord};
use super::{PersistenceError, PersistenceResult};
use crate::event_types::EventTypeId;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

/// Record type standing in for the ground-truth visibility toggle.
pub const GROUND_TRUTH_FILTER: EventTypeId = -10000;

const HEADER: &str = "FILTERS";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterState {
    pub visible: bool,
    pub threshold: f64,
}

/// Per-type visibility and threshold, plus the ground-truth toggle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSettings {
    pub ground_truth_visible: Option<bool>,
    pub filters: BTreeMap<EventTypeId, FilterState>,
}

impl FilterSettings {
    pub fn load(path: &Path) -> PersistenceResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn write(&self, path: &Path) -> PersistenceResult<()> {
        std::fs::write(path, self.serialize())?;
        Ok(())
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("{};\n", HEADER));
        out.push_str("# Type, Visibility, Threshold\n");
        if let Some(visible) = self.ground_truth_visible {
            out.push_str(&format!("{}, {};\n", GROUND_TRUTH_FILTER, visible as i32));
        }
        for (type_id, state) in &self.filters {
            out.push_str(&format!(
                "{}, {}, {};\n",
                type_id, state.visible as i32, state.threshold
            ));
        }
        out
    }

    /// Parses filter settings. A bad header fails the whole file; bad
    /// records are skipped.
    pub fn parse(text: &str) -> PersistenceResult<Self> {
        let records = kst::parse_records(text)?;
        let mut iter = records.into_iter();

        let header_ok = iter
            .next()
            .map(|r| r.len() == 1 && r[0].as_bare() == Some(HEADER))
            .unwrap_or(false);
        if !header_ok {
            return Err(PersistenceError::malformed(
                "Unable to load filter settings file",
            ));
        }

        let mut settings = FilterSettings::default();
        for (index, record) in iter.enumerate() {
            if let Err(reason) = settings.apply_record(&record) {
                warn!("Skipping filter record {}: {}", index + 1, reason);
            }
        }
        Ok(settings)
    }

    fn apply_record(&mut self, record: &KstRecord) -> Result<(), &'static str> {
        let type_id = record
            .first()
            .and_then(|v| v.as_i64())
            .and_then(|v| EventTypeId::try_from(v).ok())
            .ok_or("bad type")?;
        let visible = record
            .get(1)
            .and_then(|v| v.as_i64())
            .ok_or("bad visibility")?
            != 0;

        if type_id == GROUND_TRUTH_FILTER {
            self.ground_truth_visible = Some(visible);
            return Ok(());
        }

        let threshold = record
            .get(2)
            .and_then(|v| v.as_f64())
            .ok_or("bad threshold")?;
        self.filters
            .insert(type_id, FilterState { visible, threshold });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FilterSettings {
        let mut settings = FilterSettings {
            ground_truth_visible: Some(false),
            ..Default::default()
        };
        settings.filters.insert(
            3,
            FilterState {
                visible: true,
                threshold: 0.25,
            },
        );
        settings.filters.insert(
            -5000,
            FilterState {
                visible: false,
                threshold: 0.0,
            },
        );
        settings
    }

    #[test]
    fn test_serialize_layout() {
        let text = sample().serialize();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "FILTERS;");
        assert_eq!(lines[1], "# Type, Visibility, Threshold");
        assert_eq!(lines[2], "-10000, 0;");
        assert_eq!(lines[3], "-5000, 0, 0;");
        assert_eq!(lines[4], "3, 1, 0.25;");
    }

    #[test]
    fn test_parse_written_settings() {
        let settings = sample();
        assert_eq!(FilterSettings::parse(&settings.serialize()).unwrap(), settings);
    }

    #[test]
    fn test_bad_header_rejected() {
        let err = FilterSettings::parse("ALERT, 1;\n3, 1, 0.5;\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Malformed file: Unable to load filter settings file"
        );
        assert!(FilterSettings::parse("").is_err());
    }

    #[test]
    fn test_bad_records_skipped() {
        let text = "FILTERS;\n7, 1;\nx, 1, 0.5;\n8, 0, 0.75;\n-10000, 1;\n";
        let settings = FilterSettings::parse(text).unwrap();
        assert_eq!(settings.filters.len(), 1);
        assert_eq!(settings.filters[&8].threshold, 0.75);
        assert!(!settings.filters[&8].visible);
        assert_eq!(settings.ground_truth_visible, Some(true));
    }

    #[test]
    fn test_file_io() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filters.vpefs");
        sample().write(&path).unwrap();
        assert_eq!(FilterSettings::load(&path).unwrap(), sample());
    }
}
