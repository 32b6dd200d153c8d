//! Alert files (`.vsa` KST text, `.vsax` XML).
//!
//! Both encodings carry the same three parts: a header, the alert's event
//! set info (name, pen/foreground/background colors, display threshold),
//! and its query plan.

use super::kst::{self, KstRecord, KstValue};
use super::{FileFormat, PersistenceError, PersistenceResult};
use crate::alert::{Alert, SimilarityQuery};
use crate::event_types::{Color, EventInfo};
use std::path::Path;

const KST_HEADER: &str = "ALERT";
const KST_EVENT_SET_INFO: &str = "EVENT_SET_INFO";
const KST_QUERY_PLAN: &str = "QUERY_PLAN";
const FORMAT_VERSION: i64 = 1;

/// Reads an alert, choosing the encoding from the file extension.
pub fn load_alert(path: &Path) -> PersistenceResult<Alert> {
    let content = std::fs::read_to_string(path)?;
    parse_alert(&content, FileFormat::from_path(path))
}

/// Writes an alert, choosing the encoding from the file extension.
pub fn write_alert(alert: &Alert, path: &Path) -> PersistenceResult<()> {
    std::fs::write(path, serialize_alert(alert, FileFormat::from_path(path)))?;
    Ok(())
}

pub fn parse_alert(text: &str, format: FileFormat) -> PersistenceResult<Alert> {
    match format {
        FileFormat::Kst => parse_kst(text),
        FileFormat::Xml => parse_xml(text),
    }
}

pub fn serialize_alert(alert: &Alert, format: FileFormat) -> String {
    match format {
        FileFormat::Kst => serialize_kst(alert),
        FileFormat::Xml => serialize_xml(alert),
    }
}

// ============================================================================
// KST
// ============================================================================

fn serialize_kst(alert: &Alert) -> String {
    let info = &alert.event_info;
    let mut out = String::new();
    out.push_str("# vsPlay alert\n");
    out.push_str(&format!("{}, {};\n", KST_HEADER, FORMAT_VERSION));
    out.push_str(&format!("{};\n", KST_EVENT_SET_INFO));
    out.push_str(&format!(
        "{}, {}, {}, {}, {};\n",
        kst::quote(&info.name),
        info.pen_color,
        info.foreground_color,
        info.background_color,
        alert.display_threshold
    ));
    out.push_str(&format!(
        "{}, {};\n",
        KST_QUERY_PLAN,
        alert.query.descriptors.len()
    ));
    out.push_str(&format!(
        "{}, {};\n",
        kst::quote(&alert.query.query_id),
        alert.query.similarity_threshold
    ));
    for d in &alert.query.descriptors {
        out.push_str(&format!("{};\n", kst::quote(d)));
    }
    out
}

fn expect_keyword<'a>(
    records: &'a [KstRecord],
    index: usize,
    keyword: &str,
) -> PersistenceResult<&'a KstRecord> {
    let record = records
        .get(index)
        .ok_or_else(|| PersistenceError::malformed(format!("missing {} record", keyword)))?;
    match record.first().and_then(KstValue::as_bare) {
        Some(k) if k == keyword => Ok(record),
        _ => Err(PersistenceError::malformed(format!(
            "expected {} record",
            keyword
        ))),
    }
}

fn field<'a>(record: &'a KstRecord, index: usize, what: &str) -> PersistenceResult<&'a KstValue> {
    record
        .get(index)
        .ok_or_else(|| PersistenceError::malformed(format!("missing {}", what)))
}

fn color_field(record: &KstRecord, index: usize, what: &str) -> PersistenceResult<Color> {
    field(record, index, what)?
        .as_color()
        .ok_or_else(|| PersistenceError::malformed(format!("bad {}", what)))
}

fn real_field(record: &KstRecord, index: usize, what: &str) -> PersistenceResult<f64> {
    field(record, index, what)?
        .as_f64()
        .ok_or_else(|| PersistenceError::malformed(format!("bad {}", what)))
}

fn parse_kst(text: &str) -> PersistenceResult<Alert> {
    let records = kst::parse_records(text)?;

    let header = expect_keyword(&records, 0, KST_HEADER)?;
    let version = field(header, 1, "format version")?
        .as_i64()
        .ok_or_else(|| PersistenceError::malformed("bad format version"))?;
    if version != FORMAT_VERSION {
        return Err(PersistenceError::malformed(format!(
            "unsupported alert version {}",
            version
        )));
    }

    expect_keyword(&records, 1, KST_EVENT_SET_INFO)?;
    let info = records
        .get(2)
        .ok_or_else(|| PersistenceError::malformed("missing event set info"))?;
    let name = match field(info, 0, "name")? {
        KstValue::Str(s) => s.clone(),
        KstValue::Bare(_) => return Err(PersistenceError::malformed("name must be quoted")),
    };
    let event_info = EventInfo {
        type_id: 0,
        name,
        pen_color: color_field(info, 1, "pen color")?,
        foreground_color: color_field(info, 2, "foreground color")?,
        background_color: color_field(info, 3, "background color")?,
    };
    let display_threshold = real_field(info, 4, "display threshold")?;

    let plan = expect_keyword(&records, 3, KST_QUERY_PLAN)?;
    let count = field(plan, 1, "descriptor count")?
        .as_i64()
        .filter(|n| *n >= 0)
        .ok_or_else(|| PersistenceError::malformed("bad descriptor count"))? as usize;
    let query_record = records
        .get(4)
        .ok_or_else(|| PersistenceError::malformed("missing query"))?;
    let query_id = field(query_record, 0, "query id")?.text().to_string();
    let similarity_threshold = real_field(query_record, 1, "similarity threshold")?;

    let mut descriptors = Vec::with_capacity(count);
    for i in 0..count {
        let record = records
            .get(5 + i)
            .ok_or_else(|| PersistenceError::malformed("truncated query plan"))?;
        descriptors.push(field(record, 0, "descriptor")?.text().to_string());
    }

    Ok(Alert {
        event_info,
        query: SimilarityQuery {
            query_id,
            descriptors,
            similarity_threshold,
        },
        display_threshold,
    })
}

// ============================================================================
// XML
// ============================================================================

fn serialize_xml(alert: &Alert) -> String {
    let info = &alert.event_info;
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!("<vsAlert version=\"{}\">\n", FORMAT_VERSION));
    xml.push_str(&format!(
        "  <EventSetInfo name=\"{}\" penColor=\"{}\" foregroundColor=\"{}\" backgroundColor=\"{}\" threshold=\"{}\"/>\n",
        escape_xml(&info.name),
        info.pen_color,
        info.foreground_color,
        info.background_color,
        alert.display_threshold
    ));
    xml.push_str(&format!(
        "  <QueryPlan id=\"{}\" similarityThreshold=\"{}\">\n",
        escape_xml(&alert.query.query_id),
        alert.query.similarity_threshold
    ));
    for d in &alert.query.descriptors {
        xml.push_str(&format!("    <Descriptor>{}</Descriptor>\n", escape_xml(d)));
    }
    xml.push_str("  </QueryPlan>\n");
    xml.push_str("</vsAlert>\n");
    xml
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn attr<'a>(node: &roxmltree::Node<'a, '_>, name: &str) -> PersistenceResult<&'a str> {
    node.attribute(name).ok_or_else(|| {
        PersistenceError::malformed(format!(
            "<{}> missing attribute '{}'",
            node.tag_name().name(),
            name
        ))
    })
}

fn attr_color(node: &roxmltree::Node, name: &str) -> PersistenceResult<Color> {
    attr(node, name)?
        .parse()
        .map_err(|_| PersistenceError::malformed(format!("bad {}", name)))
}

fn attr_real(node: &roxmltree::Node, name: &str) -> PersistenceResult<f64> {
    attr(node, name)?
        .trim()
        .parse()
        .map_err(|_| PersistenceError::malformed(format!("bad {}", name)))
}

fn parse_xml(text: &str) -> PersistenceResult<Alert> {
    let doc = roxmltree::Document::parse(text)
        .map_err(|e| PersistenceError::Xml(format!("XML parse error: {}", e)))?;

    let root = doc.root_element();
    if root.tag_name().name() != "vsAlert" {
        return Err(PersistenceError::malformed("root element must be <vsAlert>"));
    }

    let child = |name: &str| {
        root.children()
            .find(|n| n.is_element() && n.tag_name().name() == name)
            .ok_or_else(|| PersistenceError::malformed(format!("missing <{}>", name)))
    };

    let info_node = child("EventSetInfo")?;
    let event_info = EventInfo {
        type_id: 0,
        name: attr(&info_node, "name")?.to_string(),
        pen_color: attr_color(&info_node, "penColor")?,
        foreground_color: attr_color(&info_node, "foregroundColor")?,
        background_color: attr_color(&info_node, "backgroundColor")?,
    };
    let display_threshold = attr_real(&info_node, "threshold")?;

    let plan = child("QueryPlan")?;
    let query = SimilarityQuery {
        query_id: attr(&plan, "id")?.to_string(),
        similarity_threshold: attr_real(&plan, "similarityThreshold")?,
        descriptors: plan
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "Descriptor")
            .map(|n| n.text().unwrap_or_default().trim().to_string())
            .collect(),
    };

    Ok(Alert {
        event_info,
        query,
        display_threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Alert {
        let mut alert = Alert::new(
            "Red \"sedan\" & friends",
            SimilarityQuery {
                query_id: "q-17".into(),
                descriptors: vec!["color_hist".into(), "motion <fast>".into()],
                similarity_threshold: 0.35,
            },
            0.6,
        );
        alert.event_info.pen_color = Color::rgb(200, 10, 10);
        alert
    }

    #[test]
    fn test_kst_layout() {
        let text = serialize_alert(&sample(), FileFormat::Kst);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[1], "ALERT, 1;");
        assert_eq!(lines[2], "EVENT_SET_INFO;");
        assert!(lines[3].contains("#c80a0a"));
        assert_eq!(lines[4], "QUERY_PLAN, 2;");
    }

    #[test]
    fn test_kst_parse_preserves_fields() {
        let alert = sample();
        let parsed = parse_alert(&serialize_alert(&alert, FileFormat::Kst), FileFormat::Kst).unwrap();
        assert_eq!(parsed, alert);
    }

    #[test]
    fn test_xml_parse_preserves_fields() {
        let alert = sample();
        let xml = serialize_alert(&alert, FileFormat::Xml);
        assert!(xml.contains("&quot;sedan&quot;"));
        let parsed = parse_alert(&xml, FileFormat::Xml).unwrap();
        assert_eq!(parsed, alert);
    }

    #[test]
    fn test_kst_rejects_bad_header() {
        let err = parse_alert("FILTERS;\n", FileFormat::Kst).unwrap_err();
        assert!(matches!(err, PersistenceError::Malformed(_)));
    }

    #[test]
    fn test_kst_rejects_truncated_plan() {
        let text = "ALERT, 1;\nEVENT_SET_INFO;\n\"a\", #000000, #000000, #000000, 0.5;\nQUERY_PLAN, 3;\n\"q\", 0.1;\n\"d1\";\n";
        assert!(parse_alert(text, FileFormat::Kst).is_err());
    }

    #[test]
    fn test_xml_rejects_wrong_root() {
        assert!(parse_alert("<Chapters/>", FileFormat::Xml).is_err());
        assert!(matches!(
            parse_alert("<vsAlert", FileFormat::Xml),
            Err(PersistenceError::Xml(_))
        ));
    }

    #[test]
    fn test_file_extension_selects_format() {
        let dir = tempfile::tempdir().unwrap();
        let alert = sample();
        for name in ["a.vsa", "b.vsax"] {
            let path = dir.path().join(name);
            write_alert(&alert, &path).unwrap();
            let text = std::fs::read_to_string(&path).unwrap();
            assert_eq!(text.starts_with("<?xml"), name.ends_with('x'));
            assert_eq!(load_alert(&path).unwrap(), alert);
        }
    }
}
