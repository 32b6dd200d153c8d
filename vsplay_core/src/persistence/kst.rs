//! KST record text: `;`-terminated records of `,`-separated values.
//!
//! Values are bare tokens or double-quoted strings (with `\"` and `\\`
//! escapes). A `#` at the start of a record comments out the rest of the
//! line.

use super::{PersistenceError, PersistenceResult};
use crate::event_types::Color;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum KstValue {
    Str(String),
    Bare(String),
}

impl KstValue {
    pub fn text(&self) -> &str {
        match self {
            KstValue::Str(s) | KstValue::Bare(s) => s,
        }
    }

    pub fn as_bare(&self) -> Option<&str> {
        match self {
            KstValue::Bare(s) => Some(s),
            KstValue::Str(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_bare()?.parse().ok()
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_bare()?.parse().ok()
    }

    pub fn as_color(&self) -> Option<Color> {
        self.as_bare()?.parse().ok()
    }
}

pub(crate) type KstRecord = Vec<KstValue>;

pub(crate) fn parse_records(text: &str) -> PersistenceResult<Vec<KstRecord>> {
    let mut records = Vec::new();
    let mut record: KstRecord = Vec::new();
    let mut token = String::new();
    let mut quoted: Option<String> = None;
    let mut chars = text.chars().peekable();

    let finish_value = |record: &mut KstRecord, token: &mut String, quoted: &mut Option<String>| {
        if let Some(s) = quoted.take() {
            record.push(KstValue::Str(s));
        } else {
            let t = token.trim();
            if !t.is_empty() {
                record.push(KstValue::Bare(t.to_string()));
            }
        }
        token.clear();
    };

    while let Some(c) = chars.next() {
        match c {
            '#' if record.is_empty() && quoted.is_none() && token.trim().is_empty() => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
                token.clear();
            }
            '"' if quoted.is_none() && token.trim().is_empty() => {
                let mut s = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                s.push(escaped);
                            }
                        }
                        '"' => {
                            closed = true;
                            break;
                        }
                        _ => s.push(c),
                    }
                }
                if !closed {
                    return Err(PersistenceError::malformed("unterminated string"));
                }
                quoted = Some(s);
                token.clear();
            }
            ',' => finish_value(&mut record, &mut token, &mut quoted),
            ';' => {
                finish_value(&mut record, &mut token, &mut quoted);
                records.push(std::mem::take(&mut record));
            }
            _ if quoted.is_some() => {
                if !c.is_whitespace() {
                    return Err(PersistenceError::malformed(format!(
                        "unexpected '{}' after string",
                        c
                    )));
                }
            }
            _ => token.push(c),
        }
    }

    finish_value(&mut record, &mut token, &mut quoted);
    if !record.is_empty() {
        records.push(record);
    }
    Ok(records)
}

/// Quotes a string value for output.
pub(crate) fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_records() {
        let text = "HEADER;\n# a comment, with commas; and semicolons\n\"a \\\"b\\\"\", 12, #ff0000;\n";
        let records = parse_records(text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], vec![KstValue::Bare("HEADER".into())]);
        assert_eq!(records[1][0], KstValue::Str("a \"b\"".into()));
        assert_eq!(records[1][1].as_i64(), Some(12));
        assert!(records[1][2].as_color().is_some());
    }

    #[test]
    fn test_empty_string_value_kept() {
        let records = parse_records("\"\", 1;").unwrap();
        assert_eq!(records[0][0], KstValue::Str(String::new()));
    }

    #[test]
    fn test_trailing_record_without_terminator() {
        let records = parse_records("A;\nB, 2").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1][1].as_i64(), Some(2));
    }

    #[test]
    fn test_unterminated_string() {
        assert!(parse_records("\"abc;").is_err());
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("a\"b"), "\"a\\\"b\"");
        let records = parse_records(&format!("{};", quote("x\\y\"z"))).unwrap();
        assert_eq!(records[0][0].text(), "x\\y\"z");
    }
}
