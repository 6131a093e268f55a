use super::identifier::{ColumnName, IdentifierError};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Separator used when an array value is flattened into a single cell.
pub const ARRAY_SEPARATOR: &str = ",";

/// Body of an ingest request.
#[derive(Debug, Deserialize)]
pub struct Payload {
    #[serde(rename = "PCID")]
    pub connection_id: String,
    #[serde(rename = "Reports")]
    pub reports: Map<String, Value>,
}

/// A report flattened into column/value pairs, ready for the writer.
#[derive(Debug, Default)]
pub struct ReportRow {
    pub fields: Vec<(ColumnName, Option<String>)>,
    /// Fields that could not be mapped to a column.
    pub dropped: Vec<IdentifierError>,
}

impl ReportRow {
    /// Flattens one report body. Returns `None` when the body is not an object.
    pub fn from_report(body: &Value) -> Option<Self> {
        let object = body.as_object()?;
        let mut row = ReportRow::default();
        let mut seen = HashSet::with_capacity(object.len());

        for (raw_name, value) in object {
            let name = match ColumnName::from_field(raw_name) {
                Ok(name) => name,
                Err(err) => {
                    row.dropped.push(err);
                    continue;
                }
            };
            if !seen.insert(name.key()) {
                row.dropped.push(IdentifierError::Duplicate {
                    raw: raw_name.clone(),
                    name: name.to_string(),
                });
                continue;
            }
            row.fields.push((name, stringify(value)));
        }
        Some(row)
    }
}

/// Renders a JSON value the way it is bound into the table.
///
/// The same logical value always renders the same way: `3` and `"3"` both
/// become `3`. Booleans become `1`/`0` and JSON null is SQL NULL.
pub fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Array(items) => Some(
            items
                .iter()
                .map(|item| stringify(item).unwrap_or_default())
                .collect::<Vec<_>>()
                .join(ARRAY_SEPARATOR),
        ),
        Value::Bool(flag) => Some(if *flag { "1" } else { "0" }.to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) => Some(text.clone()),
        Value::Object(_) => Some(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_payload() {
        let payload: Payload = serde_json::from_str(
            r#"{"PCID":"1","Reports":{"r1":{"type":"codec","clockRate":90000}}}"#,
        )
        .unwrap();
        assert_eq!(payload.connection_id, "1");
        assert_eq!(payload.reports.len(), 1);
        assert!(payload.reports["r1"].is_object());
    }

    #[test]
    fn rejects_payload_without_pcid() {
        assert!(serde_json::from_str::<Payload>(r#"{"Reports":{}}"#).is_err());
        assert!(serde_json::from_str::<Payload>(r#"{"PCID":1,"Reports":{}}"#).is_err());
        assert!(serde_json::from_str::<Payload>(r#"{"PCID":"1"}"#).is_err());
    }

    #[test]
    fn stringify_is_uniform() {
        assert_eq!(stringify(&json!(3)), Some("3".to_string()));
        assert_eq!(stringify(&json!("3")), Some("3".to_string()));
        assert_eq!(stringify(&json!(1.5)), Some("1.5".to_string()));
        assert_eq!(stringify(&json!(true)), Some("1".to_string()));
        assert_eq!(stringify(&json!(false)), Some("0".to_string()));
        assert_eq!(stringify(&json!(null)), None);
        assert_eq!(stringify(&json!("")), Some("".to_string()));
    }

    #[test]
    fn stringify_flattens_arrays() {
        assert_eq!(
            stringify(&json!(["a", "b", 3])),
            Some("a,b,3".to_string())
        );
        assert_eq!(stringify(&json!([1, null, 2])), Some("1,,2".to_string()));
        assert_eq!(stringify(&json!([])), Some("".to_string()));
    }

    #[test]
    fn stringify_keeps_objects_as_json() {
        assert_eq!(
            stringify(&json!({"a": 1})),
            Some(r#"{"a":1}"#.to_string())
        );
    }

    #[test]
    fn report_row_maps_fields() {
        let row = ReportRow::from_report(&json!({
            "type": "inbound-rtp",
            "packets_lost": 3,
            "codecs": ["opus", "vp8"],
        }))
        .unwrap();

        let fields: Vec<(&str, Option<&str>)> = row
            .fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
            .collect();
        assert!(fields.contains(&("type", Some("inbound-rtp"))));
        assert!(fields.contains(&("packetslost", Some("3"))));
        assert!(fields.contains(&("codecs", Some("opus,vp8"))));
        assert!(row.dropped.is_empty());
    }

    #[test]
    fn report_row_drops_unusable_and_colliding_fields() {
        let row = ReportRow::from_report(&json!({
            "a_b": 1,
            "ab": 2,
            "AB": 3,
            "???": 4,
            "pcid": "spoofed",
        }))
        .unwrap();

        assert_eq!(row.fields.len(), 1);
        assert_eq!(row.dropped.len(), 4);
        let kinds: Vec<_> = row.dropped.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds.iter().filter(|k| **k == "duplicate").count(), 2);
        assert!(kinds.contains(&"empty"));
        assert!(kinds.contains(&"reserved"));
    }

    #[test]
    fn first_colliding_field_in_document_order_wins() {
        let report: Value = serde_json::from_str(r#"{"a_b":1,"AB":2}"#).unwrap();
        let row = ReportRow::from_report(&report).unwrap();

        assert_eq!(row.fields.len(), 1);
        assert_eq!(row.fields[0].0.as_str(), "ab");
        assert_eq!(row.fields[0].1.as_deref(), Some("1"));
        assert_eq!(row.dropped.len(), 1);
        assert_eq!(row.dropped[0].kind(), "duplicate");
        assert!(row.dropped[0].to_string().contains("AB"));
    }

    #[test]
    fn report_row_requires_object() {
        assert!(ReportRow::from_report(&json!([1, 2])).is_none());
        assert!(ReportRow::from_report(&json!("text")).is_none());
    }
}
