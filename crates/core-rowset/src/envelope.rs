//! Wire envelope types shared between producers and the client.
//!
//! The streaming reader never deserializes an envelope whole; these types
//! exist for the other side of the wire (servers and test fixtures emitting
//! responses) and for the tiny schema-only introspection path, which reads
//! the body in one piece.

use serde::{Deserialize, Serialize};

use crate::schema::Column;
use crate::types::WireType;

/// One column entry of the `@columns` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub r#type: WireType,
}

impl From<ColumnDef> for Column {
    fn from(def: ColumnDef) -> Self {
        Self {
            name: def.name,
            wire_type: def.r#type,
        }
    }
}

impl From<&Column> for ColumnDef {
    fn from(column: &Column) -> Self {
        Self {
            name: column.name.clone(),
            r#type: column.wire_type,
        }
    }
}

/// The top-level response object: declared parameters, the column schema,
/// and the optional row data. A missing `value` means zero rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope<T> {
    #[serde(rename = "@parameters", default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<String>>,
    #[serde(rename = "@columns")]
    pub columns: Vec<ColumnDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<T>,
}

impl<T> ResponseEnvelope<T> {
    #[must_use]
    pub fn new(columns: Vec<ColumnDef>, value: T) -> Self {
        Self {
            parameters: None,
            columns,
            value: Some(value),
        }
    }

    /// Metadata-only envelope, as returned for `behavior=schemaOnly`.
    #[must_use]
    pub fn schema_only(columns: Vec<ColumnDef>, parameters: Vec<String>) -> Self {
        Self {
            parameters: Some(parameters),
            columns,
            value: None,
        }
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: Vec<String>) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

/// Explicit column registration for a record type a producer serializes as
/// rows. Stands in for runtime reflection: each record type states its own
/// ordered column list once.
pub trait DatasetRecord {
    fn columns() -> Vec<ColumnDef>;
}

impl<R: DatasetRecord> ResponseEnvelope<Vec<R>> {
    /// Multi-row envelope for a registered record type.
    #[must_use]
    pub fn for_records(records: Vec<R>) -> Self {
        Self::new(R::columns(), records)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    struct AccountRow;

    impl DatasetRecord for AccountRow {
        fn columns() -> Vec<ColumnDef> {
            vec![
                ColumnDef {
                    name: "Id".to_string(),
                    r#type: WireType::Int32,
                },
                ColumnDef {
                    name: "Name".to_string(),
                    r#type: WireType::String,
                },
            ]
        }
    }

    #[test]
    fn schema_only_envelope_omits_value() {
        let envelope = ResponseEnvelope::<()>::schema_only(
            AccountRow::columns(),
            vec!["from".to_string()],
        );
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            json,
            json!({
                "@parameters": ["from"],
                "@columns": [
                    {"name": "Id", "type": "Int32"},
                    {"name": "Name", "type": "String"},
                ],
            })
        );
    }

    #[test]
    fn envelope_round_trips() {
        let envelope = ResponseEnvelope::new(AccountRow::columns(), json!([{"Id": 1}]));
        let text = serde_json::to_string(&envelope).unwrap();
        let parsed: ResponseEnvelope<serde_json::Value> =
            serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, envelope);
        assert_eq!(parsed.parameters, None);
    }

    #[test]
    fn column_def_converts_to_schema_column() {
        let column: Column = ColumnDef {
            name: "Id".to_string(),
            r#type: WireType::Guid,
        }
        .into();
        assert_eq!(column.wire_type, WireType::Guid);
    }
}
