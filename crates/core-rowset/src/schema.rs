use snafu::OptionExt;

use crate::errors::{
    FormatSnafu, RowSetResult, UnexpectedEndSnafu, UnsupportedColumnTypeSnafu,
};
use crate::token::{Token, TokenCursor};
use crate::types::WireType;

/// One declared result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub wire_type: WireType,
}

/// Ordered column list for one result. Parsed once per response from the
/// `@columns` section and immutable afterwards; the ordinal position is the
/// canonical addressing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    columns: Vec<Column>,
}

impl ColumnSchema {
    #[must_use]
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Parses the schema from a cursor positioned at the start of the
    /// `@columns` value.
    ///
    /// Column entries must be `{name, type}` objects; unrecognized extra
    /// properties on an entry are skipped. An unknown type tag is rejected
    /// here, so decoding never meets an unsupported column.
    pub async fn parse<C: TokenCursor + ?Sized>(cursor: &mut C) -> RowSetResult<Self> {
        match cursor.next_token().await? {
            Some(Token::BeginArray) => {}
            Some(other) => {
                return FormatSnafu {
                    message: format!(
                        "\"@columns\" must be an array, found {:?}",
                        other.kind()
                    ),
                }
                .fail();
            }
            None => return UnexpectedEndSnafu.fail(),
        }
        let mut columns = Vec::new();
        loop {
            match cursor.next_token().await? {
                Some(Token::EndArray) => break,
                Some(Token::BeginObject) => columns.push(parse_column(cursor).await?),
                Some(other) => {
                    return FormatSnafu {
                        message: format!(
                            "column entries must be objects, found {:?}",
                            other.kind()
                        ),
                    }
                    .fail();
                }
                None => return UnexpectedEndSnafu.fail(),
            }
        }
        Ok(Self { columns })
    }

    #[must_use]
    pub fn field_count(&self) -> usize {
        self.columns.len()
    }

    /// # Panics
    /// Panics if `ordinal` is out of range.
    #[must_use]
    pub fn name(&self, ordinal: usize) -> &str {
        &self.columns[ordinal].name
    }

    /// # Panics
    /// Panics if `ordinal` is out of range.
    #[must_use]
    pub fn wire_type(&self, ordinal: usize) -> WireType {
        self.columns[ordinal].wire_type
    }

    /// Ordinal of the first column with exactly this name, or `None`.
    /// Matching is case-sensitive; absence is not an error.
    #[must_use]
    pub fn ordinal(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }
}

async fn parse_column<C: TokenCursor + ?Sized>(cursor: &mut C) -> RowSetResult<Column> {
    let mut name: Option<String> = None;
    let mut wire_type: Option<WireType> = None;
    loop {
        match cursor.next_token().await? {
            Some(Token::EndObject) => break,
            Some(Token::PropertyName(key)) => match key.as_str() {
                "name" => match cursor.next_token().await? {
                    Some(Token::Text(value)) => name = Some(value),
                    _ => {
                        return FormatSnafu {
                            message: "column \"name\" must be a string".to_string(),
                        }
                        .fail();
                    }
                },
                "type" => match cursor.next_token().await? {
                    Some(Token::Text(value)) => {
                        let parsed = value.parse::<WireType>().ok().context(
                            UnsupportedColumnTypeSnafu {
                                column: name.clone().unwrap_or_default(),
                                type_name: value.clone(),
                            },
                        )?;
                        wire_type = Some(parsed);
                    }
                    _ => {
                        return FormatSnafu {
                            message: "column \"type\" must be a string".to_string(),
                        }
                        .fail();
                    }
                },
                _ => cursor.skip_value().await?,
            },
            Some(other) => {
                return FormatSnafu {
                    message: format!(
                        "expected a property in a column entry, found {:?}",
                        other.kind()
                    ),
                }
                .fail();
            }
            None => return UnexpectedEndSnafu.fail(),
        }
    }
    let name = name.context(FormatSnafu {
        message: "column entry is missing \"name\"".to_string(),
    })?;
    let wire_type = wire_type.context(FormatSnafu {
        message: format!("column {name:?} is missing \"type\""),
    })?;
    Ok(Column { name, wire_type })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::token::JsonTokenCursor;
    use crate::RowSetError;
    use futures::io::Cursor;

    async fn parse(json: &str) -> RowSetResult<ColumnSchema> {
        let mut cursor = JsonTokenCursor::new(Cursor::new(json.as_bytes().to_vec()));
        ColumnSchema::parse(&mut cursor).await
    }

    #[tokio::test]
    async fn parses_ordered_columns() {
        let schema = parse(r#"[{"name":"Id","type":"Int32"},{"name":"Name","type":"String"}]"#)
            .await
            .unwrap();
        assert_eq!(schema.field_count(), 2);
        assert_eq!(schema.name(0), "Id");
        assert_eq!(schema.wire_type(0), WireType::Int32);
        assert_eq!(schema.name(1), "Name");
        assert_eq!(schema.wire_type(1), WireType::String);
    }

    #[tokio::test]
    async fn extra_column_properties_are_skipped() {
        let schema = parse(
            r#"[{"name":"Id","type":"Int32","nullable":true,"meta":{"x":[1,2]}}]"#,
        )
        .await
        .unwrap();
        assert_eq!(schema.field_count(), 1);
        assert_eq!(schema.wire_type(0), WireType::Int32);
    }

    #[tokio::test]
    async fn unknown_type_tag_is_a_schema_error() {
        let err = parse(r#"[{"name":"Id","type":"int32"}]"#).await.unwrap_err();
        match err {
            RowSetError::UnsupportedColumnType { column, type_name } => {
                assert_eq!(column, "Id");
                assert_eq!(type_name, "int32");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_type_is_a_format_error() {
        let err = parse(r#"[{"name":"Id"}]"#).await.unwrap_err();
        assert!(matches!(err, RowSetError::Format { .. }));
    }

    #[tokio::test]
    #[should_panic(expected = "index out of bounds")]
    async fn out_of_range_ordinal_panics() {
        let schema = parse(r#"[{"name":"Id","type":"Int32"}]"#).await.unwrap();
        let _ = schema.name(1);
    }

    #[tokio::test]
    async fn ordinal_lookup_is_exact_case_first_match() {
        let schema = parse(
            r#"[{"name":"Id","type":"Int32"},{"name":"Id","type":"Int64"},{"name":"name","type":"String"}]"#,
        )
        .await
        .unwrap();
        assert_eq!(schema.ordinal("Id"), Some(0));
        assert_eq!(schema.ordinal("name"), Some(2));
        assert_eq!(schema.ordinal("Name"), None);
        assert_eq!(schema.ordinal("missing"), None);
    }
}
