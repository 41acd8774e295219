//! Decoded cell values and the type-directed field decoder.

use base64::Engine as _;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::errors::{DecodeSnafu, RowSetResult, UnexpectedEndSnafu};
use crate::schema::Column;
use crate::token::{Token, TokenCursor, TokenKind};
use crate::types::HostKind;

/// One decoded field of the current row.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Text(String),
    Bytes(Vec<u8>),
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
    Uuid(Uuid),
    Xml(String),
    Json(serde_json::Value),
}

impl Cell {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) | Self::Xml(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I8(value) => Some(i64::from(*value)),
            Self::I16(value) => Some(i64::from(*value)),
            Self::I32(value) => Some(i64::from(*value)),
            Self::I64(value) => Some(*value),
            Self::U8(value) => Some(i64::from(*value)),
            Self::U16(value) => Some(i64::from(*value)),
            Self::U32(value) => Some(i64::from(*value)),
            Self::U64(value) => i64::try_from(*value).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U8(value) => Some(u64::from(*value)),
            Self::U16(value) => Some(u64::from(*value)),
            Self::U32(value) => Some(u64::from(*value)),
            Self::U64(value) => Some(*value),
            _ => self.as_i64().and_then(|value| u64::try_from(value).ok()),
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::F32(value) => Some(f64::from(*value)),
            Self::F64(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Uuid(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }
}

/// Decodes the value at the cursor into a [`Cell`] per the column's declared
/// type. A token kind incompatible with the declaration is a decode error at
/// this field; `null` is accepted for every type.
pub(crate) async fn decode_value<C: TokenCursor + ?Sized>(
    cursor: &mut C,
    column: &Column,
) -> RowSetResult<Cell> {
    if column.wire_type.host_kind() == HostKind::Json {
        if cursor.peek_kind().await? == TokenKind::Null {
            cursor.next_token().await?;
            return Ok(Cell::Null);
        }
        return Ok(Cell::Json(read_json_tree(cursor).await?));
    }
    let Some(token) = cursor.next_token().await? else {
        return UnexpectedEndSnafu.fail();
    };
    match token {
        Token::Null => Ok(Cell::Null),
        Token::Text(text) => decode_text(column, text),
        Token::Number(number) => decode_number(column, &number),
        Token::Bool(value) => {
            if column.wire_type.host_kind() == HostKind::Bool {
                Ok(Cell::Bool(value))
            } else {
                mismatch(column, TokenKind::Bool)
            }
        }
        other => mismatch(column, other.kind()),
    }
}

fn mismatch(column: &Column, kind: TokenKind) -> RowSetResult<Cell> {
    DecodeSnafu {
        column: column.name.clone(),
        wire_type: column.wire_type,
        message: format!("incompatible {kind:?} token"),
    }
    .fail()
}

fn decode_error(column: &Column, message: String) -> RowSetResult<Cell> {
    DecodeSnafu {
        column: column.name.clone(),
        wire_type: column.wire_type,
        message,
    }
    .fail()
}

fn decode_text(column: &Column, text: String) -> RowSetResult<Cell> {
    match column.wire_type.host_kind() {
        HostKind::Text => Ok(Cell::Text(text)),
        HostKind::Xml => Ok(Cell::Xml(text)),
        HostKind::Bytes => match base64::engine::general_purpose::STANDARD.decode(&text) {
            Ok(bytes) => Ok(Cell::Bytes(bytes)),
            Err(error) => decode_error(column, format!("invalid base64: {error}")),
        },
        HostKind::Uuid => match text.parse::<Uuid>() {
            Ok(value) => Ok(Cell::Uuid(value)),
            Err(error) => decode_error(column, format!("invalid guid: {error}")),
        },
        HostKind::Date => match text.parse::<NaiveDate>() {
            Ok(value) => Ok(Cell::Date(value)),
            Err(error) => decode_error(column, format!("invalid date: {error}")),
        },
        HostKind::Time => match text.parse::<NaiveTime>() {
            Ok(value) => Ok(Cell::Time(value)),
            Err(error) => decode_error(column, format!("invalid time: {error}")),
        },
        HostKind::DateTime => match text.parse::<NaiveDateTime>() {
            Ok(value) => Ok(Cell::DateTime(value)),
            Err(error) => decode_error(column, format!("invalid datetime: {error}")),
        },
        HostKind::DateTimeOffset => match DateTime::parse_from_rfc3339(&text) {
            Ok(value) => Ok(Cell::DateTimeOffset(value)),
            Err(error) => decode_error(column, format!("invalid datetime offset: {error}")),
        },
        HostKind::Decimal => match parse_decimal(&text) {
            Some(value) => Ok(Cell::Decimal(value)),
            None => decode_error(column, format!("invalid decimal {text:?}")),
        },
        _ => mismatch(column, TokenKind::Text),
    }
}

fn decode_number(column: &Column, number: &serde_json::Number) -> RowSetResult<Cell> {
    match column.wire_type.host_kind() {
        HostKind::I8 => decode_signed(column, number).map(Cell::I8),
        HostKind::I16 => decode_signed(column, number).map(Cell::I16),
        HostKind::I32 => decode_signed(column, number).map(Cell::I32),
        HostKind::I64 => integral(column, number).map(Cell::I64),
        HostKind::U8 => decode_unsigned(column, number).map(Cell::U8),
        HostKind::U16 => decode_unsigned(column, number).map(Cell::U16),
        HostKind::U32 => decode_unsigned(column, number).map(Cell::U32),
        HostKind::U64 => match number.as_u64() {
            Some(value) => Ok(Cell::U64(value)),
            None => out_of_range(column, number),
        },
        #[allow(clippy::cast_possible_truncation)]
        HostKind::F32 => match number.as_f64() {
            Some(value) => Ok(Cell::F32(value as f32)),
            None => out_of_range(column, number),
        },
        HostKind::F64 => match number.as_f64() {
            Some(value) => Ok(Cell::F64(value)),
            None => out_of_range(column, number),
        },
        HostKind::Decimal => match parse_decimal(&number.to_string()) {
            Some(value) => Ok(Cell::Decimal(value)),
            None => out_of_range(column, number),
        },
        _ => mismatch(column, TokenKind::Number),
    }
}

fn integral(column: &Column, number: &serde_json::Number) -> RowSetResult<i64> {
    number.as_i64().map_or_else(
        || {
            out_of_range::<i64>(column, number)
        },
        Ok,
    )
}

fn decode_signed<T: TryFrom<i64>>(
    column: &Column,
    number: &serde_json::Number,
) -> RowSetResult<T> {
    let wide = integral(column, number)?;
    T::try_from(wide).map_or_else(|_| out_of_range(column, number), Ok)
}

fn decode_unsigned<T: TryFrom<u64>>(
    column: &Column,
    number: &serde_json::Number,
) -> RowSetResult<T> {
    let Some(wide) = number.as_u64() else {
        return out_of_range(column, number);
    };
    T::try_from(wide).map_or_else(|_| out_of_range(column, number), Ok)
}

fn out_of_range<T>(column: &Column, number: &serde_json::Number) -> RowSetResult<T> {
    DecodeSnafu {
        column: column.name.clone(),
        wire_type: column.wire_type,
        message: format!("number {number} is out of range"),
    }
    .fail()
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    raw.parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_scientific(raw).ok())
}

/// Materializes one arbitrary JSON subtree, used for columns declared as
/// opaque objects. Iterative so deeply nested payloads do not recurse.
pub(crate) async fn read_json_tree<C: TokenCursor + ?Sized>(
    cursor: &mut C,
) -> RowSetResult<serde_json::Value> {
    enum Parent {
        Array(Vec<serde_json::Value>),
        Object(serde_json::Map<String, serde_json::Value>, Option<String>),
    }

    let mut stack: Vec<Parent> = Vec::new();
    loop {
        let Some(token) = cursor.next_token().await? else {
            return UnexpectedEndSnafu.fail();
        };
        let value = match token {
            Token::BeginArray => {
                stack.push(Parent::Array(Vec::new()));
                continue;
            }
            Token::BeginObject => {
                stack.push(Parent::Object(serde_json::Map::new(), None));
                continue;
            }
            Token::PropertyName(key) => {
                if let Some(Parent::Object(_, pending)) = stack.last_mut() {
                    *pending = Some(key);
                }
                continue;
            }
            Token::EndArray => match stack.pop() {
                Some(Parent::Array(items)) => serde_json::Value::Array(items),
                _ => return UnexpectedEndSnafu.fail(),
            },
            Token::EndObject => match stack.pop() {
                Some(Parent::Object(map, _)) => serde_json::Value::Object(map),
                _ => return UnexpectedEndSnafu.fail(),
            },
            Token::Text(text) => serde_json::Value::String(text),
            Token::Number(number) => serde_json::Value::Number(number),
            Token::Bool(value) => serde_json::Value::Bool(value),
            Token::Null => serde_json::Value::Null,
        };
        match stack.last_mut() {
            None => return Ok(value),
            Some(Parent::Array(items)) => items.push(value),
            Some(Parent::Object(map, pending)) => {
                if let Some(key) = pending.take() {
                    map.insert(key, value);
                }
            }
        }
    }
}
