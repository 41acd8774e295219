//! Streaming row reader over a response envelope.
//!
//! The reader walks the envelope exactly once, materializing one row at a
//! time. It owns its cursor (and therefore the underlying byte stream);
//! dropping the reader releases both on every path, including errors raised
//! while the envelope header is still being parsed.

use snafu::OptionExt;
use std::fmt;

use crate::errors::{FormatSnafu, NoCurrentRowSnafu, RowSetResult, UnexpectedEndSnafu};
use crate::schema::ColumnSchema;
use crate::token::{Token, TokenCursor, TokenKind};
use crate::types::WireType;
use crate::value::{decode_value, Cell};

/// How the row data is encoded in the `value` section.
///
/// Resolved exactly once, right after the `@columns` section is consumed.
/// `Scalar` and `SingleRow` degrade to `NoResult` after their one row has
/// been read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    /// No `value` section, or no more rows.
    NoResult,
    /// A single JSON primitive.
    Scalar,
    /// A single structured object instead of an array.
    SingleRow,
    /// An array of rows (possibly empty, possibly mixing row encodings).
    MultipleRows,
}

/// Forward-only cursor over one result.
pub struct RowReader<C> {
    cursor: C,
    columns: ColumnSchema,
    shape: ResultShape,
    row: Option<Vec<Cell>>,
}

// Manual impl: the cursor (and the byte source behind it) has no Debug.
impl<C> fmt::Debug for RowReader<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowReader")
            .field("columns", &self.columns)
            .field("shape", &self.shape)
            .field("row", &self.row)
            .finish_non_exhaustive()
    }
}

impl<C: TokenCursor> RowReader<C> {
    /// Parses the envelope header and positions the reader before the first
    /// row.
    ///
    /// The envelope must be a JSON object with a `@columns` property;
    /// unrelated properties before either section are skipped wholesale.
    /// A missing `value` section is a valid zero-row response.
    pub async fn open(mut cursor: C) -> RowSetResult<Self> {
        match cursor.next_token().await? {
            Some(Token::BeginObject) => {}
            Some(other) => {
                return FormatSnafu {
                    message: format!(
                        "response JSON must be an object, found {:?}",
                        other.kind()
                    ),
                }
                .fail();
            }
            None => return UnexpectedEndSnafu.fail(),
        }
        if !skip_to_section(&mut cursor, "@columns").await? {
            return FormatSnafu {
                message: "expected a \"@columns\" property in the response object".to_string(),
            }
            .fail();
        }
        let columns = ColumnSchema::parse(&mut cursor).await?;
        let shape = if skip_to_section(&mut cursor, "value").await? {
            match cursor.peek_kind().await? {
                TokenKind::BeginObject => ResultShape::SingleRow,
                TokenKind::BeginArray => {
                    cursor.next_token().await?;
                    ResultShape::MultipleRows
                }
                TokenKind::EndOfStream => return UnexpectedEndSnafu.fail(),
                _ => ResultShape::Scalar,
            }
        } else {
            ResultShape::NoResult
        };
        tracing::debug!(?shape, fields = columns.field_count(), "row set opened");
        Ok(Self {
            cursor,
            columns,
            shape,
            row: None,
        })
    }

    /// Number of declared columns. Valid even for zero-row responses.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.columns.field_count()
    }

    /// # Panics
    /// Panics if `ordinal` is out of range.
    #[must_use]
    pub fn name(&self, ordinal: usize) -> &str {
        self.columns.name(ordinal)
    }

    /// # Panics
    /// Panics if `ordinal` is out of range.
    #[must_use]
    pub fn field_type(&self, ordinal: usize) -> WireType {
        self.columns.wire_type(ordinal)
    }

    /// Ordinal for an exact column name, or `None` when absent.
    #[must_use]
    pub fn ordinal(&self, name: &str) -> Option<usize> {
        self.columns.ordinal(name)
    }

    #[must_use]
    pub fn columns(&self) -> &ColumnSchema {
        &self.columns
    }

    /// The field at `ordinal` of the current row.
    ///
    /// # Errors
    /// Fails if no row has been read yet, or the reader is past the last row.
    ///
    /// # Panics
    /// Panics if `ordinal` is out of range.
    pub fn value(&self, ordinal: usize) -> RowSetResult<&Cell> {
        self.row
            .as_ref()
            .map(|row| &row[ordinal])
            .context(NoCurrentRowSnafu)
    }

    /// All fields of the current row, if one is available.
    #[must_use]
    pub fn current_row(&self) -> Option<&[Cell]> {
        self.row.as_deref()
    }

    /// Advances to the next row. Returns `true` when a row is available.
    pub async fn read(&mut self) -> RowSetResult<bool> {
        match self.shape {
            ResultShape::NoResult => {
                self.row = None;
                Ok(false)
            }
            ResultShape::Scalar => {
                self.read_scalar_row().await?;
                self.shape = ResultShape::NoResult;
                Ok(true)
            }
            ResultShape::SingleRow => {
                self.read_object_row().await?;
                self.shape = ResultShape::NoResult;
                Ok(true)
            }
            ResultShape::MultipleRows => self.read_next_row().await,
        }
    }

    /// One step through the row array; the element's own encoding decides
    /// how it is decoded.
    async fn read_next_row(&mut self) -> RowSetResult<bool> {
        match self.cursor.peek_kind().await? {
            TokenKind::EndArray => {
                self.cursor.next_token().await?;
                self.shape = ResultShape::NoResult;
                self.row = None;
                Ok(false)
            }
            TokenKind::BeginObject => {
                self.read_object_row().await?;
                Ok(true)
            }
            TokenKind::BeginArray => {
                self.read_positional_row().await?;
                Ok(true)
            }
            TokenKind::EndOfStream => UnexpectedEndSnafu.fail(),
            _ => {
                self.read_scalar_row().await?;
                Ok(true)
            }
        }
    }

    /// Structured-object row: properties resolve to ordinals by exact name;
    /// unmatched properties are skipped without error.
    async fn read_object_row(&mut self) -> RowSetResult<()> {
        match self.cursor.next_token().await? {
            Some(Token::BeginObject) => {}
            Some(other) => {
                return FormatSnafu {
                    message: format!("expected an object row, found {:?}", other.kind()),
                }
                .fail();
            }
            None => return UnexpectedEndSnafu.fail(),
        }
        let mut row = vec![Cell::Null; self.columns.field_count()];
        loop {
            match self.cursor.next_token().await? {
                Some(Token::EndObject) => break,
                Some(Token::PropertyName(name)) => match self.columns.ordinal(&name) {
                    Some(ordinal) => {
                        row[ordinal] =
                            decode_value(&mut self.cursor, &self.columns.columns()[ordinal])
                                .await?;
                    }
                    None => self.cursor.skip_value().await?,
                },
                Some(other) => {
                    return FormatSnafu {
                        message: format!(
                            "expected a property in the row object, found {:?}",
                            other.kind()
                        ),
                    }
                    .fail();
                }
                None => return UnexpectedEndSnafu.fail(),
            }
        }
        self.row = Some(row);
        Ok(())
    }

    /// Positional-array row: element `i` decodes with column `i`; elements
    /// past the declared column count are discarded.
    async fn read_positional_row(&mut self) -> RowSetResult<()> {
        self.cursor.next_token().await?;
        let mut row = vec![Cell::Null; self.columns.field_count()];
        let mut ordinal = 0usize;
        loop {
            if self.cursor.peek_kind().await? == TokenKind::EndArray {
                self.cursor.next_token().await?;
                break;
            }
            if ordinal < self.columns.field_count() {
                row[ordinal] =
                    decode_value(&mut self.cursor, &self.columns.columns()[ordinal]).await?;
            } else {
                self.cursor.skip_value().await?;
            }
            ordinal += 1;
        }
        self.row = Some(row);
        Ok(())
    }

    /// Scalar row: one value into ordinal 0; any further declared columns
    /// stay null.
    async fn read_scalar_row(&mut self) -> RowSetResult<()> {
        if self.columns.field_count() == 0 {
            return FormatSnafu {
                message: "a scalar result requires at least one declared column".to_string(),
            }
            .fail();
        }
        let mut row = vec![Cell::Null; self.columns.field_count()];
        row[0] = decode_value(&mut self.cursor, &self.columns.columns()[0]).await?;
        self.row = Some(row);
        Ok(())
    }
}

/// Scans forward through the envelope object for a property named `section`,
/// skipping every other property's value subtree without descending into it.
/// Returns `false` when the object ends first.
async fn skip_to_section<C: TokenCursor + ?Sized>(
    cursor: &mut C,
    section: &str,
) -> RowSetResult<bool> {
    loop {
        match cursor.next_token().await? {
            Some(Token::EndObject) => return Ok(false),
            Some(Token::PropertyName(name)) if name == section => return Ok(true),
            Some(Token::PropertyName(_)) => cursor.skip_value().await?,
            Some(other) => {
                return FormatSnafu {
                    message: format!(
                        "expected a property in the response object, found {:?}",
                        other.kind()
                    ),
                }
                .fail();
            }
            None => return UnexpectedEndSnafu.fail(),
        }
    }
}
