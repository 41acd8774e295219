//! Forward-only JSON token cursor.
//!
//! The row reader never sees bytes or a parsing library directly; it walks a
//! [`TokenCursor`]. [`JsonTokenCursor`] is the streaming implementation used
//! in production: it tokenizes incrementally out of a small buffer, so a
//! response body of any size is consumed in a single pass without being
//! materialized.

use async_trait::async_trait;
use futures::io::{AsyncRead, AsyncReadExt};
use snafu::ResultExt;

use crate::errors::{FormatSnafu, IoSnafu, RowSetResult, UnexpectedEndSnafu};

const READ_CHUNK: usize = 8 * 1024;

/// One logical JSON token.
///
/// A string in object-key position surfaces as [`Token::PropertyName`], not
/// [`Token::Text`]; the cursor tracks enough context to tell them apart.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    BeginObject,
    EndObject,
    BeginArray,
    EndArray,
    PropertyName(String),
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    BeginObject,
    EndObject,
    BeginArray,
    EndArray,
    PropertyName,
    Text,
    Number,
    Bool,
    Null,
    EndOfStream,
}

impl Token {
    #[must_use]
    pub const fn kind(&self) -> TokenKind {
        match self {
            Self::BeginObject => TokenKind::BeginObject,
            Self::EndObject => TokenKind::EndObject,
            Self::BeginArray => TokenKind::BeginArray,
            Self::EndArray => TokenKind::EndArray,
            Self::PropertyName(_) => TokenKind::PropertyName,
            Self::Text(_) => TokenKind::Text,
            Self::Number(_) => TokenKind::Number,
            Self::Bool(_) => TokenKind::Bool,
            Self::Null => TokenKind::Null,
        }
    }
}

/// Forward-only cursor over a JSON token stream.
///
/// Any conforming streaming parser satisfies this; the row reader only relies
/// on advance, a non-consuming peek of the next token's kind, and wholesale
/// subtree skipping.
#[async_trait]
pub trait TokenCursor: Send {
    /// Advance to and return the next token, or `None` at end of input.
    async fn next_token(&mut self) -> RowSetResult<Option<Token>>;

    /// The kind of token [`Self::next_token`] would return, without
    /// consuming it.
    async fn peek_kind(&mut self) -> RowSetResult<TokenKind>;

    /// Skip the value starting at the current position, including all of its
    /// nested structure. The cursor never descends into skipped subtrees.
    async fn skip_value(&mut self) -> RowSetResult<()> {
        let mut depth = 0usize;
        loop {
            match self.next_token().await? {
                None => return UnexpectedEndSnafu.fail(),
                Some(Token::BeginObject | Token::BeginArray) => depth += 1,
                Some(Token::EndObject | Token::EndArray) => {
                    if depth == 0 {
                        return FormatSnafu {
                            message: "expected a value to skip".to_string(),
                        }
                        .fail();
                    }
                    depth -= 1;
                }
                Some(_) => {}
            }
            if depth == 0 {
                return Ok(());
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Object(ObjectState),
    Array(ArrayState),
}

/// Position within an object, advanced one token or separator at a time, so
/// missing and misplaced `,`/`:` are format errors rather than noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectState {
    /// After `{`: a key or the closing `}`.
    FirstKey,
    /// After `,`: a key only.
    Key,
    /// After a key: `:` only.
    Colon,
    /// After `:`: a value only.
    Value,
    /// After a value: `,` or the closing `}`.
    Separator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrayState {
    /// After `[`: a value or the closing `]`.
    FirstValue,
    /// After `,`: a value only.
    Value,
    /// After a value: `,` or the closing `]`.
    Separator,
}

/// Streaming tokenizer over any byte source.
///
/// Holds at most one buffered chunk of input plus one peeked token.
pub struct JsonTokenCursor<R> {
    input: R,
    buf: Vec<u8>,
    pos: usize,
    offset: u64,
    eof: bool,
    frames: Vec<Frame>,
    peeked: Option<Token>,
}

impl<R> JsonTokenCursor<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(input: R) -> Self {
        Self {
            input,
            buf: Vec::new(),
            pos: 0,
            offset: 0,
            eof: false,
            frames: Vec::new(),
            peeked: None,
        }
    }

    async fn peek_byte(&mut self) -> RowSetResult<Option<u8>> {
        while self.pos >= self.buf.len() {
            if self.eof {
                return Ok(None);
            }
            self.buf.resize(READ_CHUNK, 0);
            let read = self.input.read(&mut self.buf).await.context(IoSnafu)?;
            self.buf.truncate(read);
            self.pos = 0;
            if read == 0 {
                self.eof = true;
            }
        }
        Ok(Some(self.buf[self.pos]))
    }

    fn bump(&mut self) -> u8 {
        let byte = self.buf[self.pos];
        self.pos += 1;
        self.offset += 1;
        byte
    }

    fn expecting_key(&self) -> bool {
        matches!(
            self.frames.last(),
            Some(Frame::Object(ObjectState::FirstKey | ObjectState::Key))
        )
    }

    /// A value just finished at the current nesting level; the enclosing
    /// frame now expects a separator before anything else.
    fn complete_value(&mut self) {
        match self.frames.last_mut() {
            Some(Frame::Object(state)) => *state = ObjectState::Separator,
            Some(Frame::Array(state)) => *state = ArrayState::Separator,
            None => {}
        }
    }

    fn take_separator(&mut self, separator: u8) -> RowSetResult<()> {
        match (self.frames.last_mut(), separator) {
            (Some(Frame::Object(state)), b',') if *state == ObjectState::Separator => {
                *state = ObjectState::Key;
                Ok(())
            }
            (Some(Frame::Object(state)), b':') if *state == ObjectState::Colon => {
                *state = ObjectState::Value;
                Ok(())
            }
            (Some(Frame::Array(state)), b',') if *state == ArrayState::Separator => {
                *state = ArrayState::Value;
                Ok(())
            }
            _ => FormatSnafu {
                message: format!(
                    "unexpected {:?} at byte {}",
                    char::from(separator),
                    self.offset - 1
                ),
            }
            .fail(),
        }
    }

    fn close_frame(&mut self, closer: u8) -> RowSetResult<()> {
        let matched = matches!(
            (self.frames.last(), closer),
            (
                Some(Frame::Object(ObjectState::FirstKey | ObjectState::Separator)),
                b'}'
            ) | (
                Some(Frame::Array(ArrayState::FirstValue | ArrayState::Separator)),
                b']'
            )
        );
        if !matched {
            return FormatSnafu {
                message: format!(
                    "unexpected {:?} at byte {}",
                    char::from(closer),
                    self.offset - 1
                ),
            }
            .fail();
        }
        self.frames.pop();
        self.complete_value();
        Ok(())
    }

    async fn lex(&mut self) -> RowSetResult<Option<Token>> {
        loop {
            let Some(byte) = self.peek_byte().await? else {
                if self.frames.is_empty() {
                    return Ok(None);
                }
                return UnexpectedEndSnafu.fail();
            };
            match byte {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.bump();
                }
                b',' | b':' => {
                    self.bump();
                    self.take_separator(byte)?;
                }
                b'{' => {
                    self.require_value_position()?;
                    self.bump();
                    self.frames.push(Frame::Object(ObjectState::FirstKey));
                    return Ok(Some(Token::BeginObject));
                }
                b'[' => {
                    self.require_value_position()?;
                    self.bump();
                    self.frames.push(Frame::Array(ArrayState::FirstValue));
                    return Ok(Some(Token::BeginArray));
                }
                b'}' | b']' => {
                    self.bump();
                    self.close_frame(byte)?;
                    return Ok(Some(if byte == b'}' {
                        Token::EndObject
                    } else {
                        Token::EndArray
                    }));
                }
                b'"' => {
                    if self.expecting_key() {
                        let text = self.read_string().await?;
                        if let Some(Frame::Object(state)) = self.frames.last_mut() {
                            *state = ObjectState::Colon;
                        }
                        return Ok(Some(Token::PropertyName(text)));
                    }
                    self.require_value_position()?;
                    let text = self.read_string().await?;
                    self.complete_value();
                    return Ok(Some(Token::Text(text)));
                }
                b't' | b'f' | b'n' => {
                    self.require_value_position()?;
                    let token = self.read_literal().await?;
                    self.complete_value();
                    return Ok(Some(token));
                }
                b'-' | b'0'..=b'9' => {
                    self.require_value_position()?;
                    let number = self.read_number().await?;
                    self.complete_value();
                    return Ok(Some(Token::Number(number)));
                }
                other => {
                    return FormatSnafu {
                        message: format!(
                            "unexpected byte {:?} at byte {}",
                            char::from(other),
                            self.offset
                        ),
                    }
                    .fail();
                }
            }
        }
    }

    fn require_value_position(&self) -> RowSetResult<()> {
        let ok = match self.frames.last() {
            None => true,
            Some(Frame::Object(state)) => *state == ObjectState::Value,
            Some(Frame::Array(state)) => {
                matches!(state, ArrayState::FirstValue | ArrayState::Value)
            }
        };
        if ok {
            return Ok(());
        }
        let wanted = match self.frames.last() {
            Some(Frame::Object(ObjectState::FirstKey | ObjectState::Key)) => "a property name",
            Some(Frame::Object(ObjectState::Colon)) => "':'",
            _ => "','",
        };
        FormatSnafu {
            message: format!("expected {wanted} at byte {}", self.offset),
        }
        .fail()
    }

    async fn next_byte(&mut self) -> RowSetResult<u8> {
        match self.peek_byte().await? {
            Some(_) => Ok(self.bump()),
            None => UnexpectedEndSnafu.fail(),
        }
    }

    async fn read_string(&mut self) -> RowSetResult<String> {
        let start = self.offset;
        self.bump(); // opening quote
        let mut out: Vec<u8> = Vec::new();
        loop {
            match self.next_byte().await? {
                b'"' => break,
                b'\\' => {
                    let escape = self.next_byte().await?;
                    match escape {
                        b'"' => out.push(b'"'),
                        b'\\' => out.push(b'\\'),
                        b'/' => out.push(b'/'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0c),
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'u' => {
                            let ch = self.read_unicode_escape().await?;
                            let mut encoded = [0u8; 4];
                            out.extend_from_slice(ch.encode_utf8(&mut encoded).as_bytes());
                        }
                        other => {
                            return FormatSnafu {
                                message: format!(
                                    "invalid escape {:?} at byte {}",
                                    char::from(other),
                                    self.offset - 1
                                ),
                            }
                            .fail();
                        }
                    }
                }
                other => out.push(other),
            }
        }
        String::from_utf8(out).map_err(|_| {
            FormatSnafu {
                message: format!("invalid UTF-8 in string at byte {start}"),
            }
            .build()
        })
    }

    async fn read_unicode_escape(&mut self) -> RowSetResult<char> {
        let high = self.read_hex4().await?;
        let code = if (0xD800..=0xDBFF).contains(&high) {
            // Surrogate pair: the low half must follow immediately.
            if self.next_byte().await? != b'\\' || self.next_byte().await? != b'u' {
                return FormatSnafu {
                    message: format!("unpaired surrogate at byte {}", self.offset),
                }
                .fail();
            }
            let low = self.read_hex4().await?;
            if !(0xDC00..=0xDFFF).contains(&low) {
                return FormatSnafu {
                    message: format!("invalid low surrogate at byte {}", self.offset),
                }
                .fail();
            }
            0x10000 + ((u32::from(high) - 0xD800) << 10) + (u32::from(low) - 0xDC00)
        } else {
            u32::from(high)
        };
        char::from_u32(code).ok_or_else(|| {
            FormatSnafu {
                message: format!("invalid unicode escape at byte {}", self.offset),
            }
            .build()
        })
    }

    async fn read_hex4(&mut self) -> RowSetResult<u16> {
        let mut value = 0u16;
        for _ in 0..4 {
            let byte = self.next_byte().await?;
            let digit = match byte {
                b'0'..=b'9' => u16::from(byte - b'0'),
                b'a'..=b'f' => u16::from(byte - b'a') + 10,
                b'A'..=b'F' => u16::from(byte - b'A') + 10,
                _ => {
                    return FormatSnafu {
                        message: format!("invalid hex digit at byte {}", self.offset - 1),
                    }
                    .fail();
                }
            };
            value = value << 4 | digit;
        }
        Ok(value)
    }

    async fn read_number(&mut self) -> RowSetResult<serde_json::Number> {
        let start = self.offset;
        let mut raw = String::new();
        while let Some(byte) = self.peek_byte().await? {
            match byte {
                b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E' => {
                    raw.push(char::from(byte));
                    self.bump();
                }
                _ => break,
            }
        }
        if let Ok(value) = raw.parse::<i64>() {
            return Ok(value.into());
        }
        if let Ok(value) = raw.parse::<u64>() {
            return Ok(value.into());
        }
        if let Some(number) = raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
        {
            return Ok(number);
        }
        FormatSnafu {
            message: format!("invalid number {raw:?} at byte {start}"),
        }
        .fail()
    }

    async fn read_literal(&mut self) -> RowSetResult<Token> {
        let start = self.offset;
        let mut raw = String::new();
        while let Some(byte @ b'a'..=b'z') = self.peek_byte().await? {
            raw.push(char::from(byte));
            self.bump();
        }
        match raw.as_str() {
            "true" => Ok(Token::Bool(true)),
            "false" => Ok(Token::Bool(false)),
            "null" => Ok(Token::Null),
            _ => FormatSnafu {
                message: format!("invalid literal {raw:?} at byte {start}"),
            }
            .fail(),
        }
    }
}

#[async_trait]
impl<R> TokenCursor for JsonTokenCursor<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn next_token(&mut self) -> RowSetResult<Option<Token>> {
        if let Some(token) = self.peeked.take() {
            return Ok(Some(token));
        }
        self.lex().await
    }

    async fn peek_kind(&mut self) -> RowSetResult<TokenKind> {
        if self.peeked.is_none() {
            self.peeked = self.lex().await?;
        }
        Ok(self
            .peeked
            .as_ref()
            .map_or(TokenKind::EndOfStream, Token::kind))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures::io::Cursor;

    fn cursor(json: &str) -> JsonTokenCursor<Cursor<Vec<u8>>> {
        JsonTokenCursor::new(Cursor::new(json.as_bytes().to_vec()))
    }

    async fn all_tokens(json: &str) -> Vec<Token> {
        let mut cursor = cursor(json);
        let mut tokens = Vec::new();
        while let Some(token) = cursor.next_token().await.unwrap() {
            tokens.push(token);
        }
        tokens
    }

    #[tokio::test]
    async fn keys_and_string_values_are_distinct() {
        let tokens = all_tokens(r#"{"a":"b","c":{"d":[1,"e"]}}"#).await;
        assert_eq!(
            tokens,
            vec![
                Token::BeginObject,
                Token::PropertyName("a".into()),
                Token::Text("b".into()),
                Token::PropertyName("c".into()),
                Token::BeginObject,
                Token::PropertyName("d".into()),
                Token::BeginArray,
                Token::Number(1.into()),
                Token::Text("e".into()),
                Token::EndArray,
                Token::EndObject,
                Token::EndObject,
            ]
        );
    }

    #[tokio::test]
    async fn scalars_and_literals() {
        let tokens = all_tokens(r#"[true, false, null, -12, 1.5, 18446744073709551615]"#).await;
        assert_eq!(tokens[1], Token::Bool(true));
        assert_eq!(tokens[2], Token::Bool(false));
        assert_eq!(tokens[3], Token::Null);
        assert_eq!(tokens[4], Token::Number((-12i64).into()));
        assert_eq!(tokens[5], Token::Number(serde_json::Number::from_f64(1.5).unwrap()));
        assert_eq!(tokens[6], Token::Number(u64::MAX.into()));
    }

    #[tokio::test]
    async fn string_escapes() {
        let tokens = all_tokens(r#"["a\"b\\c\n", "A", "😀"]"#).await;
        assert_eq!(tokens[1], Token::Text("a\"b\\c\n".into()));
        assert_eq!(tokens[2], Token::Text("A".into()));
        assert_eq!(tokens[3], Token::Text("\u{1F600}".into()));
    }

    #[tokio::test]
    async fn top_level_scalar() {
        assert_eq!(all_tokens("42").await, vec![Token::Number(42.into())]);
    }

    #[tokio::test]
    async fn peek_does_not_consume() {
        let mut cursor = cursor("[1]");
        assert_eq!(cursor.peek_kind().await.unwrap(), TokenKind::BeginArray);
        assert_eq!(cursor.peek_kind().await.unwrap(), TokenKind::BeginArray);
        assert_eq!(cursor.next_token().await.unwrap(), Some(Token::BeginArray));
        assert_eq!(cursor.peek_kind().await.unwrap(), TokenKind::Number);
    }

    #[tokio::test]
    async fn skip_value_skips_whole_subtrees() {
        let mut cursor = cursor(r#"{"skip":{"deep":[1,{"x":2}]},"keep":3}"#);
        cursor.next_token().await.unwrap(); // {
        cursor.next_token().await.unwrap(); // "skip"
        cursor.skip_value().await.unwrap();
        assert_eq!(
            cursor.next_token().await.unwrap(),
            Some(Token::PropertyName("keep".into()))
        );
        assert_eq!(cursor.next_token().await.unwrap(), Some(Token::Number(3.into())));
    }

    #[tokio::test]
    async fn truncated_document_is_an_error() {
        let mut cursor = cursor(r#"{"a": [1, 2"#);
        let error = loop {
            match cursor.next_token().await {
                Ok(Some(_)) => {}
                Ok(None) => panic!("truncated document tokenized cleanly"),
                Err(error) => break error,
            }
        };
        assert!(matches!(error, crate::RowSetError::UnexpectedEnd));
    }

    #[tokio::test]
    async fn missing_separators_are_format_errors() {
        let mut cursor = cursor(r#"{"a" 1}"#);
        cursor.next_token().await.unwrap(); // {
        cursor.next_token().await.unwrap(); // "a"
        let err = cursor.next_token().await.unwrap_err();
        assert!(matches!(err, crate::RowSetError::Format { .. }));

        let mut cursor = self::cursor("[1 2]");
        cursor.next_token().await.unwrap(); // [
        cursor.next_token().await.unwrap(); // 1
        let err = cursor.next_token().await.unwrap_err();
        assert!(matches!(err, crate::RowSetError::Format { .. }));
    }

    #[tokio::test]
    async fn misplaced_separators_are_format_errors() {
        let mut cursor = cursor("[1,,2]");
        cursor.next_token().await.unwrap(); // [
        cursor.next_token().await.unwrap(); // 1
        let err = cursor.next_token().await.unwrap_err();
        assert!(matches!(err, crate::RowSetError::Format { .. }));

        let mut cursor = self::cursor("[1,]");
        cursor.next_token().await.unwrap(); // [
        cursor.next_token().await.unwrap(); // 1
        let err = cursor.next_token().await.unwrap_err();
        assert!(matches!(err, crate::RowSetError::Format { .. }));

        let mut cursor = self::cursor(r#"{"a"::1}"#);
        cursor.next_token().await.unwrap(); // {
        cursor.next_token().await.unwrap(); // "a"
        let err = cursor.next_token().await.unwrap_err();
        assert!(matches!(err, crate::RowSetError::Format { .. }));
    }

    #[tokio::test]
    async fn garbage_byte_is_a_format_error() {
        let mut cursor = cursor("[#]");
        cursor.next_token().await.unwrap();
        let err = cursor.next_token().await.unwrap_err();
        assert!(matches!(err, crate::RowSetError::Format { .. }));
    }

    #[tokio::test]
    async fn non_string_key_is_a_format_error() {
        let mut cursor = cursor("{1: 2}");
        cursor.next_token().await.unwrap();
        let err = cursor.next_token().await.unwrap_err();
        assert!(matches!(err, crate::RowSetError::Format { .. }));
    }
}
