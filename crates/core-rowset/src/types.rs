use serde::{Deserialize, Serialize};

/// Declared column type as it appears on the wire in the `@columns` section.
///
/// The set is closed; an unrecognized tag is rejected when the schema is
/// parsed, never later during row decoding. Tag matching is exact and
/// case-sensitive.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum WireType {
    AnsiString,
    AnsiStringFixedLength,
    Binary,
    Boolean,
    Byte,
    Currency,
    Date,
    DateTime,
    DateTime2,
    DateTimeOffset,
    Decimal,
    Double,
    Guid,
    Int16,
    Int32,
    Int64,
    Object,
    SByte,
    Single,
    String,
    StringFixedLength,
    Time,
    UInt16,
    UInt32,
    UInt64,
    VarNumeric,
    Xml,
}

/// Runtime representation a [`WireType`] decodes into.
///
/// Several wire tags collapse onto one host kind (all the string flavors are
/// text, the money/numeric flavors are decimals), which is why the mapping is
/// a separate enum rather than a method set on [`WireType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostKind {
    Text,
    Bytes,
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Decimal,
    Date,
    Time,
    DateTime,
    DateTimeOffset,
    Uuid,
    Xml,
    Json,
}

impl WireType {
    /// Total mapping from the declared tag onto its runtime representation.
    #[must_use]
    pub const fn host_kind(self) -> HostKind {
        match self {
            Self::AnsiString
            | Self::AnsiStringFixedLength
            | Self::String
            | Self::StringFixedLength => HostKind::Text,
            Self::Binary => HostKind::Bytes,
            Self::Boolean => HostKind::Bool,
            Self::SByte => HostKind::I8,
            Self::Int16 => HostKind::I16,
            Self::Int32 => HostKind::I32,
            Self::Int64 => HostKind::I64,
            Self::Byte => HostKind::U8,
            Self::UInt16 => HostKind::U16,
            Self::UInt32 => HostKind::U32,
            Self::UInt64 => HostKind::U64,
            Self::Single => HostKind::F32,
            Self::Double => HostKind::F64,
            Self::Currency | Self::Decimal | Self::VarNumeric => HostKind::Decimal,
            Self::Date => HostKind::Date,
            Self::Time => HostKind::Time,
            Self::DateTime | Self::DateTime2 => HostKind::DateTime,
            Self::DateTimeOffset => HostKind::DateTimeOffset,
            Self::Guid => HostKind::Uuid,
            Self::Xml => HostKind::Xml,
            Self::Object => HostKind::Json,
        }
    }
}

impl HostKind {
    /// The wire tag a producer declares for this representation when no
    /// explicit override is given.
    #[must_use]
    pub const fn default_wire_type(self) -> WireType {
        match self {
            Self::Text => WireType::String,
            Self::Bytes => WireType::Binary,
            Self::Bool => WireType::Boolean,
            Self::I8 => WireType::SByte,
            Self::I16 => WireType::Int16,
            Self::I32 => WireType::Int32,
            Self::I64 => WireType::Int64,
            Self::U8 => WireType::Byte,
            Self::U16 => WireType::UInt16,
            Self::U32 => WireType::UInt32,
            Self::U64 => WireType::UInt64,
            Self::F32 => WireType::Single,
            Self::F64 => WireType::Double,
            Self::Decimal => WireType::Decimal,
            Self::Date => WireType::Date,
            Self::Time => WireType::Time,
            Self::DateTime => WireType::DateTime,
            Self::DateTimeOffset => WireType::DateTimeOffset,
            Self::Uuid => WireType::Guid,
            Self::Xml => WireType::Xml,
            Self::Json => WireType::Object,
        }
    }
}
