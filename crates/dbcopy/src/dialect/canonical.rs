//! Dialect-neutral type families used as the hub for type translation.
//!
//! Each dialect classifies its native type names into a [`TypeFamily`] and
//! names its own DDL type for every family. Translating between two
//! dialects is the composition of the two, so adding a dialect never needs
//! a pairwise table.

use std::fmt;

/// Canonical family of a column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeFamily {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    /// Exact numeric with optional precision/scale.
    Decimal,
    /// Single precision float.
    Real,
    /// Double precision float.
    Double,
    Char,
    Varchar,
    /// Unbounded character data (TEXT, CLOB, VARCHAR(max)).
    Text,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Binary,
    /// Unbounded binary data.
    Blob,
    Uuid,
    /// Anything the dialect cannot classify; rendered as unbounded text.
    Other,
}

impl TypeFamily {
    /// Families whose length spec comes from the catalog's DATA_LENGTH.
    pub fn uses_data_length(self) -> bool {
        matches!(
            self,
            TypeFamily::Char
                | TypeFamily::Varchar
                | TypeFamily::Binary
                | TypeFamily::Date
                | TypeFamily::Time
                | TypeFamily::Timestamp
                | TypeFamily::TimestampTz
        )
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            TypeFamily::TinyInt | TypeFamily::SmallInt | TypeFamily::Integer | TypeFamily::BigInt
        )
    }

    /// Integer family wide enough for `precision` decimal digits.
    ///
    /// Returns `None` above 18 digits, where no integer type is safe.
    pub fn integer_for_precision(precision: i64) -> Option<TypeFamily> {
        match precision {
            p if p < 3 => Some(TypeFamily::TinyInt),
            3..=4 => Some(TypeFamily::SmallInt),
            5..=8 => Some(TypeFamily::Integer),
            9..=18 => Some(TypeFamily::BigInt),
            _ => None,
        }
    }
}

/// The qualifier part of a DDL type, `TYPE(<spec>)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LengthSpec {
    /// A character/byte length.
    Length(i64),
    /// Precision with optional scale.
    Numeric { precision: i64, scale: Option<i64> },
    /// The catalog did not resolve a length.
    Unresolved,
    /// Emit the bare type name.
    Empty,
    /// The target's maximum-width marker (`max`).
    Max,
}

impl fmt::Display for LengthSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LengthSpec::Length(n) => write!(f, "{}", n),
            LengthSpec::Numeric {
                precision,
                scale: Some(scale),
            } => write!(f, "{}, {}", precision, scale),
            LengthSpec::Numeric {
                precision,
                scale: None,
            } => write!(f, "{}", precision),
            LengthSpec::Max => f.write_str("max"),
            LengthSpec::Unresolved | LengthSpec::Empty => Ok(()),
        }
    }
}
