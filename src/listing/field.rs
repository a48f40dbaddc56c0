use serde::{Deserialize, Serialize};

/// Resolution of one canonical field
///
/// Every field of a [`super::ValidatedListing`] is one of these; raw text only
/// survives inside `Invalid`, as the evidence for why parsing failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum FieldValue<T> {
    /// Parsed successfully
    Value(T),

    /// Not supplied by the extraction service
    Absent,

    /// Supplied but could not be parsed; holds the raw text
    Invalid(String),
}

impl<T> FieldValue<T> {
    /// Returns the parsed value, if any
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Returns true if the field parsed
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// Returns true if the field was not supplied
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Returns true if the field was supplied but failed to parse
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }

    /// Keeps `self` when it parsed, otherwise falls back to `older`
    ///
    /// Used when merging duplicate listings: the newer record wins field by
    /// field, and only its gaps are filled from the older one.
    pub fn or_from(self, older: Self) -> Self {
        match (&self, &older) {
            (Self::Value(_), _) => self,
            (_, Self::Value(_)) => older,
            (Self::Invalid(_), _) => self,
            (Self::Absent, _) => older,
        }
    }

    /// Maps the parsed value
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FieldValue<U> {
        match self {
            Self::Value(v) => FieldValue::Value(f(v)),
            Self::Absent => FieldValue::Absent,
            Self::Invalid(raw) => FieldValue::Invalid(raw),
        }
    }
}

impl<T> Default for FieldValue<T> {
    fn default() -> Self {
        Self::Absent
    }
}

impl<T> From<Option<T>> for FieldValue<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Value(v),
            None => Self::Absent,
        }
    }
}
