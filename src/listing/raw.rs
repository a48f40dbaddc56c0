use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// A field value as the extraction service returned it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
    List(Vec<RawValue>),
    Null,
}

impl RawValue {
    /// Returns the value as trimmed text, or None for null/empty values
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Number(n) => Some(format_number(*n)),
            Self::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Self::List(items) => {
                let parts: Vec<String> = items.iter().filter_map(Self::as_text).collect();
                (!parts.is_empty()).then(|| parts.join(", "))
            }
            Self::Null => None,
        }
    }

    /// Returns true for null, empty text and empty lists
    pub fn is_empty(&self) -> bool {
        self.as_text().is_none()
    }
}

impl From<serde_json::Value> for RawValue {
    /// Converts arbitrary JSON into a raw value
    ///
    /// Objects are flattened into comma-separated text of their non-empty
    /// values (an address object `{district, city, region}` becomes
    /// "district, city, region"). Booleans become text.
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Text(b.to_string()),
            Value::Number(n) => n.as_f64().map(Self::Number).unwrap_or(Self::Null),
            Value::String(s) => Self::Text(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => {
                let mut entries: Vec<(String, Value)> = map.into_iter().collect();
                entries.sort_by_key(|(key, _)| address_rank(key));
                let parts: Vec<String> = entries
                    .into_iter()
                    .filter_map(|(_, v)| Self::from(v).as_text())
                    .collect();
                if parts.is_empty() {
                    Self::Null
                } else {
                    Self::Text(parts.join(", "))
                }
            }
        }
    }
}

/// Address components ordered from most to least specific
const ADDRESS_ORDER: &[&str] = &[
    "street",
    "address",
    "neighborhood",
    "district",
    "city",
    "municipality",
    "region",
    "state",
    "postal_code",
    "zip",
    "country",
];

fn address_rank(key: &str) -> usize {
    ADDRESS_ORDER
        .iter()
        .position(|k| k.eq_ignore_ascii_case(key))
        .unwrap_or(ADDRESS_ORDER.len())
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// A listing as extracted from one page, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawListing {
    /// Page the listing was extracted from
    pub source_url: Url,

    /// Field name to raw value, as returned by the extraction service
    pub fields: BTreeMap<String, RawValue>,

    /// When the source page was fetched
    pub fetched_at: DateTime<Utc>,
}

impl RawListing {
    pub fn new(source_url: Url, fetched_at: DateTime<Utc>) -> Self {
        Self {
            source_url,
            fields: BTreeMap::new(),
            fetched_at,
        }
    }

    /// Adds a field (builder style)
    pub fn with_field(mut self, name: &str, value: RawValue) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    /// Looks up the first non-empty field among `names`
    pub fn first_of(&self, names: &[&str]) -> Option<&RawValue> {
        names
            .iter()
            .filter_map(|name| self.fields.get(*name))
            .find(|value| !value.is_empty())
    }
}
