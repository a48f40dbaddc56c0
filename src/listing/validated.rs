use super::FieldValue;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Currencies recognised by the price parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Mxn,
    Eur,
    Cad,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Mxn => "MXN",
            Self::Eur => "EUR",
            Self::Cad => "CAD",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "USD" => Some(Self::Usd),
            "MXN" => Some(Self::Mxn),
            "EUR" => Some(Self::Eur),
            "CAD" => Some(Self::Cad),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Whether a listing is offered for rent or for sale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingType {
    Rent,
    Buy,
}

impl fmt::Display for ListingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rent => f.write_str("rent"),
            Self::Buy => f.write_str("buy"),
        }
    }
}

/// Outcome of validating one listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Every canonical field parsed
    Complete,

    /// Retained, but the named fields are absent or failed to parse
    Partial { missing: Vec<String> },
}

/// A listing coerced into the canonical schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedListing {
    /// Normalized listing URL; the dedup key of the clean stage
    pub listing_url: Url,

    /// Page the listing was extracted from
    pub source_url: Url,

    /// Fetch time of the freshest record merged into this listing
    pub fetched_at: DateTime<Utc>,

    pub price: FieldValue<f64>,
    pub currency: FieldValue<Currency>,
    pub address: FieldValue<String>,
    pub bedrooms: FieldValue<f64>,
    pub bathrooms: FieldValue<f64>,
    pub square_footage: FieldValue<u32>,
    pub property_type: FieldValue<String>,
    pub listing_type: FieldValue<ListingType>,
    pub year_built: FieldValue<i32>,
    pub description: FieldValue<String>,
    pub image_link: FieldValue<Url>,

    // Optional extras; they never make a listing partial
    pub amenities: FieldValue<Vec<String>>,
    pub listing_date: FieldValue<NaiveDate>,

    /// Agency or portal that published the listing
    pub source: FieldValue<String>,

    pub status: ValidationStatus,
}

impl ValidatedListing {
    /// Creates a listing with every optional field absent
    pub fn bare(listing_url: Url, source_url: Url, fetched_at: DateTime<Utc>) -> Self {
        let mut listing = Self {
            listing_url,
            source_url,
            fetched_at,
            price: FieldValue::Absent,
            currency: FieldValue::Absent,
            address: FieldValue::Absent,
            bedrooms: FieldValue::Absent,
            bathrooms: FieldValue::Absent,
            square_footage: FieldValue::Absent,
            property_type: FieldValue::Absent,
            listing_type: FieldValue::Absent,
            year_built: FieldValue::Absent,
            description: FieldValue::Absent,
            image_link: FieldValue::Absent,
            amenities: FieldValue::Absent,
            listing_date: FieldValue::Absent,
            source: FieldValue::Absent,
            status: ValidationStatus::Complete,
        };
        listing.refresh_status();
        listing
    }

    /// Names of canonical fields that did not parse
    pub fn missing_fields(&self) -> Vec<String> {
        let checks = [
            ("price", self.price.is_present()),
            ("currency", self.currency.is_present()),
            ("address", self.address.is_present()),
            ("bedrooms", self.bedrooms.is_present()),
            ("bathrooms", self.bathrooms.is_present()),
            ("square_footage", self.square_footage.is_present()),
            ("property_type", self.property_type.is_present()),
            ("listing_type", self.listing_type.is_present()),
            ("year_built", self.year_built.is_present()),
            ("description", self.description.is_present()),
            ("image_link", self.image_link.is_present()),
        ];

        checks
            .iter()
            .filter(|(_, present)| !present)
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Recomputes `status` from the current field values
    pub fn refresh_status(&mut self) {
        let missing = self.missing_fields();
        self.status = if missing.is_empty() {
            ValidationStatus::Complete
        } else {
            ValidationStatus::Partial { missing }
        };
    }

    /// Returns true if every canonical field parsed
    pub fn is_complete(&self) -> bool {
        matches!(self.status, ValidationStatus::Complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare() -> ValidatedListing {
        let url = Url::parse("https://example.com/casa/1").unwrap();
        ValidatedListing::bare(url.clone(), url, Utc::now())
    }

    #[test]
    fn test_bare_listing_is_partial() {
        let listing = bare();
        assert!(!listing.is_complete());
        assert_eq!(listing.missing_fields().len(), 11);
    }

    #[test]
    fn test_refresh_status_tracks_missing_fields() {
        let mut listing = bare();
        listing.price = FieldValue::Value(150000.0);
        listing.address = FieldValue::Invalid("???".to_string());
        listing.refresh_status();

        match &listing.status {
            ValidationStatus::Partial { missing } => {
                assert!(!missing.contains(&"price".to_string()));
                assert!(missing.contains(&"address".to_string()));
                assert!(!missing.contains(&"amenities".to_string()));
            }
            other => panic!("expected partial status, got {:?}", other),
        }
    }

    #[test]
    fn test_currency_codes() {
        assert_eq!(Currency::from_code("usd"), Some(Currency::Usd));
        assert_eq!(Currency::from_code(" MXN "), Some(Currency::Mxn));
        assert_eq!(Currency::from_code("GBP"), None);
        assert_eq!(Currency::Eur.to_string(), "EUR");
    }
}
