//! Clean stage: raw listings to validated listings
//!
//! Every record is resolved field by field with the parsers in [`parsers`].
//! Records without a usable listing URL, or with neither price nor address,
//! are dropped. Records sharing a listing URL are merged, newest first.
//! The stage never fails the batch.

pub mod parsers;

use crate::listing::{FieldValue, RawListing, ValidatedListing};
use crate::url::normalize_url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

/// Field names accepted for the listing URL, in order of preference
const LISTING_URL_FIELDS: &[&str] = &["url", "listing_url", "link"];

/// Why a single record was dropped
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("listing URL {0:?} could not be resolved")]
    UnresolvableListingUrl(String),

    #[error("neither price nor address parsed for {0}")]
    NoPriceOrAddress(Url),
}

/// Counters for one clean pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanStats {
    /// Raw records received
    pub received: u32,

    /// Validated listings emitted after merging
    pub retained: u32,

    /// Records dropped by validation
    pub dropped: u32,

    /// Records folded into another with the same listing URL
    pub merged: u32,
}

/// Result of cleaning a batch
#[derive(Debug, Clone, Default)]
pub struct CleanOutcome {
    /// Ordered by listing URL
    pub listings: Vec<ValidatedListing>,
    pub stats: CleanStats,
}

/// Validates a single raw record
pub fn clean_record(raw: &RawListing) -> Result<ValidatedListing, ValidationError> {
    let listing_url = resolve_listing_url(raw)?;
    let base = &raw.source_url;

    let price_raw = raw.first_of(&["price"]);
    let mut listing = ValidatedListing::bare(listing_url, raw.source_url.clone(), raw.fetched_at);

    listing.price = parsers::parse_price(price_raw);
    listing.currency = parsers::parse_currency(raw.first_of(&["currency"]), price_raw);
    listing.address = parsers::parse_address(raw.first_of(&["address", "location"]));
    listing.bedrooms = parsers::parse_rooms(raw.first_of(&["bedrooms", "beds"]));
    listing.bathrooms = parsers::parse_rooms(raw.first_of(&["bathrooms", "baths"]));
    listing.square_footage =
        parsers::parse_square_footage(raw.first_of(&["square_footage", "area", "size"]));
    listing.property_type = parsers::parse_property_type(raw.first_of(&["property_type"]));
    listing.listing_type = parsers::parse_listing_type(raw.first_of(&["listing_type"]));
    listing.year_built = parsers::parse_year_built(raw.first_of(&["year_built"]));
    listing.description = parsers::parse_text(raw.first_of(&["description"]));
    listing.image_link = parsers::parse_url(raw.first_of(&["image_link", "image"]), base);
    listing.amenities = parsers::parse_amenities(raw.first_of(&["amenities", "features"]));
    listing.listing_date =
        parsers::parse_listing_date(raw.first_of(&["listing_date", "date_listed", "published"]));
    listing.source = parsers::parse_source(raw.first_of(&["source", "agency"]), base);

    if !listing.price.is_present() && !listing.address.is_present() {
        return Err(ValidationError::NoPriceOrAddress(listing.listing_url));
    }

    listing.refresh_status();
    Ok(listing)
}

/// The record's own URL field, falling back to the page it came from
fn resolve_listing_url(raw: &RawListing) -> Result<Url, ValidationError> {
    let Some(value) = raw.first_of(LISTING_URL_FIELDS) else {
        return normalize_url(raw.source_url.as_str())
            .map_err(|_| ValidationError::UnresolvableListingUrl(raw.source_url.to_string()));
    };

    let text = value.as_text().unwrap_or_default();
    match parsers::parse_url(Some(value), &raw.source_url) {
        FieldValue::Value(url) => normalize_url(url.as_str())
            .map_err(|_| ValidationError::UnresolvableListingUrl(text)),
        _ => Err(ValidationError::UnresolvableListingUrl(text)),
    }
}

/// Merges `newer` into `older` field by field; `newer` wins where it parsed
fn merge(newer: ValidatedListing, older: ValidatedListing) -> ValidatedListing {
    let mut merged = ValidatedListing {
        listing_url: newer.listing_url,
        source_url: newer.source_url,
        fetched_at: newer.fetched_at,
        price: newer.price.or_from(older.price),
        currency: newer.currency.or_from(older.currency),
        address: newer.address.or_from(older.address),
        bedrooms: newer.bedrooms.or_from(older.bedrooms),
        bathrooms: newer.bathrooms.or_from(older.bathrooms),
        square_footage: newer.square_footage.or_from(older.square_footage),
        property_type: newer.property_type.or_from(older.property_type),
        listing_type: newer.listing_type.or_from(older.listing_type),
        year_built: newer.year_built.or_from(older.year_built),
        description: newer.description.or_from(older.description),
        image_link: newer.image_link.or_from(older.image_link),
        amenities: newer.amenities.or_from(older.amenities),
        listing_date: newer.listing_date.or_from(older.listing_date),
        source: newer.source.or_from(older.source),
        status: newer.status,
    };
    merged.refresh_status();
    merged
}

/// Cleans a batch of raw listings
///
/// Deterministic: the same input always yields the same output, in listing
/// URL order.
pub fn clean_batch(raw: &[RawListing]) -> CleanOutcome {
    let mut stats = CleanStats {
        received: raw.len() as u32,
        ..CleanStats::default()
    };

    // Oldest first, so later records overwrite earlier ones; the stable sort
    // keeps input order among records fetched at the same instant
    let mut ordered: Vec<&RawListing> = raw.iter().collect();
    ordered.sort_by_key(|record| record.fetched_at);

    let mut by_url: BTreeMap<String, ValidatedListing> = BTreeMap::new();
    for record in ordered {
        let listing = match clean_record(record) {
            Ok(listing) => listing,
            Err(e) => {
                tracing::debug!("Dropping record from {}: {}", record.source_url, e);
                stats.dropped += 1;
                continue;
            }
        };

        let key = listing.listing_url.as_str().to_string();
        let listing = match by_url.remove(&key) {
            Some(older) => {
                stats.merged += 1;
                merge(listing, older)
            }
            None => listing,
        };
        by_url.insert(key, listing);
    }

    let listings: Vec<ValidatedListing> = by_url.into_values().collect();
    stats.retained = listings.len() as u32;

    tracing::debug!(
        "Cleaned {} records: {} retained, {} dropped, {} merged",
        stats.received,
        stats.retained,
        stats.dropped,
        stats.merged
    );

    CleanOutcome { listings, stats }
}

/// Builds a raw record from text fields (test helper shared with the format stage)
#[cfg(test)]
pub(crate) fn raw_record(source: &str, fields: &[(&str, &str)]) -> RawListing {
    fields.iter().fold(
        RawListing::new(Url::parse(source).unwrap(), chrono::Utc::now()),
        |record, (name, value)| {
            record.with_field(name, crate::listing::RawValue::Text(value.to_string()))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::{Currency, ValidationStatus};
    use chrono::{Duration, Utc};

    #[test]
    fn test_complete_record() {
        let raw = raw_record(
            "https://example.com/casa/1",
            &[
                ("price", "$2,500,000 MXN"),
                ("address", "Calle Morelos 12, Centro"),
                ("bedrooms", "3"),
                ("bathrooms", "2.5"),
                ("square_footage", "1,850 sq ft"),
                ("property_type", "House"),
                ("listing_type", "sale"),
                ("year_built", "1998"),
                ("description", "Bright  house"),
                ("image_link", "/img/1.jpg"),
            ],
        );

        let listing = clean_record(&raw).unwrap();
        assert_eq!(listing.price, FieldValue::Value(2_500_000.0));
        assert_eq!(listing.currency, FieldValue::Value(Currency::Mxn));
        assert_eq!(listing.listing_url.as_str(), "https://example.com/casa/1");
        assert_eq!(
            listing.image_link.value().map(|u| u.as_str()),
            Some("https://example.com/img/1.jpg")
        );
        assert_eq!(listing.status, ValidationStatus::Complete);
    }

    #[test]
    fn test_optional_extras_carried() {
        let raw = raw_record(
            "https://casas.example/venta/7",
            &[
                ("price", "$900,000 MXN"),
                ("amenities", "Alberca, Jardín"),
                ("listing_date", "2024-01-15"),
            ],
        );

        let listing = clean_record(&raw).unwrap();
        assert_eq!(
            listing.amenities,
            FieldValue::Value(vec!["Alberca".to_string(), "Jardín".to_string()])
        );
        assert_eq!(
            listing.listing_date.value().map(|d| d.to_string()),
            Some("2024-01-15".to_string())
        );
        assert_eq!(listing.source, FieldValue::Value("casas.example".to_string()));
        assert!(!listing.missing_fields().contains(&"amenities".to_string()));
    }

    #[test]
    fn test_source_url_only_record_dropped() {
        let raw = raw_record("https://example.com/casa/1", &[]);
        assert_eq!(
            clean_record(&raw),
            Err(ValidationError::NoPriceOrAddress(
                Url::parse("https://example.com/casa/1").unwrap()
            ))
        );

        let outcome = clean_batch(&[raw]);
        assert!(outcome.listings.is_empty());
        assert_eq!(outcome.stats.dropped, 1);
    }

    #[test]
    fn test_unresolvable_listing_url_dropped() {
        let raw = raw_record(
            "https://example.com/",
            &[("url", "javascript:void(0)"), ("price", "100")],
        );
        assert!(matches!(
            clean_record(&raw),
            Err(ValidationError::UnresolvableListingUrl(_))
        ));
    }

    #[test]
    fn test_partial_record_retained() {
        let raw = raw_record(
            "https://example.com/",
            &[("url", "/casa/7"), ("address", "Centro"), ("price", "Consultar")],
        );

        let listing = clean_record(&raw).unwrap();
        assert!(listing.price.is_invalid());
        assert!(listing.bedrooms.is_absent());
        assert!(matches!(listing.status, ValidationStatus::Partial { .. }));
    }

    #[test]
    fn test_duplicates_merge_newest_first() {
        let now = Utc::now();
        let mut older = raw_record(
            "https://example.com/a",
            &[("url", "/casa/1"), ("price", "100000"), ("bedrooms", "2")],
        );
        older.fetched_at = now - Duration::minutes(5);
        let mut newer = raw_record(
            "https://example.com/b",
            &[("url", "https://EXAMPLE.com/casa/1/"), ("price", "120000")],
        );
        newer.fetched_at = now;

        let outcome = clean_batch(&[newer, older]);
        assert_eq!(outcome.listings.len(), 1);
        assert_eq!(outcome.stats.merged, 1);

        let listing = &outcome.listings[0];
        assert_eq!(listing.price, FieldValue::Value(120_000.0));
        assert_eq!(listing.bedrooms, FieldValue::Value(2.0));
        assert_eq!(listing.source_url.as_str(), "https://example.com/b");
    }

    #[test]
    fn test_clean_is_idempotent() {
        let batch = vec![
            raw_record("https://example.com/", &[("url", "/b"), ("price", "200")]),
            raw_record("https://example.com/", &[("url", "/a"), ("address", "Centro")]),
            raw_record("https://example.com/", &[]),
        ];

        let first = clean_batch(&batch);
        let second = clean_batch(&batch);
        assert_eq!(first.listings, second.listings);
        assert_eq!(first.stats, second.stats);

        let doubled: Vec<RawListing> = batch.iter().chain(batch.iter()).cloned().collect();
        assert_eq!(clean_batch(&doubled).listings, first.listings);
    }

    #[test]
    fn test_output_ordered_by_listing_url() {
        let batch = vec![
            raw_record("https://example.com/", &[("url", "/z"), ("price", "1")]),
            raw_record("https://example.com/", &[("url", "/a"), ("price", "2")]),
        ];
        let outcome = clean_batch(&batch);
        let paths: Vec<&str> = outcome.listings.iter().map(|l| l.listing_url.path()).collect();
        assert_eq!(paths, vec!["/a", "/z"]);
    }
}
