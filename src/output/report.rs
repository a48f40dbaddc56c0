//! Report assembly: ordering and counts

use crate::listing::{FieldValue, ValidatedListing};
use crate::pipeline::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Ordering of listings in a report
///
/// Listings lacking the key value always sort last; ties are broken by
/// listing URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    #[default]
    PriceAsc,
    PriceDesc,
    Address,
    Bedrooms,
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::PriceAsc => "price (ascending)",
            Self::PriceDesc => "price (descending)",
            Self::Address => "address",
            Self::Bedrooms => "bedrooms",
        };
        f.write_str(label)
    }
}

/// Summary counts shown in the report header
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportCounts {
    pub listings: u32,
    pub complete: u32,
    pub partial: u32,
    pub without_price: u32,
}

/// The formatted result of one job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub job_id: JobId,
    pub generated_at: DateTime<Utc>,
    pub sort_key: SortKey,
    pub listings: Vec<ValidatedListing>,
    pub counts: ReportCounts,
}

/// Orders `listings` by `sort_key` and computes the header counts
pub fn build_report(
    job_id: JobId,
    mut listings: Vec<ValidatedListing>,
    sort_key: SortKey,
    generated_at: DateTime<Utc>,
) -> Report {
    listings.sort_by(|a, b| compare(a, b, sort_key));

    let complete = listings.iter().filter(|l| l.is_complete()).count() as u32;
    let counts = ReportCounts {
        listings: listings.len() as u32,
        complete,
        partial: listings.len() as u32 - complete,
        without_price: listings.iter().filter(|l| !l.price.is_present()).count() as u32,
    };

    Report {
        job_id,
        generated_at,
        sort_key,
        listings,
        counts,
    }
}

fn compare(a: &ValidatedListing, b: &ValidatedListing, sort_key: SortKey) -> Ordering {
    let primary = match sort_key {
        SortKey::PriceAsc => present_first(&a.price, &b.price, |x, y| x.total_cmp(y)),
        SortKey::PriceDesc => present_first(&a.price, &b.price, |x, y| y.total_cmp(x)),
        SortKey::Address => present_first(&a.address, &b.address, |x, y| {
            x.to_lowercase().cmp(&y.to_lowercase())
        }),
        SortKey::Bedrooms => present_first(&a.bedrooms, &b.bedrooms, |x, y| x.total_cmp(y)),
    };

    primary.then_with(|| a.listing_url.as_str().cmp(b.listing_url.as_str()))
}

/// Compares two fields, placing missing values after present ones
fn present_first<T>(
    a: &FieldValue<T>,
    b: &FieldValue<T>,
    cmp: impl Fn(&T, &T) -> Ordering,
) -> Ordering {
    match (a.value(), b.value()) {
        (Some(x), Some(y)) => cmp(x, y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
