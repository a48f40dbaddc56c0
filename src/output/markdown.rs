//! Markdown rendering of a job report
//!
//! Every listing renders the same fixed set of fields. Missing or invalid
//! fields render as [`PLACEHOLDER`]; rendering never fails.

use crate::listing::{FieldValue, ValidatedListing};
use crate::output::report::Report;
use std::fmt::Display;

/// Shown in place of absent or unparseable fields
pub const PLACEHOLDER: &str = "N/A";

/// Renders a report as a Markdown document
pub fn render_markdown(report: &Report) -> String {
    let mut md = String::new();

    md.push_str("# Property Listings Report\n\n");

    md.push_str(&format!("- **Job**: {}\n", report.job_id));
    md.push_str(&format!(
        "- **Generated**: {}\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    md.push_str(&format!("- **Sorted by**: {}\n", report.sort_key));
    md.push_str(&format!(
        "- **Listings**: {} ({} complete, {} partial)\n\n",
        report.counts.listings, report.counts.complete, report.counts.partial
    ));

    if report.listings.is_empty() {
        md.push_str("_No listings were retained for this job._\n");
        return md;
    }

    for (index, listing) in report.listings.iter().enumerate() {
        render_listing(&mut md, index + 1, listing);
    }

    md
}

fn render_listing(md: &mut String, number: usize, listing: &ValidatedListing) {
    md.push_str(&format!("## {}. {}\n\n", number, title(listing)));

    md.push_str("| Field | Value |\n");
    md.push_str("|-------|-------|\n");
    row(md, "Price", &format_price(listing));
    row(md, "Listing Type", &field(&listing.listing_type));
    row(md, "Property Type", &field(&listing.property_type));
    row(md, "Bedrooms", &field(&listing.bedrooms));
    row(md, "Bathrooms", &field(&listing.bathrooms));
    row(md, "Square Footage", &field(&listing.square_footage.clone().map(|area| group_thousands(area))));
    row(md, "Year Built", &field(&listing.year_built));
    row(md, "Address", &field(&listing.address));
    row(md, "Listing", listing.listing_url.as_str());
    row(md, "Image", &field(&listing.image_link));
    row(md, "Amenities", &field(&listing.amenities.clone().map(|items| items.join(", "))));
    row(md, "Listed", &field(&listing.listing_date));
    row(md, "Source", &field(&listing.source));
    md.push('\n');

    md.push_str(&format!("**Description**: {}\n\n", field(&listing.description)));
}

/// Address if known, then property type, then the listing URL
fn title(listing: &ValidatedListing) -> String {
    listing
        .address
        .value()
        .or(listing.property_type.value())
        .cloned()
        .unwrap_or_else(|| listing.listing_url.to_string())
}

fn row(md: &mut String, name: &str, value: &str) {
    md.push_str(&format!("| {} | {} |\n", name, escape_cell(value)));
}

fn escape_cell(value: &str) -> String {
    value.replace('|', "\\|").replace('\n', " ")
}

fn field<T: Display>(value: &FieldValue<T>) -> String {
    match value.value() {
        Some(v) => v.to_string(),
        None => PLACEHOLDER.to_string(),
    }
}

fn format_price(listing: &ValidatedListing) -> String {
    let Some(price) = listing.price.value() else {
        return PLACEHOLDER.to_string();
    };

    let whole = price.trunc() as u64;
    let cents = ((price - price.trunc()) * 100.0).round() as u64;
    let amount = if cents == 0 {
        group_thousands(whole)
    } else if cents >= 100 {
        group_thousands(whole + 1)
    } else {
        format!("{}.{:02}", group_thousands(whole), cents)
    };

    match listing.currency.value() {
        Some(currency) => format!("{} {}", amount, currency),
        None => amount,
    }
}

/// 1234567 -> "1,234,567"
fn group_thousands(value: impl Into<u64>) -> String {
    let digits = value.into().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::{Currency, ListingType};
    use crate::output::report::{build_report, SortKey};
    use crate::pipeline::JobId;
    use chrono::{NaiveDate, Utc};
    use url::Url;

    fn full_listing() -> ValidatedListing {
        let url = Url::parse("https://example.com/casa/1").unwrap();
        let mut listing = ValidatedListing::bare(url.clone(), url, Utc::now());
        listing.price = FieldValue::Value(2_500_000.0);
        listing.currency = FieldValue::Value(Currency::Mxn);
        listing.address = FieldValue::Value("Calle Morelos 12, Centro".to_string());
        listing.bedrooms = FieldValue::Value(3.0);
        listing.bathrooms = FieldValue::Value(2.5);
        listing.square_footage = FieldValue::Value(1_850);
        listing.listing_type = FieldValue::Value(ListingType::Buy);
        listing.amenities = FieldValue::Value(vec!["Pool".to_string(), "Garden".to_string()]);
        listing.listing_date = FieldValue::Value(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        listing.source = FieldValue::Value("Inmobiliaria Sol".to_string());
        listing.refresh_status();
        listing
    }

    #[test]
    fn test_render_full_listing() {
        let report = build_report(JobId::new(), vec![full_listing()], SortKey::PriceAsc, Utc::now());
        let md = render_markdown(&report);

        assert!(md.contains("# Property Listings Report"));
        assert!(md.contains("## 1. Calle Morelos 12, Centro"));
        assert!(md.contains("| Price | 2,500,000 MXN |"));
        assert!(md.contains("| Bathrooms | 2.5 |"));
        assert!(md.contains("| Square Footage | 1,850 |"));
        assert!(md.contains("| Listing Type | buy |"));
        assert!(md.contains("| Amenities | Pool, Garden |"));
        assert!(md.contains("| Listed | 2024-03-05 |"));
        assert!(md.contains("| Source | Inmobiliaria Sol |"));
    }

    #[test]
    fn test_missing_fields_render_placeholder() {
        let url = Url::parse("https://example.com/casa/2").unwrap();
        let mut listing = ValidatedListing::bare(url.clone(), url, Utc::now());
        listing.price = FieldValue::Invalid("Consultar".to_string());
        listing.refresh_status();

        let report = build_report(JobId::new(), vec![listing], SortKey::PriceAsc, Utc::now());
        let md = render_markdown(&report);

        assert!(md.contains("## 1. https://example.com/casa/2"));
        assert!(md.contains("| Price | N/A |"));
        assert!(md.contains("| Address | N/A |"));
        assert!(!md.contains("Consultar"));
    }

    #[test]
    fn test_empty_report() {
        let report = build_report(JobId::new(), Vec::new(), SortKey::PriceAsc, Utc::now());
        let md = render_markdown(&report);
        assert!(md.contains("- **Listings**: 0 (0 complete, 0 partial)"));
        assert!(md.contains("No listings were retained"));
    }

    #[test]
    fn test_cells_are_escaped() {
        let mut listing = full_listing();
        listing.address = FieldValue::Value("Lote 4 | Manzana 2".to_string());
        let report = build_report(JobId::new(), vec![listing], SortKey::PriceAsc, Utc::now());
        assert!(render_markdown(&report).contains("| Address | Lote 4 \\| Manzana 2 |"));
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0u32), "0");
        assert_eq!(group_thousands(999u32), "999");
        assert_eq!(group_thousands(1_000u32), "1,000");
        assert_eq!(group_thousands(1_234_567u64), "1,234,567");
    }
}
