//! Field parsers for the canonical schema
//!
//! Each parser takes the raw value the extraction service returned (if any)
//! and resolves it to a [`FieldValue`]. No parser ever fails: unusable input
//! becomes `Invalid` carrying the raw text.

use crate::crawler::resolve_link;
use crate::listing::{Currency, FieldValue, ListingType, RawValue};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use url::Url;

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(\d[\d.,]*)\s*(k|m)?\b").expect("static number pattern is valid")
    })
}

fn decimal_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+(?:[.,]\d+)?").expect("static decimal pattern is valid"))
}

fn integer_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\d{1,3}(?:[.,]\d{3})+|\d+").expect("static integer pattern is valid")
    })
}

fn year_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b(\d{4})\b").expect("static year pattern is valid"))
}

/// Runs `parse` on a present value; absent/empty input stays `Absent`
fn resolve<T>(raw: Option<&RawValue>, parse: impl FnOnce(&RawValue) -> Option<T>) -> FieldValue<T> {
    let Some(raw) = raw.filter(|value| !value.is_empty()) else {
        return FieldValue::Absent;
    };

    match parse(raw) {
        Some(value) => FieldValue::Value(value),
        None => FieldValue::Invalid(raw.as_text().unwrap_or_default()),
    }
}

/// Parses a number that may use `,` or `.` as thousands separator
///
/// With both present, the last one is the decimal point. A lone separator
/// followed by exactly three digits is a thousands separator.
fn parse_separated_number(digits: &str) -> Option<f64> {
    let last_comma = digits.rfind(',');
    let last_dot = digits.rfind('.');

    let normalized = match (last_comma, last_dot) {
        (Some(c), Some(d)) if c > d => digits.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => digits.replace(',', ""),
        (Some(_), None) => thousands_or_decimal(digits, ','),
        (None, Some(_)) => thousands_or_decimal(digits, '.'),
        (None, None) => digits.to_string(),
    };

    normalized.trim_end_matches('.').parse::<f64>().ok()
}

fn thousands_or_decimal(digits: &str, separator: char) -> String {
    let groups: Vec<&str> = digits.split(separator).collect();
    let is_thousands =
        groups.len() > 2 || groups.last().map(|g| g.len() == 3).unwrap_or(false);

    if is_thousands {
        groups.concat()
    } else {
        digits.replace(separator, ".")
    }
}

/// Price: strips currency text and separators, honours `k`/`m` suffixes
///
/// ```
/// use listing_relay::clean::parsers::parse_price;
/// use listing_relay::listing::{FieldValue, RawValue};
///
/// let raw = RawValue::Text("$1,250,000 MXN".to_string());
/// assert_eq!(parse_price(Some(&raw)), FieldValue::Value(1_250_000.0));
/// ```
pub fn parse_price(raw: Option<&RawValue>) -> FieldValue<f64> {
    resolve(raw, |raw| {
        let price = match raw {
            RawValue::Number(n) => *n,
            _ => {
                let text = raw.as_text()?;
                let captures = number_pattern().captures(&text)?;
                let base = parse_separated_number(captures.get(1)?.as_str())?;
                let multiplier = match captures.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
                    Some(suffix) if suffix == "k" => 1_000.0,
                    Some(suffix) if suffix == "m" => 1_000_000.0,
                    _ => 1.0,
                };
                base * multiplier
            }
        };

        (price.is_finite() && price > 0.0).then_some(price)
    })
}

/// Infers a currency from free text such as "$150,000 MXN" or "€200.000"
fn infer_currency(text: &str) -> Option<Currency> {
    let upper = text.to_uppercase();

    if upper.contains("MXN") || upper.contains("PESO") || upper.contains("MX$") {
        Some(Currency::Mxn)
    } else if upper.contains("CAD") || upper.contains("C$") {
        Some(Currency::Cad)
    } else if upper.contains("EUR") || upper.contains('€') {
        Some(Currency::Eur)
    } else if upper.contains("USD") || upper.contains("DOLLAR") || upper.contains('$') {
        Some(Currency::Usd)
    } else {
        None
    }
}

/// Currency: an explicit ISO code wins, otherwise inferred from the
/// currency field text or the raw price text
pub fn parse_currency(raw: Option<&RawValue>, price: Option<&RawValue>) -> FieldValue<Currency> {
    let explicit = raw.and_then(RawValue::as_text);

    if let Some(currency) = explicit.as_deref().and_then(Currency::from_code) {
        return FieldValue::Value(currency);
    }

    let inferred = explicit
        .as_deref()
        .and_then(infer_currency)
        .or_else(|| price.and_then(RawValue::as_text).as_deref().and_then(infer_currency));

    match (inferred, explicit) {
        (Some(currency), _) => FieldValue::Value(currency),
        (None, Some(text)) => FieldValue::Invalid(text),
        (None, None) => FieldValue::Absent,
    }
}

/// Address: whitespace collapsed, empty components and stray punctuation
/// removed, components joined with ", "
pub fn parse_address(raw: Option<&RawValue>) -> FieldValue<String> {
    resolve(raw, |raw| {
        let text = raw.as_text()?;
        let parts: Vec<String> = text
            .split(&[',', ';', '\n'][..])
            .map(|part| {
                part.split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .trim_matches(|c: char| c == '.' || c == '-' || c == '|' || c.is_whitespace())
                    .to_string()
            })
            .filter(|part| !part.is_empty())
            .collect();

        let address = parts.join(", ");
        address.chars().any(char::is_alphabetic).then_some(address)
    })
}

/// Bedrooms and bathrooms: the first decimal number in the value
pub fn parse_rooms(raw: Option<&RawValue>) -> FieldValue<f64> {
    resolve(raw, |raw| {
        let rooms = match raw {
            RawValue::Number(n) => *n,
            _ => {
                let text = raw.as_text()?;
                let found = decimal_pattern().find(&text)?;
                found.as_str().replace(',', ".").parse::<f64>().ok()?
            }
        };

        (rooms.is_finite() && rooms >= 0.0 && rooms < 1_000.0).then_some(rooms)
    })
}

/// Square footage: the first integer after removing thousands separators
pub fn parse_square_footage(raw: Option<&RawValue>) -> FieldValue<u32> {
    resolve(raw, |raw| {
        let area = match raw {
            RawValue::Number(n) if n.is_finite() && *n >= 1.0 => n.round(),
            RawValue::Number(_) => return None,
            _ => {
                let text = raw.as_text()?;
                let found = integer_pattern().find(&text)?;
                found.as_str().replace(&[',', '.'][..], "").parse::<f64>().ok()?
            }
        };

        (area >= 1.0 && area <= u32::MAX as f64).then_some(area as u32)
    })
}

/// Year built: a four-digit year between 1800 and the current year
pub fn parse_year_built(raw: Option<&RawValue>) -> FieldValue<i32> {
    let current_year = Utc::now().year();

    resolve(raw, |raw| {
        let year = match raw {
            RawValue::Number(n) if n.fract() == 0.0 => *n as i32,
            RawValue::Number(_) => return None,
            _ => {
                let text = raw.as_text()?;
                let captures = year_pattern().captures(&text)?;
                captures.get(1)?.as_str().parse::<i32>().ok()?
            }
        };

        (1800..=current_year).contains(&year).then_some(year)
    })
}

const RENT_WORDS: &[&str] = &["rent", "rental", "renta", "lease", "alquiler"];
const BUY_WORDS: &[&str] = &["buy", "sale", "sell", "venta", "purchase"];

/// Listing type: rent/rental map to Rent, buy/sale to Buy
pub fn parse_listing_type(raw: Option<&RawValue>) -> FieldValue<ListingType> {
    resolve(raw, |raw| {
        let text = raw.as_text()?.to_lowercase();
        let words: Vec<&str> = text.split(|c: char| !c.is_alphabetic()).collect();

        if words.iter().any(|w| RENT_WORDS.contains(w)) {
            Some(ListingType::Rent)
        } else if words.iter().any(|w| BUY_WORDS.contains(w)) {
            Some(ListingType::Buy)
        } else {
            None
        }
    })
}

/// Free text with whitespace collapsed
pub fn parse_text(raw: Option<&RawValue>) -> FieldValue<String> {
    resolve(raw, |raw| {
        let text = raw.as_text()?;
        Some(text.split_whitespace().collect::<Vec<_>>().join(" "))
    })
}

/// Property type: lowercased free text
pub fn parse_property_type(raw: Option<&RawValue>) -> FieldValue<String> {
    parse_text(raw).map(|text| text.to_lowercase())
}

/// Absolute http(s) URL; relative links are resolved against `base`
pub fn parse_url(raw: Option<&RawValue>, base: &Url) -> FieldValue<Url> {
    resolve(raw, |raw| {
        let text = raw.as_text()?;
        resolve_link(&text, base)
    })
}

/// Amenities: list items, or separated text, with whitespace collapsed and
/// case-insensitive duplicates removed
pub fn parse_amenities(raw: Option<&RawValue>) -> FieldValue<Vec<String>> {
    resolve(raw, |raw| {
        let items: Vec<String> = match raw {
            RawValue::List(items) => items.iter().filter_map(RawValue::as_text).collect(),
            _ => raw
                .as_text()?
                .split(&[',', ';', '\n', '•'][..])
                .map(str::to_string)
                .collect(),
        };

        let mut seen = HashSet::new();
        let amenities: Vec<String> = items
            .iter()
            .map(|item| item.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|item| !item.is_empty())
            .filter(|item| seen.insert(item.to_lowercase()))
            .collect();

        (!amenities.is_empty()).then_some(amenities)
    })
}

/// Day-first numeric forms come before month-first ones
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
];

/// Listing date: RFC 3339 or a common date form, not in the future
pub fn parse_listing_date(raw: Option<&RawValue>) -> FieldValue<NaiveDate> {
    let today = Utc::now().date_naive();

    resolve(raw, |raw| {
        let text = raw.as_text()?;
        let date = DateTime::parse_from_rfc3339(&text)
            .map(|dt| dt.date_naive())
            .ok()
            .or_else(|| {
                DATE_FORMATS
                    .iter()
                    .find_map(|format| NaiveDate::parse_from_str(&text, format).ok())
            })?;

        (date.year() >= 1900 && date <= today).then_some(date)
    })
}

/// Source: the named agency or portal, else the host of the page
pub fn parse_source(raw: Option<&RawValue>, page: &Url) -> FieldValue<String> {
    match parse_text(raw) {
        FieldValue::Absent => page.host_str().map(str::to_string).into(),
        parsed => parsed,
    }
}
