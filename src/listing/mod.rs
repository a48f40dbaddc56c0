//! Listing records and the canonical schema
//!
//! A [`RawListing`] carries whatever the extraction service returned for one
//! page. The clean stage resolves it into a [`ValidatedListing`], where every
//! canonical field is a [`FieldValue`].

mod field;
mod raw;
mod validated;

pub use field::FieldValue;
pub use raw::{RawListing, RawValue};
pub use validated::{Currency, ListingType, ValidatedListing, ValidationStatus};

use serde::Serialize;

/// Type of a canonical field, as advertised to the extraction service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Number,
    Integer,
    Text,
    TextList,
    Date,
    Url,
}

/// One entry of the canonical schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
}

/// The canonical listing schema sent with every extraction request
pub const CANONICAL_SCHEMA: &[FieldSpec] = &[
    FieldSpec {
        name: "price",
        kind: FieldKind::Number,
        description: "asking price or monthly rent",
    },
    FieldSpec {
        name: "currency",
        kind: FieldKind::Text,
        description: "ISO currency code, e.g. USD or MXN",
    },
    FieldSpec {
        name: "address",
        kind: FieldKind::Text,
        description: "street address or neighborhood, city, region",
    },
    FieldSpec {
        name: "bedrooms",
        kind: FieldKind::Number,
        description: "number of bedrooms",
    },
    FieldSpec {
        name: "bathrooms",
        kind: FieldKind::Number,
        description: "number of bathrooms, halves allowed",
    },
    FieldSpec {
        name: "square_footage",
        kind: FieldKind::Integer,
        description: "interior area",
    },
    FieldSpec {
        name: "property_type",
        kind: FieldKind::Text,
        description: "house, apartment, land, ...",
    },
    FieldSpec {
        name: "listing_type",
        kind: FieldKind::Text,
        description: "rent or buy",
    },
    FieldSpec {
        name: "year_built",
        kind: FieldKind::Integer,
        description: "construction year",
    },
    FieldSpec {
        name: "description",
        kind: FieldKind::Text,
        description: "free-text description",
    },
    FieldSpec {
        name: "image_link",
        kind: FieldKind::Url,
        description: "main photo URL",
    },
    FieldSpec {
        name: "amenities",
        kind: FieldKind::TextList,
        description: "pool, parking, garden, ...",
    },
    FieldSpec {
        name: "listing_date",
        kind: FieldKind::Date,
        description: "date the listing was published",
    },
    FieldSpec {
        name: "source",
        kind: FieldKind::Text,
        description: "agency or portal publishing the listing",
    },
    FieldSpec {
        name: "url",
        kind: FieldKind::Url,
        description: "link to the listing detail page",
    },
];
