//! URL handling module for Listing-Relay
//!
//! This module provides URL normalization (the frontier's dedup key) and host
//! extraction for the same-site link filter.

mod domain;
mod normalize;

pub use domain::{extract_domain, same_site};
pub use normalize::normalize_url;
