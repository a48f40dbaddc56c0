//! Crawl stage: frontier, fetching, parsing and extraction
//!
//! This module contains everything the crawl stage needs to turn a
//! [`crate::pipeline::CrawlJob`] into a batch of raw listings:
//! - The per-job URL frontier with depth/page bounds and deduplication
//! - HTTP fetching with retry logic and per-host pacing
//! - Chunking of long page text
//! - HTML parsing for links and visible text
//! - The extraction service seam
//! - The fetch worker pool driving it all

mod chunk;
mod extraction;
mod fetcher;
mod frontier;
mod pacer;
mod parser;
mod stage;

pub use chunk::{chunk_page_text, ChunkLimits};
pub use extraction::{
    extract_with_retry, parse_extraction_body, ExtractedRecord, ExtractionError,
    ExtractionRequest, ExtractionRetry, ExtractionService, HttpExtractionService,
};
pub use fetcher::{
    build_http_client, fetch_page, fetch_with_retry, FetchError, FetchResponse, FetchedPage,
    MAX_REDIRECTS,
};
pub use frontier::{Admission, Frontier, FrontierEntry};
pub use pacer::HostPacer;
pub use parser::{parse_html, resolve_link, ParsedPage};
pub use stage::{run_crawl, CrawlContext, CrawlOutcome, CrawlStats};
