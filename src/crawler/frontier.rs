//! Per-job crawl frontier
//!
//! The frontier owns the set of URLs a job may still visit. It enforces the
//! depth and page bounds and deduplicates on the normalized URL. Entries are
//! handed out breadth-first.
//!
//! All bookkeeping sits behind a single mutex so that "check seen, then
//! insert" is atomic across fetch workers.

use crate::pipeline::CrawlJob;
use crate::url::normalize_url;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use tokio::sync::Notify;
use url::Url;

/// A URL admitted to the frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    /// Normalized URL
    pub url: Url,

    /// Link distance from the nearest seed
    pub depth: u32,
}

/// Result of offering a URL to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Queued for fetching
    Admitted,

    /// Already admitted earlier in this job
    Duplicate,

    /// Beyond the job's maximum depth
    TooDeep,

    /// The job has already admitted `max_pages` URLs
    PageBudgetExhausted,

    /// Not a valid http(s) URL
    Invalid,

    /// The frontier was closed by cancellation
    Closed,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

#[derive(Debug, Default)]
struct FrontierState {
    pending: VecDeque<FrontierEntry>,
    seen: HashSet<String>,
    in_flight: HashSet<String>,
    admitted: u32,
    completed: u32,
    closed: bool,
}

/// Breadth-first, bounded, deduplicating URL frontier for one job
#[derive(Debug)]
pub struct Frontier {
    max_depth: u32,
    max_pages: u32,
    state: Mutex<FrontierState>,
    changed: Notify,
}

impl Frontier {
    /// Creates a frontier for `job` with every seed offered at depth 0
    pub fn new(job: &CrawlJob) -> Self {
        let frontier = Self::with_bounds(job.max_depth, job.max_pages);
        for seed in &job.seeds {
            let admission = frontier.offer(seed.as_str(), 0);
            if !admission.is_admitted() {
                tracing::debug!("Seed {} not admitted: {:?}", seed, admission);
            }
        }
        frontier
    }

    /// Creates an empty frontier with the given bounds
    pub fn with_bounds(max_depth: u32, max_pages: u32) -> Self {
        Self {
            max_depth,
            max_pages,
            state: Mutex::new(FrontierState::default()),
            changed: Notify::new(),
        }
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    /// Offers a URL discovered at `depth`
    pub fn offer(&self, url: &str, depth: u32) -> Admission {
        let url = match normalize_url(url) {
            Ok(url) => url,
            Err(_) => return Admission::Invalid,
        };

        if depth > self.max_depth {
            return Admission::TooDeep;
        }

        let admission = {
            let mut state = self.lock();
            if state.closed {
                Admission::Closed
            } else if state.seen.contains(url.as_str()) {
                Admission::Duplicate
            } else if state.admitted >= self.max_pages {
                Admission::PageBudgetExhausted
            } else {
                state.seen.insert(url.as_str().to_string());
                state.admitted += 1;
                state.pending.push_back(FrontierEntry { url, depth });
                Admission::Admitted
            }
        };

        if admission.is_admitted() {
            self.changed.notify_waiters();
        }
        admission
    }

    /// Claims a redirect target reached while fetching an admitted entry
    ///
    /// The target is marked seen so it is fetched at most once per job. It
    /// takes the place of the entry that redirected to it, so it does not use
    /// up page budget and is never queued.
    pub fn claim_redirect(&self, target: &Url) -> Admission {
        let url = match normalize_url(target.as_str()) {
            Ok(url) => url,
            Err(_) => return Admission::Invalid,
        };

        let mut state = self.lock();
        if state.closed {
            Admission::Closed
        } else if state.seen.insert(url.as_str().to_string()) {
            Admission::Admitted
        } else {
            Admission::Duplicate
        }
    }

    /// Pops the next pending entry without waiting and marks it in flight
    pub fn next(&self) -> Option<FrontierEntry> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        let entry = state.pending.pop_front()?;
        state.in_flight.insert(entry.url.as_str().to_string());
        Some(entry)
    }

    /// Waits for the next entry
    ///
    /// Returns `None` once the frontier is exhausted or closed. While other
    /// entries are still in flight this waits, since their pages may offer
    /// new links.
    pub async fn acquire(&self) -> Option<FrontierEntry> {
        loop {
            let changed = self.changed.notified();

            {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }
                if let Some(entry) = state.pending.pop_front() {
                    state.in_flight.insert(entry.url.as_str().to_string());
                    return Some(entry);
                }
                if state.in_flight.is_empty() {
                    return None;
                }
            }

            changed.await;
        }
    }

    /// Marks an in-flight entry as done (fetched or failed)
    pub fn complete(&self, url: &Url) {
        {
            let mut state = self.lock();
            if state.in_flight.remove(url.as_str()) {
                state.completed += 1;
            } else {
                tracing::warn!("Completed URL was not in flight: {}", url);
            }
        }
        self.changed.notify_waiters();
    }

    /// Returns true when nothing is pending and nothing is in flight
    pub fn is_exhausted(&self) -> bool {
        let state = self.lock();
        state.in_flight.is_empty() && (state.pending.is_empty() || state.closed)
    }

    /// Drops all pending entries; no further entries are handed out
    pub fn close(&self) {
        {
            let mut state = self.lock();
            state.closed = true;
            state.pending.clear();
        }
        self.changed.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of URLs admitted so far
    pub fn admitted(&self) -> u32 {
        self.lock().admitted
    }

    /// Number of admitted URLs that finished
    pub fn completed(&self) -> u32 {
        self.lock().completed
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FrontierState> {
        // The state stays consistent across a panicking holder, so recover it
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
