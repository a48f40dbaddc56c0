//! Per-host request pacing
//!
//! Each host gets the next free request slot reserved under a lock, so
//! concurrent fetch workers hitting the same host queue up behind each other
//! instead of all firing at once.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Enforces a minimum gap between requests to the same host
#[derive(Debug)]
pub struct HostPacer {
    minimum_gap: Duration,
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl HostPacer {
    pub fn new(minimum_gap: Duration) -> Self {
        Self {
            minimum_gap,
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    /// Reserves the next slot for the URL's host and returns how long to wait
    pub fn reserve(&self, url: &Url) -> Duration {
        if self.minimum_gap.is_zero() {
            return Duration::ZERO;
        }

        let host = url.host_str().unwrap_or_default().to_lowercase();
        let now = Instant::now();

        let mut slots = self.next_slot.lock().unwrap_or_else(|p| p.into_inner());
        let slot = slots.get(&host).copied().filter(|slot| *slot > now).unwrap_or(now);
        slots.insert(host, slot + self.minimum_gap);

        slot - now
    }

    /// Waits for this URL's turn. Returns false if cancelled first.
    pub async fn wait_turn(&self, url: &Url, cancel: &CancellationToken) -> bool {
        let wait = self.reserve(url);
        if wait.is_zero() {
            return !cancel.is_cancelled();
        }

        tracing::trace!("Waiting {:?} before requesting {}", wait, url);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(wait) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_same_host_requests_are_spaced() {
        let pacer = HostPacer::new(Duration::from_millis(50));
        let cancel = CancellationToken::new();
        let start = Instant::now();

        assert!(pacer.wait_turn(&url("https://a.example/1"), &cancel).await);
        assert!(pacer.wait_turn(&url("https://a.example/2"), &cancel).await);
        assert!(pacer.wait_turn(&url("https://A.example/3"), &cancel).await);

        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn test_hosts_are_paced_independently() {
        let pacer = HostPacer::new(Duration::from_secs(5));

        assert_eq!(pacer.reserve(&url("https://a.example/")), Duration::ZERO);
        assert_eq!(pacer.reserve(&url("https://b.example/")), Duration::ZERO);

        let wait = pacer.reserve(&url("https://a.example/next"));
        assert!(wait > Duration::from_secs(4) && wait <= Duration::from_secs(5));
    }

    #[test]
    fn test_zero_gap_never_waits() {
        let pacer = HostPacer::new(Duration::ZERO);
        assert_eq!(pacer.reserve(&url("https://a.example/")), Duration::ZERO);
        assert_eq!(pacer.reserve(&url("https://a.example/")), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_wait() {
        let pacer = HostPacer::new(Duration::from_secs(60));
        let cancel = CancellationToken::new();

        pacer.reserve(&url("https://a.example/"));
        cancel.cancel();
        assert!(!pacer.wait_turn(&url("https://a.example/"), &cancel).await);
    }
}
