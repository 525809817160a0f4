//! Adaptive per-domain politeness delay.
//!
//! One limiter is shared by every pipeline in the process so that a batch of
//! posts scraping the same source site does not hammer it. State lives in
//! memory only.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Configuration for rate limiting behavior.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Base delay between requests to the same domain.
    pub base_delay: Duration,
    /// Maximum delay (ceiling for backoff).
    pub max_delay: Duration,
    /// Multiplier for exponential backoff on rate limit.
    pub backoff_multiplier: f64,
    /// Multiplier for recovery on success (< 1.0 to decrease delay).
    pub recovery_multiplier: f64,
    /// Number of consecutive successes before reducing delay.
    pub recovery_threshold: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            recovery_multiplier: 0.8,
            recovery_threshold: 5,
        }
    }
}

impl RateLimitConfig {
    pub fn with_base_delay(base_delay: Duration) -> Self {
        Self {
            base_delay,
            ..Self::default()
        }
    }
}

/// Statistics for a domain.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainStats {
    pub current_delay: Duration,
    pub in_backoff: bool,
    pub total_requests: u64,
    pub rate_limit_hits: u64,
}

#[derive(Debug)]
struct DomainEntry {
    current_delay: Duration,
    /// When the next request may start.
    next_slot: Option<Instant>,
    consecutive_successes: u32,
    in_backoff: bool,
    total_requests: u64,
    rate_limit_hits: u64,
}

impl DomainEntry {
    fn new(base_delay: Duration) -> Self {
        Self {
            current_delay: base_delay,
            next_slot: None,
            consecutive_successes: 0,
            in_backoff: false,
            total_requests: 0,
            rate_limit_hits: 0,
        }
    }

    fn stats(&self) -> DomainStats {
        DomainStats {
            current_delay: self.current_delay,
            in_backoff: self.in_backoff,
            total_requests: self.total_requests,
            rate_limit_hits: self.rate_limit_hits,
        }
    }
}

/// In-memory adaptive rate limiter keyed by host.
#[derive(Clone)]
pub struct DomainRateLimiter {
    domains: Arc<Mutex<HashMap<String, DomainEntry>>>,
    config: RateLimitConfig,
}

impl DomainRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            domains: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// Extract domain from URL.
    pub fn extract_domain(url: &str) -> Option<String> {
        url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|s| s.to_lowercase()))
    }

    /// Wait for the domain's next slot, then claim it.
    /// Returns the domain name, or `None` for URLs without a host.
    pub async fn acquire(&self, url: &str) -> Option<String> {
        let domain = Self::extract_domain(url)?;

        // Reserve the slot under the lock, sleep outside it.
        let wait = {
            let mut domains = self.domains.lock().await;
            let entry = domains
                .entry(domain.clone())
                .or_insert_with(|| DomainEntry::new(self.config.base_delay));
            let now = Instant::now();
            let start = entry.next_slot.map_or(now, |slot| slot.max(now));
            entry.next_slot = Some(start + entry.current_delay);
            entry.total_requests += 1;
            start - now
        };

        if wait > Duration::ZERO {
            debug!("Rate limiting {}: waiting {:?}", domain, wait);
            tokio::time::sleep(wait).await;
        }
        Some(domain)
    }

    /// Classify a response status code and adjust the domain's delay.
    pub async fn report_status(&self, domain: &str, status_code: u16) {
        if status_code == 429 || status_code == 503 {
            self.report_rate_limit(domain, status_code).await;
        } else if (200..400).contains(&status_code) {
            self.report_success(domain).await;
        }
    }

    async fn report_success(&self, domain: &str) {
        let mut domains = self.domains.lock().await;
        let Some(entry) = domains.get_mut(domain) else {
            return;
        };
        entry.consecutive_successes += 1;

        if entry.in_backoff && entry.consecutive_successes >= self.config.recovery_threshold {
            let reduced = entry.current_delay.mul_f64(self.config.recovery_multiplier);
            if reduced <= self.config.base_delay {
                entry.current_delay = self.config.base_delay;
                entry.in_backoff = false;
                info!("Domain {} recovered from rate limit backoff", domain);
            } else {
                entry.current_delay = reduced;
                debug!("Domain {} delay reduced to {:?}", domain, reduced);
            }
            entry.consecutive_successes = 0;
        }
    }

    async fn report_rate_limit(&self, domain: &str, status_code: u16) {
        let mut domains = self.domains.lock().await;
        let entry = domains
            .entry(domain.to_string())
            .or_insert_with(|| DomainEntry::new(self.config.base_delay));
        entry.rate_limit_hits += 1;
        entry.consecutive_successes = 0;
        entry.in_backoff = true;

        let floor = entry.current_delay.max(Duration::from_millis(100));
        entry.current_delay = floor
            .mul_f64(self.config.backoff_multiplier)
            .min(self.config.max_delay);

        warn!(
            "Rate limited by {} (HTTP {}), backing off to {:?}",
            domain, status_code, entry.current_delay
        );
    }

    pub async fn stats(&self) -> HashMap<String, DomainStats> {
        let domains = self.domains.lock().await;
        domains.iter().map(|(k, v)| (k.clone(), v.stats())).collect()
    }
}
