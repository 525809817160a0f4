//! Fingerprint-based deduplication with multi-day lookback.
//!
//! Known fingerprints are read for the run date plus `lookback_days`
//! preceding calendar dates. New fingerprints are written only after a
//! successful publish, under the run date's key.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use tracing::debug;

use crate::models::{Fingerprint, Item};
use crate::repository::{FingerprintStore, StorageError};

/// The run date followed by `lookback_days` preceding calendar dates.
pub fn lookback_dates(run_date: NaiveDate, lookback_days: u32) -> Vec<NaiveDate> {
    (0..=lookback_days as u64)
        .map_while(|offset| run_date.checked_sub_days(Days::new(offset)))
        .collect()
}

/// Keep items whose fingerprint is not known, in order.
///
/// Repeated fingerprints within `items` are dropped after their first occurrence.
pub fn filter_new(items: Vec<Item>, known: &HashSet<Fingerprint>) -> Vec<Item> {
    let mut seen: HashSet<Fingerprint> = HashSet::new();
    items
        .into_iter()
        .filter(|item| {
            let fp = item.fingerprint();
            !known.contains(&fp) && seen.insert(fp)
        })
        .collect()
}

#[derive(Clone)]
pub struct DedupEngine {
    store: Arc<dyn FingerprintStore>,
}

impl DedupEngine {
    pub fn new(store: Arc<dyn FingerprintStore>) -> Self {
        Self { store }
    }

    /// Union of the stored sets for the run date and the lookback window.
    pub async fn known_fingerprints(
        &self,
        post_ref: &str,
        target: &str,
        run_date: NaiveDate,
        lookback_days: u32,
    ) -> Result<HashSet<Fingerprint>, StorageError> {
        let mut known = HashSet::new();
        for date in lookback_dates(run_date, lookback_days) {
            known.extend(self.store.get_known(post_ref, date, target).await?);
        }
        debug!(
            "{} known fingerprints for {}/{} ({} + {}d)",
            known.len(),
            post_ref,
            target,
            run_date,
            lookback_days
        );
        Ok(known)
    }

    pub fn filter(&self, items: Vec<Item>, known: &HashSet<Fingerprint>) -> Vec<Item> {
        filter_new(items, known)
    }

    /// Record published items. Call only after the publish succeeded.
    pub async fn persist(
        &self,
        post_ref: &str,
        target: &str,
        run_date: NaiveDate,
        items: &[Item],
    ) -> Result<usize, StorageError> {
        let fingerprints: Vec<Fingerprint> = items.iter().map(Item::fingerprint).collect();
        self.store
            .upsert(post_ref, run_date, target, &fingerprints)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::parse_iso_date;
    use crate::repository::MemoryStore;

    fn day(s: &str) -> NaiveDate {
        parse_iso_date(s).unwrap()
    }

    #[test]
    fn test_lookback_dates_are_calendar_days() {
        assert_eq!(lookback_dates(day("2025-03-01"), 0), vec![day("2025-03-01")]);
        assert_eq!(
            lookback_dates(day("2025-03-01"), 2),
            vec![day("2025-03-01"), day("2025-02-28"), day("2025-02-27")]
        );
    }

    #[test]
    fn test_filter_preserves_order_and_drops_in_batch_duplicates() {
        let today = day("2025-10-26");
        let items = vec![
            Item::link("https://x/c", None, today),
            Item::link("https://x/a", Some("first".into()), today),
            Item::link("https://x/b", None, today),
            Item::link("https://x/a", Some("second".into()), today),
        ];
        let known = HashSet::from([Fingerprint::new("https://x/b", today)]);
        let kept = filter_new(items, &known);
        let urls: Vec<&str> = kept.iter().map(|i| i.identity()).collect();
        assert_eq!(urls, vec!["https://x/c", "https://x/a"]);
        assert_eq!(kept[1].title(), Some("first"));
    }

    #[test]
    fn test_promo_codes_dedupe_case_insensitively() {
        let today = day("2025-10-26");
        let items = vec![
            Item::promo_code("spring25", None, today),
            Item::promo_code("SPRING25", None, today),
        ];
        assert_eq!(filter_new(items, &HashSet::new()).len(), 1);
    }

    #[tokio::test]
    async fn test_known_unions_lookback_window() {
        let store = Arc::new(MemoryStore::new());
        let engine = DedupEngine::new(store.clone());
        let today = day("2025-10-26");
        let yesterday = day("2025-10-25");

        let old = Item::link("https://x/old", None, yesterday);
        engine.persist("p", "this", yesterday, &[old.clone()]).await.unwrap();
        let new = Item::link("https://x/new", None, today);
        engine.persist("p", "this", today, &[new.clone()]).await.unwrap();

        let known = engine.known_fingerprints("p", "this", today, 0).await.unwrap();
        assert_eq!(known, HashSet::from([new.fingerprint()]));

        let known = engine.known_fingerprints("p", "this", today, 1).await.unwrap();
        assert_eq!(known, HashSet::from([new.fingerprint(), old.fingerprint()]));
    }
}
