//! Per-batch partial tallies and the global tally they fold into.

use serde::Serialize;
use std::collections::HashMap;

use crate::matcher::AddressMatcher;
use crate::record::RecordBatch;

/// Byte totals for the matched addresses of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialTally {
    pub totals: HashMap<String, i64>,
    /// Records in the batch this tally was folded from.
    pub records: usize,
}

impl PartialTally {
    /// Fold a batch. Origin and responder are matched independently and a
    /// matching side receives the full byte count of the record.
    pub fn fold(batch: &RecordBatch, matcher: &AddressMatcher) -> Self {
        let mut totals: HashMap<String, i64> = HashMap::new();

        for record in &batch.records {
            let bytes = i64::try_from(record.byte_count).unwrap_or(i64::MAX);

            if matcher.matches(&record.origin) {
                add(&mut totals, &record.origin, bytes);
            }
            if matcher.matches(&record.responder) {
                add(&mut totals, &record.responder, bytes);
            }
        }

        Self {
            totals,
            records: batch.records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }
}

fn add(totals: &mut HashMap<String, i64>, key: &str, bytes: i64) {
    match totals.get_mut(key) {
        Some(total) => *total = total.saturating_add(bytes),
        None => {
            totals.insert(key.to_string(), bytes);
        }
    }
}

/// One ranked line of the final report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub key: String,
    pub total: i64,
    /// Share of the grand total, 0..=100.
    pub percent: f64,
}

/// Sum of every partial tally, owned by the merger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalTally {
    totals: HashMap<String, i64>,
    partials_merged: u64,
}

impl GlobalTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, partial: PartialTally) {
        for (key, value) in partial.totals {
            let total = self.totals.entry(key).or_insert(0);
            *total = total.saturating_add(value);
        }
        self.partials_merged += 1;
    }

    pub fn get(&self, key: &str) -> Option<i64> {
        self.totals.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    pub fn partials_merged(&self) -> u64 {
        self.partials_merged
    }

    pub fn grand_total(&self) -> i64 {
        self.totals
            .values()
            .fold(0i64, |sum, value| sum.saturating_add(*value))
    }

    pub fn totals(&self) -> &HashMap<String, i64> {
        &self.totals
    }

    /// Top `limit` keys by total, descending. Equal totals are ordered by key.
    pub fn ranked(&self, limit: usize) -> Vec<ReportEntry> {
        let grand_total = self.grand_total();
        let mut pairs: Vec<(&String, &i64)> = self.totals.iter().collect();
        pairs.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        pairs
            .into_iter()
            .take(limit)
            .map(|(key, total)| ReportEntry {
                key: key.clone(),
                total: *total,
                percent: percent_of(*total, grand_total),
            })
            .collect()
    }
}

fn percent_of(value: i64, grand_total: i64) -> f64 {
    if grand_total == 0 {
        0.0
    } else {
        value as f64 / grand_total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ConnectionRecord;
    use proptest::prelude::*;

    fn record(origin: &str, responder: &str, bytes: u64) -> ConnectionRecord {
        ConnectionRecord {
            origin: origin.to_string(),
            responder: responder.to_string(),
            byte_count: bytes,
        }
    }

    fn batch(records: Vec<ConnectionRecord>) -> RecordBatch {
        RecordBatch {
            records,
            skipped: 0,
        }
    }

    fn partial(entries: &[(&str, i64)]) -> PartialTally {
        PartialTally {
            totals: entries
                .iter()
                .map(|(key, value)| (key.to_string(), *value))
                .collect(),
            records: entries.len(),
        }
    }

    #[test]
    fn test_fold_counts_matching_side_only() {
        let matcher = AddressMatcher::parse(&["a"]).unwrap();
        let tally = PartialTally::fold(
            &batch(vec![record("a", "b", 150), record("a", "b", 50)]),
            &matcher,
        );
        assert_eq!(tally.totals.get("a"), Some(&200));
        assert!(!tally.totals.contains_key("b"));
        assert_eq!(tally.records, 2);
    }

    #[test]
    fn test_fold_both_sides_matching() {
        let matcher = AddressMatcher::parse(&["10."]).unwrap();
        let tally = PartialTally::fold(&batch(vec![record("10.0.0.1", "10.0.0.2", 70)]), &matcher);
        assert_eq!(tally.totals.get("10.0.0.1"), Some(&70));
        assert_eq!(tally.totals.get("10.0.0.2"), Some(&70));
    }

    #[test]
    fn test_fold_empty_batch() {
        let matcher = AddressMatcher::parse(&["10."]).unwrap();
        let tally = PartialTally::fold(&RecordBatch::default(), &matcher);
        assert!(tally.is_empty());
        assert_eq!(tally.records, 0);
    }

    #[test]
    fn test_merge_sums_keys() {
        let mut global = GlobalTally::new();
        global.merge(partial(&[("a", 10), ("b", 5)]));
        global.merge(partial(&[("a", 1)]));
        global.merge(PartialTally::default());

        assert_eq!(global.get("a"), Some(11));
        assert_eq!(global.get("b"), Some(5));
        assert_eq!(global.get("c"), None);
        assert_eq!(global.grand_total(), 16);
        assert_eq!(global.partials_merged(), 3);
    }

    #[test]
    fn test_ranked_descending_with_key_tiebreak() {
        let mut global = GlobalTally::new();
        global.merge(partial(&[("c", 10), ("a", 10), ("b", 30), ("d", 1)]));

        let keys: Vec<String> = global.ranked(3).into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_ranked_with_fewer_keys_than_limit() {
        let mut global = GlobalTally::new();
        global.merge(partial(&[("x", 1), ("y", 1), ("z", 2)]));

        let entries = global.ranked(10);
        assert_eq!(entries.len(), 3);
        let sum: f64 = entries.iter().map(|e| e.percent).sum();
        assert!((sum - 100.0).abs() < 1e-9);
        assert!((entries[0].percent - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_ranked_empty_and_zero_totals() {
        assert!(GlobalTally::new().ranked(10).is_empty());

        let mut global = GlobalTally::new();
        global.merge(partial(&[("idle", 0)]));
        let entries = global.ranked(10);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].percent, 0.0);
    }

    #[test]
    fn test_totals_beyond_32_bits() {
        let matcher = AddressMatcher::parse(&["h"]).unwrap();
        let big = u32::MAX as u64;
        let tally = PartialTally::fold(&batch(vec![record("h", "x", big), record("h", "x", big)]), &matcher);
        assert_eq!(tally.totals.get("h"), Some(&(2 * big as i64)));
    }

    proptest! {
        #[test]
        fn prop_merge_order_does_not_matter(
            parts in proptest::collection::vec(
                proptest::collection::hash_map("[a-d]", 0i64..1_000_000, 0..4),
                0..8,
            )
        ) {
            let tallies: Vec<PartialTally> = parts
                .iter()
                .map(|totals| PartialTally { totals: totals.clone(), records: 0 })
                .collect();

            let mut forward = GlobalTally::new();
            for tally in tallies.iter().cloned() {
                forward.merge(tally);
            }
            let mut backward = GlobalTally::new();
            for tally in tallies.iter().rev().cloned() {
                backward.merge(tally);
            }
            prop_assert_eq!(forward.totals(), backward.totals());

            for key in ["a", "b", "c", "d"] {
                let expected: i64 = parts.iter().filter_map(|p| p.get(key)).sum();
                let present = parts.iter().any(|p| p.contains_key(key));
                prop_assert_eq!(forward.get(key), present.then_some(expected));
            }
        }
    }
}
