//! Summary aggregation (spec.md §3, §8 "Summary additivity").
//!
//! A nested, additively-mergeable record. Each worker accumulates its own
//! `Summary`; the executor folds per-worker summaries into one at shutdown.
//! `merge` must satisfy `Summary(serial run) == merge(per-worker summaries
//! of parallel run)` regardless of how batches were distributed.

use std::collections::BTreeMap;
use std::fmt;

use crate::filters::FilterKind;
use crate::modifiers::{AdapterStats, ModifierStats};

#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub reads_seen: u64,
    pub pairs_seen: u64,
    pub modifiers: BTreeMap<String, ModifierStats>,
    pub adapters: BTreeMap<String, AdapterStats>,
    pub sinks: BTreeMap<FilterKind, u64>,
    /// Per-position base counts: `position -> base -> count`.
    pub base_histogram: BTreeMap<usize, BTreeMap<u8, u64>>,
    /// Per-position quality-score counts: `position -> phred -> count`.
    pub quality_histogram: BTreeMap<usize, BTreeMap<i32, u64>>,
}

impl Summary {
    pub fn record_read(&mut self, sequence: &[u8], phred_scores: impl Iterator<Item = i32>) {
        self.reads_seen += 1;
        for (pos, &base) in sequence.iter().enumerate() {
            *self.base_histogram.entry(pos).or_default().entry(base).or_insert(0) += 1;
        }
        for (pos, q) in phred_scores.enumerate() {
            *self.quality_histogram.entry(pos).or_default().entry(q).or_insert(0) += 1;
        }
    }

    pub fn record_pair(&mut self) {
        self.pairs_seen += 1;
    }

    pub fn record_sink(&mut self, kind: FilterKind) {
        *self.sinks.entry(kind).or_insert(0) += 1;
    }

    pub fn modifier_stats_mut(&mut self, name: &str) -> &mut ModifierStats {
        self.modifiers.entry(name.to_string()).or_default()
    }

    pub fn adapter_stats_mut(&mut self, name: &str) -> &mut AdapterStats {
        self.adapters.entry(name.to_string()).or_default()
    }

    /// Folds `other` into `self`. Used both to merge per-worker deltas and
    /// to combine a parallel run's summaries into the serial-equivalent
    /// total (spec.md §8).
    pub fn merge(&mut self, other: &Summary) {
        self.reads_seen += other.reads_seen;
        self.pairs_seen += other.pairs_seen;
        for (name, stats) in &other.modifiers {
            self.modifiers.entry(name.clone()).or_default().merge(stats);
        }
        for (name, stats) in &other.adapters {
            self.adapters.entry(name.clone()).or_default().merge(stats);
        }
        for (&kind, &count) in &other.sinks {
            *self.sinks.entry(kind).or_insert(0) += count;
        }
        for (&pos, bases) in &other.base_histogram {
            let entry = self.base_histogram.entry(pos).or_default();
            for (&base, &count) in bases {
                *entry.entry(base).or_insert(0) += count;
            }
        }
        for (&pos, quals) in &other.quality_histogram {
            let entry = self.quality_histogram.entry(pos).or_default();
            for (&q, &count) in quals {
                *entry.entry(q).or_insert(0) += count;
            }
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "reads seen: {}", self.reads_seen)?;
        writeln!(f, "pairs seen: {}", self.pairs_seen)?;
        for (name, stats) in &self.modifiers {
            writeln!(f, "  {name}: {} reads affected, {} bases removed", stats.reads_affected, stats.bases_removed)?;
        }
        for (name, stats) in &self.adapters {
            writeln!(f, "  adapter {name}: {} matches", stats.matches)?;
        }
        for (kind, count) in &self.sinks {
            writeln!(f, "  sink {kind:?}: {count}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_is_additive_across_workers() {
        let mut w1 = Summary::default();
        w1.reads_seen = 3;
        w1.record_sink(FilterKind::TooShort);

        let mut w2 = Summary::default();
        w2.reads_seen = 5;
        w2.record_sink(FilterKind::TooShort);
        w2.record_sink(FilterKind::NoFilter);

        let mut serial = Summary::default();
        serial.reads_seen = 8;
        serial.record_sink(FilterKind::TooShort);
        serial.record_sink(FilterKind::TooShort);
        serial.record_sink(FilterKind::NoFilter);

        let mut merged = Summary::default();
        merged.merge(&w1);
        merged.merge(&w2);

        assert_eq!(merged.reads_seen, serial.reads_seen);
        assert_eq!(merged.sinks, serial.sinks);
    }

    #[test]
    fn modifier_stats_merge_sums_bases_removed() {
        let mut total = Summary::default();
        total.modifier_stats_mut("cut").bases_removed = 2;

        let mut delta = Summary::default();
        delta.modifier_stats_mut("cut").bases_removed = 3;

        total.merge(&delta);
        assert_eq!(total.modifiers["cut"].bases_removed, 5);
    }
}
