//! The filter chain (spec.md §4.4): ordered predicates that classify a
//! (possibly merged) pair into exactly one named output sink.

use crate::read::{Read, ReadPair};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterKind {
    TooShort,
    TooLong,
    NContent,
    Trimmed,
    Untrimmed,
    MergedRead,
    /// Tautology; always matches. Must be last in any chain.
    NoFilter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairFilterMode {
    Any,
    Both,
    First,
}

impl PairFilterMode {
    /// Combines the per-mate predicate `p` into a single pair-level verdict
    /// (spec.md §4.4).
    fn combine(self, p1: bool, p2: bool) -> bool {
        match self {
            PairFilterMode::Any => p1 || p2,
            PairFilterMode::Both => p1 && p2,
            PairFilterMode::First => p1,
        }
    }
}

#[derive(Clone)]
pub enum Filter {
    TooShort { min_length: usize },
    TooLong { max_length: usize },
    NContent { max_n: f64 },
    Trimmed { discard_trimmed: bool },
    Untrimmed,
    MergedRead,
    NoFilter,
}

impl Filter {
    pub fn kind(&self) -> FilterKind {
        match self {
            Filter::TooShort { .. } => FilterKind::TooShort,
            Filter::TooLong { .. } => FilterKind::TooLong,
            Filter::NContent { .. } => FilterKind::NContent,
            Filter::Trimmed { .. } => FilterKind::Trimmed,
            Filter::Untrimmed => FilterKind::Untrimmed,
            Filter::MergedRead => FilterKind::MergedRead,
            Filter::NoFilter => FilterKind::NoFilter,
        }
    }

    fn matches_read(&self, read: &Read) -> bool {
        match self {
            Filter::TooShort { min_length } => read.len() < *min_length,
            Filter::TooLong { max_length } => read.len() > *max_length,
            Filter::NContent { max_n } => {
                if read.is_empty() {
                    return false;
                }
                let n_count = read.sequence.iter().filter(|&&b| b.eq_ignore_ascii_case(&b'N')).count();
                let frac = n_count as f64 / read.len() as f64;
                if *max_n >= 1.0 {
                    n_count as f64 > *max_n
                } else {
                    frac > *max_n
                }
            }
            Filter::Trimmed { .. } => read.trimmed_prefix_len > 0 || read.trimmed_suffix_len > 0,
            Filter::Untrimmed => read.trimmed_prefix_len == 0 && read.trimmed_suffix_len == 0,
            Filter::MergedRead | Filter::NoFilter => false,
        }
    }

    /// Evaluates this filter against a pair under `mode`, or against the
    /// merged read directly when `pair.merged` is set (spec.md §4.4).
    pub fn matches_pair(&self, pair: &ReadPair, mode: PairFilterMode) -> bool {
        match self {
            Filter::MergedRead => pair.merged.is_some(),
            Filter::NoFilter => true,
            _ => {
                if let Some(merged) = &pair.merged {
                    self.matches_read(merged)
                } else {
                    mode.combine(self.matches_read(&pair.r1), self.matches_read(&pair.r2))
                }
            }
        }
    }
}

/// Verdict handed to the formatter/writer stage: which sink owns this pair,
/// or `Drop` for a silently discarded pair (spec.md §4.4 `discard_trimmed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Sink(FilterKind),
    Drop,
}

#[derive(Clone)]
pub struct FilterChain {
    filters: Vec<Filter>,
    mode: PairFilterMode,
}

impl FilterChain {
    /// Builds a chain, appending the mandatory trailing `NoFilter` if the
    /// caller didn't already (spec.md §3: "`NoFilter` is always last").
    pub fn new(mut filters: Vec<Filter>, mode: PairFilterMode) -> Self {
        if !matches!(filters.last(), Some(Filter::NoFilter)) {
            filters.push(Filter::NoFilter);
        }
        FilterChain { filters, mode }
    }

    /// Returns the sink that owns this pair: the first filter in the chain
    /// whose predicate matches, or a `Drop` if that filter is a
    /// `discard_trimmed`-flagged `TrimmedFilter` (spec.md §4.4).
    pub fn classify(&self, pair: &ReadPair) -> Disposition {
        for filter in &self.filters {
            if filter.matches_pair(pair, self.mode) {
                if let Filter::Trimmed { discard_trimmed: true } = filter {
                    return Disposition::Drop;
                }
                return Disposition::Sink(filter.kind());
            }
        }
        Disposition::Sink(FilterKind::NoFilter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(seq1: &str, seq2: &str) -> ReadPair {
        ReadPair::new(
            Read::new("r".into(), seq1.as_bytes().to_vec(), vec![b'I'; seq1.len()], 33),
            Read::new("r".into(), seq2.as_bytes().to_vec(), vec![b'I'; seq2.len()], 33),
        )
    }

    #[test]
    fn too_short_any_mode_fails_on_either_mate() {
        let chain = FilterChain::new(vec![Filter::TooShort { min_length: 5 }], PairFilterMode::Any);
        let p = pair("AC", "ACGTACGT");
        assert_eq!(chain.classify(&p), Disposition::Sink(FilterKind::TooShort));
    }

    #[test]
    fn too_short_both_mode_requires_both_mates_short() {
        let chain = FilterChain::new(vec![Filter::TooShort { min_length: 5 }], PairFilterMode::Both);
        let p = pair("AC", "ACGTACGT");
        assert_eq!(chain.classify(&p), Disposition::Sink(FilterKind::NoFilter));
    }

    #[test]
    fn first_mode_only_evaluates_r1() {
        let chain = FilterChain::new(vec![Filter::TooShort { min_length: 5 }], PairFilterMode::First);
        let p = pair("ACGTACGT", "AC");
        assert_eq!(chain.classify(&p), Disposition::Sink(FilterKind::NoFilter));
    }

    #[test]
    fn discard_trimmed_drops_silently() {
        let chain = FilterChain::new(vec![Filter::Trimmed { discard_trimmed: true }], PairFilterMode::Any);
        let mut p = pair("ACGT", "ACGT");
        p.r1.trimmed_suffix_len = 4;
        assert_eq!(chain.classify(&p), Disposition::Drop);
    }

    #[test]
    fn merged_read_routes_to_merged_sink_before_length_filters() {
        let mut p = pair("ACGT", "ACGT");
        p.merged = Some(Read::new("r".into(), b"AC".to_vec(), vec![b'I'; 2], 33));
        let chain = FilterChain::new(vec![Filter::MergedRead, Filter::TooShort { min_length: 10 }], PairFilterMode::Any);
        assert_eq!(chain.classify(&p), Disposition::Sink(FilterKind::MergedRead));
    }

    #[test]
    fn no_filter_is_tautological_fallback() {
        let chain = FilterChain::new(vec![], PairFilterMode::Any);
        let p = pair("ACGTACGT", "ACGTACGT");
        assert_eq!(chain.classify(&p), Disposition::Sink(FilterKind::NoFilter));
    }
}
