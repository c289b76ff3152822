//! The ordered modifier chain (spec.md §4.3).
//!
//! Modifiers are tagged variants of one `Modifier` enum rather than trait
//! objects (spec.md §9 design note): the hot loop dispatches on a plain
//! `match` instead of a vtable call, and each variant owns its parameters
//! and its `ModifierStats` accumulator.

use std::collections::BTreeMap;

use crate::adapter::Adapter;
use crate::aligner::Alignment;
use crate::insert_aligner::{align_insert, InsertAlignerParams};
use crate::read::{Read, ReadPair};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mate {
    R1,
    R2,
    /// Apply the same modifier instance independently to both mates.
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Trim,
    Mask,
    Lowercase,
    None,
}

/// Counters incremented on every modifier application (spec.md §4.3 Stats
/// contract): reads affected, bases removed.
#[derive(Debug, Clone, Default)]
pub struct ModifierStats {
    pub reads_affected: u64,
    pub bases_removed: u64,
}

impl ModifierStats {
    fn record(&mut self, bases_removed: usize) {
        if bases_removed > 0 {
            self.reads_affected += 1;
            self.bases_removed += bases_removed as u64;
        }
    }

    pub fn merge(&mut self, other: &ModifierStats) {
        self.reads_affected += other.reads_affected;
        self.bases_removed += other.bases_removed;
    }
}

/// Per-adapter match-length and error-count histograms (spec.md §4.3).
#[derive(Debug, Clone, Default)]
pub struct AdapterStats {
    pub matches: u64,
    pub match_length_hist: BTreeMap<usize, u64>,
    pub error_hist: BTreeMap<u32, u64>,
}

impl AdapterStats {
    fn record(&mut self, aln: &Alignment) {
        self.matches += 1;
        *self.match_length_hist.entry(aln.match_length()).or_insert(0) += 1;
        *self.error_hist.entry(aln.errors).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: &AdapterStats) {
        self.matches += other.matches;
        for (&len, &count) in &other.match_length_hist {
            *self.match_length_hist.entry(len).or_insert(0) += count;
        }
        for (&errs, &count) in &other.error_hist {
            *self.error_hist.entry(errs).or_insert(0) += count;
        }
    }
}

fn apply_action(read: &mut Read, start: usize, stop: usize, action: Action) {
    match action {
        Action::Trim => {
            let len = read.len();
            read.cut(start, len - stop);
        }
        Action::Mask => read.mask(start, stop),
        Action::Lowercase => read.lowercase(start, stop),
        Action::None => {}
    }
}

/// Bit of the BWA/cutadapt quality-trim algorithm, generalized to any
/// quality offset (the teacher's `qual_trim` hardcodes 33). Returns the
/// `(start, stop)` keep-range; `g_as_zero` implements the NextSeq dark-cycle
/// rule of treating a called `G` as quality 0.
fn bwa_quality_trim(seq: &[u8], qual: &[u8], offset: i32, cutoff_front: i32, cutoff_back: i32, g_as_zero: bool) -> (usize, usize) {
    let n = qual.len();
    let q_at = |i: usize| -> i32 {
        if g_as_zero && seq[i].eq_ignore_ascii_case(&b'G') {
            0
        } else {
            qual[i] as i32 - offset
        }
    };

    let mut start = 0usize;
    if cutoff_front > 0 {
        let mut s = 0i32;
        let mut max_qual = 0i32;
        for i in 0..n {
            s += cutoff_front - q_at(i);
            if s < 0 {
                break;
            }
            if s > max_qual {
                max_qual = s;
                start = i + 1;
            }
        }
    }

    let mut stop = n;
    if cutoff_back > 0 {
        let mut s = 0i32;
        let mut max_qual = 0i32;
        for i in (0..n).rev() {
            s += cutoff_back - q_at(i);
            if s < 0 {
                break;
            }
            if s > max_qual {
                max_qual = s;
                stop = i;
            }
        }
    }

    if start >= stop {
        (0, 0)
    } else {
        (start, stop)
    }
}

/// Per-worker duplication of modifiers is a cheap clone (spec.md §9
/// design note); each clone carries its own stats, merged at shutdown.
#[derive(Clone)]
pub enum Modifier {
    UnconditionalCutter {
        mate: Mate,
        lengths: Vec<i64>,
        stats: ModifierStats,
    },
    QualityTrimmer {
        mate: Mate,
        cutoff_front: i32,
        cutoff_back: i32,
        stats: ModifierStats,
    },
    NextseqQualityTrimmer {
        mate: Mate,
        cutoff: i32,
        stats: ModifierStats,
    },
    AdapterCutter {
        mate: Mate,
        adapters: Vec<Adapter>,
        action: Action,
        times: u32,
        stats: ModifierStats,
        /// Match-length/error histograms keyed by adapter name (spec.md
        /// §4.3: "a per-adapter match-length histogram").
        match_stats: BTreeMap<String, AdapterStats>,
    },
    InsertAdapterCutter {
        adapter1: Adapter,
        adapter2: Adapter,
        params: InsertAlignerParams,
        action: Action,
        correct_mismatches: bool,
        stats: ModifierStats,
    },
    NEndTrimmer {
        mate: Mate,
        stats: ModifierStats,
    },
    MinCutter {
        mate: Mate,
        min_front: usize,
        min_back: usize,
        stats: ModifierStats,
    },
    PrefixSuffixAdder {
        mate: Mate,
        prefix: String,
        suffix: String,
    },
    LengthTagModifier {
        mate: Mate,
        tag: String,
    },
    SuffixRemover {
        mate: Mate,
        suffixes: Vec<String>,
    },
    DoubleEncoder {
        mate: Mate,
    },
    ZeroCapper {
        mate: Mate,
    },
    PrimerTrimmer {
        mate: Mate,
        primer: Vec<u8>,
        max_error_rate: f64,
    },
    MergeOverlapping {
        params: InsertAlignerParams,
    },
}

impl Modifier {
    /// Applies this modifier to a pair, routing to one or both mates
    /// according to `mate` for per-read variants, or operating on the whole
    /// pair for inherently pair-level variants (InsertAdapterCutter,
    /// MergeOverlapping).
    pub fn apply_pair(&mut self, pair: &mut ReadPair) {
        match self {
            Modifier::UnconditionalCutter { mate, lengths, stats } => {
                let mate = *mate;
                let lengths = lengths.clone();
                for_mate(mate, pair, |r| unconditional_cut(r, &lengths, stats));
            }
            Modifier::QualityTrimmer { mate, cutoff_front, cutoff_back, stats } => {
                let (mate, cf, cb) = (*mate, *cutoff_front, *cutoff_back);
                for_mate(mate, pair, |r| quality_trim(r, cf, cb, false, stats));
            }
            Modifier::NextseqQualityTrimmer { mate, cutoff, stats } => {
                let (mate, cutoff) = (*mate, *cutoff);
                for_mate(mate, pair, |r| quality_trim(r, 0, cutoff, true, stats));
            }
            Modifier::AdapterCutter { mate, adapters, action, times, stats, match_stats } => {
                let mate = *mate;
                for_mate(mate, pair, |r| adapter_cut(r, adapters, *action, *times, stats, match_stats));
            }
            Modifier::InsertAdapterCutter { adapter1, adapter2, params, action, correct_mismatches, stats } => {
                insert_adapter_cut(pair, adapter1, adapter2, params, *action, *correct_mismatches, stats);
            }
            Modifier::NEndTrimmer { mate, stats } => {
                let mate = *mate;
                for_mate(mate, pair, |r| n_end_trim(r, stats));
            }
            Modifier::MinCutter { mate, min_front, min_back, stats } => {
                let (mate, mf, mb) = (*mate, *min_front, *min_back);
                for_mate(mate, pair, |r| min_cut(r, mf, mb, stats));
            }
            Modifier::PrefixSuffixAdder { mate, prefix, suffix } => {
                let mate = *mate;
                let (prefix, suffix) = (prefix.clone(), suffix.clone());
                for_mate(mate, pair, |r| r.name = format!("{prefix}{}{suffix}", r.name));
            }
            Modifier::LengthTagModifier { mate, tag } => {
                let mate = *mate;
                let tag = tag.clone();
                for_mate(mate, pair, |r| length_tag(r, &tag));
            }
            Modifier::SuffixRemover { mate, suffixes } => {
                let mate = *mate;
                let suffixes = suffixes.clone();
                for_mate(mate, pair, |r| {
                    if let Some(s) = suffixes.iter().find(|s| r.name.ends_with(s.as_str())) {
                        let new_len = r.name.len() - s.len();
                        r.name.truncate(new_len);
                    }
                });
            }
            Modifier::DoubleEncoder { mate } => {
                let mate = *mate;
                for_mate(mate, pair, double_encode);
            }
            Modifier::ZeroCapper { mate } => {
                let mate = *mate;
                for_mate(mate, pair, zero_cap);
            }
            Modifier::PrimerTrimmer { mate, primer, max_error_rate } => {
                let mate = *mate;
                let (primer, rate) = (primer.clone(), *max_error_rate);
                for_mate(mate, pair, |r| primer_trim(r, &primer, rate));
            }
            Modifier::MergeOverlapping { params } => merge_overlapping(pair, params),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Modifier::UnconditionalCutter { .. } => "unconditional_cutter",
            Modifier::QualityTrimmer { .. } => "quality_trimmer",
            Modifier::NextseqQualityTrimmer { .. } => "nextseq_quality_trimmer",
            Modifier::AdapterCutter { .. } => "adapter_cutter",
            Modifier::InsertAdapterCutter { .. } => "insert_adapter_cutter",
            Modifier::NEndTrimmer { .. } => "n_end_trimmer",
            Modifier::MinCutter { .. } => "min_cutter",
            Modifier::PrefixSuffixAdder { .. } => "prefix_suffix_adder",
            Modifier::LengthTagModifier { .. } => "length_tag_modifier",
            Modifier::SuffixRemover { .. } => "suffix_remover",
            Modifier::DoubleEncoder { .. } => "double_encoder",
            Modifier::ZeroCapper { .. } => "zero_capper",
            Modifier::PrimerTrimmer { .. } => "primer_trimmer",
            Modifier::MergeOverlapping { .. } => "merge_overlapping",
        }
    }

    /// Folds this modifier's accumulated counters into `summary` (spec.md
    /// §4.3 Stats contract; §3 Summary "totals per modifier").
    pub fn merge_stats_into(&self, summary: &mut crate::stats::Summary) {
        let name = self.kind_name();
        match self {
            Modifier::UnconditionalCutter { stats, .. }
            | Modifier::QualityTrimmer { stats, .. }
            | Modifier::NextseqQualityTrimmer { stats, .. }
            | Modifier::InsertAdapterCutter { stats, .. }
            | Modifier::NEndTrimmer { stats, .. }
            | Modifier::MinCutter { stats, .. } => {
                summary.modifier_stats_mut(name).merge(stats);
            }
            Modifier::AdapterCutter { stats, match_stats, .. } => {
                summary.modifier_stats_mut(name).merge(stats);
                for (adapter_name, adapter_stats) in match_stats {
                    summary.adapter_stats_mut(adapter_name).merge(adapter_stats);
                }
            }
            Modifier::PrefixSuffixAdder { .. }
            | Modifier::LengthTagModifier { .. }
            | Modifier::SuffixRemover { .. }
            | Modifier::DoubleEncoder { .. }
            | Modifier::ZeroCapper { .. }
            | Modifier::PrimerTrimmer { .. }
            | Modifier::MergeOverlapping { .. } => {}
        }
    }
}

fn for_mate(mate: Mate, pair: &mut ReadPair, mut f: impl FnMut(&mut Read)) {
    match mate {
        Mate::R1 => f(&mut pair.r1),
        Mate::R2 => f(&mut pair.r2),
        Mate::Both => {
            f(&mut pair.r1);
            f(&mut pair.r2);
        }
    }
}

fn unconditional_cut(read: &mut Read, lengths: &[i64], stats: &mut ModifierStats) {
    let before = read.len();
    for &len in lengths {
        if len >= 0 {
            read.cut(len as usize, 0);
        } else {
            read.cut(0, (-len) as usize);
        }
    }
    stats.record(before - read.len());
}

fn quality_trim(read: &mut Read, cutoff_front: i32, cutoff_back: i32, g_as_zero: bool, stats: &mut ModifierStats) {
    if !read.has_qualities() {
        return;
    }
    let before = read.len();
    let offset = read.quality_offset as i32;
    let (start, stop) = bwa_quality_trim(&read.sequence, &read.quality, offset, cutoff_front, cutoff_back, g_as_zero);
    read.cut(start, before - stop);
    stats.record(before - read.len());
}

fn adapter_cut(
    read: &mut Read, adapters: &[Adapter], action: Action, times: u32, stats: &mut ModifierStats,
    match_stats: &mut BTreeMap<String, AdapterStats>,
) {
    let before = read.len();
    for _ in 0..times.max(1) {
        let best = adapters
            .iter()
            .filter_map(|a| a.find_in(read).map(|aln| (a, aln)))
            .max_by_key(|(_, aln)| (aln.matches as i64 - aln.errors as i64, aln.matches));
        match best {
            Some((adapter, aln)) => {
                match_stats.entry(adapter.name.clone()).or_default().record(&aln);
                apply_action(read, aln.rstart, aln.rstop, action);
            }
            None => break,
        }
    }
    stats.record(before - read.len());
}

fn insert_adapter_cut(
    pair: &mut ReadPair, adapter1: &Adapter, adapter2: &Adapter, params: &InsertAlignerParams, action: Action,
    correct_mismatches: bool, stats: &mut ModifierStats,
) {
    let before = pair.r1.len() + pair.r2.len();
    if let Some(m) = align_insert(&pair.r1.sequence, &pair.r2.sequence, &adapter1.sequence, &adapter2.sequence, params) {
        if correct_mismatches && m.mismatches_in_overlap > 0 {
            correct_overlap_mismatches(pair, m.r1_trim_at);
        }
        apply_action(&mut pair.r1, 0, m.r1_trim_at, action);
        apply_action(&mut pair.r2, 0, m.r2_trim_at, action);
    }
    stats.record(before.saturating_sub(pair.r1.len() + pair.r2.len()));
}

/// Replaces each mismatching base pair inside the insert overlap with the
/// higher-quality base, writing the winner back into both mates (spec.md
/// §4.2 step 5: "replace mismatching bases inside the overlap with the
/// higher-quality base"). `overlap_len` is `r1`'s insert length
/// (`InsertMatch::r1_trim_at`); the same consensus rule as
/// `merge_overlapping` below, applied in place instead of building a merged
/// read.
fn correct_overlap_mismatches(pair: &mut ReadPair, overlap_len: usize) {
    let rc2 = crate::alphabet::reverse_complement(&pair.r2.sequence);
    let rc2_qual: Vec<u8> = pair.r2.quality.iter().rev().copied().collect();
    let has_qual = pair.r1.has_qualities() && pair.r2.has_qualities();
    let len = overlap_len.min(pair.r1.sequence.len()).min(rc2.len());
    let r2_len = pair.r2.sequence.len();

    for i in 0..len {
        let b1 = pair.r1.sequence[i];
        let b2 = rc2[i];
        if b1.eq_ignore_ascii_case(&b2) {
            continue;
        }
        let (winner, winner_qual) = if !has_qual || pair.r1.quality[i] >= rc2_qual[i] {
            (b1, *pair.r1.quality.get(i).unwrap_or(&0))
        } else {
            (b2, rc2_qual[i])
        };
        pair.r1.sequence[i] = winner;
        if has_qual {
            pair.r1.quality[i] = winner_qual;
        }
        let r2_pos = r2_len - 1 - i;
        pair.r2.sequence[r2_pos] = crate::alphabet::complement_base(winner);
        if has_qual {
            pair.r2.quality[r2_pos] = winner_qual;
        }
    }
}

fn n_end_trim(read: &mut Read, stats: &mut ModifierStats) {
    let before = read.len();
    let start = read.sequence.iter().position(|&b| b != b'N').unwrap_or(0);
    let stop = read.sequence.iter().rposition(|&b| b != b'N').map(|p| p + 1).unwrap_or(0);
    if start >= stop {
        read.cut(0, before);
    } else {
        read.cut(start, before - stop);
    }
    stats.record(before - read.len());
}

/// Ensures at least `min_front`/`min_back` bases have been removed from each
/// end, cutting the shortfall if prior modifiers removed less (spec.md
/// §4.3 MinCutter; bisulfite presets configure this as a lower bound rather
/// than an exact cut).
fn min_cut(read: &mut Read, min_front: usize, min_back: usize, stats: &mut ModifierStats) {
    let before = read.len();
    let need_front = min_front.saturating_sub(read.trimmed_prefix_len);
    let need_back = min_back.saturating_sub(read.trimmed_suffix_len);
    if need_front > 0 || need_back > 0 {
        read.cut(need_front, need_back);
    }
    stats.record(before - read.len());
}

fn length_tag(read: &mut Read, tag: &str) {
    let marker = format!("{tag}=");
    let new_len = read.len();
    if let Some(pos) = read.name.find(&marker) {
        let digits_start = pos + marker.len();
        let digits_end = read.name[digits_start..]
            .find(|c: char| !c.is_ascii_digit())
            .map(|o| digits_start + o)
            .unwrap_or(read.name.len());
        read.name.replace_range(digits_start..digits_end, &new_len.to_string());
    } else {
        if !read.name.is_empty() {
            read.name.push(' ');
        }
        read.name.push_str(&format!("{marker}{new_len}"));
    }
}

/// SOLiD double-encoding: each base is paired with the preceding base to
/// form a color call, which is then re-expressed as the nucleotide alphabet
/// so downstream FASTQ-oriented tools can still consume it (spec.md
/// Non-goals scope full colorspace support out; this is the minimal
/// transform needed to note where it slots into the chain).
const DOUBLE_ENCODE_TABLE: [[u8; 4]; 4] = [
    [b'A', b'C', b'G', b'T'],
    [b'C', b'A', b'T', b'G'],
    [b'G', b'T', b'A', b'C'],
    [b'T', b'G', b'C', b'A'],
];

fn base_rank(b: u8) -> Option<usize> {
    match b.to_ascii_uppercase() {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None,
    }
}

fn double_encode(read: &mut Read) {
    if read.sequence.is_empty() {
        return;
    }
    let mut prev = read.sequence[0];
    for b in &mut read.sequence[1..] {
        let encoded = match (base_rank(prev), base_rank(*b)) {
            (Some(p), Some(c)) => DOUBLE_ENCODE_TABLE[p][c],
            _ => b'N',
        };
        let next_prev = *b;
        *b = encoded;
        prev = next_prev;
    }
}

fn zero_cap(read: &mut Read) {
    if !read.has_qualities() {
        return;
    }
    let floor = read.quality_offset;
    for q in &mut read.quality {
        if *q < floor {
            *q = floor;
        }
    }
}

fn primer_trim(read: &mut Read, primer: &[u8], max_error_rate: f64) {
    if primer.is_empty() || read.len() < primer.len() {
        return;
    }
    let max_errors = (max_error_rate * primer.len() as f64).floor() as usize;
    let mismatches = primer
        .iter()
        .zip(&read.sequence[..primer.len()])
        .filter(|(a, b)| !a.eq_ignore_ascii_case(b))
        .count();
    if mismatches <= max_errors {
        read.cut(primer.len(), 0);
    }
}

/// Merges overlapping mates into a single consensus read using the insert
/// aligner's overlap detection (spec.md §4.3 MergeOverlapping). The
/// higher-quality base wins at each mismatching overlap position.
fn merge_overlapping(pair: &mut ReadPair, params: &InsertAlignerParams) {
    let no_adapter: &[u8] = b"";
    let m = match align_insert(&pair.r1.sequence, &pair.r2.sequence, no_adapter, no_adapter, params) {
        Some(m) => m,
        None => return,
    };
    let rc2 = crate::alphabet::reverse_complement(&pair.r2.sequence);
    let rc2_qual: Vec<u8> = pair.r2.quality.iter().rev().copied().collect();

    let insert_len = m.r1_trim_at.max(rc2.len());
    let mut merged_seq = Vec::with_capacity(insert_len);
    let mut merged_qual = Vec::with_capacity(insert_len);
    let has_qual = pair.r1.has_qualities() && pair.r2.has_qualities();

    for i in 0..insert_len {
        let from_r1 = pair.r1.sequence.get(i).copied();
        let from_r2 = rc2.get(i).copied();
        let (base, qual) = match (from_r1, from_r2) {
            (Some(b1), Some(b2)) => {
                if !has_qual || pair.r1.quality[i] >= rc2_qual[i] {
                    (b1, *pair.r1.quality.get(i).unwrap_or(&0))
                } else {
                    (b2, rc2_qual[i])
                }
            }
            (Some(b1), None) => (b1, *pair.r1.quality.get(i).unwrap_or(&0)),
            (None, Some(b2)) => (b2, *rc2_qual.get(i).unwrap_or(&0)),
            (None, None) => break,
        };
        merged_seq.push(base);
        if has_qual {
            merged_qual.push(qual);
        }
    }

    let offset = pair.r1.quality_offset;
    pair.merged = Some(Read::new(pair.r1.name.clone(), merged_seq, merged_qual, offset));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aligner::{AlignerParams, Where};

    fn read(name: &str, seq: &str, qual: &str) -> Read {
        Read::new(name.into(), seq.as_bytes().to_vec(), qual.as_bytes().to_vec(), 33)
    }

    #[test]
    fn unconditional_cutter_trims_front_and_back() {
        let mut r = read("r", "AAGGGGCC", "IIIIIIII");
        let mut stats = ModifierStats::default();
        unconditional_cut(&mut r, &[2, -2], &mut stats);
        assert_eq!(r.sequence, b"GGGG");
        assert_eq!(stats.bases_removed, 4);
    }

    #[test]
    fn quality_trim_removes_trailing_low_quality() {
        // offset 33, cutoff 20: trailing '!' bytes decode to quality 0.
        let mut r = read("r", "GGGGGGGGGG", "IIIIIIII!!");
        let mut stats = ModifierStats::default();
        quality_trim(&mut r, 0, 20, false, &mut stats);
        assert_eq!(r.sequence, b"GGGGGGGG");
    }

    #[test]
    fn nextseq_trim_treats_g_as_zero_quality() {
        let mut r = read("r", "AAAAAAAAGG", "IIIIIIIIII");
        let mut stats = ModifierStats::default();
        quality_trim(&mut r, 0, 20, true, &mut stats);
        assert_eq!(r.sequence, b"AAAAAAAA");
    }

    #[test]
    fn adapter_cutter_trims_matched_adapter_and_records_stats() {
        let a = Adapter::new("a1", b"ACGT".to_vec(), Where::Back, AlignerParams { min_overlap: 3, ..Default::default() });
        let mut r = read("r", "GGGGACGT", "IIIIIIII");
        let mut stats = ModifierStats::default();
        let mut match_stats = BTreeMap::new();
        adapter_cut(&mut r, &[a], Action::Trim, 1, &mut stats, &mut match_stats);
        assert_eq!(r.sequence, b"GGGG");
        assert_eq!(match_stats["a1"].matches, 1);
    }

    #[test]
    fn n_end_trimmer_strips_leading_and_trailing_n_runs() {
        let mut r = read("r", "NNACGTNN", "IIIIIIII");
        let mut stats = ModifierStats::default();
        n_end_trim(&mut r, &mut stats);
        assert_eq!(r.sequence, b"ACGT");
    }

    #[test]
    fn min_cutter_enforces_lower_bound_regardless_of_prior_trims() {
        let mut r = read("r", "AACCGGTT", "IIIIIIII");
        r.trimmed_prefix_len = 1; // already cut 1 base from the front
        let mut stats = ModifierStats::default();
        min_cut(&mut r, 2, 0, &mut stats);
        assert_eq!(r.sequence, b"CCGGTT");
    }

    #[test]
    fn length_tag_reflects_current_read_length() {
        let mut r = read("r length=100", "ACGT", "IIII");
        length_tag(&mut r, "length");
        assert_eq!(r.name, "r length=4");
    }

    #[test]
    fn suffix_remover_strips_configured_suffix() {
        let mut pair = ReadPair::new(read("r/1", "ACGT", "IIII"), read("r/2", "ACGT", "IIII"));
        let mut m = Modifier::SuffixRemover { mate: Mate::Both, suffixes: vec!["/1".into(), "/2".into()] };
        m.apply_pair(&mut pair);
        assert_eq!(pair.r1.name, "r");
        assert_eq!(pair.r2.name, "r");
    }

    #[test]
    fn merge_overlapping_builds_consensus_read() {
        let insert = b"AAAACCCCGGGG";
        let rc = crate::alphabet::reverse_complement(insert);
        let mut pair = ReadPair::new(
            Read::new("r".into(), insert.to_vec(), vec![b'I'; insert.len()], 33),
            Read::new("r".into(), rc, vec![b'I'; insert.len()], 33),
        );
        let params = InsertAlignerParams {
            min_overlap: 6,
            max_insert_mismatch_frac: 0.2,
            max_adapter_mismatch_frac: 0.3,
            insert_max_rmp: None,
        };
        merge_overlapping(&mut pair, &params);
        assert!(pair.merged.is_some());
        assert_eq!(pair.merged.unwrap().sequence, insert.to_vec());
    }

    #[test]
    fn correct_overlap_mismatches_writes_higher_quality_base_into_both_mates() {
        // r1 and r2 overlap with one mismatching position (index 2 in r1's
        // coordinates); r2's base there carries the lower quality, so r1's
        // base should win and get written back into r2 (complemented).
        let mut pair = ReadPair::new(
            Read::new("r".into(), b"AAAACCCC".to_vec(), b"IIIIIIII".to_vec(), 33),
            Read::new("r".into(), b"GGGGTATT".to_vec(), b"IIIII!II".to_vec(), 33),
        );
        correct_overlap_mismatches(&mut pair, 8);
        assert_eq!(pair.r1.sequence[2], b'A');
        assert_eq!(pair.r2.sequence[5], b'T');
    }

    #[test]
    fn insert_adapter_cutter_applies_correction_before_trimming() {
        let insert = b"AAAACCCCGGGG";
        let rc = crate::alphabet::reverse_complement(insert);
        let mut pair = ReadPair::new(
            Read::new("r".into(), insert.to_vec(), vec![b'I'; insert.len()], 33),
            Read::new("r".into(), rc, vec![b'I'; insert.len()], 33),
        );
        // Introduce a mismatch at r1 position 3.
        pair.r1.sequence[3] = b'T';
        let adapter1 = Adapter::new("a1", b"".to_vec(), Where::Back, AlignerParams::default());
        let adapter2 = Adapter::new("a2", b"".to_vec(), Where::Back, AlignerParams::default());
        let params = InsertAlignerParams {
            min_overlap: 6,
            max_insert_mismatch_frac: 0.3,
            max_adapter_mismatch_frac: 0.3,
            insert_max_rmp: None,
        };
        let mut stats = ModifierStats::default();
        insert_adapter_cut(&mut pair, &adapter1, &adapter2, &params, Action::None, true, &mut stats);
        // Correction runs before the (no-op) trim action; r1's mismatching
        // base is the higher-quality one (ties favor r1) so it is kept.
        assert_eq!(pair.r1.sequence[3], b'T');
        let corrected_r2 = crate::alphabet::reverse_complement(&pair.r2.sequence);
        assert_eq!(corrected_r2[3], b'T');
    }
}
