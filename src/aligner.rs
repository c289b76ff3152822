//! The bounded-error semi-global aligner (spec.md §4.1).
//!
//! Locates an adapter of length `m` within a read of length `n` subject to
//! a placement policy (`Where`) that decides which of the four DP-matrix
//! corners are "free" (unpenalized) versus anchored. `FRONT` is implemented
//! by reversing both sequences and delegating to the `BACK` matrix, which
//! halves the amount of free-edge bookkeeping that needs testing.

use crate::alphabet::mismatch_cost;
use crate::rmp::MatchProbability;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Where {
    Front,
    Back,
    Anywhere,
    Prefix,
    Suffix,
}

/// A single matched region (spec.md §3 AdapterMatch, aligner-only fields).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alignment {
    pub astart: usize,
    pub astop: usize,
    pub rstart: usize,
    pub rstop: usize,
    pub matches: u32,
    pub errors: u32,
}

impl Alignment {
    #[inline]
    pub fn match_length(&self) -> usize {
        self.rstop - self.rstart
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AlignerParams {
    pub max_error_rate: f64,
    pub min_overlap: usize,
    pub indels_allowed: bool,
    pub indel_cost: u32,
    pub read_wildcards: bool,
    pub adapter_wildcards: bool,
    pub max_rmp: Option<f64>,
}

impl Default for AlignerParams {
    fn default() -> Self {
        AlignerParams {
            max_error_rate: 0.1,
            min_overlap: 3,
            indels_allowed: true,
            indel_cost: 1,
            read_wildcards: false,
            adapter_wildcards: false,
            max_rmp: None,
        }
    }
}

/// Four corners of the DP matrix that may be "free" (zero-cost) rather than
/// requiring the alignment to reach that boundary.
#[derive(Debug, Clone, Copy)]
struct FreeEnds {
    start_read: bool,
    start_adapter: bool,
    end_read: bool,
    end_adapter: bool,
}

const BACK_ENDS: FreeEnds = FreeEnds {
    start_read: true,
    start_adapter: false,
    end_read: true,
    end_adapter: true,
};

const ANYWHERE_ENDS: FreeEnds = FreeEnds {
    start_read: true,
    start_adapter: true,
    end_read: true,
    end_adapter: true,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dir {
    Diag,
    Up,   // extra read base (gap in adapter)
    Left, // extra adapter base (gap in read)
}

/// Runs the generic free-ends edit-distance DP of `adapter` against `read`
/// and returns the best-scoring alignment satisfying `min_overlap` and
/// `max_error_rate`, or `None`.
fn align_dp(adapter: &[u8], read: &[u8], ends: FreeEnds, params: &AlignerParams) -> Option<Alignment> {
    let n = read.len();
    let m = adapter.len();
    if m == 0 {
        return None;
    }
    let indel_cost = params.indel_cost;

    // dp[i][j]: min edit cost aligning read[0..i] against adapter[0..j]
    // under the free-start conventions below. dir[i][j] records the
    // traceback choice taken to reach (i, j).
    let mut dp = vec![vec![0u32; m + 1]; n + 1];
    let mut dir = vec![vec![Dir::Diag; m + 1]; n + 1];

    for i in 0..=n {
        dp[i][0] = if ends.start_read { 0 } else { i as u32 * indel_cost };
    }
    for j in 0..=m {
        dp[0][j] = if ends.start_adapter { 0 } else { j as u32 * indel_cost };
    }

    for i in 1..=n {
        for j in 1..=m {
            let sub_cost = mismatch_cost(read[i - 1], adapter[j - 1], params.read_wildcards, params.adapter_wildcards) as u32;
            let diag = dp[i - 1][j - 1] + sub_cost;
            let up = dp[i - 1][j].saturating_add(indel_cost); // consumed a read base, not an adapter base
            let left = dp[i][j - 1].saturating_add(indel_cost); // consumed an adapter base, not a read base

            let (best, d) = if diag <= up && diag <= left {
                (diag, Dir::Diag)
            } else if up <= left {
                (up, Dir::Up)
            } else {
                (left, Dir::Left)
            };
            dp[i][j] = best;
            dir[i][j] = d;
        }
    }

    // Backtraces `(end_i, end_j)` into a full `Alignment`, or `None` if the
    // resulting matched region is empty.
    let backtrace = |end_i: usize, end_j: usize| -> Option<Alignment> {
        let errors = dp[end_i][end_j];
        let (mut i, mut j) = (end_i, end_j);
        while i > 0 && j > 0 {
            match dir[i][j] {
                Dir::Diag => {
                    i -= 1;
                    j -= 1;
                }
                Dir::Up => i -= 1,
                Dir::Left => j -= 1,
            }
            if (j == 0 && ends.start_read) || (i == 0 && ends.start_adapter) {
                break;
            }
        }
        let (rstart, astart) = (i, j);
        let (rstop, astop) = (end_i, end_j);
        let match_len = rstop.saturating_sub(rstart);
        if match_len == 0 {
            return None;
        }
        Some(Alignment {
            astart,
            astop,
            rstart,
            rstop,
            matches: (match_len as u32).saturating_sub(errors),
            errors,
        })
    };

    // Candidate end cells: last row (read fully consumed, adapter maybe
    // not) when `end_adapter` is free, and last column (adapter fully
    // consumed, read maybe not) when `end_read` is free. A cell can be a
    // member of both sets when i == n and j == m simultaneously.
    let mut best: Option<Alignment> = None;
    let mut consider = |i: usize, j: usize| {
        let Some(cand) = backtrace(i, j) else { return };
        let keep = match &best {
            None => true,
            Some(b) => {
                let cand_score = cand.matches as i64 - cand.errors as i64;
                let best_score = b.matches as i64 - b.errors as i64;
                cand_score > best_score
                    || (cand_score == best_score && cand.matches > b.matches)
                    || (cand_score == best_score && cand.matches == b.matches && cand.rstart < b.rstart)
            }
        };
        if keep {
            best = Some(cand);
        }
    };

    if ends.end_adapter {
        for j in 0..=m {
            consider(n, j);
        }
    }
    if ends.end_read {
        for i in 0..=n {
            consider(i, m);
        }
    }
    if !ends.end_adapter && !ends.end_read {
        consider(n, m);
    }

    best
}

fn passes_constraints(aln: &Alignment, adapter_len: usize, params: &AlignerParams, mp: &MatchProbability) -> bool {
    let l = aln.match_length();
    let min_overlap = params.min_overlap.min(adapter_len);
    if l < min_overlap {
        return false;
    }
    let max_errors = (params.max_error_rate * l as f64).floor() as u32;
    if aln.errors > max_errors {
        return false;
    }
    if let Some(max_rmp) = params.max_rmp {
        if mp.rmp(l as u32, aln.matches) > max_rmp {
            return false;
        }
    }
    true
}

/// Hamming-only sliding comparison, used when indels are disallowed (either
/// by request or because `where` is `Prefix`/`Suffix`, spec.md §8 boundary
/// behavior: "indels silently disabled").
fn align_hamming(adapter: &[u8], read: &[u8], where_: Where, params: &AlignerParams) -> Option<Alignment> {
    if where_ == Where::Front {
        // Mirror of BACK: reverse both sequences, slide as BACK, flip
        // coordinates back. Keeps the offset bookkeeping in one place.
        let rev_read: Vec<u8> = read.iter().rev().copied().collect();
        let rev_adapter: Vec<u8> = adapter.iter().rev().copied().collect();
        return align_hamming(&rev_adapter, &rev_read, Where::Back, params).map(|a| Alignment {
            astart: adapter.len() - a.astop,
            astop: adapter.len() - a.astart,
            rstart: read.len() - a.rstop,
            rstop: read.len() - a.rstart,
            matches: a.matches,
            errors: a.errors,
        });
    }

    let n = read.len() as isize;
    let m = adapter.len() as isize;
    if m == 0 {
        return None;
    }

    // offset: position in the read where adapter[0] would align (may be
    // negative for ANYWHERE when the adapter's prefix precedes the read's
    // start).
    let (lo, hi) = match where_ {
        Where::Back => (0, n), // adapter start anywhere within/after read start
        Where::Anywhere => (-(m - 1), n - 1),
        Where::Prefix => (0, 0),
        Where::Suffix => (n - m, n - m),
        Where::Front => unreachable!("handled above"),
    };

    let mut best: Option<Alignment> = None;
    let mut offset = lo;
    while offset <= hi {
        let astart = (-offset).max(0) as usize;
        let rstart = offset.max(0) as usize;
        let overlap = (m - astart as isize).min(n - rstart as isize);
        if overlap <= 0 {
            offset += 1;
            continue;
        }
        let overlap = overlap as usize;
        let mut errors = 0u32;
        for k in 0..overlap {
            errors += mismatch_cost(
                read[rstart + k],
                adapter[astart + k],
                params.read_wildcards,
                params.adapter_wildcards,
            ) as u32;
        }
        let matches = overlap as u32 - errors;
        let cand = Alignment {
            astart,
            astop: astart + overlap,
            rstart,
            rstop: rstart + overlap,
            matches,
            errors,
        };
        let keep = match &best {
            None => true,
            Some(b) => {
                let cand_score = cand.matches as i64 - cand.errors as i64;
                let best_score = b.matches as i64 - b.errors as i64;
                cand_score > best_score
                    || (cand_score == best_score && cand.matches > b.matches)
                    || (cand_score == best_score && cand.matches == b.matches && cand.rstart < b.rstart)
            }
        };
        if keep {
            best = Some(cand);
        }
        offset += 1;
    }
    best
}

/// Aligns `adapter` against `read` under the given placement and returns the
/// best match satisfying `min_overlap`, `max_error_rate`, and (if set)
/// `max_rmp`, or `None` if no alignment qualifies.
pub fn align(adapter: &[u8], read: &[u8], where_: Where, params: &AlignerParams) -> Option<Alignment> {
    let mp = MatchProbability::new(params.read_wildcards, params.adapter_wildcards);

    let use_indels = params.indels_allowed && !matches!(where_, Where::Prefix | Where::Suffix);
    let raw = if !use_indels {
        align_hamming(adapter, read, where_, params)
    } else {
        match where_ {
            Where::Back => align_dp(adapter, read, BACK_ENDS, params),
            Where::Anywhere => align_dp(adapter, read, ANYWHERE_ENDS, params),
            Where::Front => {
                let rev_read: Vec<u8> = read.iter().rev().copied().collect();
                let rev_adapter: Vec<u8> = adapter.iter().rev().copied().collect();
                align_dp(&rev_adapter, &rev_read, BACK_ENDS, params).map(|a| Alignment {
                    astart: adapter.len() - a.astop,
                    astop: adapter.len() - a.astart,
                    rstart: read.len() - a.rstop,
                    rstop: read.len() - a.rstart,
                    matches: a.matches,
                    errors: a.errors,
                })
            }
            Where::Prefix | Where::Suffix => unreachable!("handled by hamming path"),
        }
    };

    raw.filter(|aln| passes_constraints(aln, adapter.len(), params, &mp))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(max_error_rate: f64, min_overlap: usize, indels: bool) -> AlignerParams {
        AlignerParams {
            max_error_rate,
            min_overlap,
            indels_allowed: indels,
            indel_cost: 1,
            read_wildcards: false,
            adapter_wildcards: false,
            max_rmp: None,
        }
    }

    #[test]
    fn exact_3prime_trim() {
        let read = b"GGGGACGT";
        let adapter = b"ACGT";
        let m = align(adapter, read, Where::Back, &p(0.1, 3, true)).unwrap();
        assert_eq!(m.rstart, 4);
        assert_eq!(m.rstop, 8);
        assert_eq!(m.astart, 0);
        assert_eq!(m.astop, 4);
        assert_eq!(m.matches, 4);
        assert_eq!(m.errors, 0);
    }

    #[test]
    fn one_mismatch_3prime_trim() {
        let read = b"GGGGACAT";
        let adapter = b"ACGT";
        let m = align(adapter, read, Where::Back, &p(0.25, 3, true)).unwrap();
        assert_eq!(m.rstart, 4);
        assert_eq!(m.errors, 1);
        assert_eq!(m.matches, 3);
    }

    #[test]
    fn below_min_overlap_rejected() {
        let read = b"GGGGACG";
        let adapter = b"ACGTACGT";
        assert!(align(adapter, read, Where::Back, &p(0.1, 5, true)).is_none());
    }

    #[test]
    fn max_error_rate_zero_requires_exact() {
        let read = b"GGGGACAT";
        let adapter = b"ACGT";
        assert!(align(adapter, read, Where::Back, &p(0.0, 3, true)).is_none());
        let read2 = b"GGGGACGT";
        assert!(align(adapter, read2, Where::Back, &p(0.0, 3, true)).is_some());
    }

    #[test]
    fn front_adapter_trims_5prime() {
        let read = b"ACGTGGGG";
        let adapter = b"ACGT";
        let m = align(adapter, read, Where::Front, &p(0.1, 3, true)).unwrap();
        assert_eq!(m.rstart, 0);
        assert_eq!(m.rstop, 4);
        assert_eq!(m.errors, 0);
    }

    #[test]
    fn anywhere_finds_interior_match() {
        let read = b"TTTTACGTTTTT";
        let adapter = b"ACGT";
        let m = align(adapter, read, Where::Anywhere, &p(0.1, 3, true)).unwrap();
        assert_eq!(&read[m.rstart..m.rstop], b"ACGT");
    }

    #[test]
    fn prefix_disables_indels_and_anchors_at_start() {
        let read = b"ACGAGGGG";
        let adapter = b"ACGT";
        let m = align(adapter, read, Where::Prefix, &p(0.5, 3, true)).unwrap();
        assert_eq!(m.rstart, 0);
        assert_eq!(m.astart, 0);
        assert_eq!(m.errors, 1);
    }

    #[test]
    fn suffix_anchors_at_end() {
        let read = b"GGGGACGA";
        let adapter = b"ACGT";
        let m = align(adapter, read, Where::Suffix, &p(0.5, 3, true)).unwrap();
        assert_eq!(m.rstop, 8);
        assert_eq!(m.astop, 4);
    }

    #[test]
    fn empty_read_never_matches() {
        assert!(align(b"ACGT", b"", Where::Back, &p(0.5, 1, true)).is_none());
    }

    #[test]
    fn min_overlap_equal_adapter_len_requires_full_length() {
        let params = p(0.5, 4, true);
        assert!(align(b"ACGT", b"GGGACG", Where::Back, &params).is_none());
        assert!(align(b"ACGT", b"GGGACGT", Where::Back, &params).is_some());
    }

    #[test]
    fn determinism() {
        let read = b"GGGGACATGGTT";
        let adapter = b"ACGTACGT";
        let a = align(adapter, read, Where::Back, &p(0.3, 3, true));
        let b = align(adapter, read, Where::Back, &p(0.3, 3, true));
        assert_eq!(a, b);
    }

    #[test]
    fn indels_never_perform_worse_than_hamming_only() {
        // Two bases inserted inside the adapter occurrence: a single fixed
        // offset (Hamming) cannot absorb both, but the edit-distance DP can.
        let read = b"GGGGAXXCGT";
        let adapter = b"ACGT";
        let with_indels = align(adapter, read, Where::Back, &p(0.5, 3, true));
        let without_indels = align(adapter, read, Where::Back, &p(0.5, 3, false));
        let errs_with = with_indels.map(|a| a.errors).unwrap_or(u32::MAX);
        let errs_without = without_indels.map(|a| a.errors).unwrap_or(u32::MAX);
        assert!(errs_with <= errs_without);
    }
}
