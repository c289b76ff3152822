//! Paired-mate overlap (insert) alignment (spec.md §4.2).
//!
//! Detects adapter contamination by aligning `r1` against
//! `reverse_complement(r2)` directly: when the two mates overlap beyond the
//! biological insert, the overhangs expose the adapters without relying on
//! a tiny trailing adapter fragment being independently alignable.

use crate::alphabet::{mismatch_cost, reverse_complement};
use crate::rmp::MatchProbability;

#[derive(Debug, Clone, Copy)]
pub struct InsertAlignerParams {
    pub min_overlap: usize,
    pub max_insert_mismatch_frac: f64,
    pub max_adapter_mismatch_frac: f64,
    pub insert_max_rmp: Option<f64>,
}

/// Trim positions to apply to each mate, plus whether to correct
/// mismatching bases inside the overlap (spec.md §4.2 step 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertMatch {
    pub r1_trim_at: usize,
    pub r2_trim_at: usize,
    pub overlap_len: usize,
    pub mismatches_in_overlap: u32,
}

/// Counts matches/mismatches between `r1` and `rc2` at a given offset `o`
/// (spec.md §4.2 step 2). `o` is r1's coordinate where `rc2[0]` aligns;
/// negative offsets mean `rc2` starts before `r1`.
fn overlap_stats(r1: &[u8], rc2: &[u8], o: isize, mp_check: bool) -> (usize, u32, u32) {
    let n1 = r1.len() as isize;
    let n2 = rc2.len() as isize;
    let lo = o.max(0);
    let hi = (o + n2).min(n1);
    if hi <= lo {
        return (0, 0, 0);
    }
    let len = (hi - lo) as usize;
    let mut mismatches = 0u32;
    for i in lo..hi {
        let a = r1[i as usize];
        let b = rc2[(i - o) as usize];
        if mismatch_cost(a, b, mp_check, mp_check) != 0 {
            mismatches += 1;
        }
    }
    (len, len as u32 - mismatches, mismatches)
}

/// Finds the best overlap offset between `r1` and `r2`'s reverse complement,
/// then validates the putative adapter overhangs against the declared
/// adapters. Returns `None` if no offset satisfies the mismatch fraction and
/// minimum-overlap constraints, or if the overhangs fail adapter
/// validation.
pub fn align_insert(
    r1: &[u8], r2: &[u8], adapter1: &[u8], adapter2: &[u8], params: &InsertAlignerParams,
) -> Option<InsertMatch> {
    let rc2 = reverse_complement(r2);
    let n1 = r1.len() as isize;
    let n2 = rc2.len() as isize;
    if n1 == 0 || n2 == 0 {
        return None;
    }

    let mp = MatchProbability::new(false, false);
    let mut best: Option<(isize, usize, u32)> = None; // (offset, len, mismatches)

    for o in -(n1 - 1)..n2 {
        let (len, matches, mismatches) = overlap_stats(r1, &rc2, o, false);
        if len < params.min_overlap {
            continue;
        }
        let frac = mismatches as f64 / len as f64;
        if frac > params.max_insert_mismatch_frac {
            continue;
        }
        if let Some(max_rmp) = params.insert_max_rmp {
            if mp.rmp(len as u32, matches) > max_rmp {
                continue;
            }
        }
        // Score is matches minus mismatches; ties broken by longer overlap,
        // then by the offset closest to zero (spec.md §4.2 step 3).
        let score = matches as i64 - mismatches as i64;
        let keep = match &best {
            None => true,
            Some((bo, blen, bmis)) => {
                let best_matches = *blen as u32 - *bmis;
                let best_score = best_matches as i64 - *bmis as i64;
                score > best_score
                    || (score == best_score && len > *blen)
                    || (score == best_score && len == *blen && o.abs() < bo.abs())
            }
        };
        if keep {
            best = Some((o, len, mismatches));
        }
    }

    let (offset, overlap_len, mismatches_in_overlap) = best?;

    // Overhang of r1 beyond the overlap is the putative A1 adapter region;
    // symmetric for r2, whose overhang sits at the *start* of rc2 i.e. the
    // end of r2 in its own coordinates (spec.md §4.2 step 4).
    let r1_trim_at = (offset + n2).clamp(0, n1) as usize;
    let r2_overhang_in_rc = (-offset).clamp(0, n2) as usize;
    let r2_overhang_len = r2_overhang_in_rc.min(r2.len());
    let r2_trim_at = r2.len() - r2_overhang_len;

    if !validate_overhang(r1, r1_trim_at, adapter1, params.max_adapter_mismatch_frac)
        || !validate_overhang_rc(r2, r2_overhang_len, adapter2, params.max_adapter_mismatch_frac)
    {
        return None;
    }

    Some(InsertMatch {
        r1_trim_at,
        r2_trim_at,
        overlap_len,
        mismatches_in_overlap,
    })
}

/// Validates that `read[trim_at..]` (the overhang beyond the insert) is
/// consistent with `adapter` up to `max_frac` mismatches, or is too short to
/// meaningfully contain adapter sequence at all (spec.md §4.2 step 5).
fn validate_overhang(read: &[u8], trim_at: usize, adapter: &[u8], max_frac: f64) -> bool {
    let overhang = &read[trim_at.min(read.len())..];
    if overhang.is_empty() {
        return true;
    }
    let len = overhang.len().min(adapter.len());
    if len == 0 {
        return true;
    }
    let mismatches = (0..len).filter(|&i| mismatch_cost(overhang[i], adapter[i], false, false) != 0).count();
    (mismatches as f64 / len as f64) <= max_frac
}

fn validate_overhang_rc(read: &[u8], overhang_len: usize, adapter: &[u8], max_frac: f64) -> bool {
    let trim_at = read.len().saturating_sub(overhang_len);
    validate_overhang(read, trim_at, adapter, max_frac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::reverse_complement;

    #[test]
    fn paired_insert_trims_both_mates_to_insert() {
        let insert = b"AAAATTTT";
        let r1: Vec<u8> = insert.iter().copied().chain(b"ACCC".iter().copied()).collect();
        let insert_rc = reverse_complement(insert);
        let r2: Vec<u8> = insert_rc.iter().copied().chain(b"GGGA".iter().copied()).collect();

        let adapter1 = b"ACCC";
        let adapter2 = b"GGGA";
        let params = InsertAlignerParams {
            min_overlap: 4,
            max_insert_mismatch_frac: 0.2,
            max_adapter_mismatch_frac: 0.3,
            insert_max_rmp: None,
        };
        let m = align_insert(&r1, &r2, adapter1, adapter2, &params).unwrap();
        assert_eq!(m.r1_trim_at, insert.len());
        assert_eq!(m.r2_trim_at, insert.len());
    }

    #[test]
    fn no_overlap_below_min_is_rejected() {
        let r1 = b"AAAAAAAAAAAAAAAAAAAA";
        let r2 = b"TTTTTTTTTTTTTTTTTTTT";
        let params = InsertAlignerParams {
            min_overlap: 30,
            max_insert_mismatch_frac: 0.1,
            max_adapter_mismatch_frac: 0.3,
            insert_max_rmp: None,
        };
        assert!(align_insert(r1, r2, b"ACGT", b"ACGT", &params).is_none());
    }
}
