//! Random-match-probability (RMP) calculator (spec.md §4.1, §GLOSSARY).
//!
//! `P(L, k) = sum_{i=k..=L} C(L,i) * p^i * (1-p)^(L-i)`, the probability
//! that at least `k` of `L` independently drawn bases match by chance. Pure
//! function of its inputs, so it is safely shared across worker threads
//! without synchronization (spec.md §5).

/// Natural log of `n!` via the Stirling-free direct sum of `ln(i)`. `L`
/// here never exceeds a read length (at most a few hundred to a few
/// thousand bases), so the naive loop is fast enough and avoids pulling in
/// a gamma-function crate for a handful of calls per adapter match.
fn ln_factorial(n: u64) -> f64 {
    (1..=n).map(|i| (i as f64).ln()).sum()
}

fn ln_choose(n: u64, k: u64) -> f64 {
    if k > n {
        return f64::NEG_INFINITY;
    }
    ln_factorial(n) - ln_factorial(k) - ln_factorial(n - k)
}

/// Computes `P(L, k)` for the tail probability of `k` or more matches out
/// of `L` trials at per-base match probability `p`.
pub fn tail_probability(length: u32, min_matches: u32, p_match: f64) -> f64 {
    if length == 0 {
        return if min_matches == 0 { 1.0 } else { 0.0 };
    }
    if min_matches == 0 {
        return 1.0;
    }
    let l = length as u64;
    let k0 = min_matches as u64;
    let q = 1.0 - p_match;
    (k0..=l)
        .map(|i| {
            let ln_term = ln_choose(l, i) + (i as f64) * p_match.ln().max(f64::MIN) + ((l - i) as f64) * q.ln().max(f64::MIN);
            ln_term.exp()
        })
        .sum::<f64>()
        .min(1.0)
}

/// A referentially-transparent wrapper binding the wildcard policy's
/// per-base match probability, so call sites don't recompute it per match.
#[derive(Debug, Clone, Copy)]
pub struct MatchProbability {
    p_match: f64,
}

impl MatchProbability {
    pub fn new(read_wildcards: bool, adapter_wildcards: bool) -> Self {
        Self {
            p_match: crate::alphabet::per_base_match_probability(read_wildcards, adapter_wildcards),
        }
    }

    #[inline]
    pub fn rmp(&self, length: u32, matches: u32) -> f64 {
        tail_probability(length, matches, self.p_match)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_match_is_small_probability() {
        let p = tail_probability(20, 20, 0.25);
        assert!(p > 0.0 && p < 1e-9);
    }

    #[test]
    fn zero_required_matches_is_certain() {
        assert_eq!(tail_probability(10, 0, 0.25), 1.0);
    }

    #[test]
    fn monotonic_in_min_matches() {
        let p_low = tail_probability(10, 3, 0.25);
        let p_high = tail_probability(10, 8, 0.25);
        assert!(p_low >= p_high);
    }

    #[test]
    fn empty_alignment_requires_zero_matches() {
        assert_eq!(tail_probability(0, 0, 0.25), 1.0);
        assert_eq!(tail_probability(0, 1, 0.25), 0.0);
    }
}
