//! Adapter descriptors and the linked-adapter sequencing rule (spec.md §3,
//! §4.1 LINKED).

use crate::aligner::{align, AlignerParams, Alignment, Where};
use crate::read::Read;

#[derive(Debug, Clone)]
pub struct Adapter {
    pub name: String,
    pub sequence: Vec<u8>,
    pub where_: Where,
    pub params: AlignerParams,
}

impl Adapter {
    pub fn new(name: impl Into<String>, sequence: impl Into<Vec<u8>>, where_: Where, params: AlignerParams) -> Self {
        Adapter {
            name: name.into(),
            sequence: sequence.into(),
            where_,
            params,
        }
    }

    /// Locates this adapter within `read.sequence`, returning the match
    /// (spec.md §4.1) if one satisfies the configured thresholds.
    pub fn find_in(&self, read: &Read) -> Option<Alignment> {
        align(&self.sequence, &read.sequence, self.where_, &self.params)
    }
}

/// A linked adapter: a 5' (front) adapter followed by a 3' (back) adapter,
/// each independently `required` or optional (spec.md §3, §4.1 LINKED).
#[derive(Debug, Clone)]
pub struct LinkedAdapter {
    pub name: String,
    pub front: Adapter,
    pub front_required: bool,
    pub back: Adapter,
    pub back_required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkedMatch {
    pub front_trimmed: bool,
    pub back_trimmed: bool,
}

impl LinkedAdapter {
    /// Applies the front adapter, trims it if found, then applies the back
    /// adapter to the remainder. Fails the whole linked match (returns
    /// `None`, leaving `read` untouched by convention of the caller) if a
    /// `required` leg does not match.
    pub fn apply(&self, read: &mut Read) -> Option<LinkedMatch> {
        let front_hit = self.front.find_in(read);
        if front_hit.is_none() && self.front_required {
            return None;
        }
        let mut front_trimmed = false;
        if let Some(aln) = &front_hit {
            read.cut(aln.rstop, 0);
            front_trimmed = true;
        }

        let back_hit = self.back.find_in(read);
        if back_hit.is_none() && self.back_required {
            return None;
        }
        let mut back_trimmed = false;
        if let Some(aln) = &back_hit {
            let len = read.len();
            read.cut(0, len - aln.rstart);
            back_trimmed = true;
        }

        Some(LinkedMatch {
            front_trimmed,
            back_trimmed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(seq: &str) -> Read {
        Read::new("r".into(), seq.as_bytes().to_vec(), vec![b'I'; seq.len()], 33)
    }

    fn default_params() -> AlignerParams {
        AlignerParams {
            max_error_rate: 0.1,
            min_overlap: 3,
            ..Default::default()
        }
    }

    #[test]
    fn back_adapter_trims_three_prime() {
        let a = Adapter::new("a1", b"ACGT".to_vec(), Where::Back, default_params());
        let mut r = read("GGGGACGT");
        let m = a.find_in(&r).unwrap();
        r.cut(0, r.len() - m.rstart);
        assert_eq!(r.sequence, b"GGGG");
    }

    #[test]
    fn linked_adapter_trims_both_ends() {
        let front = Adapter::new("f", b"AAAA".to_vec(), Where::Front, default_params());
        let back = Adapter::new("b", b"TTTT".to_vec(), Where::Back, default_params());
        let linked = LinkedAdapter {
            name: "linked".into(),
            front,
            front_required: true,
            back,
            back_required: true,
        };
        let mut r = read("AAAACCCCTTTT");
        let m = linked.apply(&mut r).unwrap();
        assert!(m.front_trimmed && m.back_trimmed);
        assert_eq!(r.sequence, b"CCCC");
    }

    #[test]
    fn linked_adapter_fails_when_required_leg_missing() {
        let front = Adapter::new("f", b"GGGG".to_vec(), Where::Front, default_params());
        let back = Adapter::new("b", b"TTTT".to_vec(), Where::Back, default_params());
        let linked = LinkedAdapter {
            name: "linked".into(),
            front,
            front_required: true,
            back,
            back_required: true,
        };
        let mut r = read("AAAACCCCTTTT");
        assert!(linked.apply(&mut r).is_none());
    }
}
