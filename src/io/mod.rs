//! Reader, sink, and writer plumbing (spec.md §4.5, §6).
//!
//! This module specifies the streaming *contract* readers/writers must
//! satisfy (single-record peek, batch tagging, lazy/eager sink creation,
//! multiplexed templates) rather than a full file-format zoo: only FASTQ,
//! FASTA, and gzip are wired end-to-end, matching the teacher's own scope
//! (spec.md §1 lists compression libraries and format readers/writers as
//! external collaborators whose *streaming contract* is what's specified).

pub mod fastq;
pub mod writer;

use crate::read::{Read, ReadPair};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    Fastq,
    Fasta,
}

impl RecordFormat {
    /// Detects format from a file extension, stripping a trailing `.gz`
    /// first (spec.md §6: "auto-detect by extension").
    pub fn from_path(path: &str) -> Option<Self> {
        let stem = path.strip_suffix(".gz").unwrap_or(path);
        if stem.ends_with(".fastq") || stem.ends_with(".fq") {
            Some(RecordFormat::Fastq)
        } else if stem.ends_with(".fasta") || stem.ends_with(".fa") || stem.ends_with(".fna") {
            Some(RecordFormat::Fasta)
        } else {
            None
        }
    }
}

/// A fixed-size, ordered batch of pairs tagged with a monotonically
/// increasing index (spec.md §3 Batch, §4.6). Single-end runs carry an
/// all-R1 pseudo-pair (`r2` is an empty, quality-less placeholder) so the
/// rest of the pipeline has one shape to deal with; `io::writer` skips
/// writing `r2` when the run is single-end.
#[derive(Debug, Clone)]
pub struct Batch {
    pub batch_index: u64,
    pub pairs: Vec<ReadPair>,
}

impl Batch {
    pub fn new(batch_index: u64, pairs: Vec<ReadPair>) -> Self {
        Batch { batch_index, pairs }
    }
}

pub(crate) fn empty_mate() -> Read {
    Read::new(String::new(), Vec::new(), Vec::new(), 33)
}
