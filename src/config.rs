//! Pipeline configuration: the `op_order` execution plan, the bisulfite
//! preset table, and the immutable parameters record (spec.md §9 design
//! note: "named-tuple aggregate for pipeline parameters").

use crate::filters::{Filter, FilterChain, PairFilterMode};
use crate::modifiers::Modifier;
use crate::stats::Summary;

/// The four `op_order` categorical groups (spec.md §4.3): unconditional
/// Cut, NextSeq quality, general Quality, Adapter matching.
pub const OP_ORDER_GROUPS: &str = "CGQA";
pub const DEFAULT_OP_ORDER: &str = "CGQA";

/// Parses an `op_order` string into a validated group sequence, warning
/// (never silently reinterpreting — spec.md §9 Open Question) on unknown
/// letters, mirroring `commands.py`'s `logger.warning` on ambiguous
/// configuration.
pub fn parse_op_order(spec: &str) -> Vec<char> {
    let mut order = Vec::with_capacity(spec.len());
    for c in spec.chars() {
        if OP_ORDER_GROUPS.contains(c) {
            order.push(c);
        } else {
            log::warn!("unknown op_order group '{c}' ignored; valid groups are '{OP_ORDER_GROUPS}'");
        }
    }
    if order.is_empty() {
        log::warn!("op_order '{spec}' contained no valid groups; falling back to default '{DEFAULT_OP_ORDER}'");
        return DEFAULT_OP_ORDER.chars().collect();
    }
    order
}

/// One (front, back) minimum-cut pair per mate for a bisulfite preset.
/// Numeric values follow the published cutadapt/Trim Galore bisulfite
/// presets (the original source names the presets in `commands.py` but
/// does not carry the literal constants into the portion read here; see
/// DESIGN.md for this Open Question's resolution).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinCutPair {
    pub front: usize,
    pub back: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BisulfitePreset {
    Rrbs,
    NonDirectional,
    NonDirectionalRrbs,
    Epignome,
    Truseq,
    Swift,
}

impl BisulfitePreset {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "rrbs" => Some(Self::Rrbs),
            "non-directional" => Some(Self::NonDirectional),
            "non-directional-rrbs" => Some(Self::NonDirectionalRrbs),
            "epignome" => Some(Self::Epignome),
            "truseq" => Some(Self::Truseq),
            "swift" => Some(Self::Swift),
            _ => None,
        }
    }

    /// Returns the `(read1, read2)` `MinCutter` lower bounds for this
    /// preset.
    pub fn min_cut_pairs(self) -> (MinCutPair, MinCutPair) {
        match self {
            BisulfitePreset::Rrbs => (MinCutPair { front: 0, back: 0 }, MinCutPair { front: 0, back: 2 }),
            BisulfitePreset::NonDirectional => (MinCutPair { front: 2, back: 2 }, MinCutPair { front: 2, back: 2 }),
            BisulfitePreset::NonDirectionalRrbs => (MinCutPair { front: 2, back: 2 }, MinCutPair { front: 2, back: 4 }),
            BisulfitePreset::Epignome => (MinCutPair { front: 0, back: 6 }, MinCutPair { front: 0, back: 6 }),
            BisulfitePreset::Truseq => (MinCutPair { front: 0, back: 6 }, MinCutPair { front: 0, back: 6 }),
            BisulfitePreset::Swift => (MinCutPair { front: 0, back: 0 }, MinCutPair { front: 0, back: 9 }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairMode {
    None,
    First,
    Both,
}

/// Execution-surface options (spec.md §6 "Execution").
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub threads: usize,
    pub batch_size: usize,
    pub read_queue_size: usize,
    pub result_queue_size: usize,
    pub process_timeout: std::time::Duration,
    pub preserve_order: bool,
    pub writer_process: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            threads: num_cpus::get(),
            batch_size: 1000,
            read_queue_size: 4,
            result_queue_size: 4,
            process_timeout: std::time::Duration::from_secs(60),
            preserve_order: true,
            writer_process: true,
        }
    }
}

/// The immutable pipeline parameters record: five owning handles assembled
/// once before the run starts (spec.md §9 design note, modeled on
/// `AtroposParams`). `modifier_groups`/`post_modifiers` together are the
/// parsed `op_order` execution plan (spec.md §9: "Parse once into a fixed
/// execution plan").
#[derive(Clone)]
pub struct Pipeline {
    pub op_order: Vec<char>,
    pub modifier_groups: std::collections::HashMap<char, Vec<Modifier>>,
    pub post_modifiers: Vec<Modifier>,
    pub filters: FilterChain,
    pub pair_mode: PairMode,
    pub execution: ExecutionConfig,
}

impl Pipeline {
    pub fn new(
        op_order: Vec<char>, modifier_groups: std::collections::HashMap<char, Vec<Modifier>>, post_modifiers: Vec<Modifier>,
        filters: Vec<Filter>, pair_filter_mode: PairFilterMode, pair_mode: PairMode, execution: ExecutionConfig,
    ) -> Self {
        Pipeline {
            op_order,
            modifier_groups,
            post_modifiers,
            filters: FilterChain::new(filters, pair_filter_mode),
            pair_mode,
            execution,
        }
    }

    /// Runs the full modifier chain (op_order groups, then the fixed
    /// post-op_order sequence: bisulfite/MinCutter, NEndTrimmer, explicit
    /// MinCutter, LengthTag, SuffixRemover, PrefixSuffixAdder, DoubleEncoder,
    /// ZeroCapper, PrimerTrimmer, MergeOverlapping — the order
    /// `create_atropos_params` builds modifiers in) against one pair,
    /// accumulating into `summary`.
    pub fn apply_modifiers(&mut self, pair: &mut crate::read::ReadPair) {
        for group in self.op_order.clone() {
            if let Some(mods) = self.modifier_groups.get_mut(&group) {
                for m in mods {
                    m.apply_pair(pair);
                }
            }
        }
        for m in &mut self.post_modifiers {
            m.apply_pair(pair);
        }
    }

    /// Folds every modifier's accumulated stats into `summary`. Called once
    /// a worker (or the serial executor) has finished all its batches,
    /// since modifiers accumulate internally per-instance rather than
    /// per-batch (spec.md §4.6 "forwards its final `stats_delta`").
    pub fn drain_stats_into(&self, summary: &mut Summary) {
        for mods in self.modifier_groups.values() {
            for m in mods {
                m.merge_stats_into(summary);
            }
        }
        for m in &self.post_modifiers {
            m.merge_stats_into(summary);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_op_order_is_cut_nextseq_quality_adapter() {
        assert_eq!(parse_op_order(DEFAULT_OP_ORDER), vec!['C', 'G', 'Q', 'A']);
    }

    #[test]
    fn unknown_letters_are_dropped_not_reinterpreted() {
        assert_eq!(parse_op_order("CQX"), vec!['C', 'Q']);
    }

    #[test]
    fn all_unknown_falls_back_to_default() {
        assert_eq!(parse_op_order("XYZ"), vec!['C', 'G', 'Q', 'A']);
    }

    #[test]
    fn rrbs_preset_only_trims_read2_three_prime() {
        let (r1, r2) = BisulfitePreset::Rrbs.min_cut_pairs();
        assert_eq!(r1, MinCutPair { front: 0, back: 0 });
        assert_eq!(r2, MinCutPair { front: 0, back: 2 });
    }
}
