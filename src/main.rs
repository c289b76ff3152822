/* MIT License
 *
 * Copyright (c) 2023-2024 Andrew Smith
 *
 * Permission is hereby granted, free of charge, to any person
 * obtaining a copy of this software and associated documentation
 * files (the "Software"), to deal in the Software without
 * restriction, including without limitation the rights to use, copy,
 * modify, merge, publish, distribute, sublicense, and/or sell copies
 * of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be
 * included in all copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND,
 * EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF
 * MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
 * NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS
 * BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN
 * ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
 * CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */

use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use clap_num::number_range;

use trimcore::adapter::Adapter;
use trimcore::aligner::{AlignerParams, Where};
use trimcore::config::{BisulfitePreset, ExecutionConfig, PairMode, Pipeline};
use trimcore::executor::{ParallelExecutor, SerialExecutor};
use trimcore::filters::{Filter, FilterKind, PairFilterMode};
use trimcore::insert_aligner::InsertAlignerParams;
use trimcore::io::fastq::{open_input, PairedBatchReader, RecordReader};
use trimcore::io::writer::{Formatters, RecordFormatKind, SinkPath, Writers};
use trimcore::io::RecordFormat;
use trimcore::modifiers::{Action, Mate, Modifier};
use trimcore::TrimError;

fn thread_range(s: &str) -> Result<usize, String> {
    number_range(s, 1, 1024)
}

fn overlap_range(s: &str) -> Result<usize, String> {
    number_range(s, 1, 255)
}

fn error_rate_range(s: &str) -> Result<f64, String> {
    let val = s.parse::<f64>().map_err(|e| e.to_string())?;
    if (0.0..=1.0).contains(&val) {
        Ok(val)
    } else {
        Err(format!("{s} is outside the valid error-rate range [0,1]"))
    }
}

static CUSTOM_HELP_FORMAT: &str = indoc::indoc! {"
{before-help}
{about-section}
{usage-heading} {usage}

{all-args}

{name} {version}
{author-with-newline}{after-help}
"};

/// One adapter specification on the command line: `name=SEQUENCE` matched
/// at the read's 3' end (BACK) by default, or `name=SEQUENCE:front`/
/// `:anywhere`/`:prefix`/`:suffix` to select placement (spec.md §6 "Adapter
/// specifications: sequences + placement").
#[derive(Debug, Clone)]
struct AdapterSpec {
    name: String,
    sequence: String,
    where_: Where,
}

fn parse_adapter_spec(s: &str) -> Result<AdapterSpec, String> {
    let (name, rest) = s.split_once('=').ok_or_else(|| format!("adapter spec '{s}' missing 'name=' prefix"))?;
    let mut parts = rest.splitn(2, ':');
    let sequence = parts.next().unwrap_or("").to_string();
    if sequence.is_empty() {
        return Err(format!("adapter spec '{s}' has an empty sequence"));
    }
    let where_ = match parts.next().unwrap_or("back") {
        "back" => Where::Back,
        "front" => Where::Front,
        "anywhere" => Where::Anywhere,
        "prefix" => Where::Prefix,
        "suffix" => Where::Suffix,
        other => return Err(format!("unknown adapter placement '{other}' in '{s}'")),
    };
    Ok(AdapterSpec { name: name.to_string(), sequence, where_ })
}

#[derive(Parser, Debug)]
#[command(
    author = "trimcore contributors",
    version,
    about = "Adapter- and quality-trimming engine for paired short-read sequencing data",
    help_template = CUSTOM_HELP_FORMAT,
    arg_required_else_help = true
)]
struct Args {
    /// First (or only) input FASTQ/FASTA file, optionally gzip-compressed
    r1: String,

    /// Second input file for paired-end runs
    r2: Option<String>,

    /// Output file for read 1 (or the only output for single-end runs)
    #[arg(short, long)]
    output: String,

    /// Output file for read 2, required if `r2` is given
    #[arg(short = 'p', long, requires = "r2")]
    paired_output: Option<String>,

    /// Adapter spec `name=SEQUENCE[:back|front|anywhere|prefix|suffix]`, repeatable
    #[arg(short = 'a', long = "adapter", value_parser = parse_adapter_spec)]
    adapters: Vec<AdapterSpec>,

    /// Mate the adapters above apply to
    #[arg(long, default_value = "both")]
    adapter_mate: String,

    /// Detect adapter contamination via paired-mate overlap instead of
    /// independent per-mate adapter search (spec.md §4.2); requires exactly
    /// two `-a` adapters (applied BACK) and paired input
    #[arg(long, requires = "r2")]
    insert_match: bool,

    /// Replace mismatching overlap bases with the higher-quality base
    /// (only meaningful with `--insert-match`)
    #[arg(long)]
    correct_mismatches: bool,

    /// Adapter-cutter action
    #[arg(long, default_value = "trim")]
    action: String,

    /// Maximum adapter-removal rounds per read
    #[arg(long, default_value_t = 1)]
    times: u32,

    /// Adapter error rate
    #[arg(short = 'e', long, default_value_t = 0.1, value_parser = error_rate_range)]
    error_rate: f64,

    /// Minimum adapter overlap
    #[arg(short = 'O', long, default_value_t = 3, value_parser = overlap_range)]
    min_overlap: usize,

    /// Disallow indels in the adapter alignment
    #[arg(long)]
    no_indels: bool,

    /// Maximum random-match probability accepted for an adapter match
    #[arg(long)]
    max_rmp: Option<f64>,

    /// Quality-trim cutoff, 5' end
    #[arg(long, default_value_t = 0)]
    quality_cutoff_front: i32,

    /// Quality-trim cutoff, 3' end
    #[arg(short = 'q', long, default_value_t = 0)]
    quality_cutoff_back: i32,

    /// NextSeq-specific quality cutoff (treats called G as quality 0)
    #[arg(long, default_value_t = 0)]
    nextseq_trim: i32,

    /// Quality encoding offset
    #[arg(long, default_value_t = 33)]
    quality_base: u8,

    /// Unconditional cut lengths, signed (positive from front, negative from back), repeatable
    #[arg(short = 'u', long = "cut")]
    cut: Vec<i64>,

    /// Discard pairs shorter than this after trimming
    #[arg(short = 'm', long, default_value_t = 1)]
    minimum_length: usize,

    /// Discard pairs longer than this after trimming
    #[arg(short = 'M', long, default_value_t = usize::MAX)]
    maximum_length: usize,

    /// Maximum fraction (or, if ≥1, count) of N bases tolerated
    #[arg(long)]
    max_n: Option<f64>,

    /// Discard trimmed reads instead of keeping them
    #[arg(long)]
    discard_trimmed: bool,

    /// Send untrimmed reads to their own sink rather than `output`
    #[arg(long)]
    untrimmed_output: Option<String>,

    /// Send too-short pairs to their own sink
    #[arg(long)]
    too_short_output: Option<String>,

    /// Send too-long pairs to their own sink
    #[arg(long)]
    too_long_output: Option<String>,

    /// How a per-mate filter predicate combines into a pair-level verdict
    #[arg(long, default_value = "any")]
    pair_filter: String,

    /// Paired-mode: whether modifiers configured for "both" apply to both
    /// mates, only `r1` (legacy "first"), or are pair-unaware (spec.md §9
    /// Open Question: "first" is ambiguous and logs a warning, never
    /// silently reinterpreted)
    #[arg(long, default_value = "both")]
    paired_mode: String,

    /// Merge overlapping mates into a single consensus read
    #[arg(long, requires = "r2")]
    merge_overlapping: bool,

    /// Output path for merged reads, required with `--merge-overlapping`
    #[arg(long, requires = "merge_overlapping")]
    merged_output: Option<String>,

    /// Bisulfite preset, selecting a `MinCutter` table per mate
    #[arg(long)]
    bisulfite: Option<String>,

    /// Modifier group execution order
    #[arg(long, default_value = trimcore::config::DEFAULT_OP_ORDER)]
    op_order: String,

    /// Worker thread count
    #[arg(short, long, default_value_t = num_cpus::get(), value_parser = thread_range)]
    threads: usize,

    /// Reads per batch
    #[arg(long, default_value_t = 1000)]
    batch_size: usize,

    /// Seconds any pipeline stage may block before the run aborts
    #[arg(long, default_value_t = 60)]
    process_timeout: u64,

    /// Disable strict input-order preservation across workers
    #[arg(long)]
    no_preserve_order: bool,

    /// Run single-threaded instead of the parallel executor
    #[arg(long)]
    serial: bool,

    /// Be verbose
    #[arg(short, long)]
    verbose: bool,
}

fn parse_pair_filter_mode(s: &str) -> Result<PairFilterMode, TrimError> {
    match s {
        "any" => Ok(PairFilterMode::Any),
        "both" => Ok(PairFilterMode::Both),
        "first" => Ok(PairFilterMode::First),
        other => Err(TrimError::Config(format!("unknown pair-filter mode '{other}'"))),
    }
}

fn parse_paired_mode(s: &str) -> Result<PairMode, TrimError> {
    match s {
        "none" => Ok(PairMode::None),
        "both" => Ok(PairMode::Both),
        "first" => {
            log::warn!("paired_mode='first' applies modifiers to r1 only; this is a legacy, ambiguously-defined mode");
            Ok(PairMode::First)
        }
        other => Err(TrimError::Config(format!("unknown paired mode '{other}'"))),
    }
}

fn parse_mate(s: &str) -> Result<Mate, TrimError> {
    match s {
        "r1" => Ok(Mate::R1),
        "r2" => Ok(Mate::R2),
        "both" => Ok(Mate::Both),
        other => Err(TrimError::Config(format!("unknown mate selector '{other}'"))),
    }
}

fn parse_action(s: &str) -> Result<Action, TrimError> {
    match s {
        "trim" => Ok(Action::Trim),
        "mask" => Ok(Action::Mask),
        "lowercase" => Ok(Action::Lowercase),
        "none" => Ok(Action::None),
        other => Err(TrimError::Config(format!("unknown adapter-cutter action '{other}'"))),
    }
}

fn build_adapter(spec: &AdapterSpec, args: &Args) -> Adapter {
    Adapter::new(
        spec.name.clone(),
        spec.sequence.clone().into_bytes(),
        spec.where_,
        AlignerParams {
            max_error_rate: args.error_rate,
            min_overlap: args.min_overlap,
            indels_allowed: !args.no_indels,
            indel_cost: 1,
            read_wildcards: false,
            adapter_wildcards: false,
            max_rmp: args.max_rmp,
        },
    )
}

/// Assembles the `op_order` categorical groups and the fixed post-op_order
/// sequence from the parsed CLI options (spec.md §4.3, §9 "Parse once into
/// a fixed execution plan"; ordering grounded in `commands.py`'s literal
/// modifier construction order).
fn build_pipeline(args: &Args) -> Result<Pipeline, TrimError> {
    let mate = parse_mate(&args.adapter_mate)?;
    let action = parse_action(&args.action)?;

    // spec.md §7's first named configuration error: running with nothing to
    // trim at all (no adapters and no alternative trimming criterion),
    // mirroring commands.py's `parser.error("You need to provide at least
    // one adapter sequence.")`.
    if args.adapters.is_empty()
        && args.quality_cutoff_front == 0
        && args.quality_cutoff_back == 0
        && args.nextseq_trim == 0
        && args.cut.is_empty()
        && args.bisulfite.is_none()
    {
        return Err(TrimError::Config(
            "no trimming criteria given: provide at least one -a/--adapter, a quality cutoff, --nextseq-trim, --cut, or --bisulfite".into(),
        ));
    }

    let mut modifier_groups: HashMap<char, Vec<Modifier>> = HashMap::new();

    if !args.cut.is_empty() {
        modifier_groups.entry('C').or_default().push(Modifier::UnconditionalCutter {
            mate: Mate::Both,
            lengths: args.cut.clone(),
            stats: Default::default(),
        });
    }

    if args.nextseq_trim > 0 {
        modifier_groups.entry('G').or_default().push(Modifier::NextseqQualityTrimmer {
            mate: Mate::Both,
            cutoff: args.nextseq_trim,
            stats: Default::default(),
        });
    }

    if args.quality_cutoff_front > 0 || args.quality_cutoff_back > 0 {
        modifier_groups.entry('Q').or_default().push(Modifier::QualityTrimmer {
            mate: Mate::Both,
            cutoff_front: args.quality_cutoff_front,
            cutoff_back: args.quality_cutoff_back,
            stats: Default::default(),
        });
    }

    let insert_params = InsertAlignerParams {
        min_overlap: args.min_overlap,
        max_insert_mismatch_frac: args.error_rate,
        max_adapter_mismatch_frac: args.error_rate,
        insert_max_rmp: args.max_rmp,
    };

    if args.insert_match {
        if args.adapters.len() != 2 {
            return Err(TrimError::Config("--insert-match requires exactly two -a adapters".into()));
        }
        if args.adapters[0].where_ != Where::Back || args.adapters[1].where_ != Where::Back {
            return Err(TrimError::Config("insert aligner requires a single 3' (back) adapter for each read".into()));
        }
        let a1 = build_adapter(&args.adapters[0], args);
        let a2 = build_adapter(&args.adapters[1], args);
        modifier_groups.entry('A').or_default().push(Modifier::InsertAdapterCutter {
            adapter1: a1,
            adapter2: a2,
            params: insert_params,
            action,
            correct_mismatches: args.correct_mismatches,
            stats: Default::default(),
        });
    } else if !args.adapters.is_empty() {
        let adapters: Vec<Adapter> = args.adapters.iter().map(|spec| build_adapter(spec, args)).collect();
        modifier_groups.entry('A').or_default().push(Modifier::AdapterCutter {
            mate,
            adapters,
            action,
            times: args.times,
            stats: Default::default(),
            match_stats: Default::default(),
        });
    }

    let mut post_modifiers = Vec::new();

    if let Some(name) = &args.bisulfite {
        let preset = BisulfitePreset::parse(name).ok_or_else(|| TrimError::Config(format!("unknown bisulfite preset '{name}'")))?;
        let (r1_cut, r2_cut) = preset.min_cut_pairs();
        post_modifiers.push(Modifier::MinCutter { mate: Mate::R1, min_front: r1_cut.front, min_back: r1_cut.back, stats: Default::default() });
        post_modifiers.push(Modifier::MinCutter { mate: Mate::R2, min_front: r2_cut.front, min_back: r2_cut.back, stats: Default::default() });
    }

    if args.merge_overlapping {
        post_modifiers.push(Modifier::MergeOverlapping { params: insert_params });
    }

    let mut filters = Vec::new();
    if args.minimum_length > 0 {
        filters.push(Filter::TooShort { min_length: args.minimum_length });
    }
    if args.maximum_length < usize::MAX {
        filters.push(Filter::TooLong { max_length: args.maximum_length });
    }
    if let Some(max_n) = args.max_n {
        filters.push(Filter::NContent { max_n });
    }
    if args.discard_trimmed {
        filters.push(Filter::Trimmed { discard_trimmed: true });
    } else if args.untrimmed_output.is_some() {
        filters.push(Filter::Untrimmed);
    }
    if args.merge_overlapping {
        filters.push(Filter::MergedRead);
    }

    let op_order = trimcore::config::parse_op_order(&args.op_order);
    let pair_filter_mode = parse_pair_filter_mode(&args.pair_filter)?;
    let paired_mode = parse_paired_mode(&args.paired_mode)?;

    let execution = ExecutionConfig {
        threads: args.threads,
        batch_size: args.batch_size,
        read_queue_size: 4,
        result_queue_size: 4,
        process_timeout: Duration::from_secs(args.process_timeout),
        preserve_order: !args.no_preserve_order,
        writer_process: true,
    };

    Ok(Pipeline::new(op_order, modifier_groups, post_modifiers, filters, pair_filter_mode, paired_mode, execution))
}

fn build_formatters(args: &Args, format: RecordFormatKind) -> (Formatters, Vec<String>) {
    let mut formatters = Formatters::new(format);
    let mut force_create = vec![args.output.clone()];

    let main_r2 = args.paired_output.clone().map(SinkPath::File);
    formatters.add_route(FilterKind::NoFilter, SinkPath::File(args.output.clone()), main_r2.clone());

    if let Some(path) = &args.untrimmed_output {
        formatters.add_route(FilterKind::Untrimmed, SinkPath::File(path.clone()), None);
        force_create.push(path.clone());
    }
    if let Some(path) = &args.too_short_output {
        formatters.add_route(FilterKind::TooShort, SinkPath::File(path.clone()), None);
        force_create.push(path.clone());
    }
    if let Some(path) = &args.too_long_output {
        formatters.add_route(FilterKind::TooLong, SinkPath::File(path.clone()), None);
        force_create.push(path.clone());
    }
    if let Some(path) = &args.merged_output {
        formatters.add_route(FilterKind::MergedRead, SinkPath::File(path.clone()), None);
        force_create.push(path.clone());
    }
    if let Some(path) = &main_r2 {
        if let SinkPath::File(p) = path {
            force_create.push(p.clone());
        }
    }

    (formatters, force_create)
}

fn run(args: Args) -> Result<(), TrimError> {
    if args.verbose {
        log::info!("input1: {}", args.r1);
        if let Some(r2) = &args.r2 {
            log::info!("input2: {r2}");
        }
        log::info!("output1: {}", args.output);
        log::info!("adapters: {}", args.adapters.len());
        log::info!("threads requested: {}", args.threads);
        log::info!("detected cores: {}", num_cpus::get());
    }

    let format = RecordFormat::from_path(&args.r1).unwrap_or(RecordFormat::Fastq);

    let r1_stream = open_input(&args.r1)?;
    let r1_reader = RecordReader::new(r1_stream, format, args.quality_base);
    let r2_reader = match &args.r2 {
        Some(path) => Some(RecordReader::new(open_input(path)?, format, args.quality_base)),
        None => None,
    };

    let pipeline = build_pipeline(&args)?;
    let batcher = PairedBatchReader::new(r1_reader, r2_reader, pipeline.execution.batch_size);

    let (formatters, force_create) = build_formatters(&args, format.into());
    let writers = Writers::new(&force_create)?;

    let summary = if args.serial {
        SerialExecutor::run(pipeline, &formatters, &writers, batcher)?
    } else {
        let threads = pipeline.execution.threads;
        let executor = ParallelExecutor::new(
            threads,
            pipeline.execution.read_queue_size,
            pipeline.execution.result_queue_size,
            pipeline.execution.process_timeout,
            pipeline.execution.preserve_order,
            pipeline.execution.writer_process,
        )?;
        executor.run(pipeline, Arc::new(formatters), Arc::new(writers), batcher)?
    };

    print!("{summary}");
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
