//! Serial and parallel executors (spec.md §4.6, §5).
//!
//! The parallel executor is a reader → bounded `read_queue` →
//! worker-pool → bounded `result_queue` → writer pipeline. Workers run on
//! `rayon`'s thread pool (the teacher's own parallelism primitive, via
//! `ThreadPoolBuilder` in `main.rs`); `crossbeam-channel` supplies the
//! bounded inter-stage queues, since rayon's pool schedules work but has no
//! notion of a reader/writer topology on its own.

use std::collections::HashMap;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError};

use crate::config::Pipeline;
use crate::error::{Result, TrimError};
use crate::filters::Disposition;
use crate::io::fastq::PairedBatchReader;
use crate::io::writer::{Formatters, Writers};
use crate::io::Batch;
use crate::stats::Summary;

/// Runs every batch through the modifier chain, then the filter chain,
/// writing directly via `writers` (spec.md §4.6 serial mode and
/// direct-write parallel mode share this inner loop).
fn process_batch(pipeline: &mut Pipeline, formatters: &Formatters, writers: &Writers, batch: Batch, summary: &mut Summary) -> Result<()> {
    for mut pair in batch.pairs {
        summary.record_pair();
        summary.record_read(&pair.r1.sequence, pair.r1.phred_scores());
        if !pair.r2.name.is_empty() {
            summary.record_read(&pair.r2.sequence, pair.r2.phred_scores());
        }
        pipeline.apply_modifiers(&mut pair);
        match pipeline.filters.classify(&pair) {
            Disposition::Drop => {}
            Disposition::Sink(kind) => {
                summary.record_sink(kind);
                formatters.route(writers, kind, &pair, None)?;
            }
        }
    }
    Ok(())
}

/// Same inner loop, but renders bytes per sink instead of writing them
/// (`writer_process=true` path): the returned buffers are handed to the
/// writer stage, which is the only place file handles are touched.
fn process_batch_buffered(
    pipeline: &mut Pipeline, formatters: &Formatters, batch: Batch, summary: &mut Summary,
) -> Vec<(String, Vec<u8>)> {
    let mut buffers = Vec::new();
    for mut pair in batch.pairs {
        summary.record_pair();
        summary.record_read(&pair.r1.sequence, pair.r1.phred_scores());
        if !pair.r2.name.is_empty() {
            summary.record_read(&pair.r2.sequence, pair.r2.phred_scores());
        }
        pipeline.apply_modifiers(&mut pair);
        match pipeline.filters.classify(&pair) {
            Disposition::Drop => {}
            Disposition::Sink(kind) => {
                summary.record_sink(kind);
                buffers.extend(formatters.render(kind, &pair, None));
            }
        }
    }
    buffers
}

pub struct SerialExecutor;

impl SerialExecutor {
    /// Pull a batch → run modifier/filter/format → write. Single thread,
    /// the simplest fallback (spec.md §4.6).
    pub fn run<R: BufRead>(
        mut pipeline: Pipeline, formatters: &Formatters, writers: &Writers, mut reader: PairedBatchReader<R>,
    ) -> Result<Summary> {
        let mut summary = Summary::default();
        while let Some(batch) = reader.next_batch()? {
            process_batch(&mut pipeline, formatters, writers, batch, &mut summary)?;
        }
        pipeline.drain_stats_into(&mut summary);
        writers.finalize()?;
        Ok(summary)
    }
}

struct ResultBatch {
    batch_index: u64,
    buffers: Option<Vec<(String, Vec<u8>)>>,
    summary: Summary,
}

pub struct ParallelExecutor {
    pool: rayon::ThreadPool,
    read_queue_size: usize,
    result_queue_size: usize,
    process_timeout: Duration,
    preserve_order: bool,
    writer_process: bool,
}

impl ParallelExecutor {
    pub fn new(
        threads: usize, read_queue_size: usize, result_queue_size: usize, process_timeout: Duration, preserve_order: bool,
        writer_process: bool,
    ) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .build()
            .map_err(|e| TrimError::Config(e.to_string()))?;
        if preserve_order && !writer_process {
            log::warn!("preserve_order requested with writer_process=false; direct-write mode cannot guarantee output order");
        }
        Ok(ParallelExecutor { pool, read_queue_size, result_queue_size, process_timeout, preserve_order, writer_process })
    }

    /// `reader ──▶ [read_queue] ──▶ worker₁..workerₙ ──▶ [result_queue] ──▶ writer`
    /// (spec.md §4.6). `pipeline` is cloned once per worker ("per-worker
    /// duplication of modifiers", spec.md §9); `formatters`/`writers` are
    /// shared, with `Writers` guarding its open file handles behind a
    /// mutex per sink (spec.md §5 "Shared resources").
    pub fn run<R: BufRead + Send>(
        &self, pipeline: Pipeline, formatters: Arc<Formatters>, writers: Arc<Writers>, reader: PairedBatchReader<R>,
    ) -> Result<Summary> {
        let abort = Arc::new(AtomicBool::new(false));
        let (read_tx, read_rx) = bounded::<Batch>(self.read_queue_size);
        let (result_tx, result_rx) = bounded::<ResultBatch>(self.result_queue_size);
        let worker_stats = Arc::new(std::sync::Mutex::new(Summary::default()));
        let timeout = self.process_timeout;
        let num_workers = self.pool.current_num_threads();

        let outcome = std::thread::scope(|scope| -> Result<Summary> {
            let reader_abort = Arc::clone(&abort);
            scope.spawn(move || {
                let mut reader = reader;
                loop {
                    if reader_abort.load(Ordering::Relaxed) {
                        break;
                    }
                    match reader.next_batch() {
                        Ok(Some(batch)) => {
                            if read_tx.send_timeout(batch, timeout).is_err() {
                                log::warn!("pipeline stall in stage 'read_queue': reader blocked past process_timeout");
                                reader_abort.store(true, Ordering::Relaxed);
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            log::error!("reader stage failed: {e}");
                            reader_abort.store(true, Ordering::Relaxed);
                            break;
                        }
                    }
                }
            });

            for _ in 0..num_workers.max(1) {
                let read_rx = read_rx.clone();
                let result_tx = result_tx.clone();
                let mut worker_pipeline = pipeline.clone();
                let formatters = Arc::clone(&formatters);
                let writers = Arc::clone(&writers);
                let worker_abort = Arc::clone(&abort);
                let writer_process = self.writer_process;
                let worker_stats = Arc::clone(&worker_stats);
                self.pool.spawn(move || {
                    loop {
                        if worker_abort.load(Ordering::Relaxed) {
                            break;
                        }
                        let batch = match read_rx.recv_timeout(timeout) {
                            Ok(b) => b,
                            Err(RecvTimeoutError::Disconnected) => break,
                            Err(RecvTimeoutError::Timeout) => {
                                log::warn!("pipeline stall in stage 'read_queue': worker idle past process_timeout");
                                worker_abort.store(true, Ordering::Relaxed);
                                break;
                            }
                        };
                        let batch_index = batch.batch_index;
                        let mut summary = Summary::default();
                        let rb = if writer_process {
                            let buffers = process_batch_buffered(&mut worker_pipeline, &formatters, batch, &mut summary);
                            ResultBatch { batch_index, buffers: Some(buffers), summary }
                        } else {
                            if let Err(e) = process_batch(&mut worker_pipeline, &formatters, &writers, batch, &mut summary) {
                                log::error!("worker error: {e}");
                                worker_abort.store(true, Ordering::Relaxed);
                                break;
                            }
                            ResultBatch { batch_index, buffers: None, summary }
                        };
                        if result_tx.send_timeout(rb, timeout).is_err() {
                            log::warn!("pipeline stall in stage 'result_queue': worker blocked past process_timeout");
                            worker_abort.store(true, Ordering::Relaxed);
                            break;
                        }
                    }
                    // Forward this worker's final accumulated modifier stats
                    // exactly once, outside the ordered result_queue so it
                    // can't collide with a real batch_index (spec.md §4.6:
                    // "forwards its final stats_delta and exits").
                    worker_pipeline.drain_stats_into(&mut worker_stats.lock().expect("worker_stats mutex poisoned"));
                });
            }
            drop(read_rx);
            drop(result_tx);

            let mut summary = Summary::default();
            let mut pending: HashMap<u64, ResultBatch> = HashMap::new();
            let mut next_expected = 0u64;
            loop {
                match result_rx.recv_timeout(timeout) {
                    Ok(rb) => {
                        if self.preserve_order && self.writer_process {
                            pending.insert(rb.batch_index, rb);
                            while let Some(ready) = pending.remove(&next_expected) {
                                flush_result(&writers, ready, &mut summary)?;
                                next_expected += 1;
                            }
                        } else {
                            flush_result(&writers, rb, &mut summary)?;
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {
                        if abort.load(Ordering::Relaxed) {
                            break;
                        }
                        continue;
                    }
                }
            }
            // Flush any remaining out-of-order entries (a worker aborted
            // before delivering `next_expected`).
            let mut remaining: Vec<_> = pending.into_values().collect();
            remaining.sort_by_key(|rb| rb.batch_index);
            for rb in remaining {
                flush_result(&writers, rb, &mut summary)?;
            }

            if abort.load(Ordering::Relaxed) {
                return Err(TrimError::Stall { stage: "pipeline".into(), detail: "aborted; see preceding log entries for cause".into() });
            }
            summary.merge(&worker_stats.lock().expect("worker_stats mutex poisoned"));
            Ok(summary)
        });

        writers.finalize()?;
        outcome
    }
}

fn flush_result(writers: &Writers, rb: ResultBatch, summary: &mut Summary) -> Result<()> {
    if let Some(buffers) = rb.buffers {
        for (path, bytes) in buffers {
            writers.write_record(&path, &bytes)?;
        }
    }
    summary.merge(&rb.summary);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{Filter, FilterChain, PairFilterMode};
    use crate::io::fastq::RecordReader;
    use crate::io::writer::{Formatters, RecordFormatKind, SinkPath, Writers};
    use crate::io::RecordFormat;
    use crate::config::{ExecutionConfig, PairMode};
    use crate::filters::FilterKind;
    use std::io::Cursor;

    fn trivial_pipeline() -> Pipeline {
        Pipeline::new(
            vec!['C', 'G', 'Q', 'A'],
            HashMap::new(),
            Vec::new(),
            vec![Filter::TooShort { min_length: 1 }],
            PairFilterMode::Any,
            PairMode::None,
            ExecutionConfig::default(),
        )
    }

    #[test]
    fn serial_executor_writes_every_read_to_the_default_sink() {
        let data = "@r1\nACGT\n+\nIIII\n@r2\nACGT\n+\nIIII\n";
        let reader = RecordReader::new(Cursor::new(data.as_bytes().to_vec()), RecordFormat::Fastq, 33);
        let batcher = PairedBatchReader::new(reader, None, 10);

        let dir = std::env::temp_dir().join(format!("trimcore-exec-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let out_path = dir.join("out.fastq").to_string_lossy().to_string();

        let writers = Writers::new(&[]).unwrap();
        let mut formatters = Formatters::new(RecordFormatKind::Fastq);
        formatters.add_route(FilterKind::NoFilter, SinkPath::File(out_path.clone()), None);

        let pipeline = trivial_pipeline();
        let summary = SerialExecutor::run(pipeline, &formatters, &writers, batcher).unwrap();
        assert_eq!(summary.pairs_seen, 2);

        let contents = std::fs::read_to_string(&out_path).unwrap();
        assert_eq!(contents.matches('@').count(), 2);
        std::fs::remove_dir_all(&dir).ok();
    }
}
