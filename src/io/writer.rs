//! Formatter / Writer routing (spec.md §4.5): maps a classified pair to a
//! named sink and serializes it in the configured record format.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Mutex;

use crate::error::{Result, TrimError};
use crate::filters::FilterKind;
use crate::io::RecordFormat;
use crate::read::Read;

#[derive(Debug, Clone)]
pub enum SinkPath {
    /// A concrete file path.
    File(String),
    /// The reserved standard-output sink (`-`).
    Stdout,
    /// A template path containing `{name}`, expanded per-read by the
    /// matched adapter's name (spec.md §4.5).
    Multiplexed(String),
}

impl SinkPath {
    fn resolve(&self, name: Option<&str>) -> String {
        match self {
            SinkPath::File(p) => p.clone(),
            SinkPath::Stdout => "-".to_string(),
            SinkPath::Multiplexed(template) => template.replace("{name}", name.unwrap_or("unknown")),
        }
    }
}

enum OpenSink {
    Stdout,
    File(BufWriter<File>),
}

impl Write for OpenSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            OpenSink::Stdout => std::io::stdout().write(buf),
            OpenSink::File(f) => f.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            OpenSink::Stdout => std::io::stdout().flush(),
            OpenSink::File(f) => f.flush(),
        }
    }
}

/// Materializes sink paths into open file handles, opening lazily on first
/// write unless eagerly forced (spec.md §4.5: "so that zero-match runs
/// still produce empty files"). One `Mutex` per opened path guards
/// direct-write mode where multiple workers share a sink (spec.md §4.6).
pub struct Writers {
    open: Mutex<HashMap<String, OpenSink>>,
}

impl Writers {
    pub fn new(force_create: &[String]) -> Result<Self> {
        let mut open = HashMap::new();
        for path in force_create {
            if path != "-" {
                let file = File::create(path).map_err(TrimError::Io)?;
                open.insert(path.clone(), OpenSink::File(BufWriter::new(file)));
            }
        }
        Ok(Writers { open: Mutex::new(open) })
    }

    /// Writes `record` to `path`, opening the file lazily if this is the
    /// first write to it.
    pub fn write_record(&self, path: &str, record: &[u8]) -> Result<()> {
        let mut guard = self.open.lock().expect("writers mutex poisoned");
        if path == "-" {
            std::io::stdout().write_all(record).map_err(TrimError::Io)?;
            return Ok(());
        }
        if !guard.contains_key(path) {
            let file = File::create(path).map_err(TrimError::Io)?;
            guard.insert(path.to_string(), OpenSink::File(BufWriter::new(file)));
        }
        guard.get_mut(path).expect("just inserted").write_all(record).map_err(TrimError::Io)
    }

    /// Flushes and closes every opened sink (spec.md §4.5: "upon
    /// finalization they flush and close all opened sinks").
    pub fn finalize(&self) -> Result<()> {
        let mut guard = self.open.lock().expect("writers mutex poisoned");
        for sink in guard.values_mut() {
            sink.flush().map_err(TrimError::Io)?;
        }
        guard.clear();
        Ok(())
    }
}

/// Maps a `FilterKind` to the sink(s) that should receive reads it owns.
#[derive(Default)]
pub struct Formatters {
    routes: HashMap<FilterKind, (SinkPath, Option<SinkPath>)>,
    pub format: RecordFormatKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecordFormatKind {
    #[default]
    Fastq,
    Fasta,
}

impl From<RecordFormat> for RecordFormatKind {
    fn from(f: RecordFormat) -> Self {
        match f {
            RecordFormat::Fastq => RecordFormatKind::Fastq,
            RecordFormat::Fasta => RecordFormatKind::Fasta,
        }
    }
}

impl Formatters {
    pub fn new(format: RecordFormatKind) -> Self {
        Formatters { routes: HashMap::new(), format }
    }

    pub fn add_route(&mut self, kind: FilterKind, r1_sink: SinkPath, r2_sink: Option<SinkPath>) {
        self.routes.insert(kind, (r1_sink, r2_sink));
    }

    fn format_record(&self, read: &Read) -> Vec<u8> {
        let mut out = Vec::with_capacity(read.len() * 2 + 16);
        match self.format {
            RecordFormatKind::Fastq => {
                out.push(b'@');
                out.extend_from_slice(read.name.as_bytes());
                out.push(b'\n');
                out.extend_from_slice(&read.sequence);
                out.extend_from_slice(b"\n+");
                out.extend_from_slice(read.second_header.as_bytes());
                out.push(b'\n');
                if read.has_qualities() {
                    out.extend_from_slice(&read.quality);
                } else {
                    out.extend(std::iter::repeat(b'I').take(read.len()));
                }
                out.push(b'\n');
            }
            RecordFormatKind::Fasta => {
                out.push(b'>');
                out.extend_from_slice(read.name.as_bytes());
                out.push(b'\n');
                out.extend_from_slice(&read.sequence);
                out.push(b'\n');
            }
        }
        out
    }

    /// Writes `pair`'s mates (or its merged read) to the sink(s) registered
    /// for `kind`, expanding any multiplexed template with `matched_name`.
    /// Used directly by workers in direct-write mode (spec.md §4.6,
    /// `writer_process=false`).
    pub fn route(&self, writers: &Writers, kind: FilterKind, pair: &crate::read::ReadPair, matched_name: Option<&str>) -> Result<()> {
        for (path, bytes) in self.render(kind, pair, matched_name) {
            writers.write_record(&path, &bytes)?;
        }
        Ok(())
    }

    /// Renders `pair`'s formatted bytes per destination path without
    /// writing. Used in `writer_process=true` mode, where only the
    /// dedicated writer stage touches file handles so it can honor
    /// `preserve_order` (spec.md §4.6).
    pub fn render(&self, kind: FilterKind, pair: &crate::read::ReadPair, matched_name: Option<&str>) -> Vec<(String, Vec<u8>)> {
        let Some((r1_sink, r2_sink)) = self.routes.get(&kind) else {
            return Vec::new();
        };
        if let Some(merged) = &pair.merged {
            return vec![(r1_sink.resolve(matched_name), self.format_record(merged))];
        }
        let mut out = vec![(r1_sink.resolve(matched_name), self.format_record(&pair.r1))];
        match r2_sink {
            Some(sink2) => out.push((sink2.resolve(matched_name), self.format_record(&pair.r2))),
            None if !pair.r2.name.is_empty() => out.push((r1_sink.resolve(matched_name), self.format_record(&pair.r2))),
            None => {}
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::ReadPair;

    fn read(name: &str, seq: &str) -> Read {
        Read::new(name.into(), seq.as_bytes().to_vec(), vec![b'I'; seq.len()], 33)
    }

    #[test]
    fn fastq_record_round_trips_header_and_sequence() {
        let formatters = Formatters::new(RecordFormatKind::Fastq);
        let r = read("r1", "ACGT");
        let bytes = formatters.format_record(&r);
        assert_eq!(bytes, b"@r1\nACGT\n+\nIIII\n");
    }

    #[test]
    fn fasta_record_has_no_quality_line() {
        let formatters = Formatters::new(RecordFormatKind::Fasta);
        let r = read("r1", "ACGT");
        let bytes = formatters.format_record(&r);
        assert_eq!(bytes, b">r1\nACGT\n");
    }

    #[test]
    fn multiplexed_sink_expands_name_template() {
        let sink = SinkPath::Multiplexed("trimmed_{name}.fastq".to_string());
        assert_eq!(sink.resolve(Some("adapter1")), "trimmed_adapter1.fastq");
        assert_eq!(sink.resolve(None), "trimmed_unknown.fastq");
    }

    #[test]
    fn route_writes_merged_read_to_its_own_sink() {
        let dir = std::env::temp_dir().join(format!("trimcore-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("merged.fastq").to_string_lossy().to_string();

        let writers = Writers::new(&[]).unwrap();
        let mut formatters = Formatters::new(RecordFormatKind::Fastq);
        formatters.add_route(FilterKind::MergedRead, SinkPath::File(path.clone()), None);

        let mut pair = ReadPair::new(read("r", "ACGT"), read("r", "ACGT"));
        pair.merged = Some(read("r", "AC"));
        formatters.route(&writers, FilterKind::MergedRead, &pair, None).unwrap();
        writers.finalize().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "@r\nAC\n+\nII\n");
        std::fs::remove_dir_all(&dir).ok();
    }
}
