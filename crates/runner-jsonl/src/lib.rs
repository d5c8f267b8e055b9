//! Append-only JSONL I/O for agent-run event streams.
//!
//! This crate owns two concerns: a UTC timestamp source (spec §3 invariant:
//! `ts` on every canonical event is a UTC ISO-8601 string with second
//! resolution) and a small, append-only reader/writer pair used for
//! `raw_events.jsonl`, `raw_events.ts.jsonl`, and `normalized_events.jsonl`.
//!
//! Writers never rewrite a line once flushed; readers tolerate (and report)
//! unparseable lines rather than aborting the whole stream, matching the
//! normalizer's "drop unparseable raw lines, emit an `error` event" rule
//! (spec §4.5).

#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Timelike, Utc};
use runner_core::CanonicalEvent;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Errors surfaced by JSONL I/O.
#[derive(Debug, thiserror::Error)]
pub enum JsonlError {
    /// Underlying filesystem I/O failure.
    #[error("jsonl i/o error: {0}")]
    Io(#[from] io::Error),
    /// A line failed to serialize to JSON.
    #[error("jsonl serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Returns the current UTC instant. The sole indirection point for "now" so
/// that callers needing determinism (tests) can avoid it; production code
/// calls this directly.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp as the second-resolution UTC ISO-8601 string the spec
/// requires on every canonical event (e.g. `2026-02-09T00:00:00+00:00`).
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.with_nanosecond(0).unwrap_or(ts).to_rfc3339()
}

/// Append-only JSONL writer. Each call to [`JsonlWriter::write`] serializes
/// one value and appends a single `\n`-terminated line; the file is opened
/// once in append mode and never rewritten (spec §5 atomicity rule).
pub struct JsonlWriter {
    inner: BufWriter<File>,
}

impl JsonlWriter {
    /// Open (creating if necessary) `path` for append-only JSONL writing.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, JsonlError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self { inner: BufWriter::new(file) })
    }

    /// Serialize `value` and append it as one line.
    pub fn write<T: Serialize>(&mut self, value: &T) -> Result<(), JsonlError> {
        let line = serde_json::to_string(value)?;
        self.inner.write_all(line.as_bytes())?;
        self.inner.write_all(b"\n")?;
        Ok(())
    }

    /// Append a pre-serialized line verbatim (trailing newline normalized).
    pub fn write_line(&mut self, line: &str) -> Result<(), JsonlError> {
        self.inner.write_all(line.trim_end_matches('\n').as_bytes())?;
        self.inner.write_all(b"\n")?;
        Ok(())
    }

    /// Flush buffered writes to disk.
    pub fn flush(&mut self) -> Result<(), JsonlError> {
        self.inner.flush()?;
        Ok(())
    }
}

/// Read every line of a JSONL file, deserializing each as `T`.
///
/// Unparseable lines are reported as `Err` entries in the returned vector
/// rather than aborting the read, so a caller can project "parseable lines"
/// while still accounting for dropped ones (spec §4.5).
pub fn read_jsonl<T: DeserializeOwned>(
    path: impl AsRef<Path>,
) -> Result<Vec<Result<T, (usize, String)>>, JsonlError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(&line) {
            Ok(value) => out.push(Ok(value)),
            Err(_) => out.push(Err((idx, line))),
        }
    }
    Ok(out)
}

/// Read raw lines of a JSONL file without attempting to deserialize them.
pub fn read_raw_lines(path: impl AsRef<Path>) -> Result<Vec<String>, JsonlError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if !line.trim().is_empty() {
            out.push(line);
        }
    }
    Ok(out)
}

/// A writer pair for the adapter output contract: `raw_events.jsonl` plus its
/// `raw_events.ts.jsonl` ingest-timestamp sidecar (spec §4.4, §6). Every
/// non-empty raw line gets exactly one sidecar entry, in the same order.
pub struct RawEventSink {
    raw: JsonlWriter,
    ts_sidecar: JsonlWriter,
}

#[derive(Debug, Clone, Serialize)]
struct TsSidecarEntry {
    ingest_ts: String,
}

impl RawEventSink {
    /// Create the raw-event writer and its timestamp sidecar alongside it.
    pub fn create(raw_path: impl AsRef<Path>, ts_sidecar_path: impl AsRef<Path>) -> Result<Self, JsonlError> {
        Ok(Self {
            raw: JsonlWriter::create(raw_path)?,
            ts_sidecar: JsonlWriter::create(ts_sidecar_path)?,
        })
    }

    /// Append one raw line (already-serialized JSON text from the child
    /// process) and its ingest timestamp sidecar entry.
    pub fn write_raw_line(&mut self, line: &str) -> Result<(), JsonlError> {
        if line.trim().is_empty() {
            return Ok(());
        }
        self.raw.write_line(line)?;
        self.ts_sidecar.write(&TsSidecarEntry { ingest_ts: format_ts(now_utc()) })?;
        Ok(())
    }

    /// Flush both underlying writers.
    pub fn flush(&mut self) -> Result<(), JsonlError> {
        self.raw.flush()?;
        self.ts_sidecar.flush()?;
        Ok(())
    }
}

/// Writer for `normalized_events.jsonl`: a thin wrapper over [`JsonlWriter`]
/// specialized to [`CanonicalEvent`] so normalizers cannot accidentally write
/// a non-canonical shape.
pub struct NormalizedEventWriter {
    inner: JsonlWriter,
    count: u64,
}

impl NormalizedEventWriter {
    /// Create the normalized-events writer at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, JsonlError> {
        Ok(Self { inner: JsonlWriter::create(path)?, count: 0 })
    }

    /// Append one canonical event, preserving the order it was observed in
    /// (spec §3 invariant: no reordering across tool boundaries).
    pub fn write_event(&mut self, event: &CanonicalEvent) -> Result<(), JsonlError> {
        self.inner.write(event)?;
        self.count += 1;
        Ok(())
    }

    /// Number of events written so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> Result<(), JsonlError> {
        self.inner.flush()
    }
}

/// Read back a `normalized_events.jsonl` file as a vector of [`CanonicalEvent`].
///
/// Unparseable lines are skipped (mirroring what the writer side already
/// guarantees never happens for a well-formed normalizer), keeping this a
/// pure, total function suitable for the "normalizing twice is byte-identical"
/// round-trip law (spec §8).
pub fn read_normalized_events(path: impl AsRef<Path>) -> Result<Vec<CanonicalEvent>, JsonlError> {
    Ok(read_jsonl::<CanonicalEvent>(path)?
        .into_iter()
        .filter_map(Result::ok)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use runner_core::EventKind;
    use tempfile::tempdir;

    #[test]
    fn writer_then_reader_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let mut w = JsonlWriter::create(&path).unwrap();
        w.write(&serde_json::json!({"a": 1})).unwrap();
        w.write(&serde_json::json!({"a": 2})).unwrap();
        w.flush().unwrap();

        let lines = read_raw_lines(&path).unwrap();
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn malformed_line_is_reported_not_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, "{\"a\":1}\nnot json\n{\"a\":2}\n").unwrap();
        let results: Vec<Result<serde_json::Value, (usize, String)>> = read_jsonl(&path).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }

    #[test]
    fn raw_event_sink_keeps_sidecar_aligned() {
        let dir = tempdir().unwrap();
        let raw = dir.path().join("raw_events.jsonl");
        let sidecar = dir.path().join("raw_events.ts.jsonl");
        let mut sink = RawEventSink::create(&raw, &sidecar).unwrap();
        sink.write_raw_line("{\"type\":\"message\"}").unwrap();
        sink.write_raw_line("").unwrap();
        sink.write_raw_line("{\"type\":\"tool_call\"}").unwrap();
        sink.flush().unwrap();

        let raw_lines = read_raw_lines(&raw).unwrap();
        let sidecar_lines = read_raw_lines(&sidecar).unwrap();
        assert_eq!(raw_lines.len(), 2);
        assert_eq!(sidecar_lines.len(), 2);
    }

    #[test]
    fn normalized_event_writer_preserves_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("normalized_events.jsonl");
        let mut w = NormalizedEventWriter::create(&path).unwrap();
        let ts = now_utc();
        for i in 0..5u32 {
            let ev = CanonicalEvent::new(ts, EventKind::RunCommand, serde_json::json!({"i": i}));
            w.write_event(&ev).unwrap();
        }
        w.flush().unwrap();
        let events = read_normalized_events(&path).unwrap();
        let seq: Vec<u32> = events
            .iter()
            .map(|e| e.data["i"].as_u64().unwrap() as u32)
            .collect();
        assert_eq!(seq, vec![0, 1, 2, 3, 4]);
    }
}
