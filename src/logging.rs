//! Structured logging for the event ledger.
//!
//! Every record is one JSON line on stdout:
//! `{ts, run_id, seq, lvl, component, event, msg, data}`.
//! When `LOG_DIR` is set the same lines are also appended to
//! `$LOG_DIR/<run_id>/events.jsonl` (trace/debug go to `trace.jsonl`).
//!
//! Filtering is controlled by `LOG_LEVEL` (default `info`) and
//! `LOG_DOMAINS` (comma-separated, default all).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use crate::model::{Bar, DomainEvent};

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains (categories for filtering)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Bar,       // Incoming bars
    Diff,      // Per-layer event batches
    Recursion, // Level engines opening and closing
    Audit,     // Invariant violations
    Search,    // Nested divergence search
    Replay,    // Replay session stepping and seeking
    System,    // Pipeline lifecycle, resets
    Profile,   // Performance profiling
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Bar => "bar",
            Domain::Diff => "diff",
            Domain::Recursion => "recursion",
            Domain::Audit => "audit",
            Domain::Search => "search",
            Domain::Replay => "replay",
            Domain::System => "system",
            Domain::Profile => "profile",
        }
    }

    pub fn is_enabled(&self) -> bool {
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Sequence counter and run sink
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_ID: OnceLock<String> = OnceLock::new();
static RUN_SINK: OnceLock<Option<RunSink>> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

fn run_id() -> &'static str {
    RUN_ID.get_or_init(|| {
        std::env::var("RUN_ID").unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()))
    })
}

/// Per-run jsonl files.
#[derive(Debug)]
pub struct RunSink {
    dir: PathBuf,
    events: Mutex<BufWriter<File>>,
    trace: Mutex<BufWriter<File>>,
}

impl RunSink {
    /// Create `<base>/<run_id>/` with a manifest and empty log files.
    pub fn open(base: &Path, run_id: &str) -> io::Result<Self> {
        let dir = base.join(run_id);
        create_dir_all(&dir)?;
        std::fs::write(
            dir.join("manifest.json"),
            json!({
                "run_id": run_id,
                "ts": ts_now(),
                "pid": process::id(),
                "log_dir": dir.to_string_lossy(),
            })
            .to_string(),
        )?;
        let open = |name: &str| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(name))
                .map(BufWriter::new)
        };
        Ok(Self {
            events: Mutex::new(open("events.jsonl")?),
            trace: Mutex::new(open("trace.jsonl")?),
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write(&self, level: Level, line: &str) {
        let writer = match level {
            Level::Trace | Level::Debug => &self.trace,
            _ => &self.events,
        };
        if let Ok(mut w) = writer.lock() {
            let _ = writeln!(w, "{}", line);
        }
    }

    pub fn flush(&self) {
        for writer in [&self.events, &self.trace] {
            if let Ok(mut w) = writer.lock() {
                let _ = w.flush();
            }
        }
    }
}

fn run_sink() -> Option<&'static RunSink> {
    RUN_SINK
        .get_or_init(|| {
            let base = std::env::var("LOG_DIR").ok()?;
            match RunSink::open(Path::new(&base), run_id()) {
                Ok(sink) => Some(sink),
                Err(err) => {
                    eprintln!("[log] failed to open run sink: {}", err);
                    None
                }
            }
        })
        .as_ref()
}

/// Flush file sinks. No-op when `LOG_DIR` is unset.
pub fn flush() {
    if let Some(sink) = run_sink() {
        sink.flush();
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let min_level = Level::from_env();
    if level < min_level || !domain.is_enabled() {
        return;
    }
    let line = format_record(level, domain.as_str(), event, fields);
    if let Some(sink) = run_sink() {
        sink.write(level, &line);
    }
    println!("{}", line);
}

fn format_record(level: Level, component: &str, event: &str, mut fields: Map<String, Value>) -> String {
    let msg = fields.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(run_id()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for key in ["stream_id", "level_id", "bar_index"] {
        if let Some(value) = fields.remove(key) {
            entry.insert(key.to_string(), value);
        }
    }
    entry.insert("data".to_string(), Value::Object(fields));
    Value::Object(entry).to_string()
}

// =============================================================================
// Domain-Specific Logging Helpers
// =============================================================================

pub fn log_bar(stream_id: &str, bar_index: u64, bar: &Bar) {
    log(
        Level::Trace,
        Domain::Bar,
        "bar",
        obj(&[
            ("stream_id", v_str(stream_id)),
            ("bar_index", json!(bar_index)),
            ("bar_ts", json!(bar.ts)),
            ("o", v_num(bar.open)),
            ("h", v_num(bar.high)),
            ("l", v_num(bar.low)),
            ("c", v_num(bar.close)),
        ]),
    );
}

/// One engine's event batch, summarised by kind.
pub fn log_batch(layer: &str, level_id: u32, bar_index: u64, events: &[DomainEvent]) {
    if events.is_empty() {
        return;
    }
    let mut counts: BTreeMap<&'static str, u64> = BTreeMap::new();
    for ev in events {
        *counts.entry(ev.kind().as_str()).or_default() += 1;
    }
    log(
        Level::Debug,
        Domain::Diff,
        "batch",
        obj(&[
            ("layer", v_str(layer)),
            ("level_id", json!(level_id)),
            ("bar_index", json!(bar_index)),
            ("events", json!(events.len())),
            ("kinds", json!(counts)),
        ]),
    );
}

pub fn log_violation(
    stream_id: &str,
    rule: &str,
    reason: &str,
    level_id: u32,
    bar_index: u64,
    fingerprint: &str,
) {
    log(
        Level::Warn,
        Domain::Audit,
        "invariant_violation",
        obj(&[
            ("stream_id", v_str(stream_id)),
            ("level_id", json!(level_id)),
            ("bar_index", json!(bar_index)),
            ("rule", v_str(rule)),
            ("msg", v_str(reason)),
            ("fingerprint", v_str(fingerprint)),
        ]),
    );
}

/// A recursion level opened (first engine use) or went dormant.
pub fn log_level_change(event: &str, level_id: u32, bar_index: u64, settled_moves: usize) {
    log(
        Level::Info,
        Domain::Recursion,
        event,
        obj(&[
            ("level_id", json!(level_id)),
            ("bar_index", json!(bar_index)),
            ("settled_moves", json!(settled_moves)),
        ]),
    );
}

pub fn log_search(top_level: u32, links: usize, narrowest: Option<(usize, usize)>) {
    log(
        Level::Info,
        Domain::Search,
        "nested_search",
        obj(&[
            ("level_id", json!(top_level)),
            ("links", json!(links)),
            (
                "bar_range",
                narrowest
                    .map(|(start, end)| json!([start, end]))
                    .unwrap_or(Value::Null),
            ),
        ]),
    );
}

pub fn log_replay(event: &str, session_id: &str, cursor: usize, total_bars: usize) {
    log(
        Level::Info,
        Domain::Replay,
        event,
        obj(&[
            ("session_id", v_str(session_id)),
            ("cursor", json!(cursor)),
            ("total_bars", json!(total_bars)),
        ]),
    );
}

pub fn log_system(event: &str, stream_id: &str, msg: &str) {
    log(
        Level::Info,
        Domain::System,
        event,
        obj(&[("stream_id", v_str(stream_id)), ("msg", v_str(msg))]),
    );
}

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Profiling Scope
// =============================================================================

/// Emits elapsed time at trace level on drop.
pub struct ProfileScope {
    label: &'static str,
    context: Map<String, Value>,
    started: Instant,
}

impl ProfileScope {
    pub fn new(label: &'static str) -> Self {
        Self::with_context(label, &[])
    }

    pub fn with_context(label: &'static str, fields: &[(&str, Value)]) -> Self {
        Self {
            label,
            context: obj(fields),
            started: Instant::now(),
        }
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let mut fields = std::mem::take(&mut self.context);
        fields.insert("label".to_string(), v_str(self.label));
        fields.insert("elapsed_ms".to_string(), v_num(elapsed_ms));
        log(Level::Trace, Domain::Profile, "profile", fields);
    }
}

// =============================================================================
// Tests
// =============================================================================
