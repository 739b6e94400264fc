//! Outcome reporting for filter operations.
//!
//! A [`Filter`](crate::filter::Filter) built with an observer in its
//! [`FilterOptions`](crate::filter::FilterOptions) reports every `derive_type` and `convert`
//! call: successes with the counters of the call, failures with a severity. Failures at or above
//! the configured threshold are reported a second time through [`FilterObserver::on_alert`].

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::error::FilterError;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (operation failed).
    Error,
    /// Critical error: a rule panicked or an engine invariant broke.
    Critical,
}

/// Which entry point produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Shape derivation.
    Derive,
    /// Value conversion.
    Convert,
}

/// Context about a filter call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterContext {
    /// Entry point that was called.
    pub operation: Operation,
    /// Rendering of the original shape the call was made with.
    pub shape: String,
}

/// Counters collected during one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    /// Record shapes derived (rules ran on their fields).
    pub shapes_derived: usize,
    /// Fields dropped by the rules.
    pub fields_removed: usize,
    /// Derivations answered from the memo.
    pub cache_hits: usize,
}

/// Observer interface for filter outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait FilterObserver: Send + Sync {
    /// Called when a call succeeds.
    fn on_success(&self, _ctx: &FilterContext, _stats: FilterStats) {}

    /// Called when a call fails.
    fn on_failure(&self, _ctx: &FilterContext, _severity: FilterSeverity, _error: &FilterError) {}

    /// Called when a failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &FilterContext, severity: FilterSeverity, error: &FilterError) {
        self.on_failure(ctx, severity, error)
    }
}

impl fmt::Display for FilterSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Derive => "derive",
            Self::Convert => "convert",
        })
    }
}

/// Forwards every callback to each of its observers, in registration order.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn FilterObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn FilterObserver>>) -> Self {
        Self { observers }
    }

    /// Append another observer.
    pub fn push(&mut self, observer: Arc<dyn FilterObserver>) {
        self.observers.push(observer);
    }

    fn each(&self, mut call: impl FnMut(&dyn FilterObserver)) {
        self.observers.iter().for_each(|o| call(o.as_ref()));
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompositeObserver({} observers)", self.observers.len())
    }
}

impl FilterObserver for CompositeObserver {
    fn on_success(&self, ctx: &FilterContext, stats: FilterStats) {
        self.each(|o| o.on_success(ctx, stats));
    }

    fn on_failure(&self, ctx: &FilterContext, severity: FilterSeverity, error: &FilterError) {
        self.each(|o| o.on_failure(ctx, severity, error));
    }

    fn on_alert(&self, ctx: &FilterContext, severity: FilterSeverity, error: &FilterError) {
        self.each(|o| o.on_alert(ctx, severity, error));
    }
}

/// Prints one line per event to stderr.
#[derive(Debug, Default)]
pub struct StdErrObserver;

/// `derive User: ok derived=1 removed=2 memo=0`
fn success_line(ctx: &FilterContext, stats: FilterStats) -> String {
    format!(
        "{} {}: ok derived={} removed={} memo={}",
        ctx.operation, ctx.shape, stats.shapes_derived, stats.fields_removed, stats.cache_hits
    )
}

/// `convert Holder: error fields=Tree at="field Tree" <message>`
fn failure_line(ctx: &FilterContext, severity: FilterSeverity, error: &FilterError) -> String {
    let mut line = format!("{} {}: {severity}", ctx.operation, ctx.shape);
    let fields = error.field_path();
    if !fields.is_empty() {
        line.push_str(&format!(" fields={}", fields.join(".")));
    }
    let path = error.path();
    if !path.is_empty() {
        let crumbs: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        line.push_str(&format!(" at=\"{}\"", crumbs.join(" / ")));
    }
    line.push(' ');
    line.push_str(&error.to_string());
    line
}

impl FilterObserver for StdErrObserver {
    fn on_success(&self, ctx: &FilterContext, stats: FilterStats) {
        eprintln!("[structfilter] {}", success_line(ctx, stats));
    }

    fn on_failure(&self, ctx: &FilterContext, severity: FilterSeverity, error: &FilterError) {
        eprintln!("[structfilter] {}", failure_line(ctx, severity, error));
    }

    fn on_alert(&self, ctx: &FilterContext, severity: FilterSeverity, error: &FilterError) {
        eprintln!("[structfilter][alert] {}", failure_line(ctx, severity, error));
    }
}

#[derive(Serialize)]
struct EventRecord<'a> {
    ts: u64,
    event: &'static str,
    #[serde(flatten)]
    ctx: &'a FilterContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    severity: Option<FilterSeverity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<FilterStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Appends filter events to a local log file, one JSON object per line.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append(&self, record: &EventRecord<'_>) {
        let Ok(line) = serde_json::to_string(record) else {
            return;
        };
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }

    fn failure(&self, event: &'static str, ctx: &FilterContext, severity: FilterSeverity, error: &FilterError) {
        self.append(&EventRecord {
            ts: unix_ts(),
            event,
            ctx,
            severity: Some(severity),
            stats: None,
            error: Some(error.to_string()),
        });
    }
}

impl FilterObserver for FileObserver {
    fn on_success(&self, ctx: &FilterContext, stats: FilterStats) {
        self.append(&EventRecord {
            ts: unix_ts(),
            event: "ok",
            ctx,
            severity: None,
            stats: Some(stats),
            error: None,
        });
    }

    fn on_failure(&self, ctx: &FilterContext, severity: FilterSeverity, error: &FilterError) {
        self.failure("fail", ctx, severity, error);
    }

    fn on_alert(&self, ctx: &FilterContext, severity: FilterSeverity, error: &FilterError) {
        self.failure("alert", ctx, severity, error);
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PathSegment;

    #[derive(Default)]
    struct Counting {
        failures: Mutex<usize>,
    }

    impl FilterObserver for Counting {
        fn on_failure(&self, _ctx: &FilterContext, _severity: FilterSeverity, _error: &FilterError) {
            *self.failures.lock().unwrap() += 1;
        }
    }

    fn ctx() -> FilterContext {
        FilterContext {
            operation: Operation::Derive,
            shape: "User".to_string(),
        }
    }

    #[test]
    fn severities_are_ordered() {
        assert!(FilterSeverity::Info < FilterSeverity::Warning);
        assert!(FilterSeverity::Warning < FilterSeverity::Error);
        assert!(FilterSeverity::Error < FilterSeverity::Critical);
    }

    #[test]
    fn alert_defaults_to_failure() {
        let counting = Counting::default();
        let err = FilterError::Depth { depth: 2 };
        counting.on_alert(&ctx(), FilterSeverity::Critical, &err);
        counting.on_success(&ctx(), FilterStats::default());
        assert_eq!(*counting.failures.lock().unwrap(), 1);
    }

    #[test]
    fn composite_fans_out() {
        let a = Arc::new(Counting::default());
        let b = Arc::new(Counting::default());
        let observers: Vec<Arc<dyn FilterObserver>> = vec![a.clone(), b.clone()];
        let composite = CompositeObserver::new(observers);
        composite.on_failure(&ctx(), FilterSeverity::Error, &FilterError::Depth { depth: 3 });
        assert_eq!(*a.failures.lock().unwrap(), 1);
        assert_eq!(*b.failures.lock().unwrap(), 1);
    }

    #[test]
    fn stderr_lines_carry_field_path_and_breadcrumbs() {
        let ok = success_line(
            &ctx(),
            FilterStats {
                shapes_derived: 1,
                fields_removed: 2,
                cache_hits: 0,
            },
        );
        assert_eq!(ok, "derive User: ok derived=1 removed=2 memo=0");

        let err = FilterError::Depth { depth: 2 }.under_field("Inner");
        assert_eq!(
            failure_line(&ctx(), FilterSeverity::Error, &err),
            "derive User: error fields=Inner Inner: at most one reference indirection allowed, got 2"
        );

        let err = FilterError::mismatch("i64", "bool").at(PathSegment::List(1));
        assert_eq!(
            failure_line(&ctx(), FilterSeverity::Critical, &err),
            "derive User: critical at=\"list[1]\" list[1]: value mismatch: expected i64, found bool"
        );
    }

    #[test]
    fn event_record_serializes_flat() {
        let ctx = ctx();
        let record = EventRecord {
            ts: 7,
            event: "ok",
            ctx: &ctx,
            severity: None,
            stats: Some(FilterStats {
                shapes_derived: 1,
                fields_removed: 2,
                cache_hits: 0,
            }),
            error: None,
        };
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["operation"], "derive");
        assert_eq!(json["shape"], "User");
        assert_eq!(json["stats"]["fields_removed"], 2);
        assert!(json.get("severity").is_none());
    }
}
