//! JSON-lines logger. Every record becomes one object tagged with the process
//! run id and the MPI build being scanned, if any.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use log::kv::{self, VisitSource};
use log::{LevelFilter, Log, Metadata, Record};
use once_cell::sync::{Lazy, OnceCell};
use scan_errors::{ErrorCode, ScanError};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::policy::ScanPolicy;

static RUN_ID: Lazy<String> = Lazy::new(|| Uuid::new_v4().to_string());
static TARGET_SPEC: RwLock<Option<String>> = RwLock::new(None);
static LOGGER: OnceCell<JsonLogger> = OnceCell::new();

thread_local! {
    static ERROR_CODE: Cell<Option<ErrorCode>> = const { Cell::new(None) };
}

/// Install the JSON-lines logger. `RUST_LOG` takes precedence over
/// `default_filter`; later calls are no-ops.
pub fn init_rust_logging_with_default(default_filter: &str) {
    if LOGGER.get().is_some() {
        return;
    }
    let defaults = Levels::parse(default_filter, LevelFilter::Warn)
        .unwrap_or_else(|| Levels::uniform(LevelFilter::Warn));
    let fallback = defaults.fallback;
    let initial = std::env::var("RUST_LOG")
        .ok()
        .and_then(|directives| Levels::parse(&directives, fallback))
        .unwrap_or(defaults);
    let max_level = initial.max_level();

    let logger = LOGGER.get_or_init(|| JsonLogger {
        levels: RwLock::new(initial),
        file: Mutex::new(None),
    });
    if log::set_logger(logger).is_ok() {
        log::set_max_level(max_level);
    }
}

pub(crate) fn apply_logger_policy(policy: &ScanPolicy) {
    if let Some(logger) = LOGGER.get() {
        logger.reconfigure(policy);
    }
}

/// Identifier shared by every log line and trailer of this process.
pub(crate) fn run_id() -> &'static str {
    &RUN_ID
}

/// Record which MPI build (`name@version`) subsequent log lines concern.
pub fn set_active_target_spec(spec: Option<String>) {
    *TARGET_SPEC
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner()) = spec;
}

pub(crate) fn active_target_spec() -> Option<String> {
    TARGET_SPEC
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

/// Tag every record logged by `op` on this thread with `code`.
pub fn with_error_code<F, R>(code: ErrorCode, op: F) -> R
where
    F: FnOnce() -> R,
{
    let previous = ERROR_CODE.with(|cell| cell.replace(Some(code)));
    let result = op();
    ERROR_CODE.with(|cell| cell.set(previous));
    result
}

pub fn log_scan_error(label: &str, err: &ScanError) {
    with_error_code(err.code, || {
        log::error!(target: "mpiscan::errors", "{label}: {err}");
    });
}

/// Per-module level directives in the `RUST_LOG` syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Levels {
    fallback: LevelFilter,
    modules: BTreeMap<String, LevelFilter>,
}

impl Levels {
    fn uniform(fallback: LevelFilter) -> Self {
        Self {
            fallback,
            modules: BTreeMap::new(),
        }
    }

    /// Parse comma separated `level` or `module=level` directives. `None` when
    /// any level is unknown.
    fn parse(directives: &str, fallback: LevelFilter) -> Option<Self> {
        let mut levels = Self::uniform(fallback);
        for directive in directives.split(',').map(str::trim) {
            if directive.is_empty() {
                continue;
            }
            match directive.split_once('=') {
                Some((module, level)) => {
                    levels
                        .modules
                        .insert(module.trim().to_string(), level.trim().parse().ok()?);
                }
                None => levels.fallback = directive.parse().ok()?,
            }
        }
        Some(levels)
    }

    /// Level of the closest configured `::` ancestor of `target`.
    fn level_for(&self, target: &str) -> LevelFilter {
        let mut module = target;
        loop {
            if let Some(level) = self.modules.get(module) {
                return *level;
            }
            match module.rfind("::") {
                Some(end) => module = &module[..end],
                None => return self.fallback,
            }
        }
    }

    fn max_level(&self) -> LevelFilter {
        self.modules
            .values()
            .fold(self.fallback, |max, level| max.max(*level))
    }
}

struct JsonLogger {
    levels: RwLock<Levels>,
    // `None` writes to stderr.
    file: Mutex<Option<File>>,
}

impl JsonLogger {
    fn reconfigure(&self, policy: &ScanPolicy) {
        if let Some(directives) = policy.log_level.as_deref() {
            let current = self.current_levels();
            match Levels::parse(directives, current.fallback) {
                Some(levels) => {
                    log::set_max_level(levels.max_level());
                    *self
                        .levels
                        .write()
                        .unwrap_or_else(|poisoned| poisoned.into_inner()) = levels;
                }
                None => with_error_code(ErrorCode::InvalidPolicyValue, || {
                    log::warn!(
                        target: "mpiscan::logging",
                        directives = directives;
                        "ignoring invalid log level"
                    );
                }),
            }
        }

        let file = policy.log_file.as_deref().and_then(|path| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|err| {
                    with_error_code(ErrorCode::Io, || {
                        log::warn!(
                            target: "mpiscan::logging",
                            "cannot open log file {}: {err}; logging to stderr",
                            path.display()
                        );
                    });
                })
                .ok()
        });
        *self.sink() = file;
    }

    fn current_levels(&self) -> Levels {
        self.levels
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn sink(&self) -> MutexGuard<'_, Option<File>> {
        self.file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_line(&self, line: &[u8]) {
        let mut sink = self.sink();
        let written = match sink.as_mut() {
            Some(file) => file.write_all(line),
            None => io::stderr().lock().write_all(line),
        };
        if written.is_err() && sink.is_some() {
            let _ = io::stderr().lock().write_all(line);
        }
    }
}

impl Log for JsonLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.levels
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .level_for(metadata.target())
            >= metadata.level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut line = record_json(record).to_string();
        line.push('\n');
        self.write_line(line.as_bytes());
    }

    fn flush(&self) {
        match self.sink().as_mut() {
            Some(file) => {
                let _ = file.flush();
            }
            None => {
                let _ = io::stderr().flush();
            }
        }
    }
}

fn record_json(record: &Record<'_>) -> Value {
    let mut entry = Map::new();
    entry.insert("ts_micros".into(), Value::from(timestamp_micros()));
    entry.insert("level".into(), record.level().as_str().into());
    entry.insert("target".into(), record.target().into());
    entry.insert("run_id".into(), run_id().into());
    if let Some(spec) = active_target_spec() {
        entry.insert("target_spec".into(), spec.into());
    }
    if let Some(code) = ERROR_CODE.with(Cell::get) {
        entry.insert("error_code".into(), code.as_str().into());
    }
    entry.insert("msg".into(), record.args().to_string().into());

    let mut fields = KvFields::default();
    let _ = record.key_values().visit(&mut fields);
    if !fields.0.is_empty() {
        entry.insert("kv".into(), Value::Object(fields.0));
    }
    Value::Object(entry)
}

fn timestamp_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_micros() as u64)
        .unwrap_or(0)
}

/// Structured `key = value` pairs of a record, numbers and flags kept typed.
#[derive(Default)]
struct KvFields(Map<String, Value>);

impl<'kvs> VisitSource<'kvs> for KvFields {
    fn visit_pair(&mut self, key: kv::Key<'kvs>, value: kv::Value<'kvs>) -> Result<(), kv::Error> {
        let json = value
            .to_i64()
            .map(Value::from)
            .or_else(|| value.to_u64().map(Value::from))
            .or_else(|| value.to_bool().map(Value::from))
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.0.insert(key.as_str().to_string(), json);
        Ok(())
    }
}
