//! Policy data structures and in-memory management.

use once_cell::sync::OnceCell;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::Duration;

/// Per-command timeout used by the harvest harness unless overridden.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
/// Build timeout. A cold cargo build against a fresh MPI takes minutes.
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(600);
/// Package manager executable used unless overridden.
pub const DEFAULT_SPACK: &str = "spack";

/// Where per-version builds are kept between scans unless overridden.
pub fn default_build_cache() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("mpiscan")
}

static POLICY: OnceCell<RwLock<ScanPolicy>> = OnceCell::new();

fn policy_cell() -> &'static RwLock<ScanPolicy> {
    POLICY.get_or_init(|| RwLock::new(ScanPolicy::default()))
}

/// Process-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPolicy {
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub json_errors: bool,
    pub command_timeout: Duration,
    pub build_timeout: Duration,
    pub build_cache: PathBuf,
    pub spack: PathBuf,
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self {
            log_level: None,
            log_file: None,
            json_errors: false,
            command_timeout: DEFAULT_TIMEOUT,
            build_timeout: DEFAULT_BUILD_TIMEOUT,
            build_cache: default_build_cache(),
            spack: PathBuf::from(DEFAULT_SPACK),
        }
    }
}

impl ScanPolicy {
    pub(crate) fn apply_update(&mut self, update: PolicyUpdate) {
        if let Some(level) = update.log_level {
            self.log_level = match level.trim() {
                "" => None,
                other => Some(other.to_string()),
            };
        }
        if let Some(path) = update.log_file {
            self.log_file = match path {
                PolicyPath::Clear => None,
                PolicyPath::Value(pb) => Some(pb),
            };
        }
        if let Some(json_errors) = update.json_errors {
            self.json_errors = json_errors;
        }
        if let Some(timeout) = update.command_timeout {
            self.command_timeout = timeout;
        }
        if let Some(timeout) = update.build_timeout {
            self.build_timeout = timeout;
        }
        if let Some(cache) = update.build_cache {
            self.build_cache = match cache {
                PolicyPath::Clear => default_build_cache(),
                PolicyPath::Value(pb) => pb,
            };
        }
        if let Some(spack) = update.spack {
            self.spack = match spack {
                PolicyPath::Clear => PathBuf::from(DEFAULT_SPACK),
                PolicyPath::Value(pb) => pb,
            };
        }
    }
}

/// Internal helper representing path updates.
#[derive(Debug, Clone)]
pub(crate) enum PolicyPath {
    Clear,
    Value(PathBuf),
}

/// Mutation record for the policy.
#[derive(Debug, Default, Clone)]
pub(crate) struct PolicyUpdate {
    pub(crate) log_level: Option<String>,
    pub(crate) log_file: Option<PolicyPath>,
    pub(crate) json_errors: Option<bool>,
    pub(crate) command_timeout: Option<Duration>,
    pub(crate) build_timeout: Option<Duration>,
    pub(crate) build_cache: Option<PolicyPath>,
    pub(crate) spack: Option<PolicyPath>,
}

/// Snapshot the current policy.
pub fn policy_snapshot() -> ScanPolicy {
    match policy_cell().read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

/// Apply the provided update to the global policy and propagate logging changes.
pub(crate) fn apply_policy_update(update: PolicyUpdate) {
    let mut guard = match policy_cell().write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    guard.apply_update(update);
    crate::logging::apply_policy(&guard);
}

/// Serialises tests that mutate the global policy or the installed logger.
#[cfg(test)]
pub(crate) fn policy_test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
pub(crate) fn reset_policy_for_tests() {
    let mut guard = policy_cell().write().expect("policy lock poisoned");
    *guard = ScanPolicy::default();
    crate::logging::apply_policy(&guard);
}
