//! Environment variable parsing for policy overrides.

use crate::policy::model::{apply_policy_update, PolicyPath, PolicyUpdate};
use scan_errors::{usage, ErrorCode, ScanResult};
use std::env;
use std::time::Duration;

/// Environment variable controlling log level for the mpiscan crate.
pub const ENV_LOG_LEVEL: &str = "MPISCAN_LOG_LEVEL";
/// Environment variable pointing to a log destination file.
pub const ENV_LOG_FILE: &str = "MPISCAN_LOG_FILE";
/// Environment variable enabling JSON error trailers on stderr.
pub const ENV_JSON_ERRORS: &str = "MPISCAN_JSON_ERRORS";
/// Environment variable bounding each external build/run command, in seconds.
pub const ENV_TIMEOUT_SECS: &str = "MPISCAN_TIMEOUT_SECS";
/// Environment variable bounding each build, in seconds.
pub const ENV_BUILD_TIMEOUT_SECS: &str = "MPISCAN_BUILD_TIMEOUT_SECS";
/// Environment variable naming the directory that keeps builds between scans.
pub const ENV_CACHE_DIR: &str = "MPISCAN_CACHE_DIR";
/// Environment variable naming the spack executable.
pub const ENV_SPACK: &str = "MPISCAN_SPACK";

/// Load policy overrides from environment variables.
pub fn configure_policy_from_env() -> ScanResult<()> {
    let mut update = PolicyUpdate::default();

    if let Ok(value) = env::var(ENV_LOG_LEVEL) {
        update.log_level = Some(value);
    }

    if let Ok(value) = env::var(ENV_LOG_FILE) {
        update.log_file = Some(parse_path(&value));
    }

    if let Ok(value) = env::var(ENV_JSON_ERRORS) {
        update.json_errors = Some(parse_bool(&value)?);
    }

    if let Ok(value) = env::var(ENV_TIMEOUT_SECS) {
        update.command_timeout = Some(parse_timeout(ENV_TIMEOUT_SECS, &value)?);
    }

    if let Ok(value) = env::var(ENV_BUILD_TIMEOUT_SECS) {
        update.build_timeout = Some(parse_timeout(ENV_BUILD_TIMEOUT_SECS, &value)?);
    }

    if let Ok(value) = env::var(ENV_CACHE_DIR) {
        update.build_cache = Some(parse_path(&value));
    }

    if let Ok(value) = env::var(ENV_SPACK) {
        update.spack = Some(parse_path(&value));
    }

    apply_policy_update(update);
    Ok(())
}

fn parse_path(value: &str) -> PolicyPath {
    if value.trim().is_empty() {
        PolicyPath::Clear
    } else {
        PolicyPath::Value(value.into())
    }
}

fn parse_bool(value: &str) -> ScanResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" => Ok(true),
        "0" | "false" | "f" | "no" | "n" => Ok(false),
        other => Err(usage!(
            ErrorCode::InvalidPolicyValue,
            "invalid boolean value '{}' (expected true/false)",
            other
        )),
    }
}

fn parse_timeout(variable: &str, value: &str) -> ScanResult<Duration> {
    let trimmed = value.trim();
    match trimmed.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(usage!(
            ErrorCode::InvalidPolicyValue,
            "invalid {} value '{}' (expected a positive number of seconds)",
            variable,
            trimmed
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::model::{policy_snapshot, policy_test_lock, reset_policy_for_tests};
    use std::path::Path;
    use std::sync::MutexGuard;

    #[test]
    fn configure_policy_from_env_updates_fields() {
        let _guard = EnvGuard::acquire();
        reset_policy_for_tests();
        let tmp = tempfile::tempdir().expect("tempdir");
        let log_path = tmp.path().join("mpiscan.log");
        env::set_var(ENV_LOG_LEVEL, "info");
        env::set_var(ENV_LOG_FILE, &log_path);
        env::set_var(ENV_JSON_ERRORS, "yes");
        env::set_var(ENV_TIMEOUT_SECS, "45");
        env::set_var(ENV_BUILD_TIMEOUT_SECS, "1800");
        env::set_var(ENV_CACHE_DIR, tmp.path());
        env::set_var(ENV_SPACK, "/opt/spack/bin/spack");

        configure_policy_from_env().expect("configure from env");
        let snap = policy_snapshot();
        assert_eq!(snap.log_level.as_deref(), Some("info"));
        assert_eq!(snap.log_file.as_deref(), Some(log_path.as_path()));
        assert!(snap.json_errors);
        assert_eq!(snap.command_timeout, Duration::from_secs(45));
        assert_eq!(snap.build_timeout, Duration::from_secs(1800));
        assert_eq!(snap.build_cache, tmp.path());
        assert_eq!(snap.spack, Path::new("/opt/spack/bin/spack"));
        reset_policy_for_tests();
    }

    #[test]
    fn configure_policy_from_env_rejects_invalid_boolean() {
        let _guard = EnvGuard::acquire();
        reset_policy_for_tests();
        env::set_var(ENV_JSON_ERRORS, "sometimes");

        let err = configure_policy_from_env().expect_err("invalid bool should error");
        assert_eq!(err.code, ErrorCode::InvalidPolicyValue);
        reset_policy_for_tests();
    }

    #[test]
    fn configure_policy_from_env_rejects_zero_timeout() {
        let _guard = EnvGuard::acquire();
        reset_policy_for_tests();
        env::set_var(ENV_TIMEOUT_SECS, "0");

        let err = configure_policy_from_env().expect_err("zero timeout should error");
        assert_eq!(err.code, ErrorCode::InvalidPolicyValue);
        assert!(err.message().contains(ENV_TIMEOUT_SECS));
        reset_policy_for_tests();
    }

    #[test]
    fn build_timeout_errors_name_their_variable() {
        let _guard = EnvGuard::acquire();
        reset_policy_for_tests();
        env::set_var(ENV_BUILD_TIMEOUT_SECS, "ten minutes");

        let err = configure_policy_from_env().expect_err("bad build timeout should error");
        assert_eq!(err.code, ErrorCode::InvalidPolicyValue);
        assert!(err.message().contains(ENV_BUILD_TIMEOUT_SECS));
        reset_policy_for_tests();
    }

    #[test]
    fn parse_timeout_accepts_padding() {
        assert_eq!(
            parse_timeout(ENV_TIMEOUT_SECS, " 7 ").unwrap(),
            Duration::from_secs(7)
        );
        assert!(parse_timeout(ENV_TIMEOUT_SECS, "-3").is_err());
        assert!(parse_timeout(ENV_TIMEOUT_SECS, "soon").is_err());
    }

    #[test]
    fn parse_bool_rejects_invalid() {
        assert!(parse_bool("N").map(|v| !v).unwrap_or(false));
        assert!(parse_bool("sometimes").is_err());
    }

    struct EnvGuard {
        _lock: MutexGuard<'static, ()>,
    }

    impl EnvGuard {
        fn acquire() -> Self {
            Self {
                _lock: policy_test_lock(),
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for key in [
                ENV_LOG_LEVEL,
                ENV_LOG_FILE,
                ENV_JSON_ERRORS,
                ENV_TIMEOUT_SECS,
                ENV_BUILD_TIMEOUT_SECS,
                ENV_CACHE_DIR,
                ENV_SPACK,
            ] {
                env::remove_var(key);
            }
        }
    }
}
