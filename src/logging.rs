//! Diagnostics: the JSON-lines logger and error trailers.

mod logger;
mod trailer;

pub use logger::{
    init_rust_logging_with_default, log_scan_error, set_active_target_spec, with_error_code,
};
pub use trailer::{emit_error_trailer, json_errors_enabled};

use crate::policy::ScanPolicy;

pub fn apply_policy(policy: &ScanPolicy) {
    logger::apply_logger_policy(policy);
    trailer::set_json_errors_enabled(policy.json_errors);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::policy_test_lock;
    use log::Level;
    use scan_errors::{enverr, ErrorCode};
    use serde_json::Value;

    fn ensure_logger() {
        init_rust_logging_with_default("mpiscan=debug");
    }

    #[test]
    fn file_records_carry_run_build_code_and_fields() {
        let _lock = policy_test_lock();
        ensure_logger();
        let tmp = tempfile::tempdir().expect("tempdir");
        let log_path = tmp.path().join("mpiscan.log");

        apply_policy(&ScanPolicy {
            log_level: Some("mpiscan=debug".to_string()),
            log_file: Some(log_path.clone()),
            ..ScanPolicy::default()
        });
        set_active_target_spec(Some("mpich@4.1.2".to_string()));
        with_error_code(ErrorCode::RuntimeInitFailed, || {
            log::error!(target: "mpiscan::tests", status = 16, runtime = "mpi"; "init refused");
        });
        log::logger().flush();
        set_active_target_spec(None);
        apply_policy(&ScanPolicy::default());

        let contents = std::fs::read_to_string(&log_path).expect("read log file");
        let record: Value = contents
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .find(|record| record["msg"] == "init refused")
            .expect("record in log file");

        assert_eq!(record["level"], "ERROR");
        assert_eq!(record["target"], "mpiscan::tests");
        assert_eq!(record["target_spec"], "mpich@4.1.2");
        assert_eq!(record["error_code"], "ERR_RUNTIME_INIT_FAILED");
        assert_eq!(record["kv"]["status"], 16);
        assert_eq!(record["kv"]["runtime"], "mpi");
        assert!(record["run_id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[test]
    fn invalid_level_keeps_the_previous_levels() {
        let _lock = policy_test_lock();
        ensure_logger();
        apply_policy(&ScanPolicy {
            log_level: Some("mpiscan::harvest=trace".to_string()),
            ..ScanPolicy::default()
        });
        apply_policy(&ScanPolicy {
            log_level: Some("mpiscan::harvest=chatty".to_string()),
            ..ScanPolicy::default()
        });

        assert!(log::log_enabled!(target: "mpiscan::harvest::spack", Level::Trace));
        apply_policy(&ScanPolicy {
            log_level: Some("mpiscan=debug".to_string()),
            ..ScanPolicy::default()
        });
    }

    #[test]
    fn trailer_is_one_json_line_with_ordered_context() {
        let _lock = policy_test_lock();
        set_active_target_spec(Some("openmpi@5.0.0".to_string()));
        let err = enverr!(ErrorCode::OutputUnavailable, "failed to write report")
            .with_context("io", "broken pipe")
            .with_context("bytes", "120");

        let mut out = Vec::new();
        trailer::write_error_trailer(&err, &mut out).expect("write trailer");
        set_active_target_spec(None);

        let text = String::from_utf8(out).expect("utf-8");
        assert_eq!(text.lines().count(), 1);
        assert!(text.ends_with('\n'));
        let trailer: Value = serde_json::from_str(&text).expect("json");
        assert_eq!(trailer["error_code"], "ERR_OUTPUT_UNAVAILABLE");
        assert_eq!(trailer["error_kind"], "Environment");
        assert_eq!(trailer["target_spec"], "openmpi@5.0.0");
        assert_eq!(trailer["message"], "failed to write report");
        let keys: Vec<&str> = trailer["context"]
            .as_object()
            .expect("context object")
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, ["io", "bytes"]);
    }

    #[test]
    fn json_errors_follow_the_policy() {
        let _lock = policy_test_lock();
        apply_policy(&ScanPolicy {
            json_errors: true,
            ..ScanPolicy::default()
        });
        assert!(json_errors_enabled());
        apply_policy(&ScanPolicy::default());
        assert!(!json_errors_enabled());
    }
}
