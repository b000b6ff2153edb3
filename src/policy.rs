//! Runtime configuration policy for the probe and the harvest harness.

mod env;
mod model;

pub use env::{
    configure_policy_from_env, ENV_BUILD_TIMEOUT_SECS, ENV_CACHE_DIR, ENV_JSON_ERRORS,
    ENV_LOG_FILE, ENV_LOG_LEVEL, ENV_SPACK, ENV_TIMEOUT_SECS,
};
pub use model::{
    default_build_cache, policy_snapshot, ScanPolicy, DEFAULT_BUILD_TIMEOUT, DEFAULT_SPACK,
    DEFAULT_TIMEOUT,
};

#[cfg(test)]
pub(crate) use model::policy_test_lock;
