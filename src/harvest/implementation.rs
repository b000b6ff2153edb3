//! MPI implementations under test and the probe build recipes run against them.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use scan_errors::{enverr, usage, ErrorCode};

use super::output::RunRecord;
use super::spack::PackageManager;
use crate::errors::Result;
use crate::logging::set_active_target_spec;

/// Name of the probe binary built by [`BuildRecipe::Cargo`].
pub const PROBE_BIN: &str = "inplacebottom";

const MANIFEST: &str = "Cargo.toml";

/// How the probe is compiled inside an MPI environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildRecipe {
    /// A C probe compiled with the implementation's `mpicc` wrapper.
    MpiCc { source: PathBuf },
    /// This crate's probe binary, built against the loaded MPI.
    Cargo { manifest: PathBuf },
}

impl BuildRecipe {
    /// Pick the recipe for `--source`: a Cargo manifest (or a directory holding
    /// one) or any other regular file, compiled with `mpicc`.
    pub fn from_source(path: &Path) -> Result<Self> {
        if path.is_dir() {
            let manifest = path.join(MANIFEST);
            if manifest.is_file() {
                return Ok(Self::Cargo { manifest });
            }
            return Err(
                usage!(ErrorCode::SourceMissing, "{} holds no {MANIFEST}", path.display())
                    .with_context("path", path.display().to_string()),
            );
        }
        if !path.is_file() {
            return Err(
                usage!(ErrorCode::SourceMissing, "{} is not a regular file", path.display())
                    .with_context("path", path.display().to_string()),
            );
        }
        if path.file_name().is_some_and(|name| name == MANIFEST) {
            Ok(Self::Cargo {
                manifest: path.to_path_buf(),
            })
        } else {
            Ok(Self::MpiCc {
                source: path.to_path_buf(),
            })
        }
    }

    /// Build command line and resulting executable for a build rooted at `workdir`.
    pub fn build_plan(&self, workdir: &Path) -> (Vec<String>, PathBuf) {
        match self {
            Self::MpiCc { source } => {
                let exe = workdir.join("probe");
                let command = vec![
                    "mpicc".to_string(),
                    source.display().to_string(),
                    "-o".to_string(),
                    exe.display().to_string(),
                ];
                (command, exe)
            }
            Self::Cargo { manifest } => {
                let command = [
                    "cargo",
                    "build",
                    "--release",
                    "--features",
                    "mpi",
                    "--bin",
                    PROBE_BIN,
                    "--manifest-path",
                ]
                .iter()
                .map(|arg| arg.to_string())
                .chain([
                    manifest.display().to_string(),
                    "--target-dir".to_string(),
                    workdir.display().to_string(),
                ])
                .collect();
                (command, workdir.join("release").join(PROBE_BIN))
            }
        }
    }
}

/// Limits and build location for [`Implementation::compile_and_run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSettings {
    /// Bound on compiling inside a loaded environment.
    pub build_timeout: Duration,
    /// Bound on one execution of the built binary.
    pub run_timeout: Duration,
    /// Builds for `name@version` live in `<build_cache>/<name>-<version>` and
    /// are reused by later scans.
    pub build_cache: PathBuf,
}

impl BuildSettings {
    pub fn from_policy() -> Self {
        let policy = crate::policy::policy_snapshot();
        Self {
            build_timeout: policy.build_timeout,
            run_timeout: policy.command_timeout,
            build_cache: policy.build_cache,
        }
    }

    fn workdir(&self, name: &str, version: &str) -> Result<PathBuf> {
        let dir = self.build_cache.join(format!("{name}-{version}"));
        fs::create_dir_all(&dir).map_err(|err| {
            enverr!(ErrorCode::Io, "failed to create build directory")
                .with_context("path", dir.display().to_string())
                .with_context("io", err.to_string())
        })?;
        Ok(dir)
    }
}

/// A package whose available versions have been resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Implementation {
    name: String,
    running_versions: Vec<String>,
}

impl Implementation {
    /// Resolve which versions of `name` can be run, installing missing ones
    /// when `allow_build` is set.
    pub fn discover<P: PackageManager + ?Sized>(
        pm: &P,
        name: &str,
        allow_build: bool,
    ) -> Result<Self> {
        log::info!(target: "mpiscan::harvest", "checking for {name}");
        if !pm.exists(name)? {
            return Err(
                usage!(ErrorCode::UnknownPackage, "no such package '{name}'")
                    .with_context("package", name),
            );
        }

        let mut running_versions = Vec::new();
        for version in pm.list_versions(name)? {
            let spec = format!("{name}@{version}");
            if pm.is_installed(&spec)? {
                log::info!(target: "mpiscan::harvest", "{spec} found");
                running_versions.push(version);
            } else if allow_build {
                log::info!(target: "mpiscan::harvest", "building {spec}");
                if pm.install(&spec)? {
                    running_versions.push(version);
                } else {
                    log::warn!(target: "mpiscan::harvest", "failed to install {spec}, ignoring");
                }
            } else {
                log::info!(target: "mpiscan::harvest", "{spec} skipped");
            }
        }

        Ok(Self {
            name: name.to_string(),
            running_versions,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn running_versions(&self) -> &[String] {
        &self.running_versions
    }

    /// Build and run the probe against every runnable version.
    pub fn compile_and_run<P: PackageManager + ?Sized>(
        &self,
        pm: &P,
        recipe: &BuildRecipe,
        settings: &BuildSettings,
    ) -> Result<Vec<RunRecord>> {
        let mut records = Vec::with_capacity(self.running_versions.len());
        for version in &self.running_versions {
            let spec = format!("{}@{version}", self.name);
            let _target = ActiveTarget::enter(&spec);
            let workdir = settings.workdir(&self.name, version)?;
            let (build, exe) = recipe.build_plan(&workdir);

            log::info!(
                target: "mpiscan::harvest",
                workdir = workdir.display().to_string().as_str();
                "compiling probe against {spec}"
            );
            let built = pm.run_loaded(&spec, &build, settings.build_timeout)?;
            if let Some(output) = built.output.as_deref().filter(|text| !text.is_empty()) {
                log::debug!(target: "mpiscan::harvest", "compilation output: {output}");
            }
            if built.status != 0 {
                log::warn!(
                    target: "mpiscan::harvest",
                    status = built.status;
                    "probe build failed for {spec}"
                );
                records.push(RunRecord::new(version.clone(), None, built.status));
                continue;
            }

            log::info!(target: "mpiscan::harvest", "running probe against {spec}");
            let ran = pm.run_loaded(&spec, &[exe.display().to_string()], settings.run_timeout)?;
            log::debug!(
                target: "mpiscan::harvest",
                status = ran.status;
                "execution output: {}",
                ran.output.as_deref().unwrap_or("<none>")
            );
            records.push(RunRecord::new(version.clone(), ran.output, ran.status));
        }
        Ok(records)
    }
}

/// Tags log records with the spec being scanned until dropped.
struct ActiveTarget;

impl ActiveTarget {
    fn enter(spec: &str) -> Self {
        set_active_target_spec(Some(spec.to_string()));
        Self
    }
}

impl Drop for ActiveTarget {
    fn drop(&mut self) {
        set_active_target_spec(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::command::{CommandOutcome, STATUS_TIMED_OUT};
    use crate::harvest::output::RunOutput;
    use std::cell::RefCell;
    use std::collections::{BTreeMap, BTreeSet};

    #[derive(Default)]
    struct FakeSpack {
        versions: BTreeMap<&'static str, Vec<&'static str>>,
        installed: RefCell<BTreeSet<String>>,
        installable: BTreeSet<&'static str>,
        broken_builds: BTreeSet<&'static str>,
        hanging_runs: BTreeSet<&'static str>,
        calls: RefCell<Vec<String>>,
        timeouts: RefCell<Vec<(String, Duration)>>,
    }

    impl PackageManager for FakeSpack {
        fn exists(&self, package: &str) -> Result<bool> {
            Ok(self.versions.contains_key(package))
        }

        fn list_versions(&self, package: &str) -> Result<Vec<String>> {
            Ok(self.versions[package].iter().map(|v| v.to_string()).collect())
        }

        fn is_installed(&self, spec: &str) -> Result<bool> {
            Ok(self.installed.borrow().contains(spec))
        }

        fn install(&self, spec: &str) -> Result<bool> {
            self.calls.borrow_mut().push(format!("install {spec}"));
            if self.installable.contains(spec) {
                self.installed.borrow_mut().insert(spec.to_string());
                return Ok(true);
            }
            Ok(false)
        }

        fn run_loaded(
            &self,
            spec: &str,
            command: &[String],
            timeout: Duration,
        ) -> Result<CommandOutcome> {
            self.calls
                .borrow_mut()
                .push(format!("{spec}: {}", command[0]));
            self.timeouts
                .borrow_mut()
                .push((command[0].clone(), timeout));
            if command[0] == "mpicc" || command[0] == "cargo" {
                if self.broken_builds.contains(spec) {
                    return Ok(CommandOutcome::failed(2));
                }
                return Ok(CommandOutcome {
                    output: Some(String::new()),
                    status: 0,
                });
            }
            if self.hanging_runs.contains(spec) {
                return Ok(CommandOutcome::failed(STATUS_TIMED_OUT));
            }
            Ok(CommandOutcome {
                output: Some(format!("{{\n\"spec\" : \"{spec}\",\n\"_\" : null}}\n")),
                status: 0,
            })
        }
    }

    fn fake() -> FakeSpack {
        let mut spack = FakeSpack::default();
        spack.versions.insert("mpich", vec!["3.4.3", "4.0.3", "4.1.2"]);
        spack.installed.borrow_mut().insert("mpich@4.1.2".to_string());
        spack.installable.insert("mpich@4.0.3");
        spack
    }

    fn settings(cache: &Path) -> BuildSettings {
        BuildSettings {
            build_timeout: Duration::from_secs(600),
            run_timeout: Duration::from_secs(1),
            build_cache: cache.to_path_buf(),
        }
    }

    #[test]
    fn unknown_packages_are_rejected() {
        let err = Implementation::discover(&fake(), "nompi", false).expect_err("unknown");
        assert_eq!(err.code, ErrorCode::UnknownPackage);
        assert_eq!(err.context_value("package"), Some("nompi"));
    }

    #[test]
    fn only_installed_versions_run_without_build() {
        let spack = fake();
        let mpich = Implementation::discover(&spack, "mpich", false).expect("discover");
        assert_eq!(mpich.running_versions(), ["4.1.2"]);
        assert!(spack.calls.borrow().is_empty());
    }

    #[test]
    fn build_installs_missing_versions_and_skips_failures() {
        let spack = fake();
        let mpich = Implementation::discover(&spack, "mpich", true).expect("discover");
        assert_eq!(mpich.running_versions(), ["4.0.3", "4.1.2"]);
        assert_eq!(
            *spack.calls.borrow(),
            ["install mpich@3.4.3", "install mpich@4.0.3"]
        );
    }

    #[test]
    fn failed_builds_record_status_without_output() {
        let mut spack = fake();
        spack.broken_builds.insert("mpich@4.0.3");
        spack.hanging_runs.insert("mpich@4.1.2");
        let mpich = Implementation::discover(&spack, "mpich", true).expect("discover");
        spack.calls.borrow_mut().clear();

        let recipe = BuildRecipe::MpiCc {
            source: PathBuf::from("probe.c"),
        };
        let cache = tempfile::tempdir().expect("tempdir");
        let records = mpich
            .compile_and_run(&spack, &recipe, &settings(cache.path()))
            .expect("run");

        assert_eq!(
            records,
            [
                RunRecord::new("4.0.3", None, 2),
                RunRecord::new("4.1.2", None, STATUS_TIMED_OUT),
            ]
        );
        assert_eq!(spack.calls.borrow().len(), 3);
    }

    #[test]
    fn successful_runs_keep_probe_output() {
        let spack = fake();
        let mpich = Implementation::discover(&spack, "mpich", false).expect("discover");
        let recipe = BuildRecipe::Cargo {
            manifest: PathBuf::from("Cargo.toml"),
        };
        let cache = tempfile::tempdir().expect("tempdir");
        let records = mpich
            .compile_and_run(&spack, &recipe, &settings(cache.path()))
            .expect("run");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ret, 0);
        assert_eq!(
            records[0].out,
            Some(RunOutput::Text(
                "{\n\"spec\" : \"mpich@4.1.2\",\n\"_\" : null}\n".to_string()
            ))
        );
        let calls = spack.calls.borrow();
        assert_eq!(calls[0], "mpich@4.1.2: cargo");
        assert!(calls[1].starts_with("mpich@4.1.2: ") && calls[1].ends_with(PROBE_BIN));
    }

    #[test]
    fn builds_get_the_longer_timeout_and_a_reused_directory() {
        let spack = fake();
        let mpich = Implementation::discover(&spack, "mpich", false).expect("discover");
        let recipe = BuildRecipe::Cargo {
            manifest: PathBuf::from("Cargo.toml"),
        };
        let cache = tempfile::tempdir().expect("tempdir");
        let settings = settings(cache.path());

        for _ in 0..2 {
            mpich
                .compile_and_run(&spack, &recipe, &settings)
                .expect("run");
        }

        let workdir = cache.path().join("mpich-4.1.2");
        assert!(workdir.is_dir());
        let timeouts = spack.timeouts.borrow();
        assert_eq!(timeouts.len(), 4);
        for pair in timeouts.chunks(2) {
            assert_eq!(pair[0], ("cargo".to_string(), settings.build_timeout));
            assert_eq!(
                pair[1],
                (
                    workdir.join("release").join(PROBE_BIN).display().to_string(),
                    settings.run_timeout
                )
            );
        }
    }

    #[test]
    fn unusable_cache_is_an_environment_error() {
        let spack = fake();
        let mpich = Implementation::discover(&spack, "mpich", false).expect("discover");
        let file = tempfile::NamedTempFile::new().expect("tempfile");
        let recipe = BuildRecipe::MpiCc {
            source: PathBuf::from("probe.c"),
        };

        let err = mpich
            .compile_and_run(&spack, &recipe, &settings(file.path()))
            .expect_err("cache is a file");
        assert_eq!(err.code, ErrorCode::Io);
        assert_eq!(err.kind, scan_errors::ErrorKind::Environment);
        assert!(spack.calls.borrow().is_empty());
    }

    #[test]
    fn recipes_follow_the_source_kind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("inplacebottom.c");
        std::fs::write(&source, "int main(void) { return 0; }\n").expect("write source");
        assert_eq!(
            BuildRecipe::from_source(&source).expect("c source"),
            BuildRecipe::MpiCc {
                source: source.clone()
            }
        );

        let err = BuildRecipe::from_source(dir.path()).expect_err("no manifest");
        assert_eq!(err.code, ErrorCode::SourceMissing);

        let manifest = dir.path().join(MANIFEST);
        std::fs::write(&manifest, "[package]\n").expect("write manifest");
        assert_eq!(
            BuildRecipe::from_source(dir.path()).expect("crate dir"),
            BuildRecipe::Cargo {
                manifest: manifest.clone()
            }
        );
        assert_eq!(
            BuildRecipe::from_source(&manifest).expect("manifest"),
            BuildRecipe::Cargo { manifest }
        );

        let err = BuildRecipe::from_source(&dir.path().join("missing.c")).expect_err("missing");
        assert_eq!(err.code, ErrorCode::SourceMissing);
        assert_eq!(err.kind, scan_errors::ErrorKind::Usage);
    }

    #[test]
    fn cargo_plan_builds_the_probe_binary() {
        let recipe = BuildRecipe::Cargo {
            manifest: PathBuf::from("/src/mpiscan/Cargo.toml"),
        };
        let (command, exe) = recipe.build_plan(Path::new("/tmp/build"));
        assert_eq!(
            command.join(" "),
            "cargo build --release --features mpi --bin inplacebottom \
             --manifest-path /src/mpiscan/Cargo.toml --target-dir /tmp/build"
        );
        assert_eq!(exe, Path::new("/tmp/build/release/inplacebottom"));
    }
}
