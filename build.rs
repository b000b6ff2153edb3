fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    #[cfg(feature = "mpi")]
    compile_sentinel_shim();
}

/// The sentinels are preprocessor macros, so their type and value are only
/// visible to a C compiler that includes the implementation's `mpi.h`.
#[cfg(feature = "mpi")]
fn compile_sentinel_shim() {
    const SHIM: &str = "src/runtime/mpi_sentinels.c";
    println!("cargo:rerun-if-changed={SHIM}");
    println!("cargo:rerun-if-env-changed=MPICC");

    let mpicc = std::env::var("MPICC").unwrap_or_else(|_| "mpicc".to_string());
    cc::Build::new()
        .compiler(mpicc)
        .file(SHIM)
        .compile("mpiscan_sentinels");
}
