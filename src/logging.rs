//! Logging setup for the CLI binary. Library code never installs a logger or
//! prints directly — it only emits `log::{debug,info,warn,error}` records;
//! the host process (here, `src/bin/fastfind.rs`) decides how those are
//! rendered.

/// Install `env_logger` reading `RUST_LOG` (defaulting to `info`), replacing
/// the teacher's `FASTFIND_PERF_LOG`-gated `eprintln!` gate. Perf-sensitive
/// messages (indexing/refresh/search timings) are logged at `debug!` under
/// the `fastfind::perf` target instead; run with
/// `RUST_LOG=fastfind::perf=debug` to see them.
pub fn init() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
