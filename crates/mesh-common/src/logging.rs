// Copyright (c) 2024 Omerta Mesh Contributors

//! Mesh logging conventions.
//!
//! All crates log through `tracing`; this module only documents the
//! convention and offers a convenience initializer for the CLI/daemon
//! collaborators that embed this core. Level is controlled via the
//! `RUST_LOG` environment variable.
//!
//! Convention: lifecycle transitions (task started/stopped, state machine
//! transitions) are logged at `info`; protocol chatter (frame send/receive)
//! at `debug`; per-datagram detail at `trace`; dropped/unauthenticated
//! traffic and recoverable failures at `warn`; unrecoverable startup
//! failures at `error`.

use tracing_subscriber::EnvFilter;

/// Install a `tracing-subscriber` that reads its filter from `RUST_LOG`,
/// defaulting to `info` when unset. Safe to call more than once; only the
/// first call takes effect.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
