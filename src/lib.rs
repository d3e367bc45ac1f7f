//! Dispatch core of a distributed job-scheduling platform.
//!
//! A coordinator fires job triggers against a pool of remote workers; each
//! worker executes the job on an exclusive per-job task and reports the
//! outcome back asynchronously. The crate is split by role:
//!
//! - [`coordinator`]: trigger dispatch (routing, sharding, audit logging),
//!   the executor stub cache, and the callback/registry sinks.
//! - [`worker`]: the per-job thread registry, block-strategy handling,
//!   callback reporting, and registry heartbeat.
//! - [`rpc`]: tonic client stubs and services carrying the remote calls.
//!
//! The scan loop that decides *when* a job is due, and persistent storage of
//! job metadata, are external collaborators reached through the
//! [`coordinator::Repository`] trait and the public `trigger` entry point.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod rpc;
pub mod worker;

// Re-export generated protobuf types
pub mod proto {
    tonic::include_proto!("dispatch");
}

pub use error::{DispatchError, Result};

/// Initialize logging, filtered by `RUST_LOG` (defaults to `info`).
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}
