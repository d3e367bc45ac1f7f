//! Coordinator side: turns a job definition into a routed, shard-aware
//! remote invocation with deterministic block/retry semantics and full
//! audit logging.
//!
//! # Components
//!
//! - [`TriggerDispatcher`]: load job, resolve sharding, persist a log
//!   record, route, invoke, record the outcome.
//! - [`Router`]: pure address selection over the group's address list.
//! - [`ExecutorStubCache`]: memoized remote-invocation stubs per address.
//! - [`CallbackSink`] / [`WorkerRegistry`]: sinks for worker callbacks and
//!   heartbeat registrations.
//! - [`Repository`]: external persistence of job/group/log records.

pub mod callback;
pub mod dispatcher;
pub mod proxy;
pub mod registry;
pub mod repository;
pub mod router;

pub use callback::CallbackSink;
pub use dispatcher::TriggerDispatcher;
pub use proxy::{ExecutorStubCache, ExecutorStubFactory, RemoteExecutor};
pub use registry::WorkerRegistry;
pub use repository::{InMemoryRepository, Repository};
pub use router::Router;
