//! Data model shared by the coordinator and worker sides: the generic
//! result envelope, job metadata, the wire trigger message, the audit log
//! record, and the strategy enums.

pub mod envelope;
pub mod job;
pub mod log;
pub mod message;

pub use envelope::{ResultEnvelope, FAIL_CODE, SUCCESS_CODE};
pub use job::{
    AddressSource, BlockStrategy, GlueType, IncrementConfig, IncrementKind, JobGroup, JobInfo,
    RouteStrategy, TriggerType,
};
pub use log::TriggerLogRecord;
pub use message::{
    HandleCallbackParam, TriggerMessage, HANDLE_CODE_CANCELLED, HANDLE_CODE_TIMEOUT,
};
