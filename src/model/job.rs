use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Policy for a trigger arriving while a previous execution of the same job
/// is still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockStrategy {
    SerialExecution,
    DiscardLater,
    CoverEarlier,
}

impl BlockStrategy {
    /// Parse a stored strategy name, falling back to `default` when the
    /// name is unrecognized.
    pub fn parse(name: &str, default: BlockStrategy) -> BlockStrategy {
        match name {
            "SERIAL_EXECUTION" => BlockStrategy::SerialExecution,
            "DISCARD_LATER" => BlockStrategy::DiscardLater,
            "COVER_EARLIER" => BlockStrategy::CoverEarlier,
            _ => default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BlockStrategy::SerialExecution => "SERIAL_EXECUTION",
            BlockStrategy::DiscardLater => "DISCARD_LATER",
            BlockStrategy::CoverEarlier => "COVER_EARLIER",
        }
    }
}

impl std::fmt::Display for BlockStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named routing strategy selecting the target address for a dispatch.
///
/// `ShardingBroadcast` is not itself an address selector: it signals the
/// dispatcher to fan out to every address with per-index parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteStrategy {
    First,
    Last,
    RoundRobin,
    Random,
    ConsistentHash,
    LeastRecentlyUsed,
    LeastFrequentlyUsed,
    Failover,
    Busyover,
    ShardingBroadcast,
}

impl RouteStrategy {
    pub fn parse(name: &str, default: RouteStrategy) -> RouteStrategy {
        match name {
            "FIRST" => RouteStrategy::First,
            "LAST" => RouteStrategy::Last,
            "ROUND" => RouteStrategy::RoundRobin,
            "RANDOM" => RouteStrategy::Random,
            "CONSISTENT_HASH" => RouteStrategy::ConsistentHash,
            "LEAST_RECENTLY_USED" => RouteStrategy::LeastRecentlyUsed,
            "LEAST_FREQUENTLY_USED" => RouteStrategy::LeastFrequentlyUsed,
            "FAILOVER" => RouteStrategy::Failover,
            "BUSYOVER" => RouteStrategy::Busyover,
            "SHARDING_BROADCAST" => RouteStrategy::ShardingBroadcast,
            _ => default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteStrategy::First => "FIRST",
            RouteStrategy::Last => "LAST",
            RouteStrategy::RoundRobin => "ROUND",
            RouteStrategy::Random => "RANDOM",
            RouteStrategy::ConsistentHash => "CONSISTENT_HASH",
            RouteStrategy::LeastRecentlyUsed => "LEAST_RECENTLY_USED",
            RouteStrategy::LeastFrequentlyUsed => "LEAST_FREQUENTLY_USED",
            RouteStrategy::Failover => "FAILOVER",
            RouteStrategy::Busyover => "BUSYOVER",
            RouteStrategy::ShardingBroadcast => "SHARDING_BROADCAST",
        }
    }
}

impl std::fmt::Display for RouteStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the job body is sourced on the worker side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlueType {
    /// A handler registered by name in the worker's handler registry.
    Handler,
    /// A shell script carried in the trigger message's glue source.
    Shell,
}

impl GlueType {
    pub fn parse(name: &str, default: GlueType) -> GlueType {
        match name {
            "HANDLER" => GlueType::Handler,
            "SHELL" => GlueType::Shell,
            _ => default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GlueType::Handler => "HANDLER",
            GlueType::Shell => "SHELL",
        }
    }
}

impl std::fmt::Display for GlueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What fired this trigger; feeds the audit trace only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerType {
    Manual,
    Cron,
    Retry,
    Parent,
    Api,
    Misfire,
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TriggerType::Manual => "manual",
            TriggerType::Cron => "cron",
            TriggerType::Retry => "retry",
            TriggerType::Parent => "parent",
            TriggerType::Api => "api",
            TriggerType::Misfire => "misfire",
        };
        f.write_str(name)
    }
}

/// Incremental-extraction mode for jobs that pull data by watermark instead
/// of full scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncrementKind {
    Id,
    Time,
    Partition,
}

impl IncrementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncrementKind::Id => "ID",
            IncrementKind::Time => "TIME",
            IncrementKind::Partition => "PARTITION",
        }
    }

    pub fn parse(name: &str) -> Option<IncrementKind> {
        match name {
            "ID" => Some(IncrementKind::Id),
            "TIME" => Some(IncrementKind::Time),
            "PARTITION" => Some(IncrementKind::Partition),
            _ => None,
        }
    }
}

/// Increment bounds configuration attached to a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncrementConfig {
    pub kind: IncrementKind,
    /// Configured start of the id window (`kind == Id`).
    pub start_id: Option<i64>,
    /// Configured start of the time window (`kind == Time`).
    pub start_time: Option<DateTime<Utc>>,
    /// Source table probed for the max-id watermark (`kind == Id`).
    pub reader_table: Option<String>,
    pub primary_key: Option<String>,
    /// Partition descriptor propagated verbatim (`kind == Partition`).
    pub partition_info: Option<String>,
    pub replace_param: Option<String>,
    pub replace_param_type: Option<String>,
}

/// Immutable job snapshot, loaded fresh from the repository on every trigger
/// so that edits take effect on the next fire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: i32,
    pub group_id: i32,
    pub executor_handler: String,
    pub executor_params: String,
    pub block_strategy: BlockStrategy,
    pub route_strategy: RouteStrategy,
    pub fail_retry_count: i32,
    pub timeout_secs: i32,
    pub glue_type: GlueType,
    pub glue_source: String,
    pub glue_update_time: DateTime<Utc>,
    pub increment: Option<IncrementConfig>,
    /// Runtime parameter string handed through to the worker process.
    pub runtime_param: String,
}

/// Whether a group's address list is maintained by hand or discovered from
/// worker heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressSource {
    Manual,
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobGroup {
    pub id: i32,
    pub app_name: String,
    /// Ordered worker addresses; may be empty.
    pub addresses: Vec<String>,
    pub address_source: AddressSource,
}
