use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::Rng;

use crate::coordinator::proxy::ExecutorStubCache;
use crate::model::{ResultEnvelope, RouteStrategy, TriggerMessage, SUCCESS_CODE};

/// Virtual nodes per address on the consistent-hash ring, evening out the
/// distribution across a small address list.
const VIRTUAL_NODES: u32 = 100;

/// How long the rotating/ranking caches stay valid before being rebuilt.
const CACHE_VALID_HOURS: i64 = 24;

/// Pure address selection: `(strategy, trigger message, candidates) ->
/// chosen address`. Holds only the per-strategy bookkeeping (round-robin
/// counters, LRU/LFU tables), reset daily so stale jobs do not pin state
/// forever.
pub struct Router {
    round_counters: DashMap<i32, u64>,
    lru_ticks: DashMap<i32, HashMap<String, u64>>,
    lfu_counts: DashMap<i32, HashMap<String, u64>>,
    tick: AtomicU64,
    cache_expires: Mutex<DateTime<Utc>>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            round_counters: DashMap::new(),
            lru_ticks: DashMap::new(),
            lfu_counts: DashMap::new(),
            tick: AtomicU64::new(1),
            cache_expires: Mutex::new(Utc::now() + Duration::hours(CACHE_VALID_HOURS)),
        }
    }

    /// Select one address for this dispatch. An empty candidate list fails
    /// with no payload, short-circuiting dispatch before any remote call.
    /// `ShardingBroadcast` never selects a single address; the dispatcher
    /// fans out instead of routing.
    pub async fn route(
        &self,
        strategy: RouteStrategy,
        message: &TriggerMessage,
        addresses: &[String],
        stubs: &ExecutorStubCache,
    ) -> ResultEnvelope<String> {
        if addresses.is_empty() {
            return ResultEnvelope::fail_empty();
        }
        self.expire_caches();

        match strategy {
            RouteStrategy::First => ResultEnvelope::of(addresses[0].clone()),
            RouteStrategy::Last => ResultEnvelope::of(addresses[addresses.len() - 1].clone()),
            RouteStrategy::RoundRobin => self.route_round(message.job_id, addresses),
            RouteStrategy::Random => {
                let idx = rand::thread_rng().gen_range(0..addresses.len());
                ResultEnvelope::of(addresses[idx].clone())
            }
            RouteStrategy::ConsistentHash => Self::route_consistent_hash(message.job_id, addresses),
            RouteStrategy::LeastRecentlyUsed => self.route_lru(message.job_id, addresses),
            RouteStrategy::LeastFrequentlyUsed => self.route_lfu(message.job_id, addresses),
            RouteStrategy::Failover => self.route_failover(addresses, stubs).await,
            RouteStrategy::Busyover => self.route_busyover(message.job_id, addresses, stubs).await,
            RouteStrategy::ShardingBroadcast => {
                ResultEnvelope::fail("sharding broadcast does not select a single address")
            }
        }
    }

    /// Drop rotating/ranking state once it outlives the cache window.
    fn expire_caches(&self) {
        let mut expires = self.cache_expires.lock().unwrap();
        if Utc::now() < *expires {
            return;
        }
        self.round_counters.clear();
        self.lru_ticks.clear();
        self.lfu_counts.clear();
        *expires = Utc::now() + Duration::hours(CACHE_VALID_HOURS);
    }

    fn route_round(&self, job_id: i32, addresses: &[String]) -> ResultEnvelope<String> {
        let mut counter = self.round_counters.entry(job_id).or_insert(0);
        let idx = (*counter % addresses.len() as u64) as usize;
        *counter += 1;
        ResultEnvelope::of(addresses[idx].clone())
    }

    fn route_consistent_hash(job_id: i32, addresses: &[String]) -> ResultEnvelope<String> {
        let mut ring: BTreeMap<u64, &String> = BTreeMap::new();
        for address in addresses {
            for vn in 0..VIRTUAL_NODES {
                ring.insert(hash_key(&format!("SHARD-{address}-VN{vn}")), address);
            }
        }
        let job_hash = hash_key(&format!("JOB-{job_id}"));
        let chosen = ring
            .range(job_hash..)
            .next()
            .or_else(|| ring.iter().next())
            .map(|(_, address)| (*address).clone());
        match chosen {
            Some(address) => ResultEnvelope::of(address),
            // Unreachable with a non-empty list; kept as a structured failure.
            None => ResultEnvelope::fail("consistent hash ring is empty"),
        }
    }

    fn route_lru(&self, job_id: i32, addresses: &[String]) -> ResultEnvelope<String> {
        let mut ticks = self.lru_ticks.entry(job_id).or_default();
        // Drop addresses that left the group.
        ticks.retain(|address, _| addresses.contains(address));

        let (idx, _) = addresses
            .iter()
            .enumerate()
            .min_by_key(|(idx, address)| (ticks.get(*address).copied().unwrap_or(0), *idx))
            .expect("addresses checked non-empty");
        let chosen = addresses[idx].clone();
        let now = self.tick.fetch_add(1, Ordering::Relaxed);
        ticks.insert(chosen.clone(), now);
        ResultEnvelope::of(chosen)
    }

    fn route_lfu(&self, job_id: i32, addresses: &[String]) -> ResultEnvelope<String> {
        let mut counts = self.lfu_counts.entry(job_id).or_default();
        counts.retain(|address, _| addresses.contains(address));

        let (idx, _) = addresses
            .iter()
            .enumerate()
            .min_by_key(|(idx, address)| (counts.get(*address).copied().unwrap_or(0), *idx))
            .expect("addresses checked non-empty");
        let chosen = addresses[idx].clone();
        *counts.entry(chosen.clone()).or_insert(0) += 1;
        ResultEnvelope::of(chosen)
    }

    /// Probe each address with a liveness beat; return the first healthy
    /// one. The probe trace rides along in the envelope message.
    async fn route_failover(
        &self,
        addresses: &[String],
        stubs: &ExecutorStubCache,
    ) -> ResultEnvelope<String> {
        let mut trace = String::new();
        for address in addresses {
            let beat = probe(stubs, address, Probe::Beat).await;
            trace.push_str(&format!(
                "beat {address}: code={} msg={}\n",
                beat.code, beat.msg
            ));
            if beat.is_success() {
                return ResultEnvelope {
                    code: SUCCESS_CODE,
                    msg: trace,
                    content: Some(address.clone()),
                };
            }
        }
        ResultEnvelope::fail(trace)
    }

    /// Probe each address for idleness on this job; return the first one
    /// not currently busy.
    async fn route_busyover(
        &self,
        job_id: i32,
        addresses: &[String],
        stubs: &ExecutorStubCache,
    ) -> ResultEnvelope<String> {
        let mut trace = String::new();
        for address in addresses {
            let idle = probe(stubs, address, Probe::IdleBeat(job_id)).await;
            trace.push_str(&format!(
                "idle beat {address}: code={} msg={}\n",
                idle.code, idle.msg
            ));
            if idle.is_success() {
                return ResultEnvelope {
                    code: SUCCESS_CODE,
                    msg: trace,
                    content: Some(address.clone()),
                };
            }
        }
        ResultEnvelope::fail(trace)
    }
}

enum Probe {
    Beat,
    IdleBeat(i32),
}

/// A probe that cannot reach the worker counts as unhealthy/busy; it must
/// never abort routing.
async fn probe(stubs: &ExecutorStubCache, address: &str, kind: Probe) -> ResultEnvelope<String> {
    let Some(stub) = stubs.get_stub(address) else {
        return ResultEnvelope::fail("executor address is blank");
    };
    let outcome = match kind {
        Probe::Beat => stub.beat().await,
        Probe::IdleBeat(job_id) => stub.idle_beat(job_id).await,
    };
    match outcome {
        Ok(env) => env,
        Err(e) => ResultEnvelope::fail(e.to_string()),
    }
}

fn hash_key(key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}
