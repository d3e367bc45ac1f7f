//! Route strategy selection tests.


use dispatch_lite::coordinator::Router;
use dispatch_lite::model::{BlockStrategy, RouteStrategy};
use test_harness::{sample_message, scripted_cache, StubScript};

fn addresses(list: &[&str]) -> Vec<String> {
    list.iter().map(|a| a.to_string()).collect()
}

#[tokio::test]
async fn empty_address_list_fails_before_any_call() {
    let (stubs, factory) = scripted_cache();
    let router = Router::new();
    let message = sample_message(1, 1, BlockStrategy::SerialExecution);

    for strategy in [
        RouteStrategy::First,
        RouteStrategy::RoundRobin,
        RouteStrategy::Failover,
        RouteStrategy::ConsistentHash,
    ] {
        let routed = router.route(strategy, &message, &[], &stubs).await;
        assert!(!routed.is_success());
        assert!(routed.content.is_none());
    }
    assert!(factory.runs().is_empty());
}

#[tokio::test]
async fn first_and_last_pick_list_ends() {
    let (stubs, _) = scripted_cache();
    let router = Router::new();
    let message = sample_message(1, 1, BlockStrategy::SerialExecution);
    let list = addresses(&["a:1", "b:2", "c:3"]);

    let first = router
        .route(RouteStrategy::First, &message, &list, &stubs)
        .await;
    assert_eq!(first.content.as_deref(), Some("a:1"));

    let last = router
        .route(RouteStrategy::Last, &message, &list, &stubs)
        .await;
    assert_eq!(last.content.as_deref(), Some("c:3"));
}

#[tokio::test]
async fn round_robin_rotates_per_job_from_the_start() {
    let (stubs, _) = scripted_cache();
    let router = Router::new();
    let message = sample_message(1, 1, BlockStrategy::SerialExecution);
    let list = addresses(&["a:1", "b:2"]);

    let picks: Vec<String> = {
        let mut picks = Vec::new();
        for _ in 0..3 {
            let routed = router
                .route(RouteStrategy::RoundRobin, &message, &list, &stubs)
                .await;
            picks.push(routed.content.unwrap());
        }
        picks
    };
    assert_eq!(picks, vec!["a:1", "b:2", "a:1"]);

    // Counters are per job id.
    let other = sample_message(2, 2, BlockStrategy::SerialExecution);
    let routed = router
        .route(RouteStrategy::RoundRobin, &other, &list, &stubs)
        .await;
    assert_eq!(routed.content.as_deref(), Some("a:1"));
}

#[tokio::test]
async fn random_picks_a_member() {
    let (stubs, _) = scripted_cache();
    let router = Router::new();
    let message = sample_message(1, 1, BlockStrategy::SerialExecution);
    let list = addresses(&["a:1", "b:2", "c:3"]);

    for _ in 0..20 {
        let routed = router
            .route(RouteStrategy::Random, &message, &list, &stubs)
            .await;
        let chosen = routed.content.expect("random always selects");
        assert!(list.contains(&chosen));
    }
}

#[tokio::test]
async fn consistent_hash_is_stable_per_job() {
    let (stubs, _) = scripted_cache();
    let router = Router::new();
    let message = sample_message(7, 1, BlockStrategy::SerialExecution);
    let list = addresses(&["a:1", "b:2", "c:3"]);

    let baseline = router
        .route(RouteStrategy::ConsistentHash, &message, &list, &stubs)
        .await
        .content
        .expect("selection succeeds");
    for _ in 0..5 {
        let again = router
            .route(RouteStrategy::ConsistentHash, &message, &list, &stubs)
            .await
            .content
            .expect("selection succeeds");
        assert_eq!(again, baseline);
    }
    assert!(list.contains(&baseline));
}

#[tokio::test]
async fn least_recently_used_cycles_through_addresses() {
    let (stubs, _) = scripted_cache();
    let router = Router::new();
    let message = sample_message(1, 1, BlockStrategy::SerialExecution);
    let list = addresses(&["a:1", "b:2", "c:3"]);

    let mut picks = Vec::new();
    for _ in 0..4 {
        let routed = router
            .route(RouteStrategy::LeastRecentlyUsed, &message, &list, &stubs)
            .await;
        picks.push(routed.content.unwrap());
    }
    // Untouched addresses win in list order, then the oldest pick recycles.
    assert_eq!(picks, vec!["a:1", "b:2", "c:3", "a:1"]);
}

#[tokio::test]
async fn least_frequently_used_balances_counts() {
    let (stubs, _) = scripted_cache();
    let router = Router::new();
    let message = sample_message(1, 1, BlockStrategy::SerialExecution);
    let list = addresses(&["a:1", "b:2"]);

    let mut picks = Vec::new();
    for _ in 0..4 {
        let routed = router
            .route(RouteStrategy::LeastFrequentlyUsed, &message, &list, &stubs)
            .await;
        picks.push(routed.content.unwrap());
    }
    assert_eq!(picks, vec!["a:1", "b:2", "a:1", "b:2"]);
}

#[tokio::test]
async fn failover_skips_dead_addresses() {
    let (stubs, factory) = scripted_cache();
    factory.script(
        "dead:1",
        StubScript {
            beat_ok: false,
            ..Default::default()
        },
    );
    let router = Router::new();
    let message = sample_message(1, 1, BlockStrategy::SerialExecution);
    let list = addresses(&["dead:1", "live:2"]);

    let routed = router
        .route(RouteStrategy::Failover, &message, &list, &stubs)
        .await;
    assert!(routed.is_success());
    assert_eq!(routed.content.as_deref(), Some("live:2"));
    assert!(routed.msg.contains("dead:1"));
}

#[tokio::test]
async fn failover_fails_when_every_beat_fails() {
    let (stubs, factory) = scripted_cache();
    for address in ["a:1", "b:2"] {
        factory.script(
            address,
            StubScript {
                beat_ok: false,
                ..Default::default()
            },
        );
    }
    let router = Router::new();
    let message = sample_message(1, 1, BlockStrategy::SerialExecution);
    let list = addresses(&["a:1", "b:2"]);

    let routed = router
        .route(RouteStrategy::Failover, &message, &list, &stubs)
        .await;
    assert!(!routed.is_success());
    assert!(routed.content.is_none());
}

#[tokio::test]
async fn busyover_skips_busy_addresses() {
    let (stubs, factory) = scripted_cache();
    factory.script(
        "busy:1",
        StubScript {
            idle_ok: false,
            ..Default::default()
        },
    );
    let router = Router::new();
    let message = sample_message(1, 1, BlockStrategy::SerialExecution);
    let list = addresses(&["busy:1", "idle:2"]);

    let routed = router
        .route(RouteStrategy::Busyover, &message, &list, &stubs)
        .await;
    assert!(routed.is_success());
    assert_eq!(routed.content.as_deref(), Some("idle:2"));
}

#[tokio::test]
async fn sharding_broadcast_never_selects_an_address() {
    let (stubs, _) = scripted_cache();
    let router = Router::new();
    let message = sample_message(1, 1, BlockStrategy::SerialExecution);
    let list = addresses(&["a:1"]);

    let routed = router
        .route(RouteStrategy::ShardingBroadcast, &message, &list, &stubs)
        .await;
    assert!(!routed.is_success());
}
