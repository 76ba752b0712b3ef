mod common;

use common::{collect_until_final, draft, engine, fast_config, ScriptedQuotes};
use dexflow::domain::LifecycleStatus;
use dexflow::platform::JobState;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_order_walks_full_lifecycle_in_order() {
    let quotes = Arc::new(ScriptedQuotes::new(Duration::from_millis(5)));
    let engine = engine(&fast_config(10, 3, 20), quotes.clone());
    let pool = engine.spawn_workers();

    let (_, mut rx) = engine.broadcaster.channel("ord-1");
    let admission = engine.gate.submit(draft("ord-1")).await.unwrap();
    assert_eq!(admission.job_id, "ord-1");

    let events = collect_until_final(&mut rx).await;
    let statuses: Vec<_> = events.iter().map(|(_, e)| e.status).collect();
    assert_eq!(statuses, LifecycleStatus::SUCCESS_PATH.to_vec());

    let building = &events[2].1;
    assert_eq!(building.detail("selectedVenue").unwrap(), "meteora");
    assert_eq!(building.detail("price").unwrap(), 149.8);

    let confirmed = &events[4].1;
    assert_eq!(confirmed.detail("venue").unwrap(), "meteora");
    let tx = confirmed.detail("syntheticTxId").unwrap().as_str().unwrap();
    assert!(tx.starts_with("0x"));

    pool.shutdown().await;

    let job = engine.queue.job("ord-1").await.unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.attempts_made, 1);
    assert_eq!(quotes.calls(), 1);
    assert_eq!(engine.metrics.snapshot().orders_confirmed, 1);
}

#[tokio::test]
async fn test_subscribers_only_see_their_own_order() {
    let quotes = Arc::new(ScriptedQuotes::new(Duration::from_millis(5)));
    let engine = engine(&fast_config(10, 3, 20), quotes);
    let pool = engine.spawn_workers();

    let (_, mut rx_a) = engine.broadcaster.channel("ord-a");
    let (_, mut rx_b) = engine.broadcaster.channel("ord-b");
    let (_, mut rx_c) = engine.broadcaster.channel("ord-c");
    for id in ["ord-a", "ord-b", "ord-c", "ord-unwatched"] {
        engine.gate.submit(draft(id)).await.unwrap();
    }

    for (id, rx) in [("ord-a", &mut rx_a), ("ord-b", &mut rx_b), ("ord-c", &mut rx_c)] {
        let events = collect_until_final(rx).await;
        assert_eq!(events.len(), 5);
        assert!(events.iter().all(|(_, e)| e.order_id == id));
    }

    pool.shutdown().await;
    // unwatched order still runs; its events are dropped
    assert_eq!(engine.metrics.snapshot().orders_confirmed, 4);
    assert!(engine.broadcaster.stats().dropped >= 5);
}

#[tokio::test]
async fn test_late_subscriber_sees_no_history() {
    let quotes = Arc::new(ScriptedQuotes::new(Duration::from_millis(1)));
    let engine = engine(&fast_config(10, 3, 20), quotes);
    let pool = engine.spawn_workers();

    let (_, mut early) = engine.broadcaster.channel("ord-late");
    engine.gate.submit(draft("ord-late")).await.unwrap();
    collect_until_final(&mut early).await;

    let (_, mut late) = engine.broadcaster.channel("ord-late");
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(late.try_recv().is_err());

    pool.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_pass() {
    let quotes = Arc::new(ScriptedQuotes::new(Duration::from_millis(50)));
    let engine = engine(&fast_config(2, 3, 20), quotes);
    let pool = engine.spawn_workers();

    let (_, mut rx) = engine.broadcaster.channel("ord-drain");
    engine.gate.submit(draft("ord-drain")).await.unwrap();

    // wait until the pass is mid-routing, then stop the pool
    let first = rx.recv().await.unwrap();
    assert_eq!(first.status, LifecycleStatus::Pending);
    pool.shutdown().await;

    let job = engine.queue.job("ord-drain").await.unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(engine.metrics.in_flight(), 0);
}
