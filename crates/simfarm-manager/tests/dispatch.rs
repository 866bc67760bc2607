mod common;

use common::{config, eventually, Farm};
use simfarm_core::{archive, Simulation};
use simfarm_manager::{DispatchOrder, LoopState};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const HOUR_MS: u64 = 3_600_000;

#[tokio::test]
async fn test_concurrent_jobs_use_distinct_workers() {
    let mut farm = Farm::new(config(DispatchOrder::Fifo, HOUR_MS));
    for name in ["node-a", "node-b", "node-c"] {
        farm.add_slave(name, Duration::from_millis(200), None).await;
    }
    farm.manager.start_engine();

    farm.manager.submit(farm.job("alu", None)).await.unwrap();
    farm.manager.submit(farm.job("fpu", None)).await.unwrap();
    farm.completions(2).await;

    let slaves: HashSet<String> = farm.log.lock().iter().map(|(s, _)| s.clone()).collect();
    assert_eq!(slaves.len(), 2);

    let pool = farm.manager.pool();
    eventually(|| pool.busy_count() == 0 && pool.idle_count() + 1 == 3).await;
    assert_eq!(pool.registered_count(), 3);
    assert_eq!(farm.manager.metrics().jobs("completed"), 2);
    farm.manager.shutdown();
}

#[tokio::test]
async fn test_results_are_unpacked_and_analyzed() {
    let mut farm = Farm::new(config(DispatchOrder::Fifo, HOUR_MS));
    farm.add_slave("node-a", Duration::ZERO, None).await;
    farm.manager.start_engine();

    farm.manager.submit(farm.job("uart", None)).await.unwrap();
    farm.completions(1).await;

    let result_dirs: Vec<_> = std::fs::read_dir(farm.result_root())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(result_dirs.len(), 1);
    let dir = &result_dirs[0];
    assert!(dir.file_name().unwrap().to_string_lossy().starts_with("uart-"));

    let files: Vec<String> = archive::list_files(dir)
        .unwrap()
        .into_iter()
        .map(|(path, _)| path)
        .collect();
    assert!(files.contains(&"tb.sv".to_string()));
    assert!(files.contains(&"summary.json".to_string()));
    // The transferred bundle is removed once unpacked.
    assert!(!files.iter().any(|f| f.ends_with(".bundle")));

    let pool = farm.manager.pool();
    eventually(|| pool.busy_count() == 0).await;
    farm.manager.shutdown();
}

#[tokio::test]
async fn test_rejected_job_is_never_dispatched() {
    let mut farm = Farm::new(config(DispatchOrder::Fifo, HOUR_MS));
    farm.add_slave("node-a", Duration::ZERO, None).await;
    farm.manager.start_engine();

    let broken = farm.job(
        "broken",
        Some("printf 'tb.sv:3: error: bad token\\ntb.sv:9: error: missing semicolon\\n'; exit 1"),
    );
    farm.manager.submit(broken).await.unwrap();
    farm.manager.submit(farm.job("clean", Some("true"))).await.unwrap();

    let done = farm.completions(1).await;
    assert!(done[0].ends_with("clean"));

    let ran = farm.ran();
    assert_eq!(ran.len(), 1);
    assert!(ran[0].ends_with("clean"));
    assert_eq!(farm.manager.metrics().jobs("rejected"), 1);
    assert_eq!(farm.manager.metrics().jobs("dispatched"), 1);
    farm.manager.shutdown();
}

async fn run_two_queued_jobs(order: DispatchOrder) -> Vec<String> {
    let mut farm = Farm::new(config(order, HOUR_MS));
    farm.manager.start_engine();

    // No worker yet, so both jobs pile up in the dispatch queue.
    farm.manager.submit(farm.job("j1", None)).await.unwrap();
    farm.manager.submit(farm.job("j2", None)).await.unwrap();
    let manager = farm.manager.clone();
    eventually(|| manager.stats().dispatch_queue_depth == 2).await;

    farm.add_slave("node-a", Duration::ZERO, None).await;
    farm.completions(2).await;
    farm.manager.shutdown();
    farm.ran()
}

#[tokio::test]
async fn test_lifo_runs_newest_job_first() {
    let ran = run_two_queued_jobs(DispatchOrder::Lifo).await;
    assert_eq!(ran.len(), 2);
    assert!(ran[0].ends_with("j2"));
    assert!(ran[1].ends_with("j1"));
}

#[tokio::test]
async fn test_fifo_runs_oldest_job_first() {
    let ran = run_two_queued_jobs(DispatchOrder::Fifo).await;
    assert_eq!(ran.len(), 2);
    assert!(ran[0].ends_with("j1"));
    assert!(ran[1].ends_with("j2"));
}

#[tokio::test]
async fn test_failed_job_releases_its_worker() {
    let mut farm = Farm::new(config(DispatchOrder::Fifo, HOUR_MS));
    farm.add_slave("node-a", Duration::ZERO, Some("bad")).await;
    farm.manager.start_engine();

    farm.manager.submit(farm.job("bad", None)).await.unwrap();
    farm.manager.submit(farm.job("good", None)).await.unwrap();
    let done = farm.completions(2).await;
    assert!(done[0].ends_with("bad"));
    assert!(done[1].ends_with("good"));

    let metrics = farm.manager.metrics();
    eventually(|| metrics.jobs("completed") == 1 && metrics.jobs("failed") == 1).await;

    let pool = farm.manager.pool();
    eventually(|| pool.busy_count() == 0).await;
    assert_eq!(pool.registered_count(), 1);
    farm.manager.shutdown();
}

#[tokio::test]
async fn test_idle_worker_receives_keepalives() {
    let farm = Farm::new(config(DispatchOrder::Fifo, 50));
    let slave = farm.add_slave("node-a", Duration::ZERO, None).await;
    farm.manager.start_engine();

    eventually(|| slave.keepalives_received() >= 3).await;
    assert!(farm.manager.metrics().keepalives_sent.get() >= 3);
    assert_eq!(farm.manager.pool().registered_count(), 1);
    farm.manager.shutdown();
}

#[tokio::test]
async fn test_shutdown_stops_engine_loops() {
    let farm = Farm::new(config(DispatchOrder::Fifo, 50));
    farm.add_slave("node-a", Duration::ZERO, None).await;
    farm.manager.start_engine();
    farm.manager.shutdown();

    let manager = farm.manager.clone();
    eventually(|| {
        let states = manager.loop_states();
        ["triage", "dispatch", "heartbeat"]
            .iter()
            .all(|name| states[*name] == simfarm_manager::LoopState::Stopped)
    })
    .await;

    // Triage is gone, so new work is refused.
    assert!(farm.manager.try_submit(farm.job("late", None)).is_err());
}

/// Submit `failing` then `good` to a one-worker farm. The failing job must
/// still report completion and leave the worker reusable.
async fn fail_then_recover(farm: &mut Farm, failing: Arc<dyn Simulation>) {
    farm.manager.submit(failing).await.unwrap();
    farm.manager.submit(farm.job("good", None)).await.unwrap();
    let done = farm.completions(2).await;
    assert!(done[1].ends_with("good"));

    let metrics = farm.manager.metrics();
    eventually(|| metrics.jobs("completed") == 1 && metrics.jobs("failed") == 1).await;
    let pool = farm.manager.pool();
    eventually(|| pool.busy_count() == 0).await;
    assert_eq!(pool.registered_count(), 1);
    farm.manager.shutdown();
}

#[tokio::test]
async fn test_packaging_failure_completes_job() {
    let mut farm = Farm::new(config(DispatchOrder::Fifo, HOUR_MS));
    farm.add_slave("node-a", Duration::ZERO, None).await;
    farm.manager.start_engine();

    let missing = farm.job("gone", None);
    std::fs::remove_dir_all(farm.source_dir("gone")).unwrap();
    fail_then_recover(&mut farm, missing).await;

    // Nothing was shipped for the job that could not be packaged.
    assert_eq!(farm.ran().len(), 1);
}

#[tokio::test]
async fn test_result_dir_failure_keeps_worker_in_step() {
    let mut farm = Farm::new(config(DispatchOrder::Fifo, HOUR_MS));
    farm.add_slave("node-a", Duration::ZERO, None).await;
    farm.manager.start_engine();

    let blocker = farm.workspace.path().join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();
    let unwritable = farm.job_in("a", None, blocker.join("results"));
    farm.manager.submit(unwritable).await.unwrap();
    farm.manager.submit(farm.job("b", None)).await.unwrap();
    farm.manager.submit(farm.job("c", None)).await.unwrap();

    let done = farm.completions(3).await;
    assert!(done[0].ends_with("a"));
    assert!(done[1].ends_with("b"));
    assert!(done[2].ends_with("c"));

    let metrics = farm.manager.metrics();
    eventually(|| metrics.jobs("completed") == 2 && metrics.jobs("failed") == 1).await;
    let pool = farm.manager.pool();
    eventually(|| pool.busy_count() == 0).await;
    assert_eq!(pool.registered_count(), 1);
    assert_eq!(farm.ran().len(), 3);
    farm.manager.shutdown();
}

#[tokio::test]
async fn test_analysis_failure_completes_job() {
    let mut farm = Farm::new(config(DispatchOrder::Fifo, HOUR_MS));
    farm.add_slave("node-a", Duration::ZERO, None).await;
    farm.manager.start_engine();

    // An empty source echoes back an empty result, which analysis rejects.
    let empty = farm.job("empty", None);
    std::fs::remove_file(farm.source_dir("empty").join("tb.sv")).unwrap();
    fail_then_recover(&mut farm, empty).await;
    assert_eq!(farm.ran().len(), 2);
}

#[tokio::test]
async fn test_lost_held_worker_is_replaced() {
    let mut farm = Farm::new(config(DispatchOrder::Fifo, 50));
    farm.manager.start_engine();

    let ghost = farm.add_ghost("ghost").await;
    let pool = farm.manager.pool();
    eventually(|| pool.idle_count() == 0 && pool.registered_count() == 1).await;
    drop(ghost);
    eventually(|| pool.registered_count() == 0).await;

    farm.add_slave("node-b", Duration::ZERO, None).await;
    farm.manager.submit(farm.job("after", None)).await.unwrap();
    let done = farm.completions(1).await;
    assert!(done[0].ends_with("after"));

    eventually(|| pool.busy_count() == 0).await;
    assert_eq!(pool.registered_count(), 1);
    assert_eq!(farm.log.lock()[0].0, "node-b");
    let states = farm.manager.loop_states();
    assert_eq!(states["dispatch"], LoopState::Running);
    assert_eq!(states["heartbeat"], LoopState::Running);
    farm.manager.shutdown();
}
