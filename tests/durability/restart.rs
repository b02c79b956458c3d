//! Clean restarts and restarts from a crash image.

use crate::common::*;

#[tokio::test]
async fn clean_restart_restores_features_and_index() {
    let mut node = TestNode::leader("n1").await;
    let h = node.handle();
    h.insert(point("a", 1.0, 1.0)).await.unwrap();
    h.insert(point("b", 5.0, 5.0)).await.unwrap();
    h.replace(point("a", 9.0, 9.0)).await.unwrap();

    node.restart().await;

    let stats = node.node().recovery_stats().clone();
    assert!(stats.checkpoint_loaded);
    assert_eq!(stats.checkpoint_features, 2);
    assert_eq!(stats.records_read, 0, "final checkpoint truncates the log");

    let h = node.handle();
    assert_eq!(ids(&h.search([8.0, 8.0], [10.0, 10.0]).await.unwrap()), vec!["a"]);
    assert!(h.search([0.0, 0.0], [2.0, 2.0]).await.unwrap().is_empty());
    assert_eq!(ids(&h.search([4.0, 4.0], [6.0, 6.0]).await.unwrap()), vec!["b"]);
    node.stop().await;
}

#[tokio::test]
async fn crash_without_checkpoint_replays_log() {
    let mut node = TestNode::leader("n1").await;
    let h = node.handle();
    h.insert(point("a", 1.0, 1.0)).await.unwrap();
    h.insert(point("b", 2.0, 2.0)).await.unwrap();
    h.delete("a").await.unwrap();

    let mut crashed = node.crash_copy().await;
    let stats = crashed.node().recovery_stats().clone();
    assert!(!stats.checkpoint_loaded);
    assert_eq!(stats.records_read, 3);
    assert_eq!(stats.records_applied, 3);

    let h = crashed.handle();
    assert_eq!(ids(&h.search([0.0, 0.0], [3.0, 3.0]).await.unwrap()), vec!["b"]);
    let s = h.stats().await.unwrap();
    assert_eq!(s.features, 1);
    assert_eq!(s.index_entries, 1);

    crashed.stop().await;
    node.stop().await;
}

#[tokio::test]
async fn crash_after_checkpoint_replays_only_suffix() {
    let mut node = TestNode::leader("n1").await;
    let h = node.handle();
    h.insert(point("a", 1.0, 1.0)).await.unwrap();
    h.insert(point("b", 2.0, 2.0)).await.unwrap();
    h.checkpoint().await.unwrap();
    assert_eq!(line_count(&node.log_path()), 0);

    h.insert(point("c", 3.0, 3.0)).await.unwrap();

    let mut crashed = node.crash_copy().await;
    let stats = crashed.node().recovery_stats().clone();
    assert!(stats.checkpoint_loaded);
    assert_eq!(stats.checkpoint_features, 2);
    assert_eq!(stats.records_applied, 1);

    let all = crashed.handle().search([0.0, 0.0], [10.0, 10.0]).await.unwrap();
    assert_eq!(ids(&all), vec!["a", "b", "c"]);

    crashed.stop().await;
    node.stop().await;
}

#[tokio::test]
async fn stale_log_behind_checkpoint_is_skipped() {
    // A crash between the checkpoint rename and the log truncation leaves
    // records the checkpoint already covers.
    let mut node = TestNode::leader("n1").await;
    let h = node.handle();
    h.insert(point("a", 1.0, 1.0)).await.unwrap();
    h.insert(point("b", 2.0, 2.0)).await.unwrap();
    let log_before = std::fs::read(node.log_path()).unwrap();
    h.checkpoint().await.unwrap();

    let copy = tempfile::tempdir().unwrap();
    copy_data_dir(node.dir.path(), copy.path());
    std::fs::write(copy.path().join("transactions.log"), log_before).unwrap();

    let mut restored = TestNode::start_in(copy, leader_config("n1")).await;
    let stats = restored.node().recovery_stats().clone();
    assert_eq!(stats.records_read, 2);
    assert_eq!(stats.records_skipped, 2);
    assert_eq!(restored.handle().stats().await.unwrap().features, 2);

    restored.stop().await;
    node.stop().await;
}

#[tokio::test]
async fn default_config_is_written_on_first_start() {
    let dir = tempfile::tempdir().unwrap();
    let node = Node::start(dir.path()).await.unwrap();
    assert!(dir.path().join("geostore.toml").exists());
    assert_eq!(node.config().role, Role::Leader);
    node.shutdown().await.unwrap();
}
