//! Recovery from damaged data directories.

use crate::common::*;

#[tokio::test]
async fn torn_tail_is_dropped_and_log_stays_appendable() {
    let mut node = TestNode::leader("n1").await;
    let h = node.handle();
    h.insert(point("a", 1.0, 1.0)).await.unwrap();
    h.insert(point("b", 2.0, 2.0)).await.unwrap();

    let copy = tempfile::tempdir().unwrap();
    copy_data_dir(node.dir.path(), copy.path());
    append_bytes(
        &copy.path().join("transactions.log"),
        br#"{"action":"insert","origin_node":"n1","seq"#,
    );

    let mut restored = TestNode::start_in(copy, leader_config("n1")).await;
    let stats = restored.node().recovery_stats().clone();
    assert!(stats.torn_tail);
    assert_eq!(stats.records_applied, 2);

    // The next append must land on its own line
    let h2 = restored.handle();
    assert_eq!(h2.insert(point("c", 3.0, 3.0)).await.unwrap(), 3);
    let mut restored_again = restored.crash_copy().await;
    assert_eq!(restored_again.node().recovery_stats().records_applied, 3);
    assert_eq!(restored_again.node().recovery_stats().records_corrupt, 0);

    restored_again.stop().await;
    restored.stop().await;
    node.stop().await;
}

#[tokio::test]
async fn corrupt_record_in_the_middle_is_skipped() {
    let mut node = TestNode::leader("n1").await;
    let h = node.handle();
    h.insert(point("a", 1.0, 1.0)).await.unwrap();

    let copy = tempfile::tempdir().unwrap();
    copy_data_dir(node.dir.path(), copy.path());
    let log = copy.path().join("transactions.log");
    append_bytes(&log, b"not json at all\n");
    let good = Transaction::new(Action::Insert, "n1", 2, point("b", 2.0, 2.0));
    let mut line = serde_json::to_vec(&good).unwrap();
    line.push(b'\n');
    append_bytes(&log, &line);

    let mut restored = TestNode::start_in(copy, leader_config("n1")).await;
    let stats = restored.node().recovery_stats().clone();
    assert_eq!(stats.records_corrupt, 1);
    assert_eq!(stats.records_applied, 2);
    assert_eq!(restored.handle().stats().await.unwrap().features, 2);

    restored.stop().await;
    node.stop().await;
}

#[tokio::test]
async fn leftover_temp_checkpoint_is_removed() {
    let mut node = TestNode::leader("n1").await;
    node.handle().insert(point("a", 1.0, 1.0)).await.unwrap();

    let copy = tempfile::tempdir().unwrap();
    copy_data_dir(node.dir.path(), copy.path());
    std::fs::write(copy.path().join("checkpoint.json.tmp"), b"{\"feat").unwrap();

    let mut restored = TestNode::start_in(copy, leader_config("n1")).await;
    assert!(restored.node().recovery_stats().temp_checkpoint_removed);
    assert!(!restored.dir.path().join("checkpoint.json.tmp").exists());
    assert_eq!(restored.handle().stats().await.unwrap().features, 1);

    restored.stop().await;
    node.stop().await;
}

#[tokio::test]
async fn corrupt_checkpoint_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("checkpoint.json"), b"{ definitely not").unwrap();

    let result = Node::start_with_config(dir.path(), leader_config("n1")).await;
    assert!(matches!(result, Err(GeoError::Decode { .. })));
}
