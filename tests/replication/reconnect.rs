//! Reconnects and backlog replay.

use crate::common::*;

fn leader_streaming_to(addr: std::net::SocketAddr) -> NodeConfig {
    let mut config = leader_config("leader");
    config.replication.peers = vec![peer("f1", addr)];
    config
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn late_follower_receives_backlog() {
    let addr = free_port();
    let mut leader = TestNode::start(leader_streaming_to(addr)).await;

    let h = leader.handle();
    h.insert(point("a", 1.0, 1.0)).await.unwrap();
    h.insert(point("b", 2.0, 2.0)).await.unwrap();
    h.delete("a").await.unwrap();

    let mut f1 = TestNode::start(follower_config("f1", addr)).await;
    let stats = wait_for_clock(&f1.handle(), "leader", 3).await;
    assert_eq!(stats.features, 1);
    assert_eq!(
        ids(&f1.handle().search([0.0, 0.0], [3.0, 3.0]).await.unwrap()),
        vec!["b"]
    );

    leader.stop().await;
    f1.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restarted_follower_catches_up_without_duplicates() {
    let mut f1 = TestNode::follower("f1").await;
    let mut leader = TestNode::start(leader_streaming_to(f1.listen_addr())).await;

    let h = leader.handle();
    h.insert(point("a", 1.0, 1.0)).await.unwrap();
    wait_for_clock(&f1.handle(), "leader", 1).await;

    f1.pin_listen_addr();
    f1.stop().await;
    h.insert(point("b", 2.0, 2.0)).await.unwrap();
    h.replace(point("a", 7.0, 7.0)).await.unwrap();
    f1.resume().await;

    // The backlog re-sends seq 1; the follower already has it
    let stats = wait_for_clock(&f1.handle(), "leader", 3).await;
    assert_eq!(stats.features, 2);
    assert_eq!(stats.index_entries, 2);
    assert_eq!(
        ids(&f1.handle().search([6.0, 6.0], [8.0, 8.0]).await.unwrap()),
        vec!["a"]
    );

    wait_for_peers(leader.node(), |peers| peers[0].connects >= 2).await;

    leader.stop().await;
    f1.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restarted_leader_keeps_numbering_for_followers() {
    let mut f1 = TestNode::follower("f1").await;
    let mut leader = TestNode::start(leader_streaming_to(f1.listen_addr())).await;

    leader.handle().insert(point("a", 1.0, 1.0)).await.unwrap();
    wait_for_clock(&f1.handle(), "leader", 1).await;

    leader.restart().await;
    // A reused sequence number would be discarded by the follower
    assert_eq!(leader.handle().insert(point("b", 2.0, 2.0)).await.unwrap(), 2);

    let stats = wait_for_clock(&f1.handle(), "leader", 2).await;
    assert_eq!(stats.features, 2);

    leader.stop().await;
    f1.stop().await;
}
