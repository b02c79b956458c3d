//! Fan-out from one leader to several followers.

use std::time::Duration;

use tokio::net::TcpListener;

use crate::common::*;

async fn leader_with_peers(peers: Vec<PeerConfig>) -> TestNode {
    let mut config = leader_config("leader");
    config.replication.peers = peers;
    TestNode::start(config).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn leader_writes_reach_every_follower() {
    let mut f1 = TestNode::follower("f1").await;
    let mut f2 = TestNode::follower("f2").await;
    let mut leader = leader_with_peers(vec![
        peer("f1", f1.listen_addr()),
        peer("f2", f2.listen_addr()),
    ])
    .await;
    wait_for_peers(leader.node(), |peers| {
        peers.iter().all(|p| p.state == PeerState::Streaming)
    })
    .await;

    let h = leader.handle();
    h.insert(point("a", 1.0, 1.0)).await.unwrap();
    h.insert(point("b", 5.0, 5.0)).await.unwrap();
    h.replace(point("a", 9.0, 9.0)).await.unwrap();
    assert_eq!(h.delete("b").await.unwrap(), 4);

    for follower in [&f1, &f2] {
        let fh = follower.handle();
        let stats = wait_for_clock(&fh, "leader", 4).await;
        assert_eq!(stats.features, 1);
        assert_eq!(stats.index_entries, 1);
        assert_eq!(stats.vclock.get(follower.config.node.as_str()), 0);
        assert_eq!(ids(&fh.search([8.0, 8.0], [10.0, 10.0]).await.unwrap()), vec!["a"]);
        assert!(fh.search([0.0, 0.0], [6.0, 6.0]).await.unwrap().is_empty());
    }

    leader.stop().await;
    f1.stop().await;
    f2.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn follower_state_survives_follower_restart() {
    let mut f1 = TestNode::follower("f1").await;
    let mut leader = leader_with_peers(vec![peer("f1", f1.listen_addr())]).await;

    let h = leader.handle();
    h.insert(point("a", 1.0, 1.0)).await.unwrap();
    h.insert(point("b", 2.0, 2.0)).await.unwrap();
    wait_for_clock(&f1.handle(), "leader", 2).await;

    // Stop the leader first so nothing is in flight during the restart
    leader.stop().await;
    f1.restart().await;

    let stats = f1.handle().stats().await.unwrap();
    assert_eq!(stats.features, 2);
    assert_eq!(stats.vclock.get("leader"), 2);
    assert!(f1.node().recovery_stats().checkpoint_loaded);
    f1.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_peer_does_not_block_commits_or_other_peers() {
    let mut f1 = TestNode::follower("f1").await;
    let mut leader = leader_with_peers(vec![
        peer("dead", free_port()),
        peer("f1", f1.listen_addr()),
    ])
    .await;

    let h = leader.handle();
    let writes = async {
        for i in 0..50 {
            h.insert(point(&format!("f{}", i), i as f64, i as f64))
                .await
                .unwrap();
        }
    };
    tokio::time::timeout(Duration::from_secs(5), writes)
        .await
        .expect("commits must not wait on peers");

    let stats = wait_for_clock(&f1.handle(), "leader", 50).await;
    assert_eq!(stats.features, 50);

    let peers = leader.node().peers();
    let dead = peers.iter().find(|p| p.name == "dead").unwrap();
    assert_ne!(dead.state, PeerState::Streaming);
    assert_eq!(dead.sent, 0);

    leader.stop().await;
    f1.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stalled_peer_does_not_block_other_peers() {
    // Accepts connections and never reads from them
    let stalled = TcpListener::bind(any_port()).await.unwrap();
    let stalled_addr = stalled.local_addr().unwrap();
    let hold = tokio::spawn(async move {
        let mut sockets = Vec::new();
        while let Ok((socket, _)) = stalled.accept().await {
            sockets.push(socket);
        }
    });

    let mut f1 = TestNode::follower("f1").await;
    let mut leader = leader_with_peers(vec![
        peer("stalled", stalled_addr),
        peer("f1", f1.listen_addr()),
    ])
    .await;

    let h = leader.handle();
    let big = "x".repeat(16 * 1024);
    for i in 0..100 {
        h.insert(point(&format!("f{}", i), 0.0, 0.0).with_property("blob", big.clone()))
            .await
            .unwrap();
    }

    let stats = wait_for_clock(&f1.handle(), "leader", 100).await;
    assert_eq!(stats.features, 100);

    leader.stop().await;
    f1.stop().await;
    hold.abort();
}

#[tokio::test]
async fn follower_ignores_configured_peers() {
    let mut config = follower_config("f1", any_port());
    config.replication.peers = vec![peer("other", free_port())];
    let mut f1 = TestNode::start(config).await;
    assert!(f1.node().peers().is_empty());
    f1.stop().await;
}
