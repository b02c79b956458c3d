//! Random mutation histories survive both a crash and a clean restart.

use std::collections::BTreeMap;

use proptest::prelude::*;

use crate::common::*;

#[derive(Debug, Clone)]
enum Op {
    Insert(String, f64, f64),
    Replace(String, f64, f64),
    Delete(String),
    Checkpoint,
}

fn op() -> impl Strategy<Value = Op> {
    let id = prop::sample::select(vec!["a", "b", "c", "d"]).prop_map(str::to_string);
    let coord = (0u8..10).prop_map(f64::from);
    prop_oneof![
        4 => (id.clone(), coord.clone(), coord.clone()).prop_map(|(i, x, y)| Op::Insert(i, x, y)),
        2 => (id.clone(), coord.clone(), coord).prop_map(|(i, x, y)| Op::Replace(i, x, y)),
        2 => id.prop_map(Op::Delete),
        1 => Just(Op::Checkpoint),
    ]
}

type Snapshot = Vec<(String, Geometry)>;

async fn snapshot(h: &EngineHandle) -> Snapshot {
    let mut features: Snapshot = h
        .search([-1.0, -1.0], [11.0, 11.0])
        .await
        .expect("search")
        .into_iter()
        .map(|f| (f.key().expect("id").to_string(), f.geometry))
        .collect();
    features.sort_by(|a, b| a.0.cmp(&b.0));
    features
}

/// Run `ops` on a fresh leader and return the expected table and sequence.
async fn run(node: &TestNode, ops: &[Op]) -> (Snapshot, u64) {
    let h = node.handle();
    let mut model: BTreeMap<String, Geometry> = BTreeMap::new();
    let mut committed = 0;

    for op in ops {
        match op {
            Op::Insert(id, x, y) | Op::Replace(id, x, y) => {
                let feature = point(id, *x, *y);
                let seq = match op {
                    Op::Insert(..) => h.insert(feature).await,
                    _ => h.replace(feature).await,
                }
                .expect("mutation");
                committed += 1;
                assert_eq!(seq, committed);
                model.insert(id.clone(), Geometry::point(*x, *y));
            }
            Op::Delete(id) => match h.delete(id.as_str()).await {
                Ok(seq) => {
                    committed += 1;
                    assert_eq!(seq, committed);
                    model.remove(id);
                }
                Err(GeoError::NotFound { .. }) => assert!(!model.contains_key(id)),
                Err(e) => panic!("delete {id} failed: {e}"),
            },
            Op::Checkpoint => {
                h.checkpoint().await.expect("checkpoint");
            }
        }
    }
    (model.into_iter().collect(), committed)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn recovered_state_matches_history(ops in prop::collection::vec(op(), 1..24)) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("runtime");

        runtime.block_on(async {
            let mut node = TestNode::leader("n1").await;
            let (expected, committed) = run(&node, &ops).await;
            assert_eq!(snapshot(&node.handle()).await, expected);

            let mut crashed = node.crash_copy().await;
            let stats = crashed.handle().stats().await.expect("stats");
            assert_eq!(snapshot(&crashed.handle()).await, expected);
            assert_eq!(stats.features, expected.len());
            assert_eq!(stats.index_entries, expected.len());
            assert_eq!(stats.next_sequence, committed + 1);
            crashed.stop().await;

            node.restart().await;
            let stats = node.handle().stats().await.expect("stats");
            assert_eq!(snapshot(&node.handle()).await, expected);
            assert_eq!(stats.next_sequence, committed + 1);
            node.stop().await;
        });
    }
}
