use super::helpers::{TEST_TIMEOUT, run_program, run_replicas, u32s};
use lockstep::{
    AsyncPolicy, CollectiveDescriptor, CollectiveKind, DataType, Instance, Literal,
    LockstepConfig, ReduceOp, Shape,
};
use proptest::prelude::*;
use std::sync::Arc;

/// One of each kind plus a loop with an all-reduce in its body.
const EVERY_KIND: &str = r#"{
    "replica_count": 4,
    "instructions": [
        {"op": "replica-id", "name": "id", "shape": "u32[4]"},
        {"op": "constant", "name": "one", "shape": "u32[4]", "values": [1]},
        {"op": "collective", "name": "ar", "kind": "all-reduce",
         "operands": ["id"], "result_shapes": ["u32[4]"], "to_apply": "add"},
        {"op": "collective", "name": "ag", "kind": "all-gather",
         "operands": ["id"], "result_shapes": ["u32[16]"], "dimensions": [0]},
        {"op": "collective", "name": "rs", "kind": "reduce-scatter",
         "operands": ["ag"], "result_shapes": ["u32[4]"], "to_apply": "max", "dimension": 0},
        {"op": "collective", "name": "a2a", "kind": "all-to-all",
         "operands": ["ag"], "result_shapes": ["u32[16]"], "dimension": 0},
        {"op": "collective", "name": "perm", "kind": "collective-permute",
         "operands": ["id"], "result_shapes": ["u32[4]"],
         "source_target_pairs": [[0, 1], [1, 2], [2, 3], [3, 0]]},
        {"op": "collective", "name": "bc", "kind": "collective-broadcast",
         "operands": ["perm"], "result_shapes": ["u32[4]"], "replica_groups": [[3, 0, 1, 2]]},
        {"op": "binary", "name": "sum", "apply": "add", "lhs": "ar", "rhs": "perm"},
        {"op": "loop", "name": "l", "trip_count": 3,
         "carried": [{"param": "acc", "init": "id"}],
         "body": [
            {"op": "collective", "name": "peak", "kind": "all-reduce",
             "operands": ["acc"], "result_shapes": ["u32[4]"], "to_apply": "max"},
            {"op": "binary", "name": "next", "apply": "add", "lhs": "peak", "rhs": "one"}
         ],
         "yields": ["next"], "results": ["looped"]}
    ],
    "outputs": ["sum", "rs", "a2a", "bc", "looped"]
}"#;

fn policy_from_mask(mask: u8) -> AsyncPolicy {
    CollectiveKind::ALL
        .iter()
        .enumerate()
        .filter(|(i, _)| mask & (1 << i) != 0)
        .fold(AsyncPolicy::all_async(), |p, (_, &kind)| p.disable(kind))
}

#[tokio::test]
async fn test_every_kind_async_matches_sync() {
    let sync = run_program(
        EVERY_KIND,
        LockstepConfig::default().with_async_policy(AsyncPolicy::all_sync()),
    )
    .await;
    let nb = run_program(EVERY_KIND, LockstepConfig::default()).await;
    assert_eq!(nb, sync);

    for (r, outs) in sync.iter().enumerate() {
        let r = r as u32;
        // 0 + 1 + 2 + 3 plus the id of the ring predecessor.
        assert_eq!(u32s(&outs[0]), vec![6 + (r + 3) % 4; 4], "replica {r} sum");
        // The gathered vector is identical everywhere; max leaves it as is.
        assert_eq!(u32s(&outs[1]), vec![r; 4], "replica {r} reduce-scatter");
        assert_eq!(u32s(&outs[2]), vec![r; 16], "replica {r} all-to-all");
        // Source 3 received 2 from the permute.
        assert_eq!(u32s(&outs[3]), vec![2; 4], "replica {r} broadcast");
        assert_eq!(u32s(&outs[4]), vec![6; 4], "replica {r} loop");
    }
}

#[tokio::test]
async fn test_start_then_wait_overlaps_local_work() {
    let desc = Arc::new(
        CollectiveDescriptor::builder("ar", CollectiveKind::AllReduce)
            .operand(Shape::new(DataType::F32, vec![4]))
            .result(Shape::new(DataType::F32, vec![4]))
            .reduction(ReduceOp::Sum)
            .channel(Some(1))
            .build(4)
            .unwrap(),
    );
    let outs = run_replicas(4, move |replica, transport| {
        let inst = Instance::new(transport, Arc::clone(&desc), replica, 1, TEST_TIMEOUT);
        async move {
            let handle = inst.spawn(vec![Literal::vector(vec![(replica + 1) as f32; 4])]);
            // Local work while the instance is in flight.
            let local: f32 = (0..100).map(|i| i as f32).sum();
            let out = handle.wait().await.unwrap();
            (local, out[0].to_vec::<f32>().unwrap())
        }
    })
    .await;
    for (local, reduced) in outs {
        assert_eq!(local, 4950.0);
        assert_eq!(reduced, vec![10.0; 4]);
    }
}

#[tokio::test]
async fn test_two_channels_in_flight() {
    let shape = Shape::scalar(DataType::U32);
    let build = |name: &str, op: ReduceOp, channel: u64| {
        Arc::new(
            CollectiveDescriptor::builder(name, CollectiveKind::AllReduce)
                .operand(shape.clone())
                .result(shape.clone())
                .reduction(op)
                .channel(Some(channel))
                .build(3)
                .unwrap(),
        )
    };
    let a = build("a", ReduceOp::Sum, 1);
    let b = build("b", ReduceOp::Max, 2);
    let outs = run_replicas(3, move |replica, transport| {
        let ia = Instance::new(Arc::clone(&transport), Arc::clone(&a), replica, 1, TEST_TIMEOUT);
        let ib = Instance::new(transport, Arc::clone(&b), replica, 2, TEST_TIMEOUT);
        async move {
            let ha = ia.spawn(vec![Literal::scalar(replica + 1)]);
            let hb = ib.spawn(vec![Literal::scalar(10 * replica)]);
            // Complete in the opposite order of the starts.
            let b = hb.wait().await.unwrap();
            let a = ha.wait().await.unwrap();
            (u32s(&a[0])[0], u32s(&b[0])[0])
        }
    })
    .await;
    assert_eq!(outs, vec![(6, 20); 3]);
}

/// The `EVERY_KIND` layout for `replica_count` replicas split into
/// `groups`. Every group has the same size, so each shape is fixed.
fn every_kind_program(replica_count: u32, groups: &[Vec<u32>]) -> String {
    let g = groups[0].len();
    let ring: Vec<[u32; 2]> = (0..replica_count)
        .map(|r| [r, (r + 1) % replica_count])
        .collect();
    serde_json::json!({
        "replica_count": replica_count,
        "instructions": [
            {"op": "replica-id", "name": "id", "shape": "u32[2]"},
            {"op": "constant", "name": "one", "shape": "u32[2]", "values": [1]},
            {"op": "collective", "name": "ar", "kind": "all-reduce", "replica_groups": groups,
             "operands": ["id"], "result_shapes": ["u32[2]"], "to_apply": "add"},
            {"op": "collective", "name": "ag", "kind": "all-gather", "replica_groups": groups,
             "operands": ["id"], "result_shapes": [format!("u32[{}]", 2 * g)], "dimensions": [0]},
            {"op": "collective", "name": "rs", "kind": "reduce-scatter", "replica_groups": groups,
             "operands": ["ag"], "result_shapes": ["u32[2]"], "to_apply": "max", "dimension": 0},
            {"op": "collective", "name": "a2a", "kind": "all-to-all", "replica_groups": groups,
             "operands": ["ag"], "result_shapes": [format!("u32[{}]", 2 * g)], "dimension": 0},
            {"op": "collective", "name": "perm", "kind": "collective-permute",
             "operands": ["id"], "result_shapes": ["u32[2]"], "source_target_pairs": ring},
            {"op": "collective", "name": "bc", "kind": "collective-broadcast",
             "replica_groups": groups, "operands": ["perm"], "result_shapes": ["u32[2]"]},
            {"op": "binary", "name": "sum", "apply": "add", "lhs": "ar", "rhs": "perm"},
            {"op": "loop", "name": "l", "trip_count": 2,
             "carried": [{"param": "acc", "init": "id"}],
             "body": [
                {"op": "collective", "name": "peak", "kind": "all-reduce",
                 "replica_groups": groups, "operands": ["acc"], "result_shapes": ["u32[2]"],
                 "to_apply": "max"},
                {"op": "binary", "name": "next", "apply": "add", "lhs": "peak", "rhs": "one"}
             ],
             "yields": ["next"], "results": ["looped"]}
        ],
        "outputs": ["sum", "rs", "a2a", "bc", "looped"]
    })
    .to_string()
}

/// Replica count in 1..=4 and a partition of the replicas into
/// equal-sized groups, in shuffled listed order.
fn layout() -> impl Strategy<Value = (u32, Vec<Vec<u32>>)> {
    (1u32..=4)
        .prop_flat_map(|r| {
            let sizes: Vec<usize> = (1..=r as usize).filter(|g| r as usize % g == 0).collect();
            (
                Just(r),
                prop::sample::select(sizes),
                Just((0..r).collect::<Vec<u32>>()).prop_shuffle(),
            )
        })
        .prop_map(|(r, g, order)| (r, order.chunks(g).map(<[u32]>::to_vec).collect()))
}

#[tokio::test]
async fn test_two_replicas_async_matches_sync() {
    let text = every_kind_program(2, &[vec![0, 1]]);
    let sync = run_program(
        &text,
        LockstepConfig::default().with_async_policy(AsyncPolicy::all_sync()),
    )
    .await;
    let nb = run_program(&text, LockstepConfig::default()).await;
    assert_eq!(nb, sync);
    assert_eq!(u32s(&sync[0][0]), vec![2, 2]);
    assert_eq!(u32s(&sync[1][0]), vec![1, 1]);
    // Broadcast source 0 received replica 1's id from the permute.
    assert_eq!(u32s(&sync[1][3]), vec![1, 1]);
    assert_eq!(u32s(&sync[0][4]), vec![3, 3]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_any_async_subset_matches_sync((replica_count, groups) in layout(), mask in 0u8..64) {
        let text = every_kind_program(replica_count, &groups);
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        let (sync, mixed) = rt.block_on(async {
            let sync = run_program(
                &text,
                LockstepConfig::default().with_async_policy(AsyncPolicy::all_sync()),
            )
            .await;
            let mixed = run_program(
                &text,
                LockstepConfig::default().with_async_policy(policy_from_mask(mask)),
            )
            .await;
            (sync, mixed)
        });
        prop_assert_eq!(sync.len(), replica_count as usize);
        prop_assert_eq!(sync, mixed);
    }
}
