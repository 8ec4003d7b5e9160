use super::helpers::{TEST_TIMEOUT, run_descriptor, run_replicas};
use lockstep::{
    CollectiveDescriptor, CollectiveKind, DataType, Instance, Instruction, LocalTransport,
    LockstepConfig, LockstepError, Literal, Program, ReduceOp, Runtime, Shape, Transport,
};
use std::sync::Arc;
use std::time::Duration;

fn scalar_all_reduce(op: ReduceOp, channel: Option<u64>) -> CollectiveDescriptor {
    CollectiveDescriptor::builder("ar", CollectiveKind::AllReduce)
        .operand(Shape::scalar(DataType::U32))
        .result(Shape::scalar(DataType::U32))
        .reduction(op)
        .channel(channel)
        .build(2)
        .unwrap()
}

#[test]
fn test_permute_duplicate_target_rejected() {
    let err = CollectiveDescriptor::builder("cp", CollectiveKind::CollectivePermute)
        .operand(Shape::scalar(DataType::U32))
        .result(Shape::scalar(DataType::U32))
        .pairs([(0, 1), (1, 1)])
        .build(2)
        .unwrap_err();
    assert!(matches!(
        err,
        LockstepError::InvalidGroupConfiguration {
            kind: CollectiveKind::CollectivePermute,
            ..
        }
    ));
}

#[test]
fn test_indivisible_reduce_scatter_rejected() {
    let err = CollectiveDescriptor::builder("rs", CollectiveKind::ReduceScatter)
        .operand(Shape::new(DataType::U32, vec![3]))
        .result(Shape::new(DataType::U32, vec![1]))
        .dimension(0)
        .reduction(ReduceOp::Sum)
        .build(2)
        .unwrap_err();
    assert!(matches!(err, LockstepError::ShapeMismatch { .. }), "{err}");
}

#[test]
fn test_unknown_kind_is_parse_error() {
    let text = r#"{
        "replica_count": 2,
        "instructions": [
            {"op": "replica-id", "name": "id"},
            {"op": "collective", "name": "x", "kind": "all-scan",
             "operands": ["id"], "result_shapes": ["u32[]"]}
        ]
    }"#;
    assert!(matches!(Program::parse(text), Err(LockstepError::Parse(_))));
}

#[tokio::test]
async fn test_missing_replica_times_out() {
    let transport: Arc<dyn Transport> = Arc::new(LocalTransport::new(2, 4));
    // Replica 1 never reaches the instance.
    let inst = Instance::new(
        transport,
        Arc::new(scalar_all_reduce(ReduceOp::Sum, None)),
        0,
        1,
        Duration::from_millis(100),
    );
    let err = inst.run(vec![Literal::scalar(1u32)]).await.unwrap_err();
    match err {
        LockstepError::RendezvousTimeout {
            replica,
            missing,
            seq,
            ..
        } => {
            assert_eq!((replica, missing, seq), (0, 1, 1));
        }
        other => panic!("expected RendezvousTimeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_descriptor_mismatch_fails_every_participant() {
    let sum = Arc::new(scalar_all_reduce(ReduceOp::Sum, None));
    let max = Arc::new(scalar_all_reduce(ReduceOp::Max, None));
    let results = run_replicas(2, move |replica, transport| {
        let desc = if replica == 0 { &sum } else { &max };
        let inst = Instance::new(transport, Arc::clone(desc), replica, 1, TEST_TIMEOUT);
        async move { inst.run(vec![Literal::scalar(replica)]).await }
    })
    .await;
    for (r, res) in results.into_iter().enumerate() {
        assert!(
            matches!(res, Err(LockstepError::InvalidDescriptor { .. })),
            "replica {r}: {res:?}"
        );
    }
}

#[tokio::test]
async fn test_wrong_operand_shape_rejected() {
    let results = run_descriptor(scalar_all_reduce(ReduceOp::Sum, None), |_| {
        vec![Literal::vector(vec![1u32, 2])]
    })
    .await;
    for res in results {
        assert!(matches!(res, Err(LockstepError::ShapeMismatch { .. })));
    }
}

fn runtime() -> Runtime {
    Runtime::new(LockstepConfig::default().with_rendezvous_timeout(TEST_TIMEOUT))
}

#[tokio::test]
async fn test_done_without_start_is_violation() {
    let desc = Arc::new(scalar_all_reduce(ReduceOp::Sum, Some(3)));
    let program = Program::new(
        2,
        vec![Instruction::CollectiveDone {
            outputs: vec!["ar".into()],
            channel: 3,
            descriptor: desc,
        }],
        vec!["ar".into()],
    )
    .unwrap();
    let transport = Arc::new(LocalTransport::new(2, 4));
    let err = runtime().run(&program, transport).await.unwrap_err();
    assert!(
        matches!(
            err,
            LockstepError::AsyncProtocolViolation {
                replica: Some(_),
                ..
            }
        ),
        "{err}"
    );
}

#[tokio::test]
async fn test_start_without_done_is_violation() {
    let desc = Arc::new(scalar_all_reduce(ReduceOp::Sum, Some(3)));
    let program = Program::new(
        2,
        vec![
            Instruction::ReplicaId {
                name: "id".into(),
                shape: Shape::scalar(DataType::U32),
            },
            Instruction::CollectiveStart {
                operands: vec!["id".into()],
                descriptor: desc,
            },
        ],
        vec!["id".into()],
    )
    .unwrap();
    let transport = Arc::new(LocalTransport::new(2, 4));
    let err = runtime().run(&program, transport).await.unwrap_err();
    assert!(
        matches!(err, LockstepError::AsyncProtocolViolation { .. }),
        "{err}"
    );
}

#[tokio::test]
async fn test_descriptor_replica_count_must_match_program() {
    let desc = Arc::new(scalar_all_reduce(ReduceOp::Sum, None));
    let err = Program::new(
        3,
        vec![
            Instruction::ReplicaId {
                name: "id".into(),
                shape: Shape::scalar(DataType::U32),
            },
            Instruction::Collective {
                outputs: vec!["ar".into()],
                operands: vec!["id".into()],
                descriptor: desc,
            },
        ],
        vec!["ar".into()],
    )
    .unwrap_err();
    assert!(matches!(err, LockstepError::InvalidDescriptor { .. }), "{err}");
}
