use super::helpers::{run_descriptor, run_program, u32s};
use lockstep::{
    CollectiveDescriptor, CollectiveKind, DataType, Literal, LockstepConfig, ReduceOp,
    ReplicaGroup, Shape,
};

fn all_reduce(shape: Shape, op: ReduceOp, replica_count: u32) -> CollectiveDescriptor {
    CollectiveDescriptor::builder("ar", CollectiveKind::AllReduce)
        .operand(shape.clone())
        .result(shape)
        .reduction(op)
        .build(replica_count)
        .unwrap()
}

#[tokio::test]
async fn test_allreduce_sum_of_replica_ids() {
    let desc = all_reduce(Shape::new(DataType::U32, vec![3]), ReduceOp::Sum, 4);
    let results = run_descriptor(desc, |r| vec![Literal::vector(vec![r; 3])]).await;
    for (r, res) in results.into_iter().enumerate() {
        let out = res.unwrap();
        // 0 + 1 + 2 + 3
        assert_eq!(u32s(&out[0]), vec![6; 3], "replica {r} allreduce failed");
    }
}

#[tokio::test]
async fn test_allreduce_within_groups() {
    let desc = CollectiveDescriptor::builder("ar", CollectiveKind::AllReduce)
        .operand(Shape::scalar(DataType::S32))
        .result(Shape::scalar(DataType::S32))
        .groups([ReplicaGroup::new(vec![0, 2]), ReplicaGroup::new(vec![1, 3])])
        .reduction(ReduceOp::Sum)
        .build(4)
        .unwrap();
    let results = run_descriptor(desc, |r| vec![Literal::scalar(r as i32 + 1)]).await;
    let sums: Vec<i32> = results
        .into_iter()
        .map(|res| res.unwrap()[0].to_vec::<i32>().unwrap()[0])
        .collect();
    assert_eq!(sums, vec![4, 6, 4, 6]);
}

#[tokio::test]
async fn test_allreduce_max_and_prod() {
    let desc = all_reduce(Shape::scalar(DataType::S64), ReduceOp::Max, 3);
    let results = run_descriptor(desc, |r| vec![Literal::scalar(-(r as i64))]).await;
    for res in results {
        assert_eq!(res.unwrap()[0].to_vec::<i64>().unwrap(), vec![0]);
    }

    let desc = all_reduce(Shape::scalar(DataType::U32), ReduceOp::Prod, 3);
    let results = run_descriptor(desc, |r| vec![Literal::scalar(r + 2)]).await;
    for res in results {
        // 2 * 3 * 4
        assert_eq!(u32s(&res.unwrap()[0]), vec![24]);
    }
}

#[tokio::test]
async fn test_allreduce_float_order_is_canonical() {
    // Summing in a different order would give 0.0 or 2.0.
    let desc = all_reduce(Shape::scalar(DataType::F32), ReduceOp::Sum, 4);
    let values = [1.0e8f32, 1.0, -1.0e8, 1.0];
    let results = run_descriptor(desc, move |r| vec![Literal::scalar(values[r as usize])]).await;
    let bits: Vec<u32> = results
        .into_iter()
        .map(|res| res.unwrap()[0].to_vec::<f32>().unwrap()[0].to_bits())
        .collect();
    assert!(bits.iter().all(|b| *b == 1.0f32.to_bits()), "got {bits:?}");
}

#[tokio::test]
async fn test_allreduce_tuple_operands() {
    let desc = CollectiveDescriptor::builder("ar", CollectiveKind::AllReduce)
        .operands([Shape::new(DataType::U32, vec![2]), Shape::scalar(DataType::F64)])
        .results([Shape::new(DataType::U32, vec![2]), Shape::scalar(DataType::F64)])
        .reduction(ReduceOp::Sum)
        .build(2)
        .unwrap();
    let results = run_descriptor(desc, |r| {
        vec![Literal::vector(vec![r, 10 * r]), Literal::scalar(0.5f64)]
    })
    .await;
    for res in results {
        let out = res.unwrap();
        assert_eq!(u32s(&out[0]), vec![1, 10]);
        assert_eq!(out[1].to_vec::<f64>().unwrap(), vec![1.0]);
    }
}

#[tokio::test]
async fn test_allreduce_in_program() {
    let text = r#"{
        "replica_count": 3,
        "instructions": [
            {"op": "replica-id", "name": "id"},
            {"op": "collective", "name": "ar", "kind": "all-reduce",
             "operands": ["id"], "result_shapes": ["u32[]"], "to_apply": "add"}
        ],
        "outputs": ["ar"]
    }"#;
    let outputs = run_program(text, LockstepConfig::default()).await;
    assert_eq!(outputs.len(), 3);
    for out in outputs {
        assert_eq!(u32s(&out[0]), vec![3]);
    }
}
