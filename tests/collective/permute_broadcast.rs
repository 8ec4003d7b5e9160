use super::helpers::{run_descriptor, u32s};
use lockstep::{CollectiveDescriptor, CollectiveKind, DataType, Literal, ReplicaGroup, Shape};

#[tokio::test]
async fn test_permute_swap() {
    let desc = CollectiveDescriptor::builder("cp", CollectiveKind::CollectivePermute)
        .operand(Shape::scalar(DataType::U32))
        .result(Shape::scalar(DataType::U32))
        .pairs([(0, 1), (1, 0)])
        .build(2)
        .unwrap();
    let results = run_descriptor(desc, |r| vec![Literal::scalar(10 + r)]).await;
    let outs: Vec<Vec<u32>> = results.into_iter().map(|r| u32s(&r.unwrap()[0])).collect();
    assert_eq!(outs, vec![vec![11], vec![10]]);
}

#[tokio::test]
async fn test_permute_unpaired_target_gets_zeros() {
    let desc = CollectiveDescriptor::builder("cp", CollectiveKind::CollectivePermute)
        .operand(Shape::new(DataType::U32, vec![2]))
        .result(Shape::new(DataType::U32, vec![2]))
        .pairs([(0, 1)])
        .build(3)
        .unwrap();
    let results = run_descriptor(desc, |r| vec![Literal::vector(vec![10 + r, 20 + r])]).await;
    let outs: Vec<Vec<u32>> = results.into_iter().map(|r| u32s(&r.unwrap()[0])).collect();
    assert_eq!(outs, vec![vec![0, 0], vec![10, 20], vec![0, 0]]);
}

#[tokio::test]
async fn test_permute_ring() {
    let desc = CollectiveDescriptor::builder("cp", CollectiveKind::CollectivePermute)
        .operand(Shape::scalar(DataType::U32))
        .result(Shape::scalar(DataType::U32))
        .pairs([(0, 1), (1, 2), (2, 3), (3, 0)])
        .build(4)
        .unwrap();
    let results = run_descriptor(desc, |r| vec![Literal::scalar(r)]).await;
    let outs: Vec<u32> = results.into_iter().map(|r| u32s(&r.unwrap()[0])[0]).collect();
    assert_eq!(outs, vec![3, 0, 1, 2]);
}

#[tokio::test]
async fn test_broadcast_source_is_first_listed() {
    let desc = CollectiveDescriptor::builder("bc", CollectiveKind::CollectiveBroadcast)
        .operand(Shape::new(DataType::U32, vec![2]))
        .result(Shape::new(DataType::U32, vec![2]))
        .groups([ReplicaGroup::new(vec![1, 0])])
        .build(2)
        .unwrap();
    let results = run_descriptor(desc, |r| vec![Literal::vector(vec![10 + r; 2])]).await;
    for (r, res) in results.into_iter().enumerate() {
        assert_eq!(u32s(&res.unwrap()[0]), vec![11, 11], "replica {r} broadcast failed");
    }
}

#[tokio::test]
async fn test_broadcast_replica_outside_groups_keeps_operand() {
    let desc = CollectiveDescriptor::builder("bc", CollectiveKind::CollectiveBroadcast)
        .operand(Shape::scalar(DataType::U32))
        .result(Shape::scalar(DataType::U32))
        .groups([ReplicaGroup::new(vec![2, 0])])
        .build(3)
        .unwrap();
    let results = run_descriptor(desc, |r| vec![Literal::scalar(100 + r)]).await;
    let outs: Vec<u32> = results.into_iter().map(|r| u32s(&r.unwrap()[0])[0]).collect();
    assert_eq!(outs, vec![102, 101, 102]);
}
