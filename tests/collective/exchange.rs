use super::helpers::{run_descriptor, u32s};
use lockstep::{CollectiveDescriptor, CollectiveKind, DataType, Literal, Shape};

fn u32_shape(dims: Vec<usize>) -> Shape {
    Shape::new(DataType::U32, dims)
}

// ============================================================================
// AllGather
// ============================================================================

#[tokio::test]
async fn test_allgather_concatenates_in_replica_order() {
    let desc = CollectiveDescriptor::builder("ag", CollectiveKind::AllGather)
        .operand(u32_shape(vec![2]))
        .result(u32_shape(vec![4]))
        .dimension(0)
        .build(2)
        .unwrap();
    let results = run_descriptor(desc, |r| vec![Literal::vector(vec![10 + r, 15 + r])]).await;
    for (r, res) in results.into_iter().enumerate() {
        assert_eq!(
            u32s(&res.unwrap()[0]),
            vec![10, 15, 11, 16],
            "replica {r} allgather failed"
        );
    }
}

#[tokio::test]
async fn test_allgather_mixed_type_tuple() {
    let desc = CollectiveDescriptor::builder("ag", CollectiveKind::AllGather)
        .operands([u32_shape(vec![1]), Shape::new(DataType::F32, vec![2])])
        .results([u32_shape(vec![2]), Shape::new(DataType::F32, vec![4])])
        .dimension(0)
        .build(2)
        .unwrap();
    let results = run_descriptor(desc, |r| {
        vec![
            Literal::vector(vec![r]),
            Literal::vector(vec![r as f32, 0.5]),
        ]
    })
    .await;
    for res in results {
        let out = res.unwrap();
        assert_eq!(u32s(&out[0]), vec![0, 1]);
        assert_eq!(out[1].to_vec::<f32>().unwrap(), vec![0.0, 0.5, 1.0, 0.5]);
    }
}

#[tokio::test]
async fn test_allgather_inner_dimension() {
    let desc = CollectiveDescriptor::builder("ag", CollectiveKind::AllGather)
        .operand(u32_shape(vec![2, 1]))
        .result(u32_shape(vec![2, 3]))
        .dimension(1)
        .build(3)
        .unwrap();
    let results = run_descriptor(desc, |r| {
        vec![Literal::from_vec(vec![2, 1], vec![r, 10 + r]).unwrap()]
    })
    .await;
    for res in results {
        assert_eq!(u32s(&res.unwrap()[0]), vec![0, 1, 2, 10, 11, 12]);
    }
}

// ============================================================================
// AllToAll
// ============================================================================

#[tokio::test]
async fn test_alltoall_split_vector() {
    let desc = CollectiveDescriptor::builder("a2a", CollectiveKind::AllToAll)
        .operand(u32_shape(vec![2]))
        .result(u32_shape(vec![2]))
        .dimension(0)
        .build(2)
        .unwrap();
    let results = run_descriptor(desc, |r| vec![Literal::vector(vec![10 + r, 15 + r])]).await;
    let outs: Vec<Vec<u32>> = results.into_iter().map(|r| u32s(&r.unwrap()[0])).collect();
    assert_eq!(outs, vec![vec![10, 11], vec![15, 16]]);
}

#[tokio::test]
async fn test_alltoall_split_matrix_rows() {
    let desc = CollectiveDescriptor::builder("a2a", CollectiveKind::AllToAll)
        .operand(u32_shape(vec![2, 2]))
        .result(u32_shape(vec![2, 2]))
        .dimension(0)
        .build(2)
        .unwrap();
    let results = run_descriptor(desc, |r| {
        vec![Literal::from_vec(vec![2, 2], vec![10 + r, 15 + r, 20 + r, 25 + r]).unwrap()]
    })
    .await;
    let outs: Vec<Vec<u32>> = results.into_iter().map(|r| u32s(&r.unwrap()[0])).collect();
    assert_eq!(outs, vec![vec![10, 15, 11, 16], vec![20, 25, 21, 26]]);
}

#[tokio::test]
async fn test_alltoall_tuple_form() {
    let shape = u32_shape(vec![2]);
    let desc = CollectiveDescriptor::builder("a2a", CollectiveKind::AllToAll)
        .operands([shape.clone(), shape.clone()])
        .results([shape.clone(), shape])
        .build(2)
        .unwrap();
    let results = run_descriptor(desc, |r| {
        vec![
            Literal::vector(vec![10 + r, 15 + r]),
            Literal::vector(vec![40 + 4 * r, 60 + 4 * r]),
        ]
    })
    .await;
    let outs: Vec<Vec<Vec<u32>>> = results
        .into_iter()
        .map(|r| r.unwrap().iter().map(u32s).collect())
        .collect();
    assert_eq!(outs[0], vec![vec![10, 15], vec![11, 16]]);
    assert_eq!(outs[1], vec![vec![40, 60], vec![44, 64]]);
}
