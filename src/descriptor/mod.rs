//! Immutable description of one logical collective, validated against the
//! replica set before anything executes.

mod fingerprint;
mod group;

pub use group::{GroupIndex, ReplicaGroup};

use crate::error::{LockstepError, Result};
use crate::memory::Shape;
use crate::types::{ChannelId, CollectiveKind, ReduceOp, ReplicaId};
use serde::{Deserialize, Serialize};

/// Whether an instance runs as one blocking call or as a Start/Done pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Synchronicity {
    #[default]
    Sync,
    Async,
}

/// A validated collective. Construct with [`CollectiveDescriptor::builder`].
#[derive(Debug, Clone, PartialEq)]
pub struct CollectiveDescriptor {
    name: String,
    kind: CollectiveKind,
    operand_shapes: Vec<Shape>,
    result_shapes: Vec<Shape>,
    groups: GroupIndex,
    reduction: Option<ReduceOp>,
    dimension: Option<usize>,
    pairs: Vec<(ReplicaId, ReplicaId)>,
    channel: Option<ChannelId>,
    synchronicity: Synchronicity,
    replica_count: u32,
    fingerprint: u64,
}

impl CollectiveDescriptor {
    pub fn builder(name: impl Into<String>, kind: CollectiveKind) -> DescriptorBuilder {
        DescriptorBuilder {
            name: name.into(),
            kind,
            operand_shapes: Vec::new(),
            result_shapes: Vec::new(),
            groups: Vec::new(),
            reduction: None,
            dimension: None,
            pairs: Vec::new(),
            channel: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CollectiveKind {
        self.kind
    }

    pub fn operand_shapes(&self) -> &[Shape] {
        &self.operand_shapes
    }

    pub fn result_shapes(&self) -> &[Shape] {
        &self.result_shapes
    }

    pub fn groups(&self) -> &GroupIndex {
        &self.groups
    }

    pub fn reduction(&self) -> Option<ReduceOp> {
        self.reduction
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn source_target_pairs(&self) -> &[(ReplicaId, ReplicaId)] {
        &self.pairs
    }

    pub fn channel(&self) -> Option<ChannelId> {
        self.channel
    }

    pub fn synchronicity(&self) -> Synchronicity {
        self.synchronicity
    }

    pub fn replica_count(&self) -> u32 {
        self.replica_count
    }

    /// Hash of every field replicas must agree on.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// A copy lowered to `synchronicity` on `channel`. Used by the scheduler;
    /// the original stays untouched.
    pub(crate) fn lowered(&self, synchronicity: Synchronicity, channel: Option<ChannelId>) -> Self {
        let mut d = self.clone();
        d.synchronicity = synchronicity;
        d.channel = channel;
        d.fingerprint = d.compute_fingerprint();
        d
    }

    /// A copy renamed for a new program position (e.g. after hoisting).
    pub(crate) fn renamed(&self, name: impl Into<String>) -> Self {
        let mut d = self.clone();
        d.name = name.into();
        d
    }

    /// Replicas that must arrive before `replica`'s instance releases,
    /// in ascending order. Empty when `replica` is in no group.
    pub fn participants(&self, replica: ReplicaId) -> Vec<ReplicaId> {
        match self.kind {
            CollectiveKind::CollectivePermute => (0..self.replica_count).collect(),
            _ => self
                .groups
                .group_of(replica)
                .map(ReplicaGroup::sorted)
                .unwrap_or_default(),
        }
    }

    fn compute_fingerprint(&self) -> u64 {
        let mut parts: Vec<Vec<u8>> = vec![self.kind.name().as_bytes().to_vec()];
        for s in self.operand_shapes.iter().chain(&self.result_shapes) {
            parts.push(s.to_string().into_bytes());
        }
        for g in self.groups.groups() {
            parts.push(g.members().iter().flat_map(|r| r.to_le_bytes()).collect());
        }
        parts.push(
            self.reduction
                .map(|op| op.to_string().into_bytes())
                .unwrap_or_default(),
        );
        parts.push(
            self.dimension
                .map(|d| (d as u64).to_le_bytes().to_vec())
                .unwrap_or_default(),
        );
        parts.push(
            self.pairs
                .iter()
                .flat_map(|(s, t)| s.to_le_bytes().into_iter().chain(t.to_le_bytes()))
                .collect(),
        );
        parts.push(
            self.channel
                .map(|c| c.to_le_bytes().to_vec())
                .unwrap_or_default(),
        );
        fingerprint::fnv1a(parts)
    }
}

/// Collects descriptor fields, then validates them against the replica set.
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    name: String,
    kind: CollectiveKind,
    operand_shapes: Vec<Shape>,
    result_shapes: Vec<Shape>,
    groups: Vec<ReplicaGroup>,
    reduction: Option<ReduceOp>,
    dimension: Option<usize>,
    pairs: Vec<(ReplicaId, ReplicaId)>,
    channel: Option<ChannelId>,
}

impl DescriptorBuilder {
    pub fn operand(mut self, shape: Shape) -> Self {
        self.operand_shapes.push(shape);
        self
    }

    pub fn operands(mut self, shapes: impl IntoIterator<Item = Shape>) -> Self {
        self.operand_shapes.extend(shapes);
        self
    }

    pub fn result(mut self, shape: Shape) -> Self {
        self.result_shapes.push(shape);
        self
    }

    pub fn results(mut self, shapes: impl IntoIterator<Item = Shape>) -> Self {
        self.result_shapes.extend(shapes);
        self
    }

    pub fn groups(mut self, groups: impl IntoIterator<Item = ReplicaGroup>) -> Self {
        self.groups.extend(groups);
        self
    }

    pub fn reduction(mut self, op: ReduceOp) -> Self {
        self.reduction = Some(op);
        self
    }

    pub fn dimension(mut self, dim: usize) -> Self {
        self.dimension = Some(dim);
        self
    }

    pub fn pairs(mut self, pairs: impl IntoIterator<Item = (ReplicaId, ReplicaId)>) -> Self {
        self.pairs.extend(pairs);
        self
    }

    pub fn channel(mut self, channel: Option<ChannelId>) -> Self {
        self.channel = channel;
        self
    }

    /// Validate group membership, kind-specific fields and shapes.
    pub fn build(self, replica_count: u32) -> Result<CollectiveDescriptor> {
        let kind = self.kind;
        let invalid = |reason: String| LockstepError::InvalidDescriptor {
            name: self.name.clone(),
            reason,
        };

        if self.operand_shapes.is_empty() {
            return Err(invalid("a collective needs at least one operand".into()));
        }
        match (kind.is_reduction(), self.reduction) {
            (true, None) => return Err(invalid(format!("{kind} requires a reduction operator"))),
            (false, Some(op)) => {
                return Err(invalid(format!("{kind} does not take a reduction ({op})")));
            }
            _ => {}
        }
        let takes_dimension = matches!(
            kind,
            CollectiveKind::AllGather | CollectiveKind::ReduceScatter | CollectiveKind::AllToAll
        );
        match (takes_dimension, self.dimension) {
            (false, Some(_)) => {
                return Err(invalid(format!("{kind} does not take a split dimension")));
            }
            (true, None) if kind != CollectiveKind::AllToAll => {
                return Err(invalid(format!("{kind} requires a split dimension")));
            }
            _ => {}
        }

        if kind == CollectiveKind::CollectivePermute {
            if !self.groups.is_empty() {
                return Err(LockstepError::invalid_group(
                    kind,
                    "collective-permute takes source/target pairs, not replica groups",
                ));
            }
            group::validate_pairs(&self.pairs, replica_count)?;
        } else if !self.pairs.is_empty() {
            return Err(LockstepError::invalid_group(
                kind,
                "source/target pairs are only valid for collective-permute",
            ));
        }
        let groups = GroupIndex::build(kind, &self.groups, replica_count)?;

        let mut desc = CollectiveDescriptor {
            name: self.name,
            kind,
            operand_shapes: self.operand_shapes,
            result_shapes: self.result_shapes,
            groups,
            reduction: self.reduction,
            dimension: self.dimension,
            pairs: self.pairs,
            channel: self.channel,
            synchronicity: Synchronicity::Sync,
            replica_count,
            fingerprint: 0,
        };
        check_shapes(&desc)?;
        desc.fingerprint = desc.compute_fingerprint();
        Ok(desc)
    }
}

/// Shape rules per kind; R is the group size.
fn check_shapes(d: &CollectiveDescriptor) -> Result<()> {
    let ctx = |what: &str| format!("{} '{}' {what}", d.kind, d.name);
    let r = d.groups.max_group_size();
    let ops = &d.operand_shapes;
    let res = &d.result_shapes;

    let tuple_all_to_all = d.kind == CollectiveKind::AllToAll && d.dimension.is_none();
    let expected_results = if tuple_all_to_all { r } else { ops.len() };
    if res.len() != expected_results {
        return Err(LockstepError::shape_mismatch(
            ctx("result count"),
            expected_results,
            res.len(),
        ));
    }

    if let Some(dim) = d.dimension {
        if let Some(s) = ops.iter().chain(res).find(|s| dim >= s.rank()) {
            return Err(LockstepError::shape_mismatch(
                ctx("split dimension"),
                format!("rank > {dim}"),
                s,
            ));
        }
    }

    match d.kind {
        CollectiveKind::AllReduce
        | CollectiveKind::CollectivePermute
        | CollectiveKind::CollectiveBroadcast => {
            for (o, s) in ops.iter().zip(res) {
                if o != s {
                    return Err(LockstepError::shape_mismatch(ctx("result"), o, s));
                }
            }
        }
        CollectiveKind::AllGather => {
            let dim = d.dimension.unwrap_or(0);
            for (o, s) in ops.iter().zip(res) {
                let expected = o.with_dim(dim, o.dims[dim] * r);
                if &expected != s {
                    return Err(LockstepError::shape_mismatch(ctx("result"), expected, s));
                }
            }
        }
        CollectiveKind::ReduceScatter => {
            let dim = d.dimension.unwrap_or(0);
            for (o, s) in ops.iter().zip(res) {
                if o.dims[dim] % r != 0 {
                    return Err(LockstepError::shape_mismatch(
                        ctx("operand"),
                        format!("dimension {dim} divisible by group size {r}"),
                        o,
                    ));
                }
                let expected = o.with_dim(dim, o.dims[dim] / r);
                if &expected != s {
                    return Err(LockstepError::shape_mismatch(ctx("result"), expected, s));
                }
            }
        }
        CollectiveKind::AllToAll => match d.dimension {
            Some(dim) => {
                if ops.len() != 1 {
                    return Err(LockstepError::shape_mismatch(
                        ctx("operand count"),
                        1,
                        ops.len(),
                    ));
                }
                if ops[0].dims[dim] % r != 0 {
                    return Err(LockstepError::shape_mismatch(
                        ctx("operand"),
                        format!("dimension {dim} divisible by group size {r}"),
                        &ops[0],
                    ));
                }
                if ops[0] != res[0] {
                    return Err(LockstepError::shape_mismatch(ctx("result"), &ops[0], &res[0]));
                }
            }
            None => {
                if ops.len() != r {
                    return Err(LockstepError::shape_mismatch(
                        ctx("operand count"),
                        format!("{r} (one per group member)"),
                        ops.len(),
                    ));
                }
                if let Some(s) = ops.iter().chain(res).find(|s| *s != &ops[0]) {
                    return Err(LockstepError::shape_mismatch(ctx("buffer"), &ops[0], s));
                }
            }
        },
    }
    Ok(())
}
