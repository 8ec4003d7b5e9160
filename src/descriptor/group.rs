use crate::error::{LockstepError, Result};
use crate::types::{CollectiveKind, ReplicaId};
use serde::{Deserialize, Serialize};

/// Replicas that jointly participate in one collective instance.
///
/// Members keep the order the frontend listed them in; that order only
/// matters for `collective-broadcast`, whose source is the first member.
/// Every other kind orders contributions by ascending replica id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaGroup {
    members: Vec<ReplicaId>,
}

impl ReplicaGroup {
    pub fn new(members: impl Into<Vec<ReplicaId>>) -> Self {
        Self {
            members: members.into(),
        }
    }

    /// The implicit group covering `0..replica_count`.
    pub fn all(replica_count: u32) -> Self {
        Self::new((0..replica_count).collect::<Vec<_>>())
    }

    /// Members in listed order.
    pub fn members(&self) -> &[ReplicaId] {
        &self.members
    }

    /// Members in ascending replica-id order.
    pub fn sorted(&self) -> Vec<ReplicaId> {
        let mut m = self.members.clone();
        m.sort_unstable();
        m
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, replica: ReplicaId) -> bool {
        self.members.contains(&replica)
    }

    /// Position of `replica` in ascending-id order.
    pub fn position(&self, replica: ReplicaId) -> Option<usize> {
        self.sorted().iter().position(|&r| r == replica)
    }

    /// First listed member; the broadcast source.
    pub fn source(&self) -> Option<ReplicaId> {
        self.members.first().copied()
    }
}

/// Validated group layout of one descriptor, indexed by replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupIndex {
    groups: Vec<ReplicaGroup>,
    by_replica: Vec<Option<usize>>,
}

impl GroupIndex {
    /// Validate `groups` for `kind` over `replica_count` replicas and index them.
    ///
    /// An empty list means one implicit group of every replica.
    pub fn build(
        kind: CollectiveKind,
        groups: &[ReplicaGroup],
        replica_count: u32,
    ) -> Result<GroupIndex> {
        if replica_count == 0 {
            return Err(LockstepError::invalid_group(kind, "replica count is zero"));
        }
        let groups: Vec<ReplicaGroup> = if groups.is_empty() {
            vec![ReplicaGroup::all(replica_count)]
        } else {
            groups.to_vec()
        };

        let mut by_replica = vec![None; replica_count as usize];
        for (gi, group) in groups.iter().enumerate() {
            if group.is_empty() {
                return Err(LockstepError::invalid_group(
                    kind,
                    format!("group {gi} is empty"),
                ));
            }
            for &r in group.members() {
                let slot = by_replica.get_mut(r as usize).ok_or_else(|| {
                    LockstepError::invalid_group(
                        kind,
                        format!("replica {r} is out of range for {replica_count} replicas"),
                    )
                })?;
                if let Some(prev) = slot.replace(gi) {
                    return Err(LockstepError::invalid_group(
                        kind,
                        format!("replica {r} appears in groups {prev} and {gi}"),
                    ));
                }
            }
        }

        let must_cover = !matches!(kind, CollectiveKind::CollectiveBroadcast);
        if must_cover {
            if let Some(missing) = by_replica.iter().position(Option::is_none) {
                return Err(LockstepError::invalid_group(
                    kind,
                    format!("replica {missing} is not in any group"),
                ));
            }
        }

        let uniform = matches!(
            kind,
            CollectiveKind::AllGather | CollectiveKind::ReduceScatter | CollectiveKind::AllToAll
        );
        if uniform {
            let size = groups[0].len();
            if let Some(g) = groups.iter().find(|g| g.len() != size) {
                return Err(LockstepError::invalid_group(
                    kind,
                    format!(
                        "groups must have equal size: found {} and {}",
                        size,
                        g.len()
                    ),
                ));
            }
        }

        Ok(GroupIndex { groups, by_replica })
    }

    /// Group containing `replica`, if any.
    pub fn group_of(&self, replica: ReplicaId) -> Option<&ReplicaGroup> {
        self.by_replica
            .get(replica as usize)
            .copied()
            .flatten()
            .map(|gi| &self.groups[gi])
    }

    pub fn groups(&self) -> &[ReplicaGroup] {
        &self.groups
    }

    /// Size of the largest group.
    pub fn max_group_size(&self) -> usize {
        self.groups.iter().map(ReplicaGroup::len).max().unwrap_or(0)
    }
}

/// Validate collective-permute pairs: endpoints in range, unique sources,
/// unique targets.
pub(crate) fn validate_pairs(pairs: &[(ReplicaId, ReplicaId)], replica_count: u32) -> Result<()> {
    let kind = CollectiveKind::CollectivePermute;
    let mut seen_src = vec![false; replica_count as usize];
    let mut seen_dst = vec![false; replica_count as usize];
    for &(src, dst) in pairs {
        for r in [src, dst] {
            if r >= replica_count {
                return Err(LockstepError::invalid_group(
                    kind,
                    format!("replica {r} is out of range for {replica_count} replicas"),
                ));
            }
        }
        if std::mem::replace(&mut seen_src[src as usize], true) {
            return Err(LockstepError::invalid_group(
                kind,
                format!("source {src} appears in more than one pair"),
            ));
        }
        if std::mem::replace(&mut seen_dst[dst as usize], true) {
            return Err(LockstepError::invalid_group(
                kind,
                format!("target {dst} appears in more than one pair"),
            ));
        }
    }
    Ok(())
}
