use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Identifier of one replica in a run (0-indexed, contiguous).
pub type ReplicaId = u32;

/// Physical device a replica is pinned to.
pub type DeviceId = u32;

/// Caller-supplied tag pairing a Start with its Done and correlating
/// sibling instances across replicas.
pub type ChannelId = u64;

/// Element types a buffer may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum DataType {
    Pred = 0,
    S8 = 1,
    U8 = 2,
    S32 = 3,
    U32 = 4,
    S64 = 5,
    U64 = 6,
    F32 = 7,
    F64 = 8,
}

impl DataType {
    /// Size of one element in bytes.
    pub const fn size_in_bytes(self) -> usize {
        match self {
            DataType::Pred | DataType::S8 | DataType::U8 => 1,
            DataType::S32 | DataType::U32 | DataType::F32 => 4,
            DataType::S64 | DataType::U64 | DataType::F64 => 8,
        }
    }

    /// Human-readable name, as written in shape strings.
    pub const fn name(self) -> &'static str {
        match self {
            DataType::Pred => "pred",
            DataType::S8 => "s8",
            DataType::U8 => "u8",
            DataType::S32 => "s32",
            DataType::U32 => "u32",
            DataType::S64 => "s64",
            DataType::U64 => "u64",
            DataType::F32 => "f32",
            DataType::F64 => "f64",
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, DataType::F32 | DataType::F64)
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pred" => DataType::Pred,
            "s8" => DataType::S8,
            "u8" => DataType::U8,
            "s32" => DataType::S32,
            "u32" => DataType::U32,
            "s64" => DataType::S64,
            "u64" => DataType::U64,
            "f32" => DataType::F32,
            "f64" => DataType::F64,
            other => return Err(format!("unknown element type '{other}'")),
        })
    }
}

/// Reduction operators. All are commutative; associativity is exact for
/// integer types and for min/max on floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReduceOp {
    /// Element-wise sum across replicas.
    #[serde(alias = "add")]
    Sum,
    /// Element-wise product across replicas.
    #[serde(alias = "multiply")]
    Prod,
    /// Element-wise minimum across replicas.
    #[serde(alias = "minimum")]
    Min,
    /// Element-wise maximum across replicas.
    #[serde(alias = "maximum")]
    Max,
}

impl ReduceOp {
    /// Whether regrouping a chain of this operator over `dtype` values is
    /// guaranteed to produce bit-identical results.
    ///
    /// Float min and max qualify because reductions order floats with
    /// `total_cmp` (signed zeros and NaNs included). Float sum and product
    /// round differently under regrouping.
    pub const fn is_exactly_associative(self, dtype: DataType) -> bool {
        !dtype.is_float() || matches!(self, ReduceOp::Min | ReduceOp::Max)
    }
}

impl std::fmt::Display for ReduceOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReduceOp::Sum => f.write_str("sum"),
            ReduceOp::Prod => f.write_str("prod"),
            ReduceOp::Min => f.write_str("min"),
            ReduceOp::Max => f.write_str("max"),
        }
    }
}

/// The six collective primitives the core knows how to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollectiveKind {
    AllReduce,
    AllGather,
    ReduceScatter,
    AllToAll,
    CollectivePermute,
    CollectiveBroadcast,
}

impl CollectiveKind {
    pub const ALL: [CollectiveKind; 6] = [
        CollectiveKind::AllReduce,
        CollectiveKind::AllGather,
        CollectiveKind::ReduceScatter,
        CollectiveKind::AllToAll,
        CollectiveKind::CollectivePermute,
        CollectiveKind::CollectiveBroadcast,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            CollectiveKind::AllReduce => "all-reduce",
            CollectiveKind::AllGather => "all-gather",
            CollectiveKind::ReduceScatter => "reduce-scatter",
            CollectiveKind::AllToAll => "all-to-all",
            CollectiveKind::CollectivePermute => "collective-permute",
            CollectiveKind::CollectiveBroadcast => "collective-broadcast",
        }
    }

    /// Kinds that merge operands with a reduction operator.
    pub const fn is_reduction(self) -> bool {
        matches!(self, CollectiveKind::AllReduce | CollectiveKind::ReduceScatter)
    }
}

impl std::fmt::Display for CollectiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CollectiveKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CollectiveKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| format!("unknown collective kind '{s}'"))
    }
}
