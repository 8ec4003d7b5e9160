use crate::descriptor::CollectiveDescriptor;
use crate::memory::{Literal, Shape};
use crate::types::{ChannelId, DataType, ReduceOp};
use serde::Deserialize;
use std::sync::Arc;

/// One step of a replica's local instruction stream.
///
/// Values are named and defined exactly once (names are unique across the
/// whole program, loop bodies included).
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// A literal known to the frontend.
    Constant { name: String, literal: Literal },
    /// The executing replica's id, converted to `shape.dtype` and broadcast.
    ReplicaId { name: String, shape: Shape },
    /// Element-wise `op(lhs, rhs)`.
    Binary {
        name: String,
        op: ReduceOp,
        lhs: String,
        rhs: String,
    },
    /// Element-wise type conversion.
    Convert {
        name: String,
        operand: String,
        dtype: DataType,
    },
    /// A blocking collective: one call, results bound to `outputs`.
    Collective {
        outputs: Vec<String>,
        operands: Vec<String>,
        descriptor: Arc<CollectiveDescriptor>,
    },
    /// Initiates an async collective on the descriptor's channel.
    CollectiveStart {
        operands: Vec<String>,
        descriptor: Arc<CollectiveDescriptor>,
    },
    /// Completes the in-flight collective on `channel`.
    CollectiveDone {
        outputs: Vec<String>,
        channel: ChannelId,
        descriptor: Arc<CollectiveDescriptor>,
    },
    /// A counted loop with loop-carried values.
    Loop(LoopInstr),
}

/// One loop-carried value: `param` is bound to `init` before the first
/// iteration and to the matching yield afterwards.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CarriedSlot {
    pub param: String,
    pub init: String,
}

/// A loop with a statically known trip count.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopInstr {
    pub name: String,
    pub trip_count: u64,
    pub carried: Vec<CarriedSlot>,
    pub body: Vec<Instruction>,
    /// Body values fed to the next iteration, one per carried slot.
    pub yields: Vec<String>,
    /// Names bound to the final carried values, one per carried slot.
    pub results: Vec<String>,
}

impl Instruction {
    /// Names this instruction defines in its enclosing scope.
    pub fn defs(&self) -> Vec<&str> {
        match self {
            Instruction::Constant { name, .. }
            | Instruction::ReplicaId { name, .. }
            | Instruction::Binary { name, .. }
            | Instruction::Convert { name, .. } => vec![name.as_str()],
            Instruction::Collective { outputs, .. } | Instruction::CollectiveDone { outputs, .. } => {
                outputs.iter().map(String::as_str).collect()
            }
            Instruction::CollectiveStart { .. } => Vec::new(),
            Instruction::Loop(l) => l.results.iter().map(String::as_str).collect(),
        }
    }

    /// Names this instruction reads from its enclosing scope.
    ///
    /// For a loop this is the carried inits plus every free name its body
    /// reads (transitively through nested loops).
    pub fn uses(&self) -> Vec<&str> {
        match self {
            Instruction::Constant { .. }
            | Instruction::ReplicaId { .. }
            | Instruction::CollectiveDone { .. } => Vec::new(),
            Instruction::Binary { lhs, rhs, .. } => vec![lhs.as_str(), rhs.as_str()],
            Instruction::Convert { operand, .. } => vec![operand.as_str()],
            Instruction::Collective { operands, .. }
            | Instruction::CollectiveStart { operands, .. } => {
                operands.iter().map(String::as_str).collect()
            }
            Instruction::Loop(l) => l.free_uses(),
        }
    }

    pub fn as_loop(&self) -> Option<&LoopInstr> {
        match self {
            Instruction::Loop(l) => Some(l),
            _ => None,
        }
    }
}

impl LoopInstr {
    /// Names the loop reads from the enclosing scope.
    pub fn free_uses(&self) -> Vec<&str> {
        let mut local: Vec<&str> = self.carried.iter().map(|s| s.param.as_str()).collect();
        for inst in &self.body {
            local.extend(inst.defs());
        }
        let mut free: Vec<&str> = self.carried.iter().map(|s| s.init.as_str()).collect();
        let body_uses = self
            .body
            .iter()
            .flat_map(Instruction::uses)
            .chain(self.yields.iter().map(String::as_str));
        for name in body_uses {
            if !local.contains(&name) && !free.contains(&name) {
                free.push(name);
            }
        }
        free
    }
}
