//! JSON form of a program as written by the frontend.

use super::check::Checker;
use super::instruction::{CarriedSlot, Instruction, LoopInstr};
use super::Program;
use crate::config::AsyncPolicy;
use crate::descriptor::{CollectiveDescriptor, ReplicaGroup};
use crate::error::{LockstepError, Result};
use crate::memory::{Literal, Shape};
use crate::types::{ChannelId, CollectiveKind, DataType, DeviceId, ReduceOp, ReplicaId};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ProgramText {
    replica_count: u32,
    #[serde(default)]
    device_assignment: Option<Vec<DeviceId>>,
    #[serde(default)]
    policy: AsyncPolicy,
    #[serde(default)]
    enable_loop_hoisting: Option<bool>,
    instructions: Vec<InstructionText>,
    #[serde(default)]
    outputs: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
enum InstructionText {
    Constant {
        name: String,
        shape: Shape,
        values: Vec<serde_json::Value>,
    },
    ReplicaId {
        name: String,
        #[serde(default = "scalar_u32")]
        shape: Shape,
    },
    Binary {
        name: String,
        apply: ReduceOp,
        lhs: String,
        rhs: String,
    },
    Convert {
        name: String,
        operand: String,
        dtype: DataType,
    },
    Collective(CollectiveText),
    Loop(LoopText),
}

#[derive(Debug, Deserialize)]
struct CollectiveText {
    name: String,
    kind: CollectiveKind,
    operands: Vec<String>,
    result_shapes: Vec<Shape>,
    #[serde(default)]
    outputs: Option<Vec<String>>,
    #[serde(default)]
    replica_groups: Vec<ReplicaGroup>,
    #[serde(default, alias = "to_apply")]
    reduction: Option<ReduceOp>,
    #[serde(default, alias = "dimensions")]
    dimension: Option<DimensionText>,
    #[serde(default)]
    source_target_pairs: Vec<(ReplicaId, ReplicaId)>,
    #[serde(default, alias = "channel_id")]
    channel: Option<ChannelId>,
}

/// `"dimension": 0` or `"dimensions": [0]`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DimensionText {
    One(usize),
    List(Vec<usize>),
}

#[derive(Debug, Deserialize)]
struct LoopText {
    name: String,
    trip_count: u64,
    #[serde(default)]
    carried: Vec<CarriedSlot>,
    body: Vec<InstructionText>,
    #[serde(default)]
    yields: Vec<String>,
    #[serde(default)]
    results: Vec<String>,
}

fn scalar_u32() -> Shape {
    Shape::scalar(DataType::U32)
}

impl ProgramText {
    pub(crate) fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Resolve names and shapes and build validated descriptors.
    pub(crate) fn lower(self) -> Result<Program> {
        let replica_count = self.replica_count;
        if replica_count == 0 {
            return Err(LockstepError::InvalidProgram(
                "replica_count must be at least 1".into(),
            ));
        }
        let mut checker = Checker::new();
        let instructions = lower_block(self.instructions, replica_count, &mut checker)?;
        for out in &self.outputs {
            checker.shape(out)?;
        }
        let device_assignment = self
            .device_assignment
            .unwrap_or_else(|| (0..replica_count).collect());

        let program = Program {
            replica_count,
            device_assignment,
            policy: self.policy,
            enable_loop_hoisting: self.enable_loop_hoisting,
            instructions,
            outputs: self.outputs,
        };
        program.check_device_assignment()?;
        Ok(program)
    }
}

fn lower_block(
    block: Vec<InstructionText>,
    replica_count: u32,
    checker: &mut Checker,
) -> Result<Vec<Instruction>> {
    let mut out = Vec::with_capacity(block.len());
    for text in block {
        let inst = match text {
            InstructionText::Loop(l) => {
                checker.enter_loop(&l.carried)?;
                let body = lower_block(l.body, replica_count, checker)?;
                checker.exit_loop(&l.name, &l.carried, &l.yields, &l.results)?;
                out.push(Instruction::Loop(LoopInstr {
                    name: l.name,
                    trip_count: l.trip_count,
                    carried: l.carried,
                    body,
                    yields: l.yields,
                    results: l.results,
                }));
                continue;
            }
            InstructionText::Constant {
                name,
                shape,
                values,
            } => Instruction::Constant {
                literal: literal_from_json(&name, shape, &values)?,
                name,
            },
            InstructionText::ReplicaId { name, shape } => Instruction::ReplicaId { name, shape },
            InstructionText::Binary {
                name,
                apply,
                lhs,
                rhs,
            } => Instruction::Binary {
                name,
                op: apply,
                lhs,
                rhs,
            },
            InstructionText::Convert {
                name,
                operand,
                dtype,
            } => Instruction::Convert {
                name,
                operand,
                dtype,
            },
            InstructionText::Collective(c) => lower_collective(c, replica_count, checker)?,
        };
        checker.check(&inst)?;
        out.push(inst);
    }
    Ok(out)
}

fn lower_collective(
    c: CollectiveText,
    replica_count: u32,
    checker: &Checker,
) -> Result<Instruction> {
    let operand_shapes = c
        .operands
        .iter()
        .map(|o| checker.shape(o).cloned())
        .collect::<Result<Vec<_>>>()?;

    let mut builder = CollectiveDescriptor::builder(&c.name, c.kind)
        .operands(operand_shapes)
        .results(c.result_shapes.iter().cloned())
        .groups(c.replica_groups)
        .pairs(c.source_target_pairs)
        .channel(c.channel);
    if let Some(op) = c.reduction {
        builder = builder.reduction(op);
    }
    match c.dimension {
        Some(DimensionText::One(d)) => builder = builder.dimension(d),
        Some(DimensionText::List(dims)) => match dims.as_slice() {
            [] => {}
            [d] => builder = builder.dimension(*d),
            _ => {
                return Err(LockstepError::InvalidDescriptor {
                    name: c.name,
                    reason: format!("expected a single split dimension, got {dims:?}"),
                });
            }
        },
        None => {}
    }
    let descriptor = builder.build(replica_count)?;

    let outputs = c.outputs.unwrap_or_else(|| match c.result_shapes.len() {
        1 => vec![c.name.clone()],
        n => (0..n).map(|i| format!("{}.{i}", c.name)).collect(),
    });
    Ok(Instruction::Collective {
        outputs,
        operands: c.operands,
        descriptor: Arc::new(descriptor),
    })
}

/// Build a constant from JSON numbers (or booleans for `pred`). A single
/// value is broadcast to the whole shape.
fn literal_from_json(name: &str, shape: Shape, values: &[serde_json::Value]) -> Result<Literal> {
    let count = shape.element_count();
    if values.len() != count && values.len() != 1 {
        return Err(LockstepError::shape_mismatch(
            format!("constant '{name}'"),
            format!("{count} values for {shape}"),
            format!("{} values", values.len()),
        ));
    }
    let bad = |v: &serde_json::Value| {
        LockstepError::InvalidProgram(format!(
            "constant '{name}': {v} is not a valid {} value",
            shape.dtype
        ))
    };
    let dims = shape.dims.clone();

    let literal = match shape.dtype {
        DataType::Pred => {
            let parsed = values
                .iter()
                .map(|v| match v {
                    serde_json::Value::Bool(b) => Ok(*b),
                    serde_json::Value::Number(n) => {
                        n.as_f64().map(|f| f != 0.0).ok_or_else(|| bad(v))
                    }
                    _ => Err(bad(v)),
                })
                .collect::<Result<Vec<bool>>>()?;
            Literal::from_vec(dims, broadcast(parsed, count))?
        }
        DataType::U64 => {
            let parsed = values
                .iter()
                .map(|v| v.as_u64().ok_or_else(|| bad(v)))
                .collect::<Result<Vec<u64>>>()?;
            Literal::from_vec(dims, broadcast(parsed, count))?
        }
        dtype if dtype.is_float() => {
            let parsed = values
                .iter()
                .map(|v| v.as_f64().ok_or_else(|| bad(v)))
                .collect::<Result<Vec<f64>>>()?;
            Literal::from_vec(dims, broadcast(parsed, count))?.convert(dtype)
        }
        dtype => {
            let parsed = values
                .iter()
                .map(|v| v.as_i64().ok_or_else(|| bad(v)))
                .collect::<Result<Vec<i64>>>()?;
            Literal::from_vec(dims, broadcast(parsed, count))?.convert(dtype)
        }
    };
    Ok(literal)
}

fn broadcast<T: Copy>(values: Vec<T>, count: usize) -> Vec<T> {
    match values.as_slice() {
        [single] if count != 1 => vec![*single; count],
        _ => values,
    }
}
