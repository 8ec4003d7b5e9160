//! Loop-invariant collective hoisting.
//!
//! Rewrites a loop whose accumulator is updated as
//! `acc = op(collective(x), acc)` so that `x` is accumulated locally and one
//! collective runs after the loop on the accumulated value. Only done when
//! `op` is the collective's own reduction and regrouping it is exact.

mod analysis;
mod rewrite;

pub use analysis::analyze;

use crate::error::Result;
use crate::program::{Instruction, Program};
use crate::types::{CollectiveKind, DataType, ReduceOp};
use rewrite::NameGen;

/// Outcome of analysing one loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoistDecision {
    Hoist(HoistPlan),
    NotSafe(NotSafe),
}

/// Where the hoistable recurrence lives inside the loop body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoistPlan {
    /// Carried slot holding the accumulator.
    pub slot: usize,
    /// Body index of the collective.
    pub collective_at: usize,
    /// Body index of the combine feeding the accumulator's yield.
    pub combine_at: usize,
    /// The collective's per-iteration operand.
    pub operand: String,
    pub op: ReduceOp,
    /// Whether the collective result is the combine's left operand.
    pub collective_first: bool,
}

/// Why a loop was left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotSafe {
    /// No carried slot is updated by combining a collective result.
    NoAccumulator,
    UnsupportedKind(CollectiveKind),
    TupleCollective,
    OperatorMismatch {
        combine: ReduceOp,
        reduction: Option<ReduceOp>,
    },
    NotAssociative {
        op: ReduceOp,
        dtype: DataType,
    },
    ZeroTripCount,
    /// A value of the recurrence is read outside it.
    ExtraUse {
        name: String,
    },
    DependsOnAccumulator {
        name: String,
    },
}

impl std::fmt::Display for NotSafe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotSafe::NoAccumulator => f.write_str("no collective-fed accumulator"),
            NotSafe::UnsupportedKind(kind) => write!(f, "{kind} cannot be hoisted"),
            NotSafe::TupleCollective => f.write_str("collective has more than one operand"),
            NotSafe::OperatorMismatch { combine, reduction } => match reduction {
                Some(r) => write!(
                    f,
                    "accumulator combines with {combine} but collective reduces with {r}"
                ),
                None => write!(
                    f,
                    "accumulator combines with {combine} but collective has no reduction"
                ),
            },
            NotSafe::NotAssociative { op, dtype } => {
                write!(f, "{op} is not exactly associative over {dtype}")
            }
            NotSafe::ZeroTripCount => f.write_str("loop never runs"),
            NotSafe::ExtraUse { name } => write!(f, "'{name}' has uses outside the recurrence"),
            NotSafe::DependsOnAccumulator { name } => {
                write!(f, "'{name}' depends on the accumulator")
            }
        }
    }
}

/// Applies [`analyze`] to every loop, innermost first, until nothing changes.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoopHoister;

impl LoopHoister {
    pub fn new() -> Self {
        Self
    }

    /// Rewrite `program` in place. Returns the names of the hoisted
    /// collectives in the order they were created.
    pub fn run(&self, program: &mut Program) -> Result<Vec<String>> {
        let mut names = NameGen::for_block(&program.instructions);
        let mut hoisted = Vec::new();
        while hoist_block(&mut program.instructions, &mut names, &mut hoisted)? {}
        if !hoisted.is_empty() {
            program.check()?;
        }
        Ok(hoisted)
    }
}

fn hoist_block(
    block: &mut Vec<Instruction>,
    names: &mut NameGen,
    hoisted: &mut Vec<String>,
) -> Result<bool> {
    let mut changed = false;
    let mut i = 0;
    while i < block.len() {
        let decision = match &mut block[i] {
            Instruction::Loop(l) => {
                changed |= hoist_block(&mut l.body, names, hoisted)?;
                Some((l.name.clone(), analyze(l)))
            }
            _ => None,
        };
        match decision {
            Some((loop_name, HoistDecision::Hoist(plan))) => {
                let name = rewrite::apply(block, i, &plan, names)?;
                tracing::info!(
                    loop_name = %loop_name,
                    collective = %name,
                    op = %plan.op,
                    "hoisted loop-invariant collective"
                );
                hoisted.push(name);
                changed = true;
                // Skip the init constant, the loop and the two trailing
                // instructions; the next pass revisits the loop.
                i += 4;
            }
            Some((loop_name, HoistDecision::NotSafe(reason))) => {
                tracing::debug!(loop_name = %loop_name, %reason, "loop left in place");
                i += 1;
            }
            None => i += 1,
        }
    }
    Ok(changed)
}
