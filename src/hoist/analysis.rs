use super::{HoistDecision, HoistPlan, NotSafe};
use crate::program::{Instruction, LoopInstr};
use crate::types::{CollectiveKind, ReduceOp};
use std::collections::{HashMap, HashSet};

/// Decide whether one accumulator recurrence of `l` can have its collective
/// moved out of the loop. Pure: never touches the loop.
pub fn analyze(l: &LoopInstr) -> HoistDecision {
    let mut first_reason = None;
    for (slot, (carried, y)) in l.carried.iter().zip(&l.yields).enumerate() {
        let Some(combine) = find_combine(&l.body, y, &carried.param) else {
            continue;
        };
        let Some(collective_at) = find_collective(&l.body, &combine.other) else {
            continue;
        };
        match check_candidate(l, slot, collective_at, &combine) {
            Ok(plan) => return HoistDecision::Hoist(plan),
            Err(reason) => {
                first_reason.get_or_insert(reason);
            }
        }
    }
    HoistDecision::NotSafe(first_reason.unwrap_or(NotSafe::NoAccumulator))
}

struct Combine {
    at: usize,
    op: ReduceOp,
    other: String,
    other_first: bool,
}

/// `y = op(other, param)` or `y = op(param, other)` at the top level of the body.
fn find_combine(body: &[Instruction], y: &str, param: &str) -> Option<Combine> {
    body.iter().enumerate().find_map(|(at, inst)| match inst {
        Instruction::Binary { name, op, lhs, rhs } if name == y && lhs != rhs => {
            if rhs == param {
                Some(Combine {
                    at,
                    op: *op,
                    other: lhs.clone(),
                    other_first: true,
                })
            } else if lhs == param {
                Some(Combine {
                    at,
                    op: *op,
                    other: rhs.clone(),
                    other_first: false,
                })
            } else {
                None
            }
        }
        _ => None,
    })
}

fn find_collective(body: &[Instruction], output: &str) -> Option<usize> {
    body.iter().position(|inst| match inst {
        Instruction::Collective { outputs, .. } => outputs.iter().any(|o| o == output),
        _ => false,
    })
}

fn check_candidate(
    l: &LoopInstr,
    slot: usize,
    collective_at: usize,
    combine: &Combine,
) -> Result<HoistPlan, NotSafe> {
    let Instruction::Collective {
        outputs,
        operands,
        descriptor,
    } = &l.body[collective_at]
    else {
        return Err(NotSafe::NoAccumulator);
    };

    let kind = descriptor.kind();
    if !matches!(kind, CollectiveKind::AllReduce | CollectiveKind::ReduceScatter) {
        return Err(NotSafe::UnsupportedKind(kind));
    }
    if operands.len() != 1 || outputs.len() != 1 {
        return Err(NotSafe::TupleCollective);
    }
    if descriptor.reduction() != Some(combine.op) {
        return Err(NotSafe::OperatorMismatch {
            combine: combine.op,
            reduction: descriptor.reduction(),
        });
    }
    let dtype = descriptor.operand_shapes()[0].dtype;
    if !combine.op.is_exactly_associative(dtype) {
        return Err(NotSafe::NotAssociative {
            op: combine.op,
            dtype,
        });
    }
    if l.trip_count == 0 {
        return Err(NotSafe::ZeroTripCount);
    }

    let param = &l.carried[slot].param;
    let result = &outputs[0];
    let y = &l.yields[slot];
    let counts = use_counts(l);
    for name in [param, result, y] {
        if counts.get(name.as_str()).copied().unwrap_or(0) != 1 {
            return Err(NotSafe::ExtraUse { name: name.clone() });
        }
    }

    let operand = &operands[0];
    let targets: HashSet<&str> = [param.as_str(), result.as_str()].into_iter().collect();
    if depends_on(&l.body, operand, &targets) {
        return Err(NotSafe::DependsOnAccumulator {
            name: operand.clone(),
        });
    }

    Ok(HoistPlan {
        slot,
        collective_at,
        combine_at: combine.at,
        operand: operand.clone(),
        op: combine.op,
        collective_first: combine.other_first,
    })
}

/// How many times each name is read by the body's top-level instructions
/// (nested loops count their free uses) plus the yields.
fn use_counts(l: &LoopInstr) -> HashMap<&str, usize> {
    let mut counts = HashMap::new();
    let reads = l
        .body
        .iter()
        .flat_map(Instruction::uses)
        .chain(l.yields.iter().map(String::as_str));
    for name in reads {
        *counts.entry(name).or_insert(0) += 1;
    }
    counts
}

/// Whether `name` reaches any of `targets` through the body's def-use chains.
fn depends_on(body: &[Instruction], name: &str, targets: &HashSet<&str>) -> bool {
    let mut producers: HashMap<&str, &Instruction> = HashMap::new();
    for inst in body {
        for d in inst.defs() {
            producers.insert(d, inst);
        }
    }
    let mut stack = vec![name];
    let mut visited = HashSet::new();
    while let Some(n) = stack.pop() {
        if targets.contains(n) {
            return true;
        }
        if !visited.insert(n) {
            continue;
        }
        if let Some(inst) = producers.get(n) {
            stack.extend(inst.uses());
        }
    }
    false
}
