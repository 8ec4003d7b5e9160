use super::HoistPlan;
use crate::error::{LockstepError, Result};
use crate::memory::Literal;
use crate::program::{CarriedSlot, Instruction};
use std::collections::HashSet;
use std::sync::Arc;

/// Hands out names no instruction in the program already defines.
#[derive(Debug, Default)]
pub(crate) struct NameGen {
    taken: HashSet<String>,
}

impl NameGen {
    pub(crate) fn for_block(block: &[Instruction]) -> Self {
        let mut names = Self::default();
        names.collect(block);
        names
    }

    fn collect(&mut self, block: &[Instruction]) {
        for inst in block {
            self.taken.extend(inst.defs().into_iter().map(str::to_string));
            if let Instruction::Loop(l) = inst {
                self.taken.extend(l.carried.iter().map(|s| s.param.clone()));
                self.collect(&l.body);
            }
        }
    }

    pub(crate) fn fresh(&mut self, base: &str) -> String {
        let mut candidate = base.to_string();
        let mut n = 1;
        while self.taken.contains(&candidate) {
            candidate = format!("{base}.{n}");
            n += 1;
        }
        self.taken.insert(candidate.clone());
        candidate
    }
}

/// Apply `plan` to the loop at `block[at]`.
///
/// Emits, in place of the loop:
/// `acc_init = identity; loop(..., acc); hoisted = collective(acc_out);
/// result = op(hoisted, partial)`. Returns the hoisted descriptor's name.
pub(crate) fn apply(
    block: &mut Vec<Instruction>,
    at: usize,
    plan: &HoistPlan,
    names: &mut NameGen,
) -> Result<String> {
    let mismatch =
        || LockstepError::InvalidProgram(format!("hoist plan does not match loop at {at}"));
    let Some(Instruction::Loop(l)) = block.get_mut(at) else {
        return Err(mismatch());
    };
    let Some(Instruction::Collective { descriptor, .. }) = l.body.get(plan.collective_at) else {
        return Err(mismatch());
    };
    let descriptor = Arc::clone(descriptor);
    let x_shape = descriptor.operand_shapes()[0].clone();

    let acc_init = names.fresh(&format!("{}.acc_init", plan.operand));
    let acc_param = names.fresh(&format!("{}.acc", plan.operand));
    let acc_next = names.fresh(&format!("{}.acc_next", plan.operand));
    let acc_out = names.fresh(&format!("{}.acc_out", plan.operand));
    let hoisted = names.fresh(&format!("{}.hoisted", descriptor.name()));
    let result = l.results[plan.slot].clone();
    let partial = names.fresh(&format!("{result}.partial"));

    // The combine always follows the collective it reads.
    l.body.remove(plan.combine_at);
    l.body[plan.collective_at] = Instruction::Binary {
        name: acc_next.clone(),
        op: plan.op,
        lhs: acc_param.clone(),
        rhs: plan.operand.clone(),
    };
    l.yields[plan.slot] = l.carried[plan.slot].param.clone();
    l.results[plan.slot] = partial.clone();
    l.carried.push(CarriedSlot {
        param: acc_param,
        init: acc_init.clone(),
    });
    l.yields.push(acc_next);
    l.results.push(acc_out.clone());

    let (lhs, rhs) = if plan.collective_first {
        (hoisted.clone(), partial)
    } else {
        (partial, hoisted.clone())
    };
    block.insert(
        at,
        Instruction::Constant {
            name: acc_init,
            literal: Literal::identity(x_shape, plan.op),
        },
    );
    block.insert(
        at + 2,
        Instruction::Collective {
            outputs: vec![hoisted.clone()],
            operands: vec![acc_out],
            descriptor: Arc::new(descriptor.renamed(hoisted.as_str())),
        },
    );
    block.insert(
        at + 3,
        Instruction::Binary {
            name: result,
            op: plan.op,
            lhs,
            rhs,
        },
    );
    Ok(hoisted)
}
