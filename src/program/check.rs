use super::instruction::{CarriedSlot, Instruction};
use crate::error::{LockstepError, Result};
use crate::memory::Shape;
use std::collections::{HashMap, HashSet};

/// Walks a program in order, tracking the shape of every visible value.
///
/// Names must be unique program-wide; values defined inside a loop body are
/// visible only inside that body.
#[derive(Debug, Default)]
pub(crate) struct Checker {
    visible: HashMap<String, Shape>,
    taken: HashSet<String>,
    scopes: Vec<Vec<String>>,
}

impl Checker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn shape(&self, name: &str) -> Result<&Shape> {
        self.visible
            .get(name)
            .ok_or_else(|| LockstepError::InvalidProgram(format!("value '{name}' is not defined")))
    }

    pub(crate) fn define(&mut self, name: &str, shape: Shape) -> Result<()> {
        if !self.taken.insert(name.to_string()) {
            return Err(LockstepError::InvalidProgram(format!(
                "value '{name}' is defined more than once"
            )));
        }
        self.visible.insert(name.to_string(), shape);
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(name.to_string());
        }
        Ok(())
    }

    pub(crate) fn check_block(&mut self, block: &[Instruction]) -> Result<()> {
        block.iter().try_for_each(|inst| self.check(inst))
    }

    pub(crate) fn check(&mut self, inst: &Instruction) -> Result<()> {
        match inst {
            Instruction::Constant { name, literal } => self.define(name, literal.shape().clone()),
            Instruction::ReplicaId { name, shape } => self.define(name, shape.clone()),
            Instruction::Binary { name, op, lhs, rhs } => {
                let l = self.shape(lhs)?.clone();
                let r = self.shape(rhs)?;
                if &l != r {
                    return Err(LockstepError::shape_mismatch(
                        format!("{op} '{name}'"),
                        &l,
                        r,
                    ));
                }
                self.define(name, l)
            }
            Instruction::Convert {
                name,
                operand,
                dtype,
            } => {
                let dims = self.shape(operand)?.dims.clone();
                self.define(name, Shape::new(*dtype, dims))
            }
            Instruction::Collective {
                outputs,
                operands,
                descriptor,
            } => {
                self.check_operands(operands, descriptor.operand_shapes(), descriptor.name())?;
                self.define_outputs(outputs, descriptor.result_shapes(), descriptor.name())
            }
            Instruction::CollectiveStart {
                operands,
                descriptor,
            } => self.check_operands(operands, descriptor.operand_shapes(), descriptor.name()),
            Instruction::CollectiveDone {
                outputs,
                descriptor,
                ..
            } => self.define_outputs(outputs, descriptor.result_shapes(), descriptor.name()),
            Instruction::Loop(l) => {
                self.enter_loop(&l.carried)?;
                self.check_block(&l.body)?;
                self.exit_loop(&l.name, &l.carried, &l.yields, &l.results)
            }
        }
    }

    /// Bind the loop parameters inside a new scope.
    pub(crate) fn enter_loop(&mut self, carried: &[CarriedSlot]) -> Result<()> {
        let shapes = carried
            .iter()
            .map(|s| self.shape(&s.init).cloned())
            .collect::<Result<Vec<_>>>()?;
        self.scopes.push(Vec::new());
        for (slot, shape) in carried.iter().zip(shapes) {
            self.define(&slot.param, shape)?;
        }
        Ok(())
    }

    /// Check yields against the carried shapes, close the body scope and
    /// bind the loop results.
    pub(crate) fn exit_loop(
        &mut self,
        name: &str,
        carried: &[CarriedSlot],
        yields: &[String],
        results: &[String],
    ) -> Result<()> {
        if yields.len() != carried.len() || results.len() != carried.len() {
            return Err(LockstepError::InvalidProgram(format!(
                "loop '{name}' has {} carried values but {} yields and {} results",
                carried.len(),
                yields.len(),
                results.len()
            )));
        }
        let mut shapes = Vec::with_capacity(carried.len());
        for (slot, y) in carried.iter().zip(yields) {
            let expected = self.shape(&slot.param)?.clone();
            let actual = self.shape(y)?;
            if &expected != actual {
                return Err(LockstepError::shape_mismatch(
                    format!("loop '{name}' yield '{y}'"),
                    &expected,
                    actual,
                ));
            }
            shapes.push(expected);
        }
        for local in self.scopes.pop().unwrap_or_default() {
            self.visible.remove(&local);
        }
        for (r, shape) in results.iter().zip(shapes) {
            self.define(r, shape)?;
        }
        Ok(())
    }

    fn check_operands(&self, operands: &[String], expected: &[Shape], desc: &str) -> Result<()> {
        if operands.len() != expected.len() {
            return Err(LockstepError::shape_mismatch(
                format!("operands of '{desc}'"),
                expected.len(),
                operands.len(),
            ));
        }
        for (name, shape) in operands.iter().zip(expected) {
            let actual = self.shape(name)?;
            if actual != shape {
                return Err(LockstepError::shape_mismatch(
                    format!("operand '{name}' of '{desc}'"),
                    shape,
                    actual,
                ));
            }
        }
        Ok(())
    }

    fn define_outputs(&mut self, outputs: &[String], shapes: &[Shape], desc: &str) -> Result<()> {
        if outputs.len() != shapes.len() {
            return Err(LockstepError::InvalidProgram(format!(
                "'{desc}' produces {} results but binds {} names",
                shapes.len(),
                outputs.len()
            )));
        }
        for (name, shape) in outputs.iter().zip(shapes) {
            self.define(name, shape.clone())?;
        }
        Ok(())
    }
}
