//! Per-replica instruction streams and their textual description.

mod check;
mod instruction;
mod text;

pub use instruction::{CarriedSlot, Instruction, LoopInstr};

use crate::config::AsyncPolicy;
use crate::descriptor::CollectiveDescriptor;
use crate::error::{LockstepError, Result};
use crate::types::DeviceId;
use check::Checker;
use std::collections::HashSet;
use std::sync::Arc;

/// A validated SPMD program: every replica runs the same instruction
/// stream over its own values.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub replica_count: u32,
    /// Device for each replica, indexed by replica id.
    pub device_assignment: Vec<DeviceId>,
    /// Kinds the program forces synchronous, merged with the run policy.
    pub policy: AsyncPolicy,
    /// Overrides `LockstepConfig::enable_loop_hoisting` when set.
    pub enable_loop_hoisting: Option<bool>,
    pub instructions: Vec<Instruction>,
    pub outputs: Vec<String>,
}

impl Program {
    /// Parse and validate the JSON program description.
    pub fn parse(text: &str) -> Result<Program> {
        text::ProgramText::parse(text)?.lower()
    }

    /// Build a program from instructions assembled in code.
    pub fn new(
        replica_count: u32,
        instructions: Vec<Instruction>,
        outputs: Vec<String>,
    ) -> Result<Program> {
        let program = Program {
            replica_count,
            device_assignment: (0..replica_count).collect(),
            policy: AsyncPolicy::default(),
            enable_loop_hoisting: None,
            instructions,
            outputs,
        };
        program.check()?;
        Ok(program)
    }

    /// Re-validate names, scopes and shapes. Run after every rewrite.
    pub fn check(&self) -> Result<()> {
        if self.replica_count == 0 {
            return Err(LockstepError::InvalidProgram(
                "replica_count must be at least 1".into(),
            ));
        }
        self.check_device_assignment()?;
        let mut checker = Checker::new();
        checker.check_block(&self.instructions)?;
        for out in &self.outputs {
            checker.shape(out)?;
        }
        let mut bad = Vec::new();
        visit_collectives(&self.instructions, &mut |d| {
            if d.replica_count() != self.replica_count {
                bad.push(d.name().to_string());
            }
        });
        if let Some(name) = bad.first() {
            return Err(LockstepError::InvalidDescriptor {
                name: name.clone(),
                reason: format!(
                    "built for a different replica count than the program's {}",
                    self.replica_count
                ),
            });
        }
        Ok(())
    }

    pub(crate) fn check_device_assignment(&self) -> Result<()> {
        if self.device_assignment.len() != self.replica_count as usize {
            return Err(LockstepError::InvalidProgram(format!(
                "device assignment has {} entries for {} replicas",
                self.device_assignment.len(),
                self.replica_count
            )));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.device_assignment.iter().find(|d| !seen.insert(**d)) {
            return Err(LockstepError::InvalidProgram(format!(
                "device {dup} is assigned to more than one replica"
            )));
        }
        Ok(())
    }

    /// Every collective descriptor in program order, loop bodies included.
    /// Start/Done pairs are reported once, at the Start.
    pub fn collectives(&self) -> Vec<Arc<CollectiveDescriptor>> {
        let mut out = Vec::new();
        visit_collectives(&self.instructions, &mut |d| out.push(Arc::clone(d)));
        out
    }
}

pub(crate) fn visit_collectives<F>(block: &[Instruction], f: &mut F)
where
    F: FnMut(&Arc<CollectiveDescriptor>),
{
    for inst in block {
        match inst {
            Instruction::Collective { descriptor, .. }
            | Instruction::CollectiveStart { descriptor, .. } => f(descriptor),
            Instruction::Loop(l) => visit_collectives(&l.body, f),
            _ => {}
        }
    }
}
