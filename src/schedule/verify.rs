use crate::descriptor::Synchronicity;
use crate::error::{LockstepError, Result};
use crate::program::{Instruction, Program};
use crate::types::{ChannelId, CollectiveKind};
use std::collections::{BTreeSet, HashMap};

/// Check a scheduled program's async structure.
///
/// Every kind is either always blocking or always split; within each block
/// a Start precedes its Done, every Start has a Done, and no two in-flight
/// instances share a channel. Returns the kinds that are split.
pub fn verify(program: &Program) -> Result<BTreeSet<CollectiveKind>> {
    let mut modes: HashMap<CollectiveKind, Synchronicity> = HashMap::new();
    verify_block(&program.instructions, &mut modes)?;
    Ok(modes
        .into_iter()
        .filter(|(_, s)| *s == Synchronicity::Async)
        .map(|(k, _)| k)
        .collect())
}

fn violation(reason: String) -> LockstepError {
    LockstepError::AsyncProtocolViolation {
        replica: None,
        reason,
    }
}

fn record(
    modes: &mut HashMap<CollectiveKind, Synchronicity>,
    kind: CollectiveKind,
    mode: Synchronicity,
) -> Result<()> {
    match modes.insert(kind, mode) {
        Some(prev) if prev != mode => Err(violation(format!(
            "{kind} is lowered both {prev:?} and {mode:?}"
        ))),
        _ => Ok(()),
    }
}

fn verify_block(
    block: &[Instruction],
    modes: &mut HashMap<CollectiveKind, Synchronicity>,
) -> Result<()> {
    let mut in_flight: HashMap<ChannelId, &str> = HashMap::new();
    for inst in block {
        match inst {
            Instruction::Collective { descriptor, .. } => {
                if descriptor.synchronicity() != Synchronicity::Sync {
                    return Err(violation(format!(
                        "'{}' is marked async but runs as a blocking call",
                        descriptor.name()
                    )));
                }
                record(modes, descriptor.kind(), Synchronicity::Sync)?;
            }
            Instruction::CollectiveStart { descriptor, .. } => {
                let channel = descriptor.channel().ok_or_else(|| {
                    violation(format!("start of '{}' has no channel", descriptor.name()))
                })?;
                if descriptor.synchronicity() != Synchronicity::Async {
                    return Err(violation(format!(
                        "'{}' is started but not marked async",
                        descriptor.name()
                    )));
                }
                record(modes, descriptor.kind(), Synchronicity::Async)?;
                if let Some(other) = in_flight.insert(channel, descriptor.name()) {
                    return Err(violation(format!(
                        "'{}' starts on channel {channel} while '{other}' is in flight",
                        descriptor.name()
                    )));
                }
            }
            Instruction::CollectiveDone { channel, .. } => {
                if in_flight.remove(channel).is_none() {
                    return Err(violation(format!(
                        "done on channel {channel} has no preceding start"
                    )));
                }
            }
            Instruction::Loop(l) => verify_block(&l.body, modes)?,
            _ => {}
        }
    }
    if let Some((channel, name)) = in_flight.into_iter().next() {
        return Err(violation(format!(
            "start of '{name}' on channel {channel} has no done"
        )));
    }
    Ok(())
}
