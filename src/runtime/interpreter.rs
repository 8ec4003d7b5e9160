use super::context::ExecutionContext;
use crate::error::{LockstepError, Result};
use crate::memory::Literal;
use crate::program::{Instruction, LoopInstr, Program};
use futures::future::BoxFuture;

/// Run every instruction of `program` on one replica and return the
/// program outputs.
pub(crate) async fn run_replica(
    mut ctx: ExecutionContext,
    program: &Program,
) -> Result<Vec<Literal>> {
    run_block(&mut ctx, &program.instructions).await?;
    ctx.finish()?;
    ctx.collect(&program.outputs)
}

fn run_block<'a>(
    ctx: &'a mut ExecutionContext,
    block: &'a [Instruction],
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        for inst in block {
            step(ctx, inst).await?;
        }
        Ok(())
    })
}

async fn step(ctx: &mut ExecutionContext, inst: &Instruction) -> Result<()> {
    match inst {
        Instruction::Constant { name, literal } => ctx.bind(name, literal.clone()),
        Instruction::ReplicaId { name, shape } => {
            let count = shape.element_count();
            let id = Literal::from_vec(shape.dims.clone(), vec![u64::from(ctx.replica()); count])?;
            ctx.bind(name, id.convert(shape.dtype));
        }
        Instruction::Binary { name, op, lhs, rhs } => {
            let value = ctx.get(lhs)?.elementwise(ctx.get(rhs)?, *op)?;
            ctx.bind(name, value);
        }
        Instruction::Convert {
            name,
            operand,
            dtype,
        } => {
            let value = ctx.get(operand)?.convert(*dtype);
            ctx.bind(name, value);
        }
        Instruction::Collective {
            outputs,
            operands,
            descriptor,
        } => {
            let args = ctx.collect(operands)?;
            let results = ctx.instance(descriptor).run(args).await?;
            ctx.bind_all(outputs, results)?;
        }
        Instruction::CollectiveStart {
            operands,
            descriptor,
        } => {
            let channel = descriptor.channel().ok_or_else(|| {
                LockstepError::AsyncProtocolViolation {
                    replica: Some(ctx.replica()),
                    reason: format!("start of '{}' has no channel", descriptor.name()),
                }
            })?;
            let args = ctx.collect(operands)?;
            let handle = ctx.instance(descriptor).spawn(args);
            ctx.start(channel, handle)?;
        }
        Instruction::CollectiveDone {
            outputs, channel, ..
        } => {
            let results = ctx.take(*channel)?.wait().await?;
            ctx.bind_all(outputs, results)?;
        }
        Instruction::Loop(l) => run_loop(ctx, l).await?,
    }
    Ok(())
}

async fn run_loop(ctx: &mut ExecutionContext, l: &LoopInstr) -> Result<()> {
    let inits: Vec<String> = l.carried.iter().map(|s| s.init.clone()).collect();
    let mut carried = ctx.collect(&inits)?;
    for _ in 0..l.trip_count {
        for (slot, value) in l.carried.iter().zip(carried) {
            ctx.bind(&slot.param, value);
        }
        run_block(ctx, &l.body).await?;
        carried = ctx.collect(&l.yields)?;
    }
    ctx.bind_all(&l.results, carried)
}
