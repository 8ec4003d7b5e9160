pub mod collective;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod hoist;
pub mod memory;
pub mod program;
mod reduce;
pub mod runtime;
pub mod schedule;
pub mod transport;
pub mod types;

pub use collective::{CollectiveHandle, Instance};
pub use config::{AsyncPolicy, LockstepConfig};
pub use descriptor::{CollectiveDescriptor, ReplicaGroup, Synchronicity};
pub use error::{LockstepError, Result};
pub use hoist::{HoistDecision, LoopHoister, NotSafe};
pub use memory::{Literal, Shape};
pub use program::{Instruction, Program};
pub use runtime::Runtime;
pub use schedule::{ScheduledProgram, Scheduler};
pub use transport::{LocalTransport, Transport};
pub use types::{ChannelId, CollectiveKind, DataType, DeviceId, ReduceOp, ReplicaId};
