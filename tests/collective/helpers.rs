use lockstep::{
    CollectiveDescriptor, Instance, LocalTransport, LockstepConfig, Literal, Program, ReplicaId,
    Result, Runtime, Transport,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Route `tracing` output to the test harness; filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Helper: run `f` once per replica concurrently over one shared transport.
/// Returns each replica's output in replica order.
pub async fn run_replicas<F, Fut, T>(replica_count: u32, f: F) -> Vec<T>
where
    F: Fn(ReplicaId, Arc<dyn Transport>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    init_tracing();
    let transport: Arc<dyn Transport> = Arc::new(LocalTransport::new(replica_count, 16));
    let f = Arc::new(f);
    let mut handles = Vec::new();
    for replica in 0..replica_count {
        let f = Arc::clone(&f);
        let transport = Arc::clone(&transport);
        handles.push(tokio::spawn(async move { f(replica, transport).await }));
    }
    let mut outputs = Vec::new();
    for h in handles {
        outputs.push(h.await.unwrap());
    }
    outputs
}

/// Helper: run one instance of `descriptor` on every replica, feeding it
/// `operands(replica)`.
pub async fn run_descriptor<F>(
    descriptor: CollectiveDescriptor,
    operands: F,
) -> Vec<Result<Vec<Literal>>>
where
    F: Fn(ReplicaId) -> Vec<Literal> + Send + Sync + 'static,
{
    let replica_count = descriptor.replica_count();
    let descriptor = Arc::new(descriptor);
    run_replicas(replica_count, move |replica, transport| {
        let inst = Instance::new(transport, Arc::clone(&descriptor), replica, 1, TEST_TIMEOUT);
        let args = operands(replica);
        async move { inst.run(args).await }
    })
    .await
}

/// Helper: parse and execute a program with the given config.
pub async fn run_program(text: &str, config: LockstepConfig) -> Vec<Vec<Literal>> {
    init_tracing();
    let program = Program::parse(text).unwrap();
    Runtime::new(config.with_rendezvous_timeout(TEST_TIMEOUT))
        .execute(program)
        .await
        .unwrap()
}

pub fn u32s(lit: &Literal) -> Vec<u32> {
    lit.to_vec::<u32>().unwrap()
}
