//! Maps batches on tokio's blocking pool and gathers the results back, replacing
//! failed computations with an empty batch.
use std::sync::Arc;

use creditflow::channels::Node;
use creditflow::credit::{CountingLedger, Credits};
use creditflow::errorhandling::OperatorError;
use creditflow::operators::{GatherFallback, GatherNode, RemoteBatchMapper, TracingDiagnostics};
use creditflow::remote::{RemoteHandle, TokioExecutor};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let ledger = CountingLedger::new();

    let mut gather: GatherFallback<Vec<RemoteHandle<u64>>, ()> = GatherFallback::builder()
        .name("gather")
        .default_obj(Vec::new())
        .ledger(ledger.shared())
        .diagnostics(Arc::new(TracingDiagnostics))
        .build();
    gather.subscribe(|squares: Vec<u64>, credits: Credits| {
        println!("{squares:?} with {} credits", credits.len());
        Ok::<_, OperatorError>(Vec::new())
    });
    let node = GatherNode::new(gather);
    let in_flight = node.in_flight();

    let mut square = RemoteBatchMapper::new("square", TokioExecutor::current(), |x: u64| {
        x.checked_mul(x).ok_or("overflow")
    });
    square.subscribe(node);

    for batch in [vec![1, 2, 3], vec![u64::MAX, 4], vec![5]] {
        square.update(batch, ledger.issue_many(1))?;
    }
    in_flight.join_all().await?;
    println!("ledger: {:?}", ledger.stats());
    Ok(())
}
