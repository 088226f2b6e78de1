//! Regroups uneven batches into fixed size ones and partitions a sparse stream,
//! printing every emission and every settled credit.
use creditflow::channels::Node;
use creditflow::credit::{CountingLedger, Credits};
use creditflow::errorhandling::OperatorError;
use creditflow::operators::{BatchMapper, PairPartitioner, RebatchBuffer};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let ledger = CountingLedger::new();
    ledger.on_settle(|token| println!("credit {token} settled"));

    let mut rebatch: RebatchBuffer<i32, usize> = RebatchBuffer::new("rebatch", 4, ledger.shared())?;
    rebatch.subscribe(|batch: Vec<i32>, credits: Credits| {
        println!("batch {batch:?} with {} credits", credits.len());
        Ok::<_, OperatorError>(vec![batch.len()])
    });
    let mut double = BatchMapper::new("double", |x: i32| x * 2);
    double.subscribe(rebatch);

    for batch in [vec![0, 1, 2], vec![3, 4, 5, 6, 7], vec![8], vec![9, 10, 11]] {
        let sizes = double.update(batch, ledger.issue_many(1))?;
        println!("emitted batches of sizes {sizes:?}");
    }
    println!("ledger after rebatching: {:?}", ledger.stats());

    let mut partition: PairPartitioner<char, ()> = PairPartitioner::new("pairs", 2, ledger.shared())?;
    partition.subscribe(|group: Option<Vec<char>>, _: Credits| {
        println!("{group:?}");
        Ok::<_, OperatorError>(Vec::new())
    });
    for item in [Some('a'), None, Some('b'), Some('c'), None, Some('d')] {
        partition.update(item, ledger.issue_many(1))?;
    }
    println!("ledger at the end: {:?}", ledger.stats());
    Ok(())
}
