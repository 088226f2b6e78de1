use std::sync::Arc;

use tracing::trace;

use crate::channels::{Downstream, Node};
use crate::credit::{CreditLedger, Credits};
use crate::errorhandling::{ConfigError, OperatorError};
use crate::types::{Batch, Data};

/// A group in the making and the credits of its items
struct Accumulator<V> {
    items: Batch<V>,
    credits: Credits,
}

impl<V> Accumulator<V> {
    fn with_capacity(n: usize) -> Self {
        Self {
            items: Vec::with_capacity(n),
            credits: Credits::none(),
        }
    }
}

/// Partitions a stream of possibly absent items into a stream of either `None` or
/// groups of exactly `n` present items, preserving the stream's length: every input
/// produces exactly one output.
///
/// Present items are collected in arrival order. Until a group is complete `None` is
/// emitted in their place, without credits, while their credits stay held. The
/// completed group is emitted with the credits of all its items, which are released
/// after the emission.
///
/// Absent inputs pass straight through as `None` with their own credits.
///
/// # Example
/// ```rust
/// use creditflow::channels::Node;
/// use creditflow::credit::{CountingLedger, Credits};
/// use creditflow::operators::PairPartitioner;
/// use creditflow::sinks::VecSink;
///
/// let ledger = CountingLedger::new();
/// let sink = VecSink::new();
/// let mut partition = PairPartitioner::new("partition", 3, ledger.shared()).unwrap();
/// partition.subscribe(sink.clone());
///
/// for x in [None, Some(1), None, Some(2), Some(3)] {
///     partition.update(x, Credits::none()).unwrap();
/// }
/// assert_eq!(sink.drain_payloads(), vec![None, None, None, None, Some(vec![1, 2, 3])]);
/// ```
pub struct PairPartitioner<V, R> {
    name: String,
    n: usize,
    pending: Accumulator<V>,
    ledger: Arc<dyn CreditLedger>,
    downstream: Downstream<Option<Batch<V>>, R>,
}

impl<V, R> PairPartitioner<V, R>
where
    V: Data,
{
    /// Create a partitioner emitting groups of `n`. Fails if `n` is zero.
    pub fn new(
        name: impl Into<String>,
        n: usize,
        ledger: Arc<dyn CreditLedger>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let n = ConfigError::require_positive(&name, "n", n)?;
        Ok(Self {
            name,
            n,
            pending: Accumulator::with_capacity(n),
            ledger,
            downstream: Downstream::new(),
        })
    }

    /// Link a node to receive the groups
    pub fn subscribe(&mut self, node: impl Node<Option<Batch<V>>, R>) {
        self.downstream.subscribe(node)
    }

    /// Name of this operator
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of every emitted group
    pub fn group_size(&self) -> usize {
        self.n
    }

    /// Number of items collected towards the next group
    pub fn pending_len(&self) -> usize {
        self.pending.items.len()
    }

    /// Number of credit tokens held for the pending items
    pub fn held_credits(&self) -> usize {
        self.pending.credits.len()
    }
}

impl<V, R> Node<Option<V>, R> for PairPartitioner<V, R>
where
    V: Data,
    R: Send + 'static,
{
    fn update(&mut self, item: Option<V>, credits: Credits) -> Result<Vec<R>, OperatorError> {
        self.ledger.retain(&credits)?;
        let Some(item) = item else {
            let emitted = self.downstream.emit(None, &credits);
            self.ledger.release(&credits)?;
            return emitted;
        };

        self.pending.items.push(item);
        self.pending.credits.absorb(credits);
        if self.pending.items.len() < self.n {
            // credits stay with the pending group
            return self.downstream.emit(None, &Credits::none());
        }

        let group = std::mem::replace(&mut self.pending, Accumulator::with_capacity(self.n));
        trace!(
            operator = %self.name,
            credits = group.credits.len(),
            "emitting complete group"
        );
        let emitted = self.downstream.emit(Some(group.items), &group.credits);
        self.ledger.release(&group.credits)?;
        emitted
    }
}
