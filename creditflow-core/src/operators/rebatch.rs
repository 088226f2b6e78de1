use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::channels::{Downstream, Node};
use crate::credit::{CreditLedger, Credits};
use crate::errorhandling::{ConfigError, OperatorError};
use crate::types::{Batch, Data};

/// One buffered item plus the credits riding along with it
struct BufferedPair<V> {
    item: V,
    credits: Credits,
}

/// Regroups a stream of batches of arbitrary size into a stream of batches of exactly
/// `batch_size` items.
///
/// The credits of an incoming batch protect the batch as a whole, so they are attached
/// to its last item and only released once that item has been emitted, no matter how
/// output batches cut across input batches.
///
/// Items which never make up a full batch stay buffered, along with their credits,
/// until [RebatchBuffer::flush] is called.
///
/// # Example
/// ```rust
/// use creditflow::channels::Node;
/// use creditflow::credit::CountingLedger;
/// use creditflow::operators::RebatchBuffer;
/// use creditflow::sinks::VecSink;
///
/// let ledger = CountingLedger::new();
/// let sink = VecSink::new();
///
/// let mut rebatch = RebatchBuffer::new("rebatch", 4, ledger.shared()).unwrap();
/// rebatch.subscribe(sink.clone());
///
/// for batch in [vec![0, 1, 2], vec![3, 4, 5], vec![6, 7, 8], vec![9, 10, 11]] {
///     rebatch.update(batch, ledger.issue_many(1)).unwrap();
/// }
/// assert_eq!(
///     sink.drain_payloads(),
///     vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7], vec![8, 9, 10, 11]]
/// );
/// assert!(ledger.outstanding().is_empty());
/// ```
pub struct RebatchBuffer<V, R> {
    name: String,
    batch_size: usize,
    buffer: VecDeque<BufferedPair<V>>,
    ledger: Arc<dyn CreditLedger>,
    downstream: Downstream<Batch<V>, R>,
}

impl<V, R> RebatchBuffer<V, R>
where
    V: Data,
{
    /// Create a new rebatching operator. Fails if `batch_size` is zero.
    pub fn new(
        name: impl Into<String>,
        batch_size: usize,
        ledger: Arc<dyn CreditLedger>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let batch_size = ConfigError::require_positive(&name, "batch_size", batch_size)?;
        Ok(Self {
            name,
            batch_size,
            buffer: VecDeque::new(),
            ledger,
            downstream: Downstream::new(),
        })
    }

    /// Link a node to receive the fixed size batches
    pub fn subscribe(&mut self, node: impl Node<Batch<V>, R>) {
        self.downstream.subscribe(node)
    }

    /// Name of this operator
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of every emitted batch
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of items waiting for a batch to fill up. Always less than `batch_size`
    /// between calls to `update`.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Number of credit tokens held for the buffered items
    pub fn held_credits(&self) -> usize {
        self.buffer.iter().map(|p| p.credits.len()).sum()
    }

    /// Emit whatever is buffered as one final, possibly short, batch and release its
    /// credits.
    ///
    /// This is never done implicitly. Call it when the upstream is known to be
    /// finished and the trailing items should not be held back.
    pub fn flush(&mut self) -> Result<Vec<R>, OperatorError>
    where
        R: 'static,
    {
        if self.buffer.is_empty() {
            return Ok(Vec::new());
        }
        debug!(
            operator = %self.name,
            items = self.buffer.len(),
            "flushing partial batch"
        );
        self.emit_front(self.buffer.len())
    }

    /// Take `count` pairs off the buffer front, emit them as one batch and release
    /// their credits once the emission returned
    fn emit_front(&mut self, count: usize) -> Result<Vec<R>, OperatorError>
    where
        R: 'static,
    {
        let mut credits = Credits::none();
        let items: Batch<V> = self
            .buffer
            .drain(..count)
            .map(|pair| {
                credits.absorb(pair.credits);
                pair.item
            })
            .collect();
        trace!(operator = %self.name, credits = credits.len(), "emitting batch");
        let emitted = self.downstream.emit(items, &credits);
        // the data is gone from this operator either way, so the credits go too
        self.ledger.release(&credits)?;
        emitted
    }
}

impl<V, R> Node<Batch<V>, R> for RebatchBuffer<V, R>
where
    V: Data,
    R: Send + 'static,
{
    fn update(&mut self, mut batch: Batch<V>, credits: Credits) -> Result<Vec<R>, OperatorError> {
        self.ledger.retain(&credits)?;
        let Some(last) = batch.pop() else {
            // nothing to protect
            self.ledger.release(&credits)?;
            return Ok(Vec::new());
        };
        self.buffer.extend(batch.into_iter().map(|item| BufferedPair {
            item,
            credits: Credits::none(),
        }));
        // the last one carries all the credits
        self.buffer.push_back(BufferedPair {
            item: last,
            credits,
        });

        let mut results = Vec::new();
        while self.buffer.len() >= self.batch_size {
            results.extend(self.emit_front(self.batch_size)?);
        }
        Ok(results)
    }
}

impl<V, R> Drop for RebatchBuffer<V, R> {
    fn drop(&mut self) {
        let held: usize = self.buffer.iter().map(|p| p.credits.len()).sum();
        if held > 0 {
            warn!(
                operator = %self.name,
                items = self.buffer.len(),
                credits = held,
                "dropping rebatch buffer which still holds credits"
            );
        }
    }
}
