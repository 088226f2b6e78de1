use tracing::error;

use crate::channels::{Downstream, Node};
use crate::credit::Credits;
use crate::errorhandling::{BoxError, OperatorError, TransformError};
use crate::types::{Batch, Data};

type Mapper<V, VO> = Box<dyn FnMut(V) -> Result<VO, BoxError> + Send>;

/// Apply a function to every element of every batch in the stream.
///
/// The function runs synchronously, in element order. If it fails for any element the
/// whole batch is abandoned: the failure is logged and returned, nothing is emitted.
///
/// Credits pass through untouched. This operator never holds on to data, so it never
/// retains or releases.
///
/// # Example
/// ```rust
/// use creditflow::channels::Node;
/// use creditflow::credit::Credits;
/// use creditflow::operators::BatchMapper;
/// use creditflow::sinks::VecSink;
///
/// let sink = VecSink::new();
/// let mut double = BatchMapper::new("double", |x: i32| x * 2);
/// double.subscribe(sink.clone());
///
/// double.update(vec![0, 1, 2], Credits::none()).unwrap();
/// double.update(vec![3, 4, 5], Credits::none()).unwrap();
/// assert_eq!(sink.drain_payloads(), vec![vec![0, 2, 4], vec![6, 8, 10]]);
/// ```
pub struct BatchMapper<V, VO, R> {
    name: String,
    mapper: Mapper<V, VO>,
    downstream: Downstream<Batch<VO>, R>,
}

impl<V, VO, R> BatchMapper<V, VO, R>
where
    V: Data,
    VO: Data,
{
    /// Map with an infallible function
    pub fn new(name: impl Into<String>, mut mapper: impl FnMut(V) -> VO + Send + 'static) -> Self {
        Self::from_boxed(
            name.into(),
            Box::new(move |x: V| -> Result<VO, BoxError> { Ok(mapper(x)) }),
        )
    }

    /// Map with a function which may fail
    pub fn try_new<E>(
        name: impl Into<String>,
        mut mapper: impl FnMut(V) -> Result<VO, E> + Send + 'static,
    ) -> Self
    where
        E: Into<BoxError>,
    {
        Self::from_boxed(
            name.into(),
            Box::new(move |x: V| -> Result<VO, BoxError> { mapper(x).map_err(Into::into) }),
        )
    }

    fn from_boxed(name: String, mapper: Mapper<V, VO>) -> Self {
        Self {
            name,
            mapper,
            downstream: Downstream::new(),
        }
    }

    /// Link a node to receive the transformed batches
    pub fn subscribe(&mut self, node: impl Node<Batch<VO>, R>) {
        self.downstream.subscribe(node)
    }

    /// Name of this operator
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<V, VO, R> Node<Batch<V>, R> for BatchMapper<V, VO, R>
where
    V: Data,
    VO: Data,
    R: Send + 'static,
{
    fn update(&mut self, batch: Batch<V>, credits: Credits) -> Result<Vec<R>, OperatorError> {
        let mapped: Result<Batch<VO>, BoxError> = batch.into_iter().map(&mut self.mapper).collect();
        let mapped = mapped.map_err(|source| {
            error!(operator = %self.name, error = %source, "batch transformation failed");
            TransformError::Function {
                operator: self.name.clone(),
                source,
            }
        })?;
        self.downstream.emit(mapped, &credits)
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::Display;

    use super::*;
    use crate::credit::CountingLedger;
    use crate::sinks::VecSink;

    #[derive(Debug)]
    struct Odd(i32);
    impl Display for Odd {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{} is odd", self.0)
        }
    }
    impl std::error::Error for Odd {}

    #[test]
    fn test_batch_map() {
        let sink = VecSink::new();
        let mut double = BatchMapper::new("double", |x: i32| x * 2);
        double.subscribe(sink.clone());

        let results = double.update(vec![0, 1, 2], Credits::none()).unwrap();
        assert_eq!(results, vec![vec![0, 2, 4]]);
        assert_eq!(sink.drain_payloads(), vec![vec![0, 2, 4]]);
    }

    /// credits are forwarded as they are and never touched
    #[test]
    fn forwards_credits_untouched() {
        let ledger = CountingLedger::new();
        let sink = VecSink::new();
        let mut mapper = BatchMapper::new("len", |x: &'static str| x.len());
        mapper.subscribe(sink.clone());

        let credits = ledger.issue_many(2);
        mapper.update(vec!["hello", "world"], credits.clone()).unwrap();
        let emitted = sink.drain_vec(..);
        assert_eq!(emitted[0].payload, vec![5, 5]);
        assert_eq!(emitted[0].credits, credits);
        assert_eq!(ledger.stats().retains, 0);
        assert_eq!(ledger.stats().releases, 0);
    }

    /// A single failing element aborts the whole batch
    #[test]
    fn failure_emits_nothing() {
        let sink = VecSink::new();
        let mut evens_only = BatchMapper::try_new("evens", |x: i32| {
            if x % 2 == 0 {
                Ok(x)
            } else {
                Err(Odd(x))
            }
        });
        evens_only.subscribe(sink.clone());

        let err = evens_only.update(vec![2, 4, 5, 6], Credits::none()).unwrap_err();
        match err {
            OperatorError::Transform(TransformError::Function { operator, source }) => {
                assert_eq!(operator, "evens");
                assert_eq!(source.to_string(), "5 is odd");
            }
            e => panic!("unexpected error {e:?}"),
        }
        assert!(sink.is_empty());

        // the operator is still usable afterwards
        evens_only.update(vec![8], Credits::none()).unwrap();
        assert_eq!(sink.drain_payloads(), vec![vec![8]]);
    }

    #[test]
    fn empty_batch_still_emits() {
        let sink = VecSink::new();
        let mut double = BatchMapper::new("double", |x: i32| x * 2);
        double.subscribe(sink.clone());
        double.update(vec![], Credits::none()).unwrap();
        assert_eq!(sink.drain_payloads(), vec![Vec::<i32>::new()]);
    }
}
