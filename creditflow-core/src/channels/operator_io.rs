//! Input and output of operators. Every operator is a [Node] receiving emissions from
//! exactly one upstream, and owns a [Downstream] it emits into.
//! Essentially these are the edges in the dataflow graph.
use itertools::Itertools;

use crate::credit::Credits;
use crate::errorhandling::OperatorError;

/// A participant in the dataflow graph receiving emissions.
///
/// `update` is called synchronously, in emission order, by the one upstream this node
/// is subscribed to and is never re-entered for the same node. It returns the results
/// produced by everything downstream of this node for this emission.
///
/// Closures of the form `FnMut(V, Credits) -> Result<Vec<R>, OperatorError>` are nodes,
/// which makes them handy as sinks.
pub trait Node<V, R>: Send + 'static {
    /// Handle one emission of `payload` accompanied by `credits`
    fn update(&mut self, payload: V, credits: Credits) -> Result<Vec<R>, OperatorError>;
}

impl<X, V, R> Node<V, R> for X
where
    X: FnMut(V, Credits) -> Result<Vec<R>, OperatorError> + Send + 'static,
{
    fn update(&mut self, payload: V, credits: Credits) -> Result<Vec<R>, OperatorError> {
        self(payload, credits)
    }
}

/// Operator output: the subscribers an operator emits to
pub struct Downstream<V, R> {
    // Each subscriber is essentially one outgoing
    // edge from the operator
    subscribers: Vec<Box<dyn Node<V, R>>>,
}

impl<V, R> Default for Downstream<V, R> {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }
}

impl<V, R> Downstream<V, R>
where
    V: Clone,
{
    /// Create an output with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Link a node to this output. It will receive every subsequent emission.
    pub fn subscribe(&mut self, node: impl Node<V, R>) {
        self.subscribers.push(Box::new(node));
    }

    /// Number of subscribed nodes
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// True if no node is subscribed
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Hand `payload` to every subscriber, in subscription order, and return the
    /// concatenation of their results.
    ///
    /// Every subscriber sees its own copy of `credits`. The first subscriber failing
    /// aborts the emission; subscribers after it do not see the payload.
    /// An emission with no subscribers drops the payload and yields no results.
    pub fn emit(&mut self, payload: V, credits: &Credits) -> Result<Vec<R>, OperatorError>
    where
        V: 'static,
        R: 'static,
    {
        let recipient_len = self.subscribers.len();
        // repeat_n will clone for every iteration except the last
        // this gives us a small optimization on the common "1 subscriber" case :)
        let payloads = itertools::repeat_n(payload, recipient_len);
        let mut results = Vec::new();
        for (subscriber, payload) in self.subscribers.iter_mut().zip_eq(payloads) {
            results.extend(subscriber.update(payload, credits.clone())?);
        }
        Ok(results)
    }
}
