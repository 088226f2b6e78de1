use crate::{
    channels::Node,
    credit::Credits,
    errorhandling::OperatorError,
    types::Data,
};
use std::{
    ops::RangeBounds,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// One emission as observed by a sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emission<V> {
    /// The emitted data
    pub payload: V,
    /// The credits which accompanied it
    pub credits: Credits,
}

/// A Helper to write emissions into a shared vector and take them out
/// again.
/// This is mainly useful to extract values from a dataflow in unit tests.
/// This struct uses an Arc<Mutex<Vec<T>> internally, so it can be freely
/// cloned
///
/// As a [Node] it records every emission and returns the payload as its result.
#[derive(Clone)]
pub struct VecSink<V> {
    inner: Arc<Mutex<Vec<Emission<V>>>>,
}
impl<V> Default for VecSink<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> VecSink<V> {
    /// Create a new sink which collects all emissions into a `Vec`
    pub fn new() -> Self {
        VecSink {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Put an emission into this sink
    pub fn give(&self, emission: Emission<V>) {
        self.lock().push(emission)
    }

    /// Take the given range out of this sink
    pub fn drain_vec<R: RangeBounds<usize>>(&self, range: R) -> Vec<Emission<V>> {
        self.lock().drain(range).collect()
    }

    /// Take all payloads out of this sink, discarding the credits
    pub fn drain_payloads(&self) -> Vec<V> {
        self.lock().drain(..).map(|e| e.payload).collect()
    }

    /// Returns the number of collected emissions
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if nothing was collected (or everything was drained)
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Emission<V>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V> IntoIterator for VecSink<V> {
    type Item = Emission<V>;

    type IntoIter = std::vec::IntoIter<Emission<V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.drain_vec(..).into_iter()
    }
}

impl<V> Node<V, V> for VecSink<V>
where
    V: Data,
{
    fn update(&mut self, payload: V, credits: Credits) -> Result<Vec<V>, OperatorError> {
        self.give(Emission {
            payload: payload.clone(),
            credits,
        });
        Ok(vec![payload])
    }
}
