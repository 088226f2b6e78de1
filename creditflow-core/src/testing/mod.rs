//! Helpers shared by the unit tests of this crate
use std::sync::{Arc, Mutex};

use crate::{
    channels::Node,
    credit::{CountingLedger, Credits},
    errorhandling::OperatorError,
};

/// A sink which records, for every emission it receives, how many holds the ledger
/// has on each accompanying token at that moment. Lets tests check credits are still
/// held while downstream consumes the data.
#[derive(Clone)]
pub(crate) struct HoldProbe {
    ledger: CountingLedger,
    observed: Arc<Mutex<Vec<Vec<usize>>>>,
}

impl HoldProbe {
    pub(crate) fn new(ledger: &CountingLedger) -> Self {
        Self {
            ledger: ledger.clone(),
            observed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Hold counts per emission, per token
    pub(crate) fn observed(&self) -> Vec<Vec<usize>> {
        self.observed.lock().unwrap().clone()
    }
}

impl<V: Send + 'static> Node<V, ()> for HoldProbe {
    fn update(&mut self, _payload: V, credits: Credits) -> Result<Vec<()>, OperatorError> {
        let holds = credits.iter().map(|t| self.ledger.holds(t)).collect();
        self.observed.lock().unwrap().push(holds);
        Ok(vec![])
    }
}

/// Panics unless every retain on the ledger was matched by a release
pub(crate) fn assert_conserved(ledger: &CountingLedger) {
    let stats = ledger.stats();
    assert_eq!(
        stats.retains, stats.releases,
        "unbalanced retains and releases: {stats:?}"
    );
    assert!(
        ledger.outstanding().is_empty(),
        "outstanding credits: {:?}",
        ledger.outstanding()
    );
}
