//! The credit protocol shared by all operators.
//!
//! Every emission entering an operator carries [Credits]. An operator which keeps data
//! beyond the duration of its `update` call must [retain](CreditLedger::retain) the
//! credits protecting that data and [release](CreditLedger::release) them exactly once,
//! strictly after the data has been emitted downstream. Operators which only transform
//! and forward data pass the credits along untouched.
use thiserror::Error;

mod counting;
mod token;

pub use counting::{CountingLedger, LedgerStats};
pub use token::{CreditToken, Credits, TokenId};

/// Credit bookkeeping provided by the dataflow engine.
///
/// Both methods validate all tokens before applying any change, so a failed call
/// leaves the ledger untouched.
pub trait CreditLedger: Send + Sync + 'static {
    /// Take a hold on every token in `credits`
    fn retain(&self, credits: &Credits) -> Result<(), CreditError>;

    /// Give up one hold on every token in `credits`
    fn release(&self, credits: &Credits) -> Result<(), CreditError>;
}

/// Violations of the credit protocol
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CreditError {
    #[error("Credit token {0} was not issued by this ledger")]
    Unknown(TokenId),
    #[error("Credit token {0} was released without being retained")]
    NotRetained(TokenId),
    #[error("Credit token {0} was used after its final release")]
    Settled(TokenId),
}

/// A ledger which accepts every retain and release without tracking anything.
/// Useful for pipelines which do not apply flow control.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLedger;

impl CreditLedger for NoLedger {
    fn retain(&self, _credits: &Credits) -> Result<(), CreditError> {
        Ok(())
    }

    fn release(&self, _credits: &Credits) -> Result<(), CreditError> {
        Ok(())
    }
}
