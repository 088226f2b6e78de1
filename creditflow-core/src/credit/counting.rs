use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use tracing::trace;

use super::{CreditError, CreditLedger, CreditToken, Credits, TokenId};

type SettleCallback = Arc<dyn Fn(TokenId) + Send + Sync>;

/// Lifecycle of a single token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenState {
    /// Issued but never retained
    Issued,
    /// Retained and not yet fully released, with the number of outstanding holds
    Held(usize),
    /// The last hold was released. The token is no longer valid.
    Settled,
}

/// Counters over the whole lifetime of a [CountingLedger]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LedgerStats {
    /// Tokens issued
    pub issued: u64,
    /// Individual token holds taken
    pub retains: u64,
    /// Individual token holds given up
    pub releases: u64,
    /// Tokens whose last hold was released
    pub settled: u64,
}

#[derive(Default)]
struct LedgerInner {
    next_id: u64,
    tokens: IndexMap<TokenId, TokenState>,
    stats: LedgerStats,
    on_settle: Option<SettleCallback>,
}

impl LedgerInner {
    fn state(&self, id: TokenId) -> Result<TokenState, CreditError> {
        self.tokens
            .get(&id)
            .copied()
            .ok_or(CreditError::Unknown(id))
    }
}

/// A reference counting credit ledger.
///
/// Issues tokens and counts the holds operators take on them. When the last hold on a
/// token is released the token settles: the optional settle callback fires (this is
/// where an engine would return credit to upstream) and any further use of the token is
/// a protocol violation.
///
/// The ledger is cheaply clonable; clones share the same books.
#[derive(Clone, Default)]
pub struct CountingLedger {
    inner: Arc<Mutex<LedgerInner>>,
}

impl std::fmt::Debug for CountingLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("CountingLedger")
            .field("tokens", &inner.tokens)
            .field("stats", &inner.stats)
            .finish()
    }
}

impl CountingLedger {
    /// Create a ledger with no tokens
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked with the id of every token as it settles.
    ///
    /// The callback runs after the ledger was unlocked, so it may use the ledger,
    /// e.g. to issue fresh credit for upstream.
    pub fn on_settle(&self, callback: impl Fn(TokenId) + Send + Sync + 'static) {
        self.lock().on_settle = Some(Arc::new(callback));
    }

    /// Share this ledger as a trait object for handing it to operators
    pub fn shared(&self) -> Arc<dyn CreditLedger> {
        Arc::new(self.clone())
    }

    /// Mint a new token
    pub fn issue(&self) -> CreditToken {
        let mut inner = self.lock();
        let token = CreditToken::new(inner.next_id);
        inner.next_id += 1;
        inner.tokens.insert(token.id(), TokenState::Issued);
        inner.stats.issued += 1;
        token
    }

    /// Mint `count` new tokens as one credit list
    pub fn issue_many(&self, count: usize) -> Credits {
        (0..count).map(|_| self.issue()).collect()
    }

    /// Number of outstanding holds on the given token
    pub fn holds(&self, token: &CreditToken) -> usize {
        match self.lock().tokens.get(&token.id()) {
            Some(TokenState::Held(n)) => *n,
            _ => 0,
        }
    }

    /// True if the last hold on this token has been released
    pub fn is_settled(&self, token: &CreditToken) -> bool {
        matches!(
            self.lock().tokens.get(&token.id()),
            Some(TokenState::Settled)
        )
    }

    /// Ids of all tokens which currently have at least one hold, in issue order
    pub fn outstanding(&self) -> Vec<TokenId> {
        self.lock()
            .tokens
            .iter()
            .filter(|(_, state)| matches!(state, TokenState::Held(_)))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Lifetime counters of this ledger
    pub fn stats(&self) -> LedgerStats {
        self.lock().stats
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        // every mutation is applied only after validation, so the books
        // are consistent even after a panic elsewhere
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CreditLedger for CountingLedger {
    fn retain(&self, credits: &Credits) -> Result<(), CreditError> {
        let mut inner = self.lock();
        for token in credits {
            if inner.state(token.id())? == TokenState::Settled {
                return Err(CreditError::Settled(token.id()));
            }
        }
        for token in credits {
            let state = inner
                .tokens
                .get_mut(&token.id())
                .ok_or(CreditError::Unknown(token.id()))?;
            *state = match *state {
                TokenState::Held(n) => TokenState::Held(n + 1),
                _ => TokenState::Held(1),
            };
            inner.stats.retains += 1;
            trace!(token = %token.id(), "retained credit");
        }
        Ok(())
    }

    fn release(&self, credits: &Credits) -> Result<(), CreditError> {
        let mut inner = self.lock();
        // the same token may appear more than once in a list, so count
        // the holds needed per token before validating
        let mut needed: IndexMap<TokenId, usize> = IndexMap::new();
        for token in credits {
            *needed.entry(token.id()).or_default() += 1;
        }
        for (id, count) in needed.iter() {
            match inner.state(*id)? {
                TokenState::Settled => return Err(CreditError::Settled(*id)),
                TokenState::Issued => return Err(CreditError::NotRetained(*id)),
                TokenState::Held(n) if n < *count => return Err(CreditError::NotRetained(*id)),
                TokenState::Held(_) => (),
            }
        }

        let mut settled = Vec::new();
        for (id, count) in needed {
            let state = inner
                .tokens
                .get_mut(&id)
                .ok_or(CreditError::Unknown(id))?;
            if let TokenState::Held(n) = *state {
                *state = if n == count {
                    settled.push(id);
                    TokenState::Settled
                } else {
                    TokenState::Held(n - count)
                };
            }
            inner.stats.releases += count as u64;
        }
        inner.stats.settled += settled.len() as u64;
        let callback = inner.on_settle.clone();
        drop(inner);

        for id in settled {
            trace!(token = %id, "credit settled");
            if let Some(callback) = callback.as_ref() {
                callback(id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn retain_release_settles() {
        let ledger = CountingLedger::new();
        let token = ledger.issue();
        let credits = Credits::from(token.clone());

        ledger.retain(&credits).unwrap();
        assert_eq!(ledger.holds(&token), 1);
        assert_eq!(ledger.outstanding(), vec![token.id()]);

        ledger.release(&credits).unwrap();
        assert!(ledger.is_settled(&token));
        assert!(ledger.outstanding().is_empty());
        assert_eq!(
            ledger.stats(),
            LedgerStats {
                issued: 1,
                retains: 1,
                releases: 1,
                settled: 1
            }
        );
    }

    /// A token held twice only settles on the second release
    #[test]
    fn nested_holds() {
        let ledger = CountingLedger::new();
        let credits = ledger.issue_many(1);
        ledger.retain(&credits).unwrap();
        ledger.retain(&credits).unwrap();
        ledger.release(&credits).unwrap();
        assert_eq!(ledger.outstanding().len(), 1);
        ledger.release(&credits).unwrap();
        assert!(ledger.outstanding().is_empty());
    }

    #[test]
    fn double_release_is_rejected() {
        let ledger = CountingLedger::new();
        let credits = ledger.issue_many(1);
        ledger.retain(&credits).unwrap();
        ledger.release(&credits).unwrap();
        let id = credits.iter().next().unwrap().id();
        assert_eq!(ledger.release(&credits), Err(CreditError::Settled(id)));
        assert_eq!(ledger.retain(&credits), Err(CreditError::Settled(id)));
    }

    #[test]
    fn release_without_retain_is_rejected() {
        let ledger = CountingLedger::new();
        let credits = ledger.issue_many(1);
        let id = credits.iter().next().unwrap().id();
        assert_eq!(ledger.release(&credits), Err(CreditError::NotRetained(id)));
    }

    #[test]
    fn foreign_token_is_rejected() {
        let ledger = CountingLedger::new();
        let forged = Credits::from(CreditToken::new(999));
        assert_eq!(
            ledger.retain(&forged),
            Err(CreditError::Unknown(CreditToken::new(999).id()))
        );
    }

    /// A failing call must not change the books for the other tokens in the list
    #[test]
    fn validation_is_all_or_nothing() {
        let ledger = CountingLedger::new();
        let good = ledger.issue();
        let mut credits = Credits::from(good.clone());
        credits.extend([CreditToken::new(999)]);

        assert!(ledger.retain(&credits).is_err());
        assert_eq!(ledger.holds(&good), 0);
        assert_eq!(ledger.stats().retains, 0);
    }

    /// The same token twice in one list needs two holds
    #[test]
    fn duplicate_tokens_in_one_list() {
        let ledger = CountingLedger::new();
        let token = ledger.issue();
        let twice = Credits::from(vec![token.clone(), token.clone()]);
        ledger.retain(&Credits::from(token.clone())).unwrap();
        assert!(matches!(
            ledger.release(&twice),
            Err(CreditError::NotRetained(_))
        ));
        ledger.retain(&Credits::from(token.clone())).unwrap();
        ledger.release(&twice).unwrap();
        assert!(ledger.is_settled(&token));
    }

    #[test]
    fn settle_callback_fires() {
        let ledger = CountingLedger::new();
        let settled = Arc::new(Mutex::new(Vec::new()));
        let settled_moved = settled.clone();
        ledger.on_settle(move |id| settled_moved.lock().unwrap().push(id));

        let credits = ledger.issue_many(3);
        ledger.retain(&credits).unwrap();
        ledger.release(&credits).unwrap();

        let expected: Vec<TokenId> = credits.iter().map(|t| t.id()).collect();
        assert_eq!(*settled.lock().unwrap(), expected);
    }

    /// Settling hands credit back upstream, which may mean using the ledger again
    #[test]
    fn settle_callback_may_use_ledger() {
        let ledger = CountingLedger::new();
        let replacements = Arc::new(Mutex::new(Vec::new()));
        let replacements_moved = replacements.clone();
        let ledger_moved = ledger.clone();
        ledger.on_settle(move |_| {
            let fresh = ledger_moved.issue();
            assert!(ledger_moved.outstanding().is_empty());
            replacements_moved.lock().unwrap().push(fresh);
        });

        let credits = ledger.issue_many(2);
        ledger.retain(&credits).unwrap();
        ledger.release(&credits).unwrap();

        assert_eq!(replacements.lock().unwrap().len(), 2);
        assert_eq!(ledger.stats().issued, 4);
        assert_eq!(ledger.stats().settled, 2);

        // replacements are regular tokens
        let replacement = Credits::from(replacements.lock().unwrap()[0].clone());
        ledger.retain(&replacement).unwrap();
        ledger.release(&replacement).unwrap();
        assert_eq!(ledger.stats().settled, 3);
    }
}
