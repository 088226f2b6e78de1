//! Credit tokens and the credit lists travelling alongside emissions.
use std::fmt::Display;

/// Identifies a single credit token within the ledger which issued it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(u64);

impl TokenId {
    /// Raw numeric value of this id
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl Display for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One unit of upstream flow-control credit.
///
/// Tokens are handed to operators together with the data they protect. An operator
/// which holds on to data must retain the accompanying tokens with its
/// [CreditLedger](super::CreditLedger) and release them once the data has been handed
/// downstream. Tokens are only ever minted by a credit issuer such as
/// [CountingLedger](super::CountingLedger); operators clone and pass them along but
/// never create them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CreditToken {
    id: TokenId,
}

impl CreditToken {
    /// Create a token for the given id.
    ///
    /// This is meant for credit issuers implementing [CreditLedger](super::CreditLedger),
    /// not for operators.
    pub fn new(id: u64) -> Self {
        Self { id: TokenId(id) }
    }

    /// The id of this token within its issuing ledger
    pub fn id(&self) -> TokenId {
        self.id
    }
}

/// The credit tokens accompanying one emission.
///
/// Credits may be empty, e.g. for emissions which do not hand over any upstream data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credits(Vec<CreditToken>);

impl Credits {
    /// Credits carrying no tokens at all
    pub fn none() -> Self {
        Self(Vec::new())
    }

    /// Number of tokens in this list
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if this list carries no tokens
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate the tokens in this list
    pub fn iter(&self) -> std::slice::Iter<'_, CreditToken> {
        self.0.iter()
    }

    /// Move all tokens of `other` to the end of this list
    pub fn absorb(&mut self, other: Credits) {
        self.0.extend(other.0)
    }

    /// Take all tokens out of this list, leaving it empty
    pub fn take(&mut self) -> Credits {
        std::mem::take(self)
    }

    /// Check if a token with the given id is part of this list
    pub fn contains(&self, id: TokenId) -> bool {
        self.0.iter().any(|t| t.id == id)
    }
}

impl From<CreditToken> for Credits {
    fn from(value: CreditToken) -> Self {
        Self(vec![value])
    }
}

impl From<Vec<CreditToken>> for Credits {
    fn from(value: Vec<CreditToken>) -> Self {
        Self(value)
    }
}

impl FromIterator<CreditToken> for Credits {
    fn from_iter<I: IntoIterator<Item = CreditToken>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<CreditToken> for Credits {
    fn extend<I: IntoIterator<Item = CreditToken>>(&mut self, iter: I) {
        self.0.extend(iter)
    }
}

impl IntoIterator for Credits {
    type Item = CreditToken;
    type IntoIter = std::vec::IntoIter<CreditToken>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Credits {
    type Item = &'a CreditToken;
    type IntoIter = std::slice::Iter<'a, CreditToken>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use super::*;

    #[test]
    fn absorb_keeps_order() {
        let mut a: Credits = (0..2).map(CreditToken::new).collect();
        let b: Credits = (2..5).map(CreditToken::new).collect();
        a.absorb(b);
        let ids = a.iter().map(|t| t.id().get()).collect_vec();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn take_leaves_empty() {
        let mut a = Credits::from(CreditToken::new(7));
        let taken = a.take();
        assert!(a.is_empty());
        assert_eq!(taken.len(), 1);
        assert!(taken.contains(CreditToken::new(7).id()));
    }
}
