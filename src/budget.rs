//! Retry budget carried inside the bootstrap credential
//!
//! The counter lives on the wire as the decimal text of a non-negative
//! integer under [`AUTO_IMPORT_RETRY_KEY`]. It is parsed into a
//! [`RetryBudget`] only when an import attempt fails, so a malformed counter
//! never blocks a successful import.
//!
//! On each failure the budget is consumed by one. When it would go below zero
//! the credential is deleted instead of rewritten, which makes the
//! credential's existence the single signal that an import is still pending.

use crate::error::{Error, Result};
use crate::model::{BootstrapCredential, AUTO_IMPORT_RETRY_KEY};

/// Remaining failure-tolerant attempts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryBudget {
    remaining: u32,
}

/// What the caller must do with the credential after a failed attempt
#[derive(Clone, Debug, PartialEq)]
pub enum BudgetAction {
    /// Persist `credential`; only the retry counter differs from the input
    Decrement {
        credential: BootstrapCredential,
        remaining: u32,
    },
    /// Budget exhausted, delete the credential without rewriting it
    DeleteExhausted,
}

impl BudgetAction {
    /// Counter value the failed attempt was charged against
    pub fn charged(&self) -> u32 {
        match self {
            BudgetAction::Decrement { remaining, .. } => remaining + 1,
            BudgetAction::DeleteExhausted => 0,
        }
    }
}

impl RetryBudget {
    pub fn new(remaining: u32) -> Self {
        Self { remaining }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Parse the wire representation. Anything but plain decimal digits is rejected.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(raw)
            .map_err(|_| Error::config(format!("{} is not valid UTF-8", AUTO_IMPORT_RETRY_KEY)))?;
        if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::config(format!(
                "{} must be a non-negative integer, got '{}'",
                AUTO_IMPORT_RETRY_KEY, text
            )));
        }
        let remaining = text.parse::<u32>().map_err(|e| {
            Error::config(format!("{} is out of range '{}': {}", AUTO_IMPORT_RETRY_KEY, text, e))
        })?;
        Ok(Self { remaining })
    }

    /// Read the budget from a credential. A missing counter is an error, never a default.
    pub fn from_credential(credential: &BootstrapCredential) -> Result<Self> {
        let raw = credential.get(AUTO_IMPORT_RETRY_KEY).ok_or_else(|| {
            Error::config(format!(
                "{} is missing from secret {}",
                AUTO_IMPORT_RETRY_KEY,
                credential.key()
            ))
        })?;
        Self::parse(raw)
    }

    /// Wire representation of the budget
    pub fn encode(&self) -> Vec<u8> {
        self.remaining.to_string().into_bytes()
    }

    /// Spend one attempt; `None` once the budget is exhausted
    pub fn consume(self) -> Option<Self> {
        self.remaining.checked_sub(1).map(Self::new)
    }

    /// Write this budget into a copy of the credential, leaving every other field alone
    pub fn apply_to(&self, credential: &BootstrapCredential) -> BootstrapCredential {
        let mut updated = credential.clone();
        updated
            .data
            .insert(AUTO_IMPORT_RETRY_KEY.to_string(), self.encode());
        updated
    }

    /// What a failed attempt does to `credential`, given this budget was read from it
    pub fn after_failure(self, credential: &BootstrapCredential) -> BudgetAction {
        match self.consume() {
            Some(next) => BudgetAction::Decrement {
                credential: next.apply_to(credential),
                remaining: next.remaining,
            },
            None => BudgetAction::DeleteExhausted,
        }
    }
}

/// Decide what a failed import attempt does to the credential
pub fn on_failure(credential: &BootstrapCredential) -> Result<BudgetAction> {
    Ok(RetryBudget::from_credential(credential)?.after_failure(credential))
}
