//! Step-indexed balance table.
//!
//! One row per processed step, one column per account.  Row *t* equals row
//! *t−1* except where explicitly mutated while *t* was the newest row —
//! balances persist across steps by default.
//!
//! # Invariants
//!
//! - [`Ledger::carry_forward`] is called exactly once per step, with steps
//!   strictly in order.  The first call seeds starting balances; every later
//!   call copies the previous row.
//! - Reads require the row to exist; writes additionally require the row to
//!   be the newest one.  Violations are loud [`LedgerError`]s, never silent
//!   corruption.
//!
//! # Determinism
//!
//! Pure state: no IO, no clock, no randomness.  Rows are `BTreeMap`s so
//! iteration order is stable.

use std::collections::BTreeMap;

use crate::fixedpoint::Micros;
use crate::types::StepId;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// All invariant violations the ledger can surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerError {
    /// `carry_forward` was called for a step other than the next
    /// unpopulated one.
    OutOfOrderStep { expected: StepId, got: StepId },
    /// A read or write hit a step that was never carried forward.
    StepNotPopulated { step: StepId },
    /// A write targeted a row older than the newest one.
    MutatesHistoricalStep { step: StepId, newest: StepId },
    /// The symbol is not a registered account.
    UnknownAccount { symbol: String },
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfOrderStep { expected, got } => {
                write!(
                    f,
                    "ledger invariant: carry_forward expected step {expected}, got {got}"
                )
            }
            Self::StepNotPopulated { step } => {
                write!(f, "ledger invariant: step {step} has not been carried forward")
            }
            Self::MutatesHistoricalStep { step, newest } => {
                write!(
                    f,
                    "ledger invariant: step {step} is historical (newest is {newest})"
                )
            }
            Self::UnknownAccount { symbol } => {
                write!(f, "ledger invariant: unknown account '{symbol}'")
            }
        }
    }
}

impl std::error::Error for LedgerError {}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Balance row: account symbol -> amount.
pub type BalanceRow = BTreeMap<String, Micros>;

/// The time-indexed table of account balances.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ledger {
    starting: BalanceRow,
    rows: Vec<BalanceRow>,
}

impl Ledger {
    /// Build a ledger over the given starting balances.  No rows exist
    /// until the first `carry_forward`.
    pub fn new(starting: BalanceRow) -> Self {
        Self {
            starting,
            rows: Vec::new(),
        }
    }

    /// Number of populated steps.
    pub fn populated_len(&self) -> usize {
        self.rows.len()
    }

    /// Populate the row for `step`: copy the previous row, or seed starting
    /// balances if this is the first step.  Must be called with exactly the
    /// next unpopulated step, before any mutation for that step.
    pub fn carry_forward(&mut self, step: StepId) -> Result<(), LedgerError> {
        let expected = StepId::new(self.rows.len());
        if step != expected {
            return Err(LedgerError::OutOfOrderStep { expected, got: step });
        }
        let row = match self.rows.last() {
            Some(prev) => prev.clone(),
            None => self.starting.clone(),
        };
        self.rows.push(row);
        Ok(())
    }

    /// Balance of `symbol` at `step`.
    pub fn balance(&self, step: StepId, symbol: &str) -> Result<Micros, LedgerError> {
        let row = self
            .rows
            .get(step.index())
            .ok_or(LedgerError::StepNotPopulated { step })?;
        row.get(symbol)
            .copied()
            .ok_or_else(|| LedgerError::UnknownAccount {
                symbol: symbol.to_string(),
            })
    }

    /// Overwrite the balance of `symbol` at `step`.  Only the newest row is
    /// writable; history is immutable.
    pub fn set_balance(
        &mut self,
        step: StepId,
        symbol: &str,
        amount: Micros,
    ) -> Result<(), LedgerError> {
        if self.rows.is_empty() {
            return Err(LedgerError::StepNotPopulated { step });
        }
        let newest = StepId::new(self.rows.len() - 1);
        if step.index() >= self.rows.len() {
            return Err(LedgerError::StepNotPopulated { step });
        }
        if step != newest {
            return Err(LedgerError::MutatesHistoricalStep { step, newest });
        }
        let row = self.rows.last_mut().expect("checked non-empty");
        match row.get_mut(symbol) {
            Some(slot) => {
                *slot = amount;
                Ok(())
            }
            None => Err(LedgerError::UnknownAccount {
                symbol: symbol.to_string(),
            }),
        }
    }

    /// Read-only view of one populated row.
    pub fn row(&self, step: StepId) -> Option<&BalanceRow> {
        self.rows.get(step.index())
    }

    /// Read-only view of every populated row, oldest first.
    pub fn rows(&self) -> &[BalanceRow] {
        &self.rows
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn starting() -> BalanceRow {
        let mut row = BalanceRow::new();
        row.insert("USD".to_string(), Micros::from_whole(1000));
        row.insert("BTC".to_string(), Micros::ZERO);
        row
    }

    #[test]
    fn first_carry_forward_seeds_starting_balances() {
        let mut ledger = Ledger::new(starting());
        ledger.carry_forward(StepId::new(0)).unwrap();
        assert_eq!(
            ledger.balance(StepId::new(0), "USD").unwrap(),
            Micros::from_whole(1000)
        );
        assert_eq!(ledger.balance(StepId::new(0), "BTC").unwrap(), Micros::ZERO);
    }

    #[test]
    fn balances_persist_across_steps() {
        let mut ledger = Ledger::new(starting());
        ledger.carry_forward(StepId::new(0)).unwrap();
        ledger
            .set_balance(StepId::new(0), "USD", Micros::from_whole(900))
            .unwrap();
        ledger.carry_forward(StepId::new(1)).unwrap();
        assert_eq!(
            ledger.balance(StepId::new(1), "USD").unwrap(),
            Micros::from_whole(900)
        );
    }

    #[test]
    fn mutation_does_not_rewrite_history() {
        let mut ledger = Ledger::new(starting());
        ledger.carry_forward(StepId::new(0)).unwrap();
        ledger.carry_forward(StepId::new(1)).unwrap();
        ledger
            .set_balance(StepId::new(1), "USD", Micros::from_whole(1))
            .unwrap();
        assert_eq!(
            ledger.balance(StepId::new(0), "USD").unwrap(),
            Micros::from_whole(1000)
        );
    }

    #[test]
    fn out_of_order_carry_forward_rejected() {
        let mut ledger = Ledger::new(starting());
        let err = ledger.carry_forward(StepId::new(1)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::OutOfOrderStep {
                expected: StepId::new(0),
                got: StepId::new(1)
            }
        );
    }

    #[test]
    fn double_carry_forward_rejected() {
        let mut ledger = Ledger::new(starting());
        ledger.carry_forward(StepId::new(0)).unwrap();
        let err = ledger.carry_forward(StepId::new(0)).unwrap_err();
        assert!(matches!(err, LedgerError::OutOfOrderStep { .. }));
    }

    #[test]
    fn read_before_carry_forward_rejected() {
        let ledger = Ledger::new(starting());
        let err = ledger.balance(StepId::new(0), "USD").unwrap_err();
        assert_eq!(
            err,
            LedgerError::StepNotPopulated {
                step: StepId::new(0)
            }
        );
    }

    #[test]
    fn write_to_historical_row_rejected() {
        let mut ledger = Ledger::new(starting());
        ledger.carry_forward(StepId::new(0)).unwrap();
        ledger.carry_forward(StepId::new(1)).unwrap();
        let err = ledger
            .set_balance(StepId::new(0), "USD", Micros::ZERO)
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::MutatesHistoricalStep {
                step: StepId::new(0),
                newest: StepId::new(1)
            }
        );
    }

    #[test]
    fn unknown_symbol_rejected() {
        let mut ledger = Ledger::new(starting());
        ledger.carry_forward(StepId::new(0)).unwrap();
        assert!(matches!(
            ledger.balance(StepId::new(0), "ETH"),
            Err(LedgerError::UnknownAccount { .. })
        ));
        assert!(matches!(
            ledger.set_balance(StepId::new(0), "ETH", Micros::ZERO),
            Err(LedgerError::UnknownAccount { .. })
        ));
    }
}
