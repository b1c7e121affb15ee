use mcd_broker::{Broker, BrokerError, StepContext};

/// The strategy callback contract.
///
/// A strategy is invoked once per step, after the engine's own processing
/// for that step (carry-forward, matching, cleanup, valuation) has
/// completed.  It may place and cancel orders through the broker's entry
/// points; it never touches ledger rows directly.
pub trait Strategy {
    fn name(&self) -> &str;

    /// One-time setup before the first step.
    fn initialize(&mut self) {}

    /// React to one step.  Broker misuse surfaces as `BrokerError` and
    /// aborts the run — this is an offline replay, there is nothing to
    /// retry.
    fn on_step(&mut self, ctx: &StepContext, broker: &mut Broker) -> Result<(), BrokerError>;
}

/// Host-level wiring errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StrategyHostError {
    /// `run` was invoked with no strategy registered.  Caught before any
    /// step is processed.
    NoStrategyRegistered,
}

impl std::fmt::Display for StrategyHostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoStrategyRegistered => {
                write!(f, "no strategy registered with the host")
            }
        }
    }
}

impl std::error::Error for StrategyHostError {}
