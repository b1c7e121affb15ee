use mcd_broker::{Broker, BrokerError, StepContext};

use crate::types::{Strategy, StrategyHostError};

/// Owns the registered strategies and drives their callbacks in
/// registration order.
///
/// The host is the wiring boundary: a driver that forgets to register any
/// strategy is caught by [`StrategyHost::ensure_wired`] before the first
/// step, not by a confusing no-op run.
#[derive(Default)]
pub struct StrategyHost {
    strategies: Vec<Box<dyn Strategy>>,
}

impl StrategyHost {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    pub fn register(&mut self, strategy: Box<dyn Strategy>) {
        self.strategies.push(strategy);
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Fail fast when nothing is registered.
    pub fn ensure_wired(&self) -> Result<(), StrategyHostError> {
        if self.strategies.is_empty() {
            return Err(StrategyHostError::NoStrategyRegistered);
        }
        Ok(())
    }

    /// Run every strategy's one-time setup, in registration order.
    pub fn initialize_all(&mut self) {
        for strategy in &mut self.strategies {
            strategy.initialize();
        }
    }

    /// Run every strategy's step callback, in registration order.  The
    /// first error aborts the step.
    pub fn on_step(&mut self, ctx: &StepContext, broker: &mut Broker) -> Result<(), BrokerError> {
        for strategy in &mut self.strategies {
            strategy.on_step(ctx, broker)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl Strategy for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        fn on_step(&mut self, _ctx: &StepContext, _broker: &mut Broker) -> Result<(), BrokerError> {
            Ok(())
        }
    }

    #[test]
    fn empty_host_fails_wiring_check() {
        let host = StrategyHost::new();
        assert_eq!(
            host.ensure_wired(),
            Err(StrategyHostError::NoStrategyRegistered)
        );
    }

    #[test]
    fn registered_host_passes_wiring_check() {
        let mut host = StrategyHost::new();
        host.register(Box::new(Noop));
        assert_eq!(host.ensure_wired(), Ok(()));
    }
}
