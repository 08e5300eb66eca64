// ============================================================================
// tabkeeper Library
// ============================================================================

pub mod config;
pub mod core;
pub mod counters;
pub mod events;
pub mod ledger;
pub mod storage;

pub use crate::config::StoreConfig;
pub use crate::core::{DebtId, EPSILON, Entity, EntityId, EventId, ExpenseId, Result, StoreError, UserId};
pub use counters::{COUNTERS_PARTITION, CounterBook};
pub use events::{Event, EventBook};
pub use ledger::{Debt, Expense, Ledger, PaymentOutcome, SettlementEngine, SettlementOutcome};
pub use storage::{EntityPartition, FlushReport, PartitionRegistry};

use std::sync::Arc;

// ============================================================================
// Assembled store
// ============================================================================

/// Every partition of the assistant behind one initialized registry.
///
/// This is the handle a chat front end holds: construct it once at startup,
/// share it, and [`close`](Self::close) it on the way out.
///
/// # Examples
///
/// ```no_run
/// use tabkeeper::{StoreConfig, Tabkeeper, UserId};
///
/// # async fn run() -> tabkeeper::Result<()> {
/// let store = Tabkeeper::open(StoreConfig::new("data").flush_interval_secs(30)).await?;
///
/// store.ledger().create_expense("pizza", 30.0, UserId(1), [UserId(2), UserId(3)])?;
/// let outcome = store.ledger().calculate_settlement()?;
/// println!("{} debts", outcome.debts.len());
///
/// store.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct Tabkeeper {
    registry: Arc<PartitionRegistry>,
    ledger: Ledger,
    events: EventBook,
    counters: Arc<CounterBook>,
}

impl Tabkeeper {
    /// Register all partitions, load them and start autosaving.
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let registry = PartitionRegistry::new(config);
        Ledger::register(&registry)?;
        EventBook::register(&registry)?;
        CounterBook::register(&registry)?;
        registry.initialize().await?;

        let registry = Arc::new(registry);
        Ok(Self {
            ledger: Ledger::attach(registry.clone())?,
            events: EventBook::attach(registry.clone())?,
            counters: registry.get::<CounterBook>(COUNTERS_PARTITION)?,
            registry,
        })
    }

    pub fn registry(&self) -> &Arc<PartitionRegistry> {
        &self.registry
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn events(&self) -> &EventBook {
        &self.events
    }

    pub fn counters(&self) -> &CounterBook {
        &self.counters
    }

    /// Bump a counter and schedule it for saving.
    pub fn increment_counter(&self, name: &str, by: i64) -> Result<i64> {
        let value = self.counters.increment(name, by)?;
        self.registry.mark_dirty(COUNTERS_PARTITION);
        Ok(value)
    }

    pub fn reset_counter(&self, name: &str) -> Result<Option<i64>> {
        let previous = self.counters.reset(name)?;
        if previous.is_some() {
            self.registry.mark_dirty(COUNTERS_PARTITION);
        }
        Ok(previous)
    }

    /// Stop autosaving and flush everything still dirty.
    pub async fn close(&self) -> Result<FlushReport> {
        self.registry.shutdown().await
    }
}
