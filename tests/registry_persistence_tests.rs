//! Registry load, autosave and shutdown behaviour against real files

use std::fs;
use std::time::Duration;
use tabkeeper::ledger::{DEBTS_PARTITION, EXPENSES_PARTITION};
use tabkeeper::{
    CounterBook, Entity, EntityId, EntityPartition, Expense, Ledger, PartitionRegistry,
    StoreConfig, Tabkeeper, UserId,
};
use tempfile::TempDir;

fn config(dir: &TempDir) -> StoreConfig {
    StoreConfig::new(dir.path()).flush_interval_secs(3600)
}

fn ledger_registry(dir: &TempDir) -> PartitionRegistry {
    let registry = PartitionRegistry::new(config(dir));
    Ledger::register(&registry).unwrap();
    registry
}

#[tokio::test]
async fn test_initialize_creates_data_dir() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("nested").join("data");

    let registry = PartitionRegistry::new(StoreConfig::new(&data_dir).flush_interval_secs(3600));
    registry.initialize().await.unwrap();
    assert!(data_dir.is_dir());
    registry.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_identities_reattached_after_restart() {
    let temp_dir = TempDir::new().unwrap();

    // Session 1: create data and shut down cleanly
    {
        let registry = ledger_registry(&temp_dir);
        registry.initialize().await.unwrap();
        let expenses = registry
            .get::<EntityPartition<Expense>>(EXPENSES_PARTITION)
            .unwrap();
        for name in ["rent", "groceries", "internet"] {
            let expense = Expense::new(name, 90.0, UserId(1), [UserId(2)]).unwrap();
            expenses.insert_with(|_| expense).unwrap();
        }
        registry.mark_dirty(EXPENSES_PARTITION);
        registry.shutdown().await.unwrap();
    }

    let stored = fs::read_to_string(temp_dir.path().join("expenses.json")).unwrap();
    assert!(!stored.contains("\"id\""));

    // Session 2: every entity carries its key as identity
    {
        let registry = ledger_registry(&temp_dir);
        registry.initialize().await.unwrap();
        let expenses = registry
            .get::<EntityPartition<Expense>>(EXPENSES_PARTITION)
            .unwrap();
        let loaded = expenses.read().unwrap();
        assert_eq!(loaded.len(), 3);
        for (id, expense) in loaded.iter() {
            assert_eq!(expense.id(), *id);
            assert!(expense.id().is_assigned());
        }
        assert_eq!(loaded[&EntityId(2)].name(), "groceries");
        drop(loaded);
        assert_eq!(expenses.allocate_id(), EntityId(4));
        registry.shutdown().await.unwrap();
    }
}

#[tokio::test]
async fn test_unchanged_partition_is_never_rewritten() {
    let temp_dir = TempDir::new().unwrap();
    let registry = ledger_registry(&temp_dir);
    registry.initialize().await.unwrap();

    registry.mark_dirty(EXPENSES_PARTITION);
    assert_eq!(registry.flush_dirty().saved, vec![EXPENSES_PARTITION.to_string()]);
    let path = temp_dir.path().join("expenses.json");
    let first = fs::read(&path).unwrap();

    // Replace the file behind the registry's back; a clean flush must not touch it.
    fs::write(&path, b"sentinel").unwrap();
    let report = registry.flush_dirty();
    assert!(report.saved.is_empty());
    assert_eq!(fs::read(&path).unwrap(), b"sentinel");

    registry.mark_dirty(EXPENSES_PARTITION);
    registry.flush_dirty();
    assert_eq!(fs::read(&path).unwrap(), first);
    assert!(!registry.is_dirty(EXPENSES_PARTITION));
    assert!(!temp_dir.path().join("debts.json").exists());
    registry.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_autosave_writes_dirty_partition() {
    let temp_dir = TempDir::new().unwrap();
    let registry = PartitionRegistry::new(StoreConfig::new(temp_dir.path()));
    CounterBook::register(&registry).unwrap();
    registry
        .initialize_with_interval(Duration::from_millis(50))
        .await
        .unwrap();

    let counters = registry.get::<CounterBook>("counters").unwrap();
    counters.increment("hugs", 2).unwrap();
    registry.mark_dirty("counters");

    let path = temp_dir.path().join("counters.json");
    let mut waited = Duration::ZERO;
    let saved = || registry.autosave_stats().map_or(0, |stats| stats.partitions_saved);
    while saved() == 0 && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += Duration::from_millis(20);
    }

    assert!(!registry.is_dirty("counters"));
    let stored: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(stored, serde_json::json!({ "hugs": 2 }));
    assert_eq!(saved(), 1);
    registry.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_flushes_dirty_partitions() {
    let temp_dir = TempDir::new().unwrap();
    let registry = ledger_registry(&temp_dir);
    registry.initialize().await.unwrap();

    registry.mark_dirty(DEBTS_PARTITION);
    let report = registry.shutdown().await.unwrap();
    assert_eq!(report.saved, vec![DEBTS_PARTITION.to_string()]);
    assert_eq!(report.skipped, 1);
    assert!(temp_dir.path().join("debts.json").exists());
    assert!(registry.autosave_stats().is_none());
}

#[tokio::test]
async fn test_drop_flushes_without_explicit_shutdown() {
    let temp_dir = TempDir::new().unwrap();
    {
        let store = Tabkeeper::open(config(&temp_dir)).await.unwrap();
        store
            .ledger()
            .create_expense("dinner", 40.0, UserId(1), [UserId(2)])
            .unwrap();
    }

    let store = Tabkeeper::open(config(&temp_dir)).await.unwrap();
    let expenses = store.ledger().expenses().unwrap();
    assert_eq!(expenses.len(), 1);
    assert_eq!(expenses[0].name(), "dinner");
    store.close().await.unwrap();
}

#[tokio::test]
async fn test_empty_file_uses_default() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("expenses.json"), b"").unwrap();

    let registry = ledger_registry(&temp_dir);
    registry.initialize().await.unwrap();
    let expenses = registry
        .get::<EntityPartition<Expense>>(EXPENSES_PARTITION)
        .unwrap();
    assert!(expenses.is_empty().unwrap());
    assert_eq!(expenses.allocate_id(), EntityId(1));
    registry.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_round_trip_through_registry_is_stable() {
    let temp_dir = TempDir::new().unwrap();
    {
        let store = Tabkeeper::open(config(&temp_dir)).await.unwrap();
        let ledger = store.ledger();
        ledger
            .create_expense("hotel", 300.0, UserId(1), [UserId(2), UserId(3)])
            .unwrap();
        ledger
            .create_expense("fuel", 45.5, UserId(2), [UserId(1)])
            .unwrap();
        ledger.calculate_settlement().unwrap();
        store.close().await.unwrap();
    }
    let first_expenses = fs::read(temp_dir.path().join("expenses.json")).unwrap();
    let first_debts = fs::read(temp_dir.path().join("debts.json")).unwrap();

    {
        let store = Tabkeeper::open(config(&temp_dir)).await.unwrap();
        store.registry().mark_dirty(EXPENSES_PARTITION);
        store.registry().mark_dirty(DEBTS_PARTITION);
        store.close().await.unwrap();
    }
    assert_eq!(fs::read(temp_dir.path().join("expenses.json")).unwrap(), first_expenses);
    assert_eq!(fs::read(temp_dir.path().join("debts.json")).unwrap(), first_debts);
}

#[tokio::test]
async fn test_exhausted_identity_file_is_quarantined() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("expenses.json"),
        r#"{
  "next_id": 1,
  "entities": {
    "18446744073709551615": {
      "name": "overflow",
      "amount": 5.0,
      "payer": 1,
      "beneficiaries": [1],
      "created_at": "2026-01-01T00:00:00Z"
    }
  }
}"#,
    )
    .unwrap();

    let registry = ledger_registry(&temp_dir);
    registry.initialize().await.unwrap();
    let expenses = registry
        .get::<EntityPartition<Expense>>(EXPENSES_PARTITION)
        .unwrap();
    assert!(expenses.is_empty().unwrap());
    assert_eq!(expenses.allocate_id(), EntityId(1));
    assert!(temp_dir.path().join("expenses.json.corrupt").exists());
    registry.shutdown().await.unwrap();
}
