//! End-to-end reconciliation properties
//!
//! Drives `Reconciler` with the mock roster, appearance and registry
//! collaborators and checks:
//! - idempotence and convergence
//! - capacity and first-fit allocation
//! - pruning and resumption from persisted checkpoints

use std::sync::Arc;
use std::time::Duration;

use roster_tokens::appearance::MockAppearance;
use roster_tokens::registry::{MockRegistry, RegistryCall};
use roster_tokens::roster::MockRoster;
use roster_tokens::store::MemoryStore;
use roster_tokens::{
    ContainerPool, ContainerSlot, EngineConfig, Identity, JsonFileStore, MemoryReporter,
    NewIdentityRule, Reconciler, StateSnapshot, StateStore, SyncError, SyncEvent,
};
use tempfile::TempDir;

fn engine(
    registry: &Arc<MockRegistry>,
    appearance: &Arc<MockAppearance>,
    store: Arc<dyn StateStore>,
) -> Reconciler {
    Reconciler::new(
        registry.clone(),
        appearance.clone(),
        store,
        Arc::new(MemoryReporter::new()),
    )
    .with_config(EngineConfig {
        new_identity_rule: NewIdentityRule::NameOrToken,
        step_delay: Duration::ZERO,
    })
}

fn side_effects(calls: &[RegistryCall]) -> usize {
    calls
        .iter()
        .filter(|c| !matches!(c, RegistryCall::PostMessage { .. }))
        .count()
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_first_identity_is_created() {
    let registry = Arc::new(MockRegistry::new().with_container("g1", 0, 50));
    let appearance = Arc::new(MockAppearance::new());
    let store = Arc::new(MemoryStore::new());

    let outcome = engine(&registry, &appearance, store.clone())
        .reconcile(
            &[Identity::new("u1", "Alice")],
            ContainerPool::new(vec![ContainerSlot::new("g1", 0, 50)]),
            StateSnapshot::default(),
        )
        .await
        .unwrap();

    assert_eq!(
        registry.calls(),
        vec![RegistryCall::Create {
            container: "g1".to_string(),
            name: "Alice".to_string()
        }]
    );

    let snapshot = store.current();
    let token = snapshot.token_assignments["u1"].clone();
    assert_eq!(snapshot.display_names["u1"], "Alice");
    assert_eq!(snapshot.token_containers[&token], "g1");
    assert_eq!(snapshot, outcome.snapshot);
    assert_eq!(outcome.stats.created, 1);
}

#[tokio::test]
async fn test_rename_only_when_name_changes() {
    let registry = Arc::new(MockRegistry::new().with_container("g1", 0, 50));
    let appearance = Arc::new(MockAppearance::new());
    let store = Arc::new(MemoryStore::new());
    let engine = engine(&registry, &appearance, store.clone());

    let first = engine
        .reconcile(
            &[Identity::new("u1", "Alice")],
            ContainerPool::new(vec![ContainerSlot::new("g1", 0, 50)]),
            StateSnapshot::default(),
        )
        .await
        .unwrap();
    registry.clear_calls();

    let second = engine
        .reconcile(&[Identity::new("u1", "Alicia")], first.containers, first.snapshot)
        .await
        .unwrap();

    let token = second.snapshot.token_assignments["u1"].clone();
    assert_eq!(
        registry.calls(),
        vec![RegistryCall::Rename {
            container: "g1".to_string(),
            token,
            name: "Alicia".to_string()
        }]
    );
    assert_eq!(second.snapshot.display_names["u1"], "Alicia");
    assert_eq!(registry.tokens("g1")[0].name, "Alicia");
}

// =============================================================================
// Properties
// =============================================================================

#[tokio::test]
async fn test_second_pass_is_idempotent() {
    let registry = Arc::new(MockRegistry::new().with_container("g1", 5, 50));
    let appearance = Arc::new(MockAppearance::new());
    let store = Arc::new(MemoryStore::new());
    let engine = engine(&registry, &appearance, store.clone());
    let roster: Vec<Identity> = (0..10)
        .map(|i| Identity::new(format!("u{}", i), format!("Player{}", i)))
        .collect();

    let first = engine
        .reconcile(
            &roster,
            ContainerPool::new(vec![ContainerSlot::new("g1", 5, 50)]),
            StateSnapshot::default(),
        )
        .await
        .unwrap();
    assert_eq!(side_effects(&registry.calls()), 10);
    registry.clear_calls();

    let second = engine
        .reconcile(&roster, first.containers, first.snapshot.clone())
        .await
        .unwrap();

    assert_eq!(side_effects(&registry.calls()), 0);
    assert!(!second.stats.had_side_effects());
    assert_eq!(second.snapshot, first.snapshot);
}

#[tokio::test]
async fn test_every_roster_identity_converges() {
    let registry = Arc::new(
        MockRegistry::new()
            .with_container("g1", 48, 50)
            .with_container("g2", 0, 50),
    );
    let appearance = Arc::new(MockAppearance::new());
    let store = Arc::new(MemoryStore::new());
    let roster: Vec<Identity> = (0..6)
        .map(|i| Identity::new(format!("u{}", i), format!("Player{}", i)))
        .collect();

    let outcome = engine(&registry, &appearance, store)
        .reconcile(
            &roster,
            ContainerPool::new(vec![
                ContainerSlot::new("g1", 48, 50),
                ContainerSlot::new("g2", 0, 50),
            ]),
            StateSnapshot::default(),
        )
        .await
        .unwrap();

    for identity in &roster {
        assert!(outcome.snapshot.token_assignments.contains_key(&identity.key));
        assert_eq!(
            outcome.snapshot.display_names[&identity.key],
            identity.display_name
        );
    }
    assert!(outcome.snapshot.is_consistent());

    // first-fit: g1 saturates before g2 is used
    assert_eq!(outcome.containers.get("g1").unwrap().used, 50);
    assert_eq!(outcome.containers.get("g2").unwrap().used, 4);
    for slot in outcome.containers.slots() {
        assert!(slot.used <= slot.capacity);
    }
    assert_eq!(registry.tokens("g1").len(), 50);
}

#[tokio::test]
async fn test_first_fit_picks_nearly_full_container() {
    let registry = Arc::new(
        MockRegistry::new()
            .with_container("A", 49, 50)
            .with_container("B", 10, 50),
    );
    let appearance = Arc::new(MockAppearance::new());

    engine(&registry, &appearance, Arc::new(MemoryStore::new()))
        .reconcile(
            &[Identity::new("u1", "Alice")],
            ContainerPool::new(vec![
                ContainerSlot::new("A", 49, 50),
                ContainerSlot::new("B", 10, 50),
            ]),
            StateSnapshot::default(),
        )
        .await
        .unwrap();

    assert_eq!(
        registry.calls(),
        vec![RegistryCall::Create {
            container: "A".to_string(),
            name: "Alice".to_string()
        }]
    );
}

#[tokio::test]
async fn test_exhausted_capacity_aborts_at_last_checkpoint() {
    let registry = Arc::new(MockRegistry::new().with_container("g1", 49, 50));
    let appearance = Arc::new(MockAppearance::new());
    let store = Arc::new(MemoryStore::new());
    let roster = vec![Identity::new("u1", "Alice"), Identity::new("u2", "Bob")];

    let err = engine(&registry, &appearance, store.clone())
        .reconcile(
            &roster,
            ContainerPool::new(vec![ContainerSlot::new("g1", 49, 50)]),
            StateSnapshot::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::CapacityExhausted { ref identity } if identity == "u2"));
    assert_eq!(err.exit_code(), 4);

    // one create only; the full container was never offered
    assert_eq!(registry.calls().len(), 1);
    let persisted = store.current();
    assert!(persisted.token_assignments.contains_key("u1"));
    assert!(!persisted.display_names.contains_key("u2"));
}

#[tokio::test]
async fn test_pruning_is_local_only() {
    let registry = Arc::new(MockRegistry::new().with_container("g1", 0, 50));
    let appearance = Arc::new(MockAppearance::new());
    let store = Arc::new(MemoryStore::new());
    let reporter = Arc::new(MemoryReporter::new());
    let engine = Reconciler::new(registry.clone(), appearance.clone(), store.clone(), reporter.clone())
        .with_config(EngineConfig {
            new_identity_rule: NewIdentityRule::NameOrToken,
            step_delay: Duration::ZERO,
        });

    let previous = engine
        .reconcile(
            &[Identity::new("u1", "Alice"), Identity::new("u2", "Bob")],
            ContainerPool::new(vec![ContainerSlot::new("g1", 0, 50)]),
            StateSnapshot::default(),
        )
        .await
        .unwrap();
    let bob_token = previous.snapshot.token_assignments["u2"].clone();
    registry.clear_calls();

    let outcome = engine
        .reconcile(&[Identity::new("u1", "Alice")], previous.containers, previous.snapshot)
        .await
        .unwrap();

    assert!(registry.calls().is_empty());
    assert!(!outcome.snapshot.token_assignments.contains_key("u2"));
    assert!(!outcome.snapshot.token_containers.contains_key(&bob_token));
    assert!(!outcome.snapshot.display_names.contains_key("u2"));
    assert!(!outcome.snapshot.fingerprints.contains_key("u2"));
    assert_eq!(outcome.stats.pruned, 1);
    assert!(registry.tokens("g1").iter().any(|t| t.id == bob_token));
    assert!(reporter.events().contains(&SyncEvent::Pruned {
        identity: "u2".to_string(),
        token: Some(bob_token),
    }));
}

#[tokio::test]
async fn test_returning_identity_is_recreated_after_prune() {
    let registry = Arc::new(MockRegistry::new().with_container("g1", 0, 50));
    let appearance = Arc::new(MockAppearance::new());
    let engine = engine(&registry, &appearance, Arc::new(MemoryStore::new()));
    let pool = || ContainerPool::new(vec![ContainerSlot::new("g1", 0, 50)]);

    let first = engine
        .reconcile(&[Identity::new("u1", "Alice")], pool(), StateSnapshot::default())
        .await
        .unwrap();
    let pruned = engine.reconcile(&[], pool(), first.snapshot).await.unwrap();
    assert_eq!(pruned.snapshot, StateSnapshot::default());
    registry.clear_calls();

    engine
        .reconcile(&[Identity::new("u1", "Alice")], pool(), pruned.snapshot)
        .await
        .unwrap();
    assert_eq!(registry.calls().len(), 1);
}

#[tokio::test]
async fn test_new_identity_is_never_renamed_in_same_run() {
    let registry = Arc::new(MockRegistry::new().with_container("g1", 0, 50));
    let appearance = Arc::new(MockAppearance::new());
    let reporter = Arc::new(MemoryReporter::new());

    // name recorded but no token: new under the default rule
    let mut snapshot = StateSnapshot::default();
    snapshot
        .display_names
        .insert("u1".to_string(), "OldName".to_string());

    Reconciler::new(
        registry.clone(),
        appearance,
        Arc::new(MemoryStore::new()),
        reporter.clone(),
    )
    .with_config(EngineConfig {
        new_identity_rule: NewIdentityRule::NameOrToken,
        step_delay: Duration::ZERO,
    })
    .reconcile(
        &[Identity::new("u1", "NewName")],
        ContainerPool::new(vec![ContainerSlot::new("g1", 0, 50)]),
        snapshot,
    )
    .await
    .unwrap();

    assert_eq!(
        registry.calls(),
        vec![RegistryCall::Create {
            container: "g1".to_string(),
            name: "NewName".to_string()
        }]
    );
    assert!(reporter.events().contains(&SyncEvent::Classified {
        identity: "u1".to_string(),
        is_new: true,
        is_renamed: false,
        is_changed: false,
    }));
}

// =============================================================================
// Full runs and resumption
// =============================================================================

#[tokio::test]
async fn test_run_resumes_from_disk_checkpoint() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(
        MockRegistry::new()
            .with_container("g1", 0, 2)
            .with_container("g2", 0, 50),
    );
    let appearance = Arc::new(MockAppearance::new());
    let roster_source = MockRoster::new().with_group(
        "admin",
        vec![
            Identity::new("u1", "Alice"),
            Identity::new("u2", "Bob"),
            Identity::new("u3", "Carol"),
        ],
    );
    let groups = vec!["admin".to_string()];

    let err = engine(&registry, &appearance, Arc::new(JsonFileStore::new(dir.path())))
        .run(&roster_source, &groups, &["g1".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::CapacityExhausted { ref identity } if identity == "u3"));

    let checkpoint = JsonFileStore::new(dir.path()).load().unwrap();
    assert_eq!(checkpoint.token_assignments.len(), 2);
    assert!(!checkpoint.display_names.contains_key("u3"));
    registry.clear_calls();

    // second container configured; a fresh process picks up the checkpoint
    let outcome = engine(&registry, &appearance, Arc::new(JsonFileStore::new(dir.path())))
        .run(&roster_source, &groups, &["g1".to_string(), "g2".to_string()])
        .await
        .unwrap();

    assert_eq!(
        registry.calls(),
        vec![RegistryCall::Create {
            container: "g2".to_string(),
            name: "Carol".to_string()
        }]
    );
    assert_eq!(outcome.snapshot.token_assignments.len(), 3);
    assert!(outcome.snapshot.is_consistent());
    assert_eq!(JsonFileStore::new(dir.path()).load().unwrap(), outcome.snapshot);
}

#[tokio::test]
async fn test_input_errors_abort_before_state_changes() {
    let registry = Arc::new(MockRegistry::new().with_container("g1", 0, 50));
    let appearance = Arc::new(MockAppearance::new());
    let store = Arc::new(MemoryStore::new());
    let engine = engine(&registry, &appearance, store.clone());

    let failing_roster = MockRoster::new().with_failing_group("admin");
    let err = engine
        .run(&failing_roster, &["admin".to_string()], &["g1".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Roster(_)));
    assert_eq!(err.exit_code(), 3);

    let roster = MockRoster::new().with_group("admin", vec![Identity::new("u1", "Alice")]);
    let err = engine
        .run(&roster, &["admin".to_string()], &["missing".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::ContainerDirectory { .. }));

    assert_eq!(store.save_count(), 0);
    assert_eq!(appearance.call_count(), 0);
    assert!(registry.calls().is_empty());
}
