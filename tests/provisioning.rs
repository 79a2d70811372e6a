//! End-to-end provisioning runs against a fake fleet and in-memory secret store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{engine, engine_with_concurrency, primary, replica, FailingSecretStore, FakeFleet, FakeInstance};
use credplane::credentials::password_from_payload;
use credplane::CredplaneError;
use credplane::database::ProbeOutcome;
use credplane::inventory::InstanceDescriptor;
use credplane::provisioning::{Decision, ProvisionError, RunMode};
use credplane::secrets::{InMemorySecretStore, SecretStore, SyncAction};
use tokio_util::sync::CancellationToken;

const MODES: [RunMode; 3] = [RunMode::Default, RunMode::Check, RunMode::Force];

async fn stored_password(store: &dyn SecretStore, id: &str) -> Option<String> {
    let secret = store.get_secret(id).await.unwrap()?;
    password_from_payload(&secret.value).map(|p| p.expose_secret().to_string())
}

#[tokio::test]
async fn test_scenario_a_create_missing_user_and_skip_replica() {
    let fleet = FakeFleet::new().with("P1", FakeInstance::missing_user()).with("R1", FakeInstance::missing_user());
    let store = Arc::new(InMemorySecretStore::new());
    let engine = engine(RunMode::Default, vec![primary("P1"), replica("R1", "P1")], &fleet, store.clone());

    let report = engine.run(&CancellationToken::new()).await.unwrap();

    let p1 = report.entry("P1").unwrap();
    assert_eq!(p1.decision, Decision::CreateUser);
    assert_eq!(p1.probe, Some(ProbeOutcome::UserMissing));
    assert_eq!(p1.secret.as_ref().unwrap().action, SyncAction::Created);
    assert!(p1.error.is_none());

    let r1 = report.entry("R1").unwrap();
    assert_eq!(r1.decision, Decision::SkipReplica);
    assert!(r1.probe.is_none());

    assert_eq!(store.secret_ids().await, vec!["secret/P1"]);
    assert_eq!(stored_password(store.as_ref(), "secret/P1").await, fleet.password("P1"));
    assert_eq!(fleet.probed(), vec!["P1"]);
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn test_scenario_b_second_run_is_noop() {
    let fleet = FakeFleet::new().with("P1", FakeInstance::missing_user());
    let store = Arc::new(InMemorySecretStore::new());
    let cancel = CancellationToken::new();

    engine(RunMode::Default, vec![primary("P1")], &fleet, store.clone()).run(&cancel).await.unwrap();
    let before = store.get_secret("secret/P1").await.unwrap().unwrap().version_id;

    let report = engine(RunMode::Default, vec![primary("P1")], &fleet, store.clone()).run(&cancel).await.unwrap();
    let entry = report.entry("P1").unwrap();
    assert_eq!(entry.decision, Decision::NoOpUserExists);
    assert_eq!(entry.probe, Some(ProbeOutcome::Authenticated));
    assert!(entry.secret.is_none());

    let after = store.get_secret("secret/P1").await.unwrap().unwrap().version_id;
    assert_eq!(before, after);
    assert_eq!(fleet.mutations().len(), 1);
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn test_scenario_c_force_rotates_password_and_secret() {
    let fleet = FakeFleet::new().with("P1", FakeInstance::missing_user());
    let store = Arc::new(InMemorySecretStore::new());
    let cancel = CancellationToken::new();

    engine(RunMode::Default, vec![primary("P1")], &fleet, store.clone()).run(&cancel).await.unwrap();
    let old_password = fleet.password("P1").unwrap();

    let report = engine(RunMode::Force, vec![primary("P1")], &fleet, store.clone()).run(&cancel).await.unwrap();
    let entry = report.entry("P1").unwrap();
    assert_eq!(entry.decision, Decision::ForceUpdateUser);
    let secret = entry.secret.as_ref().unwrap();
    assert_eq!(secret.action, SyncAction::Updated);
    assert_eq!(secret.version_id, "v2");

    let new_password = fleet.password("P1").unwrap();
    assert_ne!(old_password, new_password);
    assert_eq!(stored_password(store.as_ref(), "secret/P1").await, Some(new_password));
    assert_eq!(fleet.mutations(), vec![("P1".to_string(), "CREATE USER"), ("P1".to_string(), "ALTER USER")]);
}

#[tokio::test]
async fn test_scenario_d_unreachable_instance_errors_in_every_mode() {
    for mode in MODES {
        let fleet = FakeFleet::new().with("P1", FakeInstance::unreachable());
        let store = FailingSecretStore::new();
        let report = engine(mode, vec![primary("P1")], &fleet, store.clone()).run(&CancellationToken::new()).await.unwrap();

        let entry = report.entry("P1").unwrap();
        assert!(matches!(entry.probe, Some(ProbeOutcome::ConnectionError(_))), "mode {}", mode);
        assert!(matches!(entry.error, Some(ProvisionError::Connection { .. })), "mode {}", mode);
        let expected = if mode == RunMode::Check { Decision::SkipCheckMode } else { Decision::Unreachable };
        assert_eq!(entry.decision, expected);

        assert!(fleet.mutations().is_empty());
        assert_eq!(store.writes(), 0);
        assert_ne!(report.exit_code(), 0);
    }
}

#[tokio::test]
async fn test_idempotent_across_fleet() {
    let fleet = FakeFleet::new()
        .with("a", FakeInstance::missing_user())
        .with("b", FakeInstance::missing_user())
        .with("c", FakeInstance::missing_user());
    let store = Arc::new(InMemorySecretStore::new());
    let descriptors = vec![primary("a"), primary("b"), replica("b-ro", "b"), primary("c")];
    let cancel = CancellationToken::new();

    engine(RunMode::Default, descriptors.clone(), &fleet, store.clone()).run(&cancel).await.unwrap();
    let second = engine(RunMode::Default, descriptors, &fleet, store.clone()).run(&cancel).await.unwrap();

    for entry in second.entries() {
        let expected = if entry.instance == "b-ro" { Decision::SkipReplica } else { Decision::NoOpUserExists };
        assert_eq!(entry.decision, expected, "{}", entry.instance);
    }
    assert_eq!(second.summary().unchanged, 3);
}

#[tokio::test]
async fn test_replicas_always_skipped() {
    let states = [FakeInstance::missing_user(), FakeInstance::with_password("x"), FakeInstance::unreachable()];
    for mode in MODES {
        for state in &states {
            let fleet = FakeFleet::new().with("R1", state.clone());
            let store = FailingSecretStore::new();
            let report =
                engine(mode, vec![replica("R1", "P1")], &fleet, store.clone()).run(&CancellationToken::new()).await.unwrap();

            let entry = report.entry("R1").unwrap();
            assert_eq!(entry.decision, Decision::SkipReplica);
            assert!(entry.error.is_none());
            assert!(fleet.probed().is_empty());
            assert!(fleet.mutations().is_empty());
            assert_eq!(store.writes(), 0);
        }
    }
}

#[tokio::test]
async fn test_check_mode_never_mutates() {
    let fleet = FakeFleet::new()
        .with("missing", FakeInstance::missing_user())
        .with("stale", FakeInstance::with_password("not-what-is-stored"))
        .with("down", FakeInstance::unreachable());
    let store = FailingSecretStore::new();
    store.inner.insert("secret/stale", r#"{"password":"stored"}"#).await;
    let descriptors = vec![primary("missing"), primary("stale"), primary("down")];

    let report = engine(RunMode::Check, descriptors, &fleet, store.clone()).run(&CancellationToken::new()).await.unwrap();

    assert!(report.entries().iter().all(|e| e.decision == Decision::SkipCheckMode));
    assert_eq!(report.entry("missing").unwrap().probe, Some(ProbeOutcome::UserMissing));
    assert_eq!(report.entry("stale").unwrap().probe, Some(ProbeOutcome::AuthenticationFailed));
    assert!(fleet.mutations().is_empty());
    assert_eq!(store.writes(), 0);
    assert_eq!(report.summary().errored, 1);
}

#[tokio::test]
async fn test_force_always_writes_new_version() {
    let fleet = FakeFleet::new().with("P1", FakeInstance::missing_user());
    let store = Arc::new(InMemorySecretStore::new());
    let cancel = CancellationToken::new();
    engine(RunMode::Default, vec![primary("P1")], &fleet, store.clone()).run(&cancel).await.unwrap();

    let mut versions = vec![store.get_secret("secret/P1").await.unwrap().unwrap().version_id];
    for _ in 0..3 {
        let report = engine(RunMode::Force, vec![primary("P1")], &fleet, store.clone()).run(&cancel).await.unwrap();
        let entry = report.entry("P1").unwrap();
        assert_eq!(entry.decision, Decision::ForceUpdateUser);
        let version = entry.secret.as_ref().unwrap().version_id.clone();
        assert!(!versions.contains(&version));
        versions.push(version);
    }
    assert_eq!(store.version_count("secret/P1").await, 4);
}

#[tokio::test]
async fn test_force_repairs_user_with_unknown_password() {
    let fleet = FakeFleet::new().with("P1", FakeInstance::with_password("lost"));
    let store = Arc::new(InMemorySecretStore::new());

    let report = engine(RunMode::Force, vec![primary("P1")], &fleet, store.clone()).run(&CancellationToken::new()).await.unwrap();
    let entry = report.entry("P1").unwrap();
    assert_eq!(entry.probe, Some(ProbeOutcome::AuthenticationFailed));
    assert_eq!(entry.decision, Decision::ForceUpdateUser);
    // nothing was stored yet, so the forced write creates the secret
    assert_eq!(entry.secret.as_ref().unwrap().action, SyncAction::Created);
    assert_eq!(stored_password(store.as_ref(), "secret/P1").await, fleet.password("P1"));
}

#[tokio::test]
async fn test_secret_write_failure_reports_drift_and_continues() {
    let fleet = FakeFleet::new().with("P1", FakeInstance::missing_user()).with("P2", FakeInstance::with_password("x"));
    let store = FailingSecretStore::new();
    store.fail_writes();

    let report =
        engine(RunMode::Default, vec![primary("P1"), primary("P2")], &fleet, store.clone()).run(&CancellationToken::new()).await.unwrap();

    let p1 = report.entry("P1").unwrap();
    assert_eq!(p1.decision, Decision::CreateUser);
    assert!(matches!(p1.error, Some(ProvisionError::SecretDrift(_))));
    assert!(fleet.password("P1").is_some());

    let p2 = report.entry("P2").unwrap();
    assert_eq!(p2.decision, Decision::NoOpUserExists);
    assert!(p2.error.is_none());
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn test_secret_read_failure_blocks_apply() {
    let fleet = FakeFleet::new().with("P1", FakeInstance::missing_user());
    let store = FailingSecretStore::new();
    store.fail_reads();

    let report = engine(RunMode::Default, vec![primary("P1")], &fleet, store.clone()).run(&CancellationToken::new()).await.unwrap();
    let entry = report.entry("P1").unwrap();
    assert!(matches!(entry.error, Some(ProvisionError::SecretStore(_))));
    assert!(fleet.mutations().is_empty());
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn test_database_mutation_failure_skips_secret_write() {
    let fleet = FakeFleet::new().with("P1", FakeInstance::missing_user());
    fleet.fail_mutations();
    let store = FailingSecretStore::new();

    let report = engine(RunMode::Default, vec![primary("P1")], &fleet, store.clone()).run(&CancellationToken::new()).await.unwrap();
    let entry = report.entry("P1").unwrap();
    assert_eq!(entry.decision, Decision::CreateUser);
    assert!(matches!(entry.error, Some(ProvisionError::DatabaseMutation(_))));
    assert_eq!(store.writes(), 0);
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn test_report_keeps_inventory_order_under_concurrency() {
    let ids = ["p1", "p2", "p3", "p4", "p5", "p6"];
    let fleet = FakeFleet::new();
    for (i, id) in ids.iter().enumerate() {
        // earlier instances take longer so they finish last
        let delay = Duration::from_millis(10 * (ids.len() - i) as u64);
        fleet.with(id, FakeInstance { probe_delay: delay, ..FakeInstance::missing_user() });
    }
    let store = Arc::new(InMemorySecretStore::new());
    let descriptors: Vec<InstanceDescriptor> = ids.iter().map(|id| primary(id)).collect();

    let report = engine_with_concurrency(RunMode::Default, descriptors, &fleet, store.clone(), 3)
        .run(&CancellationToken::new())
        .await
        .unwrap();

    let order: Vec<&str> = report.entries().iter().map(|e| e.instance.as_str()).collect();
    assert_eq!(order, ids);
    assert!(fleet.max_in_flight() > 1);
    assert!(fleet.max_in_flight() <= 3);
    assert_eq!(report.summary().created, ids.len());
}

#[tokio::test]
async fn test_unsupported_engines_are_not_provisioned() {
    let fleet = FakeFleet::new().with("P1", FakeInstance::missing_user());
    let store = Arc::new(InMemorySecretStore::new());
    let mysql = InstanceDescriptor { engine: Some("mysql".into()), ..primary("M1") };

    let report = engine(RunMode::Default, vec![mysql, primary("P1")], &fleet, store.clone()).run(&CancellationToken::new()).await.unwrap();
    assert!(report.entry("M1").is_none());
    assert_eq!(report.entries().len(), 1);
}

#[tokio::test]
async fn test_malformed_inventory_aborts_run() {
    let fleet = FakeFleet::new();
    let store = Arc::new(InMemorySecretStore::new());
    let broken = InstanceDescriptor { host: None, ..primary("P1") };

    let err = engine(RunMode::Default, vec![broken], &fleet, store.clone()).run(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, CredplaneError::Discovery { .. }));
    assert!(fleet.probed().is_empty());
}

#[tokio::test]
async fn test_cancellation_stops_mutation() {
    let fleet = FakeFleet::new().with("P1", FakeInstance { probe_delay: Duration::from_secs(30), ..FakeInstance::missing_user() });
    let store = FailingSecretStore::new();
    let cancel = CancellationToken::new();
    let engine = engine(RunMode::Default, vec![primary("P1")], &fleet, store.clone());

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let report = engine.run(&cancel).await.unwrap();
    let entry = report.entry("P1").unwrap();
    assert!(matches!(entry.error, Some(ProvisionError::Cancelled { .. })));
    assert!(fleet.mutations().is_empty());
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn test_force_creates_missing_user_over_unusable_secret() {
    let fleet = FakeFleet::new().with("P1", FakeInstance::missing_user());
    let store = Arc::new(InMemorySecretStore::new());
    store.insert("secret/P1", r#"{"API_KEY":"x"}"#).await;
    let cancel = CancellationToken::new();

    let default_run = engine(RunMode::Default, vec![primary("P1")], &fleet, store.clone()).run(&cancel).await.unwrap();
    let entry = default_run.entry("P1").unwrap();
    assert!(matches!(entry.error, Some(ProvisionError::SecretStore(_))));
    assert!(fleet.mutations().is_empty());

    let forced = engine(RunMode::Force, vec![primary("P1")], &fleet, store.clone()).run(&cancel).await.unwrap();
    let entry = forced.entry("P1").unwrap();
    assert_eq!(entry.decision, Decision::CreateUser);
    assert!(entry.error.is_none());
    assert_eq!(entry.secret.as_ref().unwrap().action, SyncAction::Updated);
    assert_eq!(stored_password(store.as_ref(), "secret/P1").await, fleet.password("P1"));

    let secret = store.get_secret("secret/P1").await.unwrap().unwrap();
    let payload: serde_json::Value = serde_json::from_str(secret.value.expose_secret()).unwrap();
    assert_eq!(payload["API_KEY"], "x");
}

#[tokio::test]
async fn test_force_regenerates_stale_stored_password_for_missing_user() {
    let fleet = FakeFleet::new().with("P1", FakeInstance::missing_user());
    let store = Arc::new(InMemorySecretStore::new());
    store.insert("secret/P1", r#"{"password":"Stale-Password-0001!"}"#).await;

    let report = engine(RunMode::Force, vec![primary("P1")], &fleet, store.clone()).run(&CancellationToken::new()).await.unwrap();
    let entry = report.entry("P1").unwrap();
    assert_eq!(entry.decision, Decision::CreateUser);
    let secret = entry.secret.as_ref().unwrap();
    assert_eq!(secret.action, SyncAction::Updated);
    assert_eq!(secret.version_id, "v2");

    let db_password = fleet.password("P1").unwrap();
    assert_ne!(db_password, "Stale-Password-0001!");
    assert_eq!(stored_password(store.as_ref(), "secret/P1").await, Some(db_password));
}

#[tokio::test]
async fn test_default_create_adopts_stored_password() {
    let fleet = FakeFleet::new().with("P1", FakeInstance::missing_user());
    let store = Arc::new(InMemorySecretStore::new());
    store.insert("secret/P1", r#"{"password":"Stored-Password-0001!"}"#).await;

    let report = engine(RunMode::Default, vec![primary("P1")], &fleet, store.clone()).run(&CancellationToken::new()).await.unwrap();
    let entry = report.entry("P1").unwrap();
    assert_eq!(entry.secret.as_ref().unwrap().action, SyncAction::Unchanged);
    assert_eq!(fleet.password("P1").as_deref(), Some("Stored-Password-0001!"));
    assert_eq!(store.version_count("secret/P1").await, 1);
}
