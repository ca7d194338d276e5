mod common;

use common::{alert_scope, config, group_scope, settle, Harness, NOW};
use cosign_core::{Notification, NotificationKind};
use cosign_production::{CoordinatorError, RouteOutcome};
use cosign_test_helpers::fixtures;
use cosign_types::{EventId, GroupId, GroupStatus, TransactionStatus, TxId, WalletKind};
use std::time::Duration;

fn event(id: &str, kind: NotificationKind) -> Notification {
    Notification::new(EventId::new(id), kind)
}

fn alerts_changed(id: &str) -> Notification {
    event(
        id,
        NotificationKind::AlertsChanged {
            group_id: GroupId::new("g"),
        },
    )
}

#[tokio::test]
async fn test_redelivery_is_duplicate() {
    let h = Harness::start(config(20));
    h.remote.set_alerts(GroupId::new("g"), fixtures::alerts(2));

    assert_eq!(h.session.deliver(alerts_changed("e-1")).await, RouteOutcome::Handled);
    assert_eq!(h.session.deliver(alerts_changed("e-1")).await, RouteOutcome::Duplicate);

    assert_eq!(h.remote.alert_calls(), 1);
    assert_eq!(h.stores.alerts.len(&alert_scope("g")), 2);
    assert_eq!(h.session.metrics().notifications("handled"), 1);
    assert_eq!(h.session.metrics().notifications("duplicate"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_redelivery_is_handled_once() {
    let h = Harness::start(config(20));
    h.remote.set_alerts(GroupId::new("g"), fixtures::alerts(2));
    h.remote.set_latency(Duration::from_millis(200));

    let outcomes = futures::future::join_all(
        (0..8).map(|_| h.session.deliver(alerts_changed("e-1"))),
    )
    .await;

    let handled = outcomes
        .iter()
        .filter(|outcome| **outcome == RouteOutcome::Handled)
        .count();
    assert_eq!(handled, 1);
    assert_eq!(h.remote.alert_calls(), 1);
}

#[tokio::test]
async fn test_failed_event_is_not_retried_on_redelivery() {
    let h = Harness::start(config(20));
    let kind = NotificationKind::TransactionHandleError {
        tx_id: TxId::new("unknown"),
    };

    let first = h.session.deliver(event("e-1", kind.clone())).await;
    assert_eq!(
        first,
        RouteOutcome::Failed(CoordinatorError::UnknownTransaction(TxId::new("unknown")))
    );
    assert_eq!(h.session.deliver(event("e-1", kind)).await, RouteOutcome::Duplicate);
    assert!(h.session.dedup().is_handled(&EventId::new("e-1")));
}

#[tokio::test(start_paused = true)]
async fn test_server_transaction_event_refreshes_after_delay() {
    let h = Harness::start(config(20));
    let policy = fixtures::wallet_policy(WalletKind::Assisted);
    let tx = fixtures::pending_transaction("tx-1", &policy);
    h.session
        .coordinator()
        .track(tx.clone(), WalletKind::Assisted)
        .unwrap();
    h.remote.set_transaction(
        fixtures::snapshot(
            &tx,
            &[fixtures::signer_x(), fixtures::signer_z()],
            TransactionStatus::ReadyToBroadcast,
            1,
        )
        .with_server_transaction(fixtures::server_transaction("tx-1", NOW + Duration::from_secs(60))),
    );

    let session = &h.session;
    let delivery = session.deliver(event(
        "e-1",
        NotificationKind::ServerTransaction {
            tx_id: TxId::new("tx-1"),
        },
    ));
    let observer = async {
        tokio::time::sleep(Duration::from_millis(1900)).await;
        h.remote.transaction_calls()
    };
    let (outcome, calls_before_delay) = tokio::join!(delivery, observer);

    assert_eq!(calls_before_delay, 0);
    assert_eq!(outcome, RouteOutcome::Handled);
    assert_eq!(h.remote.transaction_calls(), 1);
    assert_eq!(
        h.session.coordinator().scheduled_at(&TxId::new("tx-1")),
        Some(NOW + Duration::from_secs(63))
    );
}

#[tokio::test]
async fn test_remote_cancellation_event() {
    let h = Harness::start(config(20));
    let policy = fixtures::wallet_policy(WalletKind::Shared);
    h.session
        .coordinator()
        .track(fixtures::pending_transaction("tx-1", &policy), WalletKind::Shared)
        .unwrap();

    let kind = NotificationKind::TransactionCancelled {
        tx_id: TxId::new("tx-1"),
    };
    assert_eq!(h.session.deliver(event("e-1", kind)).await, RouteOutcome::Handled);
    assert!(!h.session.coordinator().is_tracked(&TxId::new("tx-1")));

    // Cancelling an untracked transaction is a no-op.
    let again = NotificationKind::TransactionCancelled {
        tx_id: TxId::new("tx-1"),
    };
    assert_eq!(h.session.deliver(event("e-2", again)).await, RouteOutcome::Handled);
}

#[tokio::test]
async fn test_group_events_sync_group_and_alerts() {
    let h = Harness::start(config(20));
    h.remote.set_group(fixtures::group("g", GroupStatus::Active));
    h.remote.set_alerts(GroupId::new("g"), fixtures::alerts(1));

    let kind = NotificationKind::GroupMembershipRequestCreated {
        group_id: GroupId::new("g"),
    };
    assert_eq!(h.session.deliver(event("e-1", kind)).await, RouteOutcome::Handled);

    assert_eq!(h.stores.groups.len(&group_scope()), 1);
    assert_eq!(h.stores.alerts.len(&alert_scope("g")), 1);
}

#[tokio::test]
async fn test_key_health_event() {
    let h = Harness::start(config(20));
    h.remote.set_key_health(
        GroupId::new("g"),
        fixtures::wallet_id(),
        vec![fixtures::key_health(0x01, true)],
    );

    let kind = NotificationKind::KeyHealthChanged {
        group_id: GroupId::new("g"),
        wallet_id: fixtures::wallet_id(),
    };
    assert_eq!(h.session.deliver(event("e-1", kind)).await, RouteOutcome::Handled);
}

#[tokio::test]
async fn test_unhandled_kind_is_ignored() {
    let h = Harness::start(config(20));
    assert_eq!(
        h.session.deliver(event("e-1", NotificationKind::Other)).await,
        RouteOutcome::Ignored
    );
    assert_eq!(h.session.metrics().notifications("ignored"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_closed_session_drops_notifications() {
    let h = Harness::start(config(20));
    h.remote.set_alerts(GroupId::new("g"), fixtures::alerts(1));
    h.session.close().await;
    settle().await;

    assert_eq!(h.session.deliver(alerts_changed("e-1")).await, RouteOutcome::Ignored);
    assert_eq!(h.remote.alert_calls(), 0);
    assert!(!h.session.dedup().is_handled(&EventId::new("e-1")));
}

#[tokio::test(start_paused = true)]
async fn test_handled_ids_expire_after_retention() {
    let h = Harness::start(config(20));
    h.remote.set_alerts(GroupId::new("g"), fixtures::alerts(1));
    assert_eq!(h.session.deliver(alerts_changed("e-1")).await, RouteOutcome::Handled);

    // The GC task reads the session clock.
    h.clock.advance(Duration::from_secs(8 * 24 * 3600));
    tokio::time::sleep(Duration::from_secs(3601)).await;
    settle().await;

    assert!(!h.session.dedup().is_handled(&EventId::new("e-1")));
}

#[tokio::test]
async fn test_json_payload_is_routed() {
    let h = Harness::start(config(20));
    h.remote.set_alerts(GroupId::new("g"), fixtures::alerts(1));

    let raw = r#"{"event_id":"e-1","kind":{"type":"alerts_changed","group_id":"g"}}"#;
    let notification: Notification = serde_json::from_str(raw).unwrap();
    assert_eq!(h.session.deliver(notification).await, RouteOutcome::Handled);
    assert_eq!(h.stores.alerts.len(&alert_scope("g")), 1);
}
