mod common;

use common::{Harness, ScriptedOrderApi, api_error, quote};
use viewshop::application::engine::DispatchOutcome;
use viewshop::domain::notification::Notification;
use viewshop::domain::order::OrderStatus;
use viewshop::domain::pricing::PricingPolicy;
use viewshop::error::ShopError;

#[test]
fn test_price_is_quantity_floored_at_minimum() {
    let pricing = PricingPolicy::default();
    for q in (100..=100_000).step_by(997) {
        assert_eq!(pricing.price_for(q).unwrap(), q.max(10));
    }
    for q in [0, 1, 99, 100_001, 1_000_000] {
        assert!(matches!(pricing.price_for(q), Err(ShopError::Validation(_))));
    }
}

#[tokio::test]
async fn test_insufficient_funds_leaves_ledger_untouched() {
    let h = Harness::new(ScriptedOrderApi::succeeding());

    let result = h.engine.create_order("1", quote(500, "immediate")).await;

    match result {
        Err(e @ ShopError::InsufficientFunds { .. }) => {
            assert_eq!(e.shortfall(), Some(500));
        }
        other => panic!("expected InsufficientFunds, got {:?}", other),
    }
    assert_eq!(h.balance("1").await, 0);
    assert_eq!(h.order_count().await, 0);
    assert!(h.api.submitted().is_empty());
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_immediate_order_is_submitted_synchronously() {
    let h = Harness::new(ScriptedOrderApi::with_responses(vec![Ok("23501".to_string())]));
    h.fund("1", 1000).await;

    let order = h.engine.create_order("1", quote(500, "immediate")).await.unwrap();

    assert_eq!(order.price, 500);
    assert_eq!(order.status, OrderStatus::Processing);
    assert_eq!(order.external_order_id.as_deref(), Some("23501"));
    assert!(order.error.is_none());
    assert!(order.processing_started_at.is_some());
    assert_eq!(h.balance("1").await, 500);
    assert_eq!(h.order_count().await, 1);
    assert_eq!(h.api.submitted(), vec![order.id.clone()]);

    let sent = h.notifier.kinds_for(&order.id);
    assert!(matches!(sent[0], Notification::OrderReceived { quantity: 500, .. }));
    assert_eq!(
        sent[1],
        Notification::OrderSubmitted {
            order_id: order.id.clone(),
            external_order_id: "23501".to_string()
        }
    );
}

#[tokio::test]
async fn test_exhausted_submission_fails_with_last_error() {
    let h = Harness::new(ScriptedOrderApi::with_responses(vec![api_error(
        "Not enough funds on balance",
    )]));
    h.fund("1", 1000).await;

    let order = h.engine.create_order("1", quote(300, "immediate")).await.unwrap();

    assert_eq!(order.status, OrderStatus::Failed);
    assert_eq!(order.error.as_deref(), Some("Not enough funds on balance"));
    assert!(order.external_order_id.is_none());
    assert!(order.last_attempt_at.is_some());
    // Failed orders are not refunded automatically.
    assert_eq!(h.balance("1").await, 700);
    assert!(h.notifier.kinds_for(&order.id).contains(&Notification::OrderFailed {
        order_id: order.id.clone(),
        error: "Not enough funds on balance".to_string()
    }));
}

#[tokio::test]
async fn test_dispatch_is_a_noop_once_not_pending() {
    let h = Harness::new(ScriptedOrderApi::succeeding());
    h.fund("1", 1000).await;
    let order = h.engine.create_order("1", quote(200, "immediate")).await.unwrap();

    let again = h.engine.dispatch(&order.id).await.unwrap();

    assert_eq!(again, DispatchOutcome::Skipped(OrderStatus::Processing));
    assert_eq!(h.api.submitted().len(), 1);
    assert_eq!(h.balance("1").await, 800);
}

#[tokio::test]
async fn test_racing_dispatch_triggers_submit_once() {
    let h = Harness::new(ScriptedOrderApi::succeeding());
    h.fund("1", 1000).await;
    let order = h.engine.create_order("1", quote(400, "drip_1_3_100")).await.unwrap();
    assert_eq!(order.status, OrderStatus::Pending);

    let (a, b) = tokio::join!(h.engine.dispatch(&order.id), h.engine.dispatch(&order.id));
    let outcomes = [a.unwrap(), b.unwrap()];

    let submitted = outcomes
        .iter()
        .filter(|o| matches!(o, DispatchOutcome::Submitted { .. }))
        .count();
    assert_eq!(submitted, 1);
    assert!(outcomes.contains(&DispatchOutcome::Skipped(OrderStatus::Processing)));
    assert_eq!(h.api.submitted(), vec![order.id.clone()]);
    assert!(!h.engine.scheduler().is_armed(&order.id));
}

#[tokio::test]
async fn test_drip_plan_is_sent_with_order() {
    let h = Harness::new(ScriptedOrderApi::succeeding());
    h.fund("1", 1000).await;

    let order = h.engine.create_order("1", quote(350, "drip_1_3_100")).await.unwrap();

    assert_eq!(order.delivery.runs, Some(3));
    assert_eq!(order.delivery.interval_minutes, Some(3));
    assert_eq!(order.delivery.start_delay_minutes, 1);
    assert!(h.engine.scheduler().is_armed(&order.id));
    assert!(h.notifier.kinds_for(&order.id).contains(&Notification::OrderScheduled {
        order_id: order.id.clone(),
        start_delay_minutes: 1
    }));
}

#[tokio::test]
async fn test_orders_are_listed_per_user() {
    let h = Harness::new(ScriptedOrderApi::succeeding());
    h.fund("1", 5000).await;
    h.fund("2", 5000).await;

    let first = h.engine.create_order("1", quote(100, "immediate")).await.unwrap();
    let second = h.engine.create_order("1", quote(200, "slow")).await.unwrap();
    h.engine.create_order("2", quote(300, "immediate")).await.unwrap();

    let mine: Vec<String> = h
        .engine
        .orders_for("1")
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.id)
        .collect();
    assert_eq!(mine.len(), 2);
    assert!(mine.contains(&first.id) && mine.contains(&second.id));
    assert!(h.engine.pending_orders("1").await.unwrap().is_empty());

    assert!(matches!(
        h.engine.order_for("2", &first.id).await,
        Err(ShopError::Forbidden(_))
    ));
    let status = h.engine.external_status("1", &first.id).await.unwrap();
    assert_eq!(status.status, "In progress");
}

#[tokio::test]
async fn test_unrecorded_submission_keeps_provider_id() {
    let (h, faulty) = Harness::with_faults(ScriptedOrderApi::with_responses(vec![Ok(
        "23501".to_string(),
    )]));
    h.fund("1", 1000).await;
    let order = h.engine.create_order("1", quote(300, "drip_1_3_100")).await.unwrap();

    // start_processing is stored, recording the provider id is not.
    faulty.fail_updates_after(1);
    let result = h.engine.dispatch(&order.id).await;
    assert!(matches!(result, Err(ShopError::Persistence(msg)) if msg.contains("23501")));

    faulty.heal();
    let again = h.engine.dispatch(&order.id).await.unwrap();
    assert_eq!(again, DispatchOutcome::Skipped(OrderStatus::Processing));
    assert_eq!(h.api.submitted(), vec![order.id.clone()]);
    assert_eq!(h.balance("1").await, 700);
}
