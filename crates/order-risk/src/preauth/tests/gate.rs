use std::sync::Arc;

use chrono::Duration;

use super::common::*;
use crate::alerts::AlertKind;
use crate::monitoring::record::{MonitoringStatus, PostAuthOrder};
use crate::monitoring::repository::MonitoringRepository;
use crate::preauth::gate::{GateError, MoveOutcome, PreAuthGate};
use crate::preauth::order::{PreAuthStatus, ReviewAction};
use crate::preauth::repository::PreAuthRepository;
use crate::risk::decision::{Decision, RiskLevel};
use crate::risk::domain::{OrderId, ValidationError};
use crate::risk::engine::RiskEngine;
use crate::risk::policy::{DisposableEmailPolicy, MerchantPolicy};
use crate::store::InMemoryStore;

fn id(raw: &str) -> OrderId {
    OrderId(raw.to_string())
}

#[tokio::test]
async fn clean_order_is_auto_approved_and_logged() {
    let (gate, store, alerts) = build_gate();

    let order = gate
        .run_pre_auth_check(order_context("ord-2001"), &policy(), now())
        .await
        .expect("check succeeds");

    assert_eq!(order.status, PreAuthStatus::AutoApproved);
    assert_eq!(order.assessment.decision, Decision::Approve);
    assert_eq!(order.decided_at, Some(now()));
    assert_eq!(order.expires_at, now() + Duration::hours(48));
    assert_eq!(order.customer_email, "priya.nair@example.org");

    let stored = PreAuthRepository::fetch(store.as_ref(), &id("ord-2001"))
        .expect("fetch")
        .expect("stored");
    assert_eq!(stored, order);
    assert_eq!(gate.assessments(&id("ord-2001")).expect("history").len(), 1);
    assert!(alerts.events().is_empty());
}

#[tokio::test]
async fn missing_order_id_is_generated() {
    let (gate, _, _) = build_gate();
    let mut ctx = order_context("unused");
    ctx.order_id = None;

    let order = gate
        .run_pre_auth_check(ctx, &policy(), now())
        .await
        .expect("check succeeds");
    assert!(order.order_id.as_str().starts_with("ord-"));
    assert_eq!(order.assessment.order_id, order.order_id);
}

#[tokio::test]
async fn repeat_check_returns_stored_record() {
    let (gate, _, _) = build_gate();
    let first = gate
        .run_pre_auth_check(order_context("ord-2002"), &policy(), now())
        .await
        .expect("first check");
    let second = gate
        .run_pre_auth_check(
            order_context("ord-2002"),
            &policy(),
            now() + Duration::minutes(5),
        )
        .await
        .expect("second check");

    assert_eq!(first, second);
    assert_eq!(gate.assessments(&id("ord-2002")).expect("history").len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_checks_observe_a_single_assessment() {
    let (gate, _, _) = build_gate();
    let policy = policy();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let gate = gate.clone();
        let policy = policy.clone();
        handles.push(tokio::spawn(async move {
            gate.run_pre_auth_check(review_context("ord-2003"), &policy, now())
                .await
        }));
    }

    let mut assessment_ids = Vec::new();
    for handle in handles {
        let order = handle.await.expect("task joins").expect("check succeeds");
        assessment_ids.push(order.assessment.assessment_id);
    }
    assessment_ids.dedup();
    assert_eq!(assessment_ids.len(), 1);
    assert_eq!(gate.assessments(&id("ord-2003")).expect("history").len(), 1);
}

#[tokio::test]
async fn invalid_input_is_refused_before_scoring() {
    let (gate, store, _) = build_gate();
    let mut ctx = order_context("ord-2004");
    ctx.order_amount_cents = 0;

    let err = gate
        .run_pre_auth_check(ctx, &policy(), now())
        .await
        .expect_err("zero amount refused");
    assert!(matches!(
        err,
        GateError::Validation(ValidationError::NonPositiveAmount)
    ));
    assert!(PreAuthRepository::fetch(store.as_ref(), &id("ord-2004"))
        .expect("fetch")
        .is_none());
}

#[tokio::test]
async fn policy_for_another_merchant_is_refused() {
    let (gate, _, _) = build_gate();
    let other = MerchantPolicy::for_merchant("harbor-outfitters")
        .validate()
        .expect("valid");

    let err = gate
        .run_pre_auth_check(order_context("ord-2005"), &other, now())
        .await
        .expect_err("mismatched policy refused");
    assert!(matches!(err, GateError::PolicyMismatch { .. }));
}

#[tokio::test]
async fn declined_order_alerts_and_may_be_rescanned() {
    let (gate, _, alerts) = build_gate();
    let mut strict = MerchantPolicy::default();
    strict.disposable_email = DisposableEmailPolicy::Block;
    let strict = strict.validate().expect("valid");

    let mut ctx = order_context("ord-2006");
    ctx.customer_email = "promo@guerrillamail.com".to_string();
    let declined = gate
        .run_pre_auth_check(ctx, &strict, now())
        .await
        .expect("check succeeds");
    assert_eq!(declined.status, PreAuthStatus::AutoDeclined);
    assert_eq!(declined.assessment.hard_blocks.len(), 1);

    let events = alerts.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, AlertKind::OrderDeclined);
    assert_eq!(events[0].order_id, id("ord-2006"));

    let later = now() + Duration::hours(1);
    let rescanned = gate
        .run_pre_auth_check(order_context("ord-2006"), &strict, later)
        .await
        .expect("rescan succeeds");
    assert_eq!(rescanned.status, PreAuthStatus::AutoApproved);
    assert_eq!(rescanned.created_at, now());
    assert_eq!(rescanned.decided_at, Some(later));
    assert_ne!(
        rescanned.assessment.assessment_id,
        declined.assessment.assessment_id
    );

    let history = gate.assessments(&id("ord-2006")).expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0], declined.assessment);
    assert_eq!(history[1], rescanned.assessment);
}

#[tokio::test]
async fn high_risk_review_raises_alert() {
    let (gate, _, alerts) = build_gate();
    let order = gate
        .run_pre_auth_check(risky_context("ord-2007"), &policy(), now())
        .await
        .expect("check succeeds");

    assert_eq!(order.status, PreAuthStatus::PendingReview);
    assert!(order.assessment.risk_level >= RiskLevel::High);
    let events = alerts.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, AlertKind::HighRiskOrder);
    assert_eq!(
        events[0].details.get("decision").map(String::as_str),
        Some("review")
    );
}

#[tokio::test]
async fn alert_transport_failure_does_not_fail_the_check() {
    let store = Arc::new(InMemoryStore::new());
    let gate = PreAuthGate::new(
        Arc::new(RiskEngine::local_only()),
        store.clone(),
        store.clone(),
        Arc::new(OfflineAlerts),
    );

    let order = gate
        .run_pre_auth_check(risky_context("ord-2008"), &policy(), now())
        .await
        .expect("check succeeds despite alert failure");
    assert_eq!(order.status, PreAuthStatus::PendingReview);
}

#[tokio::test]
async fn reviewer_can_approve_pending_order() {
    let (gate, _, _) = build_gate();
    gate.run_pre_auth_check(review_context("ord-2009"), &policy(), now())
        .await
        .expect("check succeeds");

    let reviewed_at = now() + Duration::hours(3);
    let order = gate
        .review(
            &id("ord-2009"),
            ReviewAction::Approve,
            " m.okafor ",
            Some("called customer".to_string()),
            reviewed_at,
        )
        .await
        .expect("review succeeds");

    assert_eq!(order.status, PreAuthStatus::ManualApproved);
    assert_eq!(order.reviewed_by.as_deref(), Some("m.okafor"));
    assert_eq!(order.review_note.as_deref(), Some("called customer"));
    assert_eq!(order.decided_at, Some(reviewed_at));
    assert_eq!(gate.get(&id("ord-2009")).expect("stored"), order);
}

#[tokio::test]
async fn review_exactly_at_the_deadline_is_accepted() {
    let (gate, _, _) = build_gate();
    gate.run_pre_auth_check(review_context("ord-2020"), &policy(), now())
        .await
        .expect("check succeeds");

    let reviewed = gate
        .review(
            &id("ord-2020"),
            ReviewAction::Approve,
            "m.okafor",
            None,
            now() + Duration::hours(48),
        )
        .await
        .expect("review at the deadline succeeds");
    assert_eq!(reviewed.status, PreAuthStatus::ManualApproved);
}

#[tokio::test]
async fn review_after_window_expires_order() {
    let (gate, _, _) = build_gate();
    gate.run_pre_auth_check(review_context("ord-2010"), &policy(), now())
        .await
        .expect("check succeeds");

    let err = gate
        .review(
            &id("ord-2010"),
            ReviewAction::Approve,
            "m.okafor",
            None,
            now() + Duration::hours(49),
        )
        .await
        .expect_err("late review refused");
    assert!(matches!(err, GateError::ReviewWindowElapsed { .. }));
    assert_eq!(
        gate.get(&id("ord-2010")).expect("stored").status,
        PreAuthStatus::Expired
    );
}

#[tokio::test]
async fn review_of_non_pending_order_is_rejected_without_mutation() {
    let (gate, _, _) = build_gate();
    let approved = gate
        .run_pre_auth_check(order_context("ord-2011"), &policy(), now())
        .await
        .expect("check succeeds");

    let err = gate
        .review(
            &id("ord-2011"),
            ReviewAction::Decline,
            "m.okafor",
            None,
            now(),
        )
        .await
        .expect_err("illegal transition");
    match err {
        GateError::Transition(transition) => {
            assert_eq!(transition.from, PreAuthStatus::AutoApproved);
            assert_eq!(transition.to, PreAuthStatus::ManualDeclined);
        }
        other => panic!("expected transition error, got {other:?}"),
    }
    assert_eq!(gate.get(&id("ord-2011")).expect("stored"), approved);
}

#[tokio::test]
async fn review_requires_reviewer_and_known_order() {
    let (gate, _, _) = build_gate();
    assert!(matches!(
        gate.review(&id("ord-missing"), ReviewAction::Approve, "  ", None, now())
            .await,
        Err(GateError::MissingReviewer)
    ));
    assert!(matches!(
        gate.review(
            &id("ord-missing"),
            ReviewAction::Approve,
            "lee",
            None,
            now()
        )
        .await,
        Err(GateError::NotFound(_))
    ));
}

#[tokio::test]
async fn stale_reviews_are_expired_in_bulk() {
    let (gate, _, _) = build_gate();
    gate.run_pre_auth_check(review_context("ord-2012"), &policy(), now())
        .await
        .expect("check succeeds");
    gate.run_pre_auth_check(
        review_context("ord-2013"),
        &policy(),
        now() + Duration::hours(24),
    )
    .await
    .expect("check succeeds");

    let at_deadline = gate
        .expire_stale_reviews(now() + Duration::hours(48))
        .await
        .expect("expiry runs");
    assert!(at_deadline.is_empty());

    let expired = gate
        .expire_stale_reviews(now() + Duration::hours(48) + Duration::seconds(1))
        .await
        .expect("expiry runs");
    assert_eq!(expired, vec![id("ord-2012")]);
    assert_eq!(
        gate.get(&id("ord-2013")).expect("stored").status,
        PreAuthStatus::PendingReview
    );
}

#[tokio::test]
async fn approved_order_links_to_monitoring_exactly_once() {
    let (gate, store, _) = build_gate();
    gate.run_pre_auth_check(order_context("ord-2014"), &policy(), now())
        .await
        .expect("check succeeds");

    let moved_at = now() + Duration::minutes(10);
    let first = gate
        .move_pre_auth_to_monitoring(&id("ord-2014"), moved_at)
        .await
        .expect("move succeeds");
    let MoveOutcome::Created(record) = &first else {
        panic!("expected a new monitoring record, got {first:?}");
    };
    assert_eq!(record.status, MonitoringStatus::UnderMonitoring);
    assert_eq!(record.days_monitored, 0);
    assert_eq!(record.amount_cents, 12_900);

    let second = gate
        .move_pre_auth_to_monitoring(&id("ord-2014"), moved_at + Duration::minutes(1))
        .await
        .expect("repeat move is a no-op");
    assert_eq!(second, MoveOutcome::AlreadyLinked(record.clone()));

    let order = gate.get(&id("ord-2014")).expect("stored");
    assert_eq!(order.status, PreAuthStatus::MovedToPostAuth);
    assert_eq!(order.moved_at, Some(moved_at));
    let monitored = MonitoringRepository::list(store.as_ref(), &Default::default()).expect("list");
    assert_eq!(monitored.len(), 1);
}

#[tokio::test]
async fn pending_order_cannot_be_moved() {
    let (gate, store, _) = build_gate();
    gate.run_pre_auth_check(review_context("ord-2015"), &policy(), now())
        .await
        .expect("check succeeds");

    let err = gate
        .move_pre_auth_to_monitoring(&id("ord-2015"), now())
        .await
        .expect_err("pending order is not approved");
    assert!(matches!(err, GateError::Transition(_)));
    assert!(MonitoringRepository::fetch(store.as_ref(), &id("ord-2015"))
        .expect("fetch")
        .is_none());
}

#[tokio::test]
async fn half_finished_link_is_repaired_without_duplicate() {
    let (gate, store, _) = build_gate();
    let approved = gate
        .run_pre_auth_check(order_context("ord-2016"), &policy(), now())
        .await
        .expect("check succeeds");
    let existing = MonitoringRepository::insert(
        store.as_ref(),
        PostAuthOrder::from_pre_auth(&approved, now()),
    )
    .expect("insert");

    let outcome = gate
        .move_pre_auth_to_monitoring(&id("ord-2016"), now())
        .await
        .expect("move succeeds");
    assert_eq!(outcome, MoveOutcome::AlreadyLinked(existing));
    assert_eq!(
        gate.get(&id("ord-2016")).expect("stored").status,
        PreAuthStatus::MovedToPostAuth
    );
}

#[tokio::test]
async fn unknown_orders_are_not_found() {
    let (gate, _, _) = build_gate();
    assert!(matches!(gate.get(&id("nope")), Err(GateError::NotFound(_))));
    assert!(matches!(
        gate.assessments(&id("nope")),
        Err(GateError::NotFound(_))
    ));
    assert!(matches!(
        gate.move_pre_auth_to_monitoring(&id("nope"), now()).await,
        Err(GateError::NotFound(_))
    ));
}
