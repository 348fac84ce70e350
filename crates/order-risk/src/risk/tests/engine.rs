use std::sync::Arc;
use std::time::Duration;

use super::common::*;
use crate::risk::decision::{Decision, RiskLevel};
use crate::risk::detectors::BureauSource;
use crate::risk::domain::OrderId;
use crate::risk::engine::RiskEngine;
use crate::risk::policy::MerchantPolicy;
use crate::risk::signals::{DetectorKind, SignalStatus};

fn engine_with(client: impl crate::risk::detectors::BureauClient + 'static) -> RiskEngine {
    RiskEngine::local_only().with_source(Arc::new(BureauSource::new(client)))
}

#[tokio::test]
async fn clean_order_with_bureau_is_approved() {
    let engine = engine_with(StaticBureau(clean_report()));
    let assessment = engine
        .assess(
            OrderId("ord-1".to_string()),
            &order_context(),
            &policy(),
            now(),
        )
        .await;

    assert_eq!(engine.configured_detectors(), 15);
    assert_eq!(assessment.signals.len(), 15);
    assert_eq!(assessment.confidence, 100);
    assert!(!assessment.reduced_confidence);
    assert!(assessment.composite_score < 30);
    assert_eq!(assessment.risk_level, RiskLevel::Low);
    assert_eq!(assessment.decision, Decision::Approve);
    assert_eq!(assessment.assessed_at, now());
}

#[tokio::test]
async fn offline_bureau_degrades_confidence_but_still_decides() {
    let engine = engine_with(OfflineBureau);
    let assessment = engine
        .assess(
            OrderId("ord-2".to_string()),
            &order_context(),
            &policy(),
            now(),
        )
        .await;

    let unavailable: Vec<_> = assessment.unavailable_signals().map(|s| s.kind).collect();
    assert_eq!(unavailable, DetectorKind::BUREAU.to_vec());
    assert_eq!(assessment.confidence, 53);
    assert!(assessment.reduced_confidence);
    assert_eq!(assessment.decision, Decision::Review);
}

#[tokio::test(start_paused = true)]
async fn slow_bureau_times_out_as_unavailable() {
    let mut policy = MerchantPolicy::default();
    policy.detector_timeout_ms = 50;
    let policy = policy.validate().expect("valid");

    let engine = engine_with(SlowBureau(Duration::from_secs(5)));
    let assessment = engine
        .assess(
            OrderId("ord-3".to_string()),
            &order_context(),
            &policy,
            now(),
        )
        .await;

    let identity = assessment
        .signals
        .iter()
        .find(|signal| signal.kind == DetectorKind::IdentityVerification)
        .expect("identity signal present");
    assert_eq!(identity.status, SignalStatus::Unavailable);
    assert!(identity.details.contains("timed out"));
}

#[tokio::test]
async fn policy_weights_are_applied_to_signals() {
    let mut policy = MerchantPolicy::default();
    policy
        .signal_weights
        .insert(DetectorKind::EmailValidity, 0.2);
    let policy = policy.validate().expect("valid");

    let engine = RiskEngine::local_only();
    let assessment = engine
        .assess(
            OrderId("ord-4".to_string()),
            &order_context(),
            &policy,
            now(),
        )
        .await;
    let email = assessment
        .signals
        .iter()
        .find(|signal| signal.kind == DetectorKind::EmailValidity)
        .expect("email signal");
    assert!((email.weight - 0.2).abs() < f32::EPSILON);
    let velocity = assessment
        .signals
        .iter()
        .find(|signal| signal.kind == DetectorKind::Velocity)
        .expect("velocity signal");
    assert!((velocity.weight - DetectorKind::Velocity.default_weight()).abs() < f32::EPSILON);
}

#[tokio::test]
async fn failing_identity_pushes_order_into_review() {
    let mut report = clean_report();
    report.identity_verified = false;
    let engine = engine_with(StaticBureau(report));
    let assessment = engine
        .assess(
            OrderId("ord-5".to_string()),
            &order_context(),
            &policy(),
            now(),
        )
        .await;

    assert_eq!(assessment.composite_score, 50);
    assert_eq!(assessment.risk_level, RiskLevel::High);
    assert_eq!(assessment.decision, Decision::Review);
    assert!(assessment.chargeback_likelihood >= 30);
}

#[tokio::test]
async fn chargeback_likelihood_is_capped() {
    let mut policy = MerchantPolicy::default();
    policy.chargeback_penalties.per_failed_signal = 40;
    policy.chargeback_penalties.cap = 95;
    let policy = policy.validate().expect("valid");

    let mut ctx = order_context();
    ctx.customer_email = "x@mailinator.com".to_string();
    ctx.device_fingerprint = Some("bad".to_string());
    ctx.customer_history = None;

    let engine = RiskEngine::local_only();
    let assessment = engine
        .assess(OrderId("ord-6".to_string()), &ctx, &policy, now())
        .await;
    assert_eq!(assessment.chargeback_likelihood, 95);
}
