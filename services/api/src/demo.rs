use crate::infra::{parse_timestamp, Collaborators, Pipeline, UnconfiguredFulfillment};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use clap::Args;
use order_risk::error::AppError;
use order_risk::monitoring::{
    CustomerMessage, DisputeEvent, DisputeFeed, EvidenceStatus, FeedError, FulfillmentBundle,
    FulfillmentError, FulfillmentRecords, LineItem, MonitoringFilter, PostAuthOrder,
    ProofOfDelivery, SweepSettings, TermsAcceptance, MONITORING_WINDOW_DAYS,
};
use order_risk::preauth::{MoveOutcome, PreAuthOrder, ReviewAction};
use order_risk::risk::{
    Address, CustomerHistory, IpGeolocation, MerchantId, OrderContext, OrderId, PolicyRegistry,
    RiskEngine, SessionTiming,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Starting instant for the walkthrough (RFC 3339). Defaults to now.
    #[arg(long, value_parser = parse_timestamp)]
    pub(crate) now: Option<DateTime<Utc>>,
    /// Print full JSON records instead of one-line summaries
    #[arg(long)]
    pub(crate) verbose: bool,
}

#[derive(Args, Debug)]
pub(crate) struct OrderCheckArgs {
    /// JSON file holding the order context to score
    #[arg(long)]
    pub(crate) input: PathBuf,
    /// Merchant policy registry (JSON); built-in defaults when omitted
    #[arg(long)]
    pub(crate) policies: Option<PathBuf>,
    /// Scoring instant (RFC 3339). Defaults to now.
    #[arg(long, value_parser = parse_timestamp)]
    pub(crate) now: Option<DateTime<Utc>>,
}

/// Score one order against a throwaway store and print the outcome.
pub(crate) async fn run_order_check(args: OrderCheckArgs) -> Result<(), AppError> {
    let OrderCheckArgs {
        input,
        policies,
        now,
    } = args;

    let raw = std::fs::read_to_string(&input)?;
    let ctx: OrderContext = serde_json::from_str(&raw).map_err(std::io::Error::from)?;
    let policies = match policies {
        Some(path) => PolicyRegistry::load(&path)?,
        None => PolicyRegistry::with_defaults()?,
    };
    let policy = policies.resolve(&ctx.merchant_id)?.clone();

    let pipeline = Pipeline::assemble(policies, Collaborators::default(), SweepSettings::default());
    let now = now.unwrap_or_else(Utc::now);
    let order = pipeline.gate.run_pre_auth_check(ctx, &policy, now).await?;
    let assessments = pipeline.gate.assessments(&order.order_id)?;

    println!("Order {} scored as {}", order.order_id, order.status);
    if let Some(assessment) = assessments.last() {
        println!("  {}", assessment.summary());
        print_json("Assessment", assessment);
    }
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { now, verbose } = args;
    let start = now.unwrap_or_else(Utc::now);

    let clean_id = OrderId("demo-1001".to_string());
    let risky_id = OrderId("demo-1002".to_string());
    let pipeline = Pipeline::assemble(
        PolicyRegistry::with_defaults()?,
        Collaborators {
            engine: RiskEngine::local_only(),
            feed: Arc::new(DisputeAfterFirstDay {
                order_id: risky_id.clone(),
            }),
            fulfillment: Arc::new(DemoFulfillment { anchor: start }),
        },
        SweepSettings::default(),
    );
    let policy = pipeline.policies.resolve(&MerchantId::default())?.clone();

    println!("Order risk pipeline demo (starting {})", start.to_rfc3339());

    println!("\nPre-auth gate");
    let clean = pipeline
        .gate
        .run_pre_auth_check(returning_customer(&clean_id), &policy, start)
        .await?;
    describe_order(&clean, verbose);
    let risky = pipeline
        .gate
        .run_pre_auth_check(rushed_checkout(&risky_id), &policy, start)
        .await?;
    describe_order(&risky, verbose);

    let repeat = pipeline
        .gate
        .run_pre_auth_check(returning_customer(&clean_id), &policy, start)
        .await?;
    println!(
        "  Repeat check for {} returned the stored record ({} assessment on file)",
        repeat.order_id,
        pipeline.gate.assessments(&clean_id)?.len()
    );

    println!("\nManual review");
    let reviewed = pipeline
        .gate
        .review(
            &risky_id,
            ReviewAction::Approve,
            "demo-analyst",
            Some("customer confirmed by phone".to_string()),
            start + Duration::hours(2),
        )
        .await?;
    describe_order(&reviewed, verbose);

    println!("\nHand-off to monitoring");
    for order_id in [&clean_id, &risky_id] {
        let outcome = pipeline
            .gate
            .move_pre_auth_to_monitoring(order_id, start + Duration::hours(3))
            .await?;
        describe_move(&outcome);
    }
    let again = pipeline
        .gate
        .move_pre_auth_to_monitoring(&clean_id, start + Duration::hours(4))
        .await?;
    describe_move(&again);

    println!("\nDaily sweeps");
    let window = i64::from(MONITORING_WINDOW_DAYS);
    for day in 0..window {
        let now = start + Duration::days(day) + Duration::hours(6);
        let report = pipeline.run_daily(now).await?;
        if day < 2 || day == window - 1 {
            println!(
                "  Day {:>3}: examined {}, advanced {}, cleared {}, chargebacks {}",
                day + 1,
                report.examined,
                report.advanced,
                report.cleared,
                report.chargebacks
            );
        } else if day == 2 {
            println!("  ...");
        }
        if day == 0 {
            let rerun = pipeline.scheduler.sweep(now).await?;
            println!(
                "  Day   1 rerun: examined {}, advanced {}, skipped {}",
                rerun.examined, rerun.advanced, rerun.skipped
            );
        }
    }
    println!(
        "  {} order-days recorded in the sweep ledger",
        pipeline.store.sweep_ledger_len().unwrap_or_default()
    );

    println!("\nMonitoring records");
    match pipeline
        .scheduler
        .get_monitored_orders(&MonitoringFilter::default())
    {
        Ok(records) => {
            for record in &records {
                describe_record(record, verbose);
            }
        }
        Err(err) => println!("  Monitoring listing unavailable: {}", err),
    }

    println!("\nDispute evidence");
    match pipeline.scheduler.evidence_packages(&risky_id) {
        Ok(packages) => match packages
            .iter()
            .rev()
            .find(|package| package.status == EvidenceStatus::Completed)
        {
            Some(package) => {
                println!(
                    "  Package {} completed with {} messages and {} line items",
                    package.package_id.0,
                    package.customer_communication.len(),
                    package.product_details.len()
                );
                match package.communication_log_csv() {
                    Ok(csv) => println!("  Communication log:\n{}", indent(&csv)),
                    Err(err) => println!("  Communication log unavailable: {}", err),
                }
                if verbose {
                    print_json("Package", package);
                }
            }
            None => println!("  No completed package for {}", risky_id),
        },
        Err(err) => println!("  Evidence lookup failed: {}", err),
    }

    Ok(())
}

fn describe_order(order: &PreAuthOrder, verbose: bool) {
    println!(
        "  {} -> {} | {}",
        order.order_id,
        order.status,
        order.assessment.summary()
    );
    if let Some(reviewer) = &order.reviewed_by {
        println!(
            "    reviewed by {} ({})",
            reviewer,
            order.review_note.as_deref().unwrap_or("no note")
        );
    }
    if verbose {
        print_json("Order", order);
    }
}

fn describe_move(outcome: &MoveOutcome) {
    let label = match outcome {
        MoveOutcome::Created(_) => "monitoring record created",
        MoveOutcome::AlreadyLinked(_) => "already linked, record unchanged",
    };
    println!("  {}: {}", outcome.record().order_id, label);
}

fn describe_record(record: &PostAuthOrder, verbose: bool) {
    println!(
        "  {}: {} after {} day(s){}",
        record.order_id,
        record.status,
        record.days_monitored,
        record
            .chargeback
            .as_ref()
            .map(|chargeback| format!(", dispute: {}", chargeback.reason))
            .unwrap_or_default()
    );
    if verbose {
        print_json("Record", record);
    }
}

fn print_json<T: Serialize>(label: &str, value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("  {} payload:\n{}", label, indent(&json)),
        Err(err) => println!("  {} payload unavailable: {}", label, err),
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("    {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn demo_address() -> Address {
    Address {
        line1: "2201 Westlake Ave".to_string(),
        line2: Some("Suite 300".to_string()),
        city: "Seattle".to_string(),
        postal_code: "98121".to_string(),
        country: "US".to_string(),
    }
}

fn returning_customer(order_id: &OrderId) -> OrderContext {
    OrderContext {
        order_id: Some(order_id.clone()),
        merchant_id: MerchantId::default(),
        customer_email: "jordan.reyes@example.com".to_string(),
        customer_phone: Some("+1 206 555 0148".to_string()),
        order_amount_cents: 8_450,
        billing_address: Some(demo_address()),
        shipping_address: Some(demo_address()),
        ip_address: Some("203.0.113.24".to_string()),
        ip_geolocation: Some(IpGeolocation {
            country: "US".to_string(),
            region: Some("WA".to_string()),
            is_proxy: false,
        }),
        device_fingerprint: Some("5d41402abc4b2a76b9719d911017c592".to_string()),
        card_bin: Some("411111".to_string()),
        session_timing: Some(SessionTiming {
            seconds_on_site: 540,
            checkout_seconds: 95,
            card_details_pasted: false,
        }),
        customer_history: Some(CustomerHistory {
            prior_orders: 6,
            average_order_cents: Some(7_900),
            orders_last_24h_email: 0,
            orders_last_24h_device: 0,
        }),
    }
}

/// Proxy IP, a pasted card, and a burst of recent orders: lands in manual review.
fn rushed_checkout(order_id: &OrderId) -> OrderContext {
    let mut ctx = returning_customer(order_id);
    ctx.customer_email = "quick.cart@mailinator.com".to_string();
    ctx.device_fingerprint = Some("abc123".to_string());
    ctx.ip_geolocation = Some(IpGeolocation {
        country: "US".to_string(),
        region: None,
        is_proxy: true,
    });
    ctx.session_timing = Some(SessionTiming {
        seconds_on_site: 15,
        checkout_seconds: 5,
        card_details_pasted: true,
    });
    ctx.customer_history = Some(CustomerHistory {
        prior_orders: 6,
        average_order_cents: Some(7_900),
        orders_last_24h_email: 6,
        orders_last_24h_device: 2,
    });
    ctx
}

/// Reports a dispute for one order once it has been monitored for a day.
struct DisputeAfterFirstDay {
    order_id: OrderId,
}

#[async_trait]
impl DisputeFeed for DisputeAfterFirstDay {
    async fn poll(&self, order: &PostAuthOrder) -> Result<Option<DisputeEvent>, FeedError> {
        if order.order_id != self.order_id || order.days_monitored == 0 {
            return Ok(None);
        }
        Ok(Some(DisputeEvent {
            reason: "product not received".to_string(),
            amount_cents: order.amount_cents,
            filed_at: order.last_checked_at,
        }))
    }
}

struct DemoFulfillment {
    anchor: DateTime<Utc>,
}

#[async_trait]
impl FulfillmentRecords for DemoFulfillment {
    async fn fetch(&self, _order_id: &OrderId) -> Result<FulfillmentBundle, FulfillmentError> {
        Ok(FulfillmentBundle {
            proof_of_delivery: Some(ProofOfDelivery {
                carrier: "USPS".to_string(),
                tracking_number: "9400111202555842761234".to_string(),
                delivered_at: Some(self.anchor + Duration::days(3)),
                signed_by: None,
            }),
            messages: vec![
                CustomerMessage {
                    sent_at: self.anchor + Duration::hours(1),
                    channel: "email".to_string(),
                    direction: "outbound".to_string(),
                    summary: "Order confirmation sent".to_string(),
                },
                CustomerMessage {
                    sent_at: self.anchor + Duration::days(3),
                    channel: "sms".to_string(),
                    direction: "outbound".to_string(),
                    summary: "Delivered, left at front door".to_string(),
                },
            ],
            line_items: vec![LineItem {
                sku: "HDP-220".to_string(),
                description: "Wireless headphones".to_string(),
                quantity: 1,
                unit_price_cents: 8_450,
            }],
            terms_acceptance: Some(TermsAcceptance {
                accepted_at: self.anchor,
                terms_version: "2025-01".to_string(),
                ip_address: Some("203.0.113.24".to_string()),
            }),
        })
    }
}
