use chrono::{Duration, NaiveDate, TimeZone, Utc};

use super::common::*;
use crate::monitoring::record::{
    local_day, MonitoringStatus, RecordError, SweepOutcome, MONITORING_WINDOW_DAYS,
};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 7, d).expect("valid date")
}

#[test]
fn final_day_clears_the_order() {
    let mut record = monitored("ord-5001", 119);
    let outcome = record.advance(day(1), None, now()).expect("advances");

    assert_eq!(outcome, SweepOutcome::Cleared);
    assert_eq!(record.days_monitored, 120);
    assert_eq!(record.status, MonitoringStatus::Cleared);
    assert_eq!(record.cleared_at, Some(now()));
    assert_eq!(record.last_swept_day, Some(day(1)));
}

#[test]
fn dispute_freezes_the_day_counter() {
    let mut record = monitored("ord-5002", 44);
    let outcome = record
        .advance(day(1), Some(dispute()), now())
        .expect("advances");

    assert_eq!(
        outcome,
        SweepOutcome::ChargebackFiled { days_monitored: 45 }
    );
    assert_eq!(record.status, MonitoringStatus::ChargebackFiled);
    let chargeback = record.chargeback.clone().expect("chargeback recorded");
    assert_eq!(chargeback.amount_cents, 18_450);
    assert_eq!(chargeback.filed_at, dispute().filed_at);

    let frozen = record.clone();
    assert_eq!(
        record.advance(day(2), None, now() + Duration::days(1)),
        Err(RecordError::Terminal(MonitoringStatus::ChargebackFiled))
    );
    assert_eq!(record, frozen);
}

#[test]
fn same_or_earlier_day_is_rejected() {
    let mut record = monitored("ord-5003", 10);
    record.advance(day(1), None, now()).expect("advances");
    assert_eq!(
        record.advance(day(1), None, now()),
        Err(RecordError::AlreadySwept(day(1)))
    );
    assert_eq!(
        record.advance(
            NaiveDate::from_ymd_opt(2025, 6, 20).expect("date"),
            None,
            now()
        ),
        Err(RecordError::AlreadySwept(
            NaiveDate::from_ymd_opt(2025, 6, 20).expect("date")
        ))
    );
    assert_eq!(record.days_monitored, 11);
}

#[test]
fn days_never_exceed_the_window() {
    let mut record = monitored("ord-5004", MONITORING_WINDOW_DAYS);
    // A record stuck at the cap still clears rather than counting past it.
    record.advance(day(1), None, now()).expect("advances");
    assert_eq!(record.days_monitored, MONITORING_WINDOW_DAYS);
    assert_eq!(record.status, MonitoringStatus::Cleared);
}

#[test]
fn pushed_dispute_keeps_day_counter() {
    let mut record = monitored("ord-5005", 30);
    record.record_dispute(dispute(), now()).expect("recorded");
    assert_eq!(record.days_monitored, 30);
    assert_eq!(record.status, MonitoringStatus::ChargebackFiled);
    assert_eq!(
        record.record_dispute(dispute(), now()),
        Err(RecordError::Terminal(MonitoringStatus::ChargebackFiled))
    );
}

#[test]
fn local_day_follows_merchant_offset() {
    let instant = Utc
        .with_ymd_and_hms(2025, 7, 2, 3, 30, 0)
        .single()
        .expect("valid timestamp");
    assert_eq!(local_day(instant, 0), day(2));
    assert_eq!(local_day(instant, -300), day(1));
    assert_eq!(local_day(instant, 600), day(2));
    let late = Utc
        .with_ymd_and_hms(2025, 7, 1, 20, 0, 0)
        .single()
        .expect("valid timestamp");
    assert_eq!(local_day(late, 330), day(2));
}
