//! Pure, side-effect-free detectors. Each inspects one dimension of the order context.

mod bureau;

pub use bureau::{
    bureau_signals, BureauClient, BureauReport, BureauSource, ExternalSource, LookupError,
};

use super::domain::OrderContext;
use super::signals::{DetectorKind, Signal, SignalStatus};

const DISPOSABLE_DOMAINS: &[&str] = &[
    "mailinator.com",
    "guerrillamail.com",
    "10minutemail.com",
    "tempmail.com",
    "temp-mail.org",
    "throwawaymail.com",
    "yopmail.com",
    "trashmail.com",
    "getnada.com",
    "sharklasers.com",
    "dispostable.com",
    "maildrop.cc",
];

const HIGH_VALUE_WITHOUT_HISTORY_CENTS: u64 = 50_000;

impl DetectorKind {
    /// Run a local detector. Bureau kinds have no local data and report unavailable.
    pub fn detect(self, ctx: &OrderContext) -> Signal {
        match self {
            DetectorKind::DeviceFingerprint => device_fingerprint(ctx),
            DetectorKind::Geolocation => geolocation(ctx),
            DetectorKind::Velocity => velocity(ctx),
            DetectorKind::EmailValidity => email_validity(ctx),
            DetectorKind::PhoneValidity => phone_validity(ctx),
            DetectorKind::AddressMatch => address_match(ctx),
            DetectorKind::OrderValueAnomaly => order_value_anomaly(ctx),
            DetectorKind::CheckoutBehavior => checkout_behavior(ctx),
            bureau_kind => Signal::unavailable(bureau_kind, "requires a bureau lookup"),
        }
    }
}

pub fn is_disposable_domain(domain: &str) -> bool {
    let domain = domain.trim().to_ascii_lowercase();
    DISPOSABLE_DOMAINS
        .iter()
        .any(|known| domain == *known || domain.ends_with(&format!(".{known}")))
}

pub(crate) fn device_fingerprint(ctx: &OrderContext) -> Signal {
    let kind = DetectorKind::DeviceFingerprint;
    match ctx.device_fingerprint.as_deref().map(str::trim) {
        None | Some("") => Signal::new(
            kind,
            SignalStatus::Warn,
            40,
            "no device fingerprint captured",
        ),
        Some(fingerprint)
            if fingerprint.len() < 16
                || !fingerprint.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            Signal::new(
                kind,
                SignalStatus::Fail,
                70,
                format!("malformed device fingerprint ({} chars)", fingerprint.len()),
            )
        }
        Some(_) => Signal::pass(kind, "device fingerprint present"),
    }
}

pub(crate) fn geolocation(ctx: &OrderContext) -> Signal {
    let kind = DetectorKind::Geolocation;
    let Some(geo) = &ctx.ip_geolocation else {
        return Signal::unavailable(kind, "no IP geolocation available");
    };
    if geo.is_proxy {
        return Signal::new(
            kind,
            SignalStatus::Fail,
            75,
            "checkout IP is a proxy, VPN, or Tor exit",
        );
    }

    let ip_country = geo.country.trim().to_ascii_uppercase();
    let billing = ctx
        .billing_address
        .as_ref()
        .map(|address| address.country_code());
    let shipping = ctx
        .shipping_address
        .as_ref()
        .map(|address| address.country_code());

    let billing_mismatch = billing
        .as_ref()
        .is_some_and(|country| *country != ip_country);
    let shipping_mismatch = shipping
        .as_ref()
        .is_some_and(|country| *country != ip_country);

    match (billing_mismatch, shipping_mismatch) {
        (true, true) => Signal::new(
            kind,
            SignalStatus::Fail,
            70,
            format!("IP country {ip_country} matches neither billing nor shipping country"),
        ),
        (true, false) => Signal::new(
            kind,
            SignalStatus::Warn,
            40,
            format!("IP country {ip_country} differs from billing country"),
        ),
        _ => Signal::pass(
            kind,
            format!("IP country {ip_country} consistent with addresses"),
        ),
    }
}

pub(crate) fn velocity(ctx: &OrderContext) -> Signal {
    let kind = DetectorKind::Velocity;
    let Some(history) = &ctx.customer_history else {
        return Signal::pass(kind, "no prior activity on record");
    };
    let recent = history
        .orders_last_24h_email
        .max(history.orders_last_24h_device);
    if recent >= 5 {
        Signal::new(
            kind,
            SignalStatus::Fail,
            85,
            format!("{recent} orders in the last 24h"),
        )
    } else if recent >= 3 {
        Signal::new(
            kind,
            SignalStatus::Warn,
            45,
            format!("{recent} orders in the last 24h"),
        )
    } else {
        Signal::pass(kind, format!("{recent} orders in the last 24h"))
    }
}

pub(crate) fn email_validity(ctx: &OrderContext) -> Signal {
    let kind = DetectorKind::EmailValidity;
    let email = ctx.customer_email.trim();
    let Some((local, domain)) = email.rsplit_once('@') else {
        return Signal::new(kind, SignalStatus::Fail, 90, "email has no domain");
    };
    if local.is_empty() || !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.')
    {
        return Signal::new(
            kind,
            SignalStatus::Fail,
            90,
            format!("malformed email `{email}`"),
        );
    }
    if is_disposable_domain(domain) {
        return Signal::new(
            kind,
            SignalStatus::Fail,
            80,
            format!("disposable email domain {}", domain.to_ascii_lowercase()),
        );
    }
    let digits = local.chars().filter(|c| c.is_ascii_digit()).count();
    if digits >= 5 {
        return Signal::new(
            kind,
            SignalStatus::Warn,
            35,
            format!("email local part carries {digits} digits"),
        );
    }
    Signal::pass(kind, "email well formed")
}

pub(crate) fn phone_validity(ctx: &OrderContext) -> Signal {
    let kind = DetectorKind::PhoneValidity;
    let Some(phone) = ctx
        .customer_phone
        .as_deref()
        .filter(|p| !p.trim().is_empty())
    else {
        return Signal::new(kind, SignalStatus::Warn, 25, "no phone number provided");
    };
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')' | '.'));
    if allowed && (10..=15).contains(&digits) {
        Signal::pass(kind, format!("{digits}-digit phone number"))
    } else {
        Signal::new(
            kind,
            SignalStatus::Fail,
            60,
            format!("implausible phone number `{phone}`"),
        )
    }
}

pub(crate) fn address_match(ctx: &OrderContext) -> Signal {
    let kind = DetectorKind::AddressMatch;
    match (&ctx.billing_address, &ctx.shipping_address) {
        (None, None) => Signal::unavailable(kind, "no addresses captured"),
        (Some(_), None) | (None, Some(_)) => Signal::new(
            kind,
            SignalStatus::Warn,
            20,
            "only one of billing/shipping provided",
        ),
        (Some(billing), Some(shipping)) => {
            if billing.normalized() == shipping.normalized() {
                Signal::pass(kind, "billing and shipping addresses match")
            } else if billing.country_code() == shipping.country_code() {
                Signal::new(
                    kind,
                    SignalStatus::Warn,
                    30,
                    "shipping differs from billing within country",
                )
            } else {
                Signal::new(
                    kind,
                    SignalStatus::Fail,
                    65,
                    format!(
                        "billing country {} differs from shipping country {}",
                        billing.country_code(),
                        shipping.country_code()
                    ),
                )
            }
        }
    }
}

pub(crate) fn order_value_anomaly(ctx: &OrderContext) -> Signal {
    let kind = DetectorKind::OrderValueAnomaly;
    let amount = ctx.order_amount_cents;
    match ctx
        .customer_history
        .as_ref()
        .and_then(|history| history.average_order_cents)
        .filter(|average| *average > 0)
    {
        Some(average) => {
            let ratio = amount as f64 / average as f64;
            if ratio > 5.0 {
                Signal::new(
                    kind,
                    SignalStatus::Fail,
                    75,
                    format!("order is {ratio:.1}x the customer average"),
                )
            } else if ratio > 2.5 {
                Signal::new(
                    kind,
                    SignalStatus::Warn,
                    40,
                    format!("order is {ratio:.1}x the customer average"),
                )
            } else {
                Signal::pass(kind, format!("order is {ratio:.1}x the customer average"))
            }
        }
        None if amount >= HIGH_VALUE_WITHOUT_HISTORY_CENTS => Signal::new(
            kind,
            SignalStatus::Warn,
            30,
            "high-value order without purchase history",
        ),
        None => Signal::pass(kind, "order value unremarkable"),
    }
}

pub(crate) fn checkout_behavior(ctx: &OrderContext) -> Signal {
    let kind = DetectorKind::CheckoutBehavior;
    let Some(timing) = ctx.session_timing else {
        return Signal::unavailable(kind, "no session timing captured");
    };
    if timing.checkout_seconds < 10 {
        Signal::new(
            kind,
            SignalStatus::Fail,
            70,
            format!("checkout completed in {}s", timing.checkout_seconds),
        )
    } else if timing.checkout_seconds < 30 || timing.card_details_pasted {
        Signal::new(
            kind,
            SignalStatus::Warn,
            35,
            format!(
                "checkout in {}s (card pasted: {})",
                timing.checkout_seconds, timing.card_details_pasted
            ),
        )
    } else {
        Signal::pass(kind, format!("checkout in {}s", timing.checkout_seconds))
    }
}
