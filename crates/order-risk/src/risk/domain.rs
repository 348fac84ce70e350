use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier wrapper for merchant orders; also the idempotency key for the pre-auth gate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn generate() -> Self {
        let raw = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("ord-{}", &raw[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for merchants owning a policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MerchantId(pub String);

impl Default for MerchantId {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl fmt::Display for MerchantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything the detectors may inspect about one order and its customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderContext {
    #[serde(default)]
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub merchant_id: MerchantId,
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    pub order_amount_cents: u64,
    #[serde(default)]
    pub billing_address: Option<Address>,
    #[serde(default)]
    pub shipping_address: Option<Address>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub ip_geolocation: Option<IpGeolocation>,
    #[serde(default)]
    pub device_fingerprint: Option<String>,
    #[serde(default)]
    pub card_bin: Option<String>,
    #[serde(default)]
    pub session_timing: Option<SessionTiming>,
    #[serde(default)]
    pub customer_history: Option<CustomerHistory>,
}

impl OrderContext {
    /// Reject structurally invalid input before any detector runs.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let email = self.customer_email.trim();
        if email.is_empty() {
            return Err(ValidationError::MissingField("customer_email"));
        }
        if !email.contains('@') {
            return Err(ValidationError::MalformedEmail(email.to_string()));
        }
        if self.order_amount_cents == 0 {
            return Err(ValidationError::NonPositiveAmount);
        }
        if let Some(order_id) = &self.order_id {
            if order_id.0.trim().is_empty() {
                return Err(ValidationError::MissingField("order_id"));
            }
        }
        if self.merchant_id.0.trim().is_empty() {
            return Err(ValidationError::MissingField("merchant_id"));
        }
        if let Some(bin) = &self.card_bin {
            if !(6..=8).contains(&bin.len()) || !bin.chars().all(|c| c.is_ascii_digit()) {
                return Err(ValidationError::MalformedCardBin(bin.clone()));
            }
        }
        Ok(())
    }

    /// Lower-cased domain part of the customer email.
    pub fn email_domain(&self) -> Option<String> {
        self.customer_email
            .trim()
            .rsplit_once('@')
            .map(|(_, domain)| domain.to_ascii_lowercase())
    }

    pub fn is_first_time_customer(&self) -> bool {
        self.customer_history
            .as_ref()
            .map(|history| history.prior_orders == 0)
            .unwrap_or(true)
    }
}

/// Postal address as captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    /// ISO 3166-1 alpha-2.
    pub country: String,
}

impl Address {
    /// Case and whitespace insensitive form used for billing/shipping comparison.
    pub fn normalized(&self) -> String {
        let mut parts = vec![self.line1.as_str()];
        if let Some(line2) = &self.line2 {
            parts.push(line2.as_str());
        }
        parts.push(self.city.as_str());
        parts.push(self.postal_code.as_str());
        parts.push(self.country.as_str());
        parts
            .iter()
            .flat_map(|part| part.split_whitespace())
            .map(|word| word.trim_matches(|c: char| c == ',' || c == '.'))
            .map(|word| word.to_ascii_lowercase())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn country_code(&self) -> String {
        self.country.trim().to_ascii_uppercase()
    }
}

/// Geolocation resolved for the checkout IP by an upstream enrichment step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpGeolocation {
    pub country: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub is_proxy: bool,
}

/// Checkout behavior timings captured by the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTiming {
    pub seconds_on_site: u32,
    pub checkout_seconds: u32,
    #[serde(default)]
    pub card_details_pasted: bool,
}

/// Prior activity for the customer email and device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerHistory {
    pub prior_orders: u32,
    #[serde(default)]
    pub average_order_cents: Option<u64>,
    #[serde(default)]
    pub orders_last_24h_email: u32,
    #[serde(default)]
    pub orders_last_24h_device: u32,
}

/// Structurally invalid order input, refused before scoring.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("customer email `{0}` is not an address")]
    MalformedEmail(String),
    #[error("order amount must be greater than zero")]
    NonPositiveAmount,
    #[error("card BIN `{0}` must be 6 to 8 digits")]
    MalformedCardBin(String),
}
