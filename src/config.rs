// Booking core configuration
// Loaded from BOOKING_* environment variables or a JSON file; missing values fall back to defaults.

use crate::money::{Money, Multiplier};
use crate::notify::{LogNotifier, Notifier, NotifyError, WebhookNotifier};
use crate::refund::RefundPolicy;
use anyhow::{anyhow, bail, Context};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const MIN_SUFFIX_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookingConfig {
    pub currency: String,
    // Applied to base price plus add-ons
    pub tax_rate: Multiplier,
    pub service_fee: Option<Money>,
    pub reference_suffix_len: usize,
    pub max_reference_attempts: u32,
    pub refund_policy: RefundPolicy,
    pub webhook_url: Option<String>,
    pub webhook_timeout_ms: u64,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            tax_rate: Multiplier::ZERO,
            service_fee: None,
            reference_suffix_len: 8,
            max_reference_attempts: 3,
            refund_policy: RefundPolicy::default(),
            webhook_url: None,
            webhook_timeout_ms: 2_000,
        }
    }
}

impl BookingConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading booking config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing booking config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    // Variables are looked up through `lookup` so parsing can be exercised without touching the process env
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let tax_rate = match lookup("BOOKING_TAX_RATE") {
            Some(raw) => {
                let factor: f64 = parse("BOOKING_TAX_RATE", &raw)?;
                Multiplier::from_f64(factor)
                    .ok_or_else(|| anyhow!("BOOKING_TAX_RATE out of range: {}", raw))?
            }
            None => defaults.tax_rate,
        };

        let service_fee = match lookup("BOOKING_SERVICE_FEE_CENTS") {
            Some(raw) => Some(Money::from_minor(parse("BOOKING_SERVICE_FEE_CENTS", &raw)?)),
            None => defaults.service_fee,
        };

        let config = Self {
            currency: lookup("BOOKING_CURRENCY").unwrap_or(defaults.currency),
            tax_rate,
            service_fee,
            reference_suffix_len: lookup("BOOKING_REFERENCE_SUFFIX_LEN")
                .map(|raw| parse("BOOKING_REFERENCE_SUFFIX_LEN", &raw))
                .transpose()?
                .unwrap_or(defaults.reference_suffix_len),
            max_reference_attempts: lookup("BOOKING_MAX_REFERENCE_ATTEMPTS")
                .map(|raw| parse("BOOKING_MAX_REFERENCE_ATTEMPTS", &raw))
                .transpose()?
                .unwrap_or(defaults.max_reference_attempts),
            refund_policy: defaults.refund_policy,
            webhook_url: lookup("BOOKING_WEBHOOK_URL").or(defaults.webhook_url),
            webhook_timeout_ms: lookup("BOOKING_WEBHOOK_TIMEOUT_MS")
                .map(|raw| parse("BOOKING_WEBHOOK_TIMEOUT_MS", &raw))
                .transpose()?
                .unwrap_or(defaults.webhook_timeout_ms),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.currency.trim().is_empty() {
            bail!("currency must not be empty");
        }
        if self.reference_suffix_len < MIN_SUFFIX_LEN {
            bail!(
                "reference suffix must be at least {} characters, got {}",
                MIN_SUFFIX_LEN,
                self.reference_suffix_len
            );
        }
        if self.max_reference_attempts == 0 {
            bail!("max_reference_attempts must be at least 1");
        }
        if self.service_fee.map_or(false, |fee| fee.is_negative()) {
            bail!("service fee must not be negative");
        }
        self.refund_policy
            .validate()
            .map_err(|reason| anyhow!("invalid refund policy: {}", reason))
    }

    // Webhook delivery when a URL is configured, log-only otherwise
    pub fn notifier(&self) -> Result<Arc<dyn Notifier>, NotifyError> {
        match &self.webhook_url {
            Some(url) => Ok(Arc::new(WebhookNotifier::new(
                url.clone(),
                Duration::from_millis(self.webhook_timeout_ms),
            )?)),
            None => Ok(Arc::new(LogNotifier)),
        }
    }
}

fn parse<T>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("invalid value for {}: {:?}", key, raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refund::RefundTier;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = BookingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tax_rate, Multiplier::ZERO);
        assert_eq!(config.currency, "USD");
    }

    #[test]
    fn test_env_overrides() {
        let config = BookingConfig::from_lookup(lookup(&[
            ("BOOKING_CURRENCY", "EUR"),
            ("BOOKING_TAX_RATE", "0.08"),
            ("BOOKING_SERVICE_FEE_CENTS", "250"),
            ("BOOKING_REFERENCE_SUFFIX_LEN", "10"),
        ]))
        .unwrap();

        assert_eq!(config.currency, "EUR");
        assert_eq!(config.tax_rate, Multiplier::from_basis_points(800));
        assert_eq!(config.service_fee, Some(Money::from_minor(250)));
        assert_eq!(config.reference_suffix_len, 10);
        assert_eq!(config.max_reference_attempts, 3);
    }

    #[test]
    fn test_bad_env_value_names_the_variable() {
        let err = BookingConfig::from_lookup(lookup(&[("BOOKING_MAX_REFERENCE_ATTEMPTS", "many")])).unwrap_err();
        assert!(err.to_string().contains("BOOKING_MAX_REFERENCE_ATTEMPTS"));
    }

    #[test]
    fn test_short_suffix_is_rejected() {
        let err = BookingConfig::from_lookup(lookup(&[("BOOKING_REFERENCE_SUFFIX_LEN", "4")])).unwrap_err();
        assert!(err.to_string().contains("suffix"));
    }

    #[test]
    fn test_json_file_round_trip() {
        let path = std::env::temp_dir().join(format!("booking-config-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{
                "currency": "GBP",
                "taxRate": 2000,
                "refundPolicy": { "tiers": [ { "minDays": 10, "percentage": 100 } ] }
            }"#,
        )
        .unwrap();

        let config = BookingConfig::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.currency, "GBP");
        assert_eq!(config.tax_rate, Multiplier::from_basis_points(2_000));
        assert_eq!(config.refund_policy.tiers, vec![RefundTier { min_days: 10, percentage: 100 }]);
        assert_eq!(config.reference_suffix_len, 8);
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = BookingConfig::from_json_file("/nonexistent/booking.json").unwrap_err();
        assert!(format!("{:#}", err).contains("reading booking config"));
    }
}
