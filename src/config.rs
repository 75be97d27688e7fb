//! Runtime configuration from the environment.

use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::pricing::PricingPolicy;
use crate::domain::value_objects::Money;
use crate::identity::{Caller, Role};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: `{value}`")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    /// Unset means the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub pricing: PricingPolicy,
    /// Tokens accepted when no database backs the sessions table.
    pub static_tokens: Vec<(String, Caller)>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> { Self::from_lookup(|key| std::env::var(key).ok()) }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = PricingPolicy::default();
        let tax_rate: Decimal = parse(&lookup, "TAX_RATE", defaults.tax_rate)?;
        if tax_rate.is_sign_negative() || tax_rate > Decimal::ONE {
            return Err(ConfigError::Invalid { key: "TAX_RATE", value: tax_rate.to_string() });
        }
        let pricing = PricingPolicy {
            tax_rate,
            free_shipping_threshold: money(&lookup, "FREE_SHIPPING_THRESHOLD", defaults.free_shipping_threshold)?,
            standard_fee: money(&lookup, "STANDARD_SHIPPING_FEE", defaults.standard_fee)?,
            express_fee: money(&lookup, "EXPRESS_SHIPPING_FEE", defaults.express_fee)?,
        };
        Ok(Self {
            port: parse(&lookup, "PORT", 8083)?,
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: parse(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            pricing,
            static_tokens: lookup("STATIC_AUTH_TOKENS").map(|raw| parse_tokens(&raw)).transpose()?.unwrap_or_default(),
        })
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

fn money(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: Money) -> Result<Money, ConfigError> {
    let amount: Decimal = parse(lookup, key, default.amount())?;
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ConfigError::Invalid { key, value: amount.to_string() });
    }
    Ok(Money::new(amount))
}

/// `token=role:uuid` pairs separated by commas.
fn parse_tokens(raw: &str) -> Result<Vec<(String, Caller)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let invalid = || ConfigError::Invalid { key: "STATIC_AUTH_TOKENS", value: entry.to_string() };
            let (token, grant) = entry.split_once('=').ok_or_else(invalid)?;
            let (role, subject) = grant.split_once(':').ok_or_else(invalid)?;
            let role: Role = role.trim().parse().map_err(|_| invalid())?;
            let subject = Uuid::parse_str(subject.trim()).map_err(|_| invalid())?;
            let token = token.trim();
            if token.is_empty() {
                return Err(invalid());
            }
            Ok((token.to_string(), role.caller(subject)))
        })
        .collect()
}
