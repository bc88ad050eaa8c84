use crate::calc::FiscalRules;
use crate::domain::Decimal;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    /// Use the deterministic in-process screening and registry providers.
    pub sandbox_mode: bool,
    pub watchlist_api_url: Option<String>,
    pub theft_registry_api_url: Option<String>,
    pub notify_webhook_url: Option<String>,
    pub thresholds: ComplianceThresholds,
    pub platform_fee_rate: Decimal,
    pub partner_payout_rate: Decimal,
    pub risk_cache_ms: i64,
    pub provider_latency_ms: u64,
}

/// Regulatory amounts indexed to the UMA (Unidad de Medida y Actualización).
///
/// Both thresholds live here so that the soft KYC block and the regulatory
/// notice flag can never drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComplianceThresholds {
    pub uma_value: Decimal,
    /// Above this many UMAs the seller must be identified (KYC).
    pub identification_umas: u32,
    /// Above this many UMAs the operation must be reported.
    pub notice_umas: u32,
}

impl ComplianceThresholds {
    pub fn identification_amount(&self) -> Decimal {
        (self.uma_value * Decimal::whole(i64::from(self.identification_umas))).round_cents()
    }

    pub fn notice_amount(&self) -> Decimal {
        (self.uma_value * Decimal::whole(i64::from(self.notice_umas))).round_cents()
    }
}

impl Default for ComplianceThresholds {
    fn default() -> Self {
        Self {
            uma_value: Decimal::from_parts(11314, 2),
            identification_umas: 3210,
            notice_umas: 6420,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

const DEFAULT_RISK_CACHE_HOURS: i64 = 24;

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let sandbox_mode = match env_map
            .get("SANDBOX_MODE")
            .map(|s| s.trim().to_ascii_lowercase())
            .as_deref()
            .unwrap_or("false")
        {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            other => {
                return Err(ConfigError::InvalidValue(
                    "SANDBOX_MODE".to_string(),
                    format!("must be true or false, got {}", other),
                ))
            }
        };

        let watchlist_api_url = env_map.get("WATCHLIST_API_URL").cloned();
        let theft_registry_api_url = env_map.get("THEFT_REGISTRY_API_URL").cloned();
        if !sandbox_mode {
            if watchlist_api_url.is_none() {
                return Err(ConfigError::MissingEnv("WATCHLIST_API_URL".to_string()));
            }
            if theft_registry_api_url.is_none() {
                return Err(ConfigError::MissingEnv("THEFT_REGISTRY_API_URL".to_string()));
            }
        }

        let defaults = ComplianceThresholds::default();
        let thresholds = ComplianceThresholds {
            uma_value: parse_decimal(&env_map, "UMA_VALUE", defaults.uma_value)?,
            identification_umas: parse_u32(
                &env_map,
                "IDENTIFICATION_THRESHOLD_UMAS",
                defaults.identification_umas,
            )?,
            notice_umas: parse_u32(&env_map, "NOTICE_THRESHOLD_UMAS", defaults.notice_umas)?,
        };
        if thresholds.notice_umas < thresholds.identification_umas {
            return Err(ConfigError::InvalidValue(
                "NOTICE_THRESHOLD_UMAS".to_string(),
                "must not be below IDENTIFICATION_THRESHOLD_UMAS".to_string(),
            ));
        }

        let platform_fee_rate =
            parse_rate(&env_map, "PLATFORM_FEE_RATE", Decimal::from_parts(4, 2))?;
        let partner_payout_rate =
            parse_rate(&env_map, "PARTNER_PAYOUT_RATE", Decimal::from_parts(80, 2))?;

        let risk_cache_hours = env_map
            .get("RISK_CACHE_HOURS")
            .map(|s| s.as_str())
            .unwrap_or("24")
            .parse::<i64>()
            .ok()
            .filter(|h| *h >= 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "RISK_CACHE_HOURS".to_string(),
                    "must be a non-negative integer".to_string(),
                )
            })?;

        let provider_latency_ms = env_map
            .get("PROVIDER_LATENCY_MS")
            .map(|s| s.as_str())
            .unwrap_or("0")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "PROVIDER_LATENCY_MS".to_string(),
                    "must be a valid u64".to_string(),
                )
            })?;

        Ok(Config {
            port,
            database_path,
            sandbox_mode,
            watchlist_api_url,
            theft_registry_api_url,
            notify_webhook_url: env_map.get("NOTIFY_WEBHOOK_URL").cloned(),
            thresholds,
            platform_fee_rate,
            partner_payout_rate,
            risk_cache_ms: risk_cache_hours * 60 * 60 * 1000,
            provider_latency_ms,
        })
    }

    pub fn fiscal_rules(&self) -> FiscalRules {
        FiscalRules {
            thresholds: self.thresholds,
            platform_fee_rate: self.platform_fee_rate,
        }
    }

    /// A sandbox configuration with default business rules.
    pub fn sandbox(database_path: impl Into<String>) -> Self {
        Config {
            port: 0,
            database_path: database_path.into(),
            sandbox_mode: true,
            watchlist_api_url: None,
            theft_registry_api_url: None,
            notify_webhook_url: None,
            thresholds: ComplianceThresholds::default(),
            platform_fee_rate: Decimal::from_parts(4, 2),
            partner_payout_rate: Decimal::from_parts(80, 2),
            risk_cache_ms: DEFAULT_RISK_CACHE_HOURS * 60 * 60 * 1000,
            provider_latency_ms: 0,
        }
    }
}

fn parse_decimal(
    env_map: &HashMap<String, String>,
    key: &str,
    default: Decimal,
) -> Result<Decimal, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => Decimal::from_str_canonical(raw)
            .ok()
            .filter(|d| d.is_positive())
            .ok_or_else(|| {
                ConfigError::InvalidValue(key.to_string(), "must be a positive decimal".to_string())
            }),
    }
}

fn parse_rate(
    env_map: &HashMap<String, String>,
    key: &str,
    default: Decimal,
) -> Result<Decimal, ConfigError> {
    let rate = parse_decimal(env_map, key, default)?;
    if rate >= Decimal::whole(1) {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be a fraction below 1".to_string(),
        ));
    }
    Ok(rate)
}

fn parse_u32(
    env_map: &HashMap<String, String>,
    key: &str,
    default: u32,
) -> Result<u32, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), "must be a valid u32".to_string())
        }),
    }
}
