//! Shipping quotes from a reproducible pseudo-distance.

use crate::domain::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const MIN_DISTANCE_KM: u64 = 50;
const MAX_DISTANCE_KM: u64 = 2_000;
const BASE_FEE: i64 = 1_500;
/// 18.50 per kilometer.
const RATE_PER_KM_CENTS: i64 = 1_850;
/// Enclosed carriers cost 35% more.
const ENCLOSED_MULTIPLIER_BPS: i64 = 13_500;
const KM_PER_TRANSIT_DAY: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShippingTier {
    Standard,
    Enclosed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingOption {
    pub tier: ShippingTier,
    pub cost: Decimal,
    pub eta_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingQuote {
    pub origin: String,
    pub destination: String,
    pub distance_km: u64,
    pub options: Vec<ShippingOption>,
}

impl ShippingQuote {
    pub fn option(&self, tier: ShippingTier) -> Option<&ShippingOption> {
        self.options.iter().find(|o| o.tier == tier)
    }
}

fn normalize(address: &str) -> String {
    address
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Pseudo-distance between two addresses.
///
/// The pair is order-independent and identical addresses are 0 km apart.
pub fn pseudo_distance_km(origin: &str, destination: &str) -> u64 {
    let a = normalize(origin);
    let b = normalize(destination);
    if a == b {
        return 0;
    }
    let (first, second) = if a <= b { (a, b) } else { (b, a) };

    let mut hasher = Sha256::new();
    hasher.update((first.len() as u32).to_le_bytes());
    hasher.update(first.as_bytes());
    hasher.update((second.len() as u32).to_le_bytes());
    hasher.update(second.as_bytes());
    let digest = hasher.finalize();

    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    MIN_DISTANCE_KM + u64::from_le_bytes(head) % (MAX_DISTANCE_KM - MIN_DISTANCE_KM)
}

fn eta_days(distance_km: u64) -> u32 {
    let days = 1 + distance_km.div_ceil(KM_PER_TRANSIT_DAY);
    u32::try_from(days).unwrap_or(u32::MAX)
}

/// Quote every shipping tier between two addresses. Nothing is persisted.
pub fn quote_shipping(origin: &str, destination: &str) -> ShippingQuote {
    let distance_km = pseudo_distance_km(origin, destination);
    let distance = Decimal::whole(i64::try_from(distance_km).unwrap_or(i64::MAX));

    let standard =
        (Decimal::whole(BASE_FEE) + distance * Decimal::from_parts(RATE_PER_KM_CENTS, 2))
            .round_cents();
    let enclosed = standard.percent_of(Decimal::from_parts(ENCLOSED_MULTIPLIER_BPS, 4));

    ShippingQuote {
        origin: origin.trim().to_string(),
        destination: destination.trim().to_string(),
        distance_km,
        options: vec![
            ShippingOption {
                tier: ShippingTier::Standard,
                cost: standard,
                eta_days: eta_days(distance_km),
            },
            ShippingOption {
                tier: ShippingTier::Enclosed,
                cost: enclosed,
                eta_days: eta_days(distance_km) + 1,
            },
        ],
    }
}
