//! Escrow deposits, their fee/payout split, and vehicle ownership state.

use crate::domain::{Decimal, TimeMs};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    /// Deposit received and split computed; funds held in the vault.
    Held,
    Disbursed,
    Refunded,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Held => "HELD",
            SettlementStatus::Disbursed => "DISBURSED",
            SettlementStatus::Refunded => "REFUNDED",
        }
    }
}

impl FromStr for SettlementStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HELD" => Ok(SettlementStatus::Held),
            "DISBURSED" => Ok(SettlementStatus::Disbursed),
            "REFUNDED" => Ok(SettlementStatus::Refunded),
            other => Err(format!("unknown settlement status: {}", other)),
        }
    }
}

/// A received deposit and how it is allocated.
///
/// The fee and payout split the vehicle price; add-on money is held apart
/// for the service partners. `platform_fee + seller_payout + add_ons_total
/// == amount` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub transaction_id: String,
    pub amount: Decimal,
    pub platform_fee: Decimal,
    pub seller_payout: Decimal,
    pub add_ons_total: Decimal,
    /// Interbank-style tracking key of the simulated transfer.
    pub tracking_key: String,
    pub status: SettlementStatus,
    pub created_at: TimeMs,
    pub updated_at: TimeMs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleState {
    Listed,
    Reserved,
    Sold,
}

impl VehicleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleState::Listed => "LISTED",
            VehicleState::Reserved => "RESERVED",
            VehicleState::Sold => "SOLD",
        }
    }
}

impl FromStr for VehicleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LISTED" => Ok(VehicleState::Listed),
            "RESERVED" => Ok(VehicleState::Reserved),
            "SOLD" => Ok(VehicleState::Sold),
            other => Err(format!("unknown vehicle state: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: String,
    pub vin: String,
    pub owner_id: String,
    pub state: VehicleState,
    pub updated_at: TimeMs,
}
