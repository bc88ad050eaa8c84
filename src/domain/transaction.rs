//! The escrow transaction aggregate and its two orthogonal status machines.

use crate::domain::{Decimal, TaxRegime, TimeMs, Verdict};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Main lifecycle status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    InVault,
    Released,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::InVault => "IN_VAULT",
            TransactionStatus::Released => "RELEASED",
            TransactionStatus::Cancelled => "CANCELLED",
        }
    }

    /// Whether a guarded (non-administrative) transition is allowed.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        match (self, next) {
            (Pending, InVault) => true,
            (InVault, Released) => true,
            (Pending, Cancelled) | (InVault, Cancelled) => true,
            (Pending, _) | (InVault, _) => false,
            (Released, _) | (Cancelled, _) => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Released | TransactionStatus::Cancelled
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TransactionStatus::Pending),
            "IN_VAULT" => Ok(TransactionStatus::InVault),
            "RELEASED" => Ok(TransactionStatus::Released),
            "CANCELLED" => Ok(TransactionStatus::Cancelled),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

/// Compliance sub-state; must be `Approved` before funds enter the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    PendingReview,
    Approved,
    BlockedRisk,
}

impl ComplianceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceStatus::PendingReview => "PENDING_REVIEW",
            ComplianceStatus::Approved => "APPROVED",
            ComplianceStatus::BlockedRisk => "BLOCKED_RISK",
        }
    }
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComplianceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING_REVIEW" => Ok(ComplianceStatus::PendingReview),
            "APPROVED" => Ok(ComplianceStatus::Approved),
            "BLOCKED_RISK" => Ok(ComplianceStatus::BlockedRisk),
            other => Err(format!("unknown compliance status: {}", other)),
        }
    }
}

/// Priced add-on services attached to a transaction.
///
/// A zero amount means the service was not selected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AddOnCosts {
    pub insurance: Decimal,
    pub logistics: Decimal,
    pub warranty: Decimal,
    pub gestoria: Decimal,
}

impl AddOnCosts {
    pub fn total(&self) -> Decimal {
        self.insurance + self.logistics + self.warranty + self.gestoria
    }

    /// Each add-on kind paired with its amount.
    pub fn entries(&self) -> [(AddOnKind, Decimal); 4] {
        [
            (AddOnKind::Insurance, self.insurance),
            (AddOnKind::Logistics, self.logistics),
            (AddOnKind::Warranty, self.warranty),
            (AddOnKind::Gestoria, self.gestoria),
        ]
    }

    pub fn has_negative(&self) -> bool {
        self.entries().iter().any(|(_, amount)| amount.is_negative())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AddOnKind {
    Insurance,
    Logistics,
    Warranty,
    /// Legal title-transfer processing.
    Gestoria,
}

impl AddOnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddOnKind::Insurance => "INSURANCE",
            AddOnKind::Logistics => "LOGISTICS",
            AddOnKind::Warranty => "WARRANTY",
            AddOnKind::Gestoria => "GESTORIA",
        }
    }
}

/// A linked side record created for every selected add-on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddOnOrder {
    pub transaction_id: String,
    pub kind: AddOnKind,
    pub amount: Decimal,
    pub updated_at: TimeMs,
}

/// The central escrow aggregate.
///
/// Totals are intentionally absent; see [`crate::calc::totals`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub vehicle_id: String,
    /// Registry identifier (VIN) used for the theft check.
    pub vehicle_vin: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub seller_tax_regime: TaxRegime,
    pub price: Decimal,
    pub add_ons: AddOnCosts,
    pub status: TransactionStatus,
    pub compliance_status: ComplianceStatus,
    pub requires_regulatory_notice: bool,
    /// Verdict used when the deal was admitted, frozen for audit replay.
    pub risk_snapshot: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_session_id: Option<String>,
    #[serde(skip)]
    pub handover_token_digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handover_consumed_at: Option<TimeMs>,
    pub created_at: TimeMs,
    pub updated_at: TimeMs,
}

impl Transaction {
    pub fn is_party(&self, person_id: &str) -> bool {
        self.buyer_id == person_id || self.seller_id == person_id
    }

    /// Amount the buyer deposits into the vault.
    pub fn deposit_amount(&self) -> Decimal {
        self.price + self.add_ons.total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TransactionStatus::*;

    #[test]
    fn test_guarded_transitions() {
        assert!(Pending.can_transition_to(InVault));
        assert!(InVault.can_transition_to(Released));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(InVault.can_transition_to(Cancelled));

        assert!(!Pending.can_transition_to(Released));
        assert!(!Released.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!InVault.can_transition_to(Pending));
    }

    #[test]
    fn test_status_roundtrip_strings() {
        for status in [Pending, InVault, Released, Cancelled] {
            assert_eq!(status.as_str().parse::<TransactionStatus>().unwrap(), status);
        }
        for status in [
            ComplianceStatus::PendingReview,
            ComplianceStatus::Approved,
            ComplianceStatus::BlockedRisk,
        ] {
            assert_eq!(status.as_str().parse::<ComplianceStatus>().unwrap(), status);
        }
        assert!("SHIPPED".parse::<TransactionStatus>().is_err());
    }

    #[test]
    fn test_status_serde_matches_as_str() {
        let json = serde_json::to_string(&InVault).unwrap();
        assert_eq!(json, "\"IN_VAULT\"");
        let json = serde_json::to_string(&ComplianceStatus::BlockedRisk).unwrap();
        assert_eq!(json, "\"BLOCKED_RISK\"");
    }

    #[test]
    fn test_add_on_total() {
        let add_ons = AddOnCosts {
            insurance: Decimal::whole(1_000),
            logistics: Decimal::whole(2_500),
            warranty: Decimal::zero(),
            gestoria: Decimal::from_parts(150050, 2),
        };
        assert_eq!(add_ons.total(), Decimal::from_parts(500050, 2));
        assert!(!add_ons.has_negative());
    }

    #[test]
    fn test_add_ons_deserialize_with_missing_fields() {
        let add_ons: AddOnCosts = serde_json::from_str(r#"{"logistics":"3200.50"}"#).unwrap();
        assert_eq!(add_ons.logistics, Decimal::from_parts(320050, 2));
        assert!(add_ons.insurance.is_zero());
    }
}
