//! Append-only audit records.

use crate::domain::{new_id, TimeMs};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditKind {
    RiskScreening,
    BlockedAttempt,
    TransactionCreated,
    SettlementSplit,
    TheftCertificate,
    FraudBlock,
    FundsReleased,
    ManualOverride,
    ComplianceReview,
    TransactionCancelled,
    KycVerified,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::RiskScreening => "RISK_SCREENING",
            AuditKind::BlockedAttempt => "BLOCKED_ATTEMPT",
            AuditKind::TransactionCreated => "TRANSACTION_CREATED",
            AuditKind::SettlementSplit => "SETTLEMENT_SPLIT",
            AuditKind::TheftCertificate => "THEFT_CERTIFICATE",
            AuditKind::FraudBlock => "FRAUD_BLOCK",
            AuditKind::FundsReleased => "FUNDS_RELEASED",
            AuditKind::ManualOverride => "MANUAL_OVERRIDE",
            AuditKind::ComplianceReview => "COMPLIANCE_REVIEW",
            AuditKind::TransactionCancelled => "TRANSACTION_CANCELLED",
            AuditKind::KycVerified => "KYC_VERIFIED",
        }
    }
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "RISK_SCREENING" => AuditKind::RiskScreening,
            "BLOCKED_ATTEMPT" => AuditKind::BlockedAttempt,
            "TRANSACTION_CREATED" => AuditKind::TransactionCreated,
            "SETTLEMENT_SPLIT" => AuditKind::SettlementSplit,
            "THEFT_CERTIFICATE" => AuditKind::TheftCertificate,
            "FRAUD_BLOCK" => AuditKind::FraudBlock,
            "FUNDS_RELEASED" => AuditKind::FundsReleased,
            "MANUAL_OVERRIDE" => AuditKind::ManualOverride,
            "COMPLIANCE_REVIEW" => AuditKind::ComplianceReview,
            "TRANSACTION_CANCELLED" => AuditKind::TransactionCancelled,
            "KYC_VERIFIED" => AuditKind::KycVerified,
            other => return Err(format!("unknown audit kind: {}", other)),
        };
        Ok(kind)
    }
}

/// A write-once audit entry keyed by subject (transaction or person id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: String,
    pub kind: AuditKind,
    pub subject_id: String,
    pub actor_id: String,
    pub payload: serde_json::Value,
    pub created_at: TimeMs,
}

impl AuditRecord {
    pub fn new(
        kind: AuditKind,
        subject_id: impl Into<String>,
        actor_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: new_id(),
            kind,
            subject_id: subject_id.into(),
            actor_id: actor_id.into(),
            payload,
            created_at: TimeMs::now(),
        }
    }
}
