//! Risk verdicts and the per-person cached risk profile.

use crate::domain::TimeMs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Clean,
    /// Enhanced diligence required, not blocking.
    Warning,
    Blocked,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Clean => "CLEAN",
            RiskLevel::Warning => "WARNING",
            RiskLevel::Blocked => "BLOCKED",
        }
    }

    pub fn score(&self) -> u8 {
        match self {
            RiskLevel::Clean => 0,
            RiskLevel::Warning => 60,
            RiskLevel::Blocked => 100,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CLEAN" => Ok(RiskLevel::Clean),
            "WARNING" => Ok(RiskLevel::Warning),
            "BLOCKED" => Ok(RiskLevel::Blocked),
            other => Err(format!("unknown risk level: {}", other)),
        }
    }
}

/// Which watch list produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListKind {
    Sanctions,
    /// Registry of companies simulating operations (shell companies).
    ShellCompany,
    PoliticallyExposed,
}

impl ListKind {
    /// Risk level a single match on this list implies.
    pub fn implied_level(&self) -> RiskLevel {
        match self {
            ListKind::Sanctions | ListKind::ShellCompany => RiskLevel::Blocked,
            ListKind::PoliticallyExposed => RiskLevel::Warning,
        }
    }

    pub fn flag(&self) -> &'static str {
        match self {
            ListKind::Sanctions => "SANCTIONS_MATCH",
            ListKind::ShellCompany => "SHELL_COMPANY_MATCH",
            ListKind::PoliticallyExposed => "PEP",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMatch {
    pub list: ListKind,
    /// The list entry that matched.
    pub entry: String,
}

/// Outcome of a risk screen. Cached and fresh verdicts carry the same meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub person_id: String,
    pub risk_level: RiskLevel,
    pub score: u8,
    pub matches: Vec<ListMatch>,
    pub assessed_at: TimeMs,
    #[serde(default)]
    pub cached: bool,
}

impl Verdict {
    /// Derive the verdict implied by a set of list matches.
    pub fn from_matches(person_id: &str, matches: Vec<ListMatch>, assessed_at: TimeMs) -> Self {
        let risk_level = matches
            .iter()
            .map(|m| m.list.implied_level())
            .max()
            .unwrap_or(RiskLevel::Clean);
        Self {
            person_id: person_id.to_string(),
            risk_level,
            score: risk_level.score(),
            matches,
            assessed_at,
            cached: false,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.risk_level == RiskLevel::Blocked
    }

    pub fn flags(&self) -> Vec<String> {
        let mut flags: Vec<String> = self
            .matches
            .iter()
            .map(|m| m.list.flag().to_string())
            .collect();
        flags.sort();
        flags.dedup();
        flags
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KycStatus {
    #[default]
    Unverified,
    Verified,
}

impl KycStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KycStatus::Unverified => "UNVERIFIED",
            KycStatus::Verified => "VERIFIED",
        }
    }
}

impl FromStr for KycStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNVERIFIED" => Ok(KycStatus::Unverified),
            "VERIFIED" => Ok(KycStatus::Verified),
            other => Err(format!("unknown kyc status: {}", other)),
        }
    }
}

/// Shared, longest-lived per-person record. Upserts are last-write-wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskProfile {
    pub person_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
    pub risk_level: RiskLevel,
    pub score: u8,
    pub matches: Vec<ListMatch>,
    pub kyc_status: KycStatus,
    /// `None` until the first screen completes.
    pub last_assessed_at: Option<TimeMs>,
}

impl RiskProfile {
    pub fn is_kyc_verified(&self) -> bool {
        self.kyc_status == KycStatus::Verified
    }

    /// Whether the cached verdict is still valid at `now`.
    pub fn is_fresh(&self, now: TimeMs, window_ms: i64) -> bool {
        match self.last_assessed_at {
            Some(at) => {
                let age = now.since(at);
                (0..window_ms).contains(&age)
            }
            None => false,
        }
    }

    /// The cached verdict, if one was ever assessed.
    pub fn cached_verdict(&self) -> Option<Verdict> {
        self.last_assessed_at.map(|assessed_at| Verdict {
            person_id: self.person_id.clone(),
            risk_level: self.risk_level,
            score: self.score,
            matches: self.matches.clone(),
            assessed_at,
            cached: true,
        })
    }
}
