//! Parties to a deal and their fiscal classification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity attributes used for watch-list screening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyIdentity {
    pub id: String,
    pub name: String,
    /// RFC / tax id when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
}

impl PartyIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>, tax_id: Option<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tax_id,
        }
    }
}

/// Seller's tax regime; drives withholding rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaxRegime {
    /// Individual without business activity.
    #[default]
    Individual,
    /// Individual with business activity (including simplified regimes).
    IndividualBusiness,
    Company,
}

impl TaxRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaxRegime::Individual => "INDIVIDUAL",
            TaxRegime::IndividualBusiness => "INDIVIDUAL_BUSINESS",
            TaxRegime::Company => "COMPANY",
        }
    }
}

impl fmt::Display for TaxRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaxRegime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INDIVIDUAL" => Ok(TaxRegime::Individual),
            "INDIVIDUAL_BUSINESS" => Ok(TaxRegime::IndividualBusiness),
            "COMPANY" => Ok(TaxRegime::Company),
            other => Err(format!("unknown tax regime: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_regime_roundtrip() {
        for regime in [
            TaxRegime::Individual,
            TaxRegime::IndividualBusiness,
            TaxRegime::Company,
        ] {
            assert_eq!(regime.as_str().parse::<TaxRegime>().unwrap(), regime);
            let json = serde_json::to_string(&regime).unwrap();
            assert_eq!(json, format!("\"{}\"", regime.as_str()));
        }
    }
}
