//! Fiscal impact of a sale: tax withholdings, platform fee, net payout and
//! anti-money-laundering (PLD) alerts.
//!
//! Everything here is pure. The same inputs must always produce the same
//! output because these figures are replayed during audits.

use crate::config::ComplianceThresholds;
use crate::domain::{Decimal, TaxRegime};
use serde::{Deserialize, Serialize};

/// What is being sold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetCategory {
    #[default]
    Vehicle,
    Parts,
    Service,
}

/// Inputs the calculator needs besides the sale itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiscalRules {
    pub thresholds: ComplianceThresholds,
    pub platform_fee_rate: Decimal,
}

/// Threshold alerts. The calculator only reports them; callers decide.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PldAlerts {
    /// Price exceeds the identification threshold.
    pub identification_required: bool,
    /// Price exceeds the regulatory notice threshold.
    pub notice_required: bool,
}

impl PldAlerts {
    pub fn evaluate(price: Decimal, thresholds: &ComplianceThresholds) -> Self {
        Self {
            identification_required: price > thresholds.identification_amount(),
            notice_required: price > thresholds.notice_amount(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiscalImpact {
    pub price: Decimal,
    pub isr_withholding: Decimal,
    pub iva_withholding: Decimal,
    pub platform_fee: Decimal,
    pub net_to_seller: Decimal,
    pub pld_alerts: PldAlerts,
}

/// ISR withheld by the platform on sales of goods.
const ISR_RATE_BPS: i64 = 100;
/// Half of the 16% IVA is withheld on taxable sales.
const IVA_WITHHOLDING_BPS: i64 = 800;

fn bps(value: i64) -> Decimal {
    Decimal::from_parts(value, 4)
}

/// Compute withholdings, fee and net payout for a sale.
pub fn calculate_fiscal_impact(
    price: Decimal,
    regime: TaxRegime,
    category: AssetCategory,
    is_used_p2p: bool,
    rules: &FiscalRules,
) -> FiscalImpact {
    // Used goods sold between individuals are exempt from IVA.
    let iva_exempt =
        is_used_p2p && regime == TaxRegime::Individual && category == AssetCategory::Vehicle;

    let (isr_withholding, iva_withholding) = match regime {
        TaxRegime::Company => (Decimal::zero(), Decimal::zero()),
        TaxRegime::Individual | TaxRegime::IndividualBusiness => {
            let isr = price.percent_of(bps(ISR_RATE_BPS));
            let iva = if iva_exempt {
                Decimal::zero()
            } else {
                price.percent_of(bps(IVA_WITHHOLDING_BPS))
            };
            (isr, iva)
        }
    };

    let platform_fee = price.percent_of(rules.platform_fee_rate);
    let net_to_seller = price - isr_withholding - iva_withholding - platform_fee;

    FiscalImpact {
        price,
        isr_withholding,
        iva_withholding,
        platform_fee,
        net_to_seller,
        pld_alerts: PldAlerts::evaluate(price, &rules.thresholds),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> FiscalRules {
        FiscalRules {
            thresholds: ComplianceThresholds {
                uma_value: Decimal::whole(100),
                identification_umas: 3600,
                notice_umas: 7200,
            },
            platform_fee_rate: Decimal::from_parts(4, 2),
        }
    }

    #[test]
    fn test_individual_p2p_vehicle_is_iva_exempt() {
        let impact = calculate_fiscal_impact(
            Decimal::whole(250_000),
            TaxRegime::Individual,
            AssetCategory::Vehicle,
            true,
            &rules(),
        );
        assert_eq!(impact.isr_withholding, Decimal::whole(2_500));
        assert!(impact.iva_withholding.is_zero());
        assert_eq!(impact.platform_fee, Decimal::whole(10_000));
        assert_eq!(impact.net_to_seller, Decimal::whole(237_500));
        assert_eq!(impact.pld_alerts, PldAlerts::default());
    }

    #[test]
    fn test_business_seller_has_iva_withheld() {
        let impact = calculate_fiscal_impact(
            Decimal::whole(100_000),
            TaxRegime::IndividualBusiness,
            AssetCategory::Vehicle,
            true,
            &rules(),
        );
        assert_eq!(impact.isr_withholding, Decimal::whole(1_000));
        assert_eq!(impact.iva_withholding, Decimal::whole(8_000));
        assert_eq!(impact.net_to_seller, Decimal::whole(87_000));
    }

    #[test]
    fn test_company_has_no_withholding() {
        let impact = calculate_fiscal_impact(
            Decimal::whole(100_000),
            TaxRegime::Company,
            AssetCategory::Parts,
            false,
            &rules(),
        );
        assert!(impact.isr_withholding.is_zero());
        assert!(impact.iva_withholding.is_zero());
        assert_eq!(impact.net_to_seller, Decimal::whole(96_000));
    }

    #[test]
    fn test_non_p2p_individual_pays_iva() {
        let impact = calculate_fiscal_impact(
            Decimal::whole(10_000),
            TaxRegime::Individual,
            AssetCategory::Vehicle,
            false,
            &rules(),
        );
        assert_eq!(impact.iva_withholding, Decimal::whole(800));
    }

    #[test]
    fn test_threshold_alerts() {
        let below = calculate_fiscal_impact(
            Decimal::whole(360_000),
            TaxRegime::Individual,
            AssetCategory::Vehicle,
            true,
            &rules(),
        );
        assert!(!below.pld_alerts.identification_required);

        let identification = calculate_fiscal_impact(
            Decimal::whole(400_000),
            TaxRegime::Individual,
            AssetCategory::Vehicle,
            true,
            &rules(),
        );
        assert!(identification.pld_alerts.identification_required);
        assert!(!identification.pld_alerts.notice_required);

        let notice = calculate_fiscal_impact(
            Decimal::whole(900_000),
            TaxRegime::Individual,
            AssetCategory::Vehicle,
            true,
            &rules(),
        );
        assert!(notice.pld_alerts.identification_required);
        assert!(notice.pld_alerts.notice_required);
    }

    #[test]
    fn test_is_pure() {
        let price = Decimal::from_str_canonical("187654.33").unwrap();
        for regime in [
            TaxRegime::Individual,
            TaxRegime::IndividualBusiness,
            TaxRegime::Company,
        ] {
            let a = calculate_fiscal_impact(price, regime, AssetCategory::Vehicle, true, &rules());
            let b = calculate_fiscal_impact(price, regime, AssetCategory::Vehicle, true, &rules());
            assert_eq!(
                serde_json::to_vec(&a).unwrap(),
                serde_json::to_vec(&b).unwrap()
            );
        }
    }

    #[test]
    fn test_rounds_to_cents() {
        let impact = calculate_fiscal_impact(
            Decimal::from_str_canonical("1234.56").unwrap(),
            TaxRegime::IndividualBusiness,
            AssetCategory::Service,
            false,
            &rules(),
        );
        assert_eq!(impact.isr_withholding.to_canonical_string(), "12.35");
        assert_eq!(impact.iva_withholding.to_canonical_string(), "98.76");
        assert_eq!(impact.platform_fee.to_canonical_string(), "49.38");
        assert_eq!(
            impact.isr_withholding
                + impact.iva_withholding
                + impact.platform_fee
                + impact.net_to_seller,
            impact.price
        );
    }
}
