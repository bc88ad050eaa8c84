//! Extended warranty pricing: a percentage of the vehicle price with a floor.

use crate::domain::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarrantyPlan {
    Essential,
    Premium,
}

impl WarrantyPlan {
    /// (rate in basis points, floor, coverage months)
    fn terms(&self) -> (i64, i64, u32) {
        match self {
            WarrantyPlan::Essential => (300, 4_500, 6),
            WarrantyPlan::Premium => (500, 7_500, 12),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarrantyOption {
    pub plan: WarrantyPlan,
    pub cost: Decimal,
    pub coverage_months: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarrantyQuote {
    pub vehicle_value: Decimal,
    pub options: Vec<WarrantyOption>,
}

impl WarrantyQuote {
    pub fn option(&self, plan: WarrantyPlan) -> Option<&WarrantyOption> {
        self.options.iter().find(|o| o.plan == plan)
    }
}

pub fn price_plan(vehicle_value: Decimal, plan: WarrantyPlan) -> WarrantyOption {
    let (rate_bps, floor, coverage_months) = plan.terms();
    let cost = vehicle_value
        .percent_of(Decimal::from_parts(rate_bps, 4))
        .max(Decimal::whole(floor));
    WarrantyOption {
        plan,
        cost,
        coverage_months,
    }
}

/// Quote every warranty plan for a vehicle. Nothing is persisted.
pub fn quote_warranty(vehicle_value: Decimal) -> WarrantyQuote {
    WarrantyQuote {
        vehicle_value,
        options: [WarrantyPlan::Essential, WarrantyPlan::Premium]
            .into_iter()
            .map(|plan| price_plan(vehicle_value, plan))
            .collect(),
    }
}
