//! Stateless price calculators. Nothing here is persisted.

use super::AppState;
use crate::calc::{
    calculate_fiscal_impact, quote_shipping, quote_warranty, AssetCategory, FiscalImpact,
    ShippingQuote, WarrantyQuote,
};
use crate::domain::{Decimal, TaxRegime};
use crate::error::AppError;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiscalQuoteRequest {
    pub price: Decimal,
    #[serde(default)]
    pub regime: TaxRegime,
    #[serde(default)]
    pub category: AssetCategory,
    #[serde(default = "default_used_p2p")]
    pub is_used_p2p: bool,
}

fn default_used_p2p() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingQuoteRequest {
    pub origin: String,
    pub destination: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarrantyQuoteRequest {
    pub vehicle_value: Decimal,
}

pub async fn fiscal_quote(
    State(state): State<AppState>,
    Json(body): Json<FiscalQuoteRequest>,
) -> Result<Json<FiscalImpact>, AppError> {
    if body.price.is_negative() {
        return Err(AppError::BadRequest("price must not be negative".into()));
    }
    Ok(Json(calculate_fiscal_impact(
        body.price,
        body.regime,
        body.category,
        body.is_used_p2p,
        &state.config.fiscal_rules(),
    )))
}

pub async fn shipping_quote(
    Json(body): Json<ShippingQuoteRequest>,
) -> Result<Json<ShippingQuote>, AppError> {
    if body.origin.trim().is_empty() || body.destination.trim().is_empty() {
        return Err(AppError::BadRequest(
            "origin and destination are required".into(),
        ));
    }
    Ok(Json(quote_shipping(&body.origin, &body.destination)))
}

pub async fn warranty_quote(
    Json(body): Json<WarrantyQuoteRequest>,
) -> Result<Json<WarrantyQuote>, AppError> {
    if !body.vehicle_value.is_positive() {
        return Err(AppError::BadRequest(
            "vehicle value must be positive".into(),
        ));
    }
    Ok(Json(quote_warranty(body.vehicle_value)))
}
