//! Request and response DTOs for the pass-service REST API.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{BoardingPass, PassInstallment, PassStatus, ProductInstallment};

fn default_page_size() -> i32 {
    50
}

// -----------------------------------------------------------------------------
// Products
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    pub description: Option<String>,

    #[validate(length(min = 1, max = 100, message = "Category must be 1-100 characters"))]
    pub category: String,

    pub price: Decimal,

    #[serde(default = "default_true")]
    pub active: bool,

    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,

    #[serde(default)]
    pub partial_payments_enabled: bool,

    #[validate(range(min = 2, max = 60, message = "Installment count must be 2-60"))]
    pub installment_count: Option<i32>,

    pub installment_valid_from: Option<NaiveDate>,
    pub installment_valid_to: Option<NaiveDate>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,

    pub description: Option<String>,

    #[validate(length(min = 1, max = 100, message = "Category must be 1-100 characters"))]
    pub category: Option<String>,

    pub price: Option<Decimal>,
    pub active: Option<bool>,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
    pub partial_payments_enabled: Option<bool>,

    #[validate(range(min = 2, max = 60, message = "Installment count must be 2-60"))]
    pub installment_count: Option<i32>,

    pub installment_valid_from: Option<NaiveDate>,
    pub installment_valid_to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct ListProductsQuery {
    #[serde(default)]
    pub active_only: bool,
    pub category: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

// -----------------------------------------------------------------------------
// Installment plans
// -----------------------------------------------------------------------------

/// Propose a fresh plan split for a price over a date window.
#[derive(Debug, Deserialize, Validate)]
pub struct PlanPreviewRequest {
    pub price: Decimal,

    #[validate(range(min = 2, max = 60, message = "Installment count must be 2-60"))]
    pub installment_count: i32,

    pub starts_on: Option<NaiveDate>,
    pub ends_on: Option<NaiveDate>,
}

/// Re-split amounts across an existing plan after a price change,
/// keeping the dates as they are.
#[derive(Debug, Deserialize, Validate)]
pub struct PlanRedistributeRequest {
    pub price: Decimal,

    #[validate(length(min = 1, message = "At least one plan row is required"))]
    pub rows: Vec<PlanRowDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRowDto {
    pub sequence_number: i32,
    pub starts_on: Option<NaiveDate>,
    pub ends_on: Option<NaiveDate>,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct PlanResponse {
    pub rows: Vec<PlanRowDto>,
    pub total: Decimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReplacePlanRequest {
    #[validate(length(min = 1, message = "At least one plan row is required"))]
    pub rows: Vec<PlanRowDto>,
}

// -----------------------------------------------------------------------------
// Passes
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct IssuePassRequest {
    pub product_id: Uuid,
    pub user_id: Uuid,

    /// Amount already collected at issue time. Defaults to zero, which
    /// issues the pass as `partial` when partial payments are enabled.
    #[serde(default)]
    pub amount_paid: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct ListPassesQuery {
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub partial_payments_only: bool,
    pub status: Option<PassStatus>,
    #[serde(default = "default_page_size")]
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ListPassesResponse {
    pub passes: Vec<BoardingPass>,
    pub total_count: i64,
    pub next_page_token: Option<Uuid>,
}

/// Realize one plan row as a payment on a pass.
#[derive(Debug, Deserialize)]
pub struct AddInstallmentRequest {
    pub installment_id: Uuid,
}

/// Realized rows plus the plan rows still open for this pass.
#[derive(Debug, Serialize)]
pub struct PassInstallmentsResponse {
    pub realized: Vec<PassInstallment>,
    pub available: Vec<ProductInstallment>,
}

/// Pass state after an add/remove reconciliation.
#[derive(Debug, Serialize)]
pub struct ReconciledPassResponse {
    pub pass: BoardingPass,
    pub realized: Vec<PassInstallment>,
}
