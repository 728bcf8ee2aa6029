//! Product model for pass-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A purchasable pass definition owned by a tenant.
///
/// When `partial_payments_enabled` is set, the installment window
/// (`installment_valid_from`..`installment_valid_to`) and `installment_count`
/// drive the plan split; the window is distinct from the product validity
/// window.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub product_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub price: Decimal,
    pub active: bool,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
    pub partial_payments_enabled: bool,
    pub installment_count: Option<i32>,
    pub installment_valid_from: Option<NaiveDate>,
    pub installment_valid_to: Option<NaiveDate>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating a product.
#[derive(Debug, Clone)]
pub struct CreateProduct {
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub price: Decimal,
    pub active: bool,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
    pub partial_payments_enabled: bool,
    pub installment_count: Option<i32>,
    pub installment_valid_from: Option<NaiveDate>,
    pub installment_valid_to: Option<NaiveDate>,
}

/// Input for updating a product. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<Decimal>,
    pub active: Option<bool>,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
    pub partial_payments_enabled: Option<bool>,
    pub installment_count: Option<i32>,
    pub installment_valid_from: Option<NaiveDate>,
    pub installment_valid_to: Option<NaiveDate>,
}

/// Filter parameters for listing products.
#[derive(Debug, Clone, Default)]
pub struct ListProductsFilter {
    pub active_only: bool,
    pub category: Option<String>,
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}
