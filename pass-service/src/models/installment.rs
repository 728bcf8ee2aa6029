//! Installment models for pass-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A persisted plan row on a product.
///
/// Plan rows are replaced wholesale when staff saves a plan; they carry
/// optional dates because a plan can be drafted before its window is chosen.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProductInstallment {
    pub installment_id: Uuid,
    pub product_id: Uuid,
    pub sequence_number: i32,
    pub starts_on: Option<NaiveDate>,
    pub ends_on: Option<NaiveDate>,
    pub amount: Decimal,
    pub active: bool,
    pub created_utc: DateTime<Utc>,
}

/// One realized installment on an issued pass.
///
/// `installment_id` reuses the product-level plan row id. Sequence numbers
/// are unique per pass.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PassInstallment {
    pub installment_id: Uuid,
    pub pass_id: Uuid,
    pub sequence_number: i32,
    pub amount: Decimal,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub active: bool,
    pub created_utc: DateTime<Utc>,
}

/// Input for realizing an installment on a pass.
#[derive(Debug, Clone)]
pub struct CreatePassInstallment {
    pub installment_id: Uuid,
    pub pass_id: Uuid,
    pub sequence_number: i32,
    pub amount: Decimal,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
}
