//! Boarding pass model for pass-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Payment status of an issued pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassStatus {
    Completed,
    Partial,
}

impl PassStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassStatus::Completed => "completed",
            PassStatus::Partial => "partial",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "partial" => PassStatus::Partial,
            _ => PassStatus::Completed,
        }
    }
}

/// An issued instance of a product, owned by a rider.
///
/// `amount` is the total owed, `amount_paid` the total paid to date and
/// `partial_payment_total` the running installment total. `valid_to` is the
/// current effective expiry and moves as installments are added or removed.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BoardingPass {
    pub pass_id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub status: String,
    pub amount: Decimal,
    pub amount_paid: Decimal,
    pub partial_payment_total: Decimal,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
    pub partial_payments_enabled: bool,
    pub active_installment_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for issuing a pass.
#[derive(Debug, Clone)]
pub struct CreateBoardingPass {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub status: PassStatus,
    pub amount: Decimal,
    pub amount_paid: Decimal,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
    pub partial_payments_enabled: bool,
}

/// Filter parameters for listing passes.
#[derive(Debug, Clone, Default)]
pub struct ListPassesFilter {
    pub user_id: Option<Uuid>,
    pub partial_payments_only: bool,
    pub status: Option<PassStatus>,
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_storage_form() {
        for status in [PassStatus::Completed, PassStatus::Partial] {
            assert_eq!(PassStatus::from_string(status.as_str()), status);
        }
    }

    #[test]
    fn unknown_status_defaults_to_completed() {
        assert_eq!(PassStatus::from_string("refunded"), PassStatus::Completed);
    }
}
