//! Boarding pass and realized-installment handlers.
//!
//! The add/remove workflows run as single database transactions that lock
//! the pass row, reconcile with the pure functions and persist the result,
//! so a failed write never leaves an installment durable with stale totals.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    domain::installments,
    dtos::{
        AddInstallmentRequest, IssuePassRequest, ListPassesQuery, ListPassesResponse,
        PassInstallmentsResponse, ReconciledPassResponse,
    },
    middleware::TenantContext,
    models::{
        BoardingPass, CreateBoardingPass, CreatePassInstallment, ListPassesFilter, PassStatus,
        Product,
    },
    services::metrics::{INSTALLMENTS_TOTAL, PASSES_ISSUED_TOTAL},
    AppState,
};

/// Status and initial owed amount for a pass issued against `product`.
///
/// A fully paid purchase carries the product price. An under-paid purchase
/// is only valid on a product that offers installments; it starts at zero
/// owed and accrues as installments are realized.
fn issue_terms(product: &Product, amount_paid: Decimal) -> Result<(PassStatus, Decimal), AppError> {
    if amount_paid >= product.price {
        Ok((PassStatus::Completed, product.price))
    } else if product.partial_payments_enabled {
        Ok((PassStatus::Partial, Decimal::ZERO))
    } else {
        Err(AppError::BadRequest(anyhow::anyhow!(
            "Product requires full payment at issue"
        )))
    }
}

/// Issue a pass from a product within the tenant's scope.
pub async fn issue_pass(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<IssuePassRequest>,
) -> Result<(StatusCode, Json<BoardingPass>), AppError> {
    payload.validate()?;

    let product = state
        .database
        .get_product(tenant.tenant_id, payload.product_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Product not found")))?;

    if !product.active {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Product is not active"
        )));
    }

    let (status, amount) = issue_terms(&product, payload.amount_paid)?;

    tracing::info!(
        tenant_id = %tenant.tenant_id,
        product_id = %product.product_id,
        user_id = %payload.user_id,
        status = status.as_str(),
        "Issuing boarding pass"
    );

    let pass = state
        .database
        .create_pass(&CreateBoardingPass {
            tenant_id: tenant.tenant_id,
            user_id: payload.user_id,
            product_id: product.product_id,
            status,
            amount,
            amount_paid: payload.amount_paid,
            valid_from: product.valid_from,
            valid_to: product.valid_to,
            partial_payments_enabled: product.partial_payments_enabled,
        })
        .await?;

    PASSES_ISSUED_TOTAL
        .with_label_values(&[status.as_str()])
        .inc();

    Ok((StatusCode::CREATED, Json(pass)))
}

/// List passes for the tenant with a total count.
pub async fn list_passes(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<ListPassesQuery>,
) -> Result<Json<ListPassesResponse>, AppError> {
    let limit = query.page_size.clamp(1, 100);
    let (passes, total_count) = state
        .database
        .list_passes(
            tenant.tenant_id,
            &ListPassesFilter {
                user_id: query.user_id,
                partial_payments_only: query.partial_payments_only,
                status: query.status,
                page_size: query.page_size,
                page_token: query.page_token,
            },
        )
        .await?;

    let next_page_token = if passes.len() as i32 == limit {
        passes.last().map(|p| p.pass_id)
    } else {
        None
    };

    Ok(Json(ListPassesResponse {
        passes,
        total_count,
        next_page_token,
    }))
}

/// Get a pass by ID within the tenant's scope.
pub async fn get_pass(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(pass_id): Path<Uuid>,
) -> Result<Json<BoardingPass>, AppError> {
    let pass = state
        .database
        .get_pass(tenant.tenant_id, pass_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Pass not found")))?;

    Ok(Json(pass))
}

/// List a pass's realized installments together with the plan rows still
/// open for it. Availability is recomputed on every load.
pub async fn list_pass_installments(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(pass_id): Path<Uuid>,
) -> Result<Json<PassInstallmentsResponse>, AppError> {
    let pass = state
        .database
        .get_pass(tenant.tenant_id, pass_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Pass not found")))?;

    let realized = state.database.list_pass_installments(pass.pass_id).await?;
    let plan = state
        .database
        .list_product_installments(pass.product_id)
        .await?;
    let available = installments::available_rows(&plan, &realized);

    Ok(Json(PassInstallmentsResponse {
        realized,
        available,
    }))
}

/// Realize a plan row as a payment on a pass.
pub async fn add_installment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(pass_id): Path<Uuid>,
    Json(payload): Json<AddInstallmentRequest>,
) -> Result<(StatusCode, Json<ReconciledPassResponse>), AppError> {
    let pass = state
        .database
        .get_pass(tenant.tenant_id, pass_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Pass not found")))?;

    if !pass.partial_payments_enabled {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Partial payments are not enabled for this pass"
        )));
    }

    let plan = state
        .database
        .list_product_installments(pass.product_id)
        .await?;
    let row = plan
        .iter()
        .find(|r| r.installment_id == payload.installment_id)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Plan row not found")))?;

    let (starts_on, ends_on) = match (row.starts_on, row.ends_on) {
        (Some(s), Some(e)) => (s, e),
        _ => {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Plan row {} has no date window yet",
                row.sequence_number
            )))
        }
    };

    let realized = state.database.list_pass_installments(pass.pass_id).await?;
    if installments::available_rows(&plan, &realized)
        .iter()
        .all(|r| r.installment_id != row.installment_id)
    {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Installment {} is already realized on this pass",
            row.sequence_number
        )));
    }

    tracing::info!(
        tenant_id = %tenant.tenant_id,
        pass_id = %pass.pass_id,
        sequence = row.sequence_number,
        amount = %row.amount,
        "Adding installment to pass"
    );

    let (updated, installment) = state
        .database
        .add_pass_installment(
            tenant.tenant_id,
            &CreatePassInstallment {
                installment_id: row.installment_id,
                pass_id: pass.pass_id,
                sequence_number: row.sequence_number,
                amount: row.amount,
                starts_on,
                ends_on,
            },
        )
        .await?;

    INSTALLMENTS_TOTAL.with_label_values(&["added"]).inc();

    let mut all = realized;
    all.push(installment);
    all.sort_by_key(|i| i.sequence_number);

    Ok((
        StatusCode::CREATED,
        Json(ReconciledPassResponse {
            pass: updated,
            realized: all,
        }),
    ))
}

/// Remove a realized installment from a pass and roll its effect back.
pub async fn remove_installment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path((pass_id, installment_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ReconciledPassResponse>, AppError> {
    // The admin workflow clears validity when the last installment goes;
    // restoring a pre-partial baseline is a caller decision this API does
    // not make.
    let (updated, removed, remaining) = state
        .database
        .remove_pass_installment(tenant.tenant_id, pass_id, installment_id, None)
        .await?;

    tracing::info!(
        tenant_id = %tenant.tenant_id,
        pass_id = %pass_id,
        sequence = removed.sequence_number,
        amount = %removed.amount,
        "Removed installment from pass"
    );

    INSTALLMENTS_TOTAL.with_label_values(&["removed"]).inc();

    Ok(Json(ReconciledPassResponse {
        pass: updated,
        realized: remaining,
    }))
}
