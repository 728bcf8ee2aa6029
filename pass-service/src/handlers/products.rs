//! Product and installment-plan handlers.
//!
//! All operations are scoped to the tenant from the request context. Plan
//! computation is pure; these handlers only load, compute and persist.

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
    domain::installments::{self, InstallmentRow},
    dtos::{
        CreateProductRequest, ListProductsQuery, PlanPreviewRequest, PlanRedistributeRequest,
        PlanResponse, PlanRowDto, ReplacePlanRequest, UpdateProductRequest,
    },
    middleware::TenantContext,
    models::{
        CreateProduct, ListProductsFilter, Product, ProductInstallment, UpdateProduct,
    },
    AppState,
};

impl From<InstallmentRow> for PlanRowDto {
    fn from(row: InstallmentRow) -> Self {
        PlanRowDto {
            sequence_number: row.sequence_number,
            starts_on: row.starts_on,
            ends_on: row.ends_on,
            amount: row.amount,
        }
    }
}

impl From<PlanRowDto> for InstallmentRow {
    fn from(dto: PlanRowDto) -> Self {
        InstallmentRow {
            sequence_number: dto.sequence_number,
            starts_on: dto.starts_on,
            ends_on: dto.ends_on,
            amount: dto.amount,
        }
    }
}

fn plan_response(rows: Vec<InstallmentRow>) -> PlanResponse {
    let total = rows.iter().map(|r| r.amount).sum();
    PlanResponse {
        rows: rows.into_iter().map(PlanRowDto::from).collect(),
        total,
    }
}

/// Create a new product within the tenant's scope.
pub async fn create_product(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    payload.validate()?;

    if payload.price < Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Price cannot be negative"
        )));
    }
    if payload.partial_payments_enabled && payload.installment_count.is_none() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Installment count is required when partial payments are enabled"
        )));
    }

    tracing::info!(
        tenant_id = %tenant.tenant_id,
        name = %payload.name,
        "Creating product"
    );

    let product = state
        .database
        .create_product(&CreateProduct {
            tenant_id: tenant.tenant_id,
            name: payload.name,
            description: payload.description,
            category: payload.category,
            price: payload.price,
            active: payload.active,
            valid_from: payload.valid_from,
            valid_to: payload.valid_to,
            partial_payments_enabled: payload.partial_payments_enabled,
            installment_count: payload.installment_count,
            installment_valid_from: payload.installment_valid_from,
            installment_valid_to: payload.installment_valid_to,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(product)))
}

/// Get a product by ID within the tenant's scope.
pub async fn get_product(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(product_id): Path<Uuid>,
) -> Result<Json<Product>, AppError> {
    let product = state
        .database
        .get_product(tenant.tenant_id, product_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Product not found")))?;

    Ok(Json(product))
}

/// List products for the tenant.
pub async fn list_products(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<ListProductsQuery>,
) -> Result<Json<Vec<Product>>, AppError> {
    let products = state
        .database
        .list_products(
            tenant.tenant_id,
            &ListProductsFilter {
                active_only: query.active_only,
                category: query.category,
                page_size: query.page_size,
                page_token: query.page_token,
            },
        )
        .await?;

    Ok(Json(products))
}

/// Update a product within the tenant's scope.
///
/// A price change here does not touch a persisted plan; staff re-splits
/// explicitly via the redistribute endpoint and then replaces the plan.
pub async fn update_product(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<UpdateProductRequest>,
) -> Result<Json<Product>, AppError> {
    payload.validate()?;

    if payload.price.is_some_and(|p| p < Decimal::ZERO) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Price cannot be negative"
        )));
    }

    tracing::info!(
        tenant_id = %tenant.tenant_id,
        product_id = %product_id,
        "Updating product"
    );

    let product = state
        .database
        .update_product(
            tenant.tenant_id,
            product_id,
            &UpdateProduct {
                name: payload.name,
                description: payload.description,
                category: payload.category,
                price: payload.price,
                active: payload.active,
                valid_from: payload.valid_from,
                valid_to: payload.valid_to,
                partial_payments_enabled: payload.partial_payments_enabled,
                installment_count: payload.installment_count,
                installment_valid_from: payload.installment_valid_from,
                installment_valid_to: payload.installment_valid_to,
            },
        )
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Product not found")))?;

    Ok(Json(product))
}

/// Propose a plan split for a price over a date window.
///
/// Pure computation; nothing is persisted until the plan is saved.
pub async fn preview_plan(
    tenant: TenantContext,
    Json(payload): Json<PlanPreviewRequest>,
) -> Result<Json<PlanResponse>, AppError> {
    payload.validate()?;

    if payload.price < Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Price cannot be negative"
        )));
    }

    tracing::debug!(
        tenant_id = %tenant.tenant_id,
        count = payload.installment_count,
        "Previewing installment plan"
    );

    let rows = installments::allocate(
        payload.price,
        payload.installment_count as u32,
        payload.starts_on,
        payload.ends_on,
    );

    Ok(Json(plan_response(rows)))
}

/// Re-split amounts across existing rows after a price change.
pub async fn redistribute_plan(
    tenant: TenantContext,
    Json(payload): Json<PlanRedistributeRequest>,
) -> Result<Json<PlanResponse>, AppError> {
    payload.validate()?;

    if payload.price < Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Price cannot be negative"
        )));
    }

    tracing::debug!(
        tenant_id = %tenant.tenant_id,
        rows = payload.rows.len(),
        "Redistributing installment plan"
    );

    let rows: Vec<InstallmentRow> = payload.rows.into_iter().map(InstallmentRow::from).collect();
    let resplit = installments::redistribute(&rows, payload.price);

    Ok(Json(plan_response(resplit)))
}

/// Replace a product's persisted plan wholesale.
pub async fn replace_plan(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<ReplacePlanRequest>,
) -> Result<Json<Vec<ProductInstallment>>, AppError> {
    payload.validate()?;

    let product = state
        .database
        .get_product(tenant.tenant_id, product_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Product not found")))?;

    let total: Decimal = payload.rows.iter().map(|r| r.amount).sum();
    if total != product.price {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Plan amounts sum to {} but the product price is {}",
            total,
            product.price
        )));
    }

    let mut sequences: Vec<i32> = payload.rows.iter().map(|r| r.sequence_number).collect();
    sequences.sort_unstable();
    sequences.dedup();
    if sequences.len() != payload.rows.len() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Plan rows contain duplicate sequence numbers"
        )));
    }

    tracing::info!(
        tenant_id = %tenant.tenant_id,
        product_id = %product_id,
        rows = payload.rows.len(),
        "Replacing installment plan"
    );

    let rows: Vec<InstallmentRow> = payload.rows.into_iter().map(InstallmentRow::from).collect();
    let saved = state
        .database
        .replace_product_installments(product_id, &rows)
        .await?;

    Ok(Json(saved))
}

/// List a product's persisted plan rows.
pub async fn list_plan(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(product_id): Path<Uuid>,
) -> Result<Json<Vec<ProductInstallment>>, AppError> {
    state
        .database
        .get_product(tenant.tenant_id, product_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Product not found")))?;

    let rows = state.database.list_product_installments(product_id).await?;

    Ok(Json(rows))
}
