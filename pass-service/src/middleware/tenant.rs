//! Tenant context extractor for multi-tenancy support.
//!
//! Extracts the operating tenant (and optionally the acting back-office user)
//! from request headers. These headers are set by the admin BFF after
//! authenticating the operator and validating their tenant membership.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

/// Tenant context extracted from request headers.
#[derive(Debug, Clone)]
pub struct TenantContext {
    /// Transit operator this request acts on behalf of.
    pub tenant_id: Uuid,
    /// Back-office user making the request, when the BFF forwards it.
    pub user_id: Option<Uuid>,
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id = parts
            .headers
            .get("X-Tenant-ID")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!(
                    "Missing X-Tenant-ID header (required from BFF)"
                ))
            })
            .and_then(|raw| {
                Uuid::parse_str(raw).map_err(|_| {
                    AppError::Unauthorized(anyhow::anyhow!("X-Tenant-ID is not a valid UUID"))
                })
            })?;

        let user_id = parts
            .headers
            .get("X-User-ID")
            .and_then(|v| v.to_str().ok())
            .and_then(|raw| Uuid::parse_str(raw).ok());

        let span = tracing::Span::current();
        span.record("tenant_id", tenant_id.to_string());
        if let Some(uid) = user_id {
            span.record("user_id", uid.to_string());
        }

        Ok(TenantContext { tenant_id, user_id })
    }
}
