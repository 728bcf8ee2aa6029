//! Middleware for pass-service.

pub mod tenant;

pub use tenant::TenantContext;
