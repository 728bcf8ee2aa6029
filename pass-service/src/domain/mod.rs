//! Pure domain logic for pass-service.

pub mod installments;
