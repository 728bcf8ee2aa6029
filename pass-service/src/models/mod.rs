//! Domain models for pass-service.

mod installment;
mod pass;
mod product;

pub use installment::{CreatePassInstallment, PassInstallment, ProductInstallment};
pub use pass::{BoardingPass, CreateBoardingPass, ListPassesFilter, PassStatus};
pub use product::{CreateProduct, ListProductsFilter, Product, UpdateProduct};
