//! Database service for pass-service.

use crate::domain::installments::{self, InstallmentRow};
use crate::models::{
    BoardingPass, CreateBoardingPass, CreatePassInstallment, CreateProduct, ListPassesFilter,
    ListProductsFilter, PassInstallment, Product, ProductInstallment, UpdateProduct,
};
use crate::services::metrics::{DB_QUERY_DURATION, ERRORS_TOTAL};
use chrono::NaiveDate;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

fn db_error(context: &str, e: impl std::fmt::Display) -> AppError {
    ERRORS_TOTAL.with_label_values(&["db_error"]).inc();
    AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e))
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "pass-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| db_error("Failed to connect", e))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Health check failed", e))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| db_error("Migration failed", e))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Product Operations
    // -------------------------------------------------------------------------

    /// Create a new product.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id))]
    pub async fn create_product(&self, input: &CreateProduct) -> Result<Product, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_product"])
            .start_timer();

        let product_id = Uuid::new_v4();
        let product = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (
                product_id, tenant_id, name, description, category, price, active,
                valid_from, valid_to, partial_payments_enabled, installment_count,
                installment_valid_from, installment_valid_to
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING product_id, tenant_id, name, description, category, price, active,
                valid_from, valid_to, partial_payments_enabled, installment_count,
                installment_valid_from, installment_valid_to, created_utc, updated_utc
            "#,
        )
        .bind(product_id)
        .bind(input.tenant_id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.category)
        .bind(input.price)
        .bind(input.active)
        .bind(input.valid_from)
        .bind(input.valid_to)
        .bind(input.partial_payments_enabled)
        .bind(input.installment_count)
        .bind(input.installment_valid_from)
        .bind(input.installment_valid_to)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to create product", e))?;

        timer.observe_duration();

        info!(product_id = %product.product_id, name = %product.name, "Product created");

        Ok(product)
    }

    /// Get a product by ID.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, product_id = %product_id))]
    pub async fn get_product(
        &self,
        tenant_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<Product>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_product"])
            .start_timer();

        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT product_id, tenant_id, name, description, category, price, active,
                valid_from, valid_to, partial_payments_enabled, installment_count,
                installment_valid_from, installment_valid_to, created_utc, updated_utc
            FROM products
            WHERE tenant_id = $1 AND product_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get product", e))?;

        timer.observe_duration();

        Ok(product)
    }

    /// List products for a tenant.
    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id))]
    pub async fn list_products(
        &self,
        tenant_id: Uuid,
        filter: &ListProductsFilter,
    ) -> Result<Vec<Product>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_products"])
            .start_timer();

        let limit = filter.page_size.clamp(1, 100) as i64;
        let cursor = filter.page_token.unwrap_or(Uuid::nil());

        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT product_id, tenant_id, name, description, category, price, active,
                valid_from, valid_to, partial_payments_enabled, installment_count,
                installment_valid_from, installment_valid_to, created_utc, updated_utc
            FROM products
            WHERE tenant_id = $1
              AND ($2::bool = FALSE OR active = TRUE)
              AND ($3::varchar IS NULL OR category = $3)
              AND product_id > $4
            ORDER BY product_id
            LIMIT $5
            "#,
        )
        .bind(tenant_id)
        .bind(filter.active_only)
        .bind(&filter.category)
        .bind(cursor)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list products", e))?;

        timer.observe_duration();

        Ok(products)
    }

    /// Update a product. `None` fields keep their current value.
    #[instrument(skip(self, input), fields(tenant_id = %tenant_id, product_id = %product_id))]
    pub async fn update_product(
        &self,
        tenant_id: Uuid,
        product_id: Uuid,
        input: &UpdateProduct,
    ) -> Result<Option<Product>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_product"])
            .start_timer();

        let product = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products
            SET name = COALESCE($3, name),
                description = COALESCE($4, description),
                category = COALESCE($5, category),
                price = COALESCE($6, price),
                active = COALESCE($7, active),
                valid_from = COALESCE($8, valid_from),
                valid_to = COALESCE($9, valid_to),
                partial_payments_enabled = COALESCE($10, partial_payments_enabled),
                installment_count = COALESCE($11, installment_count),
                installment_valid_from = COALESCE($12, installment_valid_from),
                installment_valid_to = COALESCE($13, installment_valid_to),
                updated_utc = NOW()
            WHERE tenant_id = $1 AND product_id = $2
            RETURNING product_id, tenant_id, name, description, category, price, active,
                valid_from, valid_to, partial_payments_enabled, installment_count,
                installment_valid_from, installment_valid_to, created_utc, updated_utc
            "#,
        )
        .bind(tenant_id)
        .bind(product_id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.category)
        .bind(input.price)
        .bind(input.active)
        .bind(input.valid_from)
        .bind(input.valid_to)
        .bind(input.partial_payments_enabled)
        .bind(input.installment_count)
        .bind(input.installment_valid_from)
        .bind(input.installment_valid_to)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update product", e))?;

        timer.observe_duration();

        Ok(product)
    }

    // -------------------------------------------------------------------------
    // Product Installment Operations
    // -------------------------------------------------------------------------

    /// Replace a product's persisted plan with the given rows.
    ///
    /// Runs in a transaction so readers never observe a half-replaced plan.
    #[instrument(skip(self, rows), fields(product_id = %product_id, rows = rows.len()))]
    pub async fn replace_product_installments(
        &self,
        product_id: Uuid,
        rows: &[InstallmentRow],
    ) -> Result<Vec<ProductInstallment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["replace_product_installments"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        sqlx::query("DELETE FROM product_installments WHERE product_id = $1")
            .bind(product_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to clear plan rows", e))?;

        let mut saved = Vec::with_capacity(rows.len());
        for row in rows {
            let installment = sqlx::query_as::<_, ProductInstallment>(
                r#"
                INSERT INTO product_installments (
                    installment_id, product_id, sequence_number, starts_on, ends_on, amount, active
                )
                VALUES ($1, $2, $3, $4, $5, $6, TRUE)
                RETURNING installment_id, product_id, sequence_number, starts_on, ends_on,
                    amount, active, created_utc
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(product_id)
            .bind(row.sequence_number)
            .bind(row.starts_on)
            .bind(row.ends_on)
            .bind(row.amount)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to insert plan row", e))?;
            saved.push(installment);
        }

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit plan replacement", e))?;

        timer.observe_duration();

        info!(product_id = %product_id, rows = saved.len(), "Installment plan replaced");

        Ok(saved)
    }

    /// List a product's plan rows in sequence order.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn list_product_installments(
        &self,
        product_id: Uuid,
    ) -> Result<Vec<ProductInstallment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_product_installments"])
            .start_timer();

        let installments = sqlx::query_as::<_, ProductInstallment>(
            r#"
            SELECT installment_id, product_id, sequence_number, starts_on, ends_on,
                amount, active, created_utc
            FROM product_installments
            WHERE product_id = $1
            ORDER BY sequence_number
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list plan rows", e))?;

        timer.observe_duration();

        Ok(installments)
    }

    // -------------------------------------------------------------------------
    // Boarding Pass Operations
    // -------------------------------------------------------------------------

    /// Issue a new boarding pass.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, user_id = %input.user_id))]
    pub async fn create_pass(&self, input: &CreateBoardingPass) -> Result<BoardingPass, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_pass"])
            .start_timer();

        let pass_id = Uuid::new_v4();
        let pass = sqlx::query_as::<_, BoardingPass>(
            r#"
            INSERT INTO boarding_passes (
                pass_id, tenant_id, user_id, product_id, status, amount, amount_paid,
                partial_payment_total, valid_from, valid_to, partial_payments_enabled
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $8, $9, $10)
            RETURNING pass_id, tenant_id, user_id, product_id, status, amount, amount_paid,
                partial_payment_total, valid_from, valid_to, partial_payments_enabled,
                active_installment_id, created_utc, updated_utc
            "#,
        )
        .bind(pass_id)
        .bind(input.tenant_id)
        .bind(input.user_id)
        .bind(input.product_id)
        .bind(input.status.as_str())
        .bind(input.amount)
        .bind(input.amount_paid)
        .bind(input.valid_from)
        .bind(input.valid_to)
        .bind(input.partial_payments_enabled)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to create pass", e))?;

        timer.observe_duration();

        info!(pass_id = %pass.pass_id, "Boarding pass issued");

        Ok(pass)
    }

    /// Get a pass by ID.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, pass_id = %pass_id))]
    pub async fn get_pass(
        &self,
        tenant_id: Uuid,
        pass_id: Uuid,
    ) -> Result<Option<BoardingPass>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_pass"])
            .start_timer();

        let pass = sqlx::query_as::<_, BoardingPass>(
            r#"
            SELECT pass_id, tenant_id, user_id, product_id, status, amount, amount_paid,
                partial_payment_total, valid_from, valid_to, partial_payments_enabled,
                active_installment_id, created_utc, updated_utc
            FROM boarding_passes
            WHERE tenant_id = $1 AND pass_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(pass_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get pass", e))?;

        timer.observe_duration();

        Ok(pass)
    }

    /// List passes for a tenant with a total count for pagination.
    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id))]
    pub async fn list_passes(
        &self,
        tenant_id: Uuid,
        filter: &ListPassesFilter,
    ) -> Result<(Vec<BoardingPass>, i64), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_passes"])
            .start_timer();

        let limit = filter.page_size.clamp(1, 100) as i64;
        let cursor = filter.page_token.unwrap_or(Uuid::nil());
        let status_str = filter.status.map(|s| s.as_str().to_string());

        let total_count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM boarding_passes
            WHERE tenant_id = $1
              AND ($2::uuid IS NULL OR user_id = $2)
              AND ($3::bool = FALSE OR partial_payments_enabled = TRUE)
              AND ($4::varchar IS NULL OR status = $4)
            "#,
        )
        .bind(tenant_id)
        .bind(filter.user_id)
        .bind(filter.partial_payments_only)
        .bind(&status_str)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to count passes", e))?;

        let passes = sqlx::query_as::<_, BoardingPass>(
            r#"
            SELECT pass_id, tenant_id, user_id, product_id, status, amount, amount_paid,
                partial_payment_total, valid_from, valid_to, partial_payments_enabled,
                active_installment_id, created_utc, updated_utc
            FROM boarding_passes
            WHERE tenant_id = $1
              AND ($2::uuid IS NULL OR user_id = $2)
              AND ($3::bool = FALSE OR partial_payments_enabled = TRUE)
              AND ($4::varchar IS NULL OR status = $4)
              AND pass_id > $5
            ORDER BY pass_id
            LIMIT $6
            "#,
        )
        .bind(tenant_id)
        .bind(filter.user_id)
        .bind(filter.partial_payments_only)
        .bind(&status_str)
        .bind(cursor)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list passes", e))?;

        timer.observe_duration();

        Ok((passes, total_count))
    }

    // -------------------------------------------------------------------------
    // Pass Installment Workflows
    // -------------------------------------------------------------------------

    /// Realize a plan row on a pass and reconcile the pass totals, in one
    /// transaction.
    ///
    /// The pass row is locked with `SELECT ... FOR UPDATE` so concurrent
    /// workflows serialize on it: each reconciliation starts from the state
    /// the previous one committed, and a failed totals write rolls the
    /// installment insert back with it. The per-pass unique index on the
    /// sequence number backs up the availability check: realizing the same
    /// row twice is a conflict.
    #[instrument(
        skip(self, input),
        fields(tenant_id = %tenant_id, pass_id = %input.pass_id, sequence = input.sequence_number)
    )]
    pub async fn add_pass_installment(
        &self,
        tenant_id: Uuid,
        input: &CreatePassInstallment,
    ) -> Result<(BoardingPass, PassInstallment), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["add_pass_installment"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let pass = Self::lock_pass(&mut tx, tenant_id, input.pass_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Pass not found")))?;

        let installment = sqlx::query_as::<_, PassInstallment>(
            r#"
            INSERT INTO pass_installments (
                installment_id, pass_id, sequence_number, amount, starts_on, ends_on, active
            )
            VALUES ($1, $2, $3, $4, $5, $6, TRUE)
            RETURNING installment_id, pass_id, sequence_number, amount, starts_on, ends_on,
                active, created_utc
            "#,
        )
        .bind(input.installment_id)
        .bind(input.pass_id)
        .bind(input.sequence_number)
        .bind(input.amount)
        .bind(input.starts_on)
        .bind(input.ends_on)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Installment {} is already realized on this pass",
                    input.sequence_number
                ))
            }
            _ => db_error("Failed to insert installment", e),
        })?;

        let reconciled = installments::reconcile_after_add(&pass, &installment);
        let updated = Self::write_pass_totals(&mut tx, &reconciled).await?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit installment add", e))?;

        timer.observe_duration();

        info!(
            pass_id = %installment.pass_id,
            sequence = installment.sequence_number,
            "Installment realized"
        );

        Ok((updated, installment))
    }

    /// Remove a realized installment and roll its effect on the pass back,
    /// in one transaction with the pass row locked.
    ///
    /// `baseline_valid_to` is the validity to fall back to when no active
    /// installments remain; `None` clears it. Returns the reconciled pass,
    /// the removed row and the rows still realized.
    #[instrument(
        skip(self),
        fields(tenant_id = %tenant_id, pass_id = %pass_id, installment_id = %installment_id)
    )]
    pub async fn remove_pass_installment(
        &self,
        tenant_id: Uuid,
        pass_id: Uuid,
        installment_id: Uuid,
        baseline_valid_to: Option<NaiveDate>,
    ) -> Result<(BoardingPass, PassInstallment, Vec<PassInstallment>), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["remove_pass_installment"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let pass = Self::lock_pass(&mut tx, tenant_id, pass_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Pass not found")))?;

        let realized = sqlx::query_as::<_, PassInstallment>(
            r#"
            SELECT installment_id, pass_id, sequence_number, amount, starts_on, ends_on,
                active, created_utc
            FROM pass_installments
            WHERE pass_id = $1
            ORDER BY sequence_number
            "#,
        )
        .bind(pass_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to list installments", e))?;

        let removed = sqlx::query_as::<_, PassInstallment>(
            r#"
            DELETE FROM pass_installments
            WHERE pass_id = $1 AND installment_id = $2
            RETURNING installment_id, pass_id, sequence_number, amount, starts_on, ends_on,
                active, created_utc
            "#,
        )
        .bind(pass_id)
        .bind(installment_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to delete installment", e))?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Installment not realized on this pass"))
        })?;

        let reconciled =
            installments::reconcile_after_remove(&pass, &realized, &removed, baseline_valid_to);
        let updated = Self::write_pass_totals(&mut tx, &reconciled).await?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit installment removal", e))?;

        timer.observe_duration();

        info!(
            pass_id = %removed.pass_id,
            sequence = removed.sequence_number,
            "Installment removed"
        );

        let remaining = realized
            .into_iter()
            .filter(|i| i.installment_id != removed.installment_id)
            .collect();

        Ok((updated, removed, remaining))
    }

    /// Load a pass inside a transaction, locking its row against concurrent
    /// reconciliations.
    async fn lock_pass(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        tenant_id: Uuid,
        pass_id: Uuid,
    ) -> Result<Option<BoardingPass>, AppError> {
        sqlx::query_as::<_, BoardingPass>(
            r#"
            SELECT pass_id, tenant_id, user_id, product_id, status, amount, amount_paid,
                partial_payment_total, valid_from, valid_to, partial_payments_enabled,
                active_installment_id, created_utc, updated_utc
            FROM boarding_passes
            WHERE tenant_id = $1 AND pass_id = $2
            FOR UPDATE
            "#,
        )
        .bind(tenant_id)
        .bind(pass_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| db_error("Failed to lock pass", e))
    }

    /// Write the reconciled monetary fields and validity of a pass within
    /// the surrounding transaction.
    async fn write_pass_totals(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        pass: &BoardingPass,
    ) -> Result<BoardingPass, AppError> {
        sqlx::query_as::<_, BoardingPass>(
            r#"
            UPDATE boarding_passes
            SET amount = $3,
                amount_paid = $4,
                partial_payment_total = $5,
                valid_to = $6,
                active_installment_id = $7,
                status = $8,
                updated_utc = NOW()
            WHERE tenant_id = $1 AND pass_id = $2
            RETURNING pass_id, tenant_id, user_id, product_id, status, amount, amount_paid,
                partial_payment_total, valid_from, valid_to, partial_payments_enabled,
                active_installment_id, created_utc, updated_utc
            "#,
        )
        .bind(pass.tenant_id)
        .bind(pass.pass_id)
        .bind(pass.amount)
        .bind(pass.amount_paid)
        .bind(pass.partial_payment_total)
        .bind(pass.valid_to)
        .bind(pass.active_installment_id)
        .bind(&pass.status)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| db_error("Failed to update pass", e))
    }

    /// List the realized installments on a pass in sequence order.
    #[instrument(skip(self), fields(pass_id = %pass_id))]
    pub async fn list_pass_installments(
        &self,
        pass_id: Uuid,
    ) -> Result<Vec<PassInstallment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_pass_installments"])
            .start_timer();

        let installments = sqlx::query_as::<_, PassInstallment>(
            r#"
            SELECT installment_id, pass_id, sequence_number, amount, starts_on, ends_on,
                active, created_utc
            FROM pass_installments
            WHERE pass_id = $1
            ORDER BY sequence_number
            "#,
        )
        .bind(pass_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list installments", e))?;

        timer.observe_duration();

        Ok(installments)
    }
}
