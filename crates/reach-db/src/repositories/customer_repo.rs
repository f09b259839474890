//! Customer directory implementation
//!
//! Interprets the typed predicate AST into parameterized SQL with
//! `QueryBuilder`, so audience queries never interpolate caller input into
//! the query text. The SQL interpretation must agree with
//! `Predicate::matches`; the resolver tests pin the in-memory side.

use reach_core::{
    models::{Predicate, Recipient},
    traits::CustomerDirectory,
    AppError, AppResult,
};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of CustomerDirectory
pub struct PgCustomerDirectory {
    pool: PgPool,
}

impl PgCustomerDirectory {
    /// Create a new customer directory
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append the SQL form of a predicate to the builder.
    ///
    /// `And([])` renders TRUE and `Or([])` FALSE, matching the in-memory
    /// interpreter.
    fn push_predicate(builder: &mut QueryBuilder<'_, Postgres>, predicate: &Predicate) {
        match predicate {
            Predicate::HasPhone => {
                builder.push("(phone IS NOT NULL AND phone <> '')");
            }
            Predicate::GenderIs(gender) => {
                builder.push("gender = ");
                builder.push_bind(gender.to_string());
            }
            Predicate::BirthYearBetween(min, max) => {
                builder.push("birth_year BETWEEN ");
                builder.push_bind(*min);
                builder.push(" AND ");
                builder.push_bind(*max);
            }
            Predicate::VisitCountAtLeast(n) => {
                builder.push("visit_count >= ");
                builder.push_bind(*n);
            }
            Predicate::CreatedWithinDays(days) => {
                builder.push("created_at >= NOW() - make_interval(days => ");
                builder.push_bind(*days as i32);
                builder.push(")");
            }
            Predicate::ProvinceIs(province) => {
                builder.push("region_province = ");
                builder.push_bind(province.clone());
            }
            Predicate::DistrictIn(province, districts) => {
                builder.push("(region_province = ");
                builder.push_bind(province.clone());
                builder.push(" AND region_district = ANY(");
                builder.push_bind(districts.clone());
                builder.push("))");
            }
            Predicate::IdIn(ids) => {
                builder.push("id = ANY(");
                builder.push_bind(ids.clone());
                builder.push(")");
            }
            Predicate::And(children) => {
                if children.is_empty() {
                    builder.push("TRUE");
                    return;
                }
                builder.push("(");
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        builder.push(" AND ");
                    }
                    Self::push_predicate(builder, child);
                }
                builder.push(")");
            }
            Predicate::Or(children) => {
                if children.is_empty() {
                    builder.push("FALSE");
                    return;
                }
                builder.push("(");
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        builder.push(" OR ");
                    }
                    Self::push_predicate(builder, child);
                }
                builder.push(")");
            }
        }
    }

    fn scoped_builder<'a>(
        select: &str,
        store_ids: &[Uuid],
        predicate: &Predicate,
    ) -> QueryBuilder<'a, Postgres> {
        let mut builder = QueryBuilder::new(select);
        builder.push(" FROM customers WHERE store_id = ANY(");
        builder.push_bind(store_ids.to_vec());
        builder.push(") AND ");
        Self::push_predicate(&mut builder, predicate);
        builder
    }
}

#[async_trait]
impl CustomerDirectory for PgCustomerDirectory {
    #[instrument(skip(self, predicate))]
    async fn find_recipients(
        &self,
        store_ids: &[Uuid],
        predicate: &Predicate,
    ) -> AppResult<Vec<Recipient>> {
        debug!("Resolving recipients across {} stores", store_ids.len());

        let mut builder = Self::scoped_builder("SELECT id, phone, name", store_ids, predicate);
        builder.push(" ORDER BY created_at");

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error resolving recipients: {}", e);
                AppError::Database(format!("Failed to resolve recipients: {}", e))
            })?;

        let mut recipients = Vec::with_capacity(rows.len());
        for row in rows {
            let phone: Option<String> = row.try_get("phone").map_err(map_row_err)?;
            let Some(phone) = phone else { continue };
            recipients.push(Recipient {
                customer_id: row.try_get("id").map_err(map_row_err)?,
                phone,
                name: row.try_get("name").map_err(map_row_err)?,
            });
        }

        Ok(recipients)
    }

    #[instrument(skip(self, predicate))]
    async fn count_matching(&self, store_ids: &[Uuid], predicate: &Predicate) -> AppResult<i64> {
        let mut builder = Self::scoped_builder("SELECT COUNT(*) AS n", store_ids, predicate);

        let row = builder.build().fetch_one(&self.pool).await.map_err(|e| {
            error!("Database error counting recipients: {}", e);
            AppError::Database(format!("Failed to count recipients: {}", e))
        })?;

        row.try_get("n").map_err(map_row_err)
    }
}

fn map_row_err(e: sqlx::Error) -> AppError {
    AppError::Database(format!("Failed to read customer row: {}", e))
}
