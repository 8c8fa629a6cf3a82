//! LLM pricing rows used for cost attribution. Rates are per million
//! tokens and carry an effective window.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PricingRecord {
    pub id: i64,
    pub provider: String,
    pub model: String,
    pub input_cost_per_mtok: Decimal,
    pub output_cost_per_mtok: Decimal,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>
}

pub struct PricingStore {
    pool: PgPool
}

impl PricingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        provider: &str,
        model: &str,
        input_cost_per_mtok: Decimal,
        output_cost_per_mtok: Decimal,
        effective_from: NaiveDate,
        effective_to: Option<NaiveDate>
    ) -> Result<PricingRecord, sqlx::Error> {
        sqlx::query_as(
            "INSERT INTO obs_llm_pricing (
                provider, model, input_cost_per_mtok, output_cost_per_mtok,
                effective_from, effective_to
            ) VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *"
        )
        .bind(provider)
        .bind(model)
        .bind(input_cost_per_mtok)
        .bind(output_cost_per_mtok)
        .bind(effective_from)
        .bind(effective_to)
        .fetch_one(&self.pool)
        .await
    }

    /// Rows effective on the given date.
    pub async fn active_on(&self, date: NaiveDate) -> Result<Vec<PricingRecord>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM obs_llm_pricing
             WHERE effective_from <= $1
               AND (effective_to IS NULL OR effective_to >= $1)"
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await
    }
}
