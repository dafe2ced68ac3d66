//! Persistence collaborator for safety records.
//!
//! Routes depend on [`SafetyStore`] rather than a pool so the HTTP layer can
//! be exercised without a database. [`PgStore`] is the production backend.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::{Alert, Anomaly, CheckIn};

// ---

#[async_trait]
pub trait SafetyStore: Send + Sync {
    async fn insert_anomaly(&self, anomaly: &Anomaly) -> Result<()>;
    async fn insert_checkin(&self, checkin: &CheckIn) -> Result<()>;
    async fn insert_alert(&self, alert: &Alert) -> Result<()>;
}

/// Postgres-backed store. Tables come from [`crate::schema::create_schema`].
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SafetyStore for PgStore {
    async fn insert_anomaly(&self, anomaly: &Anomaly) -> Result<()> {
        // ---
        let details = serde_json::to_string(&anomaly.details)?;

        sqlx::query(
            r#"
            INSERT INTO anomalies (id, hike_id, ts, type, score, details)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(anomaly.id)
        .bind(&anomaly.hike_id)
        .bind(anomaly.ts)
        .bind(anomaly.kind.as_str())
        .bind(anomaly.score)
        .bind(details)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_checkin(&self, checkin: &CheckIn) -> Result<()> {
        // ---
        sqlx::query(
            r#"
            INSERT INTO checkins (id, hike_id, ts, result)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(checkin.id)
        .bind(&checkin.hike_id)
        .bind(checkin.ts)
        .bind(checkin.result.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_alert(&self, alert: &Alert) -> Result<()> {
        // ---
        sqlx::query(
            r#"
            INSERT INTO alerts (id, hike_id, ts, trigger_kind, message, queued, failed)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(alert.id)
        .bind(&alert.hike_id)
        .bind(alert.ts)
        .bind(alert.trigger.as_str())
        .bind(&alert.message)
        .bind(alert.queued)
        .bind(alert.failed)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
