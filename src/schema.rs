//! Database schema management for `trailsafe-safety`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the `anomalies`, `checkins` and `alerts` tables the safety routes
/// write to. Safe to call on every startup; no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // Triggered verdicts from `/api/safety/analyze`
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS anomalies (
            id       UUID PRIMARY KEY,
            hike_id  TEXT             NOT NULL,
            ts       TIMESTAMPTZ      NOT NULL,
            type     TEXT             NOT NULL,
            score    DOUBLE PRECISION NOT NULL,
            details  TEXT             NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Check-in results from `/api/safety/checkin`
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS checkins (
            id       UUID PRIMARY KEY,
            hike_id  TEXT        NOT NULL,
            ts       TIMESTAMPTZ NOT NULL,
            result   TEXT        NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Escalations and their delivery tallies
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alerts (
            id       UUID PRIMARY KEY,
            hike_id  TEXT,
            ts       TIMESTAMPTZ NOT NULL,
            trigger_kind TEXT    NOT NULL,
            message  TEXT        NOT NULL,
            queued   INTEGER     NOT NULL,
            failed   INTEGER     NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Dashboard lookups are always per hike
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_anomalies_hike_id
            ON anomalies (hike_id, ts);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_checkins_hike_id
            ON checkins (hike_id, ts);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_alerts_hike_id
            ON alerts (hike_id, ts);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
