//! Storage layer: connection bootstrap, embedded migrations, and the
//! tenant-scoped transaction handle every query runs under.
//!
//! All SQL for the booking core lives in this crate (`slots`, `claims`,
//! `outbox`, `audit`). Callers never see a bare connection for tenant-owned
//! tables: reads and writes go through [`TenantTx`], which stamps the
//! per-transaction tenant identity that the row-level-security policies
//! check.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

pub mod audit;
pub mod claims;
pub mod outbox;
pub mod slots;

pub use audit::{ActorContext, AuditRow};
pub use claims::ClaimRow;
pub use outbox::{OutboxEventRow, OutboxStatus};
pub use slots::{AlternativeRow, SlotDetailRow, SlotRow};

pub const ENV_DB_URL: &str = "FCFS_DATABASE_URL";

/// Connect to Postgres using FCFS_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='job_slots'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_job_slots_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_job_slots_table: bool,
}

/// True when `err` is a constraint violation naming `constraint`. Postgres
/// reports the violated constraint's name directly, so no SQLSTATE matching
/// is needed on top.
pub fn is_unique_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    err.as_database_error()
        .and_then(|db_err| db_err.constraint())
        == Some(constraint)
}

// ---------------------------------------------------------------------------
// TenantTx
// ---------------------------------------------------------------------------

/// A database transaction bound to one tenant.
///
/// `begin` opens the transaction and runs `set_config('app.tenant_id', …,
/// true)` — the SET LOCAL form — so the row-level-security policies restrict
/// every statement on this connection to the tenant's rows. The tenant id
/// travels with the handle; queries that mutate tenant-owned rows bind it
/// again in their WHERE clauses.
///
/// Commit is explicit. On every other exit path (error return, panic, task
/// cancellation) the inner sqlx transaction rolls back when the handle drops,
/// so a request can never leave partial work behind.
pub struct TenantTx {
    tx: Transaction<'static, Postgres>,
    tenant_id: Uuid,
}

impl TenantTx {
    pub async fn begin(pool: &PgPool, tenant_id: Uuid) -> Result<Self> {
        let mut tx = pool.begin().await.context("begin tenant transaction")?;

        sqlx::query("select set_config('app.tenant_id', $1, true)")
            .bind(tenant_id.to_string())
            .execute(&mut *tx)
            .await
            .context("set tenant context")?;

        Ok(Self { tx, tenant_id })
    }

    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    /// The underlying connection. Statements issued here run inside the
    /// transaction and under its tenant identity.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut *self.tx
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await.context("commit tenant transaction")
    }

    /// Explicit rollback. Dropping the handle has the same effect; this form
    /// exists for call sites that want the rollback error surfaced.
    pub async fn rollback(self) -> Result<()> {
        self.tx
            .rollback()
            .await
            .context("rollback tenant transaction")
    }
}
