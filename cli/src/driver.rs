//! PostgreSQL adapter over a single sqlx connection.

use relq_core::adapter::{Adapter, NO_TRANSACTIONAL_DDL};
use relq_core::config::Connection;
use relq_core::dialect::Dialect;
use relq_core::migration::{AppliedMigration, select_migrations_sql};
use relq_core::schema::Schema;
use relq_core::{RelqError, Result};
use sqlx::{Connection as _, PgConnection, Row};
use tracing::debug;
use url::Url;

use crate::introspection;

pub struct PgAdapter {
    conn: PgConnection,
    dialect: Dialect,
    database: Option<String>,
    /// Bookkeeping tables left out of introspection.
    hidden: Vec<String>,
}

fn db_error(e: sqlx::Error) -> RelqError {
    match e {
        sqlx::Error::Database(db) => RelqError::Database(db.message().to_string()),
        other => RelqError::Database(other.to_string()),
    }
}

/// Database name from the URL path.
fn database_name(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    let name = url.path().trim_start_matches('/');
    (!name.is_empty()).then(|| name.to_string())
}

impl PgAdapter {
    /// Connect to a PostgreSQL-compatible database.
    pub async fn connect(connection: &Connection, hidden: Vec<String>) -> Result<Self> {
        if !connection.dialect.family().speaks_postgres() {
            return Err(RelqError::Config(format!(
                "relq connects to PostgreSQL-compatible databases only; {} is supported by `validate`",
                connection.dialect
            )));
        }
        let conn = PgConnection::connect(&connection.url).await.map_err(|e| {
            RelqError::Database(format!("cannot connect to {}: {e}", connection.redacted()))
        })?;
        debug!(dialect = %connection.dialect, source = %connection.source, "connected");
        Ok(PgAdapter {
            conn,
            dialect: connection.dialect,
            database: database_name(&connection.url),
            hidden,
        })
    }

    pub async fn close(self) {
        if let Err(e) = self.conn.close().await {
            debug!(error = %e, "connection did not close cleanly");
        }
    }

    async fn table_exists(&mut self, table: &str) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1)",
        )
        .bind(table)
        .fetch_one(&mut self.conn)
        .await
        .map_err(db_error)
    }
}

impl Adapter for PgAdapter {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn database(&self) -> Option<String> {
        self.database.clone()
    }

    async fn introspect(&mut self) -> Result<Schema> {
        introspection::introspect(&mut self.conn, &self.hidden).await
    }

    async fn begin(&mut self) -> Result<()> {
        match sqlx::raw_sql("BEGIN").execute(&mut self.conn).await {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some("0A000") => {
                Err(RelqError::Database(format!("{NO_TRANSACTIONAL_DDL}: {}", db.message())))
            }
            Err(e) => Err(db_error(e)),
        }
    }

    async fn commit(&mut self) -> Result<()> {
        sqlx::raw_sql("COMMIT")
            .execute(&mut self.conn)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        sqlx::raw_sql("ROLLBACK")
            .execute(&mut self.conn)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        debug!(sql, "execute");
        sqlx::raw_sql(sql)
            .execute(&mut self.conn)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn applied_migrations(&mut self, table: &str) -> Result<Vec<AppliedMigration>> {
        if !self.table_exists(table).await? {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&select_migrations_sql(table))
            .fetch_all(&mut self.conn)
            .await
            .map_err(db_error)?;
        rows.iter()
            .map(|row| {
                Ok(AppliedMigration {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    filename: row.try_get("filename")?,
                    hash: row.try_get("hash")?,
                    batch: row.try_get("batch")?,
                    applied_at: row.try_get("applied_at")?,
                    execution_time_ms: row.try_get("execution_time_ms")?,
                    sql_up: row.try_get("sql_up")?,
                    sql_down: row.try_get("sql_down")?,
                    source: row.try_get("source")?,
                })
            })
            .collect::<std::result::Result<_, sqlx::Error>>()
            .map_err(db_error)
    }
}
