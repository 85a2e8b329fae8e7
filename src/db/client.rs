//! Data access facade.
//!
//! `DbClient` exposes query and mutation operations over named connection
//! profiles:
//! - Multi-row, first-row, single-row and scalar queries
//! - Raw forward-only row cursors and multi-result batches
//! - Execute with affected-row counts, standalone or against a transaction
//! - Transactional execution of ordered statement lists and callbacks
//!
//! Every operation resolves a profile, borrows a connection from the
//! profile's pool, delegates to the driver, and releases the connection on
//! every exit path. Transactional operations run on a dedicated connection
//! instead; see [`DbTransaction`].

use crate::db::factory::ConnectionFactory;
use crate::db::params::to_arguments;
use crate::db::statement::Statement;
use crate::db::transaction::DbTransaction;
use crate::error::{DbError, DbResult};
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use sqlx::any::AnyRow;
use sqlx::{Any, Either, FromRow};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Rows buffered between a cursor's drain task and its consumer.
const CURSOR_BUFFER: usize = 64;

/// Data access facade over a shared connection factory.
#[derive(Debug, Clone)]
pub struct DbClient {
    factory: std::sync::Arc<ConnectionFactory>,
}

impl DbClient {
    pub fn new(factory: std::sync::Arc<ConnectionFactory>) -> Self {
        Self { factory }
    }

    /// Create a client whose profiles come from the `COREKIT_DATABASES`
    /// environment variable.
    pub fn from_env() -> Self {
        Self::new(std::sync::Arc::new(ConnectionFactory::from_env()))
    }

    /// The underlying connection factory.
    pub fn factory(&self) -> &ConnectionFactory {
        &self.factory
    }

    /// Run a query and return all mapped rows, possibly none.
    pub async fn query<T>(&self, stmt: &Statement) -> DbResult<Vec<T>>
    where
        T: Send + Unpin + for<'r> FromRow<'r, AnyRow>,
    {
        let pool = self.factory.pool(stmt.profile()).await?;
        let sql = stmt.render();
        debug!(sql = %sql, params = stmt.params.len(), "Executing query");
        let rows = sqlx::query_as_with::<Any, T, _>(sql.as_ref(), to_arguments(&stmt.params)?)
            .fetch_all(&pool)
            .await?;
        Ok(rows)
    }

    /// Run a query and return the first mapped row. Zero rows is an
    /// execution error (`RowNotFound`).
    pub async fn query_first<T>(&self, stmt: &Statement) -> DbResult<T>
    where
        T: Send + Unpin + for<'r> FromRow<'r, AnyRow>,
    {
        let pool = self.factory.pool(stmt.profile()).await?;
        let sql = stmt.render();
        debug!(sql = %sql, params = stmt.params.len(), "Executing query (first)");
        let row = sqlx::query_as_with::<Any, T, _>(sql.as_ref(), to_arguments(&stmt.params)?)
            .fetch_one(&pool)
            .await?;
        Ok(row)
    }

    /// Run a query and return the first mapped row, or `None` on zero rows.
    pub async fn query_first_opt<T>(&self, stmt: &Statement) -> DbResult<Option<T>>
    where
        T: Send + Unpin + for<'r> FromRow<'r, AnyRow>,
    {
        let pool = self.factory.pool(stmt.profile()).await?;
        let sql = stmt.render();
        debug!(sql = %sql, params = stmt.params.len(), "Executing query (first or default)");
        let row = sqlx::query_as_with::<Any, T, _>(sql.as_ref(), to_arguments(&stmt.params)?)
            .fetch_optional(&pool)
            .await?;
        Ok(row)
    }

    /// Run a query that must match exactly one row.
    ///
    /// Zero rows is `RowNotFound`; more than one is `MoreThanOneRow`.
    pub async fn query_single<T>(&self, stmt: &Statement) -> DbResult<T>
    where
        T: Send + Unpin + for<'r> FromRow<'r, AnyRow>,
    {
        match self.query_single_opt(stmt).await? {
            Some(row) => Ok(row),
            None => Err(sqlx::Error::RowNotFound.into()),
        }
    }

    /// Run a query that must match at most one row; `None` on zero rows,
    /// `MoreThanOneRow` on more than one.
    pub async fn query_single_opt<T>(&self, stmt: &Statement) -> DbResult<Option<T>>
    where
        T: Send + Unpin + for<'r> FromRow<'r, AnyRow>,
    {
        let pool = self.factory.pool(stmt.profile()).await?;
        let sql = stmt.render();
        debug!(sql = %sql, params = stmt.params.len(), "Executing query (single)");

        let args = to_arguments(&stmt.params)?;
        let mut stream = sqlx::query_as_with::<Any, T, _>(sql.as_ref(), args).fetch(&pool);
        let Some(first) = stream.next().await else {
            return Ok(None);
        };
        let first = first?;
        match stream.next().await {
            None => Ok(Some(first)),
            Some(Ok(_)) => Err(DbError::MoreThanOneRow),
            Some(Err(err)) => Err(err.into()),
        }
    }

    /// Run a multi-statement batch and return its result sets as a
    /// forward-only grouping, one set per statement in the batch.
    ///
    /// Batches are executed unprepared, so they take no bind parameters.
    pub async fn query_multiple(
        &self,
        sql: impl Into<String>,
        profile: Option<&str>,
    ) -> DbResult<MultiResult> {
        let pool = self.factory.pool(profile).await?;
        let sql = sql.into();
        debug!(sql = %sql, "Executing multi-statement batch");

        let (tx, rx) = mpsc::channel(CURSOR_BUFFER);
        tokio::spawn(async move {
            let mut stream = sqlx::raw_sql(&sql).fetch_many(&pool);
            let mut current: Vec<AnyRow> = Vec::new();
            while let Some(step) = stream.next().await {
                match step {
                    Ok(Either::Right(row)) => current.push(row),
                    Ok(Either::Left(_)) => {
                        if tx.send(Ok(std::mem::take(&mut current))).await.is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(Err(err.into())).await;
                        return;
                    }
                }
            }
            if !current.is_empty() {
                let _ = tx.send(Ok(current)).await;
            }
        });

        Ok(MultiResult { sets: rx })
    }

    /// Run a query and return the first column of the first row, or the
    /// type's default when the query matches no rows.
    pub async fn execute_scalar<T>(&self, stmt: &Statement) -> DbResult<T>
    where
        T: Default + Send + Unpin + sqlx::Type<Any> + for<'r> sqlx::Decode<'r, Any>,
    {
        let pool = self.factory.pool(stmt.profile()).await?;
        let sql = stmt.render();
        debug!(sql = %sql, params = stmt.params.len(), "Executing scalar query");
        let value =
            sqlx::query_scalar_with::<Any, T, _>(sql.as_ref(), to_arguments(&stmt.params)?)
                .fetch_optional(&pool)
                .await?;
        Ok(value.unwrap_or_default())
    }

    /// Run a query and return a raw forward-only row cursor.
    pub async fn execute_reader(&self, stmt: &Statement) -> DbResult<RowReader> {
        let pool = self.factory.pool(stmt.profile()).await?;
        let sql = stmt.render().into_owned();
        let params = stmt.params.clone();
        debug!(sql = %sql, params = params.len(), "Executing reader query");

        let (tx, rx) = mpsc::channel(CURSOR_BUFFER);
        tokio::spawn(async move {
            let args = match to_arguments(&params) {
                Ok(args) => args,
                Err(err) => {
                    let _ = tx.send(Err(err)).await;
                    return;
                }
            };
            let mut stream = sqlx::query_with::<Any, _>(&sql, args).fetch(&pool);
            while let Some(row) = stream.next().await {
                if tx.send(row.map_err(DbError::from)).await.is_err() {
                    // Reader dropped; stop fetching.
                    return;
                }
            }
        });

        Ok(RowReader { rows: rx })
    }

    /// Run a mutation and return the affected-row count.
    pub async fn execute(&self, stmt: &Statement) -> DbResult<u64> {
        let pool = self.factory.pool(stmt.profile()).await?;
        let sql = stmt.render();
        debug!(sql = %sql, params = stmt.params.len(), "Executing write");
        let done = sqlx::query_with::<Any, _>(sql.as_ref(), to_arguments(&stmt.params)?)
            .execute(&pool)
            .await?;
        Ok(done.rows_affected())
    }

    /// Run a mutation against a caller-supplied transaction.
    ///
    /// The connection lifecycle stays with the caller: the statement joins
    /// the open transaction and the handle remains usable afterwards.
    pub async fn execute_in(&self, tx: &mut DbTransaction, stmt: &Statement) -> DbResult<u64> {
        let sql = stmt.render();
        debug!(sql = %sql, params = stmt.params.len(), "Executing write in transaction");
        let done = sqlx::query_with::<Any, _>(sql.as_ref(), to_arguments(&stmt.params)?)
            .execute(tx.connection())
            .await?;
        Ok(done.rows_affected())
    }

    /// Begin a transaction on a dedicated connection from a profile's pool.
    pub async fn begin(&self, profile: Option<&str>) -> DbResult<DbTransaction> {
        let conn = self.factory.acquire(profile).await?;
        DbTransaction::begin(conn.detach()).await
    }

    /// Run an ordered list of statements in one transaction and return the
    /// total affected-row count.
    ///
    /// Statements are applied one at a time against the same transaction.
    /// On the first failure the transaction rolls back, the connection is
    /// torn down, and the original error is returned; nothing is persisted.
    /// Profile selectors on individual statements are ignored; the whole
    /// batch runs on `profile`.
    pub async fn execute_transaction(
        &self,
        profile: Option<&str>,
        statements: &[Statement],
    ) -> DbResult<u64> {
        let mut tx = self.begin(profile).await?;
        let mut affected = 0;
        for stmt in statements {
            match self.execute_in(&mut tx, stmt).await {
                Ok(count) => affected += count,
                Err(err) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!(error = %rollback_err, "Rollback failed after statement error");
                    }
                    return Err(err);
                }
            }
        }
        tx.commit().await?;
        Ok(affected)
    }

    /// Run a caller-supplied unit of work in one transaction.
    ///
    /// The closure receives the open transaction handle; the client owns
    /// begin, commit and rollback around it. On an `Err` return the
    /// transaction rolls back, the connection is torn down, and the
    /// closure's error is returned unchanged.
    pub async fn transaction<R, F>(&self, profile: Option<&str>, work: F) -> DbResult<R>
    where
        F: for<'t> FnOnce(&'t mut DbTransaction) -> BoxFuture<'t, DbResult<R>>,
    {
        let mut tx = self.begin(profile).await?;
        match work(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed after transaction error");
                }
                Err(err)
            }
        }
    }
}

/// Forward-only row cursor backed by a streaming fetch.
///
/// Rows are pulled from the driver as the reader advances; dropping the
/// reader stops the fetch.
pub struct RowReader {
    rows: mpsc::Receiver<DbResult<AnyRow>>,
}

impl RowReader {
    /// Advance to the next row. `None` means the cursor is exhausted.
    pub async fn next_row(&mut self) -> Option<DbResult<AnyRow>> {
        self.rows.recv().await
    }
}

impl std::fmt::Debug for RowReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowReader").finish_non_exhaustive()
    }
}

/// Forward-only grouping of result sets from a multi-statement batch.
pub struct MultiResult {
    sets: mpsc::Receiver<DbResult<Vec<AnyRow>>>,
}

impl MultiResult {
    /// Advance to the next result set. `None` means the batch is exhausted.
    pub async fn next_set(&mut self) -> Option<DbResult<Vec<AnyRow>>> {
        self.sets.recv().await
    }
}

impl std::fmt::Debug for MultiResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiResult").finish_non_exhaustive()
    }
}
