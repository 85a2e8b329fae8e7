//! Transaction handles over dedicated connections.
//!
//! A transaction takes a connection out of its pool for the full unit of
//! work. Ending the transaction closes the connection rather than recycling
//! it; the next operation draws a fresh one from the pool.

use crate::error::DbResult;
use sqlx::Connection;
use sqlx::AnyConnection;
use tracing::{debug, warn};

/// An open transaction over a dedicated database connection.
///
/// Exactly one unit of work uses the handle end-to-end; it is never shared
/// across concurrent operations. Dropping the handle without committing
/// closes the connection, which rolls the transaction back server-side.
#[must_use = "if unused, the transaction is immediately rolled back"]
pub struct DbTransaction {
    conn: AnyConnection,
}

impl DbTransaction {
    /// Begin a transaction on a connection detached from its pool.
    pub(crate) async fn begin(mut conn: AnyConnection) -> DbResult<Self> {
        if let Err(err) = sqlx::raw_sql("BEGIN").execute(&mut conn).await {
            let _ = conn.close().await;
            return Err(err.into());
        }
        debug!("Transaction started");
        Ok(Self { conn })
    }

    /// The connection carrying this transaction.
    pub(crate) fn connection(&mut self) -> &mut AnyConnection {
        &mut self.conn
    }

    /// Commit the transaction and close the underlying connection.
    pub async fn commit(mut self) -> DbResult<()> {
        match sqlx::raw_sql("COMMIT").execute(&mut self.conn).await {
            Ok(_) => {
                debug!("Transaction committed");
                self.conn.close().await?;
                Ok(())
            }
            Err(err) => {
                let _ = self.conn.close().await;
                Err(err.into())
            }
        }
    }

    /// Roll the transaction back and close the underlying connection.
    pub async fn rollback(mut self) -> DbResult<()> {
        let result = sqlx::raw_sql("ROLLBACK").execute(&mut self.conn).await;
        if let Err(err) = self.conn.close().await {
            warn!(error = %err, "Failed to close connection after rollback");
        }
        match result {
            Ok(_) => {
                debug!("Transaction rolled back");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl std::fmt::Debug for DbTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbTransaction").finish_non_exhaustive()
    }
}
