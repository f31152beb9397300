use sqlx::mysql::MySqlPool;

use crate::error::DbFailure;

/// Executes one raw SQL statement and reports rows affected.
///
/// The migration runner only sees this seam, so it can be driven by a
/// scripted executor in tests.
pub trait SqlExecutor: Sync {
    fn execute(&self, sql: &str) -> impl Future<Output = Result<u64, DbFailure>> + Send;
}

impl SqlExecutor for MySqlPool {
    async fn execute(&self, sql: &str) -> Result<u64, DbFailure> {
        // raw_sql: DDL goes over the text protocol untouched
        sqlx::raw_sql(sql)
            .execute(self)
            .await
            .map(|done| done.rows_affected())
            .map_err(|e| DbFailure::from(&e))
    }
}
