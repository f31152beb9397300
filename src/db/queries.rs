use sqlx::mysql::MySqlPool;

use crate::config::AccountsConfig;
use crate::db::models::{AccountRow, ColumnInfo, ServerInfo};
use crate::error::OpsError;

/// Validate an identifier and wrap it in backticks.
///
/// Table and column names cannot be bound as parameters, so anything that is
/// spliced into SQL must pass through here.
pub fn quote_ident(name: &str) -> Result<String, OpsError> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if !valid {
        return Err(OpsError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("`{name}`"))
}

// information_schema columns come back as VARBINARY on some MySQL 8 builds,
// hence the CASTs.

pub async fn ping(pool: &MySqlPool) -> Result<ServerInfo, OpsError> {
    let info: ServerInfo = sqlx::query_as(
        "SELECT CAST(VERSION() AS CHAR) AS `version`, \
         CAST(DATABASE() AS CHAR) AS `database`, \
         CAST(CURRENT_USER() AS CHAR) AS `current_user`",
    )
    .fetch_one(pool)
    .await?;
    Ok(info)
}

/// Whether `table` exists in the session's current schema.
pub async fn table_exists(pool: &MySqlPool, table: &str) -> Result<bool, OpsError> {
    quote_ident(table)?;
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM information_schema.tables \
         WHERE table_schema = DATABASE() AND table_name = ?",
    )
    .bind(table)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

pub async fn column_exists(pool: &MySqlPool, table: &str, column: &str) -> Result<bool, OpsError> {
    quote_ident(table)?;
    quote_ident(column)?;
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM information_schema.columns \
         WHERE table_schema = DATABASE() AND table_name = ? AND column_name = ?",
    )
    .bind(table)
    .bind(column)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

pub async fn list_columns(pool: &MySqlPool, table: &str) -> Result<Vec<ColumnInfo>, OpsError> {
    quote_ident(table)?;
    let rows: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT CAST(column_name AS CHAR), CAST(column_type AS CHAR), CAST(is_nullable AS CHAR) \
         FROM information_schema.columns \
         WHERE table_schema = DATABASE() AND table_name = ? \
         ORDER BY ordinal_position",
    )
    .bind(table)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(name, column_type, nullable)| ColumnInfo {
            name,
            column_type,
            nullable: nullable.eq_ignore_ascii_case("YES"),
        })
        .collect())
}

pub async fn count_rows(pool: &MySqlPool, table: &str) -> Result<i64, OpsError> {
    let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table)?);
    let (count,): (i64,) = sqlx::query_as(&sql).fetch_one(pool).await?;
    Ok(count)
}

pub async fn find_account(
    pool: &MySqlPool,
    accounts: &AccountsConfig,
    username: &str,
) -> Result<Option<AccountRow>, OpsError> {
    let user_col = quote_ident(&accounts.username_column)?;
    let sql = format!(
        "SELECT CAST({user_col} AS CHAR), CAST({pass_col} AS CHAR) FROM {table} \
         WHERE {user_col} = ? LIMIT 1",
        pass_col = quote_ident(&accounts.password_column)?,
        table = quote_ident(&accounts.table)?,
    );
    let row: Option<(String, Option<String>)> = sqlx::query_as(&sql)
        .bind(username)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(username, hash)| AccountRow {
        username,
        password_hash: hash.unwrap_or_default(),
    }))
}

/// Store a new password hash. Returns rows affected.
pub async fn set_password_hash(
    pool: &MySqlPool,
    accounts: &AccountsConfig,
    username: &str,
    hash: &str,
) -> Result<u64, OpsError> {
    let sql = format!(
        "UPDATE {table} SET {pass_col} = ? WHERE {user_col} = ?",
        table = quote_ident(&accounts.table)?,
        pass_col = quote_ident(&accounts.password_column)?,
        user_col = quote_ident(&accounts.username_column)?,
    );
    let done = sqlx::query(&sql)
        .bind(hash)
        .bind(username)
        .execute(pool)
        .await?;
    Ok(done.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_plain_identifiers() {
        assert_eq!(quote_ident("user_permissions").unwrap(), "`user_permissions`");
        assert_eq!(quote_ident("donation_details2").unwrap(), "`donation_details2`");
    }

    #[test]
    fn rejects_injection_and_oversized_names() {
        let long = "t".repeat(65);
        for bad in ["", "users; DROP TABLE x", "a`b", "system user", long.as_str()] {
            assert!(matches!(quote_ident(bad), Err(OpsError::InvalidIdentifier(_))), "{bad}");
        }
    }
}
