use tracing::{info, warn};

use crate::db::SqlExecutor;
use crate::error::OpsError;
use crate::migrate::manifest::Migration;
use crate::migrate::split::{is_ddl, is_multi_clause_alter, split_statements};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementOutcome {
    Applied { rows_affected: u64 },
    /// The change was already in place; the driver's report is kept.
    AlreadyPresent { code: Option<u16>, message: String },
}

impl StatementOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            StatementOutcome::Applied { .. } => "applied",
            StatementOutcome::AlreadyPresent { .. } => "already_present",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub migration: String,
    pub statements: Vec<StatementOutcome>,
}

impl MigrationReport {
    pub fn applied(&self) -> usize {
        self.statements
            .iter()
            .filter(|s| matches!(s, StatementOutcome::Applied { .. }))
            .count()
    }

    pub fn already_present(&self) -> usize {
        self.statements.len() - self.applied()
    }
}

/// Applies migrations statement by statement, stopping at the first failure
/// that is not an "already exists" report on additive DDL.
///
/// Recoverable DDL should carry one clause per statement. A multi-clause
/// `ALTER TABLE` that hits "already exists" is recorded as present and
/// logged at warn level, since its remaining clauses did not run.
pub struct MigrationRunner<'a, E: SqlExecutor> {
    exec: &'a E,
}

impl<'a, E: SqlExecutor> MigrationRunner<'a, E> {
    pub fn new(exec: &'a E) -> Self {
        Self { exec }
    }

    pub async fn apply(&self, migration: &Migration) -> Result<MigrationReport, OpsError> {
        let id = migration.id();
        let statements = split_statements(&migration.sql);
        let mut report = MigrationReport {
            migration: id.clone(),
            statements: Vec::with_capacity(statements.len()),
        };

        for (idx, stmt) in statements.iter().enumerate() {
            let number = idx + 1;
            match self.exec.execute(stmt).await {
                Ok(rows_affected) => {
                    report
                        .statements
                        .push(StatementOutcome::Applied { rows_affected });
                }
                Err(failure) if is_ddl(stmt) && failure.is_already_present() => {
                    if is_multi_clause_alter(stmt) {
                        warn!(
                            migration = %id,
                            statement = number,
                            code = ?failure.number,
                            "multi-clause ALTER partly present; other clauses were not applied"
                        );
                    }
                    info!(
                        migration = %id,
                        statement = number,
                        code = ?failure.number,
                        reason = %failure.message,
                        "change already present; skipping"
                    );
                    report.statements.push(StatementOutcome::AlreadyPresent {
                        code: failure.number,
                        message: failure.message,
                    });
                }
                Err(failure) => {
                    warn!(
                        migration = %id,
                        statement = number,
                        code = ?failure.number,
                        error = %failure.message,
                        "statement failed"
                    );
                    return Err(if is_ddl(stmt) {
                        OpsError::Schema {
                            migration: id,
                            statement: number,
                            code: failure.number,
                            message: failure.message,
                        }
                    } else {
                        OpsError::Query {
                            code: failure.number,
                            message: failure.message,
                        }
                    });
                }
            }
        }

        info!(
            migration = %id,
            applied = report.applied(),
            already_present = report.already_present(),
            "migration finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbFailure;
    use crate::migrate::manifest::MigrationSource;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    /// Tiny schema model: remembers created tables, columns and indexes and
    /// answers the way MySQL does on a rerun.
    #[derive(Default)]
    struct FakeMysql {
        objects: Mutex<BTreeSet<String>>,
        executed: Mutex<Vec<String>>,
        fail_on: Option<(&'static str, DbFailure)>,
    }

    impl FakeMysql {
        fn schema(&self) -> BTreeSet<String> {
            self.objects.lock().unwrap().clone()
        }
    }

    impl SqlExecutor for FakeMysql {
        async fn execute(&self, sql: &str) -> Result<u64, DbFailure> {
            self.executed.lock().unwrap().push(sql.to_string());
            if let Some((needle, failure)) = &self.fail_on
                && sql.contains(needle)
            {
                return Err(failure.clone());
            }
            let words: Vec<&str> = sql.split_whitespace().collect();
            let (object, number, text) = match words.as_slice() {
                ["CREATE", "TABLE", "IF", "NOT", "EXISTS", t, ..] => {
                    self.objects.lock().unwrap().insert(format!("table:{t}"));
                    return Ok(0);
                }
                ["CREATE", "TABLE", t, ..] => {
                    (format!("table:{t}"), 1050, format!("Table '{t}' already exists"))
                }
                ["ALTER", "TABLE", t, "ADD", "COLUMN", c, ..] => (
                    format!("column:{t}.{c}"),
                    1060,
                    format!("Duplicate column name '{c}'"),
                ),
                ["CREATE", "INDEX", i, ..] => {
                    (format!("index:{i}"), 1061, format!("Duplicate key name '{i}'"))
                }
                _ => return Ok(1),
            };
            if !self.objects.lock().unwrap().insert(object) {
                return Err(DbFailure::new(Some(number), Some("42S21"), text));
            }
            Ok(0)
        }
    }

    fn migration(sql: &str) -> Migration {
        Migration {
            version: 4,
            name: "system_user_password_audit".into(),
            source: MigrationSource::Bundled,
            sql: sql.into(),
        }
    }

    const ADDITIVE: &str = "
        CREATE TABLE donations (id INT);
        ALTER TABLE system_user ADD COLUMN must_change_password TINYINT(1);
        CREATE INDEX idx_pw ON system_user (must_change_password);
    ";

    #[tokio::test]
    async fn additive_ddl_is_idempotent() {
        let db = FakeMysql::default();
        let runner = MigrationRunner::new(&db);
        let m = migration(ADDITIVE);

        let first = runner.apply(&m).await.unwrap();
        let after_first = db.schema();
        assert_eq!(first.applied(), 3);

        let second = runner.apply(&m).await.unwrap();
        assert_eq!(db.schema(), after_first);
        assert_eq!(second.applied(), 0);
        assert_eq!(second.already_present(), 3);
        assert_eq!(
            second.statements[1],
            StatementOutcome::AlreadyPresent {
                code: Some(1060),
                message: "Duplicate column name 'must_change_password'".into(),
            }
        );
    }

    #[tokio::test]
    async fn multi_clause_alter_with_one_existing_column_is_flagged() {
        let db = FakeMysql::default();
        let runner = MigrationRunner::new(&db);
        runner
            .apply(&migration("ALTER TABLE system_user ADD COLUMN a INT;"))
            .await
            .unwrap();

        let both = "ALTER TABLE system_user ADD COLUMN a INT, ADD COLUMN b INT";
        let report = runner.apply(&migration(both)).await.unwrap();
        assert!(is_multi_clause_alter(both));
        assert_eq!(report.already_present(), 1);
        // the atomic statement left `b` out
        assert!(!db.schema().contains("column:system_user.b"));
    }

    #[tokio::test]
    async fn unrecoverable_ddl_stops_and_keeps_message() {
        let db = FakeMysql {
            fail_on: Some((
                "ADD COLUMN",
                DbFailure::new(
                    Some(1146),
                    Some("42S02"),
                    "Table 'museosmart.system_user' doesn't exist",
                ),
            )),
            ..FakeMysql::default()
        };
        let err = MigrationRunner::new(&db).apply(&migration(ADDITIVE)).await.unwrap_err();

        match err {
            OpsError::Schema {
                migration,
                statement,
                code,
                message,
            } => {
                assert_eq!(migration, "004_system_user_password_audit");
                assert_eq!(statement, 2);
                assert_eq!(code, Some(1146));
                assert!(message.contains("doesn't exist"));
            }
            other => panic!("expected schema error, got {other:?}"),
        }
        // third statement never ran
        assert_eq!(db.executed.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_entry_on_dml_is_a_query_error() {
        let db = FakeMysql {
            fail_on: Some((
                "INSERT",
                DbFailure::new(Some(1062), Some("23000"), "Duplicate entry '1' for key 'PRIMARY'"),
            )),
            ..FakeMysql::default()
        };
        let err = MigrationRunner::new(&db)
            .apply(&migration("INSERT INTO schedules (weekday) VALUES (1);"))
            .await
            .unwrap_err();
        assert!(matches!(err, OpsError::Query { code: Some(1062), .. }));
        assert_eq!(err.exit_code(), 5);
    }

    #[tokio::test]
    async fn already_exists_on_dml_is_not_swallowed() {
        // 1050 only counts as "already present" for DDL
        let db = FakeMysql {
            fail_on: Some(("UPDATE", DbFailure::new(Some(1050), None, "odd"))),
            ..FakeMysql::default()
        };
        let res = MigrationRunner::new(&db)
            .apply(&migration("UPDATE schedules SET is_closed = 1;"))
            .await;
        assert!(res.is_err());
    }
}
