use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// What the server says about the current session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct ServerInfo {
    pub version: String,
    pub database: Option<String>,
    pub current_user: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub column_type: String,
    pub nullable: bool,
}

/// Login row of the backend's account table.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountRow {
    pub username: String,
    pub password_hash: String,
}

impl AccountRow {
    /// Hash scheme tag, e.g. `2b` for `$2b$10$...`.
    pub fn hash_scheme(&self) -> Option<&str> {
        let rest = self.password_hash.strip_prefix('$')?;
        let (scheme, _) = rest.split_once('$')?;
        (!scheme.is_empty()).then_some(scheme)
    }

    pub fn looks_like_bcrypt(&self) -> bool {
        matches!(self.hash_scheme(), Some("2a" | "2b" | "2x" | "2y"))
            && self.password_hash.len() == 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(hash: &str) -> AccountRow {
        AccountRow {
            username: "admin".into(),
            password_hash: hash.into(),
        }
    }

    #[test]
    fn recognizes_bcrypt_hashes() {
        let r = row("$2b$10$N9qo8uLOickgx2ZMRZoMyeIjZAgcfl7p92ldGxad68LJZdL17lhWy");
        assert_eq!(r.hash_scheme(), Some("2b"));
        assert!(r.looks_like_bcrypt());
    }

    #[test]
    fn plaintext_is_not_a_hash() {
        let r = row("admin123");
        assert_eq!(r.hash_scheme(), None);
        assert!(!r.looks_like_bcrypt());
    }
}
