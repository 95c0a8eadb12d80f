//! SQLite implementation of the code dictionary store
//!
//! Rules, synonyms and legacy mappings live in three tables. Every mutation
//! runs in its own transaction and is validated inside it, so a concurrent
//! writer cannot slip a duplicate name in between check and insert.

use async_trait::async_trait;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::info;

use crate::domain::dictionary::{
    is_placeholder_code, normalize_name, CodeRule, DictionarySnapshot, LegacyMapping, RuleId, Synonym,
};
use crate::domain::errors::{ReconciliationError, ReconciliationResult};
use crate::domain::repositories::DictionaryRepository;

pub struct SqliteDictionaryRepository {
    pool: SqlitePool,
}

impl SqliteDictionaryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

pub(crate) async fn fetch_snapshot(conn: &mut SqliteConnection) -> ReconciliationResult<DictionarySnapshot> {
    let rules = sqlx::query("SELECT id, assigned_code FROM code_rules ORDER BY id")
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(|row| {
            Ok(CodeRule {
                id: row.try_get("id")?,
                assigned_code: row.try_get("assigned_code")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()?;

    let synonyms = sqlx::query("SELECT id, rule_id, name FROM code_rule_synonyms ORDER BY id")
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(|row| {
            Ok(Synonym {
                id: row.try_get("id")?,
                rule_id: row.try_get("rule_id")?,
                name: row.try_get("name")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()?;

    let legacy_mappings = sqlx::query("SELECT id, category_name, assigned_code FROM category_code_mappings ORDER BY id")
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(|row| {
            Ok(LegacyMapping {
                id: row.try_get("id")?,
                category_name: row.try_get("category_name")?,
                assigned_code: row.try_get("assigned_code")?,
            })
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()?;

    Ok(DictionarySnapshot {
        rules,
        synonyms,
        legacy_mappings,
    })
}

fn validate_name(name: &str) -> ReconciliationResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ReconciliationError::validation("synonym name must not be empty"));
    }
    Ok(name)
}

fn validate_code(code: &str) -> ReconciliationResult<&str> {
    let code = code.trim();
    if code.is_empty() {
        return Err(ReconciliationError::validation("assigned code must not be empty"));
    }
    if !code.chars().all(char::is_alphanumeric) {
        return Err(ReconciliationError::validation(format!(
            "assigned code '{code}' must be alphanumeric"
        )));
    }
    if is_placeholder_code(code) {
        return Err(ReconciliationError::validation(format!(
            "'{code}' is a placeholder and cannot be assigned"
        )));
    }
    Ok(code)
}

/// Reject a name that already maps to a real code in either source.
/// Legacy rows are compared after normalization in Rust; SQLite's `lower()`
/// only folds ASCII.
async fn ensure_name_unknown(conn: &mut SqliteConnection, name: &str) -> ReconciliationResult<()> {
    let normalized = normalize_name(name);

    let synonym_owner: Option<RuleId> = sqlx::query_scalar("SELECT rule_id FROM code_rule_synonyms WHERE name_normalized = ?")
        .bind(&normalized)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(rule_id) = synonym_owner {
        return Err(ReconciliationError::validation(format!(
            "'{name}' is already a synonym of rule {rule_id}"
        )));
    }

    let legacy_rows = sqlx::query("SELECT category_name, assigned_code FROM category_code_mappings")
        .fetch_all(&mut *conn)
        .await?;
    for row in &legacy_rows {
        let category_name: String = row.try_get("category_name")?;
        let assigned_code: String = row.try_get("assigned_code")?;
        if normalize_name(&category_name) == normalized
            && !assigned_code.trim().is_empty()
            && !is_placeholder_code(&assigned_code)
        {
            return Err(ReconciliationError::validation(format!(
                "'{name}' already maps to '{}' in the legacy mapping table",
                assigned_code.trim()
            )));
        }
    }
    Ok(())
}

async fn insert_synonym(conn: &mut SqliteConnection, rule_id: RuleId, name: &str) -> ReconciliationResult<Synonym> {
    let result = sqlx::query(
        "INSERT INTO code_rule_synonyms (rule_id, name, name_normalized, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(rule_id)
    .bind(name)
    .bind(normalize_name(name))
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(Synonym {
        id: result.last_insert_rowid(),
        rule_id,
        name: name.to_string(),
    })
}

#[async_trait]
impl DictionaryRepository for SqliteDictionaryRepository {
    async fn load_snapshot(&self) -> ReconciliationResult<DictionarySnapshot> {
        let mut conn = self.pool.acquire().await?;
        fetch_snapshot(&mut conn).await
    }

    async fn add_rule(&self, assigned_code: &str, synonym_name: &str) -> ReconciliationResult<CodeRule> {
        let code = validate_code(assigned_code)?;
        let name = validate_name(synonym_name)?;

        let mut tx = self.pool.begin().await?;

        let owner: Option<RuleId> = sqlx::query_scalar("SELECT id FROM code_rules WHERE assigned_code = ?")
            .bind(code)
            .fetch_optional(&mut *tx)
            .await?;
        if let Some(rule_id) = owner {
            return Err(ReconciliationError::validation(format!(
                "code '{code}' already belongs to rule {rule_id}; attach a synonym instead"
            )));
        }
        ensure_name_unknown(&mut tx, name).await?;

        let result = sqlx::query("INSERT INTO code_rules (assigned_code, created_at) VALUES (?, ?)")
            .bind(code)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;
        let rule = CodeRule {
            id: result.last_insert_rowid(),
            assigned_code: code.to_string(),
        };
        insert_synonym(&mut tx, rule.id, name).await?;

        tx.commit().await?;
        info!(rule_id = rule.id, code, name, "📝 Code rule created");
        Ok(rule)
    }

    async fn add_synonym(&self, rule_id: RuleId, synonym_name: &str) -> ReconciliationResult<Synonym> {
        let name = validate_name(synonym_name)?;

        let mut tx = self.pool.begin().await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM code_rules WHERE id = ?")
            .bind(rule_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(ReconciliationError::validation(format!("rule {rule_id} does not exist")));
        }
        ensure_name_unknown(&mut tx, name).await?;

        let synonym = insert_synonym(&mut tx, rule_id, name).await?;

        tx.commit().await?;
        info!(rule_id, synonym_id = synonym.id, name, "📝 Synonym attached");
        Ok(synonym)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestDatabase;
    use rstest::rstest;

    #[tokio::test]
    async fn add_rule_creates_rule_and_first_synonym() -> anyhow::Result<()> {
        let db = TestDatabase::new().await?;
        let repo = SqliteDictionaryRepository::new(db.pool());

        let rule = repo.add_rule(" PJ ", " Пижамы ").await?;
        assert_eq!(rule.assigned_code, "PJ");

        let snapshot = repo.load_snapshot().await?;
        assert_eq!(snapshot.rules, vec![rule.clone()]);
        assert_eq!(snapshot.synonyms.len(), 1);
        assert_eq!(snapshot.synonyms[0].rule_id, rule.id);
        assert_eq!(snapshot.synonyms[0].name, "Пижамы");
        Ok(())
    }

    #[rstest]
    #[case::empty_code("", "Пижамы")]
    #[case::symbol_code("P-J", "Пижамы")]
    #[case::placeholder("TEMP", "Пижамы")]
    #[case::empty_name("PJ", "   ")]
    #[tokio::test]
    async fn add_rule_rejects_invalid_input(#[case] code: &str, #[case] name: &str) -> anyhow::Result<()> {
        let db = TestDatabase::new().await?;
        let repo = SqliteDictionaryRepository::new(db.pool());

        let err = repo.add_rule(code, name).await.unwrap_err();
        assert!(matches!(err, ReconciliationError::Validation { .. }));
        assert!(repo.load_snapshot().await?.rules.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected_in_either_source() -> anyhow::Result<()> {
        let db = TestDatabase::new().await?;
        db.insert_legacy_mapping("Носки", "NS").await?;
        let repo = SqliteDictionaryRepository::new(db.pool());
        let rule = repo.add_rule("PJ", "Пижамы").await?;

        assert!(repo.add_synonym(rule.id, "ПИЖАМЫ").await.is_err());
        assert!(repo.add_synonym(rule.id, " носки").await.is_err());
        assert!(repo.add_rule("PX", "пижамы").await.is_err());
        assert_eq!(repo.load_snapshot().await?.synonyms.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn placeholder_legacy_names_may_get_a_rule() -> anyhow::Result<()> {
        let db = TestDatabase::new().await?;
        db.insert_legacy_mapping("Разное", "TEMP").await?;
        let repo = SqliteDictionaryRepository::new(db.pool());

        assert!(repo.add_rule("RZ", "Разное").await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn code_owned_by_another_rule_is_rejected() -> anyhow::Result<()> {
        let db = TestDatabase::new().await?;
        let repo = SqliteDictionaryRepository::new(db.pool());
        repo.add_rule("PJ", "Пижамы").await?;

        let err = repo.add_rule("PJ", "Ночные рубашки").await.unwrap_err();
        assert!(err.to_string().contains("attach a synonym"));
        Ok(())
    }

    #[tokio::test]
    async fn synonym_for_unknown_rule_is_rejected() -> anyhow::Result<()> {
        let db = TestDatabase::new().await?;
        let repo = SqliteDictionaryRepository::new(db.pool());

        let err = repo.add_synonym(99, "Пижамы").await.unwrap_err();
        assert!(matches!(err, ReconciliationError::Validation { .. }));
        Ok(())
    }
}
