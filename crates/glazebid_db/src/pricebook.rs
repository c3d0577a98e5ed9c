//! Pricebook lookup: the highest version wins, and only its active rules
//! are applied.

use crate::error::DbError;
use crate::models::{PricebookVersion, PricingRule};
use crate::pool::DbPool;

pub async fn active_pricebook(
    pool: &DbPool,
) -> Result<Option<(PricebookVersion, Vec<PricingRule>)>, DbError> {
    let version: Option<PricebookVersion> = sqlx::query_as(
        r#"
        SELECT id, version, effective_date, notes
        FROM pricebook_versions
        ORDER BY version DESC
        LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await?;

    let Some(version) = version else {
        return Ok(None);
    };

    let rules: Vec<PricingRule> = sqlx::query_as(
        r#"
        SELECT id, name, category, formula_json, applies_to
        FROM pricing_rules
        WHERE pricebook_version_id = ? AND is_active = 1
        "#,
    )
    .bind(&version.id)
    .fetch_all(pool)
    .await?;

    Ok(Some((version, rules)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::memory_pool;

    async fn setup(pool: &DbPool) {
        sqlx::query(
            r#"
            CREATE TABLE pricebook_versions (
                id TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                effective_date TEXT,
                notes TEXT
            )
            "#,
        )
        .execute(pool)
        .await
        .unwrap();
        sqlx::query(
            r#"
            CREATE TABLE pricing_rules (
                id TEXT PRIMARY KEY,
                pricebook_version_id TEXT NOT NULL,
                name TEXT NOT NULL,
                category TEXT,
                formula_json TEXT,
                applies_to TEXT,
                is_active INTEGER NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn empty_pricebook_returns_none() {
        let pool = memory_pool().await;
        setup(&pool).await;
        assert!(active_pricebook(&pool).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn highest_version_and_active_rules_only() {
        let pool = memory_pool().await;
        setup(&pool).await;

        sqlx::query("INSERT INTO pricebook_versions (id, version) VALUES ('pb1', 1), ('pb2', 2)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            r#"
            INSERT INTO pricing_rules (id, pricebook_version_id, name, is_active) VALUES
                ('r1', 'pb2', 'active rule', 1),
                ('r2', 'pb2', 'inactive rule', 0),
                ('r3', 'pb1', 'old book rule', 1)
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let (version, rules) = active_pricebook(&pool).await.unwrap().unwrap();
        assert_eq!(version.id, "pb2");
        assert_eq!(version.version, 2);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "active rule");
    }
}
