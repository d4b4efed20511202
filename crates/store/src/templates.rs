//! CRUD for extraction templates (`feed_templates`).
//!
//! Match rules, selectors, and processing rules are validated against
//! their typed forms before hitting the database so malformed JSON never
//! lands in a template row.

use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use newswire_core::{FeedTemplate, MatchRule, ProcessingRules, TemplateSelectors};

use crate::error::{map_unique_violation, StoreError};

const TEMPLATE_COLUMNS: &str =
    "id, name, match_rules, selectors, processing, created_at, updated_at";

/// Request body for creating a template.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateTemplate {
    pub name: String,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub match_rules: serde_json::Value,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub selectors: serde_json::Value,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub processing: serde_json::Value,
}

/// Request body for updating a template (all fields optional).
#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct UpdateTemplate {
    pub name: Option<String>,
    #[schema(value_type = Option<Vec<Object>>)]
    pub match_rules: Option<serde_json::Value>,
    #[schema(value_type = Option<Object>)]
    pub selectors: Option<serde_json::Value>,
    #[schema(value_type = Option<Object>)]
    pub processing: Option<serde_json::Value>,
}

fn validate_parts(
    match_rules: Option<&serde_json::Value>,
    selectors: Option<&serde_json::Value>,
    processing: Option<&serde_json::Value>,
) -> Result<(), StoreError> {
    if let Some(rules) = match_rules {
        serde_json::from_value::<Vec<MatchRule>>(rules.clone())
            .map_err(|e| StoreError::Validation(format!("match_rules: {}", e)))?;
    }
    if let Some(selectors) = selectors {
        serde_json::from_value::<TemplateSelectors>(selectors.clone())
            .map_err(|e| StoreError::Validation(format!("selectors: {}", e)))?;
    }
    if let Some(processing) = processing {
        serde_json::from_value::<ProcessingRules>(processing.clone())
            .map_err(|e| StoreError::Validation(format!("processing: {}", e)))?;
    }
    Ok(())
}

fn empty_to_defaults(value: serde_json::Value, default: serde_json::Value) -> serde_json::Value {
    if value.is_null() {
        default
    } else {
        value
    }
}

/// Stateless store for `feed_templates`.
pub struct TemplateStore;

impl TemplateStore {
    pub async fn create(
        pool: &PgPool,
        req: CreateTemplate,
    ) -> Result<FeedTemplate, StoreError> {
        if req.name.trim().is_empty() {
            return Err(StoreError::Validation("name must not be empty".to_string()));
        }
        let match_rules = empty_to_defaults(req.match_rules, serde_json::json!([]));
        let selectors = empty_to_defaults(req.selectors, serde_json::json!({}));
        let processing = empty_to_defaults(req.processing, serde_json::json!({}));
        validate_parts(Some(&match_rules), Some(&selectors), Some(&processing))?;

        let result = sqlx::query_as::<_, FeedTemplate>(&format!(
            "INSERT INTO feed_templates (name, match_rules, selectors, processing)
             VALUES ($1, $2, $3, $4)
             RETURNING {TEMPLATE_COLUMNS}"
        ))
        .bind(req.name.trim())
        .bind(match_rules)
        .bind(selectors)
        .bind(processing)
        .fetch_one(pool)
        .await;

        result.map_err(|e| map_unique_violation(e, "feed_templates.name"))
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<FeedTemplate>, StoreError> {
        let rows = sqlx::query_as::<_, FeedTemplate>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM feed_templates ORDER BY name ASC"
        ))
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<FeedTemplate>, StoreError> {
        let row = sqlx::query_as::<_, FeedTemplate>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM feed_templates WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        req: UpdateTemplate,
    ) -> Result<FeedTemplate, StoreError> {
        validate_parts(
            req.match_rules.as_ref(),
            req.selectors.as_ref(),
            req.processing.as_ref(),
        )?;

        let row = sqlx::query_as::<_, FeedTemplate>(&format!(
            "UPDATE feed_templates SET
                name = COALESCE($2, name),
                match_rules = COALESCE($3, match_rules),
                selectors = COALESCE($4, selectors),
                processing = COALESCE($5, processing),
                updated_at = now()
             WHERE id = $1
             RETURNING {TEMPLATE_COLUMNS}"
        ))
        .bind(id)
        .bind(&req.name)
        .bind(&req.match_rules)
        .bind(&req.selectors)
        .bind(&req.processing)
        .fetch_optional(pool)
        .await?;

        row.ok_or(StoreError::NotFound(id))
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM feed_templates WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_bad_match_rules() {
        let bad = serde_json::json!([{"type": "unknown_rule"}]);
        assert!(validate_parts(Some(&bad), None, None).is_err());
    }

    #[test]
    fn test_validate_accepts_typed_parts() {
        let rules = serde_json::json!([
            {"type": "url_regex", "pattern": ".*/feed$", "priority": 3}
        ]);
        let selectors = serde_json::json!({
            "content": {"kind": "css", "query": "div.body", "required": false}
        });
        let processing = serde_json::json!({"strip_html": false});
        assert!(validate_parts(Some(&rules), Some(&selectors), Some(&processing)).is_ok());
    }

    #[test]
    fn test_empty_to_defaults() {
        assert_eq!(
            empty_to_defaults(serde_json::Value::Null, serde_json::json!([])),
            serde_json::json!([])
        );
        let keep = serde_json::json!({"a": 1});
        assert_eq!(empty_to_defaults(keep.clone(), serde_json::json!({})), keep);
    }
}
