// User-defined tools executed through the sandbox.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::error::{DeskError, Result};
use crate::llm::ToolSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomTool {
    pub id: String,
    /// Unique across the deployment; doubles as the tool name in the manifest.
    pub name: String,
    pub description: String,
    pub code: String,
    /// JSON schema for the tool parameters.
    pub parameters: Value,
    pub output_schema: Option<Value>,
    pub timeout_seconds: u32,
    pub memory_limit_mb: u32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustomTool {
    pub fn to_spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCustomTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub code: String,
    #[serde(default = "empty_object")]
    pub parameters: Value,
    pub output_schema: Option<Value>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u32,
    #[serde(default = "default_memory")]
    pub memory_limit_mb: u32,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

fn default_timeout() -> u32 {
    30
}

fn default_memory() -> u32 {
    128
}

#[derive(Debug, Clone)]
pub struct CustomToolRepository {
    pool: SqlitePool,
}

impl CustomToolRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, data: CreateCustomTool) -> Result<CustomTool> {
        if data.name.is_empty() {
            return Err(DeskError::Validation("tool name must not be empty".into()));
        }
        let tool = CustomTool {
            id: uuid::Uuid::new_v4().to_string(),
            name: data.name,
            description: data.description,
            code: data.code,
            parameters: data.parameters,
            output_schema: data.output_schema,
            timeout_seconds: data.timeout_seconds,
            memory_limit_mb: data.memory_limit_mb,
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO custom_tools
             (id, name, description, code, parameters, output_schema, timeout_seconds,
              memory_limit_mb, enabled, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&tool.id)
        .bind(&tool.name)
        .bind(&tool.description)
        .bind(&tool.code)
        .bind(tool.parameters.to_string())
        .bind(tool.output_schema.as_ref().map(Value::to_string))
        .bind(tool.timeout_seconds)
        .bind(tool.memory_limit_mb)
        .bind(tool.enabled)
        .bind(tool.created_at.to_rfc3339())
        .bind(tool.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        if inserted.rows_affected() == 0 {
            return Err(DeskError::Validation(format!(
                "a tool named {:?} already exists",
                tool.name
            )));
        }
        Ok(tool)
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<CustomTool>> {
        let row = sqlx::query(
            "SELECT id, name, description, code, parameters, output_schema, timeout_seconds,
                    memory_limit_mb, enabled, created_at, updated_at
             FROM custom_tools WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_tool(&r)).transpose()
    }

    pub async fn list_enabled(&self) -> Result<Vec<CustomTool>> {
        let rows = sqlx::query(
            "SELECT id, name, description, code, parameters, output_schema, timeout_seconds,
                    memory_limit_mb, enabled, created_at, updated_at
             FROM custom_tools WHERE enabled = 1 ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_tool).collect()
    }

    pub async fn delete(&self, tool_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM custom_tools WHERE id = ?")
            .bind(tool_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_tool(row: &sqlx::sqlite::SqliteRow) -> Result<CustomTool> {
    let parameters: String = row.get("parameters");
    let output_schema: Option<String> = row.get("output_schema");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    Ok(CustomTool {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        code: row.get("code"),
        parameters: serde_json::from_str(&parameters)?,
        output_schema: output_schema.map(|s| serde_json::from_str(&s)).transpose()?,
        timeout_seconds: row.get::<i64, _>("timeout_seconds") as u32,
        memory_limit_mb: row.get::<i64, _>("memory_limit_mb") as u32,
        enabled: row.get("enabled"),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use serde_json::json;

    fn create(name: &str) -> CreateCustomTool {
        CreateCustomTool {
            name: name.to_string(),
            description: "adds numbers".to_string(),
            code: "print('{}')".to_string(),
            parameters: json!({"type": "object"}),
            output_schema: None,
            timeout_seconds: 30,
            memory_limit_mb: 128,
        }
    }

    #[tokio::test]
    async fn names_are_unique() {
        let repo = CustomToolRepository::new(test_pool().await);
        repo.create(create("adder")).await.unwrap();
        let err = repo.create(create("adder")).await.unwrap_err();
        assert!(matches!(err, DeskError::Validation(_)));
    }

    #[tokio::test]
    async fn lookup_by_name() {
        let repo = CustomToolRepository::new(test_pool().await);
        repo.create(create("adder")).await.unwrap();
        let tool = repo.get_by_name("adder").await.unwrap().unwrap();
        assert_eq!(tool.timeout_seconds, 30);
        assert!(repo.get_by_name("missing").await.unwrap().is_none());
    }
}
