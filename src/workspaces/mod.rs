// Workspaces group knowledge documents for visibility scoping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateWorkspace {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct WorkspaceRepository {
    pool: SqlitePool,
}

impl WorkspaceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, data: CreateWorkspace) -> Result<Workspace> {
        let workspace = Workspace {
            id: uuid::Uuid::new_v4().to_string(),
            name: data.name,
            description: data.description,
            is_system: false,
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO workspaces (id, name, description, is_system, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&workspace.id)
        .bind(&workspace.name)
        .bind(&workspace.description)
        .bind(workspace.is_system)
        .bind(workspace.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(workspace)
    }

    pub async fn list(&self) -> Result<Vec<Workspace>> {
        let rows = sqlx::query(
            "SELECT id, name, description, is_system, created_at FROM workspaces ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| {
                let created_at: String = row.get("created_at");
                Workspace {
                    id: row.get("id"),
                    name: row.get("name"),
                    description: row.get("description"),
                    is_system: row.get("is_system"),
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .map(|t| t.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                }
            })
            .collect())
    }

    /// System workspaces cannot be deleted.
    pub async fn delete(&self, workspace_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM workspaces WHERE id = ? AND is_system = 0")
            .bind(workspace_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn create_list_delete() {
        let repo = WorkspaceRepository::new(test_pool().await);
        let workspace = repo
            .create(CreateWorkspace {
                name: "Support".to_string(),
                description: String::new(),
            })
            .await
            .unwrap();

        assert_eq!(repo.list().await.unwrap().len(), 1);
        assert!(repo.delete(&workspace.id).await.unwrap());
        assert!(repo.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn system_workspace_is_not_deletable() {
        let pool = test_pool().await;
        sqlx::query(
            "INSERT INTO workspaces (id, name, description, is_system, created_at) VALUES ('sys', 'Default', '', 1, ?)",
        )
        .bind(Utc::now().to_rfc3339())
        .execute(&pool)
        .await
        .unwrap();

        let repo = WorkspaceRepository::new(pool);
        assert!(!repo.delete("sys").await.unwrap());
    }
}
