use sqlx::{Row, SqlitePool};

use crate::catalog::models::{ExternalSystem, ServiceEndpoint};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert_system(&self, system: &ExternalSystem) -> Result<()> {
        sqlx::query(
            "INSERT INTO external_systems (id, name, description, base_url, auth_config, health_check_path, tags, status, metadata)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               name = excluded.name, description = excluded.description,
               base_url = excluded.base_url, auth_config = excluded.auth_config,
               health_check_path = excluded.health_check_path, tags = excluded.tags,
               status = excluded.status, metadata = excluded.metadata",
        )
        .bind(&system.id)
        .bind(&system.name)
        .bind(&system.description)
        .bind(&system.base_url)
        .bind(serde_json::to_string(&system.auth_config)?)
        .bind(&system.health_check_path)
        .bind(serde_json::to_string(&system.tags)?)
        .bind(serde_json::to_string(&system.status)?.trim_matches('"').to_string())
        .bind(system.metadata.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_system(&self, system_id: &str) -> Result<Option<ExternalSystem>> {
        let row = sqlx::query(
            "SELECT id, name, description, base_url, auth_config, health_check_path, tags, status, metadata
             FROM external_systems WHERE id = ?",
        )
        .bind(system_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_system(&r)).transpose()
    }

    pub async fn list_systems(&self) -> Result<Vec<ExternalSystem>> {
        let rows = sqlx::query(
            "SELECT id, name, description, base_url, auth_config, health_check_path, tags, status, metadata
             FROM external_systems ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_system).collect()
    }

    /// Deleting a system removes its endpoints in the same transaction.
    pub async fn delete_system(&self, system_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM service_endpoints WHERE system_id = ?")
            .bind(system_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM external_systems WHERE id = ?")
            .bind(system_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn upsert_endpoint(&self, endpoint: &ServiceEndpoint) -> Result<()> {
        sqlx::query(
            "INSERT INTO service_endpoints
             (id, system_id, name, description, method, path, path_params, query_params,
              request_body, when_to_use, examples, risk_level, required_permissions,
              timeout_seconds, enabled, tags)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               system_id = excluded.system_id, name = excluded.name,
               description = excluded.description, method = excluded.method,
               path = excluded.path, path_params = excluded.path_params,
               query_params = excluded.query_params, request_body = excluded.request_body,
               when_to_use = excluded.when_to_use, examples = excluded.examples,
               risk_level = excluded.risk_level,
               required_permissions = excluded.required_permissions,
               timeout_seconds = excluded.timeout_seconds, enabled = excluded.enabled,
               tags = excluded.tags",
        )
        .bind(&endpoint.id)
        .bind(&endpoint.system_id)
        .bind(&endpoint.name)
        .bind(&endpoint.description)
        .bind(endpoint.method.as_str())
        .bind(&endpoint.path)
        .bind(endpoint.path_params.as_ref().map(serde_json::to_string).transpose()?)
        .bind(endpoint.query_params.as_ref().map(serde_json::to_string).transpose()?)
        .bind(endpoint.request_body.as_ref().map(Value::to_string))
        .bind(&endpoint.when_to_use)
        .bind(serde_json::to_string(&endpoint.examples)?)
        .bind(endpoint.risk_level.as_str())
        .bind(serde_json::to_string(&endpoint.required_permissions)?)
        .bind(endpoint.timeout_seconds)
        .bind(endpoint.enabled)
        .bind(serde_json::to_string(&endpoint.tags)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_endpoint(&self, endpoint_id: &str) -> Result<Option<ServiceEndpoint>> {
        let row = sqlx::query(&format!("{ENDPOINT_SELECT} WHERE id = ?"))
            .bind(endpoint_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_endpoint(&r)).transpose()
    }

    pub async fn list_enabled_endpoints(&self) -> Result<Vec<ServiceEndpoint>> {
        let rows = sqlx::query(&format!("{ENDPOINT_SELECT} WHERE enabled = 1 ORDER BY name"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_endpoint).collect()
    }

    pub async fn list_endpoints_for_system(&self, system_id: &str) -> Result<Vec<ServiceEndpoint>> {
        let rows = sqlx::query(&format!(
            "{ENDPOINT_SELECT} WHERE system_id = ? ORDER BY name"
        ))
        .bind(system_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_endpoint).collect()
    }
}

const ENDPOINT_SELECT: &str =
    "SELECT id, system_id, name, description, method, path, path_params, query_params,
            request_body, when_to_use, examples, risk_level, required_permissions,
            timeout_seconds, enabled, tags
     FROM service_endpoints";

use serde_json::Value;

fn row_to_system(row: &sqlx::sqlite::SqliteRow) -> Result<ExternalSystem> {
    let auth_config: String = row.get("auth_config");
    let tags: String = row.get("tags");
    let status: String = row.get("status");
    let metadata: String = row.get("metadata");
    Ok(ExternalSystem {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        base_url: row.get("base_url"),
        auth_config: serde_json::from_str(&auth_config)?,
        health_check_path: row.get("health_check_path"),
        tags: serde_json::from_str(&tags)?,
        status: serde_json::from_value(Value::String(status))?,
        metadata: serde_json::from_str(&metadata).unwrap_or(Value::Null),
    })
}

fn row_to_endpoint(row: &sqlx::sqlite::SqliteRow) -> Result<ServiceEndpoint> {
    let method: String = row.get("method");
    let risk_level: String = row.get("risk_level");
    let path_params: Option<String> = row.get("path_params");
    let query_params: Option<String> = row.get("query_params");
    let request_body: Option<String> = row.get("request_body");
    let examples: String = row.get("examples");
    let required_permissions: String = row.get("required_permissions");
    let tags: String = row.get("tags");
    Ok(ServiceEndpoint {
        id: row.get("id"),
        system_id: row.get("system_id"),
        name: row.get("name"),
        description: row.get("description"),
        method: serde_json::from_value(Value::String(method))?,
        path: row.get("path"),
        path_params: path_params.map(|p| serde_json::from_str(&p)).transpose()?,
        query_params: query_params.map(|p| serde_json::from_str(&p)).transpose()?,
        request_body: request_body.map(|b| serde_json::from_str(&b)).transpose()?,
        when_to_use: row.get("when_to_use"),
        examples: serde_json::from_str(&examples)?,
        risk_level: serde_json::from_value(Value::String(risk_level))?,
        required_permissions: serde_json::from_str(&required_permissions)?,
        timeout_seconds: row.get("timeout_seconds"),
        enabled: row.get("enabled"),
        tags: serde_json::from_str(&tags)?,
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::catalog::models::*;
    use serde_json::Value;

    pub(crate) fn sample_system(id: &str) -> ExternalSystem {
        ExternalSystem {
            id: id.to_string(),
            name: format!("System {id}"),
            description: "CRM".to_string(),
            base_url: "https://crm.example.com".to_string(),
            auth_config: AuthConfig {
                auth_type: AuthType::Bearer,
                credential_id: format!("cred-{id}"),
                token_url: None,
                scopes: None,
                auth_headers: None,
            },
            health_check_path: None,
            tags: vec!["crm".to_string()],
            status: SystemStatus::Active,
            metadata: Value::Null,
        }
    }

    pub(crate) fn sample_endpoint(id: &str, system_id: &str, risk: RiskLevel) -> ServiceEndpoint {
        ServiceEndpoint {
            id: id.to_string(),
            system_id: system_id.to_string(),
            name: format!("endpoint_{id}"),
            description: "Look up a customer".to_string(),
            method: HttpMethod::GET,
            path: "/customers/{id}".to_string(),
            path_params: None,
            query_params: None,
            request_body: None,
            when_to_use: "When the user asks about a customer".to_string(),
            examples: vec!["who is customer 7".to_string()],
            risk_level: risk,
            required_permissions: vec!["crm:read".to_string()],
            timeout_seconds: 30.0,
            enabled: true,
            tags: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{sample_endpoint, sample_system};
    use super::*;
    use crate::catalog::models::{AuthType, RiskLevel, SystemStatus};
    use crate::db::test_pool;

    #[tokio::test]
    async fn system_round_trip() {
        let repo = CatalogRepository::new(test_pool().await);
        repo.upsert_system(&sample_system("sys1")).await.unwrap();
        let loaded = repo.get_system("sys1").await.unwrap().unwrap();
        assert_eq!(loaded.auth_config.auth_type, AuthType::Bearer);
        assert_eq!(loaded.status, SystemStatus::Active);
    }

    #[tokio::test]
    async fn deleting_system_cascades_to_endpoints() {
        let repo = CatalogRepository::new(test_pool().await);
        repo.upsert_system(&sample_system("sys1")).await.unwrap();
        repo.upsert_endpoint(&sample_endpoint("ep1", "sys1", RiskLevel::Read))
            .await
            .unwrap();

        assert!(repo.delete_system("sys1").await.unwrap());
        assert!(repo.get_endpoint("ep1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn disabled_endpoints_are_filtered() {
        let repo = CatalogRepository::new(test_pool().await);
        repo.upsert_system(&sample_system("sys1")).await.unwrap();
        let mut endpoint = sample_endpoint("ep1", "sys1", RiskLevel::Read);
        repo.upsert_endpoint(&endpoint).await.unwrap();
        endpoint.id = "ep2".to_string();
        endpoint.enabled = false;
        repo.upsert_endpoint(&endpoint).await.unwrap();

        let enabled = repo.list_enabled_endpoints().await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id, "ep1");
    }
}
