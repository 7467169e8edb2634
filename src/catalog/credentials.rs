// Credential storage. Plaintext secrets never touch the database; values are
// sealed with AES-256-GCM under the deployment's encryption key.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use base64::Engine;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};

use crate::catalog::models::Credential;
use crate::error::{DeskError, Result};

const NONCE_LEN: usize = 12;

#[derive(Clone)]
pub struct CredentialStore {
    pool: SqlitePool,
    cipher: Aes256Gcm,
}

impl CredentialStore {
    /// The key material is hashed to the AES-256 key size, so any non-empty
    /// passphrase works as `FLYDESK_CREDENTIAL_ENCRYPTION_KEY`.
    pub fn new(pool: SqlitePool, encryption_key: &str) -> Result<Self> {
        if encryption_key.is_empty() {
            return Err(DeskError::Configuration(
                "credential encryption key must not be empty".into(),
            ));
        }
        let digest = Sha256::digest(encryption_key.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(&digest);
        Ok(Self {
            pool,
            cipher: Aes256Gcm::new(key),
        })
    }

    fn seal(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| DeskError::Configuration(format!("credential encryption failed: {e}")))?;
        let mut sealed = nonce.to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(base64::engine::general_purpose::STANDARD.encode(sealed))
    }

    fn open(&self, sealed: &str) -> Result<String> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(sealed)
            .map_err(|e| DeskError::Validation(format!("invalid sealed credential: {e}")))?;
        if raw.len() < NONCE_LEN {
            return Err(DeskError::Validation("sealed credential too short".into()));
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| DeskError::Validation(format!("credential decryption failed: {e}")))?;
        String::from_utf8(plaintext)
            .map_err(|e| DeskError::Validation(format!("credential is not utf-8: {e}")))
    }

    /// Store a credential, encrypting the plaintext value.
    pub async fn store(
        &self,
        system_id: &str,
        name: &str,
        plaintext_value: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Credential> {
        let credential = Credential {
            id: uuid::Uuid::new_v4().to_string(),
            system_id: system_id.to_string(),
            name: name.to_string(),
            encrypted_value: self.seal(plaintext_value)?,
            credential_type: "token".to_string(),
            expires_at,
            last_rotated: Some(Utc::now()),
        };
        sqlx::query(
            "INSERT INTO credentials (id, system_id, name, encrypted_value, credential_type, expires_at, last_rotated)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&credential.id)
        .bind(&credential.system_id)
        .bind(&credential.name)
        .bind(&credential.encrypted_value)
        .bind(&credential.credential_type)
        .bind(credential.expires_at.map(|t| t.to_rfc3339()))
        .bind(credential.last_rotated.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(credential)
    }

    /// Fetch and decrypt the credential value, or None if unknown.
    pub async fn get_token(&self, credential_id: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT encrypted_value FROM credentials WHERE id = ?")
            .bind(credential_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(r) => {
                let sealed: String = r.get("encrypted_value");
                Ok(Some(self.open(&sealed)?))
            }
            None => Ok(None),
        }
    }

    pub async fn delete(&self, credential_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM credentials WHERE id = ?")
            .bind(credential_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_for_system(&self, system_id: &str) -> Result<Vec<Credential>> {
        let rows = sqlx::query(
            "SELECT id, system_id, name, encrypted_value, credential_type, expires_at, last_rotated
             FROM credentials WHERE system_id = ?",
        )
        .bind(system_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(Credential {
                    id: row.get("id"),
                    system_id: row.get("system_id"),
                    name: row.get("name"),
                    encrypted_value: row.get("encrypted_value"),
                    credential_type: row.get("credential_type"),
                    expires_at: row
                        .get::<Option<String>, _>("expires_at")
                        .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
                        .map(|t| t.with_timezone(&Utc)),
                    last_rotated: row
                        .get::<Option<String>, _>("last_rotated")
                        .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
                        .map(|t| t.with_timezone(&Utc)),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn stored_value_is_encrypted_at_rest() {
        let store = CredentialStore::new(test_pool().await, "test-key").unwrap();
        let credential = store.store("sys1", "api token", "s3cret", None).await.unwrap();

        assert_ne!(credential.encrypted_value, "s3cret");
        assert!(!credential.encrypted_value.contains("s3cret"));

        let token = store.get_token(&credential.id).await.unwrap();
        assert_eq!(token.as_deref(), Some("s3cret"));
    }

    #[tokio::test]
    async fn unknown_credential_is_none() {
        let store = CredentialStore::new(test_pool().await, "test-key").unwrap();
        assert!(store.get_token("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_key_is_rejected() {
        assert!(CredentialStore::new(test_pool().await, "").is_err());
    }
}
