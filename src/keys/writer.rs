//! Key creation and deletion.
//!
//! Only string and hash keys can be created. A TTL is applied with a
//! separate `EXPIRE` after the write, so a failure in between leaves the key
//! without expiry.

use super::types::CreateKeyRequest;
use crate::client::StoreClient;
use crate::error::{MonitorError, Result};
use crate::protocol::Command;
use serde_json::Value as Json;
use tracing::{debug, info};

/// Creates and deletes keys.
#[derive(Debug, Clone)]
pub struct KeyWriter {
    client: StoreClient,
}

impl KeyWriter {
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }

    /// Validates `request` and writes the key, then its TTL if one was given.
    pub async fn create(&self, request: &CreateKeyRequest) -> Result<()> {
        let write = build_write(request)?;
        let ttl = match request.ttl {
            Some(ttl) if ttl <= 0 => {
                return Err(MonitorError::bad_request("'ttl' must be a positive integer"))
            }
            other => other,
        };

        let mut conn = self.client.connect().await?;
        conn.exec(&write)
            .await
            .map_err(|e| MonitorError::from(e).context("Error creating key"))?;

        if let Some(ttl) = ttl {
            let name = request.name.as_deref().unwrap_or_default();
            conn.exec(&Command::new("EXPIRE").arg(name).arg(ttl))
                .await
                .map_err(|e| MonitorError::from(e).context("Error creating key"))?;
        }

        info!(key = ?request.name, command = write.name(), ttl = ?ttl, "Created key");
        Ok(())
    }

    /// Deletes `name`; `NotFound` when nothing was removed.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let mut conn = self.client.connect().await?;
        let removed = conn
            .query_int(&Command::new("DEL").arg(name))
            .await
            .map_err(|e| MonitorError::from(e).context("Error deleting key"))?;

        if removed == 0 {
            return Err(MonitorError::not_found(format!("Key '{}' not found", name)));
        }
        debug!(key = %name, "Deleted key");
        Ok(())
    }
}

/// Turns a request into the SET or HSET that writes it.
fn build_write(request: &CreateKeyRequest) -> Result<Command> {
    let name = request.name.as_deref().filter(|n| !n.is_empty());
    let value = request.value.as_ref().filter(|v| !v.is_null());
    let (Some(name), Some(value)) = (name, value) else {
        return Err(MonitorError::bad_request("Both 'name' and 'value' are required"));
    };

    match request.key_type.as_deref().unwrap_or("string") {
        "string" => {
            let text = scalar_text(value).ok_or_else(|| {
                MonitorError::bad_request("'value' must be a string or number for string type")
            })?;
            Ok(Command::new("SET").arg(name).arg(text))
        }
        "hash" => {
            let fields = value.as_object().ok_or_else(|| {
                MonitorError::bad_request("'value' must be a JSON object for hash type")
            })?;
            if fields.is_empty() {
                return Err(MonitorError::bad_request(
                    "'value' must not be empty for hash type",
                ));
            }
            let mut command = Command::new("HSET").arg(name);
            for (field, value) in fields {
                let text = scalar_text(value).ok_or_else(|| {
                    MonitorError::bad_request(format!("Field '{}' must hold a scalar value", field))
                })?;
                command = command.arg(field).arg(text);
            }
            Ok(command)
        }
        other => Err(MonitorError::bad_request(format!("Unsupported type '{}'", other))),
    }
}

fn scalar_text(value: &Json) -> Option<String> {
    match value {
        Json::String(s) => Some(s.clone()),
        Json::Number(n) => Some(n.to_string()),
        Json::Bool(b) => Some(b.to_string()),
        Json::Null | Json::Array(_) | Json::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockStore;
    use crate::config::StoreConfig;
    use crate::keys::reader::ValueReader;
    use serde_json::json;

    fn client_for(store: &MockStore) -> StoreClient {
        StoreClient::new(StoreConfig::with_url(store.url())).unwrap()
    }

    fn request(body: serde_json::Value) -> CreateKeyRequest {
        serde_json::from_value(body).unwrap()
    }

    #[tokio::test]
    async fn test_create_string_defaults_type() {
        let store = MockStore::start().await;
        let writer = KeyWriter::new(client_for(&store));
        writer.create(&request(json!({"name": "greeting", "value": "hi"}))).await.unwrap();

        let envelope = ValueReader::new(client_for(&store)).read("greeting").await.unwrap();
        assert_eq!(envelope.value.as_str(), Some("hi"));
        assert_eq!(envelope.ttl, -1);
    }

    #[tokio::test]
    async fn test_create_hash() {
        let store = MockStore::start().await;
        let writer = KeyWriter::new(client_for(&store));
        writer
            .create(&request(json!({"name": "user:1", "type": "hash", "value": {"name": "ada", "age": 36}})))
            .await
            .unwrap();
        assert_eq!(store.hash_field("user:1", "name").as_deref(), Some("ada"));
        assert_eq!(store.hash_field("user:1", "age").as_deref(), Some("36"));
    }

    #[tokio::test]
    async fn test_create_with_ttl() {
        let store = MockStore::start().await;
        let writer = KeyWriter::new(client_for(&store));
        writer.create(&CreateKeyRequest::string("probe", "1").with_ttl(60)).await.unwrap();

        let envelope = ValueReader::new(client_for(&store)).read("probe").await.unwrap();
        assert!(envelope.ttl > 0 && envelope.ttl <= 60);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_requests() {
        let store = MockStore::start().await;
        let writer = KeyWriter::new(client_for(&store));

        let cases = [
            json!({"value": "v"}),
            json!({"name": "k"}),
            json!({"name": "", "value": "v"}),
            json!({"name": "k", "type": "zset", "value": "v"}),
            json!({"name": "k", "type": "hash", "value": "not-a-map"}),
            json!({"name": "k", "type": "hash", "value": {}}),
            json!({"name": "k", "value": [1, 2]}),
            json!({"name": "k", "value": "v", "ttl": 0}),
        ];
        for body in cases {
            let err = writer.create(&request(body.clone())).await.unwrap_err();
            assert!(matches!(err, MonitorError::BadRequest(_)), "{body} should be rejected");
        }
        assert!(!store.contains("k"));
    }

    #[tokio::test]
    async fn test_delete_then_read_is_not_found() {
        let store = MockStore::start().await;
        store.set_string("doomed", "x");
        let writer = KeyWriter::new(client_for(&store));

        writer.delete("doomed").await.unwrap();
        let err = ValueReader::new(client_for(&store)).read("doomed").await.unwrap_err();
        assert!(matches!(err, MonitorError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_absent_key() {
        let store = MockStore::start().await;
        let err = KeyWriter::new(client_for(&store)).delete("ghost").await.unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.body().detail, "Key 'ghost' not found");
    }

    #[tokio::test]
    async fn test_write_over_wrong_type_is_internal() {
        let store = MockStore::start().await;
        store.push_list("l", &["x"]);
        let err = KeyWriter::new(client_for(&store))
            .create(&request(json!({"name": "l", "type": "hash", "value": {"a": "b"}})))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.body().detail, "Error creating key");
    }
}
