use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};

use super::BootstrapError;

/// Salt bytes stored under `key`, from `data` or else `stringData`.
pub fn salt_from_secret(secret: &Secret, key: &str) -> Option<Vec<u8>> {
    if let Some(b) = secret.data.as_ref().and_then(|d| d.get(key)) {
        return Some(b.0.clone());
    }
    secret.string_data.as_ref().and_then(|d| d.get(key)).map(|s| s.as_bytes().to_vec())
}

/// Read the cache path salt from `namespace/name`.
pub async fn hmac_salt(client: Client, namespace: &str, name: &str, key: &str) -> Result<Vec<u8>, BootstrapError> {
    let api: Api<Secret> = Api::namespaced(client, namespace);
    let secret = api.get(name).await.map_err(|source| BootstrapError::Secret {
        namespace: namespace.to_string(),
        name: name.to_string(),
        source,
    })?;
    salt_from_secret(&secret, key).filter(|s| !s.is_empty()).ok_or_else(|| BootstrapError::MissingSecretKey {
        namespace: namespace.to_string(),
        name: name.to_string(),
        key: key.to_string(),
    })
}
