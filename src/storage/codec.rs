use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Result;
use crate::VersionedStore;

/// Read and decode a JSON document
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn VersionedStore,
    key: &str,
) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Encode and write a JSON document
pub async fn set_json<T: Serialize + Sync>(
    store: &dyn VersionedStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    store.set(key, bytes, ttl).await
}
