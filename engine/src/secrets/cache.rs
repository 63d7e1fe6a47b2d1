use crate::secrets::string::SecretString;
use crate::secrets::SecretManager;
use sdk::errors::EngineError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Process-wide cache in front of `SecretManager`.
///
/// Every persona resolves its bot token and the shared API key through one
/// cache, so the keychain is consulted once per key.
#[derive(Clone)]
pub struct SecretCache {
    manager: Arc<SecretManager>,
    cache: Arc<RwLock<HashMap<String, SecretString>>>,
}

impl SecretCache {
    pub fn new(manager: Arc<SecretManager>) -> Self {
        Self {
            manager,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Retrieves a secret, checking the memory cache first.
    pub fn get_secret(&self, key: &str) -> Result<SecretString, EngineError> {
        {
            let cache = self
                .cache
                .read()
                .map_err(|_| EngineError::KeyringError("secret cache lock poisoned".to_string()))?;
            if let Some(secret) = cache.get(key) {
                return Ok(secret.clone());
            }
        }

        let secret = SecretString::new(self.manager.get_secret(key)?);

        {
            let mut cache = self
                .cache
                .write()
                .map_err(|_| EngineError::KeyringError("secret cache lock poisoned".to_string()))?;
            cache.insert(key.to_string(), secret.clone());
        }

        Ok(secret)
    }

    /// Resolve a set of keys up front so a missing token fails at startup
    /// rather than on the first send.
    pub fn preload(&self, keys: &[&str]) -> Result<(), EngineError> {
        for key in keys {
            self.get_secret(key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preload_resolves_every_key() {
        std::env::set_var("CHORUS_CACHE_TEST_API_KEY", "sk-cached");
        std::env::set_var("CHORUS_CACHE_TEST_BOT_TOKEN", "bot");
        let cache = SecretCache::new(Arc::new(SecretManager::new("chorus-cache-test")));
        assert!(cache.preload(&["cache_test_api_key", "cache_test_bot_token"]).is_ok());
        assert_eq!(cache.get_secret("cache_test_api_key").unwrap().unsecure(), "sk-cached");
    }

    #[test]
    fn test_cache_reads_through_environment() {
        std::env::set_var("CHORUS_CACHE_TEST_TOKEN", "tok");
        let cache = SecretCache::new(Arc::new(SecretManager::new("chorus-cache-test")));
        assert_eq!(cache.get_secret("cache_test_token").unwrap().unsecure(), "tok");
        std::env::remove_var("CHORUS_CACHE_TEST_TOKEN");
        // Still served from memory after the source is gone
        assert_eq!(cache.get_secret("cache_test_token").unwrap().unsecure(), "tok");
    }

    #[test]
    fn test_preload_fails_on_missing_key() {
        let cache = SecretCache::new(Arc::new(SecretManager::new("chorus-cache-test")));
        assert!(cache.preload(&["no_such_secret_for_preload_7"]).is_err());
    }
}
