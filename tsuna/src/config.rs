//! File-based client configuration.
//!
//! A [`ClientConfig`] describes chains, storage and persistence in TOML:
//!
//! ```toml
//! default_chain = 10
//!
//! [[chains]]
//! id = 1
//!
//! [[chains]]
//! id = 10
//! rpc_url = "https://optimism.example"
//!
//! [[chains]]
//! id = 31337
//! name = "Local"
//! rpc_url = "http://127.0.0.1:8545"
//!
//! [storage]
//! kind = "file"
//! path = "/var/lib/tsuna"
//!
//! [persist]
//! version = 1
//! ```
//!
//! Chains with a well-known id start from the built-in definition; the
//! other fields override it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chain::Chain;
use crate::client::{Client, ClientBuilder};
use crate::error::{Error, Result};
use crate::storage::{ClientStorage, FileStorage, MemoryStorage, NoopStorage, PersistOptions, Storage};

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Chains, in order. Defaults to Ethereum mainnet only.
    #[serde(default = "default_chains")]
    pub chains: Vec<ChainConfig>,

    /// Chain used before anything is connected. Defaults to the first one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_chain: Option<u64>,

    /// Storage backend.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Persistence settings.
    #[serde(default)]
    pub persist: PersistConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            chains: default_chains(),
            default_chain: None,
            storage: StorageConfig::default(),
            persist: PersistConfig::default(),
        }
    }
}

fn default_chains() -> Vec<ChainConfig> {
    vec![ChainConfig::new(1)]
}

/// One configured chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainConfig {
    /// Chain id.
    pub id: u64,
    /// Display name override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// RPC endpoint, tried before the built-in ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
    /// Multicall3 address override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multicall3: Option<Address>,
    /// Testnet flag override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub testnet: Option<bool>,
}

impl ChainConfig {
    /// A chain entry with only an id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self {
            id,
            name: None,
            rpc_url: None,
            multicall3: None,
            testnet: None,
        }
    }

    /// Resolve to a [`Chain`].
    #[must_use]
    pub fn to_chain(&self) -> Chain {
        let mut chain = Chain::from_id(self.id).unwrap_or_else(|| {
            Chain::new(self.id, self.name.clone().unwrap_or_else(|| format!("Chain {}", self.id)))
        });
        if let Some(name) = &self.name {
            chain.name.clone_from(name);
        }
        if let Some(url) = &self.rpc_url {
            chain.rpc_urls.insert(0, url.clone());
        }
        if let Some(address) = self.multicall3 {
            chain.contracts.multicall3 = Some(address);
        }
        if let Some(testnet) = self.testnet {
            chain.testnet = testnet;
        }
        chain
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-process map, lost on exit.
    #[default]
    Memory,
    /// One JSON file per key under `path`.
    File {
        /// Directory holding the files.
        path: PathBuf,
    },
    /// Discard everything.
    None,
}

impl StorageConfig {
    /// Instantiate the backend.
    #[must_use]
    pub fn backend(&self) -> Arc<dyn Storage> {
        match self {
            Self::Memory => Arc::new(MemoryStorage::new()),
            Self::File { path } => Arc::new(FileStorage::new(path.clone())),
            Self::None => Arc::new(NoopStorage),
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersistConfig {
    /// Whether state is hydrated at startup and written on change.
    #[serde(default = "enabled")]
    pub enabled: bool,
    /// Key prefix for every storage entry.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Storage key of the state snapshot.
    #[serde(default = "default_key")]
    pub key: String,
    /// Schema version; bump it to discard older snapshots.
    #[serde(default)]
    pub version: u32,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: default_prefix(),
            key: default_key(),
            version: 0,
        }
    }
}

const fn enabled() -> bool {
    true
}

fn default_prefix() -> String {
    ClientStorage::DEFAULT_PREFIX.to_owned()
}

fn default_key() -> String {
    PersistOptions::default().key
}

impl ClientConfig {
    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the document is not valid.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::config(format!("TOML parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(format!("TOML serialize error: {e}")))
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no chain is configured or a chain id is
    /// repeated, and [`Error::ChainNotConfigured`] if `default_chain` is not
    /// one of the chains.
    pub fn validate(&self) -> Result<()> {
        if self.chains.is_empty() {
            return Err(Error::config("at least one chain must be configured"));
        }
        for (i, chain) in self.chains.iter().enumerate() {
            if self.chains[..i].iter().any(|c| c.id == chain.id) {
                return Err(Error::config(format!("duplicate chain id {}", chain.id)));
            }
        }
        if let Some(id) = self.default_chain
            && !self.chains.iter().any(|c| c.id == id)
        {
            return Err(Error::ChainNotConfigured { chain_id: id });
        }
        Ok(())
    }

    /// Resolved chains, default chain first.
    #[must_use]
    pub fn resolve_chains(&self) -> Vec<Chain> {
        let mut chains: Vec<Chain> = self.chains.iter().map(ChainConfig::to_chain).collect();
        if let Some(id) = self.default_chain
            && let Some(pos) = chains.iter().position(|c| c.id == id)
        {
            let chain = chains.remove(pos);
            chains.insert(0, chain);
        }
        chains
    }

    /// A [`ClientBuilder`] preloaded with chains, storage and persistence.
    /// Add connectors before building.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is not valid.
    pub fn builder(&self) -> Result<ClientBuilder> {
        self.validate()?;
        let builder = Client::builder()
            .chains(self.resolve_chains())
            .storage(self.storage.backend())
            .storage_prefix(self.persist.prefix.clone())
            .persist(PersistOptions {
                key: self.persist.key.clone(),
                version: self.persist.version,
            });
        Ok(if self.persist.enabled {
            builder
        } else {
            builder.without_persistence()
        })
    }
}

/// Load configuration from `path`, or the defaults if it does not exist.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file cannot be read or parsed.
pub async fn load_config_from(path: impl AsRef<Path>) -> Result<ClientConfig> {
    let path = path.as_ref();
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        info!(path = %path.display(), "config file not found, using defaults");
        return Ok(ClientConfig::default());
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::config(format!("failed to read {}: {e}", path.display())))?;
    let config = ClientConfig::from_toml(&content)?;
    debug!(path = %path.display(), chains = config.chains.len(), "loaded config file");
    Ok(config)
}

/// Write configuration to `path`, creating parent directories.
///
/// # Errors
///
/// Returns [`Error::Config`] if serialization or the write fails.
pub async fn save_config_to(config: &ClientConfig, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::config(format!("failed to create {}: {e}", parent.display())))?;
    }
    tokio::fs::write(path, config.to_toml()?)
        .await
        .map_err(|e| Error::config(format!("failed to write {}: {e}", path.display())))?;
    info!(path = %path.display(), "saved config file");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use alloy::primitives::address;

    use super::*;

    mod parse {
        use super::*;

        #[test]
        fn test_empty_document_is_default() {
            let config = ClientConfig::from_toml("").unwrap();
            assert_eq!(config, ClientConfig::default());
            assert_eq!(config.resolve_chains()[0].id, 1);
        }

        #[test]
        fn test_full_document() {
            let config = ClientConfig::from_toml(
                r#"
                default_chain = 31337

                [[chains]]
                id = 1

                [[chains]]
                id = 31337
                name = "Local"
                rpc_url = "http://127.0.0.1:8545"
                multicall3 = "0xcA11bde05977b3631167028862bE2a173976CA11"

                [storage]
                kind = "file"
                path = "/tmp/tsuna"

                [persist]
                version = 3
                "#,
            )
            .unwrap();

            let chains = config.resolve_chains();
            assert_eq!(chains[0].id, 31_337);
            assert_eq!(chains[0].name, "Local");
            assert_eq!(chains[0].default_rpc_url(), Some("http://127.0.0.1:8545"));
            assert_eq!(
                chains[0].contracts.multicall3,
                Some(address!("cA11bde05977b3631167028862bE2a173976CA11"))
            );
            assert_eq!(config.storage, StorageConfig::File { path: "/tmp/tsuna".into() });
            assert_eq!(config.persist.version, 3);
            assert!(config.persist.enabled);
        }

        #[test]
        fn test_rejects_bad_documents() {
            assert!(ClientConfig::from_toml("chains = []").is_err());
            assert!(ClientConfig::from_toml("[[chains]]\nid = 1\n[[chains]]\nid = 1").is_err());
            assert_eq!(
                ClientConfig::from_toml("default_chain = 5").err(),
                Some(Error::ChainNotConfigured { chain_id: 5 })
            );
            assert!(ClientConfig::from_toml("unknown = true").is_err());
        }
    }

    mod build {
        use super::*;

        #[test]
        fn test_builder_applies_settings() {
            let mut config = ClientConfig::default();
            config.chains.push(ChainConfig::new(10));
            config.default_chain = Some(10);
            config.persist.enabled = false;

            let client = config.builder().unwrap().build().unwrap();
            assert_eq!(client.state().chain_id, 10);
            assert_eq!(client.chains().len(), 2);
        }

        #[tokio::test]
        async fn test_save_and_load() {
            let path = std::env::temp_dir()
                .join(format!("tsuna-config-{}", std::process::id()))
                .join("config.toml");
            let mut config = ClientConfig::default();
            config.persist.version = 7;
            save_config_to(&config, &path).await.unwrap();

            let loaded = load_config_from(&path).await.unwrap();
            assert_eq!(loaded, config);
            tokio::fs::remove_file(&path).await.unwrap();
        }

        #[tokio::test]
        async fn test_missing_file_yields_defaults() {
            let loaded = load_config_from("/nonexistent/tsuna/config.toml").await.unwrap();
            assert_eq!(loaded, ClientConfig::default());
        }
    }
}
