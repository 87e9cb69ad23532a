use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tristat::{
    PARTIES, PartyId,
    domain::{DomainError, Ring},
    seal::{PublicKey, SecretKey},
    triples::DEFAULT_MAX_BATCH,
};
use url::Url;

/// The configuration of a single party.
///
/// All three parties must agree on the `ring` and on the list of `participants`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyConfig {
    /// The index of this party in `participants`.
    pub party: PartyId,
    /// The ring all shares live in.
    #[serde(default)]
    pub ring: Ring,
    /// The key used to open triple shares sealed for this party.
    pub secret_key: SecretKey,
    /// All three parties, in party order.
    pub participants: Vec<Participant>,
    /// The JSON file holding this party's shares. Relative paths are resolved against the
    /// directory of the configuration file.
    pub store: PathBuf,
    /// The maximum number of triples dealt for a single multiplication.
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
}

/// How to reach a party and how to seal data for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// The base URL of the party's server.
    pub url: Url,
    /// The party's public key.
    pub public_key: PublicKey,
}

/// Errors that can occur while loading a [`PartyConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("unable to read config file {}", .path.display())]
    Io {
        /// The path of the configuration file.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },
    /// The configuration file is not valid JSON.
    #[error("invalid config file {}", .path.display())]
    Json {
        /// The path of the configuration file.
        path: PathBuf,
        /// The underlying error.
        source: serde_json::Error,
    },
    /// The number of participants is not three.
    #[error("expected {PARTIES} participants, found {0}")]
    Participants(usize),
    /// The party index is out of range.
    #[error("party {0} is not one of the {PARTIES} participants")]
    Party(PartyId),
    /// The ring is invalid.
    #[error("invalid ring")]
    Ring(#[from] DomainError),
    /// The secret key does not belong to the configured party.
    #[error("secret key does not match the public key of party {0}")]
    KeyMismatch(PartyId),
    /// The triple batch limit is zero.
    #[error("max_batch must be positive")]
    MaxBatch,
}

fn default_max_batch() -> usize {
    DEFAULT_MAX_BATCH
}

impl PartyConfig {
    /// Reads and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: PartyConfig =
            serde_json::from_str(&json).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        if config.store.is_relative() {
            if let Some(dir) = path.parent() {
                config.store = dir.join(&config.store);
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration is consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.participants.len() != PARTIES {
            return Err(ConfigError::Participants(self.participants.len()));
        }
        let Some(own) = self.participants.get(self.party) else {
            return Err(ConfigError::Party(self.party));
        };
        self.ring.validate()?;
        if own.public_key != self.secret_key.public_key() {
            return Err(ConfigError::KeyMismatch(self.party));
        }
        if self.max_batch == 0 {
            return Err(ConfigError::MaxBatch);
        }
        Ok(())
    }

    /// The participants' URLs, in party order.
    pub fn urls(&self) -> Vec<Url> {
        self.participants.iter().map(|p| p.url.clone()).collect()
    }

    /// The participants' public keys, in party order.
    pub fn public_keys(&self) -> Result<[PublicKey; PARTIES], ConfigError> {
        let keys: Vec<PublicKey> = self.participants.iter().map(|p| p.public_key).collect();
        keys.try_into()
            .map_err(|keys: Vec<PublicKey>| ConfigError::Participants(keys.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(party: PartyId) -> PartyConfig {
        let keys: Vec<SecretKey> = (1..=3).map(|i| SecretKey::from_bytes([i; 32])).collect();
        PartyConfig {
            party,
            ring: Ring::Prime { modulus: 1_000_003 },
            secret_key: keys[party.min(2)].clone(),
            participants: keys
                .iter()
                .enumerate()
                .map(|(i, k)| Participant {
                    url: format!("http://127.0.0.1:{}", 8000 + i).parse().unwrap(),
                    public_key: k.public_key(),
                })
                .collect(),
            store: "party.json".into(),
            max_batch: 16,
        }
    }

    #[test]
    fn valid_config() {
        config(1).validate().unwrap();
        let keys = config(1).public_keys().unwrap();
        assert_eq!(keys[2], SecretKey::from_bytes([3; 32]).public_key());
    }

    #[test]
    fn invalid_configs() {
        let mut c = config(0);
        c.participants.pop();
        assert!(matches!(c.validate(), Err(ConfigError::Participants(2))));

        let mut c = config(0);
        c.party = 3;
        assert!(matches!(c.validate(), Err(ConfigError::Party(3))));

        let mut c = config(0);
        c.ring = Ring::Prime { modulus: 0 };
        assert!(matches!(c.validate(), Err(ConfigError::Ring(_))));

        let mut c = config(0);
        c.secret_key = SecretKey::from_bytes([2; 32]);
        assert!(matches!(c.validate(), Err(ConfigError::KeyMismatch(0))));

        let mut c = config(2);
        c.max_batch = 0;
        assert!(matches!(c.validate(), Err(ConfigError::MaxBatch)));
    }

    #[test]
    fn store_path_is_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("party2.json");
        fs::write(&path, serde_json::to_string(&config(2)).unwrap()).unwrap();
        let loaded = PartyConfig::load(&path).unwrap();
        assert_eq!(loaded.store, dir.path().join("party.json"));
        assert_eq!(loaded.urls().len(), 3);
    }

    #[test]
    fn defaults_apply() {
        let mut json = serde_json::to_value(config(0)).unwrap();
        let obj = json.as_object_mut().unwrap();
        obj.remove("ring");
        obj.remove("max_batch");
        let parsed: PartyConfig = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.ring, Ring::Wrapping);
        assert_eq!(parsed.max_batch, DEFAULT_MAX_BATCH);
    }
}
