// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Provider instances and credentials.
//!
//! A [`ProviderInstance`] is a named, credentialed realization of a catalog
//! provider type (spec §3 `ProviderInstance`, §6 `provider-instances.json`).
//! Instances are stored in `<data-dir>/provider-instances.json`; each
//! instance's [`Credential`] is stored separately in
//! `<data-dir>/credentials/<id>.json` with file mode `0600` so API keys
//! never land in the same file as non-secret configuration.
//!
//! Both files are written atomically (write-temp-then-rename), matching the
//! teacher's existing atomic-write discipline for config files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("provider instance {0:?} not found")]
    NotFound(String),
    #[error("credential for instance {0:?} is invalid: apiKey must be non-empty")]
    InvalidCredential(String),
}

pub type Result<T> = std::result::Result<T, InstanceError>;

/// Env var that, when set, overrides the per-user data directory (spec §6).
pub const DATA_DIR_ENV: &str = "LACE_DIR";

/// Root data directory: `$LACE_DIR` if set, else the platform user-data dir.
pub fn data_dir() -> PathBuf {
    if let Some(over) = std::env::var_os(DATA_DIR_ENV) {
        return PathBuf::from(over);
    }
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("sven")
}

/// Retry policy for a provider instance's outbound requests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InstanceRetryPolicy {
    #[serde(default = "default_initial_ms")]
    pub initial_ms: u64,
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_initial_ms() -> u64 {
    1000
}
fn default_max_ms() -> u64 {
    30_000
}
fn default_max_attempts() -> u32 {
    10
}

impl Default for InstanceRetryPolicy {
    fn default() -> Self {
        Self {
            initial_ms: default_initial_ms(),
            max_ms: default_max_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl From<InstanceRetryPolicy> for crate::retry::RetryPolicy {
    fn from(p: InstanceRetryPolicy) -> Self {
        crate::retry::RetryPolicy {
            initial: Duration::from_millis(p.initial_ms),
            max: Duration::from_millis(p.max_ms),
            max_attempts: p.max_attempts,
        }
    }
}

/// A named, credentialed realization of a catalog provider type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInstance {
    pub id: String,
    pub display_name: String,
    /// Matches a [`crate::catalog::ModelCatalogEntry::provider`] or a
    /// shipped/user catalog entry id.
    pub catalog_provider_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Request timeout in milliseconds. `None`/`0` means no overall deadline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub retry_policy: InstanceRetryPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Credential {
    pub api_key: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub additional_auth: HashMap<String, String>,
}

impl Credential {
    pub fn validate(&self, instance_id: &str) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(InstanceError::InvalidCredential(instance_id.to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct InstancesFile {
    version: String,
    instances: HashMap<String, ProviderInstance>,
}

fn default_instances_file() -> InstancesFile {
    InstancesFile {
        version: "1.0".to_string(),
        instances: HashMap::new(),
    }
}

/// Manages `provider-instances.json` and `credentials/<id>.json` under a
/// data directory. Read-mostly; mutations go through [`Self::save_instance`]
/// / [`Self::save_credential`] and refresh the in-memory cache atomically.
#[derive(Debug)]
pub struct InstanceManager {
    root: PathBuf,
    instances: HashMap<String, ProviderInstance>,
}

impl InstanceManager {
    /// Load (or lazily initialize) the manager from `root`.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let path = root.join("provider-instances.json");
        let file = if path.is_file() {
            read_json(&path)?
        } else {
            default_instances_file()
        };
        Ok(Self {
            root,
            instances: file.instances,
        })
    }

    /// Load from the default [`data_dir`].
    pub fn load_default() -> Result<Self> {
        Self::load(data_dir())
    }

    fn instances_path(&self) -> PathBuf {
        self.root.join("provider-instances.json")
    }

    fn credential_path(&self, id: &str) -> PathBuf {
        self.root.join("credentials").join(format!("{id}.json"))
    }

    pub fn list(&self) -> impl Iterator<Item = &ProviderInstance> {
        self.instances.values()
    }

    pub fn get(&self, id: &str) -> Option<&ProviderInstance> {
        self.instances.get(id)
    }

    /// Find the first instance whose `catalog_provider_id` matches `provider_type`
    /// and that has a saved credential, preferring one literally named `default`.
    pub fn default_for_type(&self, provider_type: &str) -> Option<&ProviderInstance> {
        let matches: Vec<&ProviderInstance> = self
            .instances
            .values()
            .filter(|i| i.catalog_provider_id == provider_type)
            .filter(|i| self.has_credential(&i.id))
            .collect();
        matches
            .iter()
            .find(|i| i.id == "default" || i.display_name.eq_ignore_ascii_case("default"))
            .copied()
            .or_else(|| matches.first().copied())
    }

    pub fn has_credential(&self, id: &str) -> bool {
        self.credential_path(id).is_file()
    }

    pub fn load_credential(&self, id: &str) -> Result<Credential> {
        let path = self.credential_path(id);
        if !path.is_file() {
            return Err(InstanceError::NotFound(id.to_string()));
        }
        read_json(&path)
    }

    /// Persist an instance definition and refresh the in-memory cache.
    pub fn save_instance(&mut self, instance: ProviderInstance) -> Result<()> {
        self.instances
            .insert(instance.id.clone(), instance.clone());
        let file = InstancesFile {
            version: "1.0".to_string(),
            instances: self.instances.clone(),
        };
        write_json_atomic(&self.instances_path(), &file)
    }

    pub fn remove_instance(&mut self, id: &str) -> Result<()> {
        self.instances.remove(id);
        let file = InstancesFile {
            version: "1.0".to_string(),
            instances: self.instances.clone(),
        };
        write_json_atomic(&self.instances_path(), &file)
    }

    /// Validate and persist a credential for `id` with `0600` permissions.
    pub fn save_credential(&self, id: &str, credential: &Credential) -> Result<()> {
        credential.validate(id)?;
        let path = self.credential_path(id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| InstanceError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        write_json_atomic(&path, credential)?;
        set_owner_only(&path)?;
        Ok(())
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).map_err(|source| InstanceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| InstanceError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `value` to `path` atomically: serialize to a sibling temp file,
/// then rename over the destination. A reader never observes a partial file.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|source| InstanceError::Io {
        path: parent.to_path_buf(),
        source,
    })?;
    let text = serde_json::to_string_pretty(value).map_err(|source| InstanceError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, text).map_err(|source| InstanceError::Io {
        path: tmp.clone(),
        source,
    })?;
    std::fs::rename(&tmp, path).map_err(|source| InstanceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

#[cfg(unix)]
fn set_owner_only(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(0o600);
    std::fs::set_permissions(path, perms).map_err(|source| InstanceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(not(unix))]
fn set_owner_only(_path: &Path) -> Result<()> {
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(id: &str, provider: &str) -> ProviderInstance {
        ProviderInstance {
            id: id.to_string(),
            display_name: id.to_string(),
            catalog_provider_id: provider.to_string(),
            endpoint: None,
            timeout_ms: None,
            retry_policy: InstanceRetryPolicy::default(),
        }
    }

    #[test]
    fn save_and_load_instance_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = InstanceManager::load(dir.path()).unwrap();
        mgr.save_instance(instance("inst1", "anthropic")).unwrap();

        let reloaded = InstanceManager::load(dir.path()).unwrap();
        assert_eq!(
            reloaded.get("inst1").unwrap().catalog_provider_id,
            "anthropic"
        );
    }

    #[test]
    fn missing_instances_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = InstanceManager::load(dir.path()).unwrap();
        assert_eq!(mgr.list().count(), 0);
    }

    #[test]
    fn save_credential_rejects_empty_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = InstanceManager::load(dir.path()).unwrap();
        let cred = Credential {
            api_key: "".to_string(),
            additional_auth: HashMap::new(),
        };
        assert!(mgr.save_credential("inst1", &cred).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn save_credential_sets_0600_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let mgr = InstanceManager::load(dir.path()).unwrap();
        let cred = Credential {
            api_key: "sk-test".to_string(),
            additional_auth: HashMap::new(),
        };
        mgr.save_credential("inst1", &cred).unwrap();
        let meta = std::fs::metadata(dir.path().join("credentials/inst1.json")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn load_credential_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = InstanceManager::load(dir.path()).unwrap();
        let cred = Credential {
            api_key: "sk-test".to_string(),
            additional_auth: HashMap::new(),
        };
        mgr.save_credential("inst1", &cred).unwrap();
        let loaded = mgr.load_credential("inst1").unwrap();
        assert_eq!(loaded.api_key, "sk-test");
    }

    #[test]
    fn default_for_type_prefers_instance_named_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = InstanceManager::load(dir.path()).unwrap();
        mgr.save_instance(instance("work", "anthropic")).unwrap();
        mgr.save_instance(instance("default", "anthropic")).unwrap();
        for id in ["work", "default"] {
            mgr.save_credential(
                id,
                &Credential {
                    api_key: "k".to_string(),
                    additional_auth: HashMap::new(),
                },
            )
            .unwrap();
        }
        let chosen = mgr.default_for_type("anthropic").unwrap();
        assert_eq!(chosen.id, "default");
    }

    #[test]
    fn default_for_type_skips_instances_without_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = InstanceManager::load(dir.path()).unwrap();
        mgr.save_instance(instance("nocred", "openai")).unwrap();
        assert!(mgr.default_for_type("openai").is_none());
    }

    #[test]
    fn remove_instance_drops_it_from_cache_and_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut mgr = InstanceManager::load(dir.path()).unwrap();
        mgr.save_instance(instance("inst1", "anthropic")).unwrap();
        mgr.remove_instance("inst1").unwrap();
        assert!(mgr.get("inst1").is_none());
        let reloaded = InstanceManager::load(dir.path()).unwrap();
        assert!(reloaded.get("inst1").is_none());
    }

    #[test]
    fn data_dir_respects_lace_dir_override() {
        std::env::set_var(DATA_DIR_ENV, "/tmp/sven-test-lace-dir");
        assert_eq!(data_dir(), PathBuf::from("/tmp/sven-test-lace-dir"));
        std::env::remove_var(DATA_DIR_ENV);
    }
}
