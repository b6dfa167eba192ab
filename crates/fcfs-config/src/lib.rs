//! Layered YAML configuration for the booking server and outbox dispatcher.
//!
//! Files are merged in order (later overrides earlier via deep-merge), then
//! canonicalized to JSON and hashed so startup logs can pin the exact config
//! a process booted with. Secrets never live in these files: the database URL
//! and the webhook signing secret come from the environment
//! (`FCFS_DATABASE_URL`, `FCFS_WEBHOOK_SECRET`).

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

pub const ENV_WEBHOOK_SECRET: &str = "FCFS_WEBHOOK_SECRET";

/// Colon-separated list of YAML files, merged left to right.
pub const ENV_CONFIG_PATHS: &str = "FCFS_CONFIG";

/// Typed view of the merged configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FcfsConfig {
    pub server: ServerSettings,
    pub dispatcher: DispatcherSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatcherSettings {
    pub batch_size: i64,
    pub poll_interval_secs: u64,
    pub max_retries: i32,
    /// Delay before the r-th retry is `retry_schedule_secs[r-1]`, clamped to
    /// the last entry.
    pub retry_schedule_secs: Vec<i64>,
    /// Outbox `target` tag this dispatcher drains.
    pub target_tag: String,
    pub target_url: String,
    pub http_timeout_secs: u64,
    /// How long a claimed batch row stays invisible to other dispatchers.
    pub lease_secs: i64,
}

impl Default for FcfsConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            dispatcher: DispatcherSettings::default(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            poll_interval_secs: 5,
            max_retries: 5,
            retry_schedule_secs: vec![60, 300, 900, 3600, 21600],
            target_tag: "dandori".to_string(),
            target_url: "http://127.0.0.1:9099/webhooks/fcfs".to_string(),
            http_timeout_secs: 30,
            lease_secs: 120,
        }
    }
}

impl FcfsConfig {
    /// Read the webhook signing secret from the environment.
    pub fn webhook_secret_from_env() -> Result<String> {
        std::env::var(ENV_WEBHOOK_SECRET)
            .with_context(|| format!("missing env var {ENV_WEBHOOK_SECRET}"))
    }

    fn validate(&self) -> Result<()> {
        if self.dispatcher.batch_size <= 0 {
            return Err(anyhow!("dispatcher.batch_size must be > 0"));
        }
        if self.dispatcher.max_retries < 0 {
            return Err(anyhow!("dispatcher.max_retries must be >= 0"));
        }
        if self.dispatcher.retry_schedule_secs.is_empty() {
            return Err(anyhow!("dispatcher.retry_schedule_secs must not be empty"));
        }
        if self.dispatcher.retry_schedule_secs.iter().any(|d| *d <= 0) {
            return Err(anyhow!("dispatcher.retry_schedule_secs entries must be > 0"));
        }
        if self.dispatcher.lease_secs <= 0 {
            return Err(anyhow!("dispatcher.lease_secs must be > 0"));
        }
        Ok(())
    }
}

/// Merged + hashed configuration as loaded from disk.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: FcfsConfig,
    pub canonical_json: String,
    pub config_hash: String,
}

/// Load + merge YAML files in order, then canonicalize to JSON and hash.
/// Later files override earlier files via deep-merge. An empty path list
/// yields the built-in defaults (hash of the canonical default document).
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut merged =
        serde_json::to_value(FcfsConfig::default()).context("serialize default config")?;

    for p in paths {
        let s = fs::read_to_string(p).with_context(|| format!("read config: {p}"))?;
        let yaml_val: serde_yaml::Value =
            serde_yaml::from_str(&s).with_context(|| format!("parse yaml: {p}"))?;
        let json_val = serde_json::to_value(yaml_val).context("yaml->json conversion failed")?;
        merge_into(&mut merged, json_val);
    }

    let canonical =
        serde_json::to_string(&sorted_copy(&merged)).context("canonicalize config")?;

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = hex::encode(hasher.finalize());

    let config: FcfsConfig =
        serde_json::from_str(&canonical).context("merged config does not match schema")?;
    config.validate()?;

    Ok(LoadedConfig {
        config,
        canonical_json: canonical,
        config_hash: hash,
    })
}

/// Load from the files named in `FCFS_CONFIG` (colon-separated), or the
/// built-in defaults when the variable is absent.
pub fn load_from_env() -> Result<LoadedConfig> {
    match std::env::var(ENV_CONFIG_PATHS) {
        Ok(paths) => {
            let parts: Vec<&str> = paths.split(':').filter(|p| !p.is_empty()).collect();
            load_layered_yaml(&parts)
        }
        Err(_) => load_layered_yaml(&[]),
    }
}

/// Fold `src` into `dst`. Only object-into-object merges key-by-key; an
/// array or scalar on the override side replaces the base value wholesale.
fn merge_into(dst: &mut Value, src: Value) {
    match (dst.as_object_mut(), src) {
        (Some(fields), Value::Object(overrides)) => {
            for (key, value) in overrides {
                merge_into(fields.entry(key).or_insert(Value::Null), value);
            }
        }
        (_, value) => *dst = value,
    }
}

/// Copy of `v` with object keys in sorted order at every nesting level, so
/// the compact serialization (and therefore the config hash) does not depend
/// on file layout or merge order.
fn sorted_copy(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by_key(|(key, _)| key.as_str());
            entries
                .into_iter()
                .map(|(key, value)| (key.clone(), sorted_copy(value)))
                .collect::<serde_json::Map<_, _>>()
                .into()
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted_copy).collect()),
        scalar => scalar.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_yaml(dir: &tempfile::TempDir, name: &str, content: &str) -> String {
        let path = dir.path().join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn defaults_load_without_any_files() {
        let loaded = load_layered_yaml(&[]).unwrap();
        assert_eq!(loaded.config.dispatcher.max_retries, 5);
        assert_eq!(
            loaded.config.dispatcher.retry_schedule_secs,
            vec![60, 300, 900, 3600, 21600]
        );
        assert_eq!(loaded.config_hash.len(), 64);
    }

    #[test]
    fn later_file_overrides_earlier_and_hash_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let base = write_yaml(&dir, "base.yaml", "dispatcher:\n  batch_size: 10\n");
        let over = write_yaml(&dir, "override.yaml", "dispatcher:\n  batch_size: 25\n");

        let a = load_layered_yaml(&[base.as_str(), over.as_str()]).unwrap();
        assert_eq!(a.config.dispatcher.batch_size, 25);
        // Deep-merge: untouched keys keep their defaults.
        assert_eq!(a.config.dispatcher.poll_interval_secs, 5);

        let b = load_layered_yaml(&[base.as_str(), over.as_str()]).unwrap();
        assert_eq!(a.config_hash, b.config_hash);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let bad = write_yaml(&dir, "bad.yaml", "dispatcher:\n  batch_sise: 10\n");
        assert!(load_layered_yaml(&[bad.as_str()]).is_err());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let bad = write_yaml(&dir, "bad.yaml", "dispatcher:\n  batch_size: 0\n");
        assert!(load_layered_yaml(&[bad.as_str()]).is_err());

        let bad2 = write_yaml(&dir, "bad2.yaml", "dispatcher:\n  retry_schedule_secs: []\n");
        assert!(load_layered_yaml(&[bad2.as_str()]).is_err());
    }
}
