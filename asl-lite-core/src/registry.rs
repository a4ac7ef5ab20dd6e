//! Compiled artifacts and the machine registry.
//!
//! A compiled machine is content-addressed: `document_version` is the
//! sha-256 of the canonical JSON rendering, so identical graphs publish
//! identical versions.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::RwLock;

use crate::policy::PolicyStatement;

/// Encode bytes as lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().fold(String::new(), |mut acc, b| {
        let _ = write!(acc, "{:02x}", b);
        acc
    })
}

/// Content version key for a canonical document rendering.
pub(crate) fn content_version(json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    hex_encode(&hasher.finalize())
}

/// The output of a successful compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledStateMachine {
    /// Human-readable label the graph was built with.
    pub label: String,
    /// The ASL document.
    pub document: Value,
    /// Canonical JSON rendering of `document`.
    pub json: String,
    /// sha-256 of `json`; the version key.
    pub document_version: String,
    /// Deduplicated permission statements, first-seen order.
    pub statements: Vec<PolicyStatement>,
}

// ── Machine registry ──
// Draft → Published → Retired
// (no backward transitions from Retired)

/// Lifecycle state of a registered machine version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineState {
    Draft,
    Published,
    Retired,
}

/// A versioned registry record: the publish artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineRecord {
    pub machine_key: String,
    pub machine_version: u32,
    pub state: MachineState,
    pub artifact: CompiledStateMachine,
    pub created_at: i64,
    pub published_at: Option<i64>,
}

impl MachineRecord {
    /// New draft record for an artifact.
    pub fn draft(key: impl Into<String>, version: u32, artifact: CompiledStateMachine) -> Self {
        Self {
            machine_key: key.into(),
            machine_version: version,
            state: MachineState::Draft,
            artifact,
            created_at: now_ms(),
            published_at: None,
        }
    }
}

/// Persistence trait for compiled machines.
#[async_trait]
pub trait MachineStore: Send + Sync {
    async fn save(&self, record: &MachineRecord) -> Result<()>;
    async fn load(&self, key: &str, version: u32) -> Result<Option<MachineRecord>>;
    async fn list(&self, key: Option<&str>, state: Option<MachineState>)
        -> Result<Vec<MachineRecord>>;
    async fn set_state(&self, key: &str, version: u32, new_state: MachineState) -> Result<()>;
    async fn load_latest_published(&self, key: &str) -> Result<Option<MachineRecord>>;
}

// ── MemoryMachineStore ──

type StoreKey = (String, u32);

/// In-memory MachineStore for tests and local tooling.
///
/// Enforces immutability rules:
/// - Published content cannot be modified (only state → Retired)
/// - Retired cannot transition back to Draft or Published
/// - Valid transitions: Draft→Published, Published→Retired
pub struct MemoryMachineStore {
    inner: RwLock<HashMap<StoreKey, MachineRecord>>,
}

impl MemoryMachineStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryMachineStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MachineStore for MemoryMachineStore {
    async fn save(&self, record: &MachineRecord) -> Result<()> {
        let key = (record.machine_key.clone(), record.machine_version);
        let mut store = self.inner.write().map_err(|e| anyhow!("Lock: {}", e))?;

        if let Some(existing) = store.get(&key) {
            match existing.state {
                MachineState::Published => {
                    return Err(anyhow!(
                        "Cannot modify published machine {}:v{}",
                        record.machine_key,
                        record.machine_version
                    ));
                }
                MachineState::Retired => {
                    return Err(anyhow!(
                        "Cannot modify retired machine {}:v{}",
                        record.machine_key,
                        record.machine_version
                    ));
                }
                MachineState::Draft => {
                    // Draft can be overwritten
                }
            }
        }

        store.insert(key, record.clone());
        Ok(())
    }

    async fn load(&self, key: &str, version: u32) -> Result<Option<MachineRecord>> {
        let store = self.inner.read().map_err(|e| anyhow!("Lock: {}", e))?;
        Ok(store.get(&(key.to_string(), version)).cloned())
    }

    async fn list(
        &self,
        key: Option<&str>,
        state: Option<MachineState>,
    ) -> Result<Vec<MachineRecord>> {
        let store = self.inner.read().map_err(|e| anyhow!("Lock: {}", e))?;
        let results: Vec<_> = store
            .values()
            .filter(|record| {
                if let Some(k) = key {
                    if record.machine_key != k {
                        return false;
                    }
                }
                if let Some(ref s) = state {
                    if &record.state != s {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();
        Ok(results)
    }

    async fn set_state(&self, key: &str, version: u32, new_state: MachineState) -> Result<()> {
        let store_key = (key.to_string(), version);
        let mut store = self.inner.write().map_err(|e| anyhow!("Lock: {}", e))?;

        let record = store
            .get_mut(&store_key)
            .ok_or_else(|| anyhow!("Machine not found: {}:v{}", key, version))?;

        match (&record.state, &new_state) {
            (MachineState::Draft, MachineState::Published) => {}
            (MachineState::Published, MachineState::Retired) => {}
            (from, to) => {
                return Err(anyhow!(
                    "Invalid state transition {:?} → {:?} for {}:v{}",
                    from,
                    to,
                    key,
                    version
                ));
            }
        }

        record.state = new_state;
        if record.state == MachineState::Published && record.published_at.is_none() {
            record.published_at = Some(now_ms());
        }

        Ok(())
    }

    async fn load_latest_published(&self, key: &str) -> Result<Option<MachineRecord>> {
        let store = self.inner.read().map_err(|e| anyhow!("Lock: {}", e))?;
        let latest = store
            .values()
            .filter(|record| record.machine_key == key && record.state == MachineState::Published)
            .max_by_key(|record| record.machine_version)
            .cloned();
        Ok(latest)
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
