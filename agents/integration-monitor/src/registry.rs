//! Integration registries
//!
//! `FileRegistry` re-reads a YAML or JSON document on every call so edits take
//! effect on the next cycle. `StaticRegistry` holds an in-memory list.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::collaborators::IntegrationRegistry;
use crate::config::is_yaml;
use crate::contracts::IntegrationConfig;
use crate::error::RegistryError;

#[derive(Deserialize)]
#[serde(untagged)]
enum RegistryDocument {
    Wrapped { integrations: Vec<IntegrationConfig> },
    List(Vec<IntegrationConfig>),
}

impl RegistryDocument {
    fn into_entries(self) -> Vec<IntegrationConfig> {
        match self {
            Self::Wrapped { integrations } => integrations,
            Self::List(integrations) => integrations,
        }
    }
}

/// Parse a registry document and keep the enabled entries
pub fn parse_registry(content: &str, yaml: bool) -> Result<Vec<IntegrationConfig>, RegistryError> {
    let document: RegistryDocument = if yaml {
        serde_yaml::from_str(content).map_err(|e| RegistryError::Parse(e.to_string()))?
    } else {
        serde_json::from_str(content).map_err(|e| RegistryError::Parse(e.to_string()))?
    };

    let entries = document.into_entries();
    validate_entries(&entries)?;

    Ok(entries.into_iter().filter(|i| i.enabled).collect())
}

fn validate_entries(entries: &[IntegrationConfig]) -> Result<(), RegistryError> {
    let mut seen = HashSet::new();
    for entry in entries {
        if entry.name.trim().is_empty() {
            return Err(RegistryError::Invalid("integration name is empty".to_string()));
        }
        if !seen.insert(entry.name.as_str()) {
            return Err(RegistryError::Invalid(format!(
                "duplicate integration name: {}",
                entry.name
            )));
        }
        if entry.probe.endpoint.trim().is_empty() {
            return Err(RegistryError::Invalid(format!(
                "integration {} has no endpoint",
                entry.name
            )));
        }
        validate_limits(entry).map_err(|reason| {
            RegistryError::Invalid(format!("integration {}: {}", entry.name, reason))
        })?;
    }
    Ok(())
}

fn validate_limits(entry: &IntegrationConfig) -> Result<(), String> {
    if entry.failover_threshold == 0 {
        return Err("failover_threshold must be at least 1".to_string());
    }

    let timeout = entry.probe.timeout_secs;
    if !timeout.is_finite() || timeout <= 0.0 {
        return Err(format!("probe timeout must be positive, got {}", timeout));
    }

    let thresholds = &entry.thresholds;
    for (field, value) in [
        ("response_warning", thresholds.response_warning),
        ("response_critical", thresholds.response_critical),
        ("error_rate_critical", thresholds.error_rate_critical),
        ("cost_alert_threshold", entry.cost_alert_threshold),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(format!("{} must be a non-negative number, got {}", field, value));
        }
    }

    if thresholds.response_warning > thresholds.response_critical {
        return Err(format!(
            "response_warning ({}) exceeds response_critical ({})",
            thresholds.response_warning, thresholds.response_critical
        ));
    }
    Ok(())
}

/// Registry backed by a YAML or JSON file
#[derive(Debug, Clone)]
pub struct FileRegistry {
    path: PathBuf,
}

impl FileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl IntegrationRegistry for FileRegistry {
    async fn get_active_integrations(&self) -> Result<Vec<IntegrationConfig>, RegistryError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            RegistryError::Unavailable(format!("{}: {}", self.path.display(), e))
        })?;

        parse_registry(&content, is_yaml(&self.path))
    }
}

/// In-memory registry
#[derive(Debug, Default)]
pub struct StaticRegistry {
    integrations: RwLock<Vec<IntegrationConfig>>,
}

impl StaticRegistry {
    pub fn new(integrations: Vec<IntegrationConfig>) -> Self {
        Self {
            integrations: RwLock::new(integrations),
        }
    }

    /// Replace the full set
    pub fn set(&self, integrations: Vec<IntegrationConfig>) {
        *self.integrations.write() = integrations;
    }

    /// Add or replace one entry by name
    pub fn upsert(&self, integration: IntegrationConfig) {
        let mut integrations = self.integrations.write();
        integrations.retain(|i| i.name != integration.name);
        integrations.push(integration);
    }

    /// Remove an entry, returns whether it existed
    pub fn remove(&self, name: &str) -> bool {
        let mut integrations = self.integrations.write();
        let before = integrations.len();
        integrations.retain(|i| i.name != name);
        integrations.len() != before
    }
}

#[async_trait]
impl IntegrationRegistry for StaticRegistry {
    async fn get_active_integrations(&self) -> Result<Vec<IntegrationConfig>, RegistryError> {
        let integrations = self.integrations.read().clone();
        validate_entries(&integrations)?;
        Ok(integrations.into_iter().filter(|i| i.enabled).collect())
    }
}
