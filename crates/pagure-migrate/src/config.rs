//! Migration configuration.
//!
//! Loaded from YAML, overridden by command-line flags, then validated once
//! before any component is constructed.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::Validate;

use crate::error::{MigrationError, Result};
use crate::filter::StateFilter;
use crate::render::Templates;
use crate::types::TicketSelection;

/// Source forge (Pagure) settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct SourceConfig {
    /// Web root of the forge, e.g. `https://pagure.io`.
    #[validate(url)]
    pub url: String,

    /// Repository name, e.g. `fedora-infra/ansible`.
    #[validate(length(min = 1))]
    pub repo: String,

    /// API token.
    #[serde(skip_serializing)]
    pub token: String,

    /// Root of author profile links, e.g. `https://accounts.fedoraproject.org`.
    #[validate(url)]
    pub account_url: String,
}

impl SourceConfig {
    /// Base of the repository API, e.g. `https://pagure.io/api/0/fedora-infra/ansible`.
    pub fn api_base(&self) -> String {
        format!("{}/api/0/{}", self.url.trim_end_matches('/'), self.repo)
    }

    /// Web link of the repository.
    pub fn repo_link(&self) -> String {
        format!("{}/{}", self.url.trim_end_matches('/'), self.repo)
    }
}

/// Destination forge (GitLab) settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct DestinationConfig {
    /// Instance root, e.g. `https://gitlab.com`.
    #[validate(url)]
    pub url: String,

    /// Project path or numeric id, e.g. `group/project`.
    #[validate(length(min = 1))]
    pub project: String,

    /// Personal access token.
    #[serde(skip_serializing)]
    pub token: String,
}

/// What gets carried over, and how.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct TransferConfig {
    /// Ticket state filter.
    pub state: StateFilter,

    /// Tickets per listing page.
    #[validate(range(min = 1, max = 100))]
    pub page_size: u64,

    /// Copy tags as labels.
    pub labels: bool,

    /// Copy the private flag as confidentiality.
    pub confidential: bool,

    /// Ask the destination to reuse the source ticket number.
    pub preserve_numbering: bool,

    /// Per-request timeout in seconds.
    #[validate(range(min = 1))]
    pub timeout_secs: u64,

    /// Which tickets to migrate.
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub selection: TicketSelection,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            state: StateFilter::Open,
            page_size: 20,
            labels: false,
            confidential: false,
            preserve_numbering: false,
            timeout_secs: 60,
            selection: TicketSelection::All,
        }
    }
}

impl TransferConfig {
    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Which per-item failures stop the whole run.
///
/// Counting failures and empty pages are always fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FailurePolicy {
    /// Stop when a request gets no response at all.
    pub abort_on_transport: bool,
    /// Stop when a forge rejects the credentials (401/403).
    pub abort_on_auth: bool,
    /// Stop on the first failure of any kind.
    pub abort_on_any: bool,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            abort_on_transport: false,
            abort_on_auth: true,
            abort_on_any: false,
        }
    }
}

impl FailurePolicy {
    /// Whether `error` ends the run under this policy.
    pub fn is_fatal(&self, error: &crate::error::RequestError) -> bool {
        self.abort_on_any
            || (self.abort_on_transport && error.is_transport())
            || (self.abort_on_auth && error.is_auth())
    }
}

/// Full configuration of a migration run.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct MigrationConfig {
    #[validate(nested)]
    pub source: SourceConfig,

    #[validate(nested)]
    pub destination: DestinationConfig,

    #[validate(nested)]
    pub transfer: TransferConfig,

    pub failure_policy: FailurePolicy,

    pub templates: Templates,
}

impl MigrationConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Check what reading from the source needs, including its token.
    pub fn validate_source(&self) -> Result<()> {
        self.source
            .validate()
            .map_err(|e| MigrationError::InvalidConfig(e.to_string()))?;
        self.transfer
            .validate()
            .map_err(|e| MigrationError::InvalidConfig(e.to_string()))?;

        if self.source.token.is_empty() {
            return Err(MigrationError::InvalidConfig(
                "source token is missing".to_string(),
            ));
        }
        Ok(())
    }

    /// Check the configuration, including the secrets.
    pub fn validate_all(&self) -> Result<()> {
        self.validate()
            .map_err(|e| MigrationError::InvalidConfig(e.to_string()))?;
        self.validate_source()?;

        if self.destination.token.is_empty() {
            return Err(MigrationError::InvalidConfig(
                "destination token is missing".to_string(),
            ));
        }
        if let TicketSelection::Range { start, end } = self.transfer.selection {
            if start > end {
                return Err(MigrationError::InvalidConfig(format!(
                    "ticket range {start}-{end} is reversed"
                )));
            }
        }
        Ok(())
    }
}
