//! Configuration document models
//!
//! Keys are camelCase. Unknown keys are ignored so newer documents still load.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::models::component::{Category, Parameters};
use crate::models::run::Strategy;

/// The whole configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDocument {
    /// Optional explicit dialect marker (`1` or `2`)
    #[serde(default)]
    pub schema_version: Option<Value>,

    #[serde(default)]
    pub project: ProjectSection,

    #[serde(default)]
    pub build: BuildSection,

    /// V2 per-category component objects, kept raw so unknown categories
    /// can be skipped without failing the whole document
    #[serde(default)]
    pub components: Option<IndexMap<String, Value>>,

    #[serde(default)]
    pub environments: IndexMap<String, EnvironmentSection>,

    #[serde(default)]
    pub deploy: DeploySection,

    /// Opaque to the engine
    #[serde(default)]
    pub security: Option<Value>,

    /// Opaque to the engine
    #[serde(default)]
    pub notifications: Option<Value>,
}

/// Project section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSection {
    #[serde(default)]
    pub name: String,

    /// Workspace root used when the command line does not supply one
    #[serde(default)]
    pub workspace: Option<String>,

    /// Variables seeded into every context
    #[serde(default)]
    pub variables: IndexMap<String, String>,
}

/// Build section.
///
/// In V1 documents this carries the shared build script and the flat
/// per-category name lists. In V2 documents the script and parameters are
/// defaults inherited by components.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSection {
    #[serde(default)]
    pub script_path: Option<String>,

    #[serde(default)]
    pub parameters: Parameters,

    #[serde(default)]
    pub interpreter: Option<Vec<String>>,

    #[serde(default)]
    pub apis: Option<Vec<String>>,

    #[serde(default)]
    pub web_apps: Option<Vec<String>>,

    #[serde(default)]
    pub console_services: Option<Vec<String>>,

    #[serde(default)]
    pub batches: Option<Vec<String>>,

    #[serde(default)]
    pub angular: Option<Vec<String>>,

    #[serde(default)]
    pub db_scripts: Option<Vec<String>>,
}

impl BuildSection {
    /// Legacy flat name list for a category
    pub fn legacy_names(&self, category: Category) -> &[String] {
        let names = match category {
            Category::Apis => &self.apis,
            Category::WebApps => &self.web_apps,
            Category::ConsoleServices => &self.console_services,
            Category::Batches => &self.batches,
            Category::Angular => &self.angular,
            Category::DbScripts => &self.db_scripts,
        };
        names.as_deref().unwrap_or_default()
    }

    /// Whether any legacy list is present
    pub fn has_legacy_lists(&self) -> bool {
        Category::ALL
            .into_iter()
            .any(|category| !self.legacy_names(category).is_empty())
    }
}

/// Deploy section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploySection {
    #[serde(default)]
    pub script_path: Option<String>,

    #[serde(default)]
    pub parameters: Parameters,

    #[serde(default)]
    pub interpreter: Option<Vec<String>>,

    #[serde(default)]
    pub strategy: Option<Strategy>,

    /// Per-action timeout
    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    #[serde(default)]
    pub max_parallel: Option<usize>,

    #[serde(default)]
    pub stop_on_first_failure: Option<bool>,

    #[serde(default)]
    pub health_check: Option<HealthCheckSettings>,
}

/// One environment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSection {
    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default, alias = "targetServers")]
    pub servers: ServerList,

    #[serde(default)]
    pub proxy: Option<ProxySettings>,

    #[serde(default)]
    pub variables: IndexMap<String, String>,

    #[serde(default)]
    pub health_check: Option<HealthCheckSettings>,
}

/// Ordered server list.
///
/// Accepts either a JSON list or a legacy comma-separated string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerList(pub Vec<String>);

impl<'de> Deserialize<'de> for ServerList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Csv(String),
            List(Vec<String>),
        }

        let servers = match Raw::deserialize(deserializer)? {
            Raw::Csv(csv) => csv.split(',').map(str::to_string).collect::<Vec<_>>(),
            Raw::List(list) => list,
        };

        Ok(ServerList(
            servers
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        ))
    }
}

/// Proxy settings exposed to actions as `${proxy.*}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxySettings {
    #[serde(default)]
    pub http: Option<String>,

    #[serde(default)]
    pub https: Option<String>,

    #[serde(default)]
    pub no_proxy: Option<String>,
}

/// Health check settings. Every field is optional so layers can be merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Full URL template; takes precedence over scheme, port and endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_status: Option<u16>,

    /// Regular expression the response body must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_body: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_interval_seconds: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_seconds: Option<u64>,
}

impl HealthCheckSettings {
    /// Layer `other` on top of `self`; fields set in `other` win
    pub fn overlay(&self, other: &HealthCheckSettings) -> HealthCheckSettings {
        HealthCheckSettings {
            enabled: other.enabled.or(self.enabled),
            scheme: other.scheme.clone().or_else(|| self.scheme.clone()),
            port: other.port.or(self.port),
            endpoint: other.endpoint.clone().or_else(|| self.endpoint.clone()),
            url: other.url.clone().or_else(|| self.url.clone()),
            expected_status: other.expected_status.or(self.expected_status),
            expected_body: other
                .expected_body
                .clone()
                .or_else(|| self.expected_body.clone()),
            timeout_seconds: other.timeout_seconds.or(self.timeout_seconds),
            retry_interval_seconds: other.retry_interval_seconds.or(self.retry_interval_seconds),
            request_timeout_seconds: other
                .request_timeout_seconds
                .or(self.request_timeout_seconds),
        }
    }
}

/// V2 component entry as written in the document
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentEntry {
    #[serde(default)]
    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub build: Option<ActionEntry>,

    #[serde(default)]
    pub deploy: Option<ActionEntry>,

    #[serde(default)]
    pub health_check: Option<HealthCheckSettings>,
}

/// Action block of a V2 component entry
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEntry {
    #[serde(default)]
    pub script_path: Option<String>,

    #[serde(default)]
    pub parameters: Parameters,

    #[serde(default)]
    pub interpreter: Option<Vec<String>>,
}

fn default_true() -> bool {
    true
}
