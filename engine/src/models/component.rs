//! Component models

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::models::config::HealthCheckSettings;
use crate::models::run::Phase;
use crate::resolver::{resolve, Resolvable, VarContext};

/// Component category.
///
/// The order of [`Category::ALL`] is the catalog's traversal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Apis,
    WebApps,
    ConsoleServices,
    Batches,
    Angular,
    DbScripts,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Apis,
        Category::WebApps,
        Category::ConsoleServices,
        Category::Batches,
        Category::Angular,
        Category::DbScripts,
    ];

    /// Key used for this category in the configuration document
    pub fn key(&self) -> &'static str {
        match self {
            Category::Apis => "apis",
            Category::WebApps => "webApps",
            Category::ConsoleServices => "consoleServices",
            Category::Batches => "batches",
            Category::Angular => "angular",
            Category::DbScripts => "dbScripts",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Category::ALL.into_iter().find(|c| c.key() == key)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A single action parameter value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Text(String),
    Flag(bool),
    List(Vec<String>),
}

/// Ordered parameter map; insertion order drives argument order
pub type Parameters = IndexMap<String, ParamValue>;

impl ParamValue {
    fn from_json(value: &Value) -> Result<Self, String> {
        match value {
            Value::String(s) => Ok(ParamValue::Text(s.clone())),
            Value::Bool(b) => Ok(ParamValue::Flag(*b)),
            Value::Number(n) => Ok(ParamValue::Text(n.to_string())),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    Value::Number(n) => Ok(n.to_string()),
                    Value::Bool(b) => Ok(b.to_string()),
                    other => Err(format!("unsupported list element: {}", other)),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(ParamValue::List),
            Value::Null => Err("null is not a valid parameter value".to_string()),
            Value::Object(_) => Err("nested objects are not valid parameter values".to_string()),
        }
    }
}

impl Serialize for ParamValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ParamValue::Text(s) => serializer.serialize_str(s),
            ParamValue::Flag(b) => serializer.serialize_bool(*b),
            ParamValue::List(items) => items.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ParamValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        ParamValue::from_json(&value).map_err(serde::de::Error::custom)
    }
}

impl Resolvable for ParamValue {
    fn resolved(&self, context: &VarContext) -> Self {
        match self {
            ParamValue::Text(s) => ParamValue::Text(resolve(s, context)),
            ParamValue::Flag(b) => ParamValue::Flag(*b),
            ParamValue::List(items) => ParamValue::List(items.resolved(context)),
        }
    }
}

/// An external program invocation: script path plus parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSpec {
    /// Path of the script or program to run
    #[serde(default)]
    pub script_path: String,

    /// Parameters turned into command-line arguments
    #[serde(default)]
    pub parameters: Parameters,

    /// Optional argv prefix placed before the script path (e.g. `pwsh -File`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interpreter: Vec<String>,
}

impl ActionSpec {
    pub fn new(script_path: impl Into<String>) -> Self {
        Self {
            script_path: script_path.into(),
            ..Default::default()
        }
    }

    /// Builder: add a parameter
    pub fn with_param(mut self, key: impl Into<String>, value: ParamValue) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Whether no script is configured for this action
    pub fn is_empty(&self) -> bool {
        self.script_path.trim().is_empty()
    }
}

impl Resolvable for ActionSpec {
    fn resolved(&self, context: &VarContext) -> Self {
        Self {
            script_path: resolve(&self.script_path, context),
            parameters: self.parameters.resolved(context),
            interpreter: self.interpreter.resolved(context),
        }
    }
}

/// A deployable unit with its build and deploy actions
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub name: String,
    pub category: Category,
    pub enabled: bool,
    pub build: ActionSpec,
    pub deploy: ActionSpec,

    /// Per-component health check overrides
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheckSettings>,
}

impl Component {
    /// The action run in the given phase
    pub fn action(&self, phase: Phase) -> &ActionSpec {
        match phase {
            Phase::Build => &self.build,
            Phase::Deploy => &self.deploy,
        }
    }
}
