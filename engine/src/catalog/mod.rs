//! Component catalog
//!
//! Loads the configuration document once, normalises both schema dialects
//! into one component list and resolves each component's actions against the
//! built-in component keys. Everything else stays verbatim in that view.
//!
//! Unit actions are resolved from the raw document values in one pass with
//! the full unit context, so a variable whose value contains `${...}` is
//! never expanded a second time.

pub mod dialect;
pub mod environment;
pub mod patterns;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use regex::Regex;
use tracing::{debug, info};

use crate::errors::OrchestratorError;
use crate::filesys::file::File;
use crate::models::component::{ActionSpec, Category, Component};
use crate::models::config::{ConfigDocument, HealthCheckSettings};
use crate::models::run::Phase;
use crate::resolver::{has_placeholders, Resolvable, VarContext, Vars};

pub use dialect::Dialect;
pub use environment::Environment;
pub use patterns::PatternSet;

/// Normalised, read-only view of the configuration document
#[derive(Debug, Clone)]
pub struct Catalog {
    document: ConfigDocument,
    dialect: Dialect,
    workspace: PathBuf,
    components: Vec<Component>,

    /// Enabled components as normalised, before any substitution
    raw: HashMap<(Category, String), Component>,
    disabled: usize,
}

impl Catalog {
    /// Load and normalise a configuration document.
    ///
    /// `workspace` overrides `project.workspace`; when neither is set the
    /// document's directory is used.
    pub async fn load(path: &Path, workspace: Option<PathBuf>) -> Result<Self, OrchestratorError> {
        let file = File::new(path);
        if !file.exists().await {
            return Err(OrchestratorError::ConfigError(format!(
                "configuration document not found: {}",
                path.display()
            )));
        }

        let contents = file.read_string().await?;
        let document = parse_document(&contents).map_err(|e| match e {
            OrchestratorError::JsonError(e) => OrchestratorError::ConfigError(format!(
                "{} is not a valid configuration document: {}",
                path.display(),
                e
            )),
            other => other,
        })?;

        let workspace = workspace
            .or_else(|| document.project.workspace.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| {
                path.parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."))
            });

        Self::from_document(document, workspace)
    }

    /// Parse a document held in memory
    pub fn from_json_str(contents: &str, workspace: impl Into<PathBuf>) -> Result<Self, OrchestratorError> {
        Self::from_document(parse_document(contents)?, workspace.into())
    }

    /// Build a catalog from an already parsed document
    pub fn from_document(
        document: ConfigDocument,
        workspace: PathBuf,
    ) -> Result<Self, OrchestratorError> {
        let dialect = dialect::detect(&document);
        let normalized = dialect::normalize(&document, dialect)?;
        validate_health_settings(&document, &normalized)?;

        let total = normalized.len();
        let mut catalog = Self {
            document,
            dialect,
            workspace,
            components: Vec::with_capacity(total),
            raw: HashMap::with_capacity(total),
            disabled: 0,
        };

        for component in normalized {
            if !component.enabled {
                debug!("Excluding disabled component {}/{}", component.category, component.name);
                catalog.disabled += 1;
                continue;
            }
            let context = catalog.component_context(&component);
            let resolved = Component {
                build: component.build.resolved(&context),
                deploy: component.deploy.resolved(&context),
                ..component.clone()
            };
            catalog
                .raw
                .insert((component.category, component.name.clone()), component);
            catalog.components.push(resolved);
        }

        info!(
            "Loaded {:?} catalog: {} enabled component(s), {} disabled",
            catalog.dialect,
            catalog.components.len(),
            catalog.disabled
        );
        Ok(catalog)
    }

    pub fn document(&self) -> &ConfigDocument {
        &self.document
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn project_name(&self) -> &str {
        &self.document.project.name
    }

    /// Number of components excluded because `enabled` was false
    pub fn disabled_count(&self) -> usize {
        self.disabled
    }

    /// Every enabled component, in catalog order
    pub fn all_enabled(&self) -> &[Component] {
        &self.components
    }

    /// Enabled components grouped by category
    pub fn components_by_category(&self) -> IndexMap<Category, Vec<&Component>> {
        dialect::by_category(&self.components)
    }

    /// Enabled components whose name and category match the given
    /// comma-separated glob lists, in catalog order
    pub fn filter(&self, name_pattern: Option<&str>, category_pattern: Option<&str>) -> Vec<&Component> {
        let names = PatternSet::parse(name_pattern);
        let categories = PatternSet::parse(category_pattern);
        self.components
            .iter()
            .filter(|c| names.matches(&c.name) && categories.matches(c.category.key()))
            .collect()
    }

    /// Select an environment by name
    pub fn environment(&self, name: &str) -> Result<Environment, OrchestratorError> {
        Environment::select(&self.document, name)
    }

    /// Context shared by every unit: workspace, project and its variables
    pub fn base_context(&self) -> VarContext {
        VarContext::new()
            .with(Vars::WORKSPACE, self.workspace.to_string_lossy())
            .with(Vars::PROJECT_NAME, self.document.project.name.clone())
    }

    /// Built-in keys known per component, without user variables
    pub fn component_context(&self, component: &Component) -> VarContext {
        self.base_context()
            .with(Vars::COMPONENT_NAME, component.name.clone())
            .with(Vars::COMPONENT_CATEGORY, component.category.key())
    }

    /// Fresh context for one (component, server) unit
    pub fn unit_context(
        &self,
        environment: Option<&Environment>,
        component: &Component,
        server: Option<&str>,
    ) -> VarContext {
        let mut context = self
            .base_context()
            .with(Vars::COMPONENT_NAME, component.name.clone())
            .with(Vars::COMPONENT_CATEGORY, component.category.key());
        if let Some(server) = server {
            context.set(Vars::SERVER, server);
        }
        if let Some(environment) = environment {
            environment.apply(&mut context);
            context.extend_missing(environment.variables.clone());
        }
        context.extend_missing(self.document.project.variables.clone());
        context
    }

    /// Resolve a component's action for one unit.
    ///
    /// Starts from the raw document values and substitutes once with a fresh
    /// unit context; both are returned.
    pub fn unit_action(
        &self,
        environment: Option<&Environment>,
        component: &Component,
        server: Option<&str>,
        phase: Phase,
    ) -> (VarContext, ActionSpec) {
        let context = self.unit_context(environment, component, server);
        let source = self
            .raw
            .get(&(component.category, component.name.clone()))
            .unwrap_or(component);
        let spec = source.action(phase).resolved(&context);
        (context, spec)
    }

    /// Fresh context for a server-level step such as a per-server probe
    pub fn server_context(&self, environment: &Environment, server: &str) -> VarContext {
        let mut context = self.base_context().with(Vars::SERVER, server);
        environment.apply(&mut context);
        context.extend_missing(environment.variables.clone());
        context.extend_missing(self.document.project.variables.clone());
        context
    }

    /// Absolute script path; relative paths are taken from the workspace
    pub fn script_path(&self, script: &str) -> PathBuf {
        let path = Path::new(script);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    /// Units whose script is missing once resolved for that unit.
    ///
    /// A path that still holds a placeholder cannot exist and is reported
    /// too. Each (component, path) pair is listed once. Deploy units are
    /// checked per server; build units have none.
    pub fn missing_scripts<'a>(
        &self,
        environment: Option<&Environment>,
        components: impl IntoIterator<Item = &'a Component>,
        servers: &[String],
        phase: Phase,
    ) -> Vec<(String, PathBuf)> {
        let targets: Vec<Option<&str>> = match phase {
            Phase::Deploy => servers.iter().map(|s| Some(s.as_str())).collect(),
            Phase::Build => vec![None],
        };

        let mut missing: Vec<(String, PathBuf)> = Vec::new();
        for component in components {
            for server in &targets {
                let (_, spec) = self.unit_action(environment, component, *server, phase);
                if spec.is_empty() {
                    continue;
                }
                let path = self.script_path(&spec.script_path);
                if has_placeholders(&spec.script_path) || !path.is_file() {
                    let entry = (component.name.clone(), path);
                    if !missing.contains(&entry) {
                        missing.push(entry);
                    }
                }
            }
        }
        missing
    }
}

fn parse_document(contents: &str) -> Result<ConfigDocument, OrchestratorError> {
    let value: serde_json::Value = serde_json::from_str(contents)?;
    if !value.is_object() {
        return Err(OrchestratorError::ConfigError(
            "configuration document must be a JSON object".to_string(),
        ));
    }
    Ok(serde_json::from_value(value)?)
}

/// Compile every `expectedBody` pattern up front so a bad pattern fails the
/// load rather than the first probe
fn validate_health_settings(
    document: &ConfigDocument,
    components: &[Component],
) -> Result<(), OrchestratorError> {
    let mut layers: Vec<(String, &HealthCheckSettings)> = Vec::new();
    if let Some(settings) = &document.deploy.health_check {
        layers.push(("deploy.healthCheck".to_string(), settings));
    }
    for (name, env) in &document.environments {
        if let Some(settings) = &env.health_check {
            layers.push((format!("environments.{}.healthCheck", name), settings));
        }
    }
    for component in components {
        if let Some(settings) = &component.health_check {
            layers.push((
                format!("components.{}.{}.healthCheck", component.category, component.name),
                settings,
            ));
        }
    }

    for (location, settings) in layers {
        if let Some(pattern) = &settings.expected_body {
            Regex::new(pattern).map_err(|e| {
                OrchestratorError::ConfigError(format!(
                    "{}.expectedBody is not a valid pattern: {}",
                    location, e
                ))
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v2() -> serde_json::Value {
        json!({
            "project": { "name": "shop", "variables": { "artifacts": "${workspace}/out" } },
            "deploy": { "scriptPath": "scripts/deploy.sh" },
            "components": {
                "apis": [
                    {
                        "name": "orders-api",
                        "deploy": { "parameters": {
                            "Name": "${component.name}",
                            "Target": "${server}",
                            "Drop": "${artifacts}"
                        } }
                    },
                    { "name": "billing-api" },
                    { "name": "old-api", "enabled": false }
                ],
                "batches": [ { "name": "nightly" } ],
                "lambdas": [ { "name": "ignored" } ]
            },
            "environments": { "dev": { "servers": ["dev01"] } }
        })
    }

    #[test]
    fn test_disabled_components_are_excluded() {
        let catalog = Catalog::from_json_str(&v2().to_string(), "/ws").unwrap();
        let names: Vec<_> = catalog.all_enabled().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["orders-api", "billing-api", "nightly"]);
        assert_eq!(catalog.disabled_count(), 1);
        assert!(catalog.filter(Some("old-*"), None).is_empty());
    }

    #[test]
    fn test_component_level_resolution_leaves_server() {
        let catalog = Catalog::from_json_str(&v2().to_string(), "/ws").unwrap();
        let orders = &catalog.all_enabled()[0];
        let params = &orders.deploy.parameters;
        assert_eq!(params["Name"], crate::models::ParamValue::Text("orders-api".into()));
        assert_eq!(params["Target"], crate::models::ParamValue::Text("${server}".into()));
        // User variables wait for the unit context
        assert_eq!(params["Drop"], crate::models::ParamValue::Text("${artifacts}".into()));
    }

    #[test]
    fn test_unit_action_substitutes_once() {
        let mut doc = v2();
        doc["project"]["variables"]["literal"] = json!("${server}");
        doc["components"]["apis"][0]["deploy"]["parameters"]["Value"] = json!("${literal}");
        let catalog = Catalog::from_json_str(&doc.to_string(), "/ws").unwrap();
        let env = catalog.environment("dev").unwrap();
        let orders = &catalog.all_enabled()[0];

        let (context, spec) = catalog.unit_action(Some(&env), orders, Some("dev01"), Phase::Deploy);
        assert_eq!(context.get(Vars::SERVER), Some("dev01"));
        let params = &spec.parameters;
        assert_eq!(params["Target"], crate::models::ParamValue::Text("dev01".into()));
        assert_eq!(params["Drop"], crate::models::ParamValue::Text("${workspace}/out".into()));
        assert_eq!(params["Value"], crate::models::ParamValue::Text("${server}".into()));
    }

    #[test]
    fn test_filter_by_name_and_category() {
        let catalog = Catalog::from_json_str(&v2().to_string(), "/ws").unwrap();
        let apis: Vec<_> = catalog
            .filter(None, Some("apis"))
            .into_iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(apis, ["orders-api", "billing-api"]);

        let billing: Vec<_> = catalog
            .filter(Some("*billing*"), None)
            .into_iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(billing, ["billing-api"]);
    }

    #[test]
    fn test_components_by_category() {
        let catalog = Catalog::from_json_str(&v2().to_string(), "/ws").unwrap();
        let grouped = catalog.components_by_category();
        let categories: Vec<_> = grouped.keys().copied().collect();
        assert_eq!(categories, [Category::Apis, Category::Batches]);
        assert_eq!(grouped[&Category::Apis].len(), 2);
    }

    #[test]
    fn test_unit_contexts_are_independent() {
        let catalog = Catalog::from_json_str(&v2().to_string(), "/ws").unwrap();
        let env = catalog.environment("dev").unwrap();
        let component = &catalog.all_enabled()[0];

        let first = catalog.unit_context(Some(&env), component, Some("dev01"));
        let second = catalog.unit_context(Some(&env), component, Some("dev02"));
        assert_eq!(first.get(Vars::SERVER), Some("dev01"));
        assert_eq!(second.get(Vars::SERVER), Some("dev02"));
        assert_eq!(first.get(Vars::COMPONENT_NAME), Some("orders-api"));
    }

    #[test]
    fn test_invalid_body_pattern_is_config_error() {
        let mut doc = v2();
        doc["deploy"]["healthCheck"] = json!({ "expectedBody": "([unclosed" });
        let err = Catalog::from_json_str(&doc.to_string(), "/ws").unwrap_err();
        assert!(matches!(err, OrchestratorError::ConfigError(_)));
    }

    #[test]
    fn test_non_object_document_rejected() {
        let err = Catalog::from_json_str("[1, 2]", "/ws").unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_missing_scripts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("scripts")).unwrap();
        std::fs::write(dir.path().join("scripts/deploy.sh"), "#!/bin/sh\n").unwrap();

        let mut doc = v2();
        doc["components"]["batches"][0]["deploy"] = json!({ "scriptPath": "scripts/missing.sh" });
        let catalog = Catalog::from_json_str(&doc.to_string(), dir.path()).unwrap();
        let env = catalog.environment("dev").unwrap();
        let servers = vec!["dev01".to_string(), "dev02".to_string()];

        let missing = catalog.missing_scripts(Some(&env), catalog.all_enabled(), &servers, Phase::Deploy);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].0, "nightly");
    }

    #[test]
    fn test_missing_scripts_resolves_per_server() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("scripts")).unwrap();
        std::fs::write(dir.path().join("scripts/deploy-dev01.sh"), "#!/bin/sh\n").unwrap();

        let mut doc = v2();
        doc["deploy"]["scriptPath"] = json!("scripts/deploy-${server}.sh");
        doc["components"] = json!({ "apis": [ { "name": "orders-api" } ] });
        let catalog = Catalog::from_json_str(&doc.to_string(), dir.path()).unwrap();
        let env = catalog.environment("dev").unwrap();
        let servers = vec!["dev01".to_string(), "dev02".to_string()];

        let missing = catalog.missing_scripts(Some(&env), catalog.all_enabled(), &servers, Phase::Deploy);
        assert_eq!(missing, [("orders-api".to_string(), dir.path().join("scripts/deploy-dev02.sh"))]);

        // Unknown variables can never name an existing script
        doc["deploy"]["scriptPath"] = json!("scripts/${nowhere}.sh");
        let catalog = Catalog::from_json_str(&doc.to_string(), dir.path()).unwrap();
        let missing = catalog.missing_scripts(Some(&env), catalog.all_enabled(), &servers, Phase::Deploy);
        assert_eq!(missing.len(), 1);
    }

    #[tokio::test]
    async fn test_load_from_disk_defaults_workspace_to_document_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, v2().to_string()).unwrap();

        let catalog = Catalog::load(&path, None).await.unwrap();
        assert_eq!(catalog.workspace(), dir.path());
        assert_eq!(catalog.project_name(), "shop");
    }

    #[tokio::test]
    async fn test_load_rejects_unparseable_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = Catalog::load(&path, None).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::ConfigError(_)));
    }
}
