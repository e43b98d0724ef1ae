//! Schema dialect detection and normalisation
//!
//! V1 documents list component names per category under `build` and share
//! one build script and one deploy script. V2 documents carry a `components`
//! section keyed by category whose entries bring their own scripts and
//! parameters, inheriting anything they omit from `build` / `deploy`.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::OrchestratorError;
use crate::models::component::{ActionSpec, Category, Component, Parameters};
use crate::models::config::{ActionEntry, ComponentEntry, ConfigDocument};

/// Configuration schema dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Dialect {
    V1,
    V2,
}

/// Detect the dialect of a document.
///
/// An explicit `schemaVersion` of 1 or 2 wins; otherwise a `components`
/// section implies V2.
pub fn detect(document: &ConfigDocument) -> Dialect {
    let explicit = document.schema_version.as_ref().and_then(|v| match v {
        Value::Number(n) => n.as_f64().map(|f| f.trunc() as i64),
        Value::String(s) => s
            .trim()
            .trim_start_matches(['v', 'V'])
            .split('.')
            .next()
            .and_then(|major| major.parse::<i64>().ok()),
        _ => None,
    });

    match explicit {
        Some(1) => Dialect::V1,
        Some(2) => Dialect::V2,
        Some(other) => {
            warn!("Unrecognised schemaVersion {}, detecting dialect from content", other);
            detect_from_content(document)
        }
        None => detect_from_content(document),
    }
}

fn detect_from_content(document: &ConfigDocument) -> Dialect {
    if document.components.is_some() {
        Dialect::V2
    } else {
        Dialect::V1
    }
}

/// Normalise the document into one component list, enabled or not.
///
/// Components are ordered by [`Category::ALL`] and then by document order.
pub fn normalize(
    document: &ConfigDocument,
    dialect: Dialect,
) -> Result<Vec<Component>, OrchestratorError> {
    let components = match dialect {
        Dialect::V1 => normalize_v1(document)?,
        Dialect::V2 => normalize_v2(document)?,
    };

    check_unique(&components)?;
    Ok(components)
}

fn normalize_v1(document: &ConfigDocument) -> Result<Vec<Component>, OrchestratorError> {
    let build = shared_action(
        document.build.script_path.as_ref(),
        &document.build.parameters,
        document.build.interpreter.as_ref(),
    );
    let deploy = shared_action(
        document.deploy.script_path.as_ref(),
        &document.deploy.parameters,
        document.deploy.interpreter.as_ref(),
    );

    let mut components = Vec::new();
    for category in Category::ALL {
        for (index, name) in document.build.legacy_names(category).iter().enumerate() {
            let name = name.trim();
            if name.is_empty() {
                return Err(OrchestratorError::ConfigError(format!(
                    "build.{}[{}]: component name must not be empty",
                    category, index
                )));
            }

            components.push(Component {
                name: name.to_string(),
                category,
                enabled: true,
                build: build.clone(),
                deploy: deploy.clone(),
                health_check: None,
            });
        }
    }

    Ok(components)
}

fn normalize_v2(document: &ConfigDocument) -> Result<Vec<Component>, OrchestratorError> {
    if document.build.has_legacy_lists() {
        warn!("V2 document also lists components under build; those lists are ignored");
    }

    let Some(sections) = document.components.as_ref() else {
        warn!("V2 document has no components section");
        return Ok(Vec::new());
    };

    for key in sections.keys() {
        if Category::from_key(key).is_none() {
            debug!("Ignoring unknown component category: {}", key);
        }
    }

    let mut components = Vec::new();
    for category in Category::ALL {
        let Some(section) = sections.get(category.key()) else {
            continue;
        };

        for (index, entry) in entries(category, section)?.into_iter().enumerate() {
            let name = entry.name.trim().to_string();
            if name.is_empty() {
                return Err(OrchestratorError::ConfigError(format!(
                    "components.{}[{}]: component name must not be empty",
                    category, index
                )));
            }

            components.push(Component {
                name,
                category,
                enabled: entry.enabled,
                build: inherit_action(
                    entry.build.as_ref(),
                    document.build.script_path.as_ref(),
                    &document.build.parameters,
                    document.build.interpreter.as_ref(),
                ),
                deploy: inherit_action(
                    entry.deploy.as_ref(),
                    document.deploy.script_path.as_ref(),
                    &document.deploy.parameters,
                    document.deploy.interpreter.as_ref(),
                ),
                health_check: entry.health_check,
            });
        }
    }

    Ok(components)
}

/// Parse one category section: either a list of entries or an object keyed
/// by component name
fn entries(category: Category, section: &Value) -> Result<Vec<ComponentEntry>, OrchestratorError> {
    match section {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                serde_json::from_value::<ComponentEntry>(item.clone()).map_err(|e| {
                    OrchestratorError::ConfigError(format!(
                        "components.{}[{}]: {}",
                        category, index, e
                    ))
                })
            })
            .collect(),
        Value::Object(map) => map
            .iter()
            .map(|(name, item)| {
                let mut entry =
                    serde_json::from_value::<ComponentEntry>(item.clone()).map_err(|e| {
                        OrchestratorError::ConfigError(format!(
                            "components.{}.{}: {}",
                            category, name, e
                        ))
                    })?;
                if entry.name.trim().is_empty() {
                    entry.name = name.clone();
                }
                Ok(entry)
            })
            .collect(),
        Value::Null => Ok(Vec::new()),
        other => Err(OrchestratorError::ConfigError(format!(
            "components.{} must be a list or an object, found {}",
            category,
            json_type(other)
        ))),
    }
}

fn shared_action(
    script_path: Option<&String>,
    parameters: &Parameters,
    interpreter: Option<&Vec<String>>,
) -> ActionSpec {
    ActionSpec {
        script_path: script_path.cloned().unwrap_or_default(),
        parameters: parameters.clone(),
        interpreter: interpreter.cloned().unwrap_or_default(),
    }
}

/// Component action block over section defaults. Parameters are merged with
/// the component's values winning; default keys keep their position.
fn inherit_action(
    entry: Option<&ActionEntry>,
    default_script: Option<&String>,
    default_parameters: &Parameters,
    default_interpreter: Option<&Vec<String>>,
) -> ActionSpec {
    let mut spec = shared_action(default_script, default_parameters, default_interpreter);
    let Some(entry) = entry else {
        return spec;
    };

    if let Some(script) = entry.script_path.as_ref() {
        spec.script_path = script.clone();
    }
    if let Some(interpreter) = entry.interpreter.as_ref() {
        spec.interpreter = interpreter.clone();
    }
    for (key, value) in &entry.parameters {
        spec.parameters.insert(key.clone(), value.clone());
    }
    spec
}

fn check_unique(components: &[Component]) -> Result<(), OrchestratorError> {
    let mut seen: HashSet<(Category, &str)> = HashSet::new();
    for component in components {
        if !seen.insert((component.category, component.name.as_str())) {
            return Err(OrchestratorError::DuplicateComponent {
                category: component.category.to_string(),
                name: component.name.clone(),
            });
        }
    }
    Ok(())
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Group components by category, preserving order
pub fn by_category<'a>(
    components: impl IntoIterator<Item = &'a Component>,
) -> IndexMap<Category, Vec<&'a Component>> {
    let mut grouped: IndexMap<Category, Vec<&Component>> = IndexMap::new();
    for component in components {
        grouped.entry(component.category).or_default().push(component);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::component::ParamValue;
    use serde_json::json;

    fn document(value: Value) -> ConfigDocument {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_detects_dialect() {
        assert_eq!(detect(&document(json!({ "build": { "apis": ["a"] } }))), Dialect::V1);
        assert_eq!(detect(&document(json!({ "components": {} }))), Dialect::V2);
        assert_eq!(
            detect(&document(json!({ "schemaVersion": "1.0", "components": {} }))),
            Dialect::V1
        );
        assert_eq!(detect(&document(json!({ "schemaVersion": 2 }))), Dialect::V2);
    }

    #[test]
    fn test_v1_shares_scripts() {
        let doc = document(json!({
            "build": {
                "scriptPath": "build.ps1",
                "parameters": { "Configuration": "Release" },
                "apis": ["orders", "billing"],
                "batches": ["nightly"]
            },
            "deploy": { "scriptPath": "deploy.ps1" }
        }));

        let components = normalize(&doc, Dialect::V1).unwrap();
        let names: Vec<_> = components.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["orders", "billing", "nightly"]);
        assert!(components.iter().all(|c| c.build.script_path == "build.ps1"));
        assert!(components.iter().all(|c| c.deploy.script_path == "deploy.ps1"));
        assert_eq!(components[2].category, Category::Batches);
    }

    #[test]
    fn test_v2_inherits_and_overrides() {
        let doc = document(json!({
            "build": { "scriptPath": "build.ps1", "parameters": { "A": "1", "B": "2" } },
            "components": {
                "apis": [
                    { "name": "orders", "build": { "parameters": { "B": "override", "C": true } } },
                    { "name": "legacy", "enabled": false }
                ],
                "webApps": { "portal": { "deploy": { "scriptPath": "portal.ps1" } } }
            }
        }));

        let components = normalize(&doc, Dialect::V2).unwrap();
        assert_eq!(components.len(), 3);

        let orders = &components[0];
        assert_eq!(orders.build.script_path, "build.ps1");
        let keys: Vec<_> = orders.build.parameters.keys().cloned().collect();
        assert_eq!(keys, ["A", "B", "C"]);
        assert_eq!(orders.build.parameters["B"], ParamValue::Text("override".into()));

        assert!(!components[1].enabled);
        assert_eq!(components[2].name, "portal");
        assert_eq!(components[2].deploy.script_path, "portal.ps1");
    }

    #[test]
    fn test_duplicate_names_fail_closed() {
        let doc = document(json!({
            "components": { "apis": [ { "name": "orders" }, { "name": "orders", "enabled": false } ] }
        }));
        let err = normalize(&doc, Dialect::V2).unwrap_err();
        assert!(matches!(err, OrchestratorError::DuplicateComponent { .. }));
    }

    #[test]
    fn test_same_name_in_different_categories_is_allowed() {
        let doc = document(json!({
            "build": { "apis": ["shared"], "webApps": ["shared"] }
        }));
        assert_eq!(normalize(&doc, Dialect::V1).unwrap().len(), 2);
    }

    #[test]
    fn test_empty_names_are_rejected() {
        let doc = document(json!({ "build": { "apis": ["  "] } }));
        assert!(normalize(&doc, Dialect::V1).is_err());

        let doc = document(json!({ "components": { "apis": [ { "enabled": true } ] } }));
        assert!(normalize(&doc, Dialect::V2).is_err());
    }

    #[test]
    fn test_malformed_section_is_config_error() {
        let doc = document(json!({ "components": { "apis": "orders" } }));
        let err = normalize(&doc, Dialect::V2).unwrap_err();
        assert!(err.to_string().contains("components.apis"));
    }
}
