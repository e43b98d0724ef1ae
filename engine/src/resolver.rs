//! Variable resolution
//!
//! Substitutes `${key}` placeholders from a [`VarContext`]. Keys are matched
//! as whole tokens, so `${component.name}` is a single lookup of the key
//! `component.name`, never a walk through nested structures.
//!
//! Unknown placeholders are left verbatim. Callers that require a fully
//! resolved value check [`has_placeholders`] on the result.
//!
//! Substitution is a single pass. A replacement value that itself contains
//! `${...}` is inserted as-is and is not expanded again within the same call;
//! resolving the output a second time would expand it. Resolving an already
//! resolved string is otherwise a no-op.

use std::collections::HashMap;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::{Captures, Regex};
use serde_json::Value;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([^${}\s]+)\}").expect("placeholder pattern is valid")
});

/// Well-known context keys
pub struct Vars;

impl Vars {
    pub const WORKSPACE: &'static str = "workspace";
    pub const ENVIRONMENT: &'static str = "environment";
    pub const ENVIRONMENT_NAME: &'static str = "environment.name";
    pub const PROJECT_NAME: &'static str = "project.name";
    pub const COMPONENT_NAME: &'static str = "component.name";
    pub const COMPONENT_CATEGORY: &'static str = "component.category";
    pub const SERVER: &'static str = "server";
    pub const PROXY_HTTP: &'static str = "proxy.http";
    pub const PROXY_HTTPS: &'static str = "proxy.https";
    pub const PROXY_NO_PROXY: &'static str = "proxy.noProxy";
}

/// Mapping from placeholder name to replacement string.
///
/// A context is built for one unit of work and then only read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VarContext {
    vars: HashMap<String, String>,
}

impl VarContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set a variable
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Set a variable, replacing any previous value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Add variables that are not already defined
    pub fn extend_missing<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in vars {
            self.vars.entry(key.into()).or_insert_with(|| value.into());
        }
    }

    /// Look up a variable
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Resolve every placeholder in `template` that the context defines
pub fn resolve(template: &str, context: &VarContext) -> String {
    if !template.contains("${") {
        return template.to_string();
    }

    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match context.get(&caps[1]) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Whether the string still contains a `${...}` placeholder
pub fn has_placeholders(value: &str) -> bool {
    PLACEHOLDER.is_match(value)
}

/// Names of the placeholders remaining in `value`, in order of appearance
pub fn unresolved(value: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(value)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Values that can be resolved structurally.
///
/// Implementations return a copy of the same shape with every string leaf
/// resolved.
pub trait Resolvable {
    fn resolved(&self, context: &VarContext) -> Self;
}

impl Resolvable for String {
    fn resolved(&self, context: &VarContext) -> Self {
        resolve(self, context)
    }
}

impl<T: Resolvable> Resolvable for Vec<T> {
    fn resolved(&self, context: &VarContext) -> Self {
        self.iter().map(|item| item.resolved(context)).collect()
    }
}

impl<T: Resolvable> Resolvable for Option<T> {
    fn resolved(&self, context: &VarContext) -> Self {
        self.as_ref().map(|item| item.resolved(context))
    }
}

impl<T: Resolvable> Resolvable for IndexMap<String, T> {
    fn resolved(&self, context: &VarContext) -> Self {
        self.iter()
            .map(|(key, value)| (key.clone(), value.resolved(context)))
            .collect()
    }
}

impl Resolvable for Value {
    fn resolved(&self, context: &VarContext) -> Self {
        match self {
            Value::String(s) => Value::String(resolve(s, context)),
            Value::Array(items) => Value::Array(items.resolved(context)),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.resolved(context)))
                    .collect(),
            ),
            scalar => scalar.clone(),
        }
    }
}
