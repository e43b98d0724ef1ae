//! Environment and target server resolution

use indexmap::IndexMap;
use tracing::debug;

use crate::catalog::patterns::PatternSet;
use crate::errors::OrchestratorError;
use crate::models::config::{ConfigDocument, HealthCheckSettings, ProxySettings};
use crate::resolver::{VarContext, Vars};

/// One environment selected from the document
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key of the environment in the document
    pub name: String,

    /// Human-readable name, exposed as `${environment}`
    pub display_name: String,

    /// Servers in document order
    pub servers: Vec<String>,

    pub proxy: ProxySettings,
    pub variables: IndexMap<String, String>,

    /// Deploy-level health settings with the environment's overrides applied
    pub health_check: HealthCheckSettings,
}

impl Environment {
    /// Select an environment by key; falls back to a case-insensitive match
    /// on key or display name
    pub fn select(document: &ConfigDocument, name: &str) -> Result<Self, OrchestratorError> {
        let found = document.environments.get_key_value(name).or_else(|| {
            let wanted = name.to_lowercase();
            document.environments.iter().find(|(key, env)| {
                key.to_lowercase() == wanted
                    || env
                        .display_name
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase() == wanted)
            })
        });

        let Some((key, section)) = found else {
            let known: Vec<&str> = document.environments.keys().map(String::as_str).collect();
            return Err(OrchestratorError::EnvironmentError(format!(
                "environment '{}' is not defined (known: {})",
                name,
                if known.is_empty() {
                    "none".to_string()
                } else {
                    known.join(", ")
                }
            )));
        };

        let base = document.deploy.health_check.clone().unwrap_or_default();
        let health_check = match section.health_check.as_ref() {
            Some(overrides) => base.overlay(overrides),
            None => base,
        };

        Ok(Self {
            name: key.clone(),
            display_name: section.display_name.clone().unwrap_or_else(|| key.clone()),
            servers: section.servers.0.clone(),
            proxy: section.proxy.clone().unwrap_or_default(),
            variables: section.variables.clone(),
            health_check,
        })
    }

    /// Resolve the target server set, optionally filtered by glob patterns.
    ///
    /// An empty result is a configuration error.
    pub fn resolve_servers(&self, filter: Option<&str>) -> Result<Vec<String>, OrchestratorError> {
        let patterns = PatternSet::parse(filter);
        let servers: Vec<String> = self
            .servers
            .iter()
            .filter(|server| patterns.matches(server))
            .cloned()
            .collect();

        if servers.is_empty() {
            return Err(OrchestratorError::NoServers(match filter {
                Some(filter) => format!(
                    "environment '{}' has no servers matching '{}'",
                    self.name, filter
                ),
                None => format!("environment '{}' defines no servers", self.name),
            }));
        }

        debug!("Resolved {} target server(s) for {}", servers.len(), self.name);
        Ok(servers)
    }

    /// Add this environment's variables to a context
    pub fn apply(&self, context: &mut VarContext) {
        context.set(Vars::ENVIRONMENT, self.display_name.clone());
        context.set(Vars::ENVIRONMENT_NAME, self.name.clone());
        if let Some(http) = &self.proxy.http {
            context.set(Vars::PROXY_HTTP, http.clone());
        }
        if let Some(https) = &self.proxy.https {
            context.set(Vars::PROXY_HTTPS, https.clone());
        }
        if let Some(no_proxy) = &self.proxy.no_proxy {
            context.set(Vars::PROXY_NO_PROXY, no_proxy.clone());
        }
    }
}
