//! Run-level enums shared by scheduling and reporting

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Traversal order over the (component x server) product
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Components outer, servers inner
    #[default]
    ByComponent,
    /// Servers outer, components inner; one probe per server
    ByServer,
    /// Servers outer; each server must pass its probe before the next starts
    Rolling,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::ByComponent => "by-component",
            Strategy::ByServer => "by-server",
            Strategy::Rolling => "rolling",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "by-component" | "bycomponent" | "component" => Ok(Strategy::ByComponent),
            "by-server" | "byserver" | "server" => Ok(Strategy::ByServer),
            "rolling" => Ok(Strategy::Rolling),
            _ => Err(format!(
                "Invalid strategy: {} (expected by-component, by-server or rolling)",
                s
            )),
        }
    }
}

impl<'de> Deserialize<'de> for Strategy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Which action of each component a run executes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Build,
    #[default]
    Deploy,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Build => "build",
            Phase::Deploy => "deploy",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "build" => Ok(Phase::Build),
            "deploy" => Ok(Phase::Deploy),
            _ => Err(format!("Invalid phase: {} (expected build or deploy)", s)),
        }
    }
}

/// Terminal status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("by-component".parse::<Strategy>().unwrap(), Strategy::ByComponent);
        assert_eq!("BY_SERVER".parse::<Strategy>().unwrap(), Strategy::ByServer);
        assert_eq!("Rolling".parse::<Strategy>().unwrap(), Strategy::Rolling);
        assert!("canary".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_strategy_deserialize_is_lenient() {
        let strategy: Strategy = serde_json::from_str("\"by_server\"").unwrap();
        assert_eq!(strategy, Strategy::ByServer);
    }

    #[test]
    fn test_strategy_serde_matches_cli_names() {
        for strategy in [Strategy::ByComponent, Strategy::ByServer, Strategy::Rolling] {
            let json = serde_json::to_string(&strategy).unwrap();
            assert_eq!(json, format!("\"{}\"", strategy.as_str()));
        }
    }

    #[test]
    fn test_phase_parsing() {
        assert_eq!("BUILD".parse::<Phase>().unwrap(), Phase::Build);
        assert!("test".parse::<Phase>().is_err());
    }
}
