//! Argument list construction
//!
//! Parameters become discrete argv entries in insertion order and are never
//! joined into a shell string. The only string rendering is the audit line
//! recorded on the outcome.

use std::path::Path;

use crate::models::component::{ActionSpec, ParamValue, Parameters};

/// Build the argument list for a parameter map.
///
/// `true` becomes a bare `-Key` flag, `false` is omitted, lists are joined
/// with commas and everything else becomes a `-Key value` pair.
pub fn build_args(parameters: &Parameters) -> Vec<String> {
    let mut args = Vec::with_capacity(parameters.len() * 2);
    for (key, value) in parameters {
        match value {
            ParamValue::Flag(true) => args.push(flag(key)),
            ParamValue::Flag(false) => {}
            ParamValue::Text(text) => {
                args.push(flag(key));
                args.push(text.clone());
            }
            ParamValue::List(items) => {
                args.push(flag(key));
                args.push(items.join(","));
            }
        }
    }
    args
}

fn flag(key: &str) -> String {
    if key.starts_with('-') {
        key.to_string()
    } else {
        format!("-{}", key)
    }
}

/// Full argv for an action: interpreter prefix, script, parameters
pub fn command_argv(spec: &ActionSpec, script: &Path) -> Vec<String> {
    let mut argv = spec.interpreter.clone();
    argv.push(script.to_string_lossy().into_owned());
    argv.extend(build_args(&spec.parameters));
    argv
}

/// Render an argv as a single line for the audit trail
pub fn audit_line(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| quote(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote(arg: &str) -> String {
    if !arg.is_empty() && !arg.chars().any(|c| c.is_whitespace() || c == '"') {
        return arg.to_string();
    }
    format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
}
