//! Configuration errors abort before any action runs and map to exit code 2

#![cfg(unix)]

mod common;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::Workspace;
use shipwright::app::options::RunOptions;
use shipwright::app::run::execute;
use shipwright::deploy::executor::ProcessExecutor;
use shipwright::deploy::health::HttpProber;
use shipwright::errors::OrchestratorError;

fn document() -> serde_json::Value {
    json!({
        "project": { "name": "shop" },
        "deploy": { "scriptPath": "deploy.sh" },
        "components": { "apis": [ { "name": "api-a" } ] },
        "environments": {
            "qa": { "servers": "srv1, srv2" },
            "empty": { "servers": [] }
        }
    })
}

async fn attempt(workspace: &Workspace, options: RunOptions) -> (OrchestratorError, usize) {
    let executor = ProcessExecutor::new();
    let prober = HttpProber::new().unwrap();
    let err = execute(&options, &executor, &prober, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(!workspace.reports_dir().exists(), "no report for a configuration error");
    (err, executor.spawn_count())
}

fn options(workspace: &Workspace, environment: &str) -> RunOptions {
    RunOptions {
        config_path: workspace.config(&document()),
        environment: environment.to_string(),
        reports_dir: Some(workspace.reports_dir()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_undefined_environment() {
    let workspace = Workspace::new();
    workspace.script("deploy.sh", "exit 0");

    let (err, spawned) = attempt(&workspace, options(&workspace, "prod")).await;
    assert!(matches!(err, OrchestratorError::EnvironmentError(_)));
    assert_eq!(err.exit_code(), 2);
    assert_eq!(spawned, 0);
}

#[tokio::test]
async fn test_empty_server_set() {
    let workspace = Workspace::new();
    workspace.script("deploy.sh", "exit 0");

    let (err, _) = attempt(&workspace, options(&workspace, "empty")).await;
    assert!(matches!(err, OrchestratorError::NoServers(_)));
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn test_server_filter_matching_nothing() {
    let workspace = Workspace::new();
    workspace.script("deploy.sh", "exit 0");

    let (err, _) = attempt(
        &workspace,
        RunOptions {
            server_filter: Some("prod-*".to_string()),
            ..options(&workspace, "qa")
        },
    )
    .await;
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn test_missing_script_is_caught_before_running() {
    let workspace = Workspace::new();

    let (err, spawned) = attempt(&workspace, options(&workspace, "qa")).await;
    assert!(matches!(err, OrchestratorError::ConfigError(_)));
    assert!(err.to_string().contains("api-a"));
    assert_eq!(err.exit_code(), 2);
    assert_eq!(spawned, 0);
}

#[tokio::test]
async fn test_unparseable_document() {
    let workspace = Workspace::new();
    let path = workspace.path().join("broken.json");
    std::fs::write(&path, "{ \"project\": ").unwrap();

    let (err, _) = attempt(
        &workspace,
        RunOptions {
            config_path: path,
            environment: "qa".to_string(),
            reports_dir: Some(workspace.reports_dir()),
            ..Default::default()
        },
    )
    .await;
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn test_duplicate_component_names() {
    let workspace = Workspace::new();
    let mut doc = document();
    doc["components"]["apis"] = json!([ { "name": "api-a" }, { "name": "api-a", "enabled": false } ]);
    let path = workspace.config(&doc);

    let (err, _) = attempt(
        &workspace,
        RunOptions {
            config_path: path,
            environment: "qa".to_string(),
            reports_dir: Some(workspace.reports_dir()),
            ..Default::default()
        },
    )
    .await;
    assert!(matches!(err, OrchestratorError::DuplicateComponent { .. }));
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn test_templated_script_path_is_checked_per_unit() {
    let workspace = Workspace::new();
    workspace.script("scripts/srv1/deploy.sh", "exit 0");
    let mut doc = document();
    doc["deploy"]["scriptPath"] = json!("scripts/${server}/deploy.sh");

    let (err, spawned) = attempt(
        &workspace,
        RunOptions {
            config_path: workspace.config(&doc),
            environment: "qa".to_string(),
            reports_dir: Some(workspace.reports_dir()),
            ..Default::default()
        },
    )
    .await;
    assert!(matches!(err, OrchestratorError::ConfigError(_)));
    assert!(err.to_string().contains("srv2"));
    assert_eq!(err.exit_code(), 2);
    assert_eq!(spawned, 0);
}

#[tokio::test]
async fn test_script_path_from_environment_name_is_checked() {
    let workspace = Workspace::new();
    let mut doc = document();
    doc["deploy"]["scriptPath"] = json!("scripts/${environment.name}/deploy.sh");

    let (err, spawned) = attempt(
        &workspace,
        RunOptions {
            config_path: workspace.config(&doc),
            environment: "qa".to_string(),
            reports_dir: Some(workspace.reports_dir()),
            ..Default::default()
        },
    )
    .await;
    assert!(err.to_string().contains("scripts/qa/deploy.sh"));
    assert_eq!(err.exit_code(), 2);
    assert_eq!(spawned, 0);
}

#[tokio::test]
async fn test_zero_action_timeout() {
    let workspace = Workspace::new();
    workspace.script("deploy.sh", "exit 0");

    let (err, spawned) = attempt(
        &workspace,
        RunOptions {
            action_timeout: Some(std::time::Duration::ZERO),
            ..options(&workspace, "qa")
        },
    )
    .await;
    assert!(matches!(err, OrchestratorError::ValidationError(_)));
    assert_eq!(err.exit_code(), 2);
    assert_eq!(spawned, 0);
}
