//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;

/// Temporary workspace with scripts, a configuration document and reports
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.dir.path().join("reports")
    }

    /// Write an executable POSIX shell script
    #[cfg(unix)]
    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Write the configuration document and return its path
    pub fn config(&self, document: &Value) -> PathBuf {
        let path = self.dir.path().join("pipeline.json");
        std::fs::write(&path, serde_json::to_string_pretty(document).unwrap()).unwrap();
        path
    }

    pub fn read_json(&self, path: impl AsRef<Path>) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }
}

/// Health endpoint answering `/health/{server}`; listed servers get 503
pub async fn health_server(unhealthy: &[&str]) -> SocketAddr {
    let unhealthy: Arc<HashSet<String>> =
        Arc::new(unhealthy.iter().map(|s| s.to_string()).collect());

    let router = Router::new()
        .route("/health/{server}", get(health))
        .with_state(unhealthy);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn health(
    State(unhealthy): State<Arc<HashSet<String>>>,
    UrlPath(server): UrlPath<String>,
) -> (StatusCode, &'static str) {
    if unhealthy.contains(&server) {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    } else {
        (StatusCode::OK, "ok")
    }
}

/// Health settings pointing at a local test server
pub fn health_check(addr: SocketAddr) -> Value {
    serde_json::json!({
        "url": format!("http://{}/health/${{server}}", addr),
        "timeoutSeconds": 1,
        "retryIntervalSeconds": 1,
        "requestTimeoutSeconds": 1
    })
}
