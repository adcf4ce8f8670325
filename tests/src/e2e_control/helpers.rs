//! Shared helpers for control-plane e2e scenarios.

use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use api::{ApiClient, ApiClientFactory, MockApiClient};
use sdk::{ClientConfig, RunnerClient};
use server::ControlContext;
use slog::Logger;
use tempfile::TempDir;
use tokio::task::JoinHandle;

pub fn create_test_logger() -> Logger {
    Logger::root(slog::Discard, slog::o!())
}

/// A stub "node binary": shell script that idles until signalled, so the
/// manager has a real child process to supervise.
pub fn stub_binary(dir: &TempDir) -> String {
    let path = dir.path().join("meridian-stub.sh");
    fs::write(&path, "#!/bin/sh\nexec sleep 300\n").unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }
    path.to_string_lossy().into_owned()
}

/// Factory producing mock clients that report healthy immediately,
/// recording every client it hands out.
pub fn healthy_factory(store: Arc<Mutex<Vec<Arc<MockApiClient>>>>) -> ApiClientFactory {
    Arc::new(move |ip: &str, port: u16| {
        let client = Arc::new(MockApiClient::healthy(
            format!("{ip}:{port}"),
            format!("NodeID-{port}"),
        ));
        store.lock().unwrap().push(Arc::clone(&client));
        client as Arc<dyn ApiClient>
    })
}

/// Factory producing mock clients that never finish bootstrapping.
pub fn booting_factory() -> ApiClientFactory {
    Arc::new(|ip: &str, port: u16| {
        Arc::new(MockApiClient::booting(
            format!("{ip}:{port}"),
            format!("NodeID-{port}"),
        )) as Arc<dyn ApiClient>
    })
}

/// One in-process control server plus a client pointed at it.
pub struct TestServer {
    pub client: RunnerClient,
    server_task: JoinHandle<()>,
}

impl TestServer {
    /// Spin up a control server on an ephemeral port with fast health
    /// timeouts suited to mock clients.
    pub async fn spawn(dir: &TempDir, client_factory: ApiClientFactory) -> Self {
        let mut context = ControlContext::new(
            create_test_logger(),
            dir.path().join("data"),
            client_factory,
        );
        context.healthy_timeout = Duration::from_secs(2);
        context.poll_interval = Duration::from_millis(10);
        let context = Arc::new(context);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = server::router(context);
        let server_task = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let client = RunnerClient::new(
            ClientConfig::new(format!("http://{addr}")).with_timeout(Duration::from_secs(10)),
        );

        Self {
            client,
            server_task,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server_task.abort();
    }
}
