//! Test server management.
//!
//! Spawns and manages presenced instances for integration testing.

use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

use super::TEST_SECRET;

/// A test server instance.
pub struct TestServer {
    child: Child,
    port: u16,
    // Held so the config outlives the process.
    _data_dir: TempDir,
}

impl TestServer {
    /// Spawn a daemon with fast test timings.
    ///
    /// Heartbeats are expected every 100ms and a principal goes offline after
    /// 300ms of silence.
    pub async fn spawn(port: u16) -> anyhow::Result<Self> {
        Self::spawn_with(port, "").await
    }

    /// Spawn with extra `[listen]` keys (e.g. `allowed_origins`).
    pub async fn spawn_with(port: u16, extra_listen: &str) -> anyhow::Result<Self> {
        let data_dir = tempfile::tempdir()?;
        let config_path = data_dir.path().join("presenced.toml");
        let config_content = format!(
            r#"
[server]
name = "test.presence"
metrics_port = 0

[listen]
address = "127.0.0.1:{port}"
registration_timeout_ms = 1000
{extra_listen}

[presence]
heartbeat_interval_ms = 100
staleness_window_ms = 300
sweep_interval_ms = 50
broadcast_interval_ms = 50
reap_after_ms = 5000

[auth]
jwt_secret = "{TEST_SECRET}"

[[profiles]]
id = "alice"
username = "Alice"
avatar = "https://chat.example/alice.png"
"#
        );
        std::fs::write(&config_path, config_content)?;

        let binary_path = PathBuf::from(env!("CARGO_BIN_EXE_presenced"));
        let child = Command::new(&binary_path)
            .arg(&config_path)
            .env("RUST_LOG", "warn")
            .spawn()?;

        let server = Self {
            child,
            port,
            _data_dir: data_dir,
        };

        // Wait for server to start listening
        server.wait_until_ready().await?;

        Ok(server)
    }

    /// Wait until the server is accepting connections.
    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        for _ in 0..50 {
            if tokio::net::TcpStream::connect(("127.0.0.1", self.port))
                .await
                .is_ok()
            {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("Server failed to start within 5 seconds")
    }

    /// WebSocket URL of the server.
    pub fn url(&self) -> String {
        format!("ws://127.0.0.1:{}/", self.port)
    }

    /// Create a new test client connected to this server.
    pub async fn connect(&self) -> anyhow::Result<super::client::TestClient> {
        super::client::TestClient::connect(&self.url(), None).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
