use crate::config::HyperdSettings;
use crate::etl::{ExtractEngine, TableRef};
use async_trait::async_trait;
use eyre::{Context, Result, eyre};
use std::path::Path;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio_postgres::NoTls;

/// How long a spawned hyperd gets to start listening
const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);
const STARTUP_POLL: Duration = Duration::from_millis(100);

/// Database user hyperd creates for local connections
const HYPER_USER: &str = "tableau_internal_user";

/// [`ExtractEngine`] backed by a `hyperd` server
///
/// A spawned server is killed when the engine is dropped.
pub struct HyperdEngine {
    host: String,
    port: u16,
    process: Option<Mutex<Child>>,
}

impl HyperdEngine {
    /// Attach to or spawn hyperd according to `settings`
    ///
    /// A spawned server writes its logs below `log_dir`.
    ///
    /// # Errors
    /// Returns an error if hyperd cannot be started or does not accept
    /// connections within 30 seconds
    pub async fn start(settings: &HyperdSettings, log_dir: &Path) -> Result<Self> {
        match settings {
            HyperdSettings::Endpoint { host, port } => {
                log::debug!("Using hyperd at {}:{}", host, port);
                Ok(Self {
                    host: host.clone(),
                    port: *port,
                    process: None,
                })
            }
            HyperdSettings::Spawn { executable, port } => {
                std::fs::create_dir_all(log_dir).with_context(|| {
                    format!("Failed to create hyperd log directory {}", log_dir.display())
                })?;

                log::debug!("Starting {} on port {}", executable.display(), port);
                let child = Command::new(executable)
                    .args(spawn_args(*port, log_dir))
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .kill_on_drop(true)
                    .spawn()
                    .with_context(|| format!("Failed to start {}", executable.display()))?;

                let engine = Self {
                    host: "localhost".to_string(),
                    port: *port,
                    process: Some(Mutex::new(child)),
                };
                engine.wait_until_ready().await?;
                log::info!("Hyper engine listening on {}", engine.endpoint());
                Ok(engine)
            }
        }
    }

    /// `host:port` the engine accepts connections on
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn wait_until_ready(&self) -> Result<()> {
        let deadline = tokio::time::Instant::now() + STARTUP_TIMEOUT;
        loop {
            if TcpStream::connect((self.host.as_str(), self.port)).await.is_ok() {
                return Ok(());
            }
            if let Some(process) = &self.process {
                let mut child = process.lock().unwrap_or_else(|p| p.into_inner());
                if let Some(status) = child.try_wait()? {
                    eyre::bail!("hyperd exited during startup ({})", status);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                eyre::bail!(
                    "hyperd did not accept connections on {} within {:?}",
                    self.endpoint(),
                    STARTUP_TIMEOUT
                );
            }
            tokio::time::sleep(STARTUP_POLL).await;
        }
    }

    fn connection_config(&self, database: &Path) -> tokio_postgres::Config {
        let dbname = database.to_string_lossy().to_string();
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(HYPER_USER)
            .dbname(&dbname)
            .application_name("insights-etl");
        config
    }

    /// Stop a spawned server. Does nothing for an attached one.
    pub fn shutdown(&self) {
        if let Some(process) = &self.process {
            let mut child = process.lock().unwrap_or_else(|p| p.into_inner());
            if let Err(e) = child.start_kill() {
                log::debug!("hyperd already stopped: {}", e);
            }
        }
    }
}

#[async_trait]
impl ExtractEngine for HyperdEngine {
    async fn export(&self, database: &Path, table: &TableRef, output: &Path) -> Result<u64> {
        let (client, connection) = self
            .connection_config(database)
            .connect(NoTls)
            .await
            .with_context(|| format!("Failed to open {} in hyperd", database.display()))?;

        let endpoint = self.endpoint();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                log::warn!("hyperd connection to {} closed: {}", endpoint, e);
            }
        });

        let row = client
            .query_one(count_rows_sql(table).as_str(), &[])
            .await
            .with_context(|| format!("Failed to count rows of {}", table))?;
        let rows: i64 = row.try_get(0)?;

        let output = std::path::absolute(output)?;
        client
            .batch_execute(&copy_to_sql(table, &output))
            .await
            .with_context(|| format!("Failed to export {} to {}", table, output.display()))?;

        u64::try_from(rows).map_err(|_| eyre!("hyperd reported {} rows for {}", rows, table))
    }
}

/// Command line for a private hyperd listening on `port`
fn spawn_args(port: u16, log_dir: &Path) -> Vec<String> {
    vec![
        "run".to_string(),
        "--skip-license".to_string(),
        "--no-password".to_string(),
        format!("--init-user={}", HYPER_USER),
        format!("--listen-connection=tab.tcp://localhost:{}", port),
        format!("--log-dir={}", log_dir.display()),
    ]
}

fn count_rows_sql(table: &TableRef) -> String {
    format!("SELECT COUNT(*) FROM {}", table)
}

/// Hyper picks the output format from the file extension
fn copy_to_sql(table: &TableRef, output: &Path) -> String {
    let path = output.to_string_lossy().replace('\'', "''");
    format!("COPY {} TO '{}'", table, path)
}
