//! CLI helper functions

use crate::{
    client::{PersonalAccessToken, TableauClient},
    config::{Config, HyperdSettings, SnowflakeCredentials, TableauCredentials},
    error::EtlError,
    etl::{ExtractSource, FormatConverter, RunOrchestrator, RunReport, Warehouse, WarehouseLoader},
    hyperd::HyperdEngine,
    model::ExtractDescriptor,
    naming::TableNamer,
    snowflake::SnowflakeWarehouse,
    storage::Workspace,
    tableau::TableauSource,
};
use eyre::{Context, Result};
use owo_colors::OwoColorize;
use std::path::Path;
use std::sync::Arc;

/// Load `config.yml`, or defaults if there is none
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let config = Config::read(path)?;
    log::debug!("Configuration: {:?}", config);
    Ok(config)
}

/// Sign in to Tableau Cloud with the credentials from the environment
///
/// Expected environment variables:
/// - TABLEAU_CLOUD_URI, TABLEAU_CLOUD_SITE, PAT_NAME, PAT_SECRET
pub async fn connect_tableau(config: &Config) -> Result<TableauClient> {
    let credentials = TableauCredentials::from_env()?;
    let token = PersonalAccessToken::new(&credentials.token_name, &credentials.token_secret);

    let client = TableauClient::try_new(credentials.url.clone(), config.request_timeout())
        .context("Failed to create Tableau client")?
        .with_api_version(&config.api_version);
    let client = match config.use_server_version {
        true => client.use_server_version().await?,
        false => client,
    };

    log::info!("Connecting to Tableau at {}", client.url().as_str().bright_black());
    let client = client.sign_in(&token, &credentials.site).await?;
    log::debug!("Tableau session: {}", client);
    Ok(client)
}

/// Configure the Snowflake session from the environment
pub fn connect_warehouse() -> Result<SnowflakeWarehouse> {
    let credentials = SnowflakeCredentials::from_env()?;
    log::debug!("Snowflake credentials: {:?}", credentials);
    SnowflakeWarehouse::connect(&credentials)
}

fn table_namer(config: &Config) -> TableNamer {
    TableNamer::new(&config.target_schema, config.target_table_prefix.as_deref())
}

async fn sign_out(client: &TableauClient) {
    if let Err(e) = client.sign_out().await {
        log::warn!("Failed to sign out of Tableau: {}", e);
    }
}

/// Run the full pipeline for the configured project
///
/// Pipeline: TableauSource → ArchiveUnpacker → HyperdEngine → SnowflakeWarehouse
///
/// Per-extract failures are part of the returned report. Errors are only
/// returned when the run could not start or was aborted.
pub async fn run_etl(config: &Config, retain: bool) -> Result<RunReport> {
    let client = connect_tableau(config).await?;
    let result = run_with_client(config, retain, &client).await;
    sign_out(&client).await;
    result
}

async fn run_with_client(config: &Config, retain: bool, client: &TableauClient) -> Result<RunReport> {
    let warehouse = Arc::new(connect_warehouse()?);
    let engine = Arc::new(
        HyperdEngine::start(&HyperdSettings::from_env()?, &config.work_dir.join("hyperd"))
            .await
            .context("Failed to start the Hyper engine")?,
    );

    let orchestrator = RunOrchestrator::new(
        Arc::new(TableauSource::new(client.clone())),
        FormatConverter::new(engine.clone(), config.source_table()?),
        WarehouseLoader::new(warehouse).with_retry(config.retry_policy()),
        table_namer(config),
        &config.project_name,
    )
    .with_concurrency(config.concurrency)
    .with_fetch_retry(config.retry_policy());

    let workspace = Arc::new(Workspace::create(
        &config.work_dir,
        &Workspace::new_run_id(),
        retain,
    )?);

    let result = orchestrator.run(Arc::clone(&workspace)).await;
    engine.shutdown();

    match result {
        Ok(report) => Ok(report),
        Err(e) => {
            // Nothing was processed yet, so the directory holds no artifacts
            if let Err(cleanup) = workspace.cleanup() {
                log::debug!("Failed to remove {}: {}", workspace.root().display(), cleanup);
            }
            Err(e).context("Run aborted")
        }
    }
}

/// Check the Tableau and Snowflake credentials
pub async fn test_auth(config: &Config) -> Result<()> {
    let client = connect_tableau(config).await?;
    log::info!("✓ Tableau sign-in succeeded: {}", client.to_string().green());
    sign_out(&client).await;

    let namer = table_namer(config);
    let warehouse = connect_warehouse()?;
    warehouse
        .prepare(namer.schema())
        .await
        .context("Snowflake session failed")?;
    log::info!("✓ Snowflake session succeeded: {}", warehouse.to_string().green());
    Ok(())
}

/// List the project's data sources with the table each one loads into
pub async fn list_extracts(
    config: &Config,
) -> Result<Vec<(ExtractDescriptor, Result<String, EtlError>)>> {
    let client = connect_tableau(config).await?;
    let source = TableauSource::new(client);
    let extracts = source.locate(&config.project_name).await;
    sign_out(source.client()).await;
    let extracts = extracts?;

    let namer = table_namer(config);
    let plan = namer.plan(&extracts);
    Ok(extracts
        .into_iter()
        .zip(plan)
        .map(|(extract, table)| {
            let table = table.map(|name| format!("{}.{}", namer.schema(), name));
            (extract, table)
        })
        .collect())
}
