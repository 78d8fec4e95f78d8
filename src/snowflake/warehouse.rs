use super::sql;
use crate::config::SnowflakeCredentials;
use crate::etl::{StagingArea, Warehouse};
use crate::model::LoadTarget;
use async_trait::async_trait;
use eyre::{Context, Result};
use snowflake_api::SnowflakeApi;

/// [`Warehouse`] backed by one Snowflake session
///
/// # Example
/// ```no_run
/// use admin_insights_etl::config::SnowflakeCredentials;
/// use admin_insights_etl::etl::Warehouse;
/// use admin_insights_etl::snowflake::SnowflakeWarehouse;
///
/// # async fn example() -> eyre::Result<()> {
/// let warehouse = SnowflakeWarehouse::connect(&SnowflakeCredentials::from_env()?)?;
/// warehouse.prepare("TABLEAU_CLOUD").await?;
/// # Ok(())
/// # }
/// ```
pub struct SnowflakeWarehouse {
    api: SnowflakeApi,
    account: String,
    database: String,
}

impl SnowflakeWarehouse {
    /// Configure a password-authenticated session
    ///
    /// The session is opened lazily by the first statement.
    pub fn connect(credentials: &SnowflakeCredentials) -> Result<Self> {
        let api = SnowflakeApi::with_password_auth(
            &credentials.account,
            credentials.warehouse.as_deref(),
            Some(credentials.database.as_str()),
            None,
            &credentials.user,
            credentials.role.as_deref(),
            &credentials.password,
        )
        .with_context(|| format!("Failed to configure Snowflake account {}", credentials.account))?;

        Ok(Self {
            api,
            account: credentials.account.clone(),
            database: credentials.database.clone(),
        })
    }

    async fn execute(&self, statement: &str) -> Result<()> {
        log::debug!("Snowflake: {}", statement);
        self.api
            .exec(statement)
            .await
            .with_context(|| format!("Statement failed: {}", statement))?;
        Ok(())
    }
}

impl std::fmt::Display for SnowflakeWarehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (database: {})", self.account, self.database)
    }
}

#[async_trait]
impl Warehouse for SnowflakeWarehouse {
    async fn prepare(&self, schema: &str) -> Result<()> {
        self.execute(&sql::create_schema(schema))
            .await
            .with_context(|| format!("Cannot use schema {} in {}", schema, self))?;
        log::info!("Connected to Snowflake {}", self);
        Ok(())
    }

    async fn stage_file(&self, target: &LoadTarget, area: &StagingArea) -> Result<()> {
        let source = std::path::absolute(&target.source)?;
        self.execute(&sql::create_file_format(area)).await?;
        self.execute(&sql::create_stage(area)).await?;
        self.execute(&sql::put_file(&source, area)).await
    }

    async fn create_table(&self, target: &LoadTarget, area: &StagingArea) -> Result<()> {
        self.execute(&sql::create_table_from_stage(target, area))
            .await
    }

    async fn copy_into(&self, target: &LoadTarget, area: &StagingArea) -> Result<()> {
        self.execute(&sql::copy_into(target, area)).await
    }

    async fn drop_stage(&self, area: &StagingArea) -> Result<()> {
        self.execute(&sql::drop_stage(area)).await
    }
}
