//! Snowflake as the load target
//!
//! [`SnowflakeWarehouse`] implements the warehouse sub-steps with the SQL
//! statements built in [`sql`].

pub mod sql;
mod warehouse;

pub use warehouse::SnowflakeWarehouse;
