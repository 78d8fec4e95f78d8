//! Tableau REST API client and authentication.
//!
//! This module provides the [`TableauClient`] for interacting with the
//! Tableau Cloud REST API, along with the [`PersonalAccessToken`] it signs
//! in with.

mod auth;
mod tableau;

pub use auth::PersonalAccessToken;
pub use tableau::TableauClient;
