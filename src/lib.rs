//! Techem tenant consumption client.
//!
//! Logs in to the Techem analytics GraphQL endpoint, fetches yearly and
//! weekly consumption rows and the heat KPI breakdown for one rental unit,
//! and turns them into dashboard readings.

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod graphql;
pub mod logging;
pub mod metrics;
pub mod readings;

pub use client::ProviderClient;
pub use config::{Config, CountryEndpoint, Credentials};
