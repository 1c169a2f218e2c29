//! Gateway for the department portal: rate-limited course submissions and
//! live, newest-first feeds over a document store.

pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod mirror;
pub mod models;
pub mod rate_limit;
pub mod services;
pub mod session;
pub mod state;
pub mod store;
pub mod youtube;
