//! Supply Tracker - supplies inventory and purchase price database
//!
//! A small-business inventory tracker: products, supplier companies and
//! purchase records behind a JSON REST API, with price comparison and
//! spending analytics derived from the purchase history.

pub mod analytics;
pub mod database;
pub mod error;
pub mod models;
pub mod validation;
pub mod web;

pub use database::init_schema;
pub use error::{Result, TrackerError};
