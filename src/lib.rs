//! Pediablog - pediatric hospital blog and CMS
//!
//! The server half (`api`, `services`, `db`, `cache`) exposes the blog over
//! REST. The `client` module keeps a consumer of that API in sync with it.

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
