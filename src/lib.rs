// src/lib.rs
//! Polls, voters and votes services.
//!
//! Each service owns one aggregate in a string-keyed JSON document store. The
//! votes service casts and retracts votes through [`coordinator::VoteCoordinator`],
//! which updates the poll and voter services over HTTP.

pub mod config;
pub mod coordinator;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod links;
pub mod metrics;
pub mod models;
pub mod poll;
pub mod routes;
pub mod saga;
pub mod server;
pub mod services;
pub mod store;
