//! Library crate for the subathon timer, exposing modules for binaries and integration tests.

pub mod config;
pub mod dao;
pub mod dto;
pub mod ingest;
pub mod routes;
mod sanitize;
pub mod services;
pub mod state;
