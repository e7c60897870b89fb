//! services/shell/src/lib.rs
//!
//! The shell service: Postgres and OpenAI adapters behind the core ports, and
//! the HTTP surface the browser app talks to.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
