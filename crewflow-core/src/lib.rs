//! Core domain models and services for the Crewflow multi-agent system
//!
//! This crate contains the request classification, routing, and
//! collaboration-scheduling subsystem: the agent runtime and its
//! concurrency model, the intent classifier and routing-rule table,
//! the router with its selection strategies, the coordinator with its
//! collaboration strategies and conflict resolution, and the adaptive
//! health-check manager.

pub mod agent;
pub mod agents;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod health;
pub mod intent;
pub mod model;
pub mod registry;
pub mod request;
pub mod router;

pub use error::{Error, Result};
