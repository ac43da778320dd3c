//! HTTP handler definitions for the meta server.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for convenient access
//! when building the router.

pub mod health;
pub mod message;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use message::{system_message_handler, user_message_handler};

use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;
use crate::node::MetaServerNode;

/// Shared application state passed to all axum handlers via `State` extraction.
#[derive(Clone)]
pub struct AppState {
    /// The coordinator instance requests are routed into.
    pub node: Arc<MetaServerNode>,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(node: Arc<MetaServerNode>) -> Self {
        Self {
            shutdown: node.shutdown_controller(),
            node,
            start_time: Instant::now(),
        }
    }
}
