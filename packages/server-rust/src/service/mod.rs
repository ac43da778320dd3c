//! Message routing and execution framework.
//!
//! 1. **Classification** (`classify`): `InboundMessage` -> `Result<Operation, ClassifyError>`
//! 2. **Handlers** (`handlers`): built-in system message processing
//! 3. **Routing** (`router`): dispatch to system or user handlers, exposed as a tower `Service`
//! 4. **Background workers** (`worker`): periodic tasks (topology monitor)

pub mod classify;
pub mod config;
pub mod handlers;
pub mod operation;
pub mod router;
pub mod worker;

// Re-export key types for convenient access.
pub use classify::classify;
pub use config::{ConfigError, MetaServerConfig};
pub use handlers::SystemHandlers;
pub use operation::{ClassifyError, InboundMessage, Operation, Reply};
pub use router::{MessageRouter, RouterService, UserHandler};
pub use worker::{BackgroundRunnable, BackgroundWorker};
