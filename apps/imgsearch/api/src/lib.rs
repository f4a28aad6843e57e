//! Image similarity search HTTP service
//!
//! Startup order matters: migrations, then the index build from the embedding
//! store, then the listener. Requests never reach an index that has not
//! finished its startup build.
//!
//! ## Modules
//!
//! - `config`: environment-driven configuration
//! - `server`: wiring, router and lifecycle

pub mod config;
pub mod server;

pub use config::Config;
pub use server::{build_router, run};
