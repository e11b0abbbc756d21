pub mod api;
pub mod config;
pub mod context; // Process-wide state plus balance and cleanup entry points
pub mod contracts;
pub mod error;
pub mod testing; // Mock wallet, transport and contract backend
pub mod utils;
pub mod wallet;

pub use context::{ClientContext, ClientDeps};
pub use error::{ClientError, Result};
