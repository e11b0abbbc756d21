//! Wallet Module
//!
//! - Actor identity (connected account or per-process session)
//! - Provider seam for injected wallets and plain JSON-RPC nodes
//! - Connection state guard with probe de-duplication and single-flight connect

pub mod actor;
pub mod connection;
pub mod provider;

pub use actor::{ActorId, SessionToken};
pub use connection::{
    ConnectionGuard, ConnectionSnapshot, ConnectionStatus, DEFAULT_CONNECTION_COOLDOWN,
};
pub use provider::{HttpRpcProvider, ProviderError, WalletEvent, WalletProvider};
