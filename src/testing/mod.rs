//! Test doubles for the wallet provider, the trading API and the contract backend.
//!
//! Exported from the library so integration tests and downstream crates can drive
//! the client without a browser wallet, a live API or a node.

pub mod mock_contracts;
pub mod mock_transport;
pub mod mock_wallet;

pub use mock_contracts::{MockContracts, SentTransaction};
pub use mock_transport::MockTransport;
pub use mock_wallet::MockWallet;
