//! Wallet-side WalletConnect v2 broker that impersonates an address.
//!
//! dApps pair with the broker and see the configured address as a connected
//! wallet. Transaction requests are relayed to a simulation fork and
//! recorded in an audit log; every other wallet method is refused.

pub mod audit;
pub mod bootstrap;
pub mod broker;
pub mod cli;
pub mod config;
pub mod error;
pub mod networks;
pub mod resolver;
pub mod session;
pub mod settings;
pub mod simulation;
pub mod target;
pub mod transport;
