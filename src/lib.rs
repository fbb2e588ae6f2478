#![deny(missing_docs)]
//! A multithreaded marketplace server: customers list products, administrators approve them,
//! and customers fill carts and check out, paying from a wallet.
//!
//! This crate provides the [`Store`] holding all marketplace state, a [`MarketServer`] that
//! serves it over TCP, and a [`MarketClient`] for talking to the server. The `market-server`
//! and `market-client` executables wrap the latter two.
//!
//! ## Store
//! [`Store`] is the single authority over users and products. It is responsible for:
//! - user accounts, logins and wallets
//! - the product approval workflow (`PendingApproval -> Approved -> Sold`)
//! - carts and an atomic checkout that moves stock and money in one step
//! - persisting dirty state through a [`Persistence`] collaborator after mutations
//!
//! All state sits behind one lock, so every operation, checkout included, is atomic with
//! respect to every other. Queries return copies.
//!
//! ## Persistence
//! [`CsvPersistence`] keeps the state in `users.csv`, `products.csv`, `transactions.csv`,
//! `carts.csv` and `counters.csv` inside a data directory. Only the files whose contents
//! changed are rewritten, each through a temporary file that is renamed into place.
//!
//! ## Protocol
//! Clients send one command per line, e.g. `ADD_TO_CART bob 3 2`, and get back either
//! `OK <TAG> [value]`, a table (`OK <TAG>`, rows, `END`) or `ERROR <message>`. See
//! [`Request`] and [`Response`] for the full command set.
//!
//! [`Persistence`]: persist::Persistence
//! [`CsvPersistence`]: persist::CsvPersistence

pub use client::{LoginInfo, MarketClient};
pub use command::{Request, Response};
pub use config::{PoolKind, ServerConfig};
pub use connection::{Connection, LineBuffer, Session};
pub use dispatch::Dispatcher;
pub use error::{MarketError, Result};
pub use persist::{CsvPersistence, MemoryPersistence};
pub use server::MarketServer;
pub use store::{FlushPolicy, Store};
pub use thread_pool::{NaiveThreadPool, RayonThreadPool, SharedQueueThreadPool, ThreadPool};

mod client;
pub mod command;
pub mod config;
mod connection;
mod dispatch;
mod error;
pub mod model;
pub mod password;
pub mod persist;
mod server;
pub mod store;
pub mod thread_pool;
