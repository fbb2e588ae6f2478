//! Server settings, validated from raw command line or environment values.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::connection::DEFAULT_MAX_LINE_LEN;
use crate::error::{MarketError, Result};
use crate::store::FlushPolicy;

/// the address the server listens on unless configured otherwise
pub const DEFAULT_ADDRESS: &str = "0.0.0.0:12345";
/// the directory holding the CSV files unless configured otherwise
pub const DEFAULT_DATA_DIR: &str = "./data";
/// worker threads of the shared queue and rayon pools unless configured otherwise
pub const DEFAULT_THREADS: u32 = 4;
/// the thread pool used unless configured otherwise
pub const DEFAULT_POOL: PoolKind = PoolKind::naive;

pub use self::pool_kind::PoolKind;

mod pool_kind {
    #![allow(missing_docs, non_camel_case_types)]
    use clap::arg_enum;

    arg_enum! {
        /// Which [`ThreadPool`](crate::thread_pool::ThreadPool) serves connections: a thread
        /// per connection, a fixed set of workers fed through a crossbeam channel, or rayon
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum PoolKind {
            naive,
            shared,
            rayon
        }
    }
}

impl PoolKind {
    /// parses a pool name, ignoring case
    ///
    /// # Errors
    /// [`MarketError::Parsing`] listing the valid names
    pub fn from_name(name: &str) -> Result<PoolKind> {
        name.trim().parse().map_err(|valid: String| {
            MarketError::Parsing(format!("unknown thread pool {:?}, {}", name, valid))
        })
    }
}

/// Everything the server binary needs to start
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// where to listen
    pub addr: SocketAddr,
    /// where the CSV files live
    pub data_dir: PathBuf,
    /// which thread pool serves connections
    pub pool: PoolKind,
    /// worker threads, ignored by the naive pool
    pub threads: u32,
    /// when changes reach the disk
    pub flush: FlushPolicy,
    /// longest accepted request line in bytes
    pub max_line_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            addr: SocketAddr::from(([0, 0, 0, 0], 12345)),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            pool: DEFAULT_POOL,
            threads: DEFAULT_THREADS,
            flush: FlushPolicy::Sync,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}

impl ServerConfig {
    /// validates raw option values, as given on the command line, into a config.
    /// A flush interval of `0` means flushing after every change.
    ///
    /// # Errors
    /// [`MarketError::Parsing`] naming the first value that does not parse
    pub fn build(
        addr: &str,
        data_dir: &str,
        pool: PoolKind,
        threads: &str,
        flush_interval_ms: &str,
        max_line_len: &str,
    ) -> Result<ServerConfig> {
        let addr: SocketAddr = addr.parse().map_err(|_| {
            MarketError::Parsing(format!("could not parse {} into an IP address and port", addr))
        })?;
        let threads: u32 = parse_positive("thread count", threads)?;
        let flush = match flush_interval_ms.trim().parse::<u64>() {
            Ok(0) => FlushPolicy::Sync,
            Ok(ms) => FlushPolicy::Interval(Duration::from_millis(ms)),
            Err(_) => {
                return Err(MarketError::Parsing(format!(
                    "invalid flush interval {:?}",
                    flush_interval_ms
                )))
            }
        };
        Ok(ServerConfig {
            addr,
            data_dir: PathBuf::from(data_dir),
            pool,
            threads,
            flush,
            max_line_len: parse_positive("maximum line length", max_line_len)?,
        })
    }
}

fn parse_positive<T: FromStr + PartialOrd + Default>(what: &str, s: &str) -> Result<T> {
    match s.trim().parse::<T>() {
        Ok(n) if n > T::default() => Ok(n),
        _ => Err(MarketError::Parsing(format!("invalid {} {:?}", what, s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.addr.to_string(), DEFAULT_ADDRESS);
        assert_eq!(config.pool, PoolKind::naive);
        assert_eq!(config.flush, FlushPolicy::Sync);
        assert_eq!(config.max_line_len, 16 * 1024 * 1024);
    }

    #[test]
    fn build_from_strings() {
        let config = ServerConfig::build("127.0.0.1:4000", "/tmp/m", PoolKind::rayon, "8", "250", "1024")
            .unwrap();
        assert_eq!(config.pool, PoolKind::rayon);
        assert_eq!(config.threads, 8);
        assert_eq!(config.flush, FlushPolicy::Interval(Duration::from_millis(250)));
        assert_eq!(config.max_line_len, 1024);
        assert_eq!(
            ServerConfig::build("127.0.0.1:4000", "d", DEFAULT_POOL, "1", "0", "1")
                .unwrap()
                .flush,
            FlushPolicy::Sync
        );
    }

    #[test]
    fn bad_values_are_rejected() {
        let pool = DEFAULT_POOL;
        assert!(ServerConfig::build("localhost", "d", pool, "4", "0", "10").is_err());
        assert!(ServerConfig::build("127.0.0.1:1", "d", pool, "0", "0", "10").is_err());
        assert!(ServerConfig::build("127.0.0.1:1", "d", pool, "4", "soon", "10").is_err());
        assert!(ServerConfig::build("127.0.0.1:1", "d", pool, "4", "0", "0").is_err());
    }

    #[test]
    fn pool_names() {
        for name in PoolKind::variants().iter() {
            assert_eq!(PoolKind::from_name(name).unwrap().to_string(), *name);
        }
        assert_eq!(PoolKind::from_name("Rayon").unwrap(), PoolKind::rayon);
        assert!(matches!(
            PoolKind::from_name("fibers"),
            Err(MarketError::Parsing(_))
        ));
    }
}
