use std::net::{TcpListener, TcpStream, ToSocketAddrs};

use tracing::{debug, error, info};

use crate::connection::{Connection, DEFAULT_MAX_LINE_LEN};
use crate::dispatch::Dispatcher;
use crate::store::Store;
use crate::thread_pool::ThreadPool;
use crate::Result;

/// A TCP server over a marketplace [`Store`].
/// It accepts connections on a [`SocketAddr`](std::net::SocketAddr) and serves each one as a
/// job on its [`ThreadPool`], so connections are handled in parallel while sharing one store.
///
/// # Example
/// Serve a store kept in `./data` on port 12345, with a thread per connection
/// ```rust,no_run
/// use market::{CsvPersistence, FlushPolicy, MarketServer, Store};
/// use market::thread_pool::{NaiveThreadPool, ThreadPool};
/// # fn main() -> market::Result<()> {
/// let store = Store::open(CsvPersistence::open("./data")?, FlushPolicy::Sync)?;
/// let server = MarketServer::new(store, NaiveThreadPool::new(4)?);
/// server.run("0.0.0.0:12345")?;
/// # Ok(())
/// # }
/// ```
pub struct MarketServer<P: ThreadPool> {
    dispatcher: Dispatcher,
    pool: P,
    max_line_len: usize,
}

impl<P: ThreadPool> MarketServer<P> {
    /// Create a new `MarketServer` over `store`, serving connections on `pool`
    pub fn new(store: Store, pool: P) -> Self {
        MarketServer {
            dispatcher: Dispatcher::new(store),
            pool,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }

    /// the longest request line a client may send before it is disconnected
    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len;
        self
    }

    /// binds to `addr` and serves connections until the process stops
    ///
    /// # Errors
    /// returns [`MarketError::Io`] if the address could not be bound
    ///
    /// [`MarketError::Io`]: crate::MarketError::Io
    pub fn run<A: ToSocketAddrs>(self, addr: A) -> Result<()> {
        let listener = TcpListener::bind(addr)?;
        self.serve(listener)
    }

    /// serves connections accepted on an already bound `listener`
    pub fn serve(self, listener: TcpListener) -> Result<()> {
        info!("listening on {}", listener.local_addr()?);
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => self.accept(stream),
                Err(e) => error!("connection failed: {}", e),
            }
        }
        Ok(())
    }

    fn accept(&self, stream: TcpStream) {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_owned());
        debug!("accepted connection from {}", peer);
        let connection = Connection::new(stream, self.dispatcher.clone(), peer.clone())
            .with_max_line_len(self.max_line_len);
        self.pool.spawn(move || {
            if let Err(e) = connection.run() {
                error!("error serving {}: {}", peer, e);
            }
        });
    }
}
