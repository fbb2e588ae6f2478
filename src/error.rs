use thiserror::Error;

/// type alias for all operations on a [`Store`] (and the network layer around it) that could
/// fail with a [`MarketError`]
///
/// [`Store`]: ./struct.Store.html
pub type Result<T> = std::result::Result<T, MarketError>;

/// The error variants produced by the marketplace.
///
/// Every variant can be rendered onto the wire as an `ERROR <message>` line, so the
/// `Display` output of each variant is kept to a single line of text.
#[derive(Debug, Error)]
pub enum MarketError {
    /// a request line could not be parsed: unknown command, wrong arity or a bad number
    #[error("{0}")]
    Protocol(String),

    /// an argument parsed but its value is not acceptable (e.g. a negative amount)
    #[error("{0}")]
    InvalidArgument(String),

    /// the supplied credentials did not match a known user
    #[error("Invalid username or password")]
    Auth,

    /// a user with the given username is already registered
    #[error("Username already exists: {0}")]
    DuplicateUsername(String),

    /// a product with the given id is already registered
    #[error("Product id already exists: {0}")]
    DuplicateProductId(u64),

    /// the named user or product does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// the user exists but is not a customer, so it has no cart or purchase history
    #[error("User is not a customer: {0}")]
    NotCustomer(String),

    /// the operation is not allowed in the current state of the target
    #[error("{0}")]
    InvalidState(String),

    /// the wallet balance does not cover the requested amount
    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds {
        /// the amount that was requested
        needed: f64,
        /// the current wallet balance
        available: f64,
    },

    /// a product does not have enough stock for the requested quantity
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        /// the product that was requested
        product_id: u64,
        /// the requested quantity
        requested: u32,
        /// the quantity that is in stock
        available: u32,
    },

    /// file or socket IO failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// a CSV file could not be read or written
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// persisted data is present but could not be understood
    #[error("persistence error: {0}")]
    Persistence(String),

    /// a thread pool could not be built
    #[error("thread pool error: {0}")]
    ThreadPool(String),

    /// command line input (addresses, flags) could not be parsed
    #[error("{0}")]
    Parsing(String),

    /// the server answered a request with an `ERROR` line
    #[error("server error: {0}")]
    Remote(String),
}

impl MarketError {
    /// shorthand for a [`MarketError::NotFound`] naming a user
    pub fn user_not_found(username: &str) -> Self {
        MarketError::NotFound(format!("User {}", username))
    }

    /// shorthand for a [`MarketError::NotFound`] naming a product
    pub fn product_not_found(product_id: u64) -> Self {
        MarketError::NotFound(format!("Product {}", product_id))
    }
}
