//! this binary starts the marketplace server
//! to see the list of options, type: `market-server --help`
//!
//! Every option can also be given through an environment variable, e.g. `MARKET_ADDR`.

use std::env;
use std::process::exit;

use clap::{crate_version, value_t, App, Arg, ArgMatches};
use market::config::{DEFAULT_ADDRESS, DEFAULT_DATA_DIR, DEFAULT_POOL};
use market::{
    CsvPersistence, MarketError, MarketServer, NaiveThreadPool, PoolKind, RayonThreadPool,
    Result, ServerConfig, SharedQueueThreadPool, Store, ThreadPool,
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    config: ServerConfig,
    log_level: Level,
}

impl Opt {
    /// validates every option, falling back to its environment variable and then to its
    /// default
    /// # Errors
    /// returns [`MarketError::Parsing`] if one of the options is invalid
    fn build(matches: &ArgMatches) -> Result<Opt> {
        let defaults = ServerConfig::default();
        let default_threads = defaults.threads.to_string();
        let default_max_line = defaults.max_line_len.to_string();
        // --pool is checked against the pool names by clap
        let pool = match value_t!(matches, "pool", PoolKind) {
            Ok(pool) => pool,
            Err(_) => match env::var("MARKET_POOL") {
                Ok(name) => PoolKind::from_name(&name)?,
                Err(_) => DEFAULT_POOL,
            },
        };
        let config = ServerConfig::build(
            &option(matches, "addr", "MARKET_ADDR", DEFAULT_ADDRESS),
            &option(matches, "data-dir", "MARKET_DATA_DIR", DEFAULT_DATA_DIR),
            pool,
            &option(matches, "threads", "MARKET_THREADS", &default_threads),
            &option(matches, "flush-interval-ms", "MARKET_FLUSH_INTERVAL_MS", "0"),
            &option(matches, "max-line", "MARKET_MAX_LINE", &default_max_line),
        )?;
        let level = option(matches, "log-level", "MARKET_LOG", "info");
        let log_level = level
            .parse()
            .map_err(|_| MarketError::Parsing(format!("unknown log level {:?}", level)))?;
        Ok(Opt { config, log_level })
    }
}

/// the command line value, else the environment variable, else `default`
fn option(matches: &ArgMatches, name: &str, var: &str, default: &str) -> String {
    matches
        .value_of(name)
        .map(str::to_owned)
        .or_else(|| env::var(var).ok())
        .unwrap_or_else(|| default.to_owned())
}

fn main() {
    let matches = App::new("market-server")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("a multi-threaded marketplace server")
        .arg(
            Arg::with_name("addr")
                .long("addr")
                .value_name("IP_ADDR:PORT")
                .help("sets the IP_ADDR:PORT that the server listens on [default: 0.0.0.0:12345]"),
        )
        .arg(
            Arg::with_name("data-dir")
                .long("data-dir")
                .value_name("DIR")
                .help("sets the directory holding the CSV files [default: ./data]"),
        )
        .arg(
            Arg::with_name("pool")
                .long("pool")
                .value_name("POOL")
                .possible_values(&PoolKind::variants())
                .help("sets the thread pool serving connections [default: naive]"),
        )
        .arg(
            Arg::with_name("threads")
                .long("threads")
                .value_name("N")
                .help("sets the number of threads of the shared and rayon pools [default: 4]"),
        )
        .arg(
            Arg::with_name("flush-interval-ms")
                .long("flush-interval-ms")
                .value_name("MS")
                .help("flushes to disk every MS milliseconds instead of after every change"),
        )
        .arg(
            Arg::with_name("max-line")
                .long("max-line")
                .value_name("BYTES")
                .help("disconnects clients sending a longer request line [default: 16 MiB]"),
        )
        .arg(
            Arg::with_name("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("one of trace, debug, info, warn, error [default: info]"),
        )
        .get_matches();

    let opt = match Opt::build(&matches) {
        Ok(opt) => opt,
        Err(err) => {
            eprintln!("{}", err);
            exit(1);
        }
    };

    // set up a tracing subscriber to log to STDERR
    subscriber_config(opt.log_level);

    if let Err(e) = run(opt.config) {
        eprintln!("{}", e);
        exit(1);
    }
}

fn run(config: ServerConfig) -> Result<()> {
    info!("market-server {}", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {}", config.data_dir.display());
    info!("Thread pool: {} ({} threads)", config.pool, config.threads);
    info!("Flush policy: {:?}", config.flush);

    let store = Store::open(CsvPersistence::open(config.data_dir.clone())?, config.flush)?;
    match config.pool {
        PoolKind::naive => run_with_pool(store, NaiveThreadPool::new(config.threads)?, &config),
        PoolKind::shared => {
            run_with_pool(store, SharedQueueThreadPool::new(config.threads)?, &config)
        }
        PoolKind::rayon => run_with_pool(store, RayonThreadPool::new(config.threads)?, &config),
    }
}

fn run_with_pool<P: ThreadPool>(store: Store, pool: P, config: &ServerConfig) -> Result<()> {
    let server = MarketServer::new(store, pool).with_max_line_len(config.max_line_len);
    server.run(config.addr)
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config(level: Level) {
    let subscriber = FmtSubscriber::builder()
        // spans/events at `level` or more severe are written
        .with_max_level(level)
        // log to stderr instead of stdout
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting tracing default subscriber failed: {}", e);
    }
}
