//! The market-client executable sends one command to a market-server and prints the answer.
//!
//! `market-client [--addr IP-PORT] <SUBCOMMAND> [ARGS]...`
//!
//!     Every subcommand maps onto one protocol command, e.g. `market-client wallet bob`
//!     sends `GET_WALLET bob`. `market-client raw <LINE>...` sends a line as is.
//!     --addr defaults to 127.0.0.1:12345.
//!     Prints the value (or the rows) of an `OK` response on stdout. Prints an error and
//!     returns a non-zero exit code on a server error, or if IP-PORT does not parse.
//!
//! `market-client -V`
//!
//!     Print the version.

use std::net::SocketAddr;
use std::process::exit;

use clap::{crate_version, App, AppSettings, Arg, ArgMatches, SubCommand};
use market::{MarketClient, MarketError, Request, Response, Result};

const DEFAULT_ADDRESS: &str = "127.0.0.1:12345";

/// how a subcommand's arguments become a protocol line
#[derive(Clone, Copy)]
enum Shape {
    /// `KEYWORD a b c`
    Positional,
    /// `KEYWORD a|b|c`
    Compound,
    /// `KEYWORD a b|c|d`
    KeyThenCompound,
}

/// subcommand, protocol keyword, argument names, argument shape, help text
const COMMANDS: &[(&str, &str, &[&str], Shape, &str)] = &[
    ("login", "LOGIN", &["USER", "PASSWORD"], Shape::Positional, "Check a username and password"),
    (
        "signup",
        "SIGNUP",
        &["USER", "PASSWORD", "EMAIL", "PHONE", "ADDRESS", "TYPE"],
        Shape::Positional,
        "Create an account, TYPE is admin or customer",
    ),
    ("approved", "GET_APPROVED_PRODUCTS", &[], Shape::Positional, "List approved products"),
    ("pending", "GET_PENDING_PRODUCTS", &[], Shape::Positional, "List products awaiting approval"),
    ("products", "GET_ALL_PRODUCTS", &[], Shape::Positional, "List every product"),
    ("product", "GET_PRODUCT", &["ID"], Shape::Positional, "Show one product"),
    ("category", "GET_CATEGORY", &["CATEGORY"], Shape::Positional, "List approved products of a category"),
    ("search", "SEARCH", &["TERM"], Shape::Positional, "Search approved products"),
    (
        "add-product",
        "ADD_PRODUCT",
        &["NAME", "DESCRIPTION", "CATEGORY", "PRICE", "STOCK", "SELLER"],
        Shape::Compound,
        "List a product for approval",
    ),
    (
        "edit-product",
        "EDIT_PRODUCT",
        &["ID", "NAME", "DESCRIPTION", "CATEGORY", "PRICE", "STOCK"],
        Shape::KeyThenCompound,
        "Change a product's details",
    ),
    ("approve", "APPROVE", &["ID"], Shape::Positional, "Approve a pending product"),
    ("reject", "REJECT", &["ID"], Shape::Positional, "Reject (delete) a pending product"),
    ("delete-product", "DELETE_PRODUCT", &["ID"], Shape::Positional, "Delete a product"),
    ("cart-add", "ADD_TO_CART", &["USER", "ID", "QUANTITY"], Shape::Positional, "Add a product to a cart"),
    ("cart", "GET_CART", &["USER"], Shape::Positional, "Show a cart and its total"),
    ("cart-remove", "REMOVE_FROM_CART", &["USER", "ID"], Shape::Positional, "Remove a product from a cart"),
    ("cart-clear", "CLEAR_CART", &["USER"], Shape::Positional, "Empty a cart"),
    ("checkout", "CHECKOUT", &["USER"], Shape::Positional, "Buy everything in a cart"),
    ("my-products", "GET_MY_PRODUCTS", &["USER"], Shape::Positional, "List the products a user listed"),
    ("history", "GET_HISTORY", &["USER"], Shape::Positional, "Show a customer's purchases and sales"),
    ("wallet", "GET_WALLET", &["USER"], Shape::Positional, "Show a wallet balance"),
    ("deposit", "DEPOSIT", &["USER", "AMOUNT"], Shape::Positional, "Add funds to a wallet"),
    ("withdraw", "WITHDRAW", &["USER", "AMOUNT"], Shape::Positional, "Take funds out of a wallet"),
    (
        "update-profile",
        "UPDATE_PROFILE",
        &["USER", "EMAIL", "PHONE", "ADDRESS"],
        Shape::Compound,
        "Change a user's contact details",
    ),
];

/// ['Opt'] holds parsed and validated options from the command line
#[derive(Debug)]
struct Opt {
    /// the server's ip:port
    addr: SocketAddr,
    /// the line to send
    line: String,
}

impl Opt {
    /// validates the `addr` parameter and, unless `raw`, that `line` is a well formed request
    /// # Errors
    /// returns [`MarketError::Parsing`] or [`MarketError::Protocol`] if either is invalid
    fn build(addr: &str, line: String, raw: bool) -> Result<Opt> {
        let addr: SocketAddr = addr.parse().map_err(|_| {
            MarketError::Parsing(format!("could not parse {} into an IP address and port", addr))
        })?;
        let line = if raw {
            line
        } else {
            Request::parse(&line)?.to_string()
        };
        Ok(Opt { addr, line })
    }
}

fn main() {
    let mut subcommands: Vec<App> = COMMANDS
        .iter()
        .map(|(name, _, args, _, about)| {
            args.iter().enumerate().fold(
                SubCommand::with_name(name).about(*about),
                |cmd, (i, arg)| {
                    cmd.arg(
                        Arg::with_name(*arg)
                            .required(true)
                            .multiple(*arg == "TERM")
                            .index(i as u64 + 1),
                    )
                },
            )
        })
        .collect();
    subcommands.push(
        SubCommand::with_name("raw")
            .about("Send a protocol line as is")
            .arg(Arg::with_name("LINE").required(true).multiple(true).index(1)),
    );

    let matches = App::new("market-client")
        .version(crate_version!())
        .author("strohs <strohs1@gmail.com>")
        .about("a client for the marketplace server")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommands(subcommands)
        .arg(
            Arg::with_name("addr")
                .long("addr")
                .value_name("IP_ADDR:PORT")
                .help("sets the IP_ADDR:PORT of the server to connect to")
                .default_value(DEFAULT_ADDRESS)
                .global(true),
        )
        .get_matches();

    if let Err(e) = parse_options(&matches).and_then(run) {
        eprintln!("{}", e);
        exit(1);
    }
}

/// sends the request and prints the value or rows of the response
fn run(opt: Opt) -> Result<()> {
    let mut client = MarketClient::connect(opt.addr)?;
    match client.raw(&opt.line)? {
        Response::Ok { value: Some(value), .. } => println!("{}", value),
        Response::Ok { tag, value: None } => println!("OK {}", tag),
        Response::Table { rows, .. } => {
            for row in rows {
                println!("{}", row);
            }
        }
        Response::Error(message) => return Err(MarketError::Remote(message)),
    }
    Ok(())
}

/// parses the matches from the command line into an [`Opt`] struct
fn parse_options(matches: &ArgMatches) -> Result<Opt> {
    let (name, args) = match matches.subcommand() {
        (name, Some(args)) => (name, args),
        _ => return Err(MarketError::Parsing("no command given".into())),
    };
    let addr = args
        .value_of("addr")
        .or_else(|| matches.value_of("addr"))
        .unwrap_or(DEFAULT_ADDRESS);
    if name == "raw" {
        let line = values(args, "LINE").join(" ");
        return Opt::build(addr, line, true);
    }

    let (_, keyword, arg_names, shape, _) = COMMANDS
        .iter()
        .find(|(cmd, ..)| *cmd == name)
        .ok_or_else(|| MarketError::Parsing(format!("unknown command {}", name)))?;
    let fields: Vec<String> = arg_names
        .iter()
        .map(|arg| values(args, arg).join(" "))
        .collect();
    let line = match shape {
        _ if fields.is_empty() => keyword.to_string(),
        Shape::Positional => format!("{} {}", keyword, fields.join(" ")),
        Shape::Compound => format!("{} {}", keyword, fields.join("|")),
        Shape::KeyThenCompound => {
            format!("{} {} {}", keyword, fields[0], fields[1..].join("|"))
        }
    };
    Opt::build(addr, line, false)
}

fn values(args: &ArgMatches, name: &str) -> Vec<String> {
    args.values_of(name)
        .map(|v| v.map(str::to_owned).collect())
        .unwrap_or_default()
}
