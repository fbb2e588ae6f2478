use std::io::{BufReader, BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};

use crate::command::{CartRow, HistoryRow, ProductDetail, ProductRow, Request, Response};
use crate::model::{AccountType, ProductDraft, ProductEdit, ProductId, ProfileUpdate};
use crate::{MarketError, Result};

/// What a successful `LOGIN` reports about the account
#[derive(Debug, Clone, PartialEq)]
pub struct LoginInfo {
    /// the account that logged in
    pub username: String,
    /// the balance at login
    pub wallet: f64,
    /// admin or customer
    pub account_type: AccountType,
}

/// `MarketClient` contains the functionality for communication with a [`MarketServer`].
///
/// Every method sends one request and blocks until its response arrives. A server side
/// failure (an `ERROR` line) comes back as [`MarketError::Remote`].
///
/// [`MarketServer`]: crate::MarketServer
pub struct MarketClient {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

fn parse_value<T: std::str::FromStr>(tag: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| MarketError::Protocol(format!("invalid {} value: {:?}", tag, value)))
}

impl MarketClient {
    /// creates a client and establishes a socket connection to the server at the given `addr`
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let tcp_reader = TcpStream::connect(addr)?;
        let tcp_writer = tcp_reader.try_clone()?;
        Ok(MarketClient {
            reader: BufReader::new(tcp_reader),
            writer: BufWriter::new(tcp_writer),
        })
    }

    /// sends an arbitrary request line and returns whatever the server answered,
    /// `ERROR` responses included
    pub fn raw(&mut self, line: &str) -> Result<Response> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Response::read_from(&mut self.reader)
    }

    /// sends `request`, turning an `ERROR` response into [`MarketError::Remote`]
    pub fn send(&mut self, request: &Request) -> Result<Response> {
        match self.raw(&request.to_string())? {
            Response::Error(message) => Err(MarketError::Remote(message)),
            response => Ok(response),
        }
    }

    fn expect_ok(&mut self, request: Request) -> Result<Option<String>> {
        let expected = ok_tag(&request);
        match self.send(&request)? {
            Response::Ok { tag, value } if tag == expected => Ok(value),
            other => Err(unexpected(expected, &other)),
        }
    }

    fn expect_value<T: std::str::FromStr>(&mut self, request: Request) -> Result<T> {
        let tag = ok_tag(&request);
        let value = self
            .expect_ok(request)?
            .ok_or_else(|| MarketError::Protocol(format!("{} response without a value", tag)))?;
        parse_value(tag, &value)
    }

    fn expect_table(&mut self, request: Request) -> Result<Vec<String>> {
        let expected = ok_tag(&request);
        match self.send(&request)? {
            Response::Table { tag, rows } if tag == expected => Ok(rows),
            other => Err(unexpected(expected, &other)),
        }
    }

    fn product_rows(&mut self, request: Request) -> Result<Vec<ProductRow>> {
        self.expect_table(request)?
            .iter()
            .map(|row| row.parse())
            .collect()
    }

    /// checks credentials, see [`Store::validate_login`](crate::Store::validate_login)
    pub fn login(&mut self, username: &str, password: &str) -> Result<LoginInfo> {
        let value = self
            .expect_ok(Request::Login {
                username: username.to_owned(),
                password: password.to_owned(),
            })?
            .unwrap_or_default();
        let fields: Vec<&str> = value.split('|').collect();
        match fields.as_slice() {
            [username, wallet, role] => Ok(LoginInfo {
                username: (*username).to_owned(),
                wallet: parse_value("LOGIN", wallet)?,
                account_type: AccountType::parse_lenient(role),
            }),
            _ => Err(MarketError::Protocol(format!("invalid LOGIN value: {:?}", value))),
        }
    }

    /// creates an account
    pub fn signup(
        &mut self,
        username: &str,
        password: &str,
        profile: ProfileUpdate,
        account_type: AccountType,
    ) -> Result<()> {
        self.expect_ok(Request::Signup {
            username: username.to_owned(),
            password: password.to_owned(),
            profile,
            account_type,
        })
        .map(|_| ())
    }

    /// forgets the user remembered for this connection
    pub fn logout(&mut self) -> Result<()> {
        self.expect_ok(Request::Logout).map(|_| ())
    }

    /// products that can be bought
    pub fn approved_products(&mut self) -> Result<Vec<ProductRow>> {
        self.product_rows(Request::GetApprovedProducts)
    }

    /// products awaiting approval
    pub fn pending_products(&mut self) -> Result<Vec<ProductRow>> {
        self.product_rows(Request::GetPendingProducts)
    }

    /// every product
    pub fn all_products(&mut self) -> Result<Vec<ProductRow>> {
        self.product_rows(Request::GetAllProducts)
    }

    /// every attribute of one product, image included
    pub fn product(&mut self, product_id: ProductId) -> Result<ProductDetail> {
        let rows = self.expect_table(Request::GetProduct { product_id })?;
        ProductDetail::from_rows(&rows)
    }

    /// approved products of `category`
    pub fn category(&mut self, category: &str) -> Result<Vec<ProductRow>> {
        self.product_rows(Request::GetCategory {
            category: category.to_owned(),
        })
    }

    /// approved products matching `term`
    pub fn search(&mut self, term: &str) -> Result<Vec<ProductRow>> {
        self.product_rows(Request::Search {
            term: term.to_owned(),
        })
    }

    /// products listed by `username`
    pub fn my_products(&mut self, username: &str) -> Result<Vec<ProductRow>> {
        self.product_rows(Request::GetMyProducts {
            username: username.to_owned(),
        })
    }

    /// lists a product, pending approval
    pub fn add_product(&mut self, draft: ProductDraft) -> Result<()> {
        self.expect_ok(Request::AddProduct(draft)).map(|_| ())
    }

    /// replaces the attributes of a product
    pub fn edit_product(&mut self, product_id: ProductId, edit: ProductEdit) -> Result<()> {
        self.expect_ok(Request::EditProduct { product_id, edit })
            .map(|_| ())
    }

    /// approves a pending product
    pub fn approve(&mut self, product_id: ProductId) -> Result<()> {
        self.expect_ok(Request::Approve { product_id }).map(|_| ())
    }

    /// rejects, and so deletes, a pending product
    pub fn reject(&mut self, product_id: ProductId) -> Result<()> {
        self.expect_ok(Request::Reject { product_id }).map(|_| ())
    }

    /// deletes a product
    pub fn delete_product(&mut self, product_id: ProductId) -> Result<()> {
        self.expect_ok(Request::DeleteProduct { product_id })
            .map(|_| ())
    }

    /// adds `quantity` units to the cart of `username`
    pub fn add_to_cart(&mut self, username: &str, product_id: ProductId, quantity: u32) -> Result<()> {
        self.expect_ok(Request::AddToCart {
            username: username.to_owned(),
            product_id,
            quantity,
        })
        .map(|_| ())
    }

    /// the cart lines and the cart total
    pub fn cart(&mut self, username: &str) -> Result<(Vec<CartRow>, f64)> {
        let rows = self.expect_table(Request::GetCart {
            username: username.to_owned(),
        })?;
        let mut lines = Vec::with_capacity(rows.len());
        let mut total = None;
        for row in &rows {
            match row.strip_prefix("TOTAL|") {
                Some(amount) => total = Some(parse_value("TOTAL", amount)?),
                None => lines.push(row.parse()?),
            }
        }
        let total =
            total.ok_or_else(|| MarketError::Protocol("CART response without a total".into()))?;
        Ok((lines, total))
    }

    /// drops a line from the cart of `username`
    pub fn remove_from_cart(&mut self, username: &str, product_id: ProductId) -> Result<()> {
        self.expect_ok(Request::RemoveFromCart {
            username: username.to_owned(),
            product_id,
        })
        .map(|_| ())
    }

    /// empties the cart of `username`
    pub fn clear_cart(&mut self, username: &str) -> Result<()> {
        self.expect_ok(Request::ClearCart {
            username: username.to_owned(),
        })
        .map(|_| ())
    }

    /// settles the cart and returns the amount charged
    pub fn checkout(&mut self, username: &str) -> Result<f64> {
        self.expect_value(Request::Checkout {
            username: username.to_owned(),
        })
    }

    /// purchases and sales of `username`
    pub fn history(&mut self, username: &str) -> Result<Vec<HistoryRow>> {
        self.expect_table(Request::GetHistory {
            username: username.to_owned(),
        })?
        .iter()
        .map(|row| row.parse())
        .collect()
    }

    /// the balance of `username`
    pub fn wallet(&mut self, username: &str) -> Result<f64> {
        self.expect_value(Request::GetWallet {
            username: username.to_owned(),
        })
    }

    /// returns the new balance
    pub fn deposit(&mut self, username: &str, amount: f64) -> Result<f64> {
        self.expect_value(Request::Deposit {
            username: username.to_owned(),
            amount,
        })
    }

    /// returns the new balance
    pub fn withdraw(&mut self, username: &str, amount: f64) -> Result<f64> {
        self.expect_value(Request::Withdraw {
            username: username.to_owned(),
            amount,
        })
    }

    /// replaces the contact details of `username`
    pub fn update_profile(&mut self, username: &str, profile: ProfileUpdate) -> Result<()> {
        self.expect_ok(Request::UpdateProfile {
            username: username.to_owned(),
            profile,
        })
        .map(|_| ())
    }
}

/// the tag a successful response to `request` carries
fn ok_tag(request: &Request) -> &'static str {
    match request {
        Request::GetApprovedProducts => "APPROVED_PRODUCTS",
        Request::GetPendingProducts => "PENDING_PRODUCTS",
        Request::GetAllProducts => "ALL_PRODUCTS",
        Request::GetProduct { .. } => "PRODUCT",
        Request::GetCategory { .. } => "CATEGORY_PRODUCTS",
        Request::Search { .. } => "SEARCH_RESULTS",
        Request::GetCart { .. } => "CART",
        Request::GetMyProducts { .. } => "MY_PRODUCTS",
        Request::GetHistory { .. } => "HISTORY",
        Request::GetWallet { .. } => "WALLET",
        other => other.name(),
    }
}

fn unexpected(expected: &str, got: &Response) -> MarketError {
    MarketError::Protocol(format!(
        "expected an {} response, got {:?}",
        expected,
        got.to_wire().lines().next().unwrap_or_default()
    ))
}
