//! The text protocol spoken between clients and the server.
//!
//! A request is one line: a command keyword (matched case-insensitively) followed by
//! space-separated positional arguments. Commands carrying a structured payload take it as
//! the rest of the line, with `|` separating its sub-fields, so a payload may contain spaces.
//!
//! A response is either a single `OK <TAG> [value]` line, a table (`OK <TAG>`, then one line
//! per row, then `END`), or an `ERROR <message>` line.
use std::fmt;
use std::io::BufRead;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::{MarketError, Result};
use crate::model::{
    self, AccountType, Product, ProductDraft, ProductEdit, ProductId, ProductStatus,
    ProfileUpdate, Transaction,
};
use crate::store::CartLine;

/// the line ending every table response
pub const END_OF_TABLE: &str = "END";

/// tags of the responses that carry rows
pub const TABLE_TAGS: [&str; 9] = [
    "APPROVED_PRODUCTS",
    "PENDING_PRODUCTS",
    "ALL_PRODUCTS",
    "CATEGORY_PRODUCTS",
    "SEARCH_RESULTS",
    "MY_PRODUCTS",
    "CART",
    "HISTORY",
    "PRODUCT",
];

/// These are the request "commands" a client can send to the server
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// check credentials: `LOGIN user pass`
    Login {
        /// the account to check
        username: String,
        /// the clear text password
        password: String,
    },
    /// create an account: `SIGNUP user pass email phone address type`
    Signup {
        /// the new, unique username
        username: String,
        /// the clear text password, hashed before it is stored
        password: String,
        /// contact details
        profile: ProfileUpdate,
        /// admin or customer
        account_type: AccountType,
    },
    /// forget the identity remembered for this connection: `LOGOUT`
    Logout,
    /// `GET_APPROVED_PRODUCTS`
    GetApprovedProducts,
    /// `GET_PENDING_PRODUCTS`
    GetPendingProducts,
    /// `GET_ALL_PRODUCTS`
    GetAllProducts,
    /// `GET_PRODUCT id`
    GetProduct {
        /// the product to show
        product_id: ProductId,
    },
    /// `GET_CATEGORY category`
    GetCategory {
        /// matched exactly, ignoring case
        category: String,
    },
    /// `SEARCH term`
    Search {
        /// matched as a substring of name, description and category
        term: String,
    },
    /// `ADD_PRODUCT name|desc|category|price|stock|seller[|image_base64]`
    AddProduct(ProductDraft),
    /// `EDIT_PRODUCT id name|desc|category|price|stock`
    EditProduct {
        /// the product to change
        product_id: ProductId,
        /// its new attributes
        edit: ProductEdit,
    },
    /// `APPROVE id`
    Approve {
        /// a pending product
        product_id: ProductId,
    },
    /// `REJECT id`
    Reject {
        /// a pending product, deleted when rejected
        product_id: ProductId,
    },
    /// `DELETE_PRODUCT id`
    DeleteProduct {
        /// the product to delete
        product_id: ProductId,
    },
    /// `ADD_TO_CART user id qty`
    AddToCart {
        /// the customer whose cart changes
        username: String,
        /// an approved product
        product_id: ProductId,
        /// added to any quantity already in the cart
        quantity: u32,
    },
    /// `GET_CART user`
    GetCart {
        /// the cart owner
        username: String,
    },
    /// `REMOVE_FROM_CART user id`
    RemoveFromCart {
        /// the cart owner
        username: String,
        /// the line to drop
        product_id: ProductId,
    },
    /// `CLEAR_CART user`
    ClearCart {
        /// the cart owner
        username: String,
    },
    /// `CHECKOUT user`
    Checkout {
        /// the buyer
        username: String,
    },
    /// `GET_MY_PRODUCTS user`
    GetMyProducts {
        /// the seller
        username: String,
    },
    /// `GET_HISTORY user`
    GetHistory {
        /// a customer
        username: String,
    },
    /// `GET_WALLET user`
    GetWallet {
        /// the wallet owner
        username: String,
    },
    /// `DEPOSIT user amount`
    Deposit {
        /// the wallet owner
        username: String,
        /// at least one cent
        amount: f64,
    },
    /// `WITHDRAW user amount`
    Withdraw {
        /// the wallet owner
        username: String,
        /// at least one cent, no more than the balance
        amount: f64,
    },
    /// `UPDATE_PROFILE user|email|phone|address`
    UpdateProfile {
        /// the account to change
        username: String,
        /// the new contact details
        profile: ProfileUpdate,
    },
}

/// splits off the first whitespace delimited token
fn split_token(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(pos) => (&s[..pos], s[pos..].trim_start()),
        None => (s, ""),
    }
}

/// exactly `N` whitespace separated arguments
fn positional<'a, const N: usize>(command: &str, rest: &'a str) -> Result<[&'a str; N]> {
    let args: Vec<&str> = rest.split_whitespace().collect();
    <[&str; N]>::try_from(args.as_slice()).map_err(|_| {
        MarketError::Protocol(format!(
            "Wrong number of arguments for {}: expected {}, got {}",
            command,
            N,
            args.len()
        ))
    })
}

/// the rest of the line, which must not be empty
fn payload<'a>(command: &str, rest: &'a str) -> Result<&'a str> {
    let rest = rest.trim();
    if rest.is_empty() {
        Err(MarketError::Protocol(format!("Missing payload for {}", command)))
    } else {
        Ok(rest)
    }
}

fn parse_number<T: FromStr>(what: &str, s: &str) -> Result<T> {
    s.trim()
        .parse()
        .map_err(|_| MarketError::Protocol(format!("Invalid {}: {:?}", what, s)))
}

fn parse_id(s: &str) -> Result<ProductId> {
    parse_number("product id", s)
}

fn parse_fields<'a>(what: &str, payload: &'a str, min: usize, max: usize) -> Result<Vec<&'a str>> {
    let fields: Vec<&str> = payload.split('|').collect();
    if fields.len() < min || fields.len() > max {
        return Err(MarketError::Protocol(format!(
            "Invalid {}: expected {} fields separated by '|', got {}",
            what,
            min,
            fields.len()
        )));
    }
    Ok(fields)
}

fn parse_draft(payload: &str) -> Result<ProductDraft> {
    let f = parse_fields("product data", payload, 6, 7)?;
    let image = match f.get(6).map(|s| s.trim()) {
        Some(encoded) if !encoded.is_empty() => Some(
            STANDARD
                .decode(encoded.as_bytes())
                .map_err(|e| MarketError::Protocol(format!("Invalid image data: {}", e)))?,
        ),
        _ => None,
    };
    Ok(ProductDraft {
        name: f[0].trim().to_owned(),
        description: f[1].trim().to_owned(),
        category: f[2].trim().to_owned(),
        price: parse_number("price", f[3])?,
        stock: parse_number("stock", f[4])?,
        seller: f[5].trim().to_owned(),
        image,
    })
}

fn parse_edit(payload: &str) -> Result<ProductEdit> {
    let f = parse_fields("product data", payload, 5, 5)?;
    Ok(ProductEdit {
        name: f[0].trim().to_owned(),
        description: f[1].trim().to_owned(),
        category: f[2].trim().to_owned(),
        price: parse_number("price", f[3])?,
        stock: parse_number("stock", f[4])?,
    })
}

impl Request {
    /// parses one request line (without its line terminator)
    ///
    /// # Errors
    /// [`MarketError::Protocol`] for an empty line, an unknown command, the wrong number of
    /// arguments or an argument that does not parse
    pub fn parse(line: &str) -> Result<Request> {
        let (keyword, rest) = split_token(line.trim());
        if keyword.is_empty() {
            return Err(MarketError::Protocol("Empty command".into()));
        }
        let command = keyword.to_ascii_uppercase();
        let cmd = command.as_str();

        let request = match cmd {
            "LOGIN" => {
                let [username, password] = positional::<2>(cmd, rest)?;
                Request::Login {
                    username: username.to_owned(),
                    password: password.to_owned(),
                }
            }
            "SIGNUP" => {
                let [username, password, email, phone, address, kind] = positional::<6>(cmd, rest)?;
                Request::Signup {
                    username: username.to_owned(),
                    password: password.to_owned(),
                    profile: ProfileUpdate {
                        email: email.to_owned(),
                        phone: phone.to_owned(),
                        address: address.to_owned(),
                    },
                    account_type: AccountType::parse_lenient(kind),
                }
            }
            "LOGOUT" => {
                let [] = positional::<0>(cmd, rest)?;
                Request::Logout
            }
            "GET_APPROVED_PRODUCTS" => {
                let [] = positional::<0>(cmd, rest)?;
                Request::GetApprovedProducts
            }
            "GET_PENDING_PRODUCTS" => {
                let [] = positional::<0>(cmd, rest)?;
                Request::GetPendingProducts
            }
            "GET_ALL_PRODUCTS" => {
                let [] = positional::<0>(cmd, rest)?;
                Request::GetAllProducts
            }
            "GET_PRODUCT" => {
                let [id] = positional::<1>(cmd, rest)?;
                Request::GetProduct {
                    product_id: parse_id(id)?,
                }
            }
            "GET_CATEGORY" => Request::GetCategory {
                category: payload(cmd, rest)?.to_owned(),
            },
            "SEARCH" => Request::Search {
                term: payload(cmd, rest)?.to_owned(),
            },
            "ADD_PRODUCT" => Request::AddProduct(parse_draft(payload(cmd, rest)?)?),
            "EDIT_PRODUCT" => {
                let (id, data) = split_token(rest);
                Request::EditProduct {
                    product_id: parse_id(payload(cmd, id)?)?,
                    edit: parse_edit(payload(cmd, data)?)?,
                }
            }
            "APPROVE" => {
                let [id] = positional::<1>(cmd, rest)?;
                Request::Approve {
                    product_id: parse_id(id)?,
                }
            }
            "REJECT" => {
                let [id] = positional::<1>(cmd, rest)?;
                Request::Reject {
                    product_id: parse_id(id)?,
                }
            }
            "DELETE_PRODUCT" => {
                let [id] = positional::<1>(cmd, rest)?;
                Request::DeleteProduct {
                    product_id: parse_id(id)?,
                }
            }
            "ADD_TO_CART" => {
                let [username, id, quantity] = positional::<3>(cmd, rest)?;
                Request::AddToCart {
                    username: username.to_owned(),
                    product_id: parse_id(id)?,
                    quantity: parse_number("quantity", quantity)?,
                }
            }
            "GET_CART" => {
                let [username] = positional::<1>(cmd, rest)?;
                Request::GetCart {
                    username: username.to_owned(),
                }
            }
            "REMOVE_FROM_CART" => {
                let [username, id] = positional::<2>(cmd, rest)?;
                Request::RemoveFromCart {
                    username: username.to_owned(),
                    product_id: parse_id(id)?,
                }
            }
            "CLEAR_CART" => {
                let [username] = positional::<1>(cmd, rest)?;
                Request::ClearCart {
                    username: username.to_owned(),
                }
            }
            "CHECKOUT" => {
                let [username] = positional::<1>(cmd, rest)?;
                Request::Checkout {
                    username: username.to_owned(),
                }
            }
            "GET_MY_PRODUCTS" => {
                let [username] = positional::<1>(cmd, rest)?;
                Request::GetMyProducts {
                    username: username.to_owned(),
                }
            }
            "GET_HISTORY" => {
                let [username] = positional::<1>(cmd, rest)?;
                Request::GetHistory {
                    username: username.to_owned(),
                }
            }
            "GET_WALLET" => {
                let [username] = positional::<1>(cmd, rest)?;
                Request::GetWallet {
                    username: username.to_owned(),
                }
            }
            "DEPOSIT" => {
                let [username, amount] = positional::<2>(cmd, rest)?;
                Request::Deposit {
                    username: username.to_owned(),
                    amount: parse_number("amount", amount)?,
                }
            }
            "WITHDRAW" => {
                let [username, amount] = positional::<2>(cmd, rest)?;
                Request::Withdraw {
                    username: username.to_owned(),
                    amount: parse_number("amount", amount)?,
                }
            }
            "UPDATE_PROFILE" => {
                let f = parse_fields("profile data", payload(cmd, rest)?, 4, 4)?;
                Request::UpdateProfile {
                    username: f[0].trim().to_owned(),
                    profile: ProfileUpdate {
                        email: f[1].trim().to_owned(),
                        phone: f[2].trim().to_owned(),
                        address: f[3].trim().to_owned(),
                    },
                }
            }
            _ => return Err(MarketError::Protocol(format!("Unknown command: {}", keyword))),
        };
        Ok(request)
    }

    /// the command keyword of this request
    pub fn name(&self) -> &'static str {
        match self {
            Request::Login { .. } => "LOGIN",
            Request::Signup { .. } => "SIGNUP",
            Request::Logout => "LOGOUT",
            Request::GetApprovedProducts => "GET_APPROVED_PRODUCTS",
            Request::GetPendingProducts => "GET_PENDING_PRODUCTS",
            Request::GetAllProducts => "GET_ALL_PRODUCTS",
            Request::GetProduct { .. } => "GET_PRODUCT",
            Request::GetCategory { .. } => "GET_CATEGORY",
            Request::Search { .. } => "SEARCH",
            Request::AddProduct(_) => "ADD_PRODUCT",
            Request::EditProduct { .. } => "EDIT_PRODUCT",
            Request::Approve { .. } => "APPROVE",
            Request::Reject { .. } => "REJECT",
            Request::DeleteProduct { .. } => "DELETE_PRODUCT",
            Request::AddToCart { .. } => "ADD_TO_CART",
            Request::GetCart { .. } => "GET_CART",
            Request::RemoveFromCart { .. } => "REMOVE_FROM_CART",
            Request::ClearCart { .. } => "CLEAR_CART",
            Request::Checkout { .. } => "CHECKOUT",
            Request::GetMyProducts { .. } => "GET_MY_PRODUCTS",
            Request::GetHistory { .. } => "GET_HISTORY",
            Request::GetWallet { .. } => "GET_WALLET",
            Request::Deposit { .. } => "DEPOSIT",
            Request::Withdraw { .. } => "WITHDRAW",
            Request::UpdateProfile { .. } => "UPDATE_PROFILE",
        }
    }
}

/// Renders the request as a protocol line, without the trailing newline.
/// `Request::parse(&request.to_string())` gives back an equal request.
impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name();
        match self {
            Request::Login { username, password } => write!(f, "{} {} {}", name, username, password),
            Request::Signup {
                username,
                password,
                profile,
                account_type,
            } => write!(
                f,
                "{} {} {} {} {} {} {}",
                name,
                username,
                password,
                profile.email,
                profile.phone,
                profile.address,
                account_type.as_str()
            ),
            Request::Logout
            | Request::GetApprovedProducts
            | Request::GetPendingProducts
            | Request::GetAllProducts => f.write_str(name),
            Request::GetProduct { product_id }
            | Request::Approve { product_id }
            | Request::Reject { product_id }
            | Request::DeleteProduct { product_id } => write!(f, "{} {}", name, product_id),
            Request::GetCategory { category } => write!(f, "{} {}", name, category),
            Request::Search { term } => write!(f, "{} {}", name, term),
            Request::AddProduct(d) => {
                write!(
                    f,
                    "{} {}|{}|{}|{}|{}|{}",
                    name, d.name, d.description, d.category, d.price, d.stock, d.seller
                )?;
                if let Some(image) = &d.image {
                    write!(f, "|{}", STANDARD.encode(image))?;
                }
                Ok(())
            }
            Request::EditProduct { product_id, edit } => write!(
                f,
                "{} {} {}|{}|{}|{}|{}",
                name, product_id, edit.name, edit.description, edit.category, edit.price, edit.stock
            ),
            Request::AddToCart {
                username,
                product_id,
                quantity,
            } => write!(f, "{} {} {} {}", name, username, product_id, quantity),
            Request::RemoveFromCart {
                username,
                product_id,
            } => write!(f, "{} {} {}", name, username, product_id),
            Request::GetCart { username }
            | Request::ClearCart { username }
            | Request::Checkout { username }
            | Request::GetMyProducts { username }
            | Request::GetHistory { username }
            | Request::GetWallet { username } => write!(f, "{} {}", name, username),
            Request::Deposit { username, amount } | Request::Withdraw { username, amount } => {
                write!(f, "{} {} {}", name, username, amount)
            }
            Request::UpdateProfile { username, profile } => write!(
                f,
                "{} {}|{}|{}|{}",
                name, username, profile.email, profile.phone, profile.address
            ),
        }
    }
}

/// The response types that can be returned for any request
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// a single `OK <TAG> [value]` line
    Ok {
        /// names what succeeded, e.g. `WALLET`
        tag: String,
        /// the result, if the command has one
        value: Option<String>,
    },
    /// `OK <TAG>`, one line per row, then `END`
    Table {
        /// names the listing, e.g. `CART`
        tag: String,
        /// `|` separated rows
        rows: Vec<String>,
    },
    /// `ERROR <message>`
    Error(String),
}

impl Response {
    /// an `OK <TAG>` line without a value
    pub fn ok(tag: &str) -> Self {
        Response::Ok {
            tag: tag.to_owned(),
            value: None,
        }
    }

    /// an `OK <TAG> <value>` line
    pub fn ok_with(tag: &str, value: impl fmt::Display) -> Self {
        Response::Ok {
            tag: tag.to_owned(),
            value: Some(value.to_string()),
        }
    }

    /// a listing terminated by `END`
    pub fn table(tag: &str, rows: Vec<String>) -> Self {
        Response::Table {
            tag: tag.to_owned(),
            rows,
        }
    }

    /// an `ERROR <message>` line
    pub fn error(message: impl fmt::Display) -> Self {
        Response::Error(message.to_string())
    }

    /// true for an `ERROR` line
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }

    /// the bytes written to the client, newline terminated
    pub fn to_wire(&self) -> String {
        match self {
            Response::Ok { tag, value: None } => format!("OK {}\n", tag),
            Response::Ok {
                tag,
                value: Some(value),
            } => format!("OK {} {}\n", tag, value),
            Response::Table { tag, rows } => {
                let mut out = format!("OK {}\n", tag);
                for row in rows {
                    out.push_str(row);
                    out.push('\n');
                }
                out.push_str(END_OF_TABLE);
                out.push('\n');
                out
            }
            Response::Error(message) => {
                format!("ERROR {}\n", message.replace(|c: char| c == '\n' || c == '\r', " "))
            }
        }
    }
}

impl Response {
    /// reads one response, as written by [`Response::to_wire`], from `reader`
    ///
    /// # Errors
    /// [`MarketError::Io`] if reading fails and [`MarketError::Protocol`] if the connection
    /// closes early or the response is not well formed
    pub fn read_from<R: BufRead>(reader: &mut R) -> Result<Response> {
        let status = read_line(reader)?;
        if let Some(message) = status.strip_prefix("ERROR") {
            return Ok(Response::Error(message.trim_start().to_owned()));
        }
        let rest = status
            .strip_prefix("OK ")
            .ok_or_else(|| MarketError::Protocol(format!("unexpected response: {:?}", status)))?;
        let (tag, value) = split_token(rest);
        if !TABLE_TAGS.contains(&tag) {
            return Ok(Response::Ok {
                tag: tag.to_owned(),
                value: if value.is_empty() {
                    None
                } else {
                    Some(value.to_owned())
                },
            });
        }
        let mut rows = Vec::new();
        loop {
            let row = read_line(reader)?;
            if row == END_OF_TABLE {
                break;
            }
            rows.push(row);
        }
        Ok(Response::table(tag, rows))
    }
}

fn read_line<R: BufRead>(reader: &mut R) -> Result<String> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(MarketError::Protocol("connection closed by server".into()));
    }
    let trimmed = line.trim_end_matches(|c: char| c == '\n' || c == '\r');
    Ok(trimmed.to_owned())
}

impl From<MarketError> for Response {
    fn from(e: MarketError) -> Self {
        Response::error(e)
    }
}

fn field<T: FromStr>(what: &str, s: Option<&str>) -> Result<T> {
    let s = s.ok_or_else(|| MarketError::Protocol(format!("row is missing {}", what)))?;
    s.parse()
        .map_err(|_| MarketError::Protocol(format!("invalid {} in row: {:?}", what, s)))
}

fn expect_fields<'a>(row: &'a str, count: usize) -> Result<std::str::Split<'a, char>> {
    if row.split('|').count() != count {
        return Err(MarketError::Protocol(format!(
            "expected {} fields in row {:?}",
            count, row
        )));
    }
    Ok(row.split('|'))
}

/// A product listing row: `id|name|category|price|stock|seller|status`
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRow {
    /// server assigned id
    pub id: ProductId,
    /// display name
    pub name: String,
    /// free text category
    pub category: String,
    /// unit price
    pub price: f64,
    /// units left
    pub stock: u32,
    /// username of the seller
    pub seller: String,
    /// lifecycle state
    pub status: ProductStatus,
}

impl From<&Product> for ProductRow {
    fn from(p: &Product) -> Self {
        ProductRow {
            id: p.id,
            name: p.name.clone(),
            category: p.category.clone(),
            price: p.price,
            stock: p.stock,
            seller: p.seller.clone(),
            status: p.status,
        }
    }
}

impl fmt::Display for ProductRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}|{}|{}",
            self.id, self.name, self.category, self.price, self.stock, self.seller, self.status
        )
    }
}

impl FromStr for ProductRow {
    type Err = MarketError;

    fn from_str(row: &str) -> Result<Self> {
        let mut f = expect_fields(row, 7)?;
        Ok(ProductRow {
            id: field("id", f.next())?,
            name: field("name", f.next())?,
            category: field("category", f.next())?,
            price: field("price", f.next())?,
            stock: field("stock", f.next())?,
            seller: field("seller", f.next())?,
            status: field("status", f.next())?,
        })
    }
}

/// The detail row of `GET_PRODUCT`:
/// `id|name|description|category|price|stock|seller|status|registered_at`
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDetail {
    /// server assigned id
    pub id: ProductId,
    /// display name
    pub name: String,
    /// free text
    pub description: String,
    /// free text category
    pub category: String,
    /// unit price
    pub price: f64,
    /// units left
    pub stock: u32,
    /// username of the seller
    pub seller: String,
    /// lifecycle state
    pub status: ProductStatus,
    /// formatted with `DATE_FORMAT`
    pub registered_at: String,
    /// the decoded image, when the product has one
    pub image: Option<Vec<u8>>,
}

impl ProductDetail {
    /// the rows of a `PRODUCT` table: the detail row and, for products with an image, an
    /// `IMAGE|<base64>` row
    pub fn rows(p: &Product) -> Vec<String> {
        let mut rows = vec![format!(
            "{}|{}|{}|{}|{}|{}|{}|{}|{}",
            p.id,
            p.name,
            p.description,
            p.category,
            p.price,
            p.stock,
            p.seller,
            p.status,
            model::format_date(&p.registered_at)
        )];
        if let Some(image) = &p.image {
            rows.push(format!("IMAGE|{}", STANDARD.encode(image)));
        }
        rows
    }

    /// parses the rows produced by [`ProductDetail::rows`]
    pub fn from_rows(rows: &[String]) -> Result<Self> {
        let row = rows
            .first()
            .ok_or_else(|| MarketError::Protocol("missing product row".into()))?;
        let mut f = expect_fields(row, 9)?;
        let mut detail = ProductDetail {
            id: field("id", f.next())?,
            name: field("name", f.next())?,
            description: field("description", f.next())?,
            category: field("category", f.next())?,
            price: field("price", f.next())?,
            stock: field("stock", f.next())?,
            seller: field("seller", f.next())?,
            status: field("status", f.next())?,
            registered_at: field("registration date", f.next())?,
            image: None,
        };
        if let Some(encoded) = rows.get(1).and_then(|r| r.strip_prefix("IMAGE|")) {
            detail.image = Some(
                STANDARD
                    .decode(encoded.as_bytes())
                    .map_err(|e| MarketError::Protocol(format!("invalid image data: {}", e)))?,
            );
        }
        Ok(detail)
    }
}

/// A cart row: `id|name|price|qty`
#[derive(Debug, Clone, PartialEq)]
pub struct CartRow {
    /// the product in the cart
    pub product_id: ProductId,
    /// product name
    pub name: String,
    /// current unit price
    pub price: f64,
    /// units in the cart
    pub quantity: u32,
}

impl From<&CartLine> for CartRow {
    fn from(line: &CartLine) -> Self {
        CartRow {
            product_id: line.product_id,
            name: line.name.clone(),
            price: line.price,
            quantity: line.quantity,
        }
    }
}

impl fmt::Display for CartRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}|{}", self.product_id, self.name, self.price, self.quantity)
    }
}

impl FromStr for CartRow {
    type Err = MarketError;

    fn from_str(row: &str) -> Result<Self> {
        let mut f = expect_fields(row, 4)?;
        Ok(CartRow {
            product_id: field("id", f.next())?,
            name: field("name", f.next())?,
            price: field("price", f.next())?,
            quantity: field("quantity", f.next())?,
        })
    }
}

/// the last row of a `CART` table
pub fn total_row(total: f64) -> String {
    format!("TOTAL|{}", total)
}

/// A purchase history row: `productId|productName|seller|buyer|qty|total|date`
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    /// the product bought
    pub product_id: ProductId,
    /// its name at the time of purchase
    pub product_name: String,
    /// who was paid
    pub seller: String,
    /// who paid
    pub buyer: String,
    /// units bought
    pub quantity: u32,
    /// what the buyer paid for the line
    pub total_price: f64,
    /// formatted with `DATE_FORMAT`
    pub date: String,
}

impl From<&Transaction> for HistoryRow {
    fn from(t: &Transaction) -> Self {
        HistoryRow {
            product_id: t.product_id,
            product_name: t.product_name.clone(),
            seller: t.seller.clone(),
            buyer: t.buyer.clone(),
            quantity: t.quantity,
            total_price: t.total_price,
            date: model::format_date(&t.date),
        }
    }
}

impl fmt::Display for HistoryRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}|{}|{}",
            self.product_id,
            self.product_name,
            self.seller,
            self.buyer,
            self.quantity,
            self.total_price,
            self.date
        )
    }
}

impl FromStr for HistoryRow {
    type Err = MarketError;

    fn from_str(row: &str) -> Result<Self> {
        let mut f = expect_fields(row, 7)?;
        Ok(HistoryRow {
            product_id: field("product id", f.next())?,
            product_name: field("product name", f.next())?,
            seller: field("seller", f.next())?,
            buyer: field("buyer", f.next())?,
            quantity: field("quantity", f.next())?,
            total_price: field("total", f.next())?,
            date: field("date", f.next())?,
        })
    }
}
