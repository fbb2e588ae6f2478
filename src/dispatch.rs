use tracing::{debug, warn};

use crate::command::{self, CartRow, HistoryRow, ProductDetail, ProductRow, Request, Response};
use crate::connection::Session;
use crate::error::Result;
use crate::model::Product;
use crate::store::Store;

/// Executes requests against a [`Store`] and renders the outcome as a [`Response`].
///
/// A dispatcher is cheap to clone; every connection gets its own clone over the same store.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    store: Store,
}

fn product_rows(products: Vec<Product>) -> Vec<String> {
    products
        .iter()
        .map(|p| ProductRow::from(p).to_string())
        .collect()
}

impl Dispatcher {
    /// a dispatcher running requests against `store`
    pub fn new(store: Store) -> Self {
        Dispatcher { store }
    }

    /// the store requests run against
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// parses and executes one request line. Malformed lines get an `ERROR` response like
    /// any other failure.
    pub fn dispatch_line(&self, line: &str, session: &mut Session) -> Response {
        match Request::parse(line) {
            Ok(request) => self.dispatch(request, session),
            Err(e) => {
                warn!("malformed request {:?}: {}", line, e);
                Response::from(e)
            }
        }
    }

    /// executes `request`, turning any error into an `ERROR` response
    pub fn dispatch(&self, request: Request, session: &mut Session) -> Response {
        let name = request.name();
        debug!("dispatching {}", name);
        match self.execute(request, session) {
            Ok(response) => response,
            Err(e) => {
                warn!("{} failed: {}", name, e);
                Response::from(e)
            }
        }
    }

    fn execute(&self, request: Request, session: &mut Session) -> Result<Response> {
        let store = &self.store;
        let response = match request {
            Request::Login { username, password } => {
                let user = store.authenticate(&username, &password)?;
                session.login(&username);
                Response::ok_with(
                    "LOGIN",
                    format!(
                        "{}|{}|{}",
                        user.username(),
                        user.wallet(),
                        user.account_type().label()
                    ),
                )
            }
            Request::Signup {
                username,
                password,
                profile,
                account_type,
            } => {
                store.sign_up(&username, &password, profile, account_type)?;
                Response::ok("SIGNUP")
            }
            Request::Logout => {
                session.logout();
                Response::ok("LOGOUT")
            }
            Request::GetApprovedProducts => {
                Response::table("APPROVED_PRODUCTS", product_rows(store.approved_products()))
            }
            Request::GetPendingProducts => {
                Response::table("PENDING_PRODUCTS", product_rows(store.pending_products()))
            }
            Request::GetAllProducts => {
                Response::table("ALL_PRODUCTS", product_rows(store.all_products()))
            }
            Request::GetProduct { product_id } => {
                let product = store.get_product(product_id)?;
                Response::table("PRODUCT", ProductDetail::rows(&product))
            }
            Request::GetCategory { category } => Response::table(
                "CATEGORY_PRODUCTS",
                product_rows(store.products_by_category(&category)),
            ),
            Request::Search { term } => {
                Response::table("SEARCH_RESULTS", product_rows(store.search_products(&term)))
            }
            Request::AddProduct(draft) => {
                let product = store.register_product(draft)?;
                debug!("registered product {} for {}", product.id, product.seller);
                Response::ok("ADD_PRODUCT")
            }
            Request::EditProduct { product_id, edit } => {
                store.edit_product(product_id, edit)?;
                Response::ok("EDIT_PRODUCT")
            }
            Request::Approve { product_id } => {
                store.approve_product(product_id)?;
                Response::ok("APPROVE")
            }
            Request::Reject { product_id } => {
                store.reject_product(product_id)?;
                Response::ok("REJECT")
            }
            Request::DeleteProduct { product_id } => {
                store.remove_product(product_id)?;
                Response::ok("DELETE_PRODUCT")
            }
            Request::AddToCart {
                username,
                product_id,
                quantity,
            } => {
                store.add_to_cart(&username, product_id, quantity)?;
                Response::ok("ADD_TO_CART")
            }
            Request::GetCart { username } => {
                let cart = store.cart(&username)?;
                let mut rows: Vec<String> = cart
                    .lines
                    .iter()
                    .map(|line| CartRow::from(line).to_string())
                    .collect();
                rows.push(command::total_row(cart.total));
                Response::table("CART", rows)
            }
            Request::RemoveFromCart {
                username,
                product_id,
            } => {
                store.remove_from_cart(&username, product_id)?;
                Response::ok("REMOVE_FROM_CART")
            }
            Request::ClearCart { username } => {
                store.clear_cart(&username)?;
                Response::ok("CLEAR_CART")
            }
            Request::Checkout { username } => {
                let receipt = store.checkout(&username)?;
                Response::ok_with("CHECKOUT", receipt.total)
            }
            Request::GetMyProducts { username } => {
                Response::table("MY_PRODUCTS", product_rows(store.products_by_seller(&username)?))
            }
            Request::GetHistory { username } => {
                let rows = store
                    .purchase_history(&username)?
                    .iter()
                    .map(|t| HistoryRow::from(t).to_string())
                    .collect();
                Response::table("HISTORY", rows)
            }
            Request::GetWallet { username } => Response::ok_with("WALLET", store.wallet(&username)?),
            Request::Deposit { username, amount } => {
                Response::ok_with("DEPOSIT", store.deposit_funds(&username, amount)?)
            }
            Request::Withdraw { username, amount } => {
                Response::ok_with("WITHDRAW", store.withdraw_funds(&username, amount)?)
            }
            Request::UpdateProfile { username, profile } => {
                store.update_profile(&username, profile)?;
                Response::ok("UPDATE_PROFILE")
            }
        };
        Ok(response)
    }
}
