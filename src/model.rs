//! The records owned by the [`Store`]: users (with their role-specific payload), products and
//! purchase transactions.
//!
//! A [`User`] is a single record whose [`Role`] carries the customer-only state (cart,
//! purchase history and listed products), so callers ask for a capability with
//! [`User::customer`] instead of inspecting the account type.
//!
//! [`Store`]: ../struct.Store.html
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDateTime, Timelike};

use crate::error::{MarketError, Result};

/// Products are keyed by a server assigned, monotonically increasing id starting at 1
pub type ProductId = u64;

/// format used for every date that is persisted or sent over the wire
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// rounds a monetary amount to whole cents
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// the current local time, truncated to whole seconds so it survives a trip through
/// [`DATE_FORMAT`]
pub fn now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

/// formats a date with [`DATE_FORMAT`]
pub fn format_date(date: &NaiveDateTime) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// parses a date written with [`DATE_FORMAT`]
pub fn parse_date(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|e| MarketError::Persistence(format!("invalid date {:?}: {}", s, e)))
}

/// usernames travel as single protocol tokens and as row fields, so they may not contain
/// whitespace or the `|` field separator
pub fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(MarketError::InvalidArgument("Username must not be empty".into()));
    }
    if username.chars().any(|c| c.is_whitespace() || c.is_control() || c == '|') {
        return Err(MarketError::InvalidArgument(format!(
            "Username contains illegal characters: {}",
            username
        )));
    }
    Ok(())
}

/// rounds `amount` to cents and checks that at least one cent is left, returning the rounded
/// amount. Sub-cent and non-finite amounts are refused.
pub fn validate_amount(amount: f64) -> Result<f64> {
    let cents = round_cents(amount);
    if cents.is_finite() && cents > 0.0 {
        Ok(cents)
    } else {
        Err(MarketError::InvalidArgument(format!(
            "Amount must be at least 0.01: {}",
            amount
        )))
    }
}

/// checks that a computed balance or total is still a finite amount
pub fn checked_balance(balance: f64) -> Result<f64> {
    let balance = round_cents(balance);
    if balance.is_finite() {
        Ok(balance)
    } else {
        Err(MarketError::InvalidArgument("Amount is too large".into()))
    }
}

/// The lifecycle state of a [`Product`].
///
/// `PendingApproval -> Approved` happens on admin approval, `Approved -> Sold` happens when a
/// purchase takes the stock to zero. A pending product that is rejected is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductStatus {
    /// registered but not yet approved by an admin
    PendingApproval,
    /// listed for sale
    Approved,
    /// stock reached zero through a purchase
    Sold,
}

impl ProductStatus {
    /// the form written to the products file
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::PendingApproval => "pending",
            ProductStatus::Approved => "approved",
            ProductStatus::Sold => "sold",
        }
    }

    /// the form sent to clients inside product rows
    pub fn label(&self) -> &'static str {
        match self {
            ProductStatus::PendingApproval => "Pending",
            ProductStatus::Approved => "Approved",
            ProductStatus::Sold => "Sold",
        }
    }
}

impl FromStr for ProductStatus {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" | "pending_approval" => Ok(ProductStatus::PendingApproval),
            "approved" => Ok(ProductStatus::Approved),
            "sold" => Ok(ProductStatus::Sold),
            other => Err(MarketError::Persistence(format!(
                "unknown product status: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// the caller supplied attributes of a product that is being registered
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDraft {
    /// must not be blank
    pub name: String,
    /// free text
    pub description: String,
    /// free text category
    pub category: String,
    /// unit price, at least one cent
    pub price: f64,
    /// units offered
    pub stock: u32,
    /// an existing username
    pub seller: String,
    /// optional raw image bytes
    pub image: Option<Vec<u8>>,
}

impl ProductDraft {
    /// checks the draft attributes: a name, a seller and a positive price are required
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(MarketError::InvalidArgument("Product name must not be empty".into()));
        }
        if self.seller.is_empty() {
            return Err(MarketError::InvalidArgument("Seller must not be empty".into()));
        }
        validate_price(self.price).map(|_| ())
    }
}

/// replacement attributes for an existing product
#[derive(Debug, Clone, PartialEq)]
pub struct ProductEdit {
    /// must not be blank
    pub name: String,
    /// free text
    pub description: String,
    /// free text category
    pub category: String,
    /// unit price, at least one cent
    pub price: f64,
    /// units offered
    pub stock: u32,
}

/// the price rounded to cents, refused unless at least one cent is left
pub(crate) fn validate_price(price: f64) -> Result<f64> {
    let cents = round_cents(price);
    if cents.is_finite() && cents > 0.0 {
        Ok(cents)
    } else {
        Err(MarketError::InvalidArgument(format!(
            "Price must be at least 0.01: {}",
            price
        )))
    }
}

/// A product listed on the marketplace
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    /// server assigned, never reused
    pub id: ProductId,
    /// display name
    pub name: String,
    /// free text
    pub description: String,
    /// free text category
    pub category: String,
    /// unit price in whole cents, always above zero
    pub price: f64,
    /// units left
    pub stock: u32,
    /// username of the user who listed it
    pub seller: String,
    /// lifecycle state
    pub status: ProductStatus,
    /// when the product was listed
    pub registered_at: NaiveDateTime,
    /// optional raw image bytes
    pub image: Option<Vec<u8>>,
}

impl Product {
    /// builds a product awaiting approval from a validated draft
    pub fn new(id: ProductId, draft: ProductDraft, registered_at: NaiveDateTime) -> Self {
        Product {
            id,
            name: draft.name,
            description: draft.description,
            category: draft.category,
            price: round_cents(draft.price),
            stock: draft.stock,
            seller: draft.seller,
            status: ProductStatus::PendingApproval,
            registered_at,
            image: draft.image,
        }
    }

    /// true while awaiting approval
    pub fn is_pending(&self) -> bool {
        self.status == ProductStatus::PendingApproval
    }

    /// true when it can be bought
    pub fn is_approved(&self) -> bool {
        self.status == ProductStatus::Approved
    }

    /// checks that `quantity` units could be bought right now, without changing anything
    pub fn check_purchase(&self, quantity: u32) -> Result<()> {
        if quantity == 0 {
            return Err(MarketError::InvalidArgument(
                "Quantity must be at least 1".into(),
            ));
        }
        if !self.is_approved() {
            return Err(MarketError::InvalidState(format!(
                "Product {} is not available for purchase ({})",
                self.id, self.status
            )));
        }
        if quantity > self.stock {
            return Err(MarketError::InsufficientStock {
                product_id: self.id,
                requested: quantity,
                available: self.stock,
            });
        }
        Ok(())
    }

    /// takes `quantity` units out of stock, marking the product sold when none are left.
    /// Nothing changes when the purchase is not possible.
    pub fn purchase(&mut self, quantity: u32) -> Result<()> {
        self.check_purchase(quantity)?;
        self.stock -= quantity;
        if self.stock == 0 {
            self.status = ProductStatus::Sold;
        }
        Ok(())
    }

    /// applies an edit. Sold products are final, and an approved product must keep some stock
    pub fn apply(&mut self, edit: ProductEdit) -> Result<()> {
        if edit.name.trim().is_empty() {
            return Err(MarketError::InvalidArgument("Product name must not be empty".into()));
        }
        let price = validate_price(edit.price)?;
        match self.status {
            ProductStatus::Sold => {
                return Err(MarketError::InvalidState(format!(
                    "Product {} is sold and can not be edited",
                    self.id
                )))
            }
            ProductStatus::Approved if edit.stock == 0 => {
                return Err(MarketError::InvalidArgument(
                    "An approved product must keep at least one unit in stock".into(),
                ))
            }
            _ => {}
        }
        self.name = edit.name;
        self.description = edit.description;
        self.category = edit.category;
        self.price = price;
        self.stock = edit.stock;
        Ok(())
    }

    /// case-insensitive substring match over name, description and category.
    /// `needle` must already be lower case.
    pub fn matches(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
            || self.category.to_lowercase().contains(needle)
    }
}

/// A completed purchase of one cart line. Recorded once per line and never changed.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    /// the product bought
    pub product_id: ProductId,
    /// the name at the time of purchase
    pub product_name: String,
    /// who was paid
    pub seller: String,
    /// who paid
    pub buyer: String,
    /// units bought
    pub quantity: u32,
    /// unit price times quantity
    pub total_price: f64,
    /// when the checkout happened
    pub date: NaiveDateTime,
}

/// The state only customers carry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomerAccount {
    cart: BTreeMap<ProductId, u32>,
    history: Vec<Transaction>,
    registered: BTreeSet<ProductId>,
}

impl CustomerAccount {
    /// product id to quantity, every quantity at least 1
    pub fn cart(&self) -> &BTreeMap<ProductId, u32> {
        &self.cart
    }

    /// adds `quantity` units of a product to the cart, on top of any already there
    pub fn add_to_cart(&mut self, product_id: ProductId, quantity: u32) {
        if quantity == 0 {
            return;
        }
        let entry = self.cart.entry(product_id).or_insert(0);
        *entry = entry.saturating_add(quantity);
    }

    /// returns `true` if the product was in the cart
    pub fn remove_from_cart(&mut self, product_id: ProductId) -> bool {
        self.cart.remove(&product_id).is_some()
    }

    /// empties the cart
    pub fn clear_cart(&mut self) {
        self.cart.clear();
    }

    /// purchases and sales in the order they happened
    pub fn history(&self) -> &[Transaction] {
        &self.history
    }

    /// appends a purchase or sale to the history
    pub fn record(&mut self, transaction: Transaction) {
        self.history.push(transaction);
    }

    /// ids of the products this customer listed
    pub fn registered_products(&self) -> &BTreeSet<ProductId> {
        &self.registered
    }

    /// remembers a product this customer listed
    pub fn register_product(&mut self, product_id: ProductId) {
        self.registered.insert(product_id);
    }
}

/// The kind of account a user holds, without any of the role's payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountType {
    /// approves products, has no cart
    Admin,
    /// buys and sells
    Customer,
}

impl AccountType {
    /// the form written to the users file
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Admin => "admin",
            AccountType::Customer => "customer",
        }
    }

    /// the form sent to clients on login
    pub fn label(&self) -> &'static str {
        match self {
            AccountType::Admin => "Admin",
            AccountType::Customer => "Customer",
        }
    }

    /// `admin` (in any case) is an admin, anything else is a customer
    pub fn parse_lenient(s: &str) -> Self {
        if s.eq_ignore_ascii_case("admin") {
            AccountType::Admin
        } else {
            AccountType::Customer
        }
    }
}

/// A user's role together with the state that only that role owns
#[derive(Debug, Clone, PartialEq)]
pub enum Role {
    /// an administrator
    Admin,
    /// a customer and the state only customers have
    Customer(CustomerAccount),
}

/// contact details a user may change after signing up
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileUpdate {
    /// contact email
    pub email: String,
    /// contact phone number
    pub phone: String,
    /// postal address
    pub address: String,
}

/// A registered account. The username is the immutable key.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    username: String,
    password_hash: String,
    email: String,
    phone: String,
    address: String,
    wallet: f64,
    role: Role,
}

impl User {
    /// creates a user with an empty wallet
    pub fn new(
        username: impl Into<String>,
        password_hash: impl Into<String>,
        email: impl Into<String>,
        phone: impl Into<String>,
        address: impl Into<String>,
        account_type: AccountType,
    ) -> Self {
        let role = match account_type {
            AccountType::Admin => Role::Admin,
            AccountType::Customer => Role::Customer(CustomerAccount::default()),
        };
        User {
            username: username.into(),
            password_hash: password_hash.into(),
            email: email.into(),
            phone: phone.into(),
            address: address.into(),
            wallet: 0.0,
            role,
        }
    }

    /// the unique login name
    pub fn username(&self) -> &str {
        &self.username
    }

    /// hex encoded hash of the password
    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    /// contact email
    pub fn email(&self) -> &str {
        &self.email
    }

    /// contact phone number
    pub fn phone(&self) -> &str {
        &self.phone
    }

    /// postal address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// the balance, never negative
    pub fn wallet(&self) -> f64 {
        self.wallet
    }

    /// the role and its role specific state
    pub fn role(&self) -> &Role {
        &self.role
    }

    /// admin or customer
    pub fn account_type(&self) -> AccountType {
        match self.role {
            Role::Admin => AccountType::Admin,
            Role::Customer(_) => AccountType::Customer,
        }
    }

    /// the customer capability of this user, `None` for admins
    pub fn customer(&self) -> Option<&CustomerAccount> {
        match &self.role {
            Role::Customer(account) => Some(account),
            Role::Admin => None,
        }
    }

    /// like [`User::customer`], but mutable
    pub fn customer_mut(&mut self) -> Option<&mut CustomerAccount> {
        match &mut self.role {
            Role::Customer(account) => Some(account),
            Role::Admin => None,
        }
    }

    /// like [`User::customer_mut`], but an admin is an error
    pub fn require_customer(&mut self) -> Result<&mut CustomerAccount> {
        let username = self.username.clone();
        self.customer_mut()
            .ok_or(MarketError::NotCustomer(username))
    }

    /// replaces the contact details
    pub fn update_profile(&mut self, profile: ProfileUpdate) {
        self.email = profile.email;
        self.phone = profile.phone;
        self.address = profile.address;
    }

    /// adds a positive amount to the wallet, returning the new balance
    pub fn deposit(&mut self, amount: f64) -> Result<f64> {
        let amount = validate_amount(amount)?;
        self.wallet = checked_balance(self.wallet + amount)?;
        Ok(self.wallet)
    }

    /// takes a positive amount, no larger than the balance, out of the wallet and returns the
    /// new balance
    pub fn withdraw(&mut self, amount: f64) -> Result<f64> {
        let amount = validate_amount(amount)?;
        if amount > self.wallet {
            return Err(MarketError::InsufficientFunds {
                needed: amount,
                available: self.wallet,
            });
        }
        self.wallet = round_cents(self.wallet - amount);
        Ok(self.wallet)
    }

    /// settlement credit. Nothing changes when the balance would overflow.
    pub(crate) fn credit(&mut self, amount: f64) -> Result<()> {
        self.wallet = checked_balance(self.wallet + amount)?;
        Ok(())
    }

    /// settlement debit; the caller checked the balance covers it
    pub(crate) fn debit(&mut self, amount: f64) {
        self.wallet = round_cents((self.wallet - amount).max(0.0));
    }

    /// restores a persisted balance. Negative or non-finite values are clamped to zero.
    pub(crate) fn set_wallet(&mut self, balance: f64) {
        self.wallet = if balance.is_finite() && balance > 0.0 {
            round_cents(balance)
        } else {
            0.0
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(price: f64, stock: u32) -> ProductDraft {
        ProductDraft {
            name: "Widget".into(),
            description: "a widget".into(),
            category: "Electronics".into(),
            price,
            stock,
            seller: "admin".into(),
            image: None,
        }
    }

    fn approved(stock: u32) -> Product {
        let mut p = Product::new(1, draft(10.0, stock), now());
        p.status = ProductStatus::Approved;
        p
    }

    #[test]
    fn purchase_reduces_stock_and_sells_out() {
        let mut p = approved(3);
        p.purchase(2).unwrap();
        assert_eq!(p.stock, 1);
        assert_eq!(p.status, ProductStatus::Approved);
        p.purchase(1).unwrap();
        assert_eq!(p.stock, 0);
        assert_eq!(p.status, ProductStatus::Sold);
    }

    #[test]
    fn failed_purchase_leaves_stock_alone() {
        let mut p = approved(2);
        assert!(matches!(
            p.purchase(3),
            Err(MarketError::InsufficientStock { requested: 3, available: 2, .. })
        ));
        assert!(matches!(p.purchase(0), Err(MarketError::InvalidArgument(_))));
        assert_eq!(p.stock, 2);
        assert_eq!(p.status, ProductStatus::Approved);
    }

    #[test]
    fn pending_products_can_not_be_bought() {
        let mut p = Product::new(7, draft(10.0, 5), now());
        assert!(matches!(p.purchase(1), Err(MarketError::InvalidState(_))));
        assert_eq!(p.stock, 5);
    }

    #[test]
    fn draft_requires_positive_price() {
        assert!(draft(0.0, 1).validate().is_err());
        assert!(draft(-3.0, 1).validate().is_err());
        assert!(draft(f64::NAN, 1).validate().is_err());
        assert!(draft(0.01, 0).validate().is_ok());
    }

    #[test]
    fn sold_products_can_not_be_edited() {
        let mut p = approved(1);
        p.purchase(1).unwrap();
        let edit = ProductEdit {
            name: "New".into(),
            description: String::new(),
            category: "Misc".into(),
            price: 5.0,
            stock: 4,
        };
        assert!(matches!(p.apply(edit), Err(MarketError::InvalidState(_))));
    }

    #[test]
    fn search_matching_ignores_case() {
        let p = approved(1);
        assert!(p.matches("widg"));
        assert!(p.matches("electr"));
        assert!(p.matches("a widget"));
        assert!(!p.matches("garden"));
    }

    #[test]
    fn wallet_rules() {
        let mut u = User::new("bob", "h", "e", "p", "a", AccountType::Customer);
        assert_eq!(u.deposit(100.0).unwrap(), 100.0);
        assert!(u.deposit(0.0).is_err());
        assert!(u.deposit(-5.0).is_err());
        assert!(matches!(
            u.withdraw(100.01),
            Err(MarketError::InsufficientFunds { .. })
        ));
        assert_eq!(u.withdraw(59.97).unwrap(), 40.03);
        assert_eq!(u.wallet(), 40.03);
    }

    #[test]
    fn sub_cent_amounts_are_refused() {
        assert!(matches!(
            draft(0.004, 5).validate(),
            Err(MarketError::InvalidArgument(_))
        ));
        assert!(draft(0.01, 5).validate().is_ok());
        assert_eq!(Product::new(1, draft(0.014, 5), now()).price, 0.01);

        let mut p = approved(3);
        let edit = ProductEdit {
            name: "Widget".into(),
            description: "d".into(),
            category: "Misc".into(),
            price: 0.001,
            stock: 3,
        };
        assert!(matches!(p.apply(edit), Err(MarketError::InvalidArgument(_))));
        assert_eq!(p.price, 10.0);

        let mut u = User::new("bob", "h", "e", "p", "a", AccountType::Customer);
        assert!(matches!(u.deposit(0.001), Err(MarketError::InvalidArgument(_))));
        assert!(matches!(u.withdraw(0.004), Err(MarketError::InvalidArgument(_))));
        assert_eq!(u.wallet(), 0.0);
    }

    #[test]
    fn wallets_stay_finite() {
        let mut u = User::new("bob", "h", "e", "p", "a", AccountType::Customer);
        assert!(matches!(u.deposit(1e307), Err(MarketError::InvalidArgument(_))));
        assert!(matches!(u.deposit(f64::MAX), Err(MarketError::InvalidArgument(_))));
        assert_eq!(u.wallet(), 0.0);

        let balance = u.deposit(1.7e306).unwrap();
        assert!(balance.is_finite());
        assert!(matches!(u.deposit(1.7e306), Err(MarketError::InvalidArgument(_))));
        assert!(u.credit(1.7e306).is_err());
        assert_eq!(u.wallet(), balance);
        assert!(matches!(draft(1e307, 1).validate(), Err(MarketError::InvalidArgument(_))));
    }

    #[test]
    fn only_customers_hold_carts() {
        let mut admin = User::new("root", "h", "e", "p", "a", AccountType::Admin);
        assert!(admin.customer().is_none());
        assert!(matches!(admin.require_customer(), Err(MarketError::NotCustomer(_))));

        let mut cust = User::new("amy", "h", "e", "p", "a", AccountType::Customer);
        let account = cust.require_customer().unwrap();
        account.add_to_cart(4, 2);
        account.add_to_cart(4, 3);
        account.add_to_cart(5, 0);
        assert_eq!(account.cart().get(&4), Some(&5));
        assert!(!account.cart().contains_key(&5));
    }

    #[test]
    fn usernames_are_single_tokens() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("a b").is_err());
        assert!(validate_username("a|b").is_err());
    }

    #[test]
    fn dates_round_trip_through_the_format() {
        let d = now();
        assert_eq!(parse_date(&format_date(&d)).unwrap(), d);
    }
}
