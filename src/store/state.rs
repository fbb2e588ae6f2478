use std::collections::BTreeMap;

use crate::error::{MarketError, Result};
use crate::model::{self, round_cents, Product, ProductId, ProductStatus, Transaction, User};
use crate::persist::{Dirty, Snapshot};

/// One line of a customer's cart, priced with the product's current price
#[derive(Debug, Clone, PartialEq)]
pub struct CartLine {
    /// the product in the cart
    pub product_id: ProductId,
    /// current product name
    pub name: String,
    /// current unit price
    pub price: f64,
    /// units in the cart
    pub quantity: u32,
}

/// A priced copy of a customer's cart
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CartView {
    /// one line per product, ordered by product id
    pub lines: Vec<CartLine>,
    /// sum of price times quantity
    pub total: f64,
}

/// The outcome of a successful checkout
#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    /// the amount taken from the buyer's wallet
    pub total: f64,
    /// the buyer's balance after checkout
    pub balance: f64,
    /// one transaction per cart line
    pub transactions: Vec<Transaction>,
}

/// Everything guarded by the store lock
#[derive(Debug)]
pub(super) struct State {
    pub(super) users: BTreeMap<String, User>,
    pub(super) products: BTreeMap<ProductId, Product>,
    pub(super) next_product_id: ProductId,
    pub(super) dirty: Dirty,
}

impl State {
    pub(super) fn from_snapshot(snapshot: Snapshot) -> Self {
        let products: BTreeMap<ProductId, Product> =
            snapshot.products.into_iter().map(|p| (p.id, p)).collect();
        let high_water = products.keys().next_back().map_or(1, |id| id + 1);
        State {
            users: snapshot
                .users
                .into_iter()
                .map(|u| (u.username().to_owned(), u))
                .collect(),
            products,
            next_product_id: snapshot.next_product_id.max(high_water),
            dirty: Dirty::NONE,
        }
    }

    pub(super) fn snapshot(&self) -> Snapshot {
        Snapshot {
            users: self.users.values().cloned().collect(),
            products: self.products.values().cloned().collect(),
            next_product_id: self.next_product_id,
        }
    }

    pub(super) fn user(&self, username: &str) -> Result<&User> {
        self.users
            .get(username)
            .ok_or_else(|| MarketError::user_not_found(username))
    }

    pub(super) fn user_mut(&mut self, username: &str) -> Result<&mut User> {
        self.users
            .get_mut(username)
            .ok_or_else(|| MarketError::user_not_found(username))
    }

    pub(super) fn product(&self, product_id: ProductId) -> Result<&Product> {
        self.products
            .get(&product_id)
            .ok_or_else(|| MarketError::product_not_found(product_id))
    }

    pub(super) fn product_mut(&mut self, product_id: ProductId) -> Result<&mut Product> {
        self.products
            .get_mut(&product_id)
            .ok_or_else(|| MarketError::product_not_found(product_id))
    }

    pub(super) fn allocate_product_id(&mut self) -> ProductId {
        let id = self.next_product_id;
        self.next_product_id += 1;
        id
    }

    /// inserts a product at `PendingApproval`, advancing the id allocator past its id and
    /// recording it on the seller's account
    pub(super) fn insert_product(&mut self, mut product: Product) -> Result<Product> {
        if self.products.contains_key(&product.id) {
            return Err(MarketError::DuplicateProductId(product.id));
        }
        if product.id == 0 {
            return Err(MarketError::InvalidArgument("Product ids start at 1".into()));
        }
        product.price = model::validate_price(product.price)?;
        let seller = self.user_mut(&product.seller)?;
        if let Some(account) = seller.customer_mut() {
            account.register_product(product.id);
            self.dirty.users = true;
        }
        product.status = ProductStatus::PendingApproval;
        if product.id >= self.next_product_id {
            self.next_product_id = product.id + 1;
        }
        self.products.insert(product.id, product.clone());
        Ok(product)
    }

    /// deletes a product and drops it from every cart
    pub(super) fn delete_product(&mut self, product_id: ProductId) -> Result<Product> {
        let product = self
            .products
            .remove(&product_id)
            .ok_or_else(|| MarketError::product_not_found(product_id))?;
        for account in self.users.values_mut().filter_map(User::customer_mut) {
            if account.remove_from_cart(product_id) {
                self.dirty.carts = true;
            }
        }
        Ok(product)
    }

    /// drops cart lines that point at products which no longer exist
    pub(super) fn prune_carts(&mut self) -> usize {
        let products = &self.products;
        let mut pruned = 0;
        for account in self.users.values_mut().filter_map(User::customer_mut) {
            let stale: Vec<ProductId> = account
                .cart()
                .keys()
                .filter(|id| !products.contains_key(id))
                .copied()
                .collect();
            for id in stale {
                account.remove_from_cart(id);
                pruned += 1;
            }
        }
        if pruned > 0 {
            self.dirty.carts = true;
        }
        pruned
    }

    pub(super) fn cart_view(&self, username: &str) -> Result<CartView> {
        let user = self.user(username)?;
        let account = user
            .customer()
            .ok_or_else(|| MarketError::NotCustomer(username.to_owned()))?;
        let mut view = CartView::default();
        for (product_id, quantity) in account.cart() {
            if let Some(p) = self.products.get(product_id) {
                view.total += p.price * f64::from(*quantity);
                view.lines.push(CartLine {
                    product_id: *product_id,
                    name: p.name.clone(),
                    price: p.price,
                    quantity: *quantity,
                });
            }
        }
        view.total = round_cents(view.total);
        Ok(view)
    }

    /// Settles the whole cart of `username`.
    ///
    /// Every line is validated and the total is checked against the wallet before anything
    /// is changed, so a failed checkout leaves stock, wallets, histories and the cart as
    /// they were.
    pub(super) fn checkout(&mut self, username: &str) -> Result<Receipt> {
        let buyer = self.user(username)?;
        let account = buyer
            .customer()
            .ok_or_else(|| MarketError::NotCustomer(username.to_owned()))?;
        if account.cart().is_empty() {
            return Err(MarketError::InvalidState("Cart is empty".into()));
        }
        let lines: Vec<(ProductId, u32)> = account.cart().iter().map(|(k, v)| (*k, *v)).collect();

        let mut total = 0.0;
        let mut credits: BTreeMap<&str, f64> = BTreeMap::new();
        for (product_id, quantity) in &lines {
            let product = self.products.get(product_id).ok_or_else(|| {
                MarketError::InvalidState(format!(
                    "Product {} is no longer available",
                    product_id
                ))
            })?;
            product.check_purchase(*quantity)?;
            let line_total = model::checked_balance(product.price * f64::from(*quantity))?;
            total += line_total;
            *credits.entry(product.seller.as_str()).or_insert(0.0) += line_total;
        }
        let total = model::checked_balance(total)?;
        if buyer.wallet() < total {
            return Err(MarketError::InsufficientFunds {
                needed: total,
                available: buyer.wallet(),
            });
        }
        for (seller, credit) in &credits {
            if let Some(seller) = self.users.get(*seller) {
                model::checked_balance(seller.wallet() + credit)?;
            }
        }

        let date = model::now();
        let mut transactions = Vec::with_capacity(lines.len());
        for (product_id, quantity) in lines {
            let product = self.product_mut(product_id)?;
            product.purchase(quantity)?;
            let line_total = round_cents(product.price * f64::from(quantity));
            let transaction = Transaction {
                product_id,
                product_name: product.name.clone(),
                seller: product.seller.clone(),
                buyer: username.to_owned(),
                quantity,
                total_price: line_total,
                date,
            };

            if let Some(seller) = self.users.get_mut(&transaction.seller) {
                seller.credit(line_total)?;
                if transaction.seller != username {
                    if let Some(seller_account) = seller.customer_mut() {
                        seller_account.record(transaction.clone());
                    }
                }
            }
            let buyer = self.user_mut(username)?;
            buyer.debit(line_total);
            buyer.require_customer()?.record(transaction.clone());
            transactions.push(transaction);
        }

        let buyer = self.user_mut(username)?;
        buyer.require_customer()?.clear_cart();
        let balance = buyer.wallet();
        self.dirty.merge(Dirty::ALL);
        Ok(Receipt {
            total,
            balance,
            transactions,
        })
    }
}
