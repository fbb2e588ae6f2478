//! The in-memory, authoritative marketplace state and every business operation on it.
//!
//! A [`Store`] is a cheap handle (an `Arc`) that can be cloned into each connection thread.
//! All users and products live behind one mutex, since checkout touches both collections at
//! once. Store methods never perform network IO; queries copy what they need under the lock
//! and return owned values.
//!
//! After a successful mutation the changed [`Part`]s are marked dirty and, depending on the
//! [`FlushPolicy`], written out right away (outside the state lock) or by a background
//! flusher thread.
//!
//! [`Part`]: ../persist/enum.Part.html
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::Duration;

use crossbeam::channel;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{MarketError, Result};
use crate::model::{
    self, validate_username, AccountType, Product, ProductDraft, ProductEdit, ProductId,
    ProductStatus, ProfileUpdate, Transaction, User,
};
use crate::password::{self, PasswordHasher, Sha256Hasher};
use crate::persist::{Dirty, MemoryPersistence, Persistence};

mod state;

pub use self::state::{CartLine, CartView, Receipt};
use self::state::State;

/// username of the administrator seeded into an empty store
pub const DEFAULT_ADMIN: &str = "admin";
const DEFAULT_ADMIN_PASSWORD: &str = "Admin123";
const DEFAULT_ADMIN_FUNDS: f64 = 10000.0;

/// When dirty state is written to the [`Persistence`] collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPolicy {
    /// after every successful mutation, before the caller gets its result
    Sync,
    /// from a background thread, at the given interval
    Interval(Duration),
}

impl Default for FlushPolicy {
    fn default() -> Self {
        FlushPolicy::Sync
    }
}

struct Shared {
    state: Mutex<State>,
    // lock order: sink before state
    sink: Mutex<Box<dyn Persistence>>,
    hasher: Box<dyn PasswordHasher>,
    policy: FlushPolicy,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// writes every dirty part. Parts that fail to save stay dirty for the next flush.
    fn flush(&self) -> Result<()> {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        let (snapshot, dirty) = {
            let mut state = self.state();
            if state.dirty.is_empty() {
                return Ok(());
            }
            let dirty = std::mem::replace(&mut state.dirty, Dirty::NONE);
            (state.snapshot(), dirty)
        };

        let mut failed = Dirty::NONE;
        let mut first_error = None;
        for part in dirty.parts() {
            if let Err(e) = sink.save_part(part, &snapshot) {
                error!("failed to save {:?}: {}", part, e);
                failed.insert(part);
                first_error.get_or_insert(e);
            }
        }
        if let Some(e) = first_error {
            self.state().dirty.merge(failed);
            return Err(e);
        }
        debug!("flushed {:?}", dirty.parts());
        Ok(())
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            error!("final flush failed: {}", e);
        }
    }
}

/// The marketplace store. See the [module documentation](index.html).
#[derive(Clone)]
pub struct Store {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state();
        f.debug_struct("Store")
            .field("users", &state.users.len())
            .field("products", &state.products.len())
            .field("next_product_id", &state.next_product_id)
            .field("policy", &self.shared.policy)
            .finish()
    }
}

impl Store {
    /// loads the store from `persistence`, hashing passwords with SHA-256
    pub fn open(persistence: impl Persistence, policy: FlushPolicy) -> Result<Store> {
        Store::open_with_hasher(persistence, policy, Sha256Hasher)
    }

    /// a store over a fresh [`MemoryPersistence`], flushing synchronously
    pub fn in_memory() -> Result<Store> {
        Store::open(MemoryPersistence::new(), FlushPolicy::Sync)
    }

    /// loads the store from `persistence` using the given password hasher.
    ///
    /// When nothing is persisted yet (or no users are), a default administrator is created.
    #[instrument(skip(persistence, hasher))]
    pub fn open_with_hasher(
        mut persistence: impl Persistence,
        policy: FlushPolicy,
        hasher: impl PasswordHasher,
    ) -> Result<Store> {
        let snapshot = persistence.load()?.unwrap_or_default();
        let mut state = State::from_snapshot(snapshot);

        let pruned = state.prune_carts();
        if pruned > 0 {
            warn!("dropped {} cart entries for products that no longer exist", pruned);
        }
        if state.users.is_empty() {
            info!("no users found, creating default administrator {:?}", DEFAULT_ADMIN);
            let mut admin = User::new(
                DEFAULT_ADMIN,
                hasher.hash(DEFAULT_ADMIN_PASSWORD),
                "admin@market.local",
                "09123456789",
                "HQ",
                AccountType::Admin,
            );
            admin.deposit(DEFAULT_ADMIN_FUNDS)?;
            state.users.insert(DEFAULT_ADMIN.to_owned(), admin);
            state.dirty = Dirty::ALL;
        }
        info!(
            "store opened with {} users, {} products, next product id {}",
            state.users.len(),
            state.products.len(),
            state.next_product_id
        );

        let shared = Arc::new(Shared {
            state: Mutex::new(state),
            sink: Mutex::new(Box::new(persistence)),
            hasher: Box::new(hasher),
            policy,
        });
        if let FlushPolicy::Interval(every) = policy {
            spawn_flusher(Arc::downgrade(&shared), every)?;
        }
        let store = Store { shared };
        store.persist();
        Ok(store)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.shared.state()
    }

    /// writes all dirty parts now, whatever the flush policy
    pub fn flush(&self) -> Result<()> {
        self.shared.flush()
    }

    fn persist(&self) {
        if self.shared.policy == FlushPolicy::Sync {
            // failures are logged by flush and retried on the next one
            let _ = self.shared.flush();
        }
    }

    /// runs `op` under the state lock. On success the `dirty` parts are marked and persisted
    /// according to the flush policy once the lock is released.
    fn mutate<T>(&self, dirty: Dirty, op: impl FnOnce(&mut State) -> Result<T>) -> Result<T> {
        let value = {
            let mut state = self.state();
            let value = op(&mut state)?;
            state.dirty.merge(dirty);
            value
        };
        self.persist();
        Ok(value)
    }

    fn read<T>(&self, op: impl FnOnce(&State) -> Result<T>) -> Result<T> {
        op(&self.state())
    }

    // ---- users ----

    /// inserts a new user
    ///
    /// # Errors
    /// [`MarketError::DuplicateUsername`] if the username is taken
    pub fn add_user(&self, user: User) -> Result<()> {
        validate_username(user.username())?;
        self.mutate(Dirty::USERS, |state| {
            if state.users.contains_key(user.username()) {
                return Err(MarketError::DuplicateUsername(user.username().to_owned()));
            }
            debug!("adding user {:?}", user.username());
            state.users.insert(user.username().to_owned(), user);
            Ok(())
        })
    }

    /// validates and hashes a new account's password, then adds the account
    pub fn sign_up(
        &self,
        username: &str,
        password: &str,
        profile: ProfileUpdate,
        account_type: AccountType,
    ) -> Result<()> {
        validate_username(username)?;
        password::validate_strength(password)?;
        let hash = self.shared.hasher.hash(password);
        let user = User::new(
            username,
            hash,
            profile.email,
            profile.phone,
            profile.address,
            account_type,
        );
        self.add_user(user)
    }

    /// a copy of the named user
    pub fn get_user(&self, username: &str) -> Result<User> {
        self.read(|state| state.user(username).map(User::clone))
    }

    /// true when `username` has an account
    pub fn user_exists(&self, username: &str) -> bool {
        self.state().users.contains_key(username)
    }

    /// checks a username and password. Unknown users and wrong passwords are
    /// indistinguishable, both in the result and in the work done.
    pub fn validate_login(&self, username: &str, password: &str) -> bool {
        let candidate = self.shared.hasher.hash(password);
        let stored = self
            .state()
            .users
            .get(username)
            .map(|u| u.password_hash().to_owned());
        match stored {
            Some(stored) => password::constant_time_eq(&stored, &candidate),
            None => {
                let _ = password::constant_time_eq(&candidate, &candidate);
                false
            }
        }
    }

    /// returns a copy of the user when the credentials are valid
    ///
    /// # Errors
    /// [`MarketError::Auth`] for an unknown user or a wrong password
    pub fn authenticate(&self, username: &str, password: &str) -> Result<User> {
        if !self.validate_login(username, password) {
            return Err(MarketError::Auth);
        }
        self.get_user(username).map_err(|_| MarketError::Auth)
    }

    /// replaces the contact details of `username`
    pub fn update_profile(&self, username: &str, profile: ProfileUpdate) -> Result<()> {
        self.mutate(Dirty::USERS, |state| {
            state.user_mut(username)?.update_profile(profile);
            Ok(())
        })
    }

    // ---- wallet ----

    /// the balance of `username`
    pub fn wallet(&self, username: &str) -> Result<f64> {
        self.read(|state| Ok(state.user(username)?.wallet()))
    }

    /// adds a positive `amount` to the wallet and returns the new balance
    pub fn deposit_funds(&self, username: &str, amount: f64) -> Result<f64> {
        self.mutate(Dirty::USERS, |state| state.user_mut(username)?.deposit(amount))
    }

    /// takes a positive `amount`, no larger than the balance, out of the wallet and returns
    /// the new balance
    pub fn withdraw_funds(&self, username: &str, amount: f64) -> Result<f64> {
        self.mutate(Dirty::USERS, |state| state.user_mut(username)?.withdraw(amount))
    }

    // ---- products ----

    /// returns the next product id and advances the allocator. Ids are never handed out twice,
    /// also not across restarts, since the high-water mark is persisted.
    pub fn next_product_id(&self) -> ProductId {
        let id = {
            let mut state = self.state();
            state.dirty.products = true;
            state.allocate_product_id()
        };
        self.persist();
        id
    }

    /// inserts a product built by the caller. It always starts out pending approval.
    ///
    /// # Errors
    /// [`MarketError::DuplicateProductId`] if the id is taken, [`MarketError::NotFound`] if the
    /// seller does not exist
    pub fn add_product(&self, product: Product) -> Result<()> {
        self.mutate(Dirty::PRODUCTS, |state| state.insert_product(product).map(|_| ()))
    }

    /// allocates an id for `draft` and inserts it pending approval, in one step
    pub fn register_product(&self, draft: ProductDraft) -> Result<Product> {
        draft.validate()?;
        self.mutate(Dirty::PRODUCTS, |state| {
            state.user(&draft.seller)?;
            let id = state.allocate_product_id();
            let product = state.insert_product(Product::new(id, draft, model::now()))?;
            info!("registered product {} for {:?}", product.id, product.seller);
            Ok(product)
        })
    }

    /// a copy of one product
    pub fn get_product(&self, product_id: ProductId) -> Result<Product> {
        self.read(|state| state.product(product_id).map(Product::clone))
    }

    /// `PendingApproval -> Approved`
    ///
    /// # Errors
    /// [`MarketError::InvalidState`] if the product is missing or not pending
    pub fn approve_product(&self, product_id: ProductId) -> Result<()> {
        self.mutate(Dirty::PRODUCTS, |state| {
            match state.products.get_mut(&product_id) {
                Some(p) if p.is_pending() => {
                    p.status = ProductStatus::Approved;
                    info!("approved product {}", product_id);
                    Ok(())
                }
                Some(p) => Err(MarketError::InvalidState(format!(
                    "Product {} is not pending approval ({})",
                    product_id, p.status
                ))),
                None => Err(MarketError::InvalidState(format!(
                    "Product {} does not exist",
                    product_id
                ))),
            }
        })
    }

    /// deletes a product that is still pending approval
    ///
    /// # Errors
    /// [`MarketError::InvalidState`] if the product is missing or not pending
    pub fn reject_product(&self, product_id: ProductId) -> Result<()> {
        self.mutate(Dirty::PRODUCTS, |state| {
            match state.products.get(&product_id) {
                Some(p) if p.is_pending() => {}
                Some(p) => {
                    return Err(MarketError::InvalidState(format!(
                        "Product {} is not pending approval ({})",
                        product_id, p.status
                    )))
                }
                None => {
                    return Err(MarketError::InvalidState(format!(
                        "Product {} does not exist",
                        product_id
                    )))
                }
            }
            state.delete_product(product_id)?;
            info!("rejected product {}", product_id);
            Ok(())
        })
    }

    /// deletes a product in any state, removing it from every cart
    ///
    /// # Errors
    /// [`MarketError::NotFound`] if the product does not exist
    pub fn remove_product(&self, product_id: ProductId) -> Result<Product> {
        self.mutate(Dirty::PRODUCTS, |state| {
            let product = state.delete_product(product_id)?;
            info!("removed product {}", product_id);
            Ok(product)
        })
    }

    /// replaces the attributes of a pending or approved product
    pub fn edit_product(&self, product_id: ProductId, edit: ProductEdit) -> Result<()> {
        self.mutate(Dirty::PRODUCTS, |state| state.product_mut(product_id)?.apply(edit))
    }

    fn select(&self, keep: impl Fn(&Product) -> bool) -> Vec<Product> {
        self.state()
            .products
            .values()
            .filter(|p| keep(*p))
            .cloned()
            .collect()
    }

    /// every product, ordered by id
    pub fn all_products(&self) -> Vec<Product> {
        self.select(|_| true)
    }

    /// products that can be bought, ordered by id
    pub fn approved_products(&self) -> Vec<Product> {
        self.select(Product::is_approved)
    }

    /// products awaiting approval, ordered by id
    pub fn pending_products(&self) -> Vec<Product> {
        self.select(Product::is_pending)
    }

    /// approved products whose category equals `category`, ignoring case
    pub fn products_by_category(&self, category: &str) -> Vec<Product> {
        let category = category.trim().to_lowercase();
        self.select(|p| p.is_approved() && p.category.to_lowercase() == category)
    }

    /// approved products whose name, description or category contain `term`, ignoring case
    pub fn search_products(&self, term: &str) -> Vec<Product> {
        let needle = term.trim().to_lowercase();
        self.select(|p| p.is_approved() && p.matches(&needle))
    }

    /// every product, in any state, listed by `username`
    pub fn products_by_seller(&self, username: &str) -> Result<Vec<Product>> {
        self.read(|state| {
            state.user(username)?;
            Ok(state
                .products
                .values()
                .filter(|p| p.seller == username)
                .cloned()
                .collect())
        })
    }

    /// number of products in any state
    pub fn product_count(&self) -> usize {
        self.state().products.len()
    }

    /// number of products awaiting approval
    pub fn pending_count(&self) -> usize {
        self.state().products.values().filter(|p| p.is_pending()).count()
    }

    // ---- carts ----

    /// adds `quantity` units of an approved product to a customer's cart. Stock is not
    /// reserved; it is checked at checkout.
    pub fn add_to_cart(&self, username: &str, product_id: ProductId, quantity: u32) -> Result<()> {
        if quantity == 0 {
            return Err(MarketError::InvalidArgument(
                "Quantity must be at least 1".into(),
            ));
        }
        self.mutate(Dirty::CARTS, |state| {
            let product = state.product(product_id)?;
            if !product.is_approved() {
                return Err(MarketError::InvalidState(format!(
                    "Product {} is not available for purchase ({})",
                    product_id, product.status
                )));
            }
            if product.seller == username {
                return Err(MarketError::InvalidState(
                    "You can not buy your own product".into(),
                ));
            }
            state
                .user_mut(username)?
                .require_customer()?
                .add_to_cart(product_id, quantity);
            Ok(())
        })
    }

    /// drops a line from the cart of `username`
    pub fn remove_from_cart(&self, username: &str, product_id: ProductId) -> Result<()> {
        self.mutate(Dirty::CARTS, |state| {
            if state
                .user_mut(username)?
                .require_customer()?
                .remove_from_cart(product_id)
            {
                Ok(())
            } else {
                Err(MarketError::NotFound(format!(
                    "Product {} in cart",
                    product_id
                )))
            }
        })
    }

    /// empties the cart of `username`
    pub fn clear_cart(&self, username: &str) -> Result<()> {
        self.mutate(Dirty::CARTS, |state| {
            state.user_mut(username)?.require_customer()?.clear_cart();
            Ok(())
        })
    }

    /// the customer's cart priced at current product prices
    pub fn cart(&self, username: &str) -> Result<CartView> {
        self.read(|state| state.cart_view(username))
    }

    /// Settles the customer's whole cart atomically: stock is taken, the seller is credited
    /// and the buyer debited for each line, a [`Transaction`] is recorded for the buyer (and
    /// for a customer seller), and the cart is cleared.
    ///
    /// # Errors
    /// - [`MarketError::InvalidState`] if the cart is empty or a product is no longer available
    /// - [`MarketError::InsufficientStock`] if a line asks for more than is in stock
    /// - [`MarketError::InsufficientFunds`] if the wallet does not cover the total
    ///
    /// No state changes when an error is returned.
    pub fn checkout(&self, username: &str) -> Result<Receipt> {
        let receipt = self.mutate(Dirty::ALL, |state| state.checkout(username))?;
        info!(
            "{:?} checked out {} lines for {}",
            username,
            receipt.transactions.len(),
            receipt.total
        );
        Ok(receipt)
    }

    /// the transactions of a customer, oldest first
    pub fn purchase_history(&self, username: &str) -> Result<Vec<Transaction>> {
        self.read(|state| {
            let user = state.user(username)?;
            user.customer()
                .map(|account| account.history().to_vec())
                .ok_or_else(|| MarketError::NotCustomer(username.to_owned()))
        })
    }
}

fn spawn_flusher(shared: Weak<Shared>, every: Duration) -> Result<()> {
    let ticker = channel::tick(every);
    thread::Builder::new()
        .name("market-flusher".into())
        .spawn(move || {
            debug!("flusher started, interval {:?}", every);
            while ticker.recv().is_ok() {
                match shared.upgrade() {
                    // failures are logged by flush and retried on the next tick
                    Some(shared) => {
                        let _ = shared.flush();
                    }
                    None => break,
                }
            }
            debug!("flusher stopped");
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::Snapshot;

    fn profile() -> ProfileUpdate {
        ProfileUpdate {
            email: "x@y.io".into(),
            phone: "0912".into(),
            address: "Addr".into(),
        }
    }

    fn draft(name: &str, price: f64, stock: u32, seller: &str) -> ProductDraft {
        ProductDraft {
            name: name.into(),
            description: format!("{} description", name),
            category: "Electronics".into(),
            price,
            stock,
            seller: seller.into(),
            image: None,
        }
    }

    #[test]
    fn empty_store_gets_a_default_admin() {
        let persistence = MemoryPersistence::new();
        let store = Store::open(persistence.clone(), FlushPolicy::Sync).unwrap();
        let admin = store.authenticate("admin", "Admin123").unwrap();
        assert_eq!(admin.account_type(), AccountType::Admin);
        assert_eq!(admin.wallet(), 10000.0);
        assert_eq!(persistence.saved().unwrap().users.len(), 1);
    }

    #[test]
    fn duplicate_usernames_are_rejected() {
        let store = Store::in_memory().unwrap();
        store
            .sign_up("alice", "Passw0rd", profile(), AccountType::Customer)
            .unwrap();
        assert!(matches!(
            store.sign_up("alice", "Passw0rd", profile(), AccountType::Customer),
            Err(MarketError::DuplicateUsername(_))
        ));
    }

    #[test]
    fn login_does_not_reveal_which_part_was_wrong() {
        let store = Store::in_memory().unwrap();
        store
            .sign_up("alice", "Passw0rd", profile(), AccountType::Customer)
            .unwrap();
        assert!(store.validate_login("alice", "Passw0rd"));
        let unknown = store.authenticate("nobody", "Passw0rd").unwrap_err();
        let wrong = store.authenticate("alice", "wrong").unwrap_err();
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[test]
    fn caller_supplied_ids_advance_the_allocator() {
        let store = Store::in_memory().unwrap();
        let product = Product::new(10, draft("Lamp", 5.0, 1, "admin"), model::now());
        store.add_product(product.clone()).unwrap();
        assert!(matches!(
            store.add_product(product),
            Err(MarketError::DuplicateProductId(10))
        ));
        assert_eq!(store.next_product_id(), 11);
        assert_eq!(store.next_product_id(), 12);
    }

    #[test]
    fn approve_and_reject_only_pending_products() {
        let store = Store::in_memory().unwrap();
        let a = store.register_product(draft("A", 1.0, 1, "admin")).unwrap();
        let b = store.register_product(draft("B", 1.0, 1, "admin")).unwrap();
        store.approve_product(a.id).unwrap();
        assert!(matches!(store.approve_product(a.id), Err(MarketError::InvalidState(_))));
        assert!(matches!(store.reject_product(a.id), Err(MarketError::InvalidState(_))));
        assert_eq!(store.get_product(a.id).unwrap().status, ProductStatus::Approved);

        store.reject_product(b.id).unwrap();
        assert!(matches!(store.get_product(b.id), Err(MarketError::NotFound(_))));
        assert!(matches!(store.reject_product(b.id), Err(MarketError::InvalidState(_))));
        assert!(matches!(store.remove_product(b.id), Err(MarketError::NotFound(_))));
    }

    #[test]
    fn customer_sellers_track_registered_products() {
        let store = Store::in_memory().unwrap();
        store
            .sign_up("sam", "Passw0rd", profile(), AccountType::Customer)
            .unwrap();
        let p = store.register_product(draft("Bike", 100.0, 1, "sam")).unwrap();
        let sam = store.get_user("sam").unwrap();
        assert!(sam.customer().unwrap().registered_products().contains(&p.id));
        assert!(matches!(
            store.register_product(draft("Ghost", 1.0, 1, "nobody")),
            Err(MarketError::NotFound(_))
        ));
    }

    #[test]
    fn removing_a_product_empties_it_from_carts() {
        let store = Store::in_memory().unwrap();
        store
            .sign_up("amy", "Passw0rd", profile(), AccountType::Customer)
            .unwrap();
        let p = store.register_product(draft("Pen", 2.0, 10, "admin")).unwrap();
        store.approve_product(p.id).unwrap();
        store.add_to_cart("amy", p.id, 3).unwrap();
        store.remove_product(p.id).unwrap();
        assert!(store.cart("amy").unwrap().lines.is_empty());
    }

    #[test]
    fn admins_have_no_cart() {
        let store = Store::in_memory().unwrap();
        let p = store.register_product(draft("Pen", 2.0, 10, "admin")).unwrap();
        store.approve_product(p.id).unwrap();
        store.add_user(User::new("boss", "h", "e", "p", "a", AccountType::Admin)).unwrap();
        assert!(matches!(
            store.add_to_cart("boss", p.id, 1),
            Err(MarketError::NotCustomer(_))
        ));
        assert!(matches!(store.checkout("boss"), Err(MarketError::NotCustomer(_))));
    }

    #[test]
    fn stale_cart_lines_are_pruned_on_open() {
        let mut amy = User::new("amy", "h", "e", "p", "a", AccountType::Customer);
        amy.set_wallet(50.0);
        amy.customer_mut().unwrap().add_to_cart(99, 1);
        let persistence = MemoryPersistence::with_snapshot(Snapshot {
            users: vec![User::new("admin", "h", "e", "p", "a", AccountType::Admin), amy],
            products: vec![],
            next_product_id: 1,
        });
        let store = Store::open(persistence, FlushPolicy::Sync).unwrap();
        assert!(store.cart("amy").unwrap().lines.is_empty());
        assert!(matches!(store.checkout("amy"), Err(MarketError::InvalidState(_))));
        assert_eq!(store.wallet("amy").unwrap(), 50.0);
    }

    #[test]
    fn failed_saves_are_retried_and_do_not_fail_the_operation() {
        let persistence = MemoryPersistence::new();
        let store = Store::open(persistence.clone(), FlushPolicy::Sync).unwrap();
        persistence.set_failing(true);
        assert_eq!(store.deposit_funds("admin", 5.0).unwrap(), 10005.0);
        assert_eq!(persistence.saved().unwrap().users[0].wallet(), 10000.0);

        persistence.set_failing(false);
        store.flush().unwrap();
        assert_eq!(persistence.saved().unwrap().users[0].wallet(), 10005.0);
    }

    #[test]
    fn interval_policy_flushes_in_the_background() {
        let persistence = MemoryPersistence::new();
        let store = Store::open(
            persistence.clone(),
            FlushPolicy::Interval(Duration::from_millis(10)),
        )
        .unwrap();
        store.deposit_funds("admin", 1.0).unwrap();
        let mut flushed = false;
        for _ in 0..200 {
            if persistence.saved().map(|s| s.users[0].wallet()) == Some(10001.0) {
                flushed = true;
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(flushed);
    }

    #[test]
    fn dropping_the_last_handle_flushes() {
        let persistence = MemoryPersistence::new();
        {
            let store = Store::open(
                persistence.clone(),
                FlushPolicy::Interval(Duration::from_secs(3600)),
            )
            .unwrap();
            store.deposit_funds("admin", 2.5).unwrap();
        }
        assert_eq!(persistence.saved().unwrap().users[0].wallet(), 10002.5);
    }
}
