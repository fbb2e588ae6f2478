//! This module provides the persistence collaborators of the [`Store`].
//!
//! The store hands a full [`Snapshot`] of its state to a [`Persistence`] implementation and
//! names the [`Part`]s that changed since the last save. [`CsvPersistence`] keeps each part in
//! its own CSV file; [`MemoryPersistence`] keeps the latest snapshot in memory and is mostly
//! useful for tests.
//!
//! [`Store`]: ../struct.Store.html
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{MarketError, Result};
use crate::model::{Product, ProductId, User};

mod csv_files;

pub use self::csv_files::CsvPersistence;

/// A copy of everything the store owns, taken under the store lock
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// every user, including carts, purchase histories and registered product ids
    pub users: Vec<User>,
    /// every product, in id order
    pub products: Vec<Product>,
    /// the id the next registered product will receive
    pub next_product_id: ProductId,
}

/// The independently saved pieces of a [`Snapshot`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Part {
    /// account details, wallets and registered product ids
    Users,
    /// products and the id high-water mark
    Products,
    /// purchase histories
    Transactions,
    /// cart contents
    Carts,
}

impl Part {
    /// every part, in the order they are written
    pub const ALL: [Part; 4] = [Part::Users, Part::Products, Part::Transactions, Part::Carts];
}

/// The set of [`Part`]s that changed since they were last saved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dirty {
    /// users.csv needs writing
    pub users: bool,
    /// products.csv needs writing
    pub products: bool,
    /// transactions.csv needs writing
    pub transactions: bool,
    /// carts.csv needs writing
    pub carts: bool,
}

impl Dirty {
    /// nothing to write
    pub const NONE: Dirty = Dirty {
        users: false,
        products: false,
        transactions: false,
        carts: false,
    };

    /// every part needs writing
    pub const ALL: Dirty = Dirty {
        users: true,
        products: true,
        transactions: true,
        carts: true,
    };

    /// only users.csv
    pub const USERS: Dirty = Dirty {
        users: true,
        ..Dirty::NONE
    };

    /// only products.csv
    pub const PRODUCTS: Dirty = Dirty {
        products: true,
        ..Dirty::NONE
    };

    /// only carts.csv
    pub const CARTS: Dirty = Dirty {
        carts: true,
        ..Dirty::NONE
    };

    /// true when nothing needs writing
    pub fn is_empty(&self) -> bool {
        *self == Dirty::NONE
    }

    /// marks `part` as needing a write
    pub fn insert(&mut self, part: Part) {
        match part {
            Part::Users => self.users = true,
            Part::Products => self.products = true,
            Part::Transactions => self.transactions = true,
            Part::Carts => self.carts = true,
        }
    }

    /// true when `part` needs writing
    pub fn contains(&self, part: Part) -> bool {
        match part {
            Part::Users => self.users,
            Part::Products => self.products,
            Part::Transactions => self.transactions,
            Part::Carts => self.carts,
        }
    }

    /// adds every part of `other` to this set
    pub fn merge(&mut self, other: Dirty) {
        self.users |= other.users;
        self.products |= other.products;
        self.transactions |= other.transactions;
        self.carts |= other.carts;
    }

    /// the parts in this set, in save order
    pub fn parts(&self) -> Vec<Part> {
        Part::ALL
            .iter()
            .copied()
            .filter(|part| self.contains(*part))
            .collect()
    }
}

/// Loads and saves the state of a [`Store`].
///
/// Implementations are only ever driven by one thread at a time; the store serializes all
/// calls behind its own writer lock.
///
/// [`Store`]: ../struct.Store.html
pub trait Persistence: Send + 'static {
    /// loads the persisted state. Returns `Ok(None)` when nothing has been saved yet.
    fn load(&mut self) -> Result<Option<Snapshot>>;

    /// saves one part of the given snapshot
    fn save_part(&mut self, part: Part, snapshot: &Snapshot) -> Result<()>;

    /// saves every part of the given snapshot
    fn save_all(&mut self, snapshot: &Snapshot) -> Result<()> {
        for part in Part::ALL.iter() {
            self.save_part(*part, snapshot)?;
        }
        Ok(())
    }
}

/// Keeps the most recently saved snapshot in memory.
///
/// Clones share the same storage, so a test can keep one handle, give another to a store, and
/// later "restart" by opening a new store over the first handle.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    saved: Arc<Mutex<Option<Snapshot>>>,
    saves: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl MemoryPersistence {
    /// an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// starts with `snapshot` already saved
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        let persistence = Self::default();
        *persistence.lock() = Some(snapshot);
        persistence
    }

    /// the last saved snapshot, if any
    pub fn saved(&self) -> Option<Snapshot> {
        self.lock().clone()
    }

    /// the number of successful part saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// makes every following save fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Snapshot>> {
        self.saved.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Persistence for MemoryPersistence {
    fn load(&mut self) -> Result<Option<Snapshot>> {
        Ok(self.saved())
    }

    fn save_part(&mut self, part: Part, snapshot: &Snapshot) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MarketError::Persistence(format!(
                "simulated failure saving {:?}",
                part
            )));
        }
        // the whole snapshot is kept, it always contains the latest version of every part
        *self.lock() = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirty_sets() {
        let mut dirty = Dirty::NONE;
        assert!(dirty.is_empty());
        dirty.insert(Part::Carts);
        dirty.merge(Dirty::USERS);
        assert_eq!(dirty.parts(), vec![Part::Users, Part::Carts]);
        assert_eq!(Dirty::ALL.parts(), Part::ALL.to_vec());
    }

    #[test]
    fn memory_persistence_shares_storage_between_clones() {
        let handle = MemoryPersistence::new();
        let mut other = handle.clone();
        let snapshot = Snapshot {
            next_product_id: 9,
            ..Snapshot::default()
        };
        other.save_part(Part::Products, &snapshot).unwrap();
        assert_eq!(handle.saved().map(|s| s.next_product_id), Some(9));
        assert_eq!(handle.save_count(), 1);

        handle.set_failing(true);
        assert!(other.save_all(&snapshot).is_err());
        assert_eq!(handle.save_count(), 1);
    }
}
