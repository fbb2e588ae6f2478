use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::{Part, Persistence, Snapshot};
use crate::error::{MarketError, Result};
use crate::model::{self, AccountType, Product, ProductId, Transaction, User};

const USERS_FILE: &str = "users.csv";
const PRODUCTS_FILE: &str = "products.csv";
const TRANSACTIONS_FILE: &str = "transactions.csv";
const CARTS_FILE: &str = "carts.csv";
const COUNTERS_FILE: &str = "counters.csv";

const USERS_HEADER: [&str; 8] = [
    "username",
    "password_hash",
    "email",
    "phone",
    "address",
    "wallet_balance",
    "user_type",
    "registered_products",
];
const PRODUCTS_HEADER: [&str; 11] = [
    "product_id",
    "name",
    "description",
    "category",
    "price",
    "stock",
    "seller",
    "status",
    "next_id",
    "image_base64",
    "registered_at",
];
const TRANSACTIONS_HEADER: [&str; 8] = [
    "username",
    "product_id",
    "product_name",
    "seller",
    "buyer",
    "quantity",
    "total_price",
    "date",
];
const CARTS_HEADER: [&str; 3] = ["username", "product_id", "quantity"];
const COUNTERS_HEADER: [&str; 1] = ["next_product_id"];

/// Stores each [`Part`] of a [`Snapshot`] in its own CSV file inside a data directory:
/// `users.csv`, `products.csv`, `transactions.csv`, `carts.csv`, plus `counters.csv`
/// holding the product id high-water mark.
///
/// Fields containing commas, quotes or newlines are quoted RFC 4180 style. Every file is
/// written to a temporary file first and then renamed over the old one, so a crash mid-write
/// leaves the previous version intact.
#[derive(Debug, Clone)]
pub struct CsvPersistence {
    dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct UserRecord {
    username: String,
    password_hash: String,
    email: String,
    phone: String,
    address: String,
    wallet_balance: f64,
    user_type: String,
    #[serde(default)]
    registered_products: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProductRecord {
    product_id: ProductId,
    name: String,
    description: String,
    category: String,
    price: f64,
    stock: u32,
    seller: String,
    status: String,
    #[serde(default)]
    next_id: ProductId,
    #[serde(default)]
    image_base64: String,
    #[serde(default)]
    registered_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct TransactionRecord {
    username: String,
    product_id: ProductId,
    product_name: String,
    seller: String,
    buyer: String,
    quantity: u32,
    total_price: f64,
    date: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct CartRecord {
    username: String,
    product_id: ProductId,
    quantity: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct CounterRecord {
    next_product_id: ProductId,
}

impl CsvPersistence {
    /// uses `dir` as the data directory, creating it if it does not exist
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        info!("using data directory {:?}", dir);
        Ok(CsvPersistence { dir })
    }

    /// the directory holding the CSV files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// reads every record of `file`. A missing file yields no records.
    fn read<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>> {
        let path = self.path(file);
        if !path.exists() {
            debug!("{:?} does not exist yet", path);
            return Ok(vec![]);
        }
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(&path)?;
        let mut records = vec![];
        for record in reader.deserialize() {
            records.push(record?);
        }
        debug!("read {} records from {:?}", records.len(), path);
        Ok(records)
    }

    /// writes `header` and `records` to a temporary file and renames it over `file`
    fn write<T: Serialize>(&self, file: &str, header: &[&str], records: &[T]) -> Result<()> {
        let path = self.path(file);
        let tmp = self.path(&format!("{}.tmp", file));
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(File::create(&tmp)?);
            writer.write_record(header)?;
            for record in records {
                writer.serialize(record)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &path)?;
        debug!("wrote {} records to {:?}", records.len(), path);
        Ok(())
    }

    fn save_users(&self, snapshot: &Snapshot) -> Result<()> {
        let records: Vec<UserRecord> = snapshot
            .users
            .iter()
            .map(|user| UserRecord {
                username: user.username().to_owned(),
                password_hash: user.password_hash().to_owned(),
                email: user.email().to_owned(),
                phone: user.phone().to_owned(),
                address: user.address().to_owned(),
                wallet_balance: user.wallet(),
                user_type: user.account_type().as_str().to_owned(),
                registered_products: user
                    .customer()
                    .map(|account| {
                        account
                            .registered_products()
                            .iter()
                            .map(ProductId::to_string)
                            .collect::<Vec<_>>()
                            .join(";")
                    })
                    .unwrap_or_default(),
            })
            .collect();
        self.write(USERS_FILE, &USERS_HEADER, &records)
    }

    fn save_products(&self, snapshot: &Snapshot) -> Result<()> {
        let records: Vec<ProductRecord> = snapshot
            .products
            .iter()
            .map(|p| ProductRecord {
                product_id: p.id,
                name: p.name.clone(),
                description: p.description.clone(),
                category: p.category.clone(),
                price: p.price,
                stock: p.stock,
                seller: p.seller.clone(),
                status: p.status.as_str().to_owned(),
                next_id: snapshot.next_product_id,
                image_base64: p
                    .image
                    .as_ref()
                    .map(|bytes| STANDARD.encode(bytes))
                    .unwrap_or_default(),
                registered_at: model::format_date(&p.registered_at),
            })
            .collect();
        self.write(PRODUCTS_FILE, &PRODUCTS_HEADER, &records)?;
        self.write(
            COUNTERS_FILE,
            &COUNTERS_HEADER,
            &[CounterRecord {
                next_product_id: snapshot.next_product_id,
            }],
        )
    }

    fn save_transactions(&self, snapshot: &Snapshot) -> Result<()> {
        let mut records = vec![];
        for user in &snapshot.users {
            if let Some(account) = user.customer() {
                for t in account.history() {
                    records.push(TransactionRecord {
                        username: user.username().to_owned(),
                        product_id: t.product_id,
                        product_name: t.product_name.clone(),
                        seller: t.seller.clone(),
                        buyer: t.buyer.clone(),
                        quantity: t.quantity,
                        total_price: t.total_price,
                        date: model::format_date(&t.date),
                    });
                }
            }
        }
        self.write(TRANSACTIONS_FILE, &TRANSACTIONS_HEADER, &records)
    }

    fn save_carts(&self, snapshot: &Snapshot) -> Result<()> {
        let mut records = vec![];
        for user in &snapshot.users {
            if let Some(account) = user.customer() {
                for (product_id, quantity) in account.cart() {
                    records.push(CartRecord {
                        username: user.username().to_owned(),
                        product_id: *product_id,
                        quantity: *quantity,
                    });
                }
            }
        }
        self.write(CARTS_FILE, &CARTS_HEADER, &records)
    }
}

fn user_from_record(record: UserRecord) -> User {
    let account_type = AccountType::parse_lenient(&record.user_type);
    let mut user = User::new(
        record.username,
        record.password_hash,
        record.email,
        record.phone,
        record.address,
        account_type,
    );
    user.set_wallet(record.wallet_balance);
    if let Some(account) = user.customer_mut() {
        for id in record
            .registered_products
            .split(';')
            .filter_map(|s| s.trim().parse::<ProductId>().ok())
            .filter(|id| *id > 0)
        {
            account.register_product(id);
        }
    }
    user
}

fn product_from_record(record: ProductRecord) -> Result<Product> {
    let image = if record.image_base64.is_empty() {
        None
    } else {
        Some(STANDARD.decode(record.image_base64.as_bytes()).map_err(|e| {
            MarketError::Persistence(format!(
                "invalid image data for product {}: {}",
                record.product_id, e
            ))
        })?)
    };
    let registered_at = if record.registered_at.is_empty() {
        model::now()
    } else {
        model::parse_date(&record.registered_at)?
    };
    Ok(Product {
        id: record.product_id,
        name: record.name,
        description: record.description,
        category: record.category,
        price: record.price,
        stock: record.stock,
        seller: record.seller,
        status: record.status.parse()?,
        registered_at,
        image,
    })
}

impl Persistence for CsvPersistence {
    #[instrument(skip(self), fields(dir = ?self.dir))]
    fn load(&mut self) -> Result<Option<Snapshot>> {
        if !self.path(USERS_FILE).exists() && !self.path(PRODUCTS_FILE).exists() {
            info!("no persisted data found");
            return Ok(None);
        }

        let mut users: BTreeMap<String, User> = BTreeMap::new();
        for record in self.read::<UserRecord>(USERS_FILE)? {
            let user = user_from_record(record);
            users.insert(user.username().to_owned(), user);
        }

        let mut next_product_id: ProductId = 1;
        let mut products = vec![];
        for record in self.read::<ProductRecord>(PRODUCTS_FILE)? {
            next_product_id = next_product_id.max(record.next_id).max(record.product_id + 1);
            products.push(product_from_record(record)?);
        }
        for counter in self.read::<CounterRecord>(COUNTERS_FILE)? {
            next_product_id = next_product_id.max(counter.next_product_id);
        }
        products.sort_by_key(|p| p.id);

        for record in self.read::<TransactionRecord>(TRANSACTIONS_FILE)? {
            match users.get_mut(&record.username).and_then(User::customer_mut) {
                Some(account) => account.record(Transaction {
                    product_id: record.product_id,
                    product_name: record.product_name,
                    seller: record.seller,
                    buyer: record.buyer,
                    quantity: record.quantity,
                    total_price: record.total_price,
                    date: model::parse_date(&record.date)?,
                }),
                None => warn!(
                    "skipping transaction of {:?}: not a known customer",
                    record.username
                ),
            }
        }

        for record in self.read::<CartRecord>(CARTS_FILE)? {
            match users.get_mut(&record.username).and_then(User::customer_mut) {
                Some(account) => account.add_to_cart(record.product_id, record.quantity),
                None => warn!(
                    "skipping cart entry of {:?}: not a known customer",
                    record.username
                ),
            }
        }

        info!(
            "loaded {} users and {} products, next product id {}",
            users.len(),
            products.len(),
            next_product_id
        );
        Ok(Some(Snapshot {
            users: users.into_iter().map(|(_, user)| user).collect(),
            products,
            next_product_id,
        }))
    }

    fn save_part(&mut self, part: Part, snapshot: &Snapshot) -> Result<()> {
        match part {
            Part::Users => self.save_users(snapshot),
            Part::Products => self.save_products(snapshot),
            Part::Transactions => self.save_transactions(snapshot),
            Part::Carts => self.save_carts(snapshot),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProductDraft, ProductStatus};
    use tempfile::TempDir;

    fn sample() -> Snapshot {
        let mut admin = User::new("admin", "hash-a", "a@x.io", "0912", "HQ", AccountType::Admin);
        admin.set_wallet(10000.0);

        let mut bob = User::new(
            "bob",
            "hash-b",
            "bob@x.io",
            "0913",
            "Main Street, 4 \"B\"",
            AccountType::Customer,
        );
        bob.set_wallet(40.5);
        let account = bob.customer_mut().unwrap();
        account.add_to_cart(2, 3);
        account.register_product(1);
        account.register_product(2);
        account.record(Transaction {
            product_id: 1,
            product_name: "Lamp, desk".into(),
            seller: "admin".into(),
            buyer: "bob".into(),
            quantity: 2,
            total_price: 59.5,
            date: model::now(),
        });

        let mut lamp = Product::new(
            1,
            ProductDraft {
                name: "Lamp, desk".into(),
                description: "multi\nline".into(),
                category: "Home".into(),
                price: 29.75,
                stock: 0,
                seller: "bob".into(),
                image: Some(vec![0, 159, 146, 150]),
            },
            model::now(),
        );
        lamp.status = ProductStatus::Sold;
        let chair = Product::new(
            2,
            ProductDraft {
                name: "Chair".into(),
                description: String::new(),
                category: "Home".into(),
                price: 12.0,
                stock: 5,
                seller: "bob".into(),
                image: None,
            },
            model::now(),
        );

        Snapshot {
            users: vec![admin, bob],
            products: vec![lamp, chair],
            next_product_id: 3,
        }
    }

    #[test]
    fn empty_directory_loads_nothing() {
        let dir = TempDir::new().unwrap();
        let mut persistence = CsvPersistence::open(dir.path()).unwrap();
        assert!(persistence.load().unwrap().is_none());
    }

    #[test]
    fn save_all_then_load_reproduces_the_snapshot() {
        let dir = TempDir::new().unwrap();
        let mut persistence = CsvPersistence::open(dir.path()).unwrap();
        let snapshot = sample();
        persistence.save_all(&snapshot).unwrap();

        let loaded = CsvPersistence::open(dir.path())
            .unwrap()
            .load()
            .unwrap()
            .unwrap();
        assert_eq!(loaded, snapshot);
        assert!(!dir.path().join("users.csv.tmp").exists());
    }

    #[test]
    fn high_water_mark_survives_without_products() {
        let dir = TempDir::new().unwrap();
        let mut persistence = CsvPersistence::open(dir.path()).unwrap();
        let snapshot = Snapshot {
            users: vec![User::new("admin", "h", "e", "p", "a", AccountType::Admin)],
            products: vec![],
            next_product_id: 42,
        };
        persistence.save_all(&snapshot).unwrap();
        let loaded = persistence.load().unwrap().unwrap();
        assert_eq!(loaded.next_product_id, 42);
    }

    #[test]
    fn reads_files_without_optional_columns() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(USERS_FILE),
            "username,password_hash,email,phone,address,wallet_balance,user_type\n\
             carol,h,c@x.io,0914,Somewhere,12.5,customer\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(PRODUCTS_FILE),
            "product_id,name,description,category,price,stock,seller,status,next_id\n\
             4,Kettle,Boils,Kitchen,20,2,carol,approved,7\n",
        )
        .unwrap();

        let loaded = CsvPersistence::open(dir.path())
            .unwrap()
            .load()
            .unwrap()
            .unwrap();
        assert_eq!(loaded.users.len(), 1);
        assert_eq!(loaded.users[0].wallet(), 12.5);
        assert_eq!(loaded.products[0].status, ProductStatus::Approved);
        assert!(loaded.products[0].image.is_none());
        assert_eq!(loaded.next_product_id, 7);
    }
}
