use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_core::SchedulerStore;
use sha2::{Digest, Sha256};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite, Transaction,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use tokio::sync::{Mutex, RwLock};

use shared::{
    domain::{Country, CountryId, Customer, CustomerId, Division, DivisionId, User, UserId},
    error::StoreError,
};

/// Countries and first-level divisions loaded by `seed_reference_data`.
pub const REFERENCE_DIVISIONS: &[(&str, &[&str])] = &[
    (
        "U.S",
        &[
            "Alabama",
            "Arizona",
            "California",
            "Colorado",
            "Florida",
            "Georgia",
            "New York",
            "Texas",
            "Washington",
        ],
    ),
    (
        "UK",
        &["England", "Wales", "Scotland", "Northern Ireland"],
    ),
    (
        "Canada",
        &[
            "Alberta",
            "British Columbia",
            "Ontario",
            "Québec",
            "Nova Scotia",
        ],
    ),
];

const CUSTOMER_COLUMNS: &str = r#"
    SELECT c.customer_id, c.customer_name, c.address, c.postal_code, c.phone,
           d.division_id, d.division, co.country_id, co.country,
           cu.user_id, cu.user_name, uu.user_id, uu.user_name,
           c.created_at, c.updated_at
    FROM customers c
    JOIN first_level_divisions d ON d.division_id = c.division_id
    JOIN countries co ON co.country_id = d.country_id
    LEFT JOIN users cu ON cu.user_id = c.created_by
    LEFT JOIN users uu ON uu.user_id = c.last_updated_by
"#;

/// SQLite-backed store.
///
/// Every statement runs inside one pending transaction that is opened lazily
/// and stays open until `commit` or `rollback`. Dropping the last clone
/// without committing discards the pending changes.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
    pending: Arc<Mutex<Option<Transaction<'static, Sqlite>>>>,
    signed_in: Arc<RwLock<Option<User>>>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .map_err(store_error)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await
            .map_err(store_error)?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|err| StoreError::Migration(err.to_string()))?;
        Ok(Self {
            pool,
            pending: Arc::new(Mutex::new(None)),
            signed_in: Arc::new(RwLock::new(None)),
        })
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        let mut pending = self.pending.lock().await;
        let tx = self.transaction(&mut pending).await?;
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&mut **tx)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    /// True while uncommitted changes may exist.
    pub async fn has_pending_changes(&self) -> bool {
        self.pending.lock().await.is_some()
    }

    async fn transaction<'a>(
        &self,
        slot: &'a mut Option<Transaction<'static, Sqlite>>,
    ) -> Result<&'a mut Transaction<'static, Sqlite>, StoreError> {
        if slot.is_none() {
            let tx = self.pool.begin().await.map_err(store_error)?;
            *slot = Some(tx);
        }
        slot.as_mut()
            .ok_or_else(|| StoreError::Connection("transaction unavailable".into()))
    }

    /// Checks credentials and remembers the user for record stamping.
    /// Returns `None` when the name or password does not match.
    pub async fn sign_in(&self, user_name: &str, password: &str) -> Result<Option<User>, StoreError> {
        let row = {
            let mut pending = self.pending.lock().await;
            let tx = self.transaction(&mut pending).await?;
            sqlx::query("SELECT user_id, user_name, password_hash FROM users WHERE user_name = ?")
                .bind(user_name)
                .fetch_optional(&mut **tx)
                .await
                .map_err(store_error)?
        };
        let Some(row) = row else {
            return Ok(None);
        };
        let stored_hash: String = row.try_get(2).map_err(store_error)?;
        if stored_hash != hash_password(password) {
            return Ok(None);
        }
        let user = User {
            user_id: UserId(row.try_get(0).map_err(store_error)?),
            user_name: row.try_get(1).map_err(store_error)?,
        };
        *self.signed_in.write().await = Some(user.clone());
        Ok(Some(user))
    }

    pub async fn sign_out(&self) {
        *self.signed_in.write().await = None;
    }

    /// Creates the user or resets the password of an existing one.
    pub async fn create_user(&self, user_name: &str, password: &str) -> Result<User, StoreError> {
        let mut pending = self.pending.lock().await;
        let tx = self.transaction(&mut pending).await?;
        let row = sqlx::query(
            "INSERT INTO users (user_name, password_hash) VALUES (?, ?)
             ON CONFLICT(user_name) DO UPDATE SET password_hash=excluded.password_hash
             RETURNING user_id, user_name",
        )
        .bind(user_name)
        .bind(hash_password(password))
        .fetch_one(&mut **tx)
        .await
        .map_err(store_error)?;
        Ok(User {
            user_id: UserId(row.try_get(0).map_err(store_error)?),
            user_name: row.try_get(1).map_err(store_error)?,
        })
    }

    pub async fn create_country(&self, name: &str) -> Result<Country, StoreError> {
        let mut pending = self.pending.lock().await;
        let tx = self.transaction(&mut pending).await?;
        let row = sqlx::query(
            "INSERT INTO countries (country) VALUES (?)
             ON CONFLICT(country) DO UPDATE SET country=excluded.country
             RETURNING country_id, country",
        )
        .bind(name)
        .fetch_one(&mut **tx)
        .await
        .map_err(store_error)?;
        Ok(Country {
            country_id: CountryId(row.try_get(0).map_err(store_error)?),
            name: row.try_get(1).map_err(store_error)?,
        })
    }

    pub async fn create_division(&self, name: &str, country: &Country) -> Result<Division, StoreError> {
        let mut pending = self.pending.lock().await;
        let tx = self.transaction(&mut pending).await?;
        let row = sqlx::query(
            "INSERT INTO first_level_divisions (division, country_id) VALUES (?, ?)
             ON CONFLICT(country_id, division) DO UPDATE SET division=excluded.division
             RETURNING division_id, division",
        )
        .bind(name)
        .bind(country.country_id.0)
        .fetch_one(&mut **tx)
        .await
        .map_err(store_error)?;
        Ok(Division {
            division_id: DivisionId(row.try_get(0).map_err(store_error)?),
            name: row.try_get(1).map_err(store_error)?,
            country: country.clone(),
        })
    }

    /// Loads `REFERENCE_DIVISIONS` and returns how many divisions exist
    /// for those countries afterwards. Safe to run repeatedly; the caller
    /// still has to commit.
    pub async fn seed_reference_data(&self) -> Result<usize, StoreError> {
        let mut total = 0;
        for (country_name, divisions) in REFERENCE_DIVISIONS {
            let country = self.create_country(country_name).await?;
            for division in divisions.iter() {
                self.create_division(division, &country).await?;
            }
            total += divisions.len();
        }
        Ok(total)
    }

    pub async fn list_customers(&self) -> Result<Vec<Customer>, StoreError> {
        let mut pending = self.pending.lock().await;
        let tx = self.transaction(&mut pending).await?;
        let sql = format!("{CUSTOMER_COLUMNS} ORDER BY c.customer_id");
        let rows = sqlx::query(&sql)
            .fetch_all(&mut **tx)
            .await
            .map_err(store_error)?;
        rows.iter()
            .map(customer_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_error)
    }

    pub async fn find_customer(&self, customer_id: CustomerId) -> Result<Option<Customer>, StoreError> {
        let mut pending = self.pending.lock().await;
        let tx = self.transaction(&mut pending).await?;
        let sql = format!("{CUSTOMER_COLUMNS} WHERE c.customer_id = ?");
        let row = sqlx::query(&sql)
            .bind(customer_id.0)
            .fetch_optional(&mut **tx)
            .await
            .map_err(store_error)?;
        row.as_ref()
            .map(customer_from_row)
            .transpose()
            .map_err(store_error)
    }

    pub async fn list_countries(&self) -> Result<Vec<Country>, StoreError> {
        let mut pending = self.pending.lock().await;
        let tx = self.transaction(&mut pending).await?;
        let rows = sqlx::query("SELECT country_id, country FROM countries ORDER BY country_id")
            .fetch_all(&mut **tx)
            .await
            .map_err(store_error)?;
        rows.iter()
            .map(|row| {
                Ok(Country {
                    country_id: CountryId(row.try_get(0)?),
                    name: row.try_get(1)?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(store_error)
    }

    pub async fn list_divisions(&self, country: &Country) -> Result<Vec<Division>, StoreError> {
        let mut pending = self.pending.lock().await;
        let tx = self.transaction(&mut pending).await?;
        let rows = sqlx::query(
            "SELECT division_id, division FROM first_level_divisions
             WHERE country_id = ?
             ORDER BY division_id",
        )
        .bind(country.country_id.0)
        .fetch_all(&mut **tx)
        .await
        .map_err(store_error)?;
        rows.iter()
            .map(|row| {
                Ok(Division {
                    division_id: DivisionId(row.try_get(0)?),
                    name: row.try_get(1)?,
                    country: country.clone(),
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(store_error)
    }

    pub async fn insert_customer(&self, customer: &Customer) -> Result<CustomerId, StoreError> {
        let now = Utc::now();
        let mut pending = self.pending.lock().await;
        let tx = self.transaction(&mut pending).await?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO customers
                (customer_name, address, postal_code, phone, division_id,
                 created_by, last_updated_by, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING customer_id",
        )
        .bind(&customer.customer_name)
        .bind(&customer.address)
        .bind(&customer.postal_code)
        .bind(&customer.phone)
        .bind(customer.division.division_id.0)
        .bind(customer.created_by.as_ref().map(|user| user.user_id.0))
        .bind(customer.last_updated_by.as_ref().map(|user| user.user_id.0))
        .bind(customer.created_at.unwrap_or(now))
        .bind(now)
        .fetch_one(&mut **tx)
        .await
        .map_err(store_error)?;
        Ok(CustomerId(id))
    }

    pub async fn update_customer(&self, customer: &Customer) -> Result<(), StoreError> {
        let mut pending = self.pending.lock().await;
        let tx = self.transaction(&mut pending).await?;
        let result = sqlx::query(
            "UPDATE customers
             SET customer_name = ?, address = ?, postal_code = ?, phone = ?,
                 division_id = ?, last_updated_by = ?, updated_at = ?
             WHERE customer_id = ?",
        )
        .bind(&customer.customer_name)
        .bind(&customer.address)
        .bind(&customer.postal_code)
        .bind(&customer.phone)
        .bind(customer.division.division_id.0)
        .bind(customer.last_updated_by.as_ref().map(|user| user.user_id.0))
        .bind(Utc::now())
        .bind(customer.customer_id.0)
        .execute(&mut **tx)
        .await
        .map_err(store_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "customer",
                id: customer.customer_id.0,
            });
        }
        Ok(())
    }

    pub async fn delete_customer(&self, customer: &Customer) -> Result<(), StoreError> {
        let mut pending = self.pending.lock().await;
        let tx = self.transaction(&mut pending).await?;
        let result = sqlx::query("DELETE FROM customers WHERE customer_id = ?")
            .bind(customer.customer_id.0)
            .execute(&mut **tx)
            .await
            .map_err(store_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "customer",
                id: customer.customer_id.0,
            });
        }
        Ok(())
    }

    /// Persists every pending change. A no-op when nothing is pending.
    pub async fn commit(&self) -> Result<(), StoreError> {
        let mut pending = self.pending.lock().await;
        let Some(tx) = pending.take() else {
            return Ok(());
        };
        tx.commit().await.map_err(store_error)
    }

    pub async fn rollback(&self) -> Result<(), StoreError> {
        let mut pending = self.pending.lock().await;
        let Some(tx) = pending.take() else {
            return Ok(());
        };
        tx.rollback().await.map_err(store_error)
    }

    pub async fn current_user(&self) -> Result<User, StoreError> {
        self.signed_in
            .read()
            .await
            .clone()
            .ok_or(StoreError::NotAuthenticated)
    }
}

fn customer_from_row(row: &SqliteRow) -> Result<Customer, sqlx::Error> {
    let country = Country {
        country_id: CountryId(row.try_get(7)?),
        name: row.try_get(8)?,
    };
    let division = Division {
        division_id: DivisionId(row.try_get(5)?),
        name: row.try_get(6)?,
        country,
    };
    Ok(Customer {
        customer_id: CustomerId(row.try_get(0)?),
        customer_name: row.try_get(1)?,
        address: row.try_get(2)?,
        postal_code: row.try_get(3)?,
        phone: row.try_get(4)?,
        division,
        created_by: user_from_columns(row, 9, 10)?,
        last_updated_by: user_from_columns(row, 11, 12)?,
        created_at: row.try_get::<Option<DateTime<Utc>>, _>(13)?,
        updated_at: row.try_get::<Option<DateTime<Utc>>, _>(14)?,
    })
}

fn user_from_columns(row: &SqliteRow, id: usize, name: usize) -> Result<Option<User>, sqlx::Error> {
    let user_id: Option<i64> = row.try_get(id)?;
    let user_name: Option<String> = row.try_get(name)?;
    Ok(user_id.zip(user_name).map(|(user_id, user_name)| User {
        user_id: UserId(user_id),
        user_name,
    }))
}

pub fn hash_password(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

fn store_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Configuration(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Connection(err.to_string()),
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. } => StoreError::InvalidData(err.to_string()),
        sqlx::Error::Migrate(_) => StoreError::Migration(err.to_string()),
        _ => StoreError::Query(err.to_string()),
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<(), StoreError> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).map_err(|err| {
        StoreError::Connection(format!(
            "failed to create parent directory '{}' for database url '{database_url}': {err}",
            parent.display()
        ))
    })
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[async_trait]
impl SchedulerStore for Storage {
    async fn list_customers(&self) -> Result<Vec<Customer>, StoreError> {
        Storage::list_customers(self).await
    }

    async fn list_countries(&self) -> Result<Vec<Country>, StoreError> {
        Storage::list_countries(self).await
    }

    async fn list_divisions(&self, country: &Country) -> Result<Vec<Division>, StoreError> {
        Storage::list_divisions(self, country).await
    }

    async fn insert_customer(&self, customer: &Customer) -> Result<CustomerId, StoreError> {
        Storage::insert_customer(self, customer).await
    }

    async fn update_customer(&self, customer: &Customer) -> Result<(), StoreError> {
        Storage::update_customer(self, customer).await
    }

    async fn delete_customer(&self, customer: &Customer) -> Result<(), StoreError> {
        Storage::delete_customer(self, customer).await
    }

    async fn commit(&self) -> Result<(), StoreError> {
        Storage::commit(self).await
    }

    async fn rollback(&self) -> Result<(), StoreError> {
        Storage::rollback(self).await
    }

    async fn current_user(&self) -> Result<User, StoreError> {
        Storage::current_user(self).await
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
