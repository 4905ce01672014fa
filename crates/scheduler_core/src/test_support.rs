use std::{collections::HashSet, sync::Mutex as StdMutex};

use async_trait::async_trait;
use shared::{
    domain::{Country, CountryId, Customer, CustomerId, Division, DivisionId, User, UserId},
    error::StoreError,
};
use tokio::sync::Mutex;

use crate::{
    notify::{Notification, NotificationKind, NotificationSink},
    workflow::DependentView,
    SchedulerStore,
};

pub fn us() -> Country {
    Country {
        country_id: CountryId(1),
        name: "U.S".into(),
    }
}

pub fn canada() -> Country {
    Country {
        country_id: CountryId(3),
        name: "Canada".into(),
    }
}

pub fn california() -> Division {
    Division {
        division_id: DivisionId(5),
        name: "California".into(),
        country: us(),
    }
}

pub fn texas() -> Division {
    Division {
        division_id: DivisionId(43),
        name: "Texas".into(),
        country: us(),
    }
}

pub fn ontario() -> Division {
    Division {
        division_id: DivisionId(67),
        name: "Ontario".into(),
        country: canada(),
    }
}

pub fn test_user() -> User {
    User {
        user_id: UserId(1),
        user_name: "test".into(),
    }
}

pub fn customer(id: i64, name: &str, division: Division) -> Customer {
    Customer {
        customer_id: CustomerId(id),
        customer_name: name.into(),
        address: format!("{id} Elm St"),
        postal_code: format!("{id:05}"),
        phone: format!("555-{id:04}"),
        division,
        created_by: Some(test_user()),
        last_updated_by: Some(test_user()),
        created_at: None,
        updated_at: None,
    }
}

#[derive(Default)]
struct FakeState {
    committed: Vec<Customer>,
    pending: Vec<Customer>,
    next_id: i64,
    failing: HashSet<&'static str>,
    calls: Vec<&'static str>,
    inserted: Vec<Customer>,
    updated: Vec<Customer>,
}

/// In-memory store with a committed snapshot and a pending working set.
pub struct FakeStore {
    state: Mutex<FakeState>,
    countries: Vec<Country>,
    divisions: Vec<Division>,
}

impl FakeStore {
    pub fn new(customers: Vec<Customer>) -> Self {
        let next_id = customers.iter().map(|c| c.customer_id.0).max().unwrap_or(0) + 1;
        Self {
            state: Mutex::new(FakeState {
                committed: customers.clone(),
                pending: customers,
                next_id,
                ..FakeState::default()
            }),
            countries: vec![us(), canada()],
            divisions: vec![california(), ontario(), texas()],
        }
    }

    pub async fn fail(&self, operation: &'static str) {
        self.state.lock().await.failing.insert(operation);
    }

    pub async fn calls(&self, operation: &'static str) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|call| **call == operation)
            .count()
    }

    pub async fn inserted(&self) -> Vec<Customer> {
        self.state.lock().await.inserted.clone()
    }

    pub async fn updated(&self) -> Vec<Customer> {
        self.state.lock().await.updated.clone()
    }

    pub async fn committed_ids(&self) -> Vec<i64> {
        self.state
            .lock()
            .await
            .committed
            .iter()
            .map(|c| c.customer_id.0)
            .collect()
    }

    async fn record(&self, operation: &'static str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.calls.push(operation);
        if state.failing.contains(operation) {
            return Err(StoreError::Connection("connection reset by peer".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SchedulerStore for FakeStore {
    async fn list_customers(&self) -> Result<Vec<Customer>, StoreError> {
        self.record("list_customers").await?;
        Ok(self.state.lock().await.pending.clone())
    }

    async fn list_countries(&self) -> Result<Vec<Country>, StoreError> {
        self.record("list_countries").await?;
        Ok(self.countries.clone())
    }

    async fn list_divisions(&self, country: &Country) -> Result<Vec<Division>, StoreError> {
        self.record("list_divisions").await?;
        Ok(self
            .divisions
            .iter()
            .filter(|d| d.country.country_id == country.country_id)
            .cloned()
            .collect())
    }

    async fn insert_customer(&self, customer: &Customer) -> Result<CustomerId, StoreError> {
        self.record("insert_customer").await?;
        let mut state = self.state.lock().await;
        state.inserted.push(customer.clone());
        let id = CustomerId(state.next_id);
        state.next_id += 1;
        state.pending.push(Customer {
            customer_id: id,
            ..customer.clone()
        });
        Ok(id)
    }

    async fn update_customer(&self, customer: &Customer) -> Result<(), StoreError> {
        self.record("update_customer").await?;
        let mut state = self.state.lock().await;
        state.updated.push(customer.clone());
        let Some(slot) = state
            .pending
            .iter_mut()
            .find(|c| c.customer_id == customer.customer_id)
        else {
            return Err(StoreError::NotFound {
                entity: "customer",
                id: customer.customer_id.0,
            });
        };
        *slot = customer.clone();
        Ok(())
    }

    async fn delete_customer(&self, customer: &Customer) -> Result<(), StoreError> {
        self.record("delete_customer").await?;
        let mut state = self.state.lock().await;
        let before = state.pending.len();
        state.pending.retain(|c| c != customer);
        if state.pending.len() == before {
            return Err(StoreError::NotFound {
                entity: "customer",
                id: customer.customer_id.0,
            });
        }
        Ok(())
    }

    async fn commit(&self) -> Result<(), StoreError> {
        self.record("commit").await?;
        let mut state = self.state.lock().await;
        state.committed = state.pending.clone();
        Ok(())
    }

    async fn rollback(&self) -> Result<(), StoreError> {
        self.record("rollback").await?;
        let mut state = self.state.lock().await;
        state.pending = state.committed.clone();
        Ok(())
    }

    async fn current_user(&self) -> Result<User, StoreError> {
        self.record("current_user").await?;
        Ok(test_user())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    notifications: StdMutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn all(&self) -> Vec<Notification> {
        self.notifications
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }

    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.all().into_iter().map(|n| n.kind).collect()
    }

    pub fn last(&self) -> Option<Notification> {
        self.all().pop()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: Notification) {
        if let Ok(mut notifications) = self.notifications.lock() {
            notifications.push(notification);
        }
    }
}

/// Stands in for an appointment customer picker.
#[derive(Default)]
pub struct RecordingView {
    refreshes: StdMutex<Vec<Vec<i64>>>,
}

impl RecordingView {
    pub fn refreshes(&self) -> Vec<Vec<i64>> {
        self.refreshes
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl DependentView for RecordingView {
    fn customers_changed(&self, customers: &[Customer]) {
        if let Ok(mut refreshes) = self.refreshes.lock() {
            refreshes.push(customers.iter().map(|c| c.customer_id.0).collect());
        }
    }
}
