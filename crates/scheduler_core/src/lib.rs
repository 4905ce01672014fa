//! Customer-records workflow: store contract, form validation, notifications,
//! the background store worker and the add/edit/delete controller.

use async_trait::async_trait;
use shared::{
    domain::{Country, Customer, CustomerId, Division, User},
    error::StoreError,
};

pub mod commands;
pub mod notify;
pub mod validation;
pub mod worker;
pub mod workflow;

#[cfg(test)]
mod test_support;

pub use commands::{StoreCommand, StoreCompletion, Ticket};
pub use notify::{Notification, NotificationKind, NotificationSink, TracingNotificationSink};
pub use validation::{is_complete, CustomerForm, FormError, FormField};
pub use worker::{execute_command, spawn_store_worker};
pub use workflow::{CustomerWorkflow, DependentView, Mode, WorkflowError};

/// Backing store consumed by the workflow.
///
/// Implementations run on the store worker, never on the UI-owning thread.
#[async_trait]
pub trait SchedulerStore: Send + Sync {
    async fn list_customers(&self) -> Result<Vec<Customer>, StoreError>;
    async fn list_countries(&self) -> Result<Vec<Country>, StoreError>;
    /// Divisions belonging to `country`, and only those.
    async fn list_divisions(&self, country: &Country) -> Result<Vec<Division>, StoreError>;
    /// Inserts `customer` ignoring its id and returns the generated one.
    async fn insert_customer(&self, customer: &Customer) -> Result<CustomerId, StoreError>;
    async fn update_customer(&self, customer: &Customer) -> Result<(), StoreError>;
    async fn delete_customer(&self, customer: &Customer) -> Result<(), StoreError>;
    async fn commit(&self) -> Result<(), StoreError>;
    /// Discards every change since the last commit.
    async fn rollback(&self) -> Result<(), StoreError>;
    async fn current_user(&self) -> Result<User, StoreError>;
}
