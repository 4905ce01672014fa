//! Store worker: runs every store call on a background thread and hands the
//! completions back to the UI-owning loop.

use std::{sync::Arc, thread};

use crossbeam_channel::{Receiver, Sender};
use shared::{domain::Customer, error::StoreError};
use tokio::runtime::Runtime;

use crate::{
    commands::{StoreCommand, StoreCompletion},
    SchedulerStore,
};

/// Runs one command against the store. Never panics on store failure; the
/// error travels inside the completion.
pub async fn execute_command(store: &dyn SchedulerStore, cmd: StoreCommand) -> StoreCompletion {
    let cmd_name = cmd.name();
    let completion = match cmd {
        StoreCommand::ListCustomers { ticket } => StoreCompletion::CustomersListed {
            ticket,
            result: store.list_customers().await,
        },
        StoreCommand::ListCountries { ticket } => StoreCompletion::CountriesListed {
            ticket,
            result: store.list_countries().await,
        },
        StoreCommand::ListDivisions { ticket, country } => {
            let result = store.list_divisions(&country).await;
            StoreCompletion::DivisionsListed {
                ticket,
                country,
                result,
            }
        }
        StoreCommand::InsertCustomer { ticket, customer } => StoreCompletion::CustomerInserted {
            ticket,
            result: insert_customer(store, customer).await,
        },
        StoreCommand::UpdateCustomer { ticket, customer } => StoreCompletion::CustomerUpdated {
            ticket,
            result: update_customer(store, customer).await,
        },
        StoreCommand::DeleteCustomer { ticket, customer } => StoreCompletion::CustomerDeleted {
            ticket,
            result: store.delete_customer(&customer).await,
        },
        StoreCommand::Commit { ticket } => StoreCompletion::Committed {
            ticket,
            result: store.commit().await,
        },
        StoreCommand::Rollback { ticket } => StoreCompletion::RolledBack {
            ticket,
            result: store.rollback().await,
        },
    };
    if completion.is_ok() {
        tracing::debug!(command = cmd_name, ticket = completion.ticket().0, "store command finished");
    } else {
        tracing::warn!(command = cmd_name, ticket = completion.ticket().0, "store command failed");
    }
    completion
}

async fn insert_customer(
    store: &dyn SchedulerStore,
    mut customer: Customer,
) -> Result<Customer, StoreError> {
    let user = store.current_user().await?;
    customer.created_by = Some(user.clone());
    customer.last_updated_by = Some(user);
    customer.customer_id = store.insert_customer(&customer).await?;
    Ok(customer)
}

async fn update_customer(
    store: &dyn SchedulerStore,
    mut customer: Customer,
) -> Result<Customer, StoreError> {
    let user = store.current_user().await?;
    if customer.created_by.is_none() {
        customer.created_by = Some(user.clone());
    }
    customer.last_updated_by = Some(user);
    store.update_customer(&customer).await?;
    Ok(customer)
}

/// Starts the store worker on its own thread.
///
/// Commands run one at a time in queue order. The thread exits once every
/// command sender is dropped or the completion receiver goes away.
pub fn spawn_store_worker(
    runtime: Runtime,
    store: Arc<dyn SchedulerStore>,
    cmd_rx: Receiver<StoreCommand>,
    ui_tx: Sender<StoreCompletion>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        tracing::info!("store worker ready");
        while let Ok(cmd) = cmd_rx.recv() {
            let completion = runtime.block_on(execute_command(store.as_ref(), cmd));
            if ui_tx.send(completion).is_err() {
                tracing::warn!("completion receiver dropped; stopping store worker");
                break;
            }
        }
        // Connection handles schedule their cleanup on the runtime when dropped.
        let _entered = runtime.enter();
        drop(store);
        tracing::info!("store worker stopped");
    })
}

#[cfg(test)]
#[path = "tests/worker_tests.rs"]
mod tests;
