//! Commands queued from the UI-owning loop to the store worker, and the
//! completions that travel back.

use crossbeam_channel::{Sender, TrySendError};
use shared::{
    domain::{Country, Customer, Division},
    error::StoreError,
};
use thiserror::Error;

/// Correlates a completion with the command that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(pub u64);

#[derive(Debug, Clone)]
pub enum StoreCommand {
    ListCustomers { ticket: Ticket },
    ListCountries { ticket: Ticket },
    ListDivisions { ticket: Ticket, country: Country },
    InsertCustomer { ticket: Ticket, customer: Customer },
    UpdateCustomer { ticket: Ticket, customer: Customer },
    DeleteCustomer { ticket: Ticket, customer: Customer },
    Commit { ticket: Ticket },
    Rollback { ticket: Ticket },
}

impl StoreCommand {
    pub fn ticket(&self) -> Ticket {
        match self {
            Self::ListCustomers { ticket }
            | Self::ListCountries { ticket }
            | Self::ListDivisions { ticket, .. }
            | Self::InsertCustomer { ticket, .. }
            | Self::UpdateCustomer { ticket, .. }
            | Self::DeleteCustomer { ticket, .. }
            | Self::Commit { ticket }
            | Self::Rollback { ticket } => *ticket,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ListCustomers { .. } => "list_customers",
            Self::ListCountries { .. } => "list_countries",
            Self::ListDivisions { .. } => "list_divisions",
            Self::InsertCustomer { .. } => "insert_customer",
            Self::UpdateCustomer { .. } => "update_customer",
            Self::DeleteCustomer { .. } => "delete_customer",
            Self::Commit { .. } => "commit",
            Self::Rollback { .. } => "rollback",
        }
    }
}

#[derive(Debug, Clone)]
pub enum StoreCompletion {
    CustomersListed {
        ticket: Ticket,
        result: Result<Vec<Customer>, StoreError>,
    },
    CountriesListed {
        ticket: Ticket,
        result: Result<Vec<Country>, StoreError>,
    },
    DivisionsListed {
        ticket: Ticket,
        country: Country,
        result: Result<Vec<Division>, StoreError>,
    },
    /// Carries the inserted record with its generated id and audit stamps.
    CustomerInserted {
        ticket: Ticket,
        result: Result<Customer, StoreError>,
    },
    CustomerUpdated {
        ticket: Ticket,
        result: Result<Customer, StoreError>,
    },
    CustomerDeleted {
        ticket: Ticket,
        result: Result<(), StoreError>,
    },
    Committed {
        ticket: Ticket,
        result: Result<(), StoreError>,
    },
    RolledBack {
        ticket: Ticket,
        result: Result<(), StoreError>,
    },
}

impl StoreCompletion {
    pub fn ticket(&self) -> Ticket {
        match self {
            Self::CustomersListed { ticket, .. }
            | Self::CountriesListed { ticket, .. }
            | Self::DivisionsListed { ticket, .. }
            | Self::CustomerInserted { ticket, .. }
            | Self::CustomerUpdated { ticket, .. }
            | Self::CustomerDeleted { ticket, .. }
            | Self::Committed { ticket, .. }
            | Self::RolledBack { ticket, .. } => *ticket,
        }
    }

    pub fn is_ok(&self) -> bool {
        match self {
            Self::CustomersListed { result, .. } => result.is_ok(),
            Self::CountriesListed { result, .. } => result.is_ok(),
            Self::DivisionsListed { result, .. } => result.is_ok(),
            Self::CustomerInserted { result, .. } | Self::CustomerUpdated { result, .. } => {
                result.is_ok()
            }
            Self::CustomerDeleted { result, .. }
            | Self::Committed { result, .. }
            | Self::RolledBack { result, .. } => result.is_ok(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("store command queue is full; please retry")]
    Full,
    #[error("store worker disconnected (possible startup/runtime failure)")]
    Disconnected,
}

pub fn queue_command(cmd_tx: &Sender<StoreCommand>, cmd: StoreCommand) -> Result<(), QueueError> {
    let cmd_name = cmd.name();
    let ticket = cmd.ticket().0;
    tracing::debug!(command = cmd_name, ticket, "queueing ui->store command");
    match cmd_tx.try_send(cmd) {
        Ok(()) => {
            tracing::debug!(command = cmd_name, ticket, "queued ui->store command");
            Ok(())
        }
        Err(TrySendError::Full(_)) => {
            tracing::warn!(command = cmd_name, ticket, "ui->store command queue is full");
            Err(QueueError::Full)
        }
        Err(TrySendError::Disconnected(_)) => {
            tracing::error!(command = cmd_name, ticket, "ui->store command queue disconnected");
            Err(QueueError::Disconnected)
        }
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::bounded;

    use super::*;

    #[test]
    fn reports_full_and_disconnected_queues() {
        let (tx, rx) = bounded::<StoreCommand>(1);
        queue_command(&tx, StoreCommand::Commit { ticket: Ticket(1) }).expect("first fits");
        assert_eq!(
            queue_command(&tx, StoreCommand::Commit { ticket: Ticket(2) }),
            Err(QueueError::Full)
        );

        let queued = rx.try_recv().expect("queued command");
        assert_eq!(queued.ticket(), Ticket(1));
        assert_eq!(queued.name(), "commit");

        drop(rx);
        assert_eq!(
            queue_command(&tx, StoreCommand::Rollback { ticket: Ticket(3) }),
            Err(QueueError::Disconnected)
        );
    }
}
