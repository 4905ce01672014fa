//! Customer add/edit/delete workflow.
//!
//! `CustomerWorkflow` lives on the UI-owning thread. User actions mutate its
//! view state and queue store commands; `apply` folds the worker's
//! completions back in and raises notifications. The view layer reads the
//! plain accessors and never touches the store itself.

use std::{collections::HashSet, sync::Arc};

use crossbeam_channel::Sender;
use shared::{
    domain::{Country, Customer, CustomerId, Division},
    error::StoreError,
};
use thiserror::Error;

use crate::{
    commands::{queue_command, QueueError, StoreCommand, StoreCompletion, Ticket},
    notify::{Notification, NotificationKind, NotificationSink},
    validation::{is_complete, CustomerForm, FormError, FormField},
};

/// Which action the tool drawer is staged for. Exactly one at a time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Idle,
    Add,
    Edit,
    Delete,
}

/// A component that caches the customer list (an appointment customer picker,
/// for instance) and must be refreshed when it changes.
pub trait DependentView: Send + Sync {
    fn customers_changed(&self, customers: &[Customer]);
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("select a customer first")]
    NoSelection,
    #[error("a previous change is still being saved")]
    Busy,
    #[error("the form is read-only in {0:?} mode")]
    ReadOnly(Mode),
    #[error("nothing to confirm")]
    ConfirmDisabled,
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("no customer at row {0}")]
    UnknownRow(usize),
    #[error("no country at index {0}")]
    UnknownCountry(usize),
    #[error("no division at index {0}")]
    UnknownDivision(usize),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Form(#[from] FormError),
}

#[derive(Debug)]
enum PendingAction {
    Add,
    Edit { original: CustomerId },
    Delete { customer: Customer },
    Commit,
    Rollback,
}

#[derive(Debug)]
struct InFlight {
    ticket: Ticket,
    action: PendingAction,
}

pub struct CustomerWorkflow {
    cmd_tx: Sender<StoreCommand>,
    notifier: Arc<dyn NotificationSink>,
    dependents: Vec<Arc<dyn DependentView>>,
    next_ticket: u64,
    mode: Mode,
    table: Vec<Customer>,
    selected: Option<Customer>,
    form: CustomerForm,
    form_open: bool,
    confirm_enabled: bool,
    countries: Vec<Country>,
    divisions: Vec<Division>,
    outstanding: HashSet<Ticket>,
    in_flight: Option<InFlight>,
    customers_ticket: Option<Ticket>,
    undo_available: bool,
}

impl CustomerWorkflow {
    pub fn new(cmd_tx: Sender<StoreCommand>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            cmd_tx,
            notifier,
            dependents: Vec::new(),
            next_ticket: 1,
            mode: Mode::Idle,
            table: Vec::new(),
            selected: None,
            form: CustomerForm::default(),
            form_open: false,
            confirm_enabled: false,
            countries: Vec::new(),
            divisions: Vec::new(),
            outstanding: HashSet::new(),
            in_flight: None,
            customers_ticket: None,
            undo_available: false,
        }
    }

    pub fn add_dependent(&mut self, view: Arc<dyn DependentView>) {
        self.dependents.push(view);
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn table(&self) -> &[Customer] {
        &self.table
    }

    pub fn selected_customer(&self) -> Option<&Customer> {
        self.selected.as_ref()
    }

    pub fn form(&self) -> &CustomerForm {
        &self.form
    }

    pub fn form_open(&self) -> bool {
        self.form_open
    }

    pub fn fields_editable(&self) -> bool {
        matches!(self.mode, Mode::Add | Mode::Edit)
    }

    pub fn confirm_enabled(&self) -> bool {
        self.confirm_enabled
    }

    pub fn countries(&self) -> &[Country] {
        &self.countries
    }

    pub fn divisions(&self) -> &[Division] {
        &self.divisions
    }

    /// True while any queued store command has not completed.
    pub fn is_loading(&self) -> bool {
        !self.outstanding.is_empty()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn undo_available(&self) -> bool {
        self.undo_available
    }

    /// Loads the customer table and the country picker.
    pub fn populate(&mut self) -> Result<(), WorkflowError> {
        self.populate_table()?;
        self.submit(|ticket| StoreCommand::ListCountries { ticket })?;
        Ok(())
    }

    pub fn populate_table(&mut self) -> Result<(), WorkflowError> {
        let ticket = self.submit(|ticket| StoreCommand::ListCustomers { ticket })?;
        self.customers_ticket = Some(ticket);
        Ok(())
    }

    /// Switches the tool drawer to `mode`, like pressing its toggle button.
    pub fn enter(&mut self, mode: Mode) -> Result<(), WorkflowError> {
        self.ensure_not_busy()?;
        match mode {
            Mode::Idle => {
                self.leave();
                Ok(())
            }
            Mode::Add => {
                self.selected = None;
                self.mode = Mode::Add;
                self.open_form(None)
            }
            Mode::Edit | Mode::Delete => {
                let customer = self.selected.clone().ok_or(WorkflowError::NoSelection)?;
                self.mode = mode;
                self.open_form(Some(&customer))
            }
        }
    }

    /// Toggles the active mode off and collapses the form.
    pub fn leave(&mut self) {
        self.mode = Mode::Idle;
        self.close_form();
    }

    /// Handles a table selection change.
    ///
    /// With the form open, Add mode is abandoned; Edit and Delete reload the
    /// form with the newly selected record.
    pub fn select_row(&mut self, row: Option<usize>) -> Result<(), WorkflowError> {
        let Some(row) = row else {
            self.selected = None;
            return Ok(());
        };
        let customer = self
            .table
            .get(row)
            .cloned()
            .ok_or(WorkflowError::UnknownRow(row))?;
        if self.form_open {
            self.ensure_not_busy()?;
        }
        self.selected = Some(customer.clone());
        if !self.form_open {
            return Ok(());
        }
        match self.mode {
            Mode::Add => {
                self.leave();
                Ok(())
            }
            Mode::Edit | Mode::Delete => self.open_form(Some(&customer)),
            Mode::Idle => Ok(()),
        }
    }

    pub fn set_field(
        &mut self,
        field: FormField,
        value: impl Into<String>,
    ) -> Result<(), WorkflowError> {
        self.ensure_editable()?;
        self.form.set_field(field, value);
        self.revalidate();
        Ok(())
    }

    /// Selecting a country resets the division and reloads its choices.
    pub fn select_country(&mut self, index: Option<usize>) -> Result<(), WorkflowError> {
        self.ensure_editable()?;
        let country = match index {
            Some(i) => Some(
                self.countries
                    .get(i)
                    .cloned()
                    .ok_or(WorkflowError::UnknownCountry(i))?,
            ),
            None => None,
        };
        self.form.country = country.clone();
        self.form.division = None;
        self.divisions.clear();
        self.revalidate();
        if let Some(country) = country {
            self.submit(|ticket| StoreCommand::ListDivisions { ticket, country })?;
        }
        Ok(())
    }

    pub fn select_division(&mut self, index: Option<usize>) -> Result<(), WorkflowError> {
        self.ensure_editable()?;
        self.form.division = match index {
            Some(i) => Some(
                self.divisions
                    .get(i)
                    .cloned()
                    .ok_or(WorkflowError::UnknownDivision(i))?,
            ),
            None => None,
        };
        self.revalidate();
        Ok(())
    }

    /// Applies the staged action to the store.
    pub fn confirm(&mut self) -> Result<(), WorkflowError> {
        self.ensure_not_busy()?;
        if !self.confirm_enabled {
            return Err(WorkflowError::ConfirmDisabled);
        }
        match self.mode {
            Mode::Idle => Err(WorkflowError::ConfirmDisabled),
            Mode::Add => {
                let mut customer = self.customer_from_form(None)?;
                customer.customer_id = CustomerId::UNASSIGNED;
                let ticket = self.submit(|ticket| StoreCommand::InsertCustomer { ticket, customer })?;
                self.in_flight = Some(InFlight {
                    ticket,
                    action: PendingAction::Add,
                });
                Ok(())
            }
            Mode::Edit => {
                let selected = self.selected.clone().ok_or(WorkflowError::NoSelection)?;
                let mut customer = self.customer_from_form(Some(&selected))?;
                customer.customer_id = selected.customer_id;
                customer.created_at = selected.created_at;
                let ticket = self.submit(|ticket| StoreCommand::UpdateCustomer { ticket, customer })?;
                self.in_flight = Some(InFlight {
                    ticket,
                    action: PendingAction::Edit {
                        original: selected.customer_id,
                    },
                });
                Ok(())
            }
            Mode::Delete => {
                let customer = self.selected.clone().ok_or(WorkflowError::NoSelection)?;
                let ticket = self.submit(|ticket| StoreCommand::DeleteCustomer {
                    ticket,
                    customer: customer.clone(),
                })?;
                self.in_flight = Some(InFlight {
                    ticket,
                    action: PendingAction::Delete { customer },
                });
                Ok(())
            }
        }
    }

    /// Commits pending changes after resetting the selection, form and mode.
    pub fn refresh(&mut self) -> Result<(), WorkflowError> {
        self.ensure_not_busy()?;
        self.selected = None;
        self.leave();
        self.undo_available = false;
        let ticket = self.submit(|ticket| StoreCommand::Commit { ticket })?;
        self.in_flight = Some(InFlight {
            ticket,
            action: PendingAction::Commit,
        });
        Ok(())
    }

    /// Rolls back every uncommitted change and reloads the table.
    pub fn undo(&mut self) -> Result<(), WorkflowError> {
        self.ensure_not_busy()?;
        if !self.undo_available {
            return Err(WorkflowError::NothingToUndo);
        }
        self.selected = None;
        self.leave();
        let ticket = self.submit(|ticket| StoreCommand::Rollback { ticket })?;
        self.in_flight = Some(InFlight {
            ticket,
            action: PendingAction::Rollback,
        });
        Ok(())
    }

    /// Hands the selected customer over to appointment scheduling and resets
    /// this workflow's drawer and selection.
    pub fn take_selected_for_appointment(&mut self) -> Result<Customer, WorkflowError> {
        let customer = self.selected.take().ok_or(WorkflowError::NoSelection)?;
        self.leave();
        Ok(customer)
    }

    /// Folds a store completion into the view state. Call on the UI-owning
    /// thread only.
    pub fn apply(&mut self, completion: StoreCompletion) {
        let ticket = completion.ticket();
        if !self.outstanding.remove(&ticket) {
            tracing::debug!(ticket = ticket.0, "ignoring completion for unknown ticket");
            return;
        }
        match completion {
            StoreCompletion::CustomersListed { result, .. } => {
                if self.customers_ticket != Some(ticket) {
                    tracing::debug!(ticket = ticket.0, "dropping superseded customer list");
                    return;
                }
                self.customers_ticket = None;
                match result {
                    Ok(customers) => self.replace_table(customers),
                    Err(err) => self.store_failed("populate customer table", &err),
                }
            }
            StoreCompletion::CountriesListed { result, .. } => match result {
                Ok(countries) => self.countries = countries,
                Err(err) => self.store_failed("populate country box", &err),
            },
            StoreCompletion::DivisionsListed {
                country, result, ..
            } => {
                let current = self.form.country.as_ref().map(|c| c.country_id);
                if current != Some(country.country_id) {
                    tracing::debug!(
                        country = country.country_id.0,
                        "dropping divisions for a country no longer selected"
                    );
                    return;
                }
                match result {
                    Ok(divisions) => self.divisions = divisions,
                    Err(err) => self.store_failed("populate state box", &err),
                }
            }
            StoreCompletion::CustomerInserted { result, .. } => {
                let Some(PendingAction::Add) = self.take_in_flight(ticket) else {
                    return;
                };
                match result {
                    Ok(customer) => {
                        self.table.push(customer.clone());
                        self.finish_action();
                        self.notify_change(
                            format!("Customer Added: {customer}"),
                            NotificationKind::Add,
                        );
                    }
                    Err(err) => self.store_failed_with(
                        "add customer",
                        "Failed to add customer. Check connection and input.",
                        &err,
                    ),
                }
            }
            StoreCompletion::CustomerUpdated { result, .. } => {
                let Some(PendingAction::Edit { original }) = self.take_in_flight(ticket) else {
                    return;
                };
                match result {
                    Ok(customer) => {
                        match self.table.iter().position(|c| c.customer_id == original) {
                            Some(index) => self.table[index] = customer.clone(),
                            None => {
                                tracing::warn!(
                                    customer_id = original.0,
                                    "updated customer is no longer in the table"
                                );
                                self.table.push(customer.clone());
                            }
                        }
                        self.finish_action();
                        self.notify_change(
                            format!("Customer Updated: {customer}"),
                            NotificationKind::Edit,
                        );
                    }
                    Err(err) => self.store_failed("update customer", &err),
                }
            }
            StoreCompletion::CustomerDeleted { result, .. } => {
                let Some(PendingAction::Delete { customer }) = self.take_in_flight(ticket) else {
                    return;
                };
                match result {
                    Ok(()) => {
                        self.table.retain(|c| c.customer_id != customer.customer_id);
                        self.finish_action();
                        self.notify_change(
                            format!("Customer Removed: {customer}"),
                            NotificationKind::Delete,
                        );
                    }
                    Err(err) => self.store_failed("delete customer", &err),
                }
            }
            StoreCompletion::Committed { result, .. } => {
                if self.take_in_flight(ticket).is_none() {
                    return;
                }
                match result {
                    Ok(()) => self.notifier.notify(Notification::new(
                        "Changes Committed",
                        NotificationKind::Success,
                        false,
                    )),
                    Err(err) => self.store_failed("commit changes", &err),
                }
            }
            StoreCompletion::RolledBack { result, .. } => {
                if self.take_in_flight(ticket).is_none() {
                    return;
                }
                match result {
                    Ok(()) => {
                        self.undo_available = false;
                        self.notifier.notify(Notification::new(
                            "Changes Rolled Back",
                            NotificationKind::Success,
                            false,
                        ));
                        if let Err(err) = self.populate_table() {
                            tracing::error!(error = %err, "could not reload customers after rollback");
                        }
                    }
                    Err(err) => self.store_failed("undo changes", &err),
                }
            }
        }
    }

    fn submit(
        &mut self,
        make: impl FnOnce(Ticket) -> StoreCommand,
    ) -> Result<Ticket, WorkflowError> {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        queue_command(&self.cmd_tx, make(ticket))?;
        self.outstanding.insert(ticket);
        Ok(ticket)
    }

    fn take_in_flight(&mut self, ticket: Ticket) -> Option<PendingAction> {
        match self.in_flight.take() {
            Some(in_flight) if in_flight.ticket == ticket => Some(in_flight.action),
            other => {
                tracing::warn!(ticket = ticket.0, "completion does not match the action in flight");
                self.in_flight = other;
                None
            }
        }
    }

    fn ensure_not_busy(&self) -> Result<(), WorkflowError> {
        if self.in_flight.is_some() {
            return Err(WorkflowError::Busy);
        }
        Ok(())
    }

    fn ensure_editable(&self) -> Result<(), WorkflowError> {
        if !self.form_open || !self.fields_editable() {
            return Err(WorkflowError::ReadOnly(self.mode));
        }
        Ok(())
    }

    fn open_form(&mut self, customer: Option<&Customer>) -> Result<(), WorkflowError> {
        self.form_open = true;
        self.divisions.clear();
        match customer {
            None => {
                self.form.clear();
                self.revalidate();
                Ok(())
            }
            Some(customer) => {
                // Direct assignment: loading a record is not a user edit, so
                // no country-change handling runs here.
                self.form = CustomerForm::from_customer(customer);
                self.confirm_enabled = self.mode == Mode::Delete;
                let country = customer.country().clone();
                self.submit(|ticket| StoreCommand::ListDivisions { ticket, country })?;
                Ok(())
            }
        }
    }

    fn close_form(&mut self) {
        self.form.clear();
        self.divisions.clear();
        self.form_open = false;
        self.confirm_enabled = false;
    }

    fn revalidate(&mut self) {
        self.confirm_enabled = match self.mode {
            Mode::Idle => false,
            Mode::Delete => true,
            Mode::Add | Mode::Edit => is_complete(&self.form),
        };
    }

    fn customer_from_form(&self, original: Option<&Customer>) -> Result<Customer, WorkflowError> {
        let author = original.and_then(|c| c.created_by.as_ref());
        self.form.to_customer(author).map_err(|err| {
            tracing::debug!(error = %err, "customer form rejected");
            self.notifier.notify(Notification::error(match &err {
                FormError::InvalidCustomerId(_) => "Customer ID must be a whole number.",
                FormError::Incomplete => "Fill in every customer field first.",
            }));
            WorkflowError::Form(err)
        })
    }

    fn replace_table(&mut self, customers: Vec<Customer>) {
        self.table = customers;
        if let Some(selected) = &self.selected {
            self.selected = self
                .table
                .iter()
                .find(|c| c.customer_id == selected.customer_id)
                .cloned();
        }
        self.refresh_dependents();
    }

    fn finish_action(&mut self) {
        self.selected = None;
        self.leave();
        self.refresh_dependents();
    }

    fn refresh_dependents(&self) {
        for view in &self.dependents {
            view.customers_changed(&self.table);
        }
    }

    fn notify_change(&mut self, message: String, kind: NotificationKind) {
        self.undo_available = true;
        self.notifier.notify(Notification::new(message, kind, true));
    }

    fn store_failed(&self, action: &str, err: &StoreError) {
        self.store_failed_with(
            action,
            &format!("Failed to {action}. Check connection."),
            err,
        );
    }

    fn store_failed_with(&self, action: &str, message: &str, err: &StoreError) {
        tracing::warn!(action, code = ?err.code(), error = %err, "store call failed");
        self.notifier.notify(Notification::error(message));
    }
}

#[cfg(test)]
#[path = "tests/workflow_tests.rs"]
mod tests;
