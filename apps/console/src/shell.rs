//! Line-oriented front end. Owns the `CustomerWorkflow` and is the only
//! place completions from the store worker are applied.

use std::{
    fmt::Display,
    io::{BufRead, Write},
    sync::{Arc, Mutex},
};

use anyhow::Context;
use crossbeam_channel::{Receiver, Sender};
use scheduler_core::{
    CustomerWorkflow, DependentView, FormField, Mode, Notification, NotificationSink,
    StoreCommand, StoreCompletion,
};
use shared::domain::Customer;
use thiserror::Error;

const HELP: &str = "\
Commands:
  list                      show the customer table
  select <row>|none         select a table row
  add | edit | delete       open the form in that mode
  leave                     close the form
  form                      show the form
  set <field> <value>       field is id, name, phone, address or postal
  countries | divisions     show the picker choices
  country <n>|none          pick a country (reloads divisions)
  division <n>|none         pick a division
  confirm                   apply the staged add, edit or delete
  commit                    make pending changes permanent
  undo                      roll back everything since the last commit
  appoint                   schedule an appointment for the selected customer
  quit
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Form,
    Countries,
    Divisions,
    Select(Option<usize>),
    Enter(Mode),
    Leave,
    Set(FormField, String),
    Country(Option<usize>),
    Division(Option<usize>),
    Confirm,
    Commit,
    Undo,
    Appoint,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown command '{0}'; type 'help'")]
    Unknown(String),
    #[error("'{0}' needs {1}")]
    MissingArgument(&'static str, &'static str),
    #[error("'{0}' is not a row number")]
    BadIndex(String),
    #[error("unknown field '{0}'; use id, name, phone, address or postal")]
    UnknownField(String),
}

pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    match word.to_ascii_lowercase().as_str() {
        "list" | "ls" => Ok(Command::List),
        "form" | "show" => Ok(Command::Form),
        "countries" => Ok(Command::Countries),
        "divisions" | "states" => Ok(Command::Divisions),
        "select" => parse_index("select", rest).map(Command::Select),
        "add" => Ok(Command::Enter(Mode::Add)),
        "edit" => Ok(Command::Enter(Mode::Edit)),
        "delete" | "remove" => Ok(Command::Enter(Mode::Delete)),
        "leave" | "cancel" => Ok(Command::Leave),
        "set" => {
            let (field, value) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            if field.is_empty() {
                return Err(ParseError::MissingArgument("set", "a field and a value"));
            }
            Ok(Command::Set(parse_field(field)?, value.trim().to_string()))
        }
        "country" => parse_index("country", rest).map(Command::Country),
        "division" | "state" => parse_index("division", rest).map(Command::Division),
        "confirm" | "ok" => Ok(Command::Confirm),
        "commit" | "refresh" => Ok(Command::Commit),
        "undo" => Ok(Command::Undo),
        "appoint" | "schedule" => Ok(Command::Appoint),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => Err(ParseError::Unknown(other.to_string())),
    }
}

/// One-based position on screen, zero-based in the workflow.
fn parse_index(command: &'static str, arg: &str) -> Result<Option<usize>, ParseError> {
    if arg.is_empty() {
        return Err(ParseError::MissingArgument(command, "a number or 'none'"));
    }
    if arg.eq_ignore_ascii_case("none") || arg == "-" {
        return Ok(None);
    }
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => Ok(Some(n - 1)),
        _ => Err(ParseError::BadIndex(arg.to_string())),
    }
}

fn parse_field(name: &str) -> Result<FormField, ParseError> {
    match name.to_ascii_lowercase().as_str() {
        "id" => Ok(FormField::CustomerId),
        "name" => Ok(FormField::Name),
        "phone" => Ok(FormField::Phone),
        "address" => Ok(FormField::Address),
        "postal" | "postal-code" | "zip" => Ok(FormField::PostalCode),
        _ => Err(ParseError::UnknownField(name.to_string())),
    }
}

/// Buffers notifications until the shell prints them after a command.
#[derive(Default)]
pub struct NotificationFeed {
    pending: Mutex<Vec<Notification>>,
}

impl NotificationFeed {
    pub fn drain(&self) -> Vec<Notification> {
        self.pending
            .lock()
            .map(|mut pending| std::mem::take(&mut *pending))
            .unwrap_or_default()
    }
}

impl NotificationSink for NotificationFeed {
    fn notify(&self, notification: Notification) {
        tracing::debug!(
            kind = notification.kind.label(),
            undoable = notification.undoable,
            "{}",
            notification.message
        );
        if let Ok(mut pending) = self.pending.lock() {
            pending.push(notification);
        }
    }
}

/// Customer choices offered when scheduling an appointment.
#[derive(Default)]
pub struct AppointmentPicker {
    choices: Mutex<Vec<Customer>>,
}

impl AppointmentPicker {
    pub fn choice_count(&self) -> usize {
        self.choices.lock().map(|c| c.len()).unwrap_or_default()
    }
}

impl DependentView for AppointmentPicker {
    fn customers_changed(&self, customers: &[Customer]) {
        if let Ok(mut choices) = self.choices.lock() {
            *choices = customers.to_vec();
        }
    }
}

pub struct Shell {
    workflow: CustomerWorkflow,
    completions: Receiver<StoreCompletion>,
    feed: Arc<NotificationFeed>,
    picker: Arc<AppointmentPicker>,
}

impl Shell {
    pub fn new(cmd_tx: Sender<StoreCommand>, completions: Receiver<StoreCompletion>) -> Self {
        let feed = Arc::new(NotificationFeed::default());
        let picker = Arc::new(AppointmentPicker::default());
        let mut workflow = CustomerWorkflow::new(cmd_tx, feed.clone());
        workflow.add_dependent(picker.clone());
        Self {
            workflow,
            completions,
            feed,
            picker,
        }
    }

    pub fn workflow(&self) -> &CustomerWorkflow {
        &self.workflow
    }

    pub fn run<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> anyhow::Result<()> {
        self.workflow.populate()?;
        self.settle()?;
        self.flush_notifications(out)?;
        self.print_table(out)?;
        writeln!(out, "Type 'help' for commands.")?;

        for line in input.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match parse_command(&line) {
                Ok(Command::Quit) => break,
                Ok(command) => self.execute(command, out)?,
                Err(err) => writeln!(out, "{err}")?,
            }
            out.flush()?;
        }

        if self.workflow.undo_available() {
            writeln!(out, "Uncommitted changes were discarded.")?;
        }
        Ok(())
    }

    fn execute<W: Write>(&mut self, command: Command, out: &mut W) -> anyhow::Result<()> {
        let shows_table = matches!(
            command,
            Command::Confirm | Command::Commit | Command::Undo
        );
        let shows_form = matches!(
            command,
            Command::Enter(_)
                | Command::Select(_)
                | Command::Set(..)
                | Command::Country(_)
                | Command::Division(_)
        );

        let outcome = match command {
            Command::List => return self.print_table(out),
            Command::Form => return self.print_form(out),
            Command::Countries => return print_choices(out, self.workflow.countries()),
            Command::Divisions => return print_choices(out, self.workflow.divisions()),
            Command::Help => {
                out.write_all(HELP.as_bytes())?;
                return Ok(());
            }
            Command::Quit => return Ok(()),
            Command::Select(row) => self.workflow.select_row(row),
            Command::Enter(mode) => self.workflow.enter(mode),
            Command::Leave => {
                self.workflow.leave();
                Ok(())
            }
            Command::Set(field, value) => self.workflow.set_field(field, value),
            Command::Country(index) => self.workflow.select_country(index),
            Command::Division(index) => self.workflow.select_division(index),
            Command::Confirm => self.workflow.confirm(),
            Command::Commit => self.workflow.refresh(),
            Command::Undo => self.workflow.undo(),
            Command::Appoint => match self.workflow.take_selected_for_appointment() {
                Ok(customer) => {
                    tracing::info!(customer_id = customer.customer_id.0, "appointment requested");
                    writeln!(
                        out,
                        "Scheduling an appointment for {customer} ({} customers in the picker).",
                        self.picker.choice_count()
                    )?;
                    Ok(())
                }
                Err(err) => Err(err),
            },
        };
        if let Err(err) = outcome {
            writeln!(out, "{err}")?;
        }

        self.settle()?;
        self.flush_notifications(out)?;
        if shows_table {
            self.print_table(out)?;
        } else if shows_form && self.workflow.form_open() {
            self.print_form(out)?;
        }
        Ok(())
    }

    /// Blocks until every queued store command has been answered.
    fn settle(&mut self) -> anyhow::Result<()> {
        while self.workflow.is_loading() {
            let completion = self
                .completions
                .recv()
                .context("store worker stopped unexpectedly")?;
            self.workflow.apply(completion);
        }
        Ok(())
    }

    fn flush_notifications<W: Write>(&self, out: &mut W) -> anyhow::Result<()> {
        for notification in self.feed.drain() {
            let hint = if notification.undoable {
                " (undo available)"
            } else {
                ""
            };
            writeln!(
                out,
                "[{}] {}{hint}",
                notification.kind.label(),
                notification.message
            )?;
        }
        Ok(())
    }

    fn print_table<W: Write>(&self, out: &mut W) -> anyhow::Result<()> {
        let table = self.workflow.table();
        if table.is_empty() {
            writeln!(out, "No customers.")?;
            return Ok(());
        }
        writeln!(
            out,
            "{:>3} {:>5}  {:<20} {:<24} {:<8} {:<14} {:<18} Country",
            "#", "ID", "Name", "Address", "Postal", "Phone", "Division"
        )?;
        let selected = self.workflow.selected_customer().map(|c| c.customer_id);
        for (row, customer) in table.iter().enumerate() {
            let marker = if Some(customer.customer_id) == selected {
                '>'
            } else {
                ' '
            };
            writeln!(
                out,
                "{marker}{:>2} {:>5}  {:<20} {:<24} {:<8} {:<14} {:<18} {}",
                row + 1,
                customer.customer_id.0,
                customer.customer_name,
                customer.address,
                customer.postal_code,
                customer.phone,
                customer.division.name,
                customer.country().name
            )?;
        }
        Ok(())
    }

    fn print_form<W: Write>(&self, out: &mut W) -> anyhow::Result<()> {
        if !self.workflow.form_open() {
            writeln!(out, "Form closed. Use add, edit or delete.")?;
            return Ok(());
        }
        let form = self.workflow.form();
        let confirm = if self.workflow.confirm_enabled() {
            "ready"
        } else {
            "incomplete"
        };
        writeln!(out, "{:?} customer ({confirm})", self.workflow.mode())?;
        for (label, field) in [
            ("id", FormField::CustomerId),
            ("name", FormField::Name),
            ("phone", FormField::Phone),
            ("address", FormField::Address),
            ("postal", FormField::PostalCode),
        ] {
            writeln!(out, "  {label:<9} {}", form.field(field))?;
        }
        let country = form.country.as_ref().map(|c| c.name.as_str()).unwrap_or("-");
        let division = form.division.as_ref().map(|d| d.name.as_str()).unwrap_or("-");
        writeln!(out, "  {:<9} {country}", "country")?;
        writeln!(out, "  {:<9} {division}", "division")?;
        Ok(())
    }
}

fn print_choices<W: Write, T: Display>(out: &mut W, items: &[T]) -> anyhow::Result<()> {
    if items.is_empty() {
        writeln!(out, "Nothing to choose from yet.")?;
    }
    for (index, item) in items.iter().enumerate() {
        writeln!(out, "{:>3}  {item}", index + 1)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/shell_tests.rs"]
mod tests;
