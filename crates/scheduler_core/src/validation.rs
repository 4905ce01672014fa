//! Customer form state and the completeness check that gates the confirm action.

use shared::domain::{Country, Customer, CustomerId, Division, User};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    CustomerId,
    Name,
    Phone,
    Address,
    PostalCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("customer id '{0}' is not a whole number")]
    InvalidCustomerId(String),
    #[error("customer form is incomplete")]
    Incomplete,
}

/// Contents of the customer tool drawer.
///
/// An empty `customer_id` means the id is generated by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerForm {
    pub customer_id: String,
    pub name: String,
    pub phone: String,
    pub address: String,
    pub postal_code: String,
    pub country: Option<Country>,
    pub division: Option<Division>,
}

impl CustomerForm {
    pub fn from_customer(customer: &Customer) -> Self {
        Self {
            customer_id: customer.customer_id.to_string(),
            name: customer.customer_name.clone(),
            phone: customer.phone.clone(),
            address: customer.address.clone(),
            postal_code: customer.postal_code.clone(),
            country: Some(customer.country().clone()),
            division: Some(customer.division.clone()),
        }
    }

    pub fn field(&self, field: FormField) -> &str {
        match field {
            FormField::CustomerId => &self.customer_id,
            FormField::Name => &self.name,
            FormField::Phone => &self.phone,
            FormField::Address => &self.address,
            FormField::PostalCode => &self.postal_code,
        }
    }

    pub fn set_field(&mut self, field: FormField, value: impl Into<String>) {
        let slot = match field {
            FormField::CustomerId => &mut self.customer_id,
            FormField::Name => &mut self.name,
            FormField::Phone => &mut self.phone,
            FormField::Address => &mut self.address,
            FormField::PostalCode => &mut self.postal_code,
        };
        *slot = value.into();
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Parses the id field; blank means not yet assigned.
    pub fn parse_customer_id(&self) -> Result<CustomerId, FormError> {
        let raw = self.customer_id.trim();
        if raw.is_empty() {
            return Ok(CustomerId::UNASSIGNED);
        }
        raw.parse::<i64>()
            .ok()
            .filter(|id| *id >= 0)
            .map(CustomerId)
            .ok_or_else(|| FormError::InvalidCustomerId(raw.to_string()))
    }

    /// Builds the record to submit. `author` becomes both creator and last
    /// updater; the store worker restamps them with the signed-in user.
    pub fn to_customer(&self, author: Option<&User>) -> Result<Customer, FormError> {
        let customer_id = self.parse_customer_id()?;
        if !is_complete(self) {
            return Err(FormError::Incomplete);
        }
        let Some(division) = self.division.clone() else {
            return Err(FormError::Incomplete);
        };
        Ok(Customer {
            customer_id,
            customer_name: self.name.clone(),
            address: self.address.clone(),
            postal_code: self.postal_code.clone(),
            phone: self.phone.clone(),
            division,
            created_by: author.cloned(),
            last_updated_by: author.cloned(),
            created_at: None,
            updated_at: None,
        })
    }
}

/// True iff name, phone, address and postal code are non-empty and both
/// country and division are selected.
pub fn is_complete(form: &CustomerForm) -> bool {
    !form.name.is_empty()
        && !form.phone.is_empty()
        && !form.address.is_empty()
        && !form.postal_code.is_empty()
        && form.country.is_some()
        && form.division.is_some()
}
