//! Incoming offer submissions and their fail-fast validation.

use crate::buyer::{BuyerProfile, BuyerType};
use crate::error::{Error, Result};

/// A buyer's offer on a listing, built up field by field. `validate` runs
/// before any persistence work.
#[derive(Debug, Clone, Default)]
pub struct OfferSubmission {
    pub listing_id: String,
    pub price: u64,
    pub email: String,
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
    pub buyer_type: Option<BuyerType>,
    pub identity_key: Option<String>,
    pub buyer_message: Option<String>,
}

impl OfferSubmission {
    pub fn new(listing_id: &str, price: u64) -> Self {
        Self {
            listing_id: listing_id.to_string(),
            price,
            ..Default::default()
        }
    }

    pub fn email(mut self, email: &str) -> Self {
        self.email = email.to_string();
        self
    }
    pub fn phone(mut self, phone: &str) -> Self {
        self.phone = phone.to_string();
        self
    }
    pub fn first_name(mut self, first_name: &str) -> Self {
        self.first_name = first_name.to_string();
        self
    }
    pub fn last_name(mut self, last_name: &str) -> Self {
        self.last_name = last_name.to_string();
        self
    }
    pub fn buyer_type(mut self, buyer_type: BuyerType) -> Self {
        self.buyer_type = Some(buyer_type);
        self
    }
    pub fn identity_key(mut self, identity_key: &str) -> Self {
        self.identity_key = Some(identity_key.to_string());
        self
    }
    pub fn message(mut self, message: &str) -> Self {
        self.buyer_message = Some(message.to_string());
        self
    }

    /// Required: first name, last name, email, phone, listing id, and a
    /// non-zero price.
    pub fn validate(&self) -> Result<()> {
        if self.first_name.trim().is_empty() {
            return Err(Error::MissingField("first_name"));
        }
        if self.last_name.trim().is_empty() {
            return Err(Error::MissingField("last_name"));
        }
        if self.email.trim().is_empty() {
            return Err(Error::MissingField("email"));
        }
        if self.phone.trim().is_empty() {
            return Err(Error::MissingField("phone"));
        }
        if self.listing_id.trim().is_empty() {
            return Err(Error::MissingField("listing_id"));
        }
        if self.price == 0 {
            return Err(Error::InvalidPrice);
        }
        Ok(())
    }

    /// Resolver input for this submission. Preferred geography comes from
    /// the listing, not the request body.
    pub fn profile(
        &self,
        preferred_area: Option<String>,
        preferred_cities: Vec<String>,
        preferred_counties: Vec<String>,
    ) -> BuyerProfile {
        BuyerProfile {
            identity_key: self.identity_key.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            buyer_type: self.buyer_type,
            preferred_area,
            preferred_cities,
            preferred_counties,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> OfferSubmission {
        OfferSubmission::new("listing-1", 100_000)
            .email("jane@example.com")
            .phone("555-0101")
            .first_name("Jane")
            .last_name("Doe")
            .buyer_type(BuyerType::CashBuyer)
    }

    #[test]
    fn complete_submission_validates() {
        assert!(complete().validate().is_ok());
    }

    #[test]
    fn missing_contact_fields_fail_fast() {
        let mut submission = complete();
        submission.email = String::new();
        assert!(matches!(
            submission.validate(),
            Err(Error::MissingField("email"))
        ));

        let mut submission = complete();
        submission.phone = "   ".into();
        assert!(matches!(
            submission.validate(),
            Err(Error::MissingField("phone"))
        ));
    }

    #[test]
    fn zero_price_is_rejected() {
        let submission = OfferSubmission::new("listing-1", 0)
            .email("jane@example.com")
            .phone("555-0101")
            .first_name("Jane")
            .last_name("Doe");
        assert!(matches!(submission.validate(), Err(Error::InvalidPrice)));
    }
}
