//! Buyer records and the contact profile carried by an incoming offer.

use chrono::Utc;

use crate::utils::{TimeStamp, new_uuid_to_bech32};

/// Where a buyer record created by this subsystem comes from.
pub const OFFER_SOURCE: &str = "Property Offer";

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuyerType {
    #[n(0)]
    CashBuyer,
    #[n(1)]
    Builder,
    #[n(2)]
    Developer,
    #[n(3)]
    Realtor,
    #[n(4)]
    Investor,
    #[n(5)]
    Wholesaler,
}

impl std::fmt::Display for BuyerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            BuyerType::CashBuyer => "CashBuyer",
            BuyerType::Builder => "Builder",
            BuyerType::Developer => "Developer",
            BuyerType::Realtor => "Realtor",
            BuyerType::Investor => "Investor",
            BuyerType::Wholesaler => "Wholesaler",
        };
        f.write_str(label)
    }
}

/// A natural person or entity capable of making offers. At most one record
/// exists per identity key or contact pair; the resolver owns that guarantee.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Buyer {
    #[n(0)]
    pub id: String, // uuid7, bech32 encoded with "buyer" hrp
    #[n(1)]
    pub identity_key: Option<String>, // external identity provider subject
    #[n(2)]
    pub email: String, // stored lowercased
    #[n(3)]
    pub phone: String,
    #[n(4)]
    pub first_name: String,
    #[n(5)]
    pub last_name: String,
    #[n(6)]
    pub buyer_type: Option<BuyerType>,
    #[n(7)]
    pub source: String,
    #[n(8)]
    pub preferred_areas: Vec<String>,
    #[n(9)]
    pub preferred_cities: Vec<String>,
    #[n(10)]
    pub preferred_counties: Vec<String>,
    #[n(11)]
    pub created_at: TimeStamp<Utc>,
}

impl Buyer {
    /// Create a fresh record from an offer profile. Preference sets are
    /// seeded from the profile values.
    pub fn from_profile(profile: &BuyerProfile) -> anyhow::Result<Self> {
        let incoming_area: Vec<String> = profile.preferred_area.clone().into_iter().collect();
        let areas = merge_unique(&[], &incoming_area);
        let cities = merge_unique(&[], &profile.preferred_cities);
        let counties = merge_unique(&[], &profile.preferred_counties);

        Ok(Self {
            id: new_uuid_to_bech32("buyer")?,
            identity_key: profile.identity_key.clone(),
            email: profile.email.to_lowercase(),
            phone: profile.phone.clone(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            buyer_type: profile.buyer_type,
            source: OFFER_SOURCE.to_string(),
            preferred_areas: areas,
            preferred_cities: cities,
            preferred_counties: counties,
            created_at: TimeStamp::new(),
        })
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Contact and preference attributes extracted from a submission. The
/// preferred area is a single value folded into the buyer's area set.
#[derive(Debug, Clone, Default)]
pub struct BuyerProfile {
    pub identity_key: Option<String>,
    pub email: String,
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
    pub buyer_type: Option<BuyerType>,
    pub preferred_area: Option<String>,
    pub preferred_cities: Vec<String>,
    pub preferred_counties: Vec<String>,
}

/// Union of an existing preference list and incoming values: trimmed,
/// empties dropped, first-seen order preserved, no duplicates.
pub fn merge_unique(existing: &[String], incoming: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(existing.len() + incoming.len());
    for value in existing.iter().chain(incoming.iter()) {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !merged.iter().any(|seen| seen == trimmed) {
            merged.push(trimmed.to_string());
        }
    }
    merged
}

/// True when folding `incoming` into `existing` would actually change it.
pub fn needs_merge(existing: &[String], incoming: &[String]) -> bool {
    merge_unique(existing, incoming).len() != merge_unique(existing, &[]).len()
}
