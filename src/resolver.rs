//! Buyer identity resolution.
//!
//! Repeated offers from the same person must land on one canonical buyer
//! record. Matching runs in priority order so the strongest identity signal
//! wins: an identity-provider key binds authoritatively, contact details
//! (case-insensitive email, then exact phone) come second, and only then is
//! a new record created.

use tracing::info;

use crate::buyer::{Buyer, BuyerProfile, merge_unique, needs_merge};
use crate::error::Result;
use crate::store::{BuyerCreateOutcome, OfferStore};

/// How the resolver arrived at the returned buyer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    MatchedByIdentity,
    MatchedByContact,
    Created,
}

#[derive(Debug)]
pub struct Resolution {
    pub buyer: Buyer,
    pub outcome: MatchOutcome,
}

/// Compute the updated record that should be persisted for an existing
/// buyer, or `None` when nothing would change (avoids a pointless write).
///
/// Preference fields are merged as sets; `backfill_identity` additionally
/// copies the profile's identity key onto a record that lacks one.
pub fn plan_update(
    existing: &Buyer,
    profile: &BuyerProfile,
    backfill_identity: bool,
) -> Option<Buyer> {
    let mut updated = existing.clone();
    let mut changed = false;

    let incoming_area: Vec<String> = profile.preferred_area.clone().into_iter().collect();
    if needs_merge(&existing.preferred_areas, &incoming_area) {
        updated.preferred_areas = merge_unique(&existing.preferred_areas, &incoming_area);
        changed = true;
    }
    if needs_merge(&existing.preferred_cities, &profile.preferred_cities) {
        updated.preferred_cities =
            merge_unique(&existing.preferred_cities, &profile.preferred_cities);
        changed = true;
    }
    if needs_merge(&existing.preferred_counties, &profile.preferred_counties) {
        updated.preferred_counties =
            merge_unique(&existing.preferred_counties, &profile.preferred_counties);
        changed = true;
    }

    if backfill_identity
        && existing.identity_key.is_none()
        && profile.identity_key.is_some()
    {
        updated.identity_key = profile.identity_key.clone();
        changed = true;
    }

    changed.then_some(updated)
}

pub struct BuyerResolver<'a> {
    store: &'a OfferStore,
}

impl<'a> BuyerResolver<'a> {
    pub fn new(store: &'a OfferStore) -> Self {
        Self { store }
    }

    /// Find or create the canonical buyer for this profile. At most one
    /// create-or-update write per call.
    pub fn resolve(&self, profile: &BuyerProfile) -> Result<Resolution> {
        // 1. identity key binding is authoritative; no contact re-match
        if let Some(identity_key) = &profile.identity_key {
            if let Some(existing) = self.store.buyer_by_identity_key(identity_key)? {
                info!(buyer = %existing.id, "resolved buyer by identity key");
                return self.merged(existing, profile, false, MatchOutcome::MatchedByIdentity);
            }
        }

        // 2. contact match: case-insensitive email, then exact phone
        let by_contact = match self.store.buyer_by_email(&profile.email)? {
            Some(buyer) => Some(buyer),
            None => self.store.buyer_by_phone(&profile.phone)?,
        };
        if let Some(existing) = by_contact {
            info!(buyer = %existing.id, "resolved buyer by contact details");
            return self.merged(existing, profile, true, MatchOutcome::MatchedByContact);
        }

        // 3. nobody matched; create a fresh record. Creation is raced on
        // the email index, so a concurrent submission from the same person
        // falls back to the contact-match path.
        let fresh = Buyer::from_profile(profile)
            .map_err(|err| crate::error::Error::Encode(err.to_string()))?;
        match self.store.create_buyer(fresh)? {
            BuyerCreateOutcome::Created(buyer) => {
                info!(buyer = %buyer.id, email = %buyer.email, "created buyer record");
                Ok(Resolution {
                    buyer,
                    outcome: MatchOutcome::Created,
                })
            }
            BuyerCreateOutcome::Existing(winner) => {
                info!(buyer = %winner.id, "buyer creation raced; merging into existing record");
                self.merged(winner, profile, true, MatchOutcome::MatchedByContact)
            }
        }
    }

    fn merged(
        &self,
        existing: Buyer,
        profile: &BuyerProfile,
        backfill_identity: bool,
        outcome: MatchOutcome,
    ) -> Result<Resolution> {
        match plan_update(&existing, profile, backfill_identity) {
            Some(updated) => {
                self.store.update_buyer(&updated)?;
                Ok(Resolution {
                    buyer: updated,
                    outcome,
                })
            }
            None => Ok(Resolution {
                buyer: existing,
                outcome,
            }),
        }
    }
}
