//! Service layer API for the offer negotiation workflow.

use std::sync::Arc;

use tracing::info;

use crate::buyer::Buyer;
use crate::error::{Error, Result};
use crate::hooks::{EventKind, HookSet, OfferEvent};
use crate::listing::ListingDirectory;
use crate::offer::{Actor, Offer, OfferStatus, TransitionEntry};
use crate::resolver::BuyerResolver;
use crate::store::{CreateOutcome, OfferStore};
use crate::submit::OfferSubmission;
use crate::utils::TimeStamp;

/// Operator responses to a pending offer. Any current status may receive
/// any response; permissiveness here is a deliberate product decision, not
/// an oversight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferAction {
    Accept,
    Reject,
    Counter,
    Expire,
}

/// The operator performing a response, kept on the transition for audit.
#[derive(Debug, Clone)]
pub struct Operator {
    pub id: String,
    pub name: Option<String>,
}

/// Result of a successful buyer submission. `below_minimum` is advisory:
/// the offer stands either way.
#[derive(Debug)]
pub struct Submission {
    pub offer: Offer,
    pub buyer: Buyer,
    pub updated_existing: bool,
    pub below_minimum: bool,
}

/// How to look a buyer up when querying their offers.
#[derive(Debug, Clone)]
pub enum BuyerQuery {
    Id(String),
    IdentityKey(String),
    Email(String),
    Phone(String),
}

/// One flattened history entry with offer context, newest first; feeds the
/// operator dashboard's activity feed.
#[derive(Debug, Clone)]
pub struct ActivityRecord {
    pub offer_id: String,
    pub listing_id: String,
    pub buyer_id: String,
    pub entry: TransitionEntry,
}

pub struct OfferService {
    store: OfferStore,
    listings: Arc<dyn ListingDirectory>,
    hooks: HookSet,
}

impl OfferService {
    pub fn new(store: OfferStore, listings: Arc<dyn ListingDirectory>, hooks: HookSet) -> Self {
        Self {
            store,
            listings,
            hooks,
        }
    }

    /// Submit a buyer's offer on a listing.
    ///
    /// Resolves the buyer, then either opens a new offer in `Pending` or,
    /// when one already exists for the (buyer, listing) pair, updates it if
    /// and only if the new price is strictly higher. An equal or lower price
    /// is rejected with [`Error::DuplicateOffer`] and no state change. A
    /// higher bid reopens negotiation from any prior status.
    pub fn submit(&self, submission: &OfferSubmission) -> Result<Submission> {
        submission.validate()?;

        let listing = self
            .listings
            .fetch(&submission.listing_id)?
            .ok_or_else(|| Error::ListingNotFound(submission.listing_id.clone()))?;

        // buyer preferences are seeded from the listing's geography
        let profile = submission.profile(
            listing.area.clone(),
            listing.city.clone().into_iter().collect(),
            listing.county.clone().into_iter().collect(),
        );
        let resolution = BuyerResolver::new(&self.store).resolve(&profile)?;
        let buyer = resolution.buyer;

        info!(
            listing = %listing.id,
            buyer = %buyer.id,
            price = submission.price,
            "processing offer submission"
        );

        let (offer, updated_existing) = match self.store.find_offer(&buyer.id, &listing.id)? {
            Some(existing) => (self.raise_offer(&existing, submission)?, true),
            None => {
                let fresh = Offer::open(
                    listing.id.clone(),
                    buyer.id.clone(),
                    submission.price,
                    submission.buyer_message.clone(),
                    Actor::Buyer,
                )
                .map_err(|err| Error::Encode(err.to_string()))?;

                match self.store.create_offer(fresh)? {
                    CreateOutcome::Created(offer) => (offer, false),
                    // lost the creation race; fall back to the update fork
                    CreateOutcome::Existing(existing) => {
                        (self.raise_offer(&existing, submission)?, true)
                    }
                }
            }
        };

        let below_minimum = offer.offered_price < listing.min_price;

        let kind = if below_minimum {
            EventKind::BelowMinimum
        } else if updated_existing {
            EventKind::Updated
        } else {
            EventKind::Submitted
        };
        self.hooks.dispatch(&OfferEvent {
            kind,
            listing,
            buyer: buyer.clone(),
            offer: offer.clone(),
            price: offer.offered_price,
            message: submission.buyer_message.clone(),
        });

        Ok(Submission {
            offer,
            buyer,
            updated_existing,
            below_minimum,
        })
    }

    /// Record an operator's response to an offer.
    ///
    /// `Counter` requires a countered price; the other actions ignore it.
    /// The transition consumes the stored buyer message and optionally
    /// records an operator message in its place.
    pub fn respond(
        &self,
        offer_id: &str,
        action: OfferAction,
        countered_price: Option<u64>,
        message: Option<String>,
        operator: &Operator,
    ) -> Result<Offer> {
        let new_status = match action {
            OfferAction::Accept => OfferStatus::Accepted,
            OfferAction::Reject => OfferStatus::Rejected,
            OfferAction::Counter => OfferStatus::Countered,
            OfferAction::Expire => OfferStatus::Expired,
        };
        let countered_price = match action {
            OfferAction::Counter => {
                Some(countered_price.ok_or(Error::MissingCounterPrice)?)
            }
            _ => None,
        };

        let existing = self
            .store
            .offer(offer_id)?
            .ok_or_else(|| Error::OfferNotFound(offer_id.to_string()))?;
        let listing = self
            .listings
            .fetch(&existing.listing_id)?
            .ok_or_else(|| Error::ListingNotFound(existing.listing_id.clone()))?;
        let buyer = self
            .store
            .buyer(&existing.buyer_id)?
            .ok_or_else(|| Error::BuyerNotFound(existing.buyer_id.clone()))?;

        // the previous status/price come from the offer as loaded inside the
        // append loop, not from the lookup above, so a concurrent write
        // cannot leave a stale audit entry
        let offer = self.store.append_transition(offer_id, |current| TransitionEntry {
            at: TimeStamp::new(),
            previous_status: Some(current.status),
            new_status,
            previous_price: Some(current.offered_price),
            new_price: None,
            countered_price,
            buyer_message: None,
            operator_message: message.clone(),
            actor: Actor::Operator {
                id: operator.id.clone(),
                name: operator.name.clone(),
            },
        })?;

        info!(
            offer = %offer.id,
            operator = %operator.id,
            status = %offer.status,
            "recorded operator response"
        );

        let kind = match action {
            OfferAction::Accept => EventKind::Accepted,
            OfferAction::Reject => EventKind::Rejected,
            OfferAction::Counter => EventKind::Countered,
            OfferAction::Expire => EventKind::Expired,
        };
        self.hooks.dispatch(&OfferEvent {
            kind,
            listing,
            buyer,
            offer: offer.clone(),
            price: offer.offered_price,
            message,
        });

        Ok(offer)
    }

    // QUERIES

    pub fn offer(&self, offer_id: &str) -> Result<Offer> {
        self.store
            .offer(offer_id)?
            .ok_or_else(|| Error::OfferNotFound(offer_id.to_string()))
    }

    pub fn history(&self, offer_id: &str) -> Result<Vec<TransitionEntry>> {
        Ok(self.offer(offer_id)?.history().to_vec())
    }

    pub fn offers_for_listing(&self, listing_id: &str) -> Result<Vec<Offer>> {
        self.store.offers_for_listing(listing_id)
    }

    pub fn offers_for_buyer(&self, query: &BuyerQuery) -> Result<Vec<Offer>> {
        let buyer = match query {
            BuyerQuery::Id(id) => self.store.buyer(id)?,
            BuyerQuery::IdentityKey(key) => self.store.buyer_by_identity_key(key)?,
            BuyerQuery::Email(email) => self.store.buyer_by_email(email)?,
            BuyerQuery::Phone(phone) => self.store.buyer_by_phone(phone)?,
        };
        let buyer = buyer.ok_or_else(|| Error::BuyerNotFound(format!("{query:?}")))?;
        self.store.offers_for_buyer(&buyer.id)
    }

    /// Flatten history entries across all offers into a recent-activity
    /// feed, newest first.
    pub fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityRecord>> {
        let mut records = Vec::new();
        for offer in self.store.all_offers()? {
            for entry in offer.history() {
                records.push(ActivityRecord {
                    offer_id: offer.id.clone(),
                    listing_id: offer.listing_id.clone(),
                    buyer_id: offer.buyer_id.clone(),
                    entry: entry.clone(),
                });
            }
        }
        records.sort_by(|a, b| b.entry.at.cmp(&a.entry.at));
        records.truncate(limit);
        Ok(records)
    }

    /// Update-or-reject fork: a strictly higher price reopens negotiation as
    /// `Pending`; anything else is a duplicate, reported with the standing
    /// price. The comparison itself is atomic inside the store.
    fn raise_offer(&self, existing: &Offer, submission: &OfferSubmission) -> Result<Offer> {
        self.store
            .raise_offer(&existing.id, submission.price, submission.buyer_message.clone())
    }
}
