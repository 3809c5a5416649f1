//! Durable store for buyers and offers on top of sled.
//!
//! Everything lives in the default tree under key prefixes:
//!
//! ```text
//! buyer/<buyer_id>              -> Buyer (cbor)
//! idx/identity/<identity_key>   -> buyer_id
//! idx/email/<lowercased email>  -> buyer_id
//! idx/phone/<phone>             -> buyer_id
//! offer/<offer_id>              -> Offer (cbor)
//! pair/<buyer_id>/<listing_id>  -> offer_id
//! ```
//!
//! The pair key is the uniqueness boundary for one offer per (buyer,
//! listing): creation claims it in the same transaction that writes the
//! record, so two concurrent first-time submissions cannot both create one
//! and a failed creation leaves nothing behind. Appends go through a
//! load/apply/compare-and-swap loop so history writes are atomic.

use std::sync::Arc;

use sled::transaction::{ConflictableTransactionResult, TransactionError};
use sled::{Batch, Db};
use tracing::debug;

use crate::buyer::Buyer;
use crate::error::{Error, Result};
use crate::offer::{Actor, Offer, OfferStatus, TransitionEntry};
use crate::utils::TimeStamp;

const BUYER_PREFIX: &str = "buyer/";
const IDX_IDENTITY_PREFIX: &str = "idx/identity/";
const IDX_EMAIL_PREFIX: &str = "idx/email/";
const IDX_PHONE_PREFIX: &str = "idx/phone/";
const OFFER_PREFIX: &str = "offer/";
const PAIR_PREFIX: &str = "pair/";

/// Outcome of an attempted offer creation. `Existing` means another writer
/// holds the (buyer, listing) pair; the caller re-enters the update fork.
#[derive(Debug)]
pub enum CreateOutcome {
    Created(Offer),
    Existing(Offer),
}

/// Outcome of an attempted buyer creation, raced on the email index.
#[derive(Debug)]
pub enum BuyerCreateOutcome {
    Created(Buyer),
    Existing(Buyer),
}

pub struct OfferStore {
    db: Arc<Db>,
}

fn buyer_key(buyer_id: &str) -> String {
    format!("{BUYER_PREFIX}{buyer_id}")
}

fn offer_key(offer_id: &str) -> String {
    format!("{OFFER_PREFIX}{offer_id}")
}

fn pair_key(buyer_id: &str, listing_id: &str) -> String {
    format!("{PAIR_PREFIX}{buyer_id}/{listing_id}")
}

fn txn_error(err: TransactionError<Error>) -> Error {
    match err {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => Error::Persistence(err),
    }
}

impl OfferStore {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    // BUYERS

    pub fn buyer(&self, buyer_id: &str) -> Result<Option<Buyer>> {
        self.decode_at(&buyer_key(buyer_id))
    }

    pub fn buyer_by_identity_key(&self, identity_key: &str) -> Result<Option<Buyer>> {
        self.buyer_via_index(&format!("{IDX_IDENTITY_PREFIX}{identity_key}"))
    }

    pub fn buyer_by_email(&self, email: &str) -> Result<Option<Buyer>> {
        self.buyer_via_index(&format!("{IDX_EMAIL_PREFIX}{}", email.to_lowercase()))
    }

    pub fn buyer_by_phone(&self, phone: &str) -> Result<Option<Buyer>> {
        self.buyer_via_index(&format!("{IDX_PHONE_PREFIX}{phone}"))
    }

    /// Create a buyer unless someone already holds their email.
    ///
    /// The record and every index entry are written in one transaction with
    /// the email claim, so two concurrent first-time submissions from the
    /// same person resolve to a single record and a failed or lost creation
    /// writes nothing at all. The loser gets the standing record back as
    /// [`BuyerCreateOutcome::Existing`].
    pub fn create_buyer(&self, buyer: Buyer) -> Result<BuyerCreateOutcome> {
        let record_key = buyer_key(&buyer.id);
        let email_key = format!("{IDX_EMAIL_PREFIX}{}", buyer.email.to_lowercase());
        let identity_idx = buyer
            .identity_key
            .as_ref()
            .map(|key| format!("{IDX_IDENTITY_PREFIX}{key}"));
        let phone_key = format!("{IDX_PHONE_PREFIX}{}", buyer.phone);
        let encoded = minicbor::to_vec(&buyer)?;

        let winner_id = self
            .db
            .transaction(|tx| -> ConflictableTransactionResult<Option<String>, Error> {
                if let Some(existing) = tx.get(email_key.as_bytes())? {
                    return Ok(Some(String::from_utf8_lossy(&existing).into_owned()));
                }
                tx.insert(record_key.as_bytes(), encoded.as_slice())?;
                tx.insert(email_key.as_bytes(), buyer.id.as_bytes())?;
                if let Some(key) = &identity_idx {
                    tx.insert(key.as_bytes(), buyer.id.as_bytes())?;
                }
                tx.insert(phone_key.as_bytes(), buyer.id.as_bytes())?;
                Ok(None)
            })
            .map_err(txn_error)?;

        match winner_id {
            None => Ok(BuyerCreateOutcome::Created(buyer)),
            Some(winner_id) => {
                debug!(email = %buyer.email, winner = %winner_id, "buyer creation lost email race");
                let winner = self
                    .buyer(&winner_id)?
                    .ok_or(Error::BuyerNotFound(winner_id))?;
                Ok(BuyerCreateOutcome::Existing(winner))
            }
        }
    }

    /// Rewrite an existing buyer record. Indexes are re-inserted so an
    /// identity key backfilled by the resolver becomes searchable.
    pub fn update_buyer(&self, buyer: &Buyer) -> Result<()> {
        let mut batch = Batch::default();
        batch.insert(buyer_key(&buyer.id).as_bytes(), minicbor::to_vec(buyer)?);
        if let Some(identity_key) = &buyer.identity_key {
            batch.insert(
                format!("{IDX_IDENTITY_PREFIX}{identity_key}").as_bytes(),
                buyer.id.as_bytes(),
            );
        }
        batch.insert(
            format!("{IDX_EMAIL_PREFIX}{}", buyer.email.to_lowercase()).as_bytes(),
            buyer.id.as_bytes(),
        );
        batch.insert(
            format!("{IDX_PHONE_PREFIX}{}", buyer.phone).as_bytes(),
            buyer.id.as_bytes(),
        );
        self.db.apply_batch(batch)?;
        Ok(())
    }

    // OFFERS

    pub fn offer(&self, offer_id: &str) -> Result<Option<Offer>> {
        self.decode_at(&offer_key(offer_id))
    }

    pub fn find_offer(&self, buyer_id: &str, listing_id: &str) -> Result<Option<Offer>> {
        let pair = self.db.get(pair_key(buyer_id, listing_id))?;
        match pair {
            Some(offer_id) => {
                let offer_id = String::from_utf8_lossy(&offer_id).into_owned();
                self.offer(&offer_id)
            }
            None => Ok(None),
        }
    }

    /// Create the offer unless the (buyer, listing) pair is already taken.
    ///
    /// The record write and the pair claim are one transaction, so exactly
    /// one concurrent creator wins and the loser's record never becomes
    /// visible, not even transiently to the prefix scans. The loser gets
    /// the winning offer back as [`CreateOutcome::Existing`].
    pub fn create_offer(&self, offer: Offer) -> Result<CreateOutcome> {
        let record_key = offer_key(&offer.id);
        let pair = pair_key(&offer.buyer_id, &offer.listing_id);
        let encoded = minicbor::to_vec(&offer)?;

        let winner_id = self
            .db
            .transaction(|tx| -> ConflictableTransactionResult<Option<String>, Error> {
                if let Some(existing) = tx.get(pair.as_bytes())? {
                    return Ok(Some(String::from_utf8_lossy(&existing).into_owned()));
                }
                tx.insert(record_key.as_bytes(), encoded.as_slice())?;
                tx.insert(pair.as_bytes(), offer.id.as_bytes())?;
                Ok(None)
            })
            .map_err(txn_error)?;

        match winner_id {
            None => Ok(CreateOutcome::Created(offer)),
            Some(winner_id) => {
                debug!(pair = %pair, winner = %winner_id, "offer creation lost pair race");
                let winner = self
                    .offer(&winner_id)?
                    .ok_or(Error::OfferNotFound(winner_id))?;
                Ok(CreateOutcome::Existing(winner))
            }
        }
    }

    /// Raise an existing offer's price from the buyer's side, atomically.
    ///
    /// The strictly-greater check runs inside the compare-and-swap loop so a
    /// concurrent raise can never land a lower or equal price on top of a
    /// higher one: whichever submission observes a standing price at or
    /// above its own is rejected with the standing price.
    pub fn raise_offer(
        &self,
        offer_id: &str,
        price: u64,
        buyer_message: Option<String>,
    ) -> Result<Offer> {
        let key = offer_key(offer_id);
        loop {
            let current = self
                .db
                .get(key.as_bytes())?
                .ok_or_else(|| Error::OfferNotFound(offer_id.to_string()))?;
            let mut offer: Offer = minicbor::decode(&current)?;

            if price <= offer.offered_price {
                return Err(Error::DuplicateOffer {
                    current_price: offer.offered_price,
                });
            }

            let entry = TransitionEntry {
                at: TimeStamp::new(),
                previous_status: Some(offer.status),
                new_status: OfferStatus::Pending,
                previous_price: Some(offer.offered_price),
                new_price: Some(price),
                countered_price: None,
                buyer_message: buyer_message.clone(),
                operator_message: None,
                actor: Actor::Buyer,
            };
            offer.apply(entry);
            let next = minicbor::to_vec(&offer)?;

            let swapped = self.db.compare_and_swap(
                key.as_bytes(),
                Some(current.as_ref()),
                Some(next.as_slice()),
            )?;
            if swapped.is_ok() {
                return Ok(offer);
            }
        }
    }

    /// Apply one transition to a stored offer atomically. The entry is
    /// rebuilt by `entry_for` from the freshly loaded offer on every
    /// attempt, so a retry after a concurrent write records the true
    /// previous status and price rather than a stale read.
    pub fn append_transition<F>(&self, offer_id: &str, entry_for: F) -> Result<Offer>
    where
        F: Fn(&Offer) -> TransitionEntry,
    {
        let key = offer_key(offer_id);
        loop {
            let current = self
                .db
                .get(key.as_bytes())?
                .ok_or_else(|| Error::OfferNotFound(offer_id.to_string()))?;
            let mut offer: Offer = minicbor::decode(&current)?;
            let entry = entry_for(&offer);
            offer.apply(entry);
            let next = minicbor::to_vec(&offer)?;

            let swapped = self.db.compare_and_swap(
                key.as_bytes(),
                Some(current.as_ref()),
                Some(next.as_slice()),
            )?;
            if swapped.is_ok() {
                return Ok(offer);
            }
            // another writer got in between; reload and retry
        }
    }

    // QUERIES

    pub fn offers_for_listing(&self, listing_id: &str) -> Result<Vec<Offer>> {
        let mut offers = Vec::new();
        for item in self.db.scan_prefix(OFFER_PREFIX.as_bytes()) {
            let (_, value) = item?;
            let offer: Offer = minicbor::decode(&value)?;
            if offer.listing_id == listing_id {
                offers.push(offer);
            }
        }
        offers.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(offers)
    }

    pub fn offers_for_buyer(&self, buyer_id: &str) -> Result<Vec<Offer>> {
        let prefix = format!("{PAIR_PREFIX}{buyer_id}/");
        let mut offers = Vec::new();
        for item in self.db.scan_prefix(prefix.as_bytes()) {
            let (_, value) = item?;
            let offer_id = String::from_utf8_lossy(&value).into_owned();
            if let Some(offer) = self.offer(&offer_id)? {
                offers.push(offer);
            }
        }
        offers.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(offers)
    }

    pub fn all_offers(&self) -> Result<Vec<Offer>> {
        let mut offers: Vec<Offer> = Vec::new();
        for item in self.db.scan_prefix(OFFER_PREFIX.as_bytes()) {
            let (_, value) = item?;
            offers.push(minicbor::decode(&value)?);
        }
        offers.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(offers)
    }

    fn buyer_via_index(&self, index_key: &str) -> Result<Option<Buyer>> {
        match self.db.get(index_key.as_bytes())? {
            Some(buyer_id) => {
                let buyer_id = String::from_utf8_lossy(&buyer_id).into_owned();
                self.buyer(&buyer_id)
            }
            None => Ok(None),
        }
    }

    fn decode_at<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        match self.db.get(key.as_bytes())? {
            Some(value) => Ok(Some(minicbor::decode(&value)?)),
            None => Ok(None),
        }
    }
}
