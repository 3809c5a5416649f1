//! Offer aggregate and its append-only transition history.
//!
//! Exactly one offer exists per (buyer, listing) pair. Every state change is
//! captured as a [`TransitionEntry`]; entries are never edited or removed
//! once appended, and the offer's current fields are always derived from the
//! most recent entry.

use chrono::Utc;

use crate::utils::{TimeStamp, new_uuid_to_bech32};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Accepted,
    #[n(2)]
    Rejected,
    #[n(3)]
    Countered,
    #[n(4)]
    Expired,
}

impl std::fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            OfferStatus::Pending => "PENDING",
            OfferStatus::Accepted => "ACCEPTED",
            OfferStatus::Rejected => "REJECTED",
            OfferStatus::Countered => "COUNTERED",
            OfferStatus::Expired => "EXPIRED",
        };
        f.write_str(label)
    }
}

/// Who triggered a transition: the buyer themselves, or a named operator
/// acting on the sale side.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    #[n(0)]
    Buyer,
    #[n(1)]
    Operator {
        #[n(0)]
        id: String,
        #[n(1)]
        name: Option<String>,
    },
}

/// One immutable audit record of a state change.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct TransitionEntry {
    #[n(0)]
    pub at: TimeStamp<Utc>,
    #[n(1)]
    pub previous_status: Option<OfferStatus>,
    #[n(2)]
    pub new_status: OfferStatus,
    #[n(3)]
    pub previous_price: Option<u64>,
    #[n(4)]
    pub new_price: Option<u64>,
    #[n(5)]
    pub countered_price: Option<u64>,
    #[n(6)]
    pub buyer_message: Option<String>,
    #[n(7)]
    pub operator_message: Option<String>,
    #[n(8)]
    pub actor: Actor,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    #[n(0)]
    pub id: String, // uuid7, bech32 encoded with "offer" hrp
    #[n(1)]
    pub listing_id: String,
    #[n(2)]
    pub buyer_id: String,
    #[n(3)]
    pub offered_price: u64,
    #[n(4)]
    pub countered_price: Option<u64>,
    #[n(5)]
    pub status: OfferStatus,
    #[n(6)]
    pub buyer_message: Option<String>,
    #[n(7)]
    pub operator_message: Option<String>,
    #[n(8)]
    history: Vec<TransitionEntry>,
    #[n(9)]
    pub created_at: TimeStamp<Utc>,
    #[n(10)]
    pub updated_at: TimeStamp<Utc>,
}

impl Offer {
    /// Open a new offer in `Pending`, seeding the history with the initial
    /// submission entry (previous status undefined).
    pub fn open(
        listing_id: String,
        buyer_id: String,
        price: u64,
        buyer_message: Option<String>,
        actor: Actor,
    ) -> anyhow::Result<Self> {
        let now = TimeStamp::new();
        let entry = TransitionEntry {
            at: now.clone(),
            previous_status: None,
            new_status: OfferStatus::Pending,
            previous_price: None,
            new_price: Some(price),
            countered_price: None,
            buyer_message: buyer_message.clone(),
            operator_message: None,
            actor,
        };

        Ok(Self {
            id: new_uuid_to_bech32("offer")?,
            listing_id,
            buyer_id,
            offered_price: price,
            countered_price: None,
            status: OfferStatus::Pending,
            buyer_message,
            operator_message: None,
            history: vec![entry],
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// The only mutation path: derive the current fields from `entry` and
    /// push it onto the history.
    ///
    /// Buyer-initiated entries carry the buyer's message; operator entries
    /// record the operator's message and clear the stored buyer message (it
    /// has been consumed by the response).
    pub fn apply(&mut self, entry: TransitionEntry) {
        self.status = entry.new_status;
        if let Some(price) = entry.new_price {
            self.offered_price = price;
        }
        self.countered_price = entry.countered_price;
        match entry.actor {
            Actor::Buyer => {
                self.buyer_message = entry.buyer_message.clone();
            }
            Actor::Operator { .. } => {
                self.buyer_message = None;
                self.operator_message = entry.operator_message.clone();
            }
        }
        self.updated_at = entry.at.clone();
        self.history.push(entry);
    }

    pub fn history(&self) -> &[TransitionEntry] {
        &self.history
    }

    pub fn last_transition(&self) -> &TransitionEntry {
        self.history
            .last()
            .expect("offer history is never empty by construction")
    }

    /// The last history element's resulting status must equal the current
    /// status, and prices must match the most recent recorded change.
    pub fn history_consistent(&self) -> bool {
        let last = match self.history.last() {
            Some(last) => last,
            None => return false,
        };
        if last.new_status != self.status {
            return false;
        }
        let last_price_change = self
            .history
            .iter()
            .rev()
            .find_map(|entry| entry.new_price);
        last_price_change == Some(self.offered_price)
    }
}
