//! Offer negotiation core for a property marketing platform.
//!
//! Buyers submit price offers on listings, operators counter, accept,
//! reject, or expire them, and every transition lands in an append-only
//! history. The crate owns buyer deduplication, the one-offer-per-(buyer,
//! listing) guarantee, and the negotiation state machine; listings, mail
//! delivery, and the surrounding CRM screens are external collaborators.

pub mod buyer;
pub mod error;
pub mod hooks;
pub mod listing;
pub mod notify;
pub mod offer;
pub mod resolver;
pub mod segments;
pub mod service;
pub mod store;
pub mod submit;
pub mod utils;

pub use buyer::{Buyer, BuyerProfile, BuyerType};
pub use error::{Error, Result};
pub use hooks::{EventKind, HookSet, OfferEvent, PostCommitHook};
pub use listing::{Listing, ListingCatalog, ListingDirectory};
pub use notify::{Notifier, NotifyConfig, Transport};
pub use offer::{Actor, Offer, OfferStatus, TransitionEntry};
pub use resolver::{BuyerResolver, MatchOutcome, Resolution};
pub use segments::SegmentSync;
pub use service::{BuyerQuery, OfferAction, OfferService, Operator, Submission};
pub use store::{BuyerCreateOutcome, CreateOutcome, OfferStore};
pub use submit::OfferSubmission;
