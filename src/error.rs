//! Error taxonomy for the negotiation core.
//!
//! Validation and duplicate errors are raised before any write; persistence
//! errors abort the operation with no partial state. Side-effect failures
//! (notifications, segment sync) never surface here, they are logged inside
//! hook dispatch.

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("offered price must be greater than zero")]
    InvalidPrice,
    #[error("a countered price is required for a counter response")]
    MissingCounterPrice,
    #[error("an offer of {current_price} already exists; offer a higher price to update")]
    DuplicateOffer { current_price: u64 },
    #[error("offer {0} was not found")]
    OfferNotFound(String),
    #[error("listing {0} was not found")]
    ListingNotFound(String),
    #[error("buyer {0} was not found")]
    BuyerNotFound(String),
    #[error("storage failure: {0}")]
    Persistence(#[from] sled::Error),
    #[error("failed to decode stored record: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("failed to encode record: {0}")]
    Encode(String),
}

impl Error {
    /// Whether the caller can fix the request and retry, as opposed to a
    /// storage fault.
    pub fn is_client_error(&self) -> bool {
        match self {
            Error::MissingField(_)
            | Error::InvalidPrice
            | Error::MissingCounterPrice
            | Error::DuplicateOffer { .. }
            | Error::OfferNotFound(_)
            | Error::ListingNotFound(_)
            | Error::BuyerNotFound(_) => true,
            Error::Persistence(_) | Error::Decode(_) | Error::Encode(_) => false,
        }
    }
}

impl From<minicbor::encode::Error<core::convert::Infallible>> for Error {
    fn from(err: minicbor::encode::Error<core::convert::Infallible>) -> Self {
        Error::Encode(err.to_string())
    }
}
