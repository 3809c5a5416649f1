//! Read-only listing snapshots. Listings are owned by the wider property
//! component; the negotiation core only needs the pricing floor and the
//! geography used for segment naming.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::Result;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub street_address: Option<String>,
    #[n(2)]
    pub city: Option<String>,
    #[n(3)]
    pub county: Option<String>,
    #[n(4)]
    pub area: Option<String>,
    #[n(5)]
    pub asking_price: u64,
    #[n(6)]
    pub min_price: u64,
}

impl Listing {
    /// Area designation used for segment naming, falling back to the city.
    pub fn area_or_city(&self) -> Option<&str> {
        self.area.as_deref().or(self.city.as_deref())
    }
}

/// Boundary to the external property component.
pub trait ListingDirectory: Send + Sync {
    fn fetch(&self, listing_id: &str) -> Result<Option<Listing>>;
}

/// In-memory directory used by tests and demos in place of the real
/// property component.
#[derive(Debug, Default)]
pub struct ListingCatalog {
    listings: RwLock<HashMap<String, Listing>>,
}

impl ListingCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, listing: Listing) {
        self.listings
            .write()
            .expect("listing catalog lock poisoned")
            .insert(listing.id.clone(), listing);
    }
}

impl ListingDirectory for ListingCatalog {
    fn fetch(&self, listing_id: &str) -> Result<Option<Listing>> {
        Ok(self
            .listings
            .read()
            .expect("listing catalog lock poisoned")
            .get(listing_id)
            .cloned())
    }
}
