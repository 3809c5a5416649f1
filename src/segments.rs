//! Segment membership sync.
//!
//! Buyers who submit offers are bucketed into named segments derived from
//! the listing's geography and the buyer's type, for targeted follow-up.
//! The whole module is best-effort: it runs as a post-commit hook and its
//! failures are logged, never propagated.
//!
//! Key layout in the shared sled tree:
//!
//! ```text
//! segment/<name>            -> Segment (cbor)
//! member/<name>/<buyer_id>  -> joined-at timestamp (cbor)
//! ```

use std::sync::Arc;

use chrono::Utc;
use sled::Db;
use tracing::info;

use crate::buyer::{Buyer, merge_unique};
use crate::error::Result;
use crate::hooks::{OfferEvent, PostCommitHook};
use crate::listing::Listing;
use crate::utils::TimeStamp;

const SEGMENT_PREFIX: &str = "segment/";
const MEMBER_PREFIX: &str = "member/";

/// Matching criteria accumulated from every offer that landed in the
/// segment.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentCriteria {
    #[n(0)]
    pub areas: Vec<String>,
    #[n(1)]
    pub cities: Vec<String>,
    #[n(2)]
    pub counties: Vec<String>,
    #[n(3)]
    pub buyer_types: Vec<String>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    #[n(0)]
    pub name: String,
    #[n(1)]
    pub source: String,
    #[n(2)]
    pub criteria: SegmentCriteria,
    #[n(3)]
    pub created_at: TimeStamp<Utc>,
}

/// Segment name: `{source} {area-or-city} {buyer type}` with placeholder
/// labels when a field is missing.
pub fn segment_name(buyer: &Buyer, listing: &Listing, source_label: &str) -> String {
    let area = listing.area_or_city().unwrap_or("Unknown Area");
    let buyer_type = buyer
        .buyer_type
        .map(|t| t.to_string())
        .unwrap_or_else(|| "Unknown Type".to_string());
    format!("{source_label} {area} {buyer_type}")
}

pub struct SegmentSync {
    db: Arc<Db>,
    source_label: String,
}

impl SegmentSync {
    pub fn new(db: Arc<Db>, source_label: &str) -> Self {
        Self {
            db,
            source_label: source_label.to_string(),
        }
    }

    /// Create the segment if absent, fold the listing/buyer criteria into an
    /// existing one, and make sure the buyer is a member. Idempotent.
    pub fn ensure(&self, buyer: &Buyer, listing: &Listing) -> Result<()> {
        let name = segment_name(buyer, listing, &self.source_label);
        let segment_key = format!("{SEGMENT_PREFIX}{name}");

        let incoming = SegmentCriteria {
            areas: listing.area.clone().into_iter().collect(),
            cities: listing.city.clone().into_iter().collect(),
            counties: listing.county.clone().into_iter().collect(),
            buyer_types: buyer.buyer_type.map(|t| t.to_string()).into_iter().collect(),
        };

        let segment = match self.db.get(segment_key.as_bytes())? {
            Some(value) => {
                let mut segment: Segment = minicbor::decode(&value)?;
                let merged = SegmentCriteria {
                    areas: merge_unique(&segment.criteria.areas, &incoming.areas),
                    cities: merge_unique(&segment.criteria.cities, &incoming.cities),
                    counties: merge_unique(&segment.criteria.counties, &incoming.counties),
                    buyer_types: merge_unique(&segment.criteria.buyer_types, &incoming.buyer_types),
                };
                if merged != segment.criteria {
                    segment.criteria = merged;
                    self.db
                        .insert(segment_key.as_bytes(), minicbor::to_vec(&segment)?)?;
                }
                segment
            }
            None => {
                let segment = Segment {
                    name: name.clone(),
                    source: self.source_label.clone(),
                    criteria: incoming,
                    created_at: TimeStamp::new(),
                };
                self.db
                    .insert(segment_key.as_bytes(), minicbor::to_vec(&segment)?)?;
                info!(segment = %name, "created buyer segment");
                segment
            }
        };

        let member_key = format!("{MEMBER_PREFIX}{}/{}", segment.name, buyer.id);
        if self.db.get(member_key.as_bytes())?.is_none() {
            self.db
                .insert(member_key.as_bytes(), minicbor::to_vec(&TimeStamp::new())?)?;
            info!(segment = %segment.name, buyer = %buyer.id, "added buyer to segment");
        }

        Ok(())
    }

    pub fn segment(&self, name: &str) -> Result<Option<Segment>> {
        match self.db.get(format!("{SEGMENT_PREFIX}{name}").as_bytes())? {
            Some(value) => Ok(Some(minicbor::decode(&value)?)),
            None => Ok(None),
        }
    }

    pub fn members(&self, name: &str) -> Result<Vec<String>> {
        let prefix = format!("{MEMBER_PREFIX}{name}/");
        let mut buyer_ids = Vec::new();
        for item in self.db.scan_prefix(prefix.as_bytes()) {
            let (key, _) = item?;
            let key = String::from_utf8_lossy(&key).into_owned();
            if let Some(buyer_id) = key.strip_prefix(&prefix) {
                buyer_ids.push(buyer_id.to_string());
            }
        }
        Ok(buyer_ids)
    }

    pub fn segments(&self) -> Result<Vec<Segment>> {
        let mut segments = Vec::new();
        for item in self.db.scan_prefix(SEGMENT_PREFIX.as_bytes()) {
            let (_, value) = item?;
            segments.push(minicbor::decode(&value)?);
        }
        Ok(segments)
    }
}

impl PostCommitHook for SegmentSync {
    fn name(&self) -> &'static str {
        "segment-sync"
    }

    /// Only buyer-initiated submissions feed segments; operator responses
    /// carry no new audience signal.
    fn on_event(&self, event: &OfferEvent) -> anyhow::Result<()> {
        if !event.kind.is_buyer_submission() {
            return Ok(());
        }
        self.ensure(&event.buyer, &event.listing)?;
        Ok(())
    }
}
