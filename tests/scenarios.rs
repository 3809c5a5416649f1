//! End-to-end negotiation scenarios against a real (temporary) sled db.

use std::sync::Arc;

use offer_negotiation::{
    BuyerQuery, BuyerType, Error, HookSet, Listing, ListingCatalog, Notifier, NotifyConfig,
    OfferAction, OfferService, OfferStatus, OfferStore, OfferSubmission, Operator, SegmentSync,
    notify::MemoryTransport,
};
use tempfile::tempdir;

struct Rig {
    service: Arc<OfferService>,
    transport: Arc<MemoryTransport>,
    segments: SegmentSync,
    // tempdir must outlive the db
    _temp_dir: tempfile::TempDir,
}

/// Sled uses file-based locking, so every test gets its own database under
/// a tempdir for simplified cleanup.
fn rig(listing: Listing) -> anyhow::Result<Rig> {
    let temp_dir = tempdir()?;
    let db = Arc::new(sled::open(temp_dir.path().join("offers.db"))?);
    db.clear()?;

    let catalog = Arc::new(ListingCatalog::new());
    catalog.insert(listing);

    let transport = Arc::new(MemoryTransport::new());
    let mut hooks = HookSet::new();
    hooks.register(Box::new(Notifier::new(
        NotifyConfig {
            enabled: true,
            recipients: vec!["ops@example.com".into()],
        },
        transport.clone(),
    )));
    hooks.register(Box::new(SegmentSync::new(db.clone(), "Offer")));

    let service = Arc::new(OfferService::new(
        OfferStore::new(db.clone()),
        catalog,
        hooks,
    ));

    Ok(Rig {
        service,
        transport,
        segments: SegmentSync::new(db, "Offer"),
        _temp_dir: temp_dir,
    })
}

fn oak_lane() -> Listing {
    Listing {
        id: "listing_oak".into(),
        street_address: Some("12 Oak Ln".into()),
        city: Some("Austin".into()),
        county: Some("Travis County".into()),
        area: Some("Hill Country".into()),
        asking_price: 150_000,
        min_price: 120_000,
    }
}

fn jane(price: u64) -> OfferSubmission {
    OfferSubmission::new("listing_oak", price)
        .email("jane@example.com")
        .phone("555-0101")
        .first_name("Jane")
        .last_name("Doe")
        .buyer_type(BuyerType::Investor)
}

fn admin() -> Operator {
    Operator {
        id: "user_admin".into(),
        name: Some("Admin".into()),
    }
}

#[test]
fn first_submission_opens_pending_offer() -> anyhow::Result<()> {
    let rig = rig(oak_lane())?;

    let submission = rig.service.submit(&jane(130_000))?;

    assert_eq!(submission.offer.status, OfferStatus::Pending);
    assert_eq!(submission.offer.offered_price, 130_000);
    assert_eq!(submission.offer.history().len(), 1);
    assert!(!submission.updated_existing);
    assert!(!submission.below_minimum);
    assert_eq!(submission.offer.last_transition().previous_status, None);

    let subjects = rig.transport.subjects();
    assert_eq!(subjects.len(), 1);
    assert!(subjects[0].starts_with("New offer from Jane Doe"));

    Ok(())
}

#[test]
fn below_minimum_submission_succeeds_with_advisory() -> anyhow::Result<()> {
    let rig = rig(oak_lane())?;

    let submission = rig.service.submit(&jane(100_000))?;

    // advisory only: the offer stands
    assert!(submission.below_minimum);
    assert_eq!(submission.offer.status, OfferStatus::Pending);
    assert_eq!(submission.offer.history().len(), 1);

    let subjects = rig.transport.subjects();
    assert!(subjects[0].starts_with("Low offer from Jane Doe"));

    Ok(())
}

#[test]
fn equal_or_lower_resubmission_is_rejected_with_current_price() -> anyhow::Result<()> {
    let rig = rig(oak_lane())?;

    rig.service.submit(&jane(100_000))?;

    for price in [95_000, 100_000] {
        match rig.service.submit(&jane(price)) {
            Err(Error::DuplicateOffer { current_price }) => {
                assert_eq!(current_price, 100_000);
            }
            other => panic!("expected DuplicateOffer, got {other:?}"),
        }
    }

    // no mutation happened
    let offers = rig.service.offers_for_listing("listing_oak")?;
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].history().len(), 1);
    assert_eq!(offers[0].offered_price, 100_000);

    Ok(())
}

#[test]
fn higher_resubmission_reopens_after_rejection() -> anyhow::Result<()> {
    let rig = rig(oak_lane())?;

    let first = rig.service.submit(&jane(130_000))?;
    rig.service
        .respond(&first.offer.id, OfferAction::Reject, None, None, &admin())?;

    let second = rig.service.submit(&jane(150_000))?;

    assert!(second.updated_existing);
    assert_eq!(second.offer.id, first.offer.id);
    assert_eq!(second.offer.status, OfferStatus::Pending);
    assert_eq!(second.offer.offered_price, 150_000);
    assert_eq!(second.offer.history().len(), 3);
    assert_eq!(
        second.offer.last_transition().previous_status,
        Some(OfferStatus::Rejected)
    );

    Ok(())
}

#[test]
fn counter_then_accept_records_full_audit_trail() -> anyhow::Result<()> {
    let rig = rig(oak_lane())?;

    let submission = rig
        .service
        .submit(&jane(130_000).message("can close in two weeks"))?;

    let countered = rig.service.respond(
        &submission.offer.id,
        OfferAction::Counter,
        Some(145_000),
        Some("meet us at 145".into()),
        &admin(),
    )?;
    assert_eq!(countered.status, OfferStatus::Countered);
    assert_eq!(countered.countered_price, Some(145_000));
    // the buyer's message was consumed by the response
    assert_eq!(countered.buyer_message, None);
    assert_eq!(countered.operator_message.as_deref(), Some("meet us at 145"));

    let accepted =
        rig.service
            .respond(&submission.offer.id, OfferAction::Accept, None, None, &admin())?;
    assert_eq!(accepted.status, OfferStatus::Accepted);
    assert_eq!(
        accepted.last_transition().previous_status,
        Some(OfferStatus::Countered)
    );
    // non-counter responses clear the countered price
    assert_eq!(accepted.countered_price, None);
    assert_eq!(accepted.history().len(), 3);

    let subjects = rig.transport.subjects();
    assert!(subjects.iter().any(|s| s.starts_with("Counter offer")));
    assert!(subjects.iter().any(|s| s.contains("accepted")));

    Ok(())
}

#[test]
fn counter_without_price_is_rejected_before_any_write() -> anyhow::Result<()> {
    let rig = rig(oak_lane())?;

    let submission = rig.service.submit(&jane(130_000))?;
    let result = rig
        .service
        .respond(&submission.offer.id, OfferAction::Counter, None, None, &admin());

    assert!(matches!(result, Err(Error::MissingCounterPrice)));
    assert_eq!(rig.service.history(&submission.offer.id)?.len(), 1);

    Ok(())
}

#[test]
fn operator_action_on_unknown_offer_is_not_found() -> anyhow::Result<()> {
    let rig = rig(oak_lane())?;

    let result = rig
        .service
        .respond("offer_missing", OfferAction::Accept, None, None, &admin());
    assert!(matches!(result, Err(Error::OfferNotFound(_))));

    Ok(())
}

#[test]
fn repeated_contact_attempts_resolve_to_one_buyer() -> anyhow::Result<()> {
    let rig = rig(oak_lane())?;

    let first = rig.service.submit(&jane(100_000))?;
    // same person, shouting their email this time, with an identity key
    let resubmission = OfferSubmission::new("listing_oak", 110_000)
        .email("JANE@EXAMPLE.COM")
        .phone("555-9999")
        .first_name("Jane")
        .last_name("Doe")
        .buyer_type(BuyerType::Investor)
        .identity_key("auth0|jane");
    let second = rig.service.submit(&resubmission)?;

    assert_eq!(first.buyer.id, second.buyer.id);
    // the identity key was backfilled and is now searchable
    let offers = rig
        .service
        .offers_for_buyer(&BuyerQuery::IdentityKey("auth0|jane".into()))?;
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].offered_price, 110_000);

    Ok(())
}

#[test]
fn segment_membership_is_idempotent_across_submissions() -> anyhow::Result<()> {
    let rig = rig(oak_lane())?;

    rig.service.submit(&jane(100_000))?;
    rig.service.submit(&jane(110_000))?;

    let name = "Offer Hill Country Investor";
    let segment = rig.segments.segment(name)?.expect("segment should exist");
    assert_eq!(segment.criteria.cities, vec!["Austin".to_string()]);
    assert_eq!(segment.criteria.buyer_types, vec!["Investor".to_string()]);

    let members = rig.segments.members(name)?;
    assert_eq!(members.len(), 1);

    Ok(())
}

#[test]
fn recent_activity_flattens_histories_newest_first() -> anyhow::Result<()> {
    let rig = rig(oak_lane())?;

    let submission = rig.service.submit(&jane(100_000))?;
    rig.service.respond(
        &submission.offer.id,
        OfferAction::Counter,
        Some(140_000),
        None,
        &admin(),
    )?;
    rig.service.submit(&jane(141_000))?;

    let activity = rig.service.recent_activity(10)?;
    assert_eq!(activity.len(), 3);
    assert_eq!(activity[0].entry.new_price, Some(141_000));
    assert_eq!(activity[2].entry.previous_status, None);
    assert!(activity.windows(2).all(|w| w[0].entry.at >= w[1].entry.at));

    Ok(())
}

#[test]
fn concurrent_first_submissions_produce_exactly_one_offer() -> anyhow::Result<()> {
    let rig = rig(oak_lane())?;

    let mut handles = Vec::new();
    for price in [130_000u64, 131_000, 132_000, 133_000, 134_000, 135_000] {
        let service = rig.service.clone();
        handles.push(std::thread::spawn(move || service.submit(&jane(price))));
    }

    let mut successes = 0usize;
    for handle in handles {
        match handle.join().expect("submission thread panicked") {
            Ok(_) => successes += 1,
            Err(Error::DuplicateOffer { .. }) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert!(successes >= 1);

    let offers = rig.service.offers_for_listing("listing_oak")?;
    assert_eq!(offers.len(), 1, "the pair race must have a single winner");
    // the highest bid always finds the standing price below it, so it wins
    assert_eq!(offers[0].offered_price, 135_000);
    assert_eq!(offers[0].history().len(), successes);
    assert!(offers[0].history_consistent());

    Ok(())
}
