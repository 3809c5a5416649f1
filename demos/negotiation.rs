//! Walks one offer through a full negotiation: submit, counter, raise,
//! accept. Run with `cargo run --example negotiation`.

use std::sync::Arc;

use offer_negotiation::{
    BuyerType, HookSet, Listing, ListingCatalog, Notifier, NotifyConfig, OfferAction,
    OfferService, OfferStore, OfferSubmission, Operator, SegmentSync, notify::MemoryTransport,
};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let db = Arc::new(sled::open("negotiation_demo.db")?);
    db.clear()?;

    let catalog = Arc::new(ListingCatalog::new());
    catalog.insert(Listing {
        id: "listing_oak".into(),
        street_address: Some("12 Oak Ln".into()),
        city: Some("Austin".into()),
        county: Some("Travis County".into()),
        area: Some("Hill Country".into()),
        asking_price: 150_000,
        min_price: 120_000,
    });

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

    let service = OfferService::new(OfferStore::new(db.clone()), catalog, hooks);

    let submission = OfferSubmission::new("listing_oak", 110_000)
        .email("jane@example.com")
        .phone("555-0101")
        .first_name("Jane")
        .last_name("Doe")
        .buyer_type(BuyerType::Investor)
        .message("Cash buyer, can close in two weeks");

    let first = service.submit(&submission)?;
    println!(
        "submitted: {} at ${} (below minimum: {})",
        first.offer.id, first.offer.offered_price, first.below_minimum
    );

    let admin = Operator {
        id: "user_admin".into(),
        name: Some("Admin".into()),
    };
    let countered = service.respond(
        &first.offer.id,
        OfferAction::Counter,
        Some(135_000),
        Some("We can do 135".into()),
        &admin,
    )?;
    println!("countered at ${:?}", countered.countered_price);

    // resubmitting at the same price is rejected, offer untouched
    if let Err(err) = service.submit(&submission) {
        println!("resubmission rejected (client error: {}): {err}", err.is_client_error());
    }

    let raised = service.submit(&OfferSubmission::new("listing_oak", 135_500)
        .email("jane@example.com")
        .phone("555-0101")
        .first_name("Jane")
        .last_name("Doe")
        .buyer_type(BuyerType::Investor))?;
    println!("raised to ${}", raised.offer.offered_price);

    let accepted = service.respond(&first.offer.id, OfferAction::Accept, None, None, &admin)?;
    println!("final status: {}", accepted.status);

    println!("\nhistory:");
    for entry in accepted.history() {
        println!(
            "  {:?} -> {:?} (price {:?}, counter {:?})",
            entry.previous_status, entry.new_status, entry.new_price, entry.countered_price
        );
    }

    println!("\nnotifications sent:");
    for subject in transport.subjects() {
        println!("  {subject}");
    }

    Ok(())
}
