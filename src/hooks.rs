//! Post-commit hooks.
//!
//! Notifications and segment sync are best-effort side channels: they run
//! only after the core write has committed, each one is individually
//! isolated, and a failure is logged rather than propagated. A failed hook
//! can never make a successful negotiation action appear to fail, and one
//! failing hook does not block the others.

use tracing::warn;

use crate::buyer::Buyer;
use crate::listing::Listing;
use crate::offer::Offer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Submitted,
    Updated,
    BelowMinimum,
    Accepted,
    Rejected,
    Countered,
    Expired,
}

impl EventKind {
    pub fn is_buyer_submission(&self) -> bool {
        matches!(
            self,
            EventKind::Submitted | EventKind::Updated | EventKind::BelowMinimum
        )
    }
}

/// Snapshot handed to every hook after a committed transition.
#[derive(Debug, Clone)]
pub struct OfferEvent {
    pub kind: EventKind,
    pub listing: Listing,
    pub buyer: Buyer,
    pub offer: Offer,
    pub price: u64,
    pub message: Option<String>,
}

pub trait PostCommitHook: Send + Sync {
    fn name(&self) -> &'static str;
    fn on_event(&self, event: &OfferEvent) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct HookSet {
    hooks: Vec<Box<dyn PostCommitHook>>,
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Box<dyn PostCommitHook>) {
        self.hooks.push(hook);
    }

    /// Run every hook against the event, swallowing and logging failures.
    pub fn dispatch(&self, event: &OfferEvent) {
        for hook in &self.hooks {
            if let Err(err) = hook.on_event(event) {
                warn!(
                    hook = hook.name(),
                    offer = %event.offer.id,
                    error = %err,
                    "post-commit hook failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offer::Actor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Failing;
    impl PostCommitHook for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn on_event(&self, _event: &OfferEvent) -> anyhow::Result<()> {
            anyhow::bail!("transport down")
        }
    }

    struct Counting(Arc<AtomicUsize>);
    impl PostCommitHook for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }
        fn on_event(&self, _event: &OfferEvent) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn event() -> OfferEvent {
        let offer =
            Offer::open("listing-1".into(), "buyer-1".into(), 100_000, None, Actor::Buyer).unwrap();
        OfferEvent {
            kind: EventKind::Submitted,
            listing: Listing {
                id: "listing-1".into(),
                street_address: None,
                city: None,
                county: None,
                area: None,
                asking_price: 150_000,
                min_price: 120_000,
            },
            buyer: Buyer::from_profile(&crate::buyer::BuyerProfile {
                email: "jane@example.com".into(),
                phone: "555-0101".into(),
                first_name: "Jane".into(),
                last_name: "Doe".into(),
                ..Default::default()
            })
            .unwrap(),
            offer,
            price: 100_000,
            message: None,
        }
    }

    #[test]
    fn one_failing_hook_does_not_block_the_rest() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut hooks = HookSet::new();
        hooks.register(Box::new(Failing));
        hooks.register(Box::new(Counting(count.clone())));
        hooks.register(Box::new(Failing));
        hooks.register(Box::new(Counting(count.clone())));

        hooks.dispatch(&event());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
