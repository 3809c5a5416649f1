//! Operator and buyer notifications.
//!
//! Whether notifications fire at all is an injected configuration value, not
//! a runtime settings lookup inside the engine. Delivery goes through a
//! [`Transport`] so the actual mail machinery stays outside this subsystem;
//! a disabled config or an empty recipient list makes the dispatcher a
//! silent no-op.

use tracing::debug;

use crate::hooks::{EventKind, OfferEvent, PostCommitHook};

#[derive(Debug, Clone, Default)]
pub struct NotifyConfig {
    pub enabled: bool,
    pub recipients: Vec<String>,
}

pub trait Transport: Send + Sync {
    fn deliver(&self, recipients: &[String], subject: &str, body: &str) -> anyhow::Result<()>;
}

impl<T: Transport> Transport for std::sync::Arc<T> {
    fn deliver(&self, recipients: &[String], subject: &str, body: &str) -> anyhow::Result<()> {
        (**self).deliver(recipients, subject, body)
    }
}

/// Collects deliveries in memory; used by tests and demos.
#[derive(Default)]
pub struct MemoryTransport {
    sent: std::sync::Mutex<Vec<(String, String)>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent
            .lock()
            .expect("transport lock poisoned")
            .iter()
            .map(|(subject, _)| subject.clone())
            .collect()
    }
}

impl Transport for MemoryTransport {
    fn deliver(&self, _recipients: &[String], subject: &str, body: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .expect("transport lock poisoned")
            .push((subject.to_string(), body.to_string()));
        Ok(())
    }
}

pub struct Notifier<T: Transport> {
    config: NotifyConfig,
    transport: T,
}

impl<T: Transport> Notifier<T> {
    pub fn new(config: NotifyConfig, transport: T) -> Self {
        Self { config, transport }
    }
}

fn subject_for(event: &OfferEvent) -> String {
    let address = event
        .listing
        .street_address
        .as_deref()
        .unwrap_or(event.listing.id.as_str());
    let buyer = event.buyer.full_name();
    match event.kind {
        EventKind::Submitted => format!("New offer from {buyer} on {address}"),
        EventKind::Updated => format!("Updated offer from {buyer} on {address}"),
        EventKind::BelowMinimum => format!("Low offer from {buyer} on {address}"),
        EventKind::Accepted => format!("Your offer on {address} was accepted"),
        EventKind::Rejected => format!("Your offer on {address} was not accepted"),
        EventKind::Countered => format!("Counter offer on {address}"),
        EventKind::Expired => format!("Your offer on {address} has expired"),
    }
}

fn body_for(event: &OfferEvent) -> String {
    let mut body = String::new();
    let listing = &event.listing;
    let address = listing.street_address.as_deref().unwrap_or(&listing.id);
    body.push_str(&format!("Listing: {address}"));
    if let Some(city) = &listing.city {
        body.push_str(&format!(", {city}"));
    }
    body.push('\n');
    body.push_str(&format!(
        "Buyer: {} <{}> {}\n",
        event.buyer.full_name(),
        event.buyer.email,
        event.buyer.phone
    ));
    body.push_str(&format!("Offered price: ${}\n", event.price));
    if let Some(countered) = event.offer.countered_price {
        body.push_str(&format!("Countered price: ${countered}\n"));
    }
    if event.kind == EventKind::BelowMinimum {
        body.push_str(&format!(
            "Warning: below the minimum price of ${}\n",
            listing.min_price
        ));
    }
    if let Some(message) = &event.message {
        body.push_str(&format!("Message: {message}\n"));
    }
    body.push_str(&format!("Status: {}\n", event.offer.status));
    body
}

impl<T: Transport> PostCommitHook for Notifier<T> {
    fn name(&self) -> &'static str {
        "notifier"
    }

    fn on_event(&self, event: &OfferEvent) -> anyhow::Result<()> {
        if !self.config.enabled {
            debug!("offer notifications are disabled");
            return Ok(());
        }
        if self.config.recipients.is_empty() {
            debug!("no offer notification recipients configured");
            return Ok(());
        }

        let subject = subject_for(event);
        let body = body_for(event);
        self.transport
            .deliver(&self.config.recipients, &subject, &body)
    }
}
