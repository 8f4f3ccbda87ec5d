//! Sample events used across tests.

use chrono::{DateTime, Utc};
use rstream_domain::{EncodeEvent, EventTypeRegistry, StreamEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// An order was placed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: Uuid,
    pub amount_cents: u64,
    pub placed_at: DateTime<Utc>,
}

impl OrderPlaced {
    /// Order with a fresh id, placed now
    pub fn new(amount_cents: u64) -> Self {
        Self {
            order_id: Uuid::now_v7(),
            amount_cents,
            placed_at: Utc::now(),
        }
    }
}

impl StreamEvent for OrderPlaced {
    const EVENT_TYPE: &'static str = "shop.orders.OrderPlaced";
}

/// An order left the warehouse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderShipped {
    pub order_id: Uuid,
    pub carrier: String,
}

impl StreamEvent for OrderShipped {
    const EVENT_TYPE: &'static str = "shop.orders.OrderShipped";
}

/// Any order event; both concrete events decode into it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEvent {
    Placed(OrderPlaced),
    Shipped(OrderShipped),
}

impl From<OrderPlaced> for OrderEvent {
    fn from(event: OrderPlaced) -> Self {
        OrderEvent::Placed(event)
    }
}

impl From<OrderShipped> for OrderEvent {
    fn from(event: OrderShipped) -> Self {
        OrderEvent::Shipped(event)
    }
}

impl EncodeEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Placed(event) => event.event_type(),
            OrderEvent::Shipped(event) => event.event_type(),
        }
    }

    fn encode_payload(&self) -> Result<String, serde_json::Error> {
        match self {
            OrderEvent::Placed(event) => event.encode_payload(),
            OrderEvent::Shipped(event) => event.encode_payload(),
        }
    }
}

/// Registry knowing both order events, each also decodable as [`OrderEvent`]
pub fn test_registry() -> Arc<EventTypeRegistry> {
    Arc::new(
        EventTypeRegistry::new()
            .with_event_into::<OrderPlaced, OrderEvent>()
            .with_event_into::<OrderShipped, OrderEvent>(),
    )
}
