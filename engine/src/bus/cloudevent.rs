//! CloudEvents 1.0 envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{DomainEvent, EventMeta};

/// JSON envelope carried on the bus.
///
/// `event_type` serializes as the CloudEvents `type` attribute and holds the
/// dot-namespaced verb (`wms.order.wave-assigned`). `data` is the serialized
/// domain event; timestamps inside it are RFC3339 UTC and monetary values are
/// integer minor units plus an ISO-4217 code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudEvent {
    pub specversion: String,
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub time: DateTime<Utc>,
    pub datacontenttype: String,
    pub data: serde_json::Value,
}

impl CloudEvent {
    /// Wrap a domain event for transport.
    pub fn from_domain_event(event: &DomainEvent, source: &str) -> Self {
        Self {
            specversion: "1.0".to_string(),
            id: Uuid::new_v4().to_string(),
            event_type: event.event_type().to_string(),
            source: source.to_string(),
            time: event.occurred_at(),
            datacontenttype: "application/json".to_string(),
            // DomainEvent is a closed enum; serialization cannot fail.
            data: serde_json::to_value(event).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Recover the domain event from the envelope data.
    pub fn to_domain_event(&self) -> Result<DomainEvent, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trip() {
        let event = DomainEvent::OrderValidated {
            order_id: "ORD-1".to_string(),
            occurred_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        };
        let envelope = CloudEvent::from_domain_event(&event, "/wms/orders");

        assert_eq!(envelope.specversion, "1.0");
        assert_eq!(envelope.event_type, "wms.order.validated");
        assert_eq!(envelope.datacontenttype, "application/json");
        assert_eq!(envelope.to_domain_event().unwrap(), event);
    }
}
