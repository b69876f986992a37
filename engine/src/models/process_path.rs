//! Process paths.
//!
//! A process path is the sequence of stations an order traverses
//! (pick → [wall] → pack → sortation → ship) plus the capabilities those
//! stations must offer. It is resolved once per order during planning and
//! persisted so downstream stages can match stations against it.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::order::Order;

/// Handling class attached to an order by its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialHandling {
    Hazmat,
    ColdChain,
    HighValue,
    Fragile,
    GiftWrap,
}

/// Capability a station must offer to work an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationCapability {
    HazmatHandling,
    TemperatureControl,
    HighValueVerification,
    FragileHandling,
    HeavyLifting,
    GiftWrapping,
}

/// Station kinds along a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StationType {
    Pick,
    Wall,
    Pack,
    Sort,
    Ship,
}

/// Shape of the execution pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKind {
    /// Single-zone orders: pick straight to pack.
    PickPack,
    /// Multi-zone orders consolidate at a put-wall between pick and pack.
    PickWallPack,
}

impl PathKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathKind::PickPack => "pick_pack",
            PathKind::PickWallPack => "pick_wall_pack",
        }
    }
}

/// Orders above this single-unit weight need heavy-lifting stations (25 kg).
const HEAVY_ITEM_THRESHOLD_GRAMS: u32 = 25_000;

/// Resolved process path for one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessPath {
    pub id: String,
    pub order_id: String,
    pub kind: PathKind,
    pub stations: Vec<StationType>,
    pub required_capabilities: BTreeSet<StationCapability>,
    pub special_handling: BTreeSet<SpecialHandling>,
    pub resolved_at: DateTime<Utc>,
}

impl ProcessPath {
    /// Derive the path an order must take from its contents.
    pub fn resolve(order: &Order, now: DateTime<Utc>) -> Self {
        let kind = if order.consolidation_required() {
            PathKind::PickWallPack
        } else {
            PathKind::PickPack
        };

        let stations = match kind {
            PathKind::PickPack => vec![
                StationType::Pick,
                StationType::Pack,
                StationType::Sort,
                StationType::Ship,
            ],
            PathKind::PickWallPack => vec![
                StationType::Pick,
                StationType::Wall,
                StationType::Pack,
                StationType::Sort,
                StationType::Ship,
            ],
        };

        let special_handling = order.special_handling();
        let mut required_capabilities: BTreeSet<StationCapability> = special_handling
            .iter()
            .map(|h| h.required_capability())
            .collect();
        if order
            .items()
            .iter()
            .any(|i| i.unit_weight_grams >= HEAVY_ITEM_THRESHOLD_GRAMS)
        {
            required_capabilities.insert(StationCapability::HeavyLifting);
        }

        Self {
            id: format!("PATH-{}", order.id()),
            order_id: order.id().to_string(),
            kind,
            stations,
            required_capabilities,
            special_handling,
            resolved_at: now,
        }
    }
}

impl SpecialHandling {
    /// Station capability this handling class demands.
    pub fn required_capability(&self) -> StationCapability {
        match self {
            SpecialHandling::Hazmat => StationCapability::HazmatHandling,
            SpecialHandling::ColdChain => StationCapability::TemperatureControl,
            SpecialHandling::HighValue => StationCapability::HighValueVerification,
            SpecialHandling::Fragile => StationCapability::FragileHandling,
            SpecialHandling::GiftWrap => StationCapability::GiftWrapping,
        }
    }
}
