//! Position book
//!
//! Holds one record per filled ladder entry, keyed by the gateway's order
//! reference, alongside the net aggregate the controller believes it holds.
//!
//! The gateway only reports a single net position per symbol, so there is no
//! per-record reconciliation. [`PositionBook::sync`] overwrites the tracked
//! aggregate and then applies the configured [`ReconcilePolicy`] to the
//! records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::{Money, PositionSide};

/// What to do with per-entry records when the gateway aggregate disagrees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilePolicy {
    /// Never touch records; only the aggregate drives capacity
    #[default]
    KeepRecords,
    /// Drop every record when the gateway reports flat, and records on the
    /// side opposite to the reported position otherwise
    DropOnFlat,
}

/// Gateway order reference that opened a position
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(String);

impl PositionId {
    pub fn new(id: impl Into<String>) -> Self {
        PositionId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PositionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One filled ladder entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub entry_price: Money,
    pub side: PositionSide,
    pub size: Money,
    /// Last stop level confirmed by the gateway
    pub stop_price: Option<Money>,
    stop_loss_moved: bool,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub fn new(id: PositionId, entry_price: Money, side: PositionSide, size: Money) -> Self {
        Self {
            id,
            entry_price,
            side,
            size,
            stop_price: None,
            stop_loss_moved: false,
            opened_at: Utc::now(),
        }
    }

    pub fn stop_loss_moved(&self) -> bool {
        self.stop_loss_moved
    }

    /// Record the tightened stop. Returns false, leaving the stop untouched,
    /// if it was already moved.
    pub fn mark_stop_moved(&mut self, new_stop: Money) -> bool {
        if self.stop_loss_moved {
            return false;
        }
        self.stop_price = Some(new_stop);
        self.stop_loss_moved = true;
        true
    }

    fn signed_size(&self) -> Money {
        signed(self.size, Some(self.side))
    }
}

fn signed(size: Money, side: Option<PositionSide>) -> Money {
    match side {
        Some(PositionSide::Long) => size.abs(),
        Some(PositionSide::Short) => -size.abs(),
        None => Money::ZERO,
    }
}

/// Local record of open positions.
///
/// Not synchronised: callers sharing a book across threads must lock it.
#[derive(Debug, Clone, Default)]
pub struct PositionBook {
    policy: ReconcilePolicy,
    positions: HashMap<PositionId, Position>,
    order: Vec<PositionId>,
    /// Long positive, short negative
    net: Money,
}

impl PositionBook {
    pub fn new(policy: ReconcilePolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    pub fn policy(&self) -> ReconcilePolicy {
        self.policy
    }

    /// Insert a record and add its size to the tracked aggregate.
    /// Returns the record previously stored under the same id.
    pub fn add(&mut self, position: Position) -> Option<Position> {
        let id = position.id.clone();
        self.net += position.signed_size();
        let previous = self.positions.insert(id.clone(), position);
        match &previous {
            Some(prev) => self.net -= prev.signed_size(),
            None => self.order.push(id),
        }
        previous
    }

    /// Remove a record and take its size out of the tracked aggregate
    pub fn remove(&mut self, id: &PositionId) -> Option<Position> {
        let removed = self.positions.remove(id)?;
        self.order.retain(|existing| existing != id);
        self.net -= removed.signed_size();
        Some(removed)
    }

    pub fn get(&self, id: &PositionId) -> Option<&Position> {
        self.positions.get(id)
    }

    pub fn get_mut(&mut self, id: &PositionId) -> Option<&mut Position> {
        self.positions.get_mut(id)
    }

    /// Records in the order they were opened
    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.order.iter().filter_map(|id| self.positions.get(id))
    }

    pub fn ids(&self) -> Vec<PositionId> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Sum of record sizes regardless of side
    pub fn records_size(&self) -> Money {
        self.positions.values().map(|p| p.size).sum()
    }

    /// Absolute size of the tracked aggregate
    pub fn tracked_size(&self) -> Money {
        self.net.abs()
    }

    pub fn tracked_side(&self) -> Option<PositionSide> {
        if self.net.is_positive() {
            Some(PositionSide::Long)
        } else if self.net.is_negative() {
            Some(PositionSide::Short)
        } else {
            None
        }
    }

    /// Reconcile against the gateway aggregate. Returns true when the
    /// aggregate differs from what the controller tracked, i.e. something
    /// outside the controller changed the position.
    pub fn sync(&mut self, gateway_size: Money, gateway_side: Option<PositionSide>) -> bool {
        let reported = signed(gateway_size, gateway_side);
        let changed = reported != self.net;

        if changed {
            info!(
                old_size = %self.tracked_size(),
                old_side = ?self.tracked_side(),
                new_size = %gateway_size,
                new_side = ?gateway_side,
                "Position changed outside controller"
            );
            self.net = reported;
        }

        if self.policy == ReconcilePolicy::DropOnFlat {
            let dropped = self.drop_stale_records(gateway_side.filter(|_| !reported.is_zero()));
            if !dropped.is_empty() {
                warn!(
                    count = dropped.len(),
                    size = %dropped.iter().map(|p| p.size).sum::<Money>(),
                    "Dropped position records not backed by gateway aggregate"
                );
            }
        }

        changed
    }

    fn drop_stale_records(&mut self, live_side: Option<PositionSide>) -> Vec<Position> {
        let stale: Vec<PositionId> = self
            .iter()
            .filter(|p| live_side != Some(p.side))
            .map(|p| p.id.clone())
            .collect();

        let net = self.net;
        let dropped = stale
            .iter()
            .filter_map(|id| self.remove(id))
            .collect();
        // The aggregate came from the gateway; dropping records must not alter it
        self.net = net;
        dropped
    }
}
