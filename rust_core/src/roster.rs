//! Seat assignments for a session.

use crate::models::ParticipantLabel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: Option<String>,
}

impl Participant {
    pub fn new(id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
        }
    }

    /// `id[:display name]`
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (id, name) = match raw.split_once(':') {
            Some((id, name)) => (id.trim(), Some(name.trim())),
            None => (raw, None),
        };
        if id.is_empty() {
            return None;
        }
        let name = name.filter(|n| !n.is_empty()).map(str::to_string);
        Some(Self::new(id, name))
    }
}

/// At most one participant per seat
#[derive(Debug, Clone, Default)]
pub struct Roster {
    seats: BTreeMap<ParticipantLabel, Participant>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seat a participant, returning whoever held the seat before
    pub fn assign(&mut self, label: ParticipantLabel, participant: Participant) -> Option<Participant> {
        info!("Seat {} (slot {}) -> {}", label, label.slot(), participant.id);
        self.seats.insert(label, participant)
    }

    pub fn vacate(&mut self, label: ParticipantLabel) -> Option<Participant> {
        let previous = self.seats.remove(&label);
        if let Some(p) = &previous {
            info!("Seat {} vacated by {}", label, p.id);
        }
        previous
    }

    pub fn get(&self, label: ParticipantLabel) -> Option<&Participant> {
        self.seats.get(&label)
    }

    pub fn is_occupied(&self, label: ParticipantLabel) -> bool {
        self.seats.contains_key(&label)
    }

    /// Occupied seats in seat order
    pub fn occupied(&self) -> Vec<ParticipantLabel> {
        self.seats.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.seats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }

    /// Trimmed display name, else the seat label
    pub fn popup_label(&self, label: ParticipantLabel) -> String {
        self.seats
            .get(&label)
            .and_then(|p| p.name.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| label.to_string())
    }
}
