use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of the user who opened a ticket, as issued by the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequesterId(pub String);

/// Identity of a gateway channel.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub String);

impl RequesterId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ChannelId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRecord {
    pub requester_id: RequesterId,
    pub channel_id: ChannelId,
}

/// Persisted lifecycle position of a single requester. A closing ticket has
/// already left the document, so it reads as `NoTicket`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketState {
    NoTicket,
    Open,
}

/// The persisted mapping `requester -> channel`, one entry per open ticket.
///
/// Serialized as `{"tickets": {"<requester>": "<channel>"}}`. Entries are kept
/// in a `BTreeMap` so repeated saves of the same mapping produce identical
/// bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TicketDocument {
    tickets: BTreeMap<RequesterId, ChannelId>,
}

impl TicketDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, requester_id: &RequesterId) -> bool {
        self.tickets.contains_key(requester_id)
    }

    pub fn channel_for(&self, requester_id: &RequesterId) -> Option<&ChannelId> {
        self.tickets.get(requester_id)
    }

    /// Reverse lookup. This is a linear scan over all open tickets; ticket
    /// volume per community is small enough that a secondary index is not kept.
    pub fn find_by_channel(&self, channel_id: &ChannelId) -> Option<&RequesterId> {
        self.tickets
            .iter()
            .find_map(|(requester_id, candidate)| (candidate == channel_id).then_some(requester_id))
    }

    /// Inserts a new entry. Returns the channel already tracked for the
    /// requester, leaving the document untouched, if one exists.
    pub fn insert(
        &mut self,
        requester_id: RequesterId,
        channel_id: ChannelId,
    ) -> Result<(), ChannelId> {
        if let Some(existing) = self.tickets.get(&requester_id) {
            return Err(existing.clone());
        }
        self.tickets.insert(requester_id, channel_id);
        Ok(())
    }

    pub fn remove(&mut self, requester_id: &RequesterId) -> Option<ChannelId> {
        self.tickets.remove(requester_id)
    }

    pub fn state_of(&self, requester_id: &RequesterId) -> TicketState {
        if self.has(requester_id) {
            TicketState::Open
        } else {
            TicketState::NoTicket
        }
    }

    pub fn records(&self) -> impl Iterator<Item = TicketRecord> + '_ {
        self.tickets.iter().map(|(requester_id, channel_id)| TicketRecord {
            requester_id: requester_id.clone(),
            channel_id: channel_id.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }
}
