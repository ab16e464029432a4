// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Event page routes.
//!
//! Opening an event page re-validates the user's role, so navigation signals
//! need the event id out of the URL. Recognised shapes (hash or plain):
//!
//! - `/event/{id}`
//! - `/events/{id}`
//! - `/events/{id}/{section}`
//!
//! Query strings and trailing fragments are ignored. `/events/new` is the
//! creation page and carries no event id.

/// Segments under `/events/` that name a page rather than an event.
const RESERVED_IDS: &[&str] = &["new"];

/// An event page extracted from a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRoute {
    /// Event identifier.
    pub event_id: String,
    /// Sub-page such as `tasks` or `chat`, if any.
    pub section: Option<String>,
}

impl EventRoute {
    /// Parse a path or hash route. Returns `None` for non-event pages.
    pub fn parse(path: &str) -> Option<Self> {
        let path = path.trim().trim_start_matches('#');
        let path = path.split(['?', '#']).next().unwrap_or_default();

        let mut segments = path.split('/').filter(|s| !s.is_empty());
        match segments.next()? {
            "event" | "events" => {}
            _ => return None,
        }

        let event_id = segments.next()?;
        if RESERVED_IDS.contains(&event_id) {
            return None;
        }

        Some(Self {
            event_id: event_id.to_string(),
            section: segments.next().map(String::from),
        })
    }

    /// Hash route for this page, e.g. `#/events/abc/tasks`.
    pub fn to_hash(&self) -> String {
        match &self.section {
            Some(section) => format!("#/events/{}/{}", self.event_id, section),
            None => format!("#/events/{}", self.event_id),
        }
    }
}

/// Event id referenced by a path, if it is an event page.
pub fn event_id_from_path(path: &str) -> Option<String> {
    EventRoute::parse(path).map(|route| route.event_id)
}
