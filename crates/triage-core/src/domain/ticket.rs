//! The incoming support ticket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Optional descriptive metadata carried with a ticket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketMetadata {
    /// Product area the reporter or inbox routing suggested, if any.
    pub product_area: Option<String>,
    /// Reporter identity (usually an email address).
    pub reporter: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A support ticket as received at intake.
///
/// Never mutated after the run starts; nodes only ever see it through a
/// shared snapshot of the state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub title: String,
    pub body: String,
    /// When the ticket was opened. Upper bound of every fetch window.
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: TicketMetadata,
}

impl Ticket {
    /// Create a ticket with empty metadata.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            created_at,
            metadata: TicketMetadata::default(),
        }
    }

    /// Attach metadata, builder style.
    pub fn with_metadata(mut self, metadata: TicketMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Title and body joined the way reasoning prompts consume them.
    pub fn text(&self) -> String {
        format!("{}\n\n{}", self.title, self.body)
    }

    /// Names of required fields that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.id.trim().is_empty() {
            missing.push("id");
        }
        if self.title.trim().is_empty() {
            missing.push("title");
        }
        if self.body.trim().is_empty() {
            missing.push("body");
        }
        missing
    }
}
