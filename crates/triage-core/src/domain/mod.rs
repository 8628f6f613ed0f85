//! Domain model: tickets, classifications, fetched evidence, correlation,
//! recommendations, and the shared run state.

pub mod classification;
pub mod correlation;
pub mod fetch;
pub mod recommendation;
pub mod retry;
pub mod state;
pub mod ticket;

pub use classification::{Classification, IssueCategory, SearchTargets, UnknownCategory};
pub use correlation::{CorrelationResult, CorrelationVerdict, RecurringPattern};
pub use fetch::{FetchResult, FetchResults, FetchedItem, ItemRef, Source, TimeWindow};
pub use recommendation::{Disposition, NextAction, Recommendation, RecommendationDraft};
pub use retry::RetryState;
pub use state::{
    ErrorEntry, ErrorKind, FetchHealth, RetryUpdate, RouteRecord, StateDelta, TriageState,
    Verification,
};
pub use ticket::{Ticket, TicketMetadata};
