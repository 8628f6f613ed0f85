use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::names;
use crate::domain::{ErrorEntry, ErrorKind, StateDelta, TriageState};
use crate::graph::{Node, NodeContext, NodeOutput};

/// Checks the ticket's required fields. A blank field is logged as an
/// intake error; the run carries on with whatever the ticket has.
#[derive(Debug, Default)]
pub struct IntakeNode;

#[async_trait]
impl Node for IntakeNode {
    fn name(&self) -> &str {
        names::INTAKE
    }

    async fn run(&self, state: Arc<TriageState>, _ctx: &NodeContext) -> NodeOutput {
        let ticket = state.ticket();
        let missing = ticket.missing_fields();
        if missing.is_empty() {
            info!(ticket_id = %ticket.id, title = %ticket.title, "ticket accepted");
            return StateDelta::empty().into();
        }

        warn!(ticket_id = %ticket.id, ?missing, "ticket is missing required fields");
        StateDelta::empty()
            .with_error(ErrorEntry::new(
                names::INTAKE,
                ErrorKind::Intake,
                format!("ticket missing required fields: {}", missing.join(", ")),
                state.retry().attempts(),
            ))
            .into()
    }
}
