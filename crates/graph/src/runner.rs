//! The graph runner: executes nodes one at a time until the graph ends.

use async_trait::async_trait;
use chatmesh_config::ChatbotMode;
use chatmesh_core::{CancelToken, Error, EventBus, TurnEvent};
use tracing::{debug, info};

use crate::node::{Node, route};
use crate::state::{ConversationState, StateUpdate};

/// Runs a single node against the current state.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(&self, node: Node, state: &ConversationState) -> Result<StateUpdate, Error>;
}

pub struct GraphRunner {
    mode: ChatbotMode,
    recursion_limit: usize,
    events: Option<EventBus>,
}

impl GraphRunner {
    pub fn new(mode: ChatbotMode, recursion_limit: usize) -> Self {
        Self {
            mode,
            recursion_limit,
            events: None,
        }
    }

    /// Publish every trace entry as it is produced.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Run from the entry node to the end, merging each node's update into
    /// `state`.
    ///
    /// On error `state` keeps everything merged so far. Cancellation is
    /// checked before each node; a node already running is not interrupted.
    pub async fn run(
        &self,
        executor: &dyn NodeExecutor,
        state: &mut ConversationState,
        cancel: &CancelToken,
    ) -> Result<(), Error> {
        let mut next = Some(Node::ENTRY);
        let mut steps = 0usize;

        while let Some(node) = next {
            if cancel.is_cancelled() {
                info!(node = %node, "Turn cancelled");
                return Err(Error::Cancelled {
                    node: node.to_string(),
                });
            }

            steps += 1;
            if steps > self.recursion_limit {
                return Err(Error::RecursionLimitExceeded {
                    limit: self.recursion_limit,
                });
            }

            debug!(node = %node, step = steps, "Entering node");
            let update = executor.execute(node, state).await?;

            if let Some(events) = &self.events {
                for markdown in &update.trace {
                    events.publish(TurnEvent::trace(markdown.clone()));
                }
            }
            state.apply(update);

            let edge = route(node, state, self.mode);
            info!(node = %node, route = %edge.label, "Node finished");
            next = edge.next;
        }

        Ok(())
    }
}
