//! Collaborators shared by every per-server check.

use std::sync::Arc;

use tootwatch_state::{ServerRecord, StateStore};

use crate::clock::Clock;
use crate::error::{MonitorError, MonitorResult};
use crate::notify::Dispatcher;
use crate::probe::InstanceProbe;

/// Everything a per-server unit of work needs. Cheap to clone; each
/// fan-out task holds its own copy.
#[derive(Clone)]
pub struct CheckContext {
    pub state: StateStore,
    pub probe: Arc<dyn InstanceProbe>,
    pub dispatcher: Dispatcher,
    pub clock: Arc<dyn Clock>,
}

impl CheckContext {
    pub fn new(
        state: StateStore,
        probe: Arc<dyn InstanceProbe>,
        dispatcher: Dispatcher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state,
            probe,
            dispatcher,
            clock,
        }
    }

    /// Look up a server, treating a missing record as a vanished server.
    pub(crate) fn server(&self, domain: &str) -> MonitorResult<ServerRecord> {
        self.state
            .get_server(domain)?
            .ok_or_else(|| MonitorError::ServerVanished(domain.to_string()))
    }
}
