use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::app::AppContext;
use crate::pipeline::{Checkpoint, SessionSupervisor};
use crate::scheduler::CycleSchedule;
use crate::storage::EventRepository;

#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<SessionSupervisor>,
    pub events: Arc<dyn EventRepository>,
    /// Step-by-step cycles waiting for a decision, keyed by trace id.
    pub pending: Arc<Mutex<HashMap<String, Checkpoint>>>,
    pub schedule: Option<CycleSchedule>,
}

impl AppState {
    pub fn new(supervisor: Arc<SessionSupervisor>, events: Arc<dyn EventRepository>) -> Self {
        Self {
            supervisor,
            events,
            pending: Arc::new(Mutex::new(HashMap::new())),
            schedule: None,
        }
    }

    pub fn with_schedule(mut self, schedule: CycleSchedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn from_context(ctx: &AppContext) -> Self {
        Self::new(ctx.supervisor.clone(), ctx.events.clone())
    }
}
