//! Start/stop ordering for co-located endpoints

use std::sync::Arc;

use tracing::{debug, info};

/// Whether a component's background work is active
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LifecycleState {
    #[default]
    Stopped,
    Running,
}

/// A component that can be started and stopped
///
/// Both transitions are idempotent.
pub trait Lifecycle: Send + Sync {
    fn name(&self) -> &str;

    /// Lower phases start first and stop last
    fn phase(&self) -> i32 {
        0
    }

    fn start(&self);

    fn stop(&self);

    fn is_running(&self) -> bool;

    fn state(&self) -> LifecycleState {
        if self.is_running() {
            LifecycleState::Running
        } else {
            LifecycleState::Stopped
        }
    }
}

/// Starts members by ascending phase and stops them by descending phase
#[derive(Default)]
pub struct LifecycleGroup {
    members: Vec<Arc<dyn Lifecycle>>,
}

impl LifecycleGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, member: Arc<dyn Lifecycle>) {
        debug!(name = %member.name(), phase = member.phase(), "LifecycleGroup::add: called");
        self.members.push(member);
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn start_all(&self) {
        for member in self.ordered() {
            info!(name = %member.name(), phase = member.phase(), "Starting");
            member.start();
        }
    }

    pub fn stop_all(&self) {
        for member in self.ordered().into_iter().rev() {
            info!(name = %member.name(), phase = member.phase(), "Stopping");
            member.stop();
        }
    }

    /// Members sorted by phase; equal phases keep insertion order
    fn ordered(&self) -> Vec<&Arc<dyn Lifecycle>> {
        let mut members: Vec<_> = self.members.iter().collect();
        members.sort_by_key(|m| m.phase());
        members
    }
}
