//! Progress observer for pipeline stages.

use super::{CompletedSection, RunPhase, Section};
use std::sync::Mutex;
use uuid::Uuid;

/// Callback trait for progressive pipeline updates.
pub trait PipelineCallback: Send + Sync {
    /// Called when the run enters a new phase.
    fn on_phase_change(&self, run_id: Uuid, phase: RunPhase);
    /// Called when the planner produced a plan.
    fn on_plan_ready(&self, sections: &[Section]);
    /// Called when a research worker starts for a section.
    fn on_worker_spawned(&self, section: &str);
    /// Called after each federated search a worker performs (`round` starts at 1).
    fn on_search_iteration(&self, section: &str, round: u32, sources: usize);
    /// Called when any section reaches its terminal state.
    fn on_section_completed(&self, completed: &CompletedSection);
}

/// No-op callback.
pub struct NoOpPipelineCallback;

impl PipelineCallback for NoOpPipelineCallback {
    fn on_phase_change(&self, _run_id: Uuid, _phase: RunPhase) {}
    fn on_plan_ready(&self, _sections: &[Section]) {}
    fn on_worker_spawned(&self, _section: &str) {}
    fn on_search_iteration(&self, _section: &str, _round: u32, _sources: usize) {}
    fn on_section_completed(&self, _completed: &CompletedSection) {}
}

/// One observed pipeline event.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Phase(RunPhase),
    PlanReady(Vec<String>),
    WorkerSpawned(String),
    SearchIteration { section: String, round: u32 },
    SectionCompleted(CompletedSection),
}

/// Records every event, for assertions in tests.
#[derive(Default)]
pub struct RecordingCallback {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn phases(&self) -> Vec<RunPhase> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::Phase(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn spawned_workers(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::WorkerSpawned(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Search rounds observed for `section`.
    pub fn search_rounds(&self, section: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, PipelineEvent::SearchIteration { section: s, .. } if s == section))
            .count()
    }

    pub fn completed(&self) -> Vec<CompletedSection> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PipelineEvent::SectionCompleted(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: PipelineEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

impl PipelineCallback for RecordingCallback {
    fn on_phase_change(&self, _run_id: Uuid, phase: RunPhase) {
        self.push(PipelineEvent::Phase(phase));
    }

    fn on_plan_ready(&self, sections: &[Section]) {
        self.push(PipelineEvent::PlanReady(
            sections.iter().map(|s| s.name.clone()).collect(),
        ));
    }

    fn on_worker_spawned(&self, section: &str) {
        self.push(PipelineEvent::WorkerSpawned(section.to_string()));
    }

    fn on_search_iteration(&self, section: &str, round: u32, _sources: usize) {
        self.push(PipelineEvent::SearchIteration {
            section: section.to_string(),
            round,
        });
    }

    fn on_section_completed(&self, completed: &CompletedSection) {
        self.push(PipelineEvent::SectionCompleted(completed.clone()));
    }
}
