//! Run state with phase tracking and snapshot persistence.
//!
//! A [`RunState`] is created when a topic is submitted, mutated by each
//! stage, and terminal once `final_document` is set. Snapshots can be saved
//! while the run waits at the checkpoint and loaded later to resume.

use super::{CompletedSection, Section};
use crate::error::Result;
use crate::persistence::{atomic_write_json, load_all_json, load_json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Current phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Planning,
    /// Suspended at the human checkpoint.
    AwaitingFeedback,
    Researching,
    Synthesizing,
    Compiling,
    Complete,
    Failed,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunPhase::Planning => "planning",
            RunPhase::AwaitingFeedback => "awaiting_feedback",
            RunPhase::Researching => "researching",
            RunPhase::Synthesizing => "synthesizing",
            RunPhase::Compiling => "compiling",
            RunPhase::Complete => "complete",
            RunPhase::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Everything known about one generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub id: Uuid,
    pub topic: String,
    /// Reviewer feedback carried into the latest (re)plan.
    pub feedback_on_plan: Option<String>,
    /// Planned sections in document order.
    pub sections: Vec<Section>,
    /// One entry per finished section, in completion order.
    pub completed_sections: Vec<CompletedSection>,
    pub final_document: Option<String>,
    pub phase: RunPhase,
    /// How many plans have been produced for this run.
    pub plan_revisions: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(topic: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            feedback_on_plan: None,
            sections: Vec::new(),
            completed_sections: Vec::new(),
            final_document: None,
            phase: RunPhase::Planning,
            plan_revisions: 0,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition(&mut self, phase: RunPhase) {
        self.phase = phase;
        self.updated_at = Utc::now();
    }

    /// Install a freshly produced plan, replacing any previous one.
    pub fn set_plan(&mut self, sections: Vec<Section>) {
        self.sections = sections;
        self.completed_sections.clear();
        self.plan_revisions += 1;
        self.transition(RunPhase::AwaitingFeedback);
    }

    /// Discard the current plan and record the reviewer's feedback.
    ///
    /// The topic is preserved; `sections` and `completed_sections` start empty.
    pub fn replan(&mut self, feedback: impl Into<String>) {
        self.feedback_on_plan = Some(feedback.into());
        self.sections = Vec::new();
        self.completed_sections = Vec::new();
        self.final_document = None;
        self.transition(RunPhase::Planning);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.transition(RunPhase::Failed);
    }

    pub fn is_complete(&self) -> bool {
        self.phase == RunPhase::Complete && self.final_document.is_some()
    }

    /// Whether `name` already has a completed entry.
    pub fn is_completed(&self, name: &str) -> bool {
        self.completed_sections.iter().any(|c| c.name() == name)
    }

    /// Planned sections without a completed entry, in plan order.
    pub fn pending_sections(&self) -> Vec<&Section> {
        self.sections
            .iter()
            .filter(|s| !self.is_completed(&s.name))
            .collect()
    }

    fn snapshot_path(base_dir: &Path, id: &Uuid) -> PathBuf {
        base_dir.join("runs").join(format!("{id}.json"))
    }

    /// Persist a snapshot under `<base_dir>/runs/<id>.json`.
    pub fn save(&self, base_dir: &Path) -> Result<PathBuf> {
        let path = Self::snapshot_path(base_dir, &self.id);
        atomic_write_json(&path, self)?;
        Ok(path)
    }

    /// Load a snapshot. Returns `Ok(None)` when no snapshot exists for `id`.
    pub fn load(base_dir: &Path, id: &Uuid) -> Result<Option<Self>> {
        load_json(&Self::snapshot_path(base_dir, id))
    }

    /// All saved runs, most recently updated first.
    pub fn list(base_dir: &Path) -> Vec<Self> {
        let mut runs: Vec<Self> = load_all_json(&base_dir.join("runs"));
        runs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        runs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::SectionQuality;

    fn plan() -> Vec<Section> {
        vec![
            Section::new("Intro", "Overview", false),
            Section::new("Body", "Details", true),
        ]
    }

    #[test]
    fn test_new_run() {
        let state = RunState::new("골밀도");
        assert_eq!(state.phase, RunPhase::Planning);
        assert!(state.sections.is_empty());
        assert!(!state.is_complete());
    }

    #[test]
    fn test_set_plan_awaits_feedback() {
        let mut state = RunState::new("topic");
        state.set_plan(plan());
        assert_eq!(state.phase, RunPhase::AwaitingFeedback);
        assert_eq!(state.plan_revisions, 1);
        assert_eq!(state.pending_sections().len(), 2);
    }

    #[test]
    fn test_replan_resets_sections_and_keeps_topic() {
        let mut state = RunState::new("topic");
        state.set_plan(plan());
        state.completed_sections.push(CompletedSection {
            section: Section::new("Body", "Details", true),
            quality: SectionQuality::Passed,
            search_iterations: 0,
        });

        state.replan("Add a history section");
        assert_eq!(state.topic, "topic");
        assert!(state.sections.is_empty());
        assert!(state.completed_sections.is_empty());
        assert_eq!(state.feedback_on_plan.as_deref(), Some("Add a history section"));
        assert_eq!(state.phase, RunPhase::Planning);
    }

    #[test]
    fn test_fail_records_error() {
        let mut state = RunState::new("topic");
        state.fail("planner exploded");
        assert_eq!(state.phase, RunPhase::Failed);
        assert_eq!(state.error.as_deref(), Some("planner exploded"));
    }

    #[test]
    fn test_save_load_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = RunState::new("골밀도");
        state.set_plan(plan());
        let path = state.save(dir.path()).unwrap();
        assert!(path.ends_with(format!("runs/{}.json", state.id)));

        let loaded = RunState::load(dir.path(), &state.id).unwrap().unwrap();
        assert_eq!(loaded, state);

        let other = RunState::new("second");
        other.save(dir.path()).unwrap();
        let runs = RunState::list(dir.path());
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].topic, "second");
    }

    #[test]
    fn test_load_unknown_id() {
        let dir = tempfile::tempdir().unwrap();
        assert!(
            RunState::load(dir.path(), &Uuid::new_v4())
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(RunPhase::AwaitingFeedback.to_string(), "awaiting_feedback");
        let json = serde_json::to_string(&RunPhase::AwaitingFeedback).unwrap();
        assert_eq!(json, "\"awaiting_feedback\"");
    }
}
