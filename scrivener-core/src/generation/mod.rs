//! Document generation pipeline.
//!
//! Planner → human checkpoint → concurrent research workers → final-section
//! synthesis → compiler. [`GenerationEngine`] drives the stages over a
//! [`RunState`]; each stage also works standalone.

pub mod callback;
pub mod checkpoint;
pub mod compiler;
pub mod coordinator;
pub mod engine;
pub mod planner;
pub mod prompts;
pub mod state;
pub mod synthesizer;
pub mod worker;

pub use callback::{NoOpPipelineCallback, PipelineCallback, PipelineEvent, RecordingCallback};
pub use checkpoint::{
    AutoApprove, ChannelFeedback, CheckpointDecision, FeedbackChannel, FeedbackHandle,
    PendingReview, ReviewRequest, ScriptedFeedback, interpret_resume,
};
pub use compiler::{CompiledDocument, compile_document};
pub use coordinator::Coordinator;
pub use engine::GenerationEngine;
pub use planner::Planner;
pub use state::{RunPhase, RunState};
pub use synthesizer::{FinalSectionSynthesizer, format_sections};
pub use worker::{SectionWorker, WorkerState};

use crate::brain::Brain;
use crate::config::{SearchConfig, WorkflowConfig};
use crate::search::{SearchFederator, SearchQuery};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One named unit of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub description: String,
    /// Whether the section is researched (worker loop) or drafted from other sections.
    #[serde(alias = "research")]
    pub requires_research: bool,
    #[serde(default)]
    pub content: String,
}

impl Section {
    pub fn new(name: impl Into<String>, description: impl Into<String>, research: bool) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            requires_research: research,
            content: String::new(),
        }
    }
}

/// Grading outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    Pass,
    Fail,
}

/// Grading verdict for a drafted section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub grade: Grade,
    #[serde(default)]
    pub follow_up_queries: Vec<SearchQuery>,
}

impl Feedback {
    /// The verdict used when a grading answer cannot be parsed.
    pub fn degraded() -> Self {
        Self {
            grade: Grade::Fail,
            follow_up_queries: Vec::new(),
        }
    }

    /// Passing verdicts never carry follow-up queries.
    pub fn normalized(mut self) -> Self {
        if self.grade == Grade::Pass {
            self.follow_up_queries.clear();
        }
        self
    }

    pub fn passed(&self) -> bool {
        self.grade == Grade::Pass
    }
}

/// Structured answer of a query-generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryList {
    pub queries: Vec<SearchQuery>,
}

/// Structured answer of the planning call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionPlan {
    pub sections: Vec<Section>,
}

/// How a section reached completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionQuality {
    /// The grader passed the last draft.
    Passed,
    /// The search depth ran out while the grader still failed the draft.
    Forced,
    /// Drafted once from completed sections, no grading.
    Synthesized,
}

/// A finished section together with how it got there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedSection {
    pub section: Section,
    pub quality: SectionQuality,
    /// Follow-up rounds taken after the first search.
    pub search_iterations: u32,
}

impl CompletedSection {
    pub fn name(&self) -> &str {
        &self.section.name
    }
}

/// Shared collaborators handed to every stage.
#[derive(Clone)]
pub struct PipelineContext {
    /// Model for planning and grading.
    pub planner: Arc<Brain>,
    /// Model for query generation and drafting.
    pub writer: Arc<Brain>,
    pub federator: SearchFederator,
    pub search: SearchConfig,
    pub workflow: WorkflowConfig,
    pub callback: Arc<dyn PipelineCallback>,
}

impl PipelineContext {
    /// Generate `number_of_queries` queries with the writer model.
    pub(crate) async fn generate_queries(
        &self,
        system: String,
        user: String,
    ) -> Result<Vec<SearchQuery>, crate::error::LlmError> {
        let list: QueryList = self.writer.structured(system, user).await?;
        Ok(self.bound_queries(list.queries))
    }

    /// Drop blank queries and cap the rest at `number_of_queries`.
    pub(crate) fn bound_queries(&self, queries: Vec<SearchQuery>) -> Vec<SearchQuery> {
        queries
            .into_iter()
            .filter(|q| !q.search_query.trim().is_empty())
            .take(self.workflow.number_of_queries)
            .collect()
    }
}
