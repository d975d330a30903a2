//! Generation engine: drives a [`RunState`] through every stage.
//!
//! Stages can be called one by one (`plan`, `review`/`resume`,
//! `write_sections`, `compile`) or all at once with `run`.

use super::{
    CheckpointDecision, CompletedSection, Coordinator, FeedbackChannel, NoOpPipelineCallback,
    PendingReview, PipelineCallback, PipelineContext, Planner, RunPhase, RunState,
    compile_document, interpret_resume,
};
use crate::brain::{Brain, LlmProvider};
use crate::config::GenerationConfig;
use crate::error::{CheckpointError, Result, ScrivenerError};
use crate::providers::create_provider;
use crate::search::{ProviderRegistry, SearchFederator};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Orchestrates planning, review, research, synthesis and compilation.
pub struct GenerationEngine {
    ctx: PipelineContext,
    state_dir: Option<PathBuf>,
}

impl GenerationEngine {
    /// Build an engine from config, one provider per model role, and a search registry.
    pub fn new(
        config: &GenerationConfig,
        planner: Arc<dyn LlmProvider>,
        writer: Arc<dyn LlmProvider>,
        registry: Arc<ProviderRegistry>,
    ) -> Self {
        Self {
            ctx: PipelineContext {
                planner: Arc::new(Brain::new(planner)),
                writer: Arc::new(Brain::new(writer)),
                federator: SearchFederator::new(registry),
                search: config.search.clone(),
                workflow: config.workflow.clone(),
                callback: Arc::new(NoOpPipelineCallback),
            },
            state_dir: None,
        }
    }

    /// Validate `config` and build both model providers from it.
    pub fn from_config(config: &GenerationConfig, registry: Arc<ProviderRegistry>) -> Result<Self> {
        config.validate()?;
        let planner = create_provider(&config.planner)?;
        let writer = create_provider(&config.writer)?;
        info!(
            planner = planner.model_name(),
            writer = writer.model_name(),
            search = %config.search.provider,
            "Engine configured"
        );
        Ok(Self::new(config, planner, writer, registry))
    }

    pub fn with_callback(mut self, callback: Arc<dyn PipelineCallback>) -> Self {
        self.ctx.callback = callback;
        self
    }

    /// Save a snapshot of the run under `dir` whenever it changes phase.
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Create a run for `topic` and produce its first plan.
    pub async fn plan(&self, topic: &str) -> Result<RunState> {
        let mut state = RunState::new(topic);
        info!(run_id = %state.id, topic, "Starting run");
        self.announce(&state);
        self.plan_into(&mut state).await?;
        Ok(state)
    }

    async fn plan_into(&self, state: &mut RunState) -> Result<()> {
        let sections = Planner::new(&self.ctx)
            .plan(&state.topic, state.feedback_on_plan.as_deref())
            .await?;
        self.ctx.callback.on_plan_ready(&sections);
        state.set_plan(sections);
        self.announce(state);
        Ok(())
    }

    /// Present the plan on `channel` and apply the answer.
    pub async fn review(
        &self,
        state: &mut RunState,
        channel: &dyn FeedbackChannel,
    ) -> Result<CheckpointDecision> {
        Self::ensure_awaiting(state)?;
        info!(run_id = %state.id, sections = state.sections.len(), "Awaiting plan review");
        let value = channel
            .request_feedback(PendingReview::new(state.id, &state.sections))
            .await?;
        self.resume(state, value).await
    }

    /// Apply a resume value to a run suspended at the checkpoint.
    ///
    /// `true` approves the plan; a string discards it and plans again with the
    /// string as feedback, leaving the run awaiting review of the new plan.
    /// An unsupported value or a failed re-plan marks the run failed.
    pub async fn resume(&self, state: &mut RunState, value: Value) -> Result<CheckpointDecision> {
        Self::ensure_awaiting(state)?;
        let outcome = self.apply_resume(state, &value).await;
        if let Err(e) = &outcome {
            self.abort(state, e);
        }
        outcome
    }

    async fn apply_resume(&self, state: &mut RunState, value: &Value) -> Result<CheckpointDecision> {
        let decision = interpret_resume(value)?;
        match &decision {
            CheckpointDecision::Approve => {
                info!(run_id = %state.id, "Plan approved");
                self.enter(state, RunPhase::Researching);
            }
            CheckpointDecision::Replan(feedback) => {
                info!(run_id = %state.id, feedback = %feedback, "Re-planning with feedback");
                state.replan(feedback.clone());
                self.announce(state);
                self.plan_into(state).await?;
            }
        }
        Ok(decision)
    }

    /// Research every research section, then synthesize the rest.
    ///
    /// On return, `completed_sections` holds exactly one entry per planned section.
    /// Refused before approval and once the run is complete or failed. A
    /// fatal error while writing marks the run failed.
    pub async fn write_sections(&self, state: &mut RunState) -> Result<()> {
        match state.phase {
            RunPhase::Planning | RunPhase::AwaitingFeedback => {
                return Err(CheckpointError::NotApproved {
                    phase: state.phase.to_string(),
                }
                .into());
            }
            RunPhase::Complete | RunPhase::Failed => {
                return Err(CheckpointError::RunFinished {
                    phase: state.phase.to_string(),
                }
                .into());
            }
            _ => {}
        }
        let outcome = self.fan_out(state).await;
        if let Err(e) = &outcome {
            self.abort(state, e);
        }
        outcome
    }

    async fn fan_out(&self, state: &mut RunState) -> Result<()> {
        let coordinator = Coordinator::new(&self.ctx);

        self.enter(state, RunPhase::Researching);
        let researched = coordinator
            .research(&state.topic, &state.sections, &state.completed_sections)
            .await?;
        self.append(state, researched);

        self.enter(state, RunPhase::Synthesizing);
        let synthesized = coordinator
            .synthesize(&state.topic, &state.sections, &state.completed_sections)
            .await?;
        self.append(state, synthesized);
        Ok(())
    }

    /// Join completed sections in plan order into the final document.
    pub fn compile(&self, state: &mut RunState) -> Result<String> {
        self.enter(state, RunPhase::Compiling);
        let document = compile_document(&state.sections, &state.completed_sections)?;
        state.sections = document.sections;
        state.final_document = Some(document.text.clone());
        self.enter(state, RunPhase::Complete);
        info!(run_id = %state.id, chars = document.text.len(), "Document compiled");
        Ok(document.text)
    }

    /// Plan, review until approved, write every section and compile.
    ///
    /// A fatal error marks the run failed and is returned; no partial
    /// document is produced.
    pub async fn run(&self, topic: &str, channel: &dyn FeedbackChannel) -> Result<RunState> {
        let mut state = RunState::new(topic);
        info!(run_id = %state.id, topic, "Starting run");
        match self.drive(&mut state, channel).await {
            Ok(()) => Ok(state),
            Err(e) => {
                self.abort(&mut state, &e);
                Err(e)
            }
        }
    }

    async fn drive(&self, state: &mut RunState, channel: &dyn FeedbackChannel) -> Result<()> {
        self.announce(state);
        self.plan_into(state).await?;
        while self.review(state, channel).await? != CheckpointDecision::Approve {}
        self.write_sections(state).await?;
        self.compile(state)?;
        Ok(())
    }

    fn ensure_awaiting(state: &RunState) -> std::result::Result<(), CheckpointError> {
        if state.phase != RunPhase::AwaitingFeedback {
            return Err(CheckpointError::NotAwaitingFeedback {
                phase: state.phase.to_string(),
            });
        }
        Ok(())
    }

    /// Mark the run failed once, however many layers report the error.
    fn abort(&self, state: &mut RunState, error: &ScrivenerError) {
        if state.phase == RunPhase::Failed {
            return;
        }
        warn!(run_id = %state.id, error = %error, "Run failed");
        state.fail(error.to_string());
        self.announce(state);
    }

    fn append(&self, state: &mut RunState, sections: Vec<CompletedSection>) {
        for completed in sections {
            if state.is_completed(completed.name()) {
                warn!(section = %completed.name(), "Ignoring duplicate completion");
                continue;
            }
            state.completed_sections.push(completed);
        }
        state.updated_at = chrono::Utc::now();
    }

    /// Move to `phase`, notifying only on an actual change.
    fn enter(&self, state: &mut RunState, phase: RunPhase) {
        if state.phase != phase {
            state.transition(phase);
            self.ctx.callback.on_phase_change(state.id, phase);
        }
        self.persist(state);
    }

    /// Report the current phase and snapshot it.
    fn announce(&self, state: &RunState) {
        self.ctx.callback.on_phase_change(state.id, state.phase);
        self.persist(state);
    }

    fn persist(&self, state: &RunState) {
        if let Some(dir) = &self.state_dir
            && let Err(e) = state.save(dir)
        {
            warn!(run_id = %state.id, error = %e, "Failed to save run snapshot");
        }
    }
}
