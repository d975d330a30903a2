//! Section planning: background search followed by a structured outline call.

use super::{PipelineContext, Section, SectionPlan, prompts};
use crate::error::{LlmError, PlanError, Result};
use crate::search::format_sources;
use std::collections::HashSet;
use tracing::{debug, info};

/// Token budget per source when building planning context.
const PLANNING_TOKENS_PER_SOURCE: usize = 1000;

/// Produces the ordered section list for a topic.
pub struct Planner<'a> {
    ctx: &'a PipelineContext,
}

impl<'a> Planner<'a> {
    pub fn new(ctx: &'a PipelineContext) -> Self {
        Self { ctx }
    }

    /// Plan the document for `topic`, optionally addressing reviewer feedback.
    ///
    /// Fails with [`PlanError`] when the outline cannot be parsed, is empty, or
    /// repeats a section name. There is no fallback plan.
    pub async fn plan(&self, topic: &str, feedback: Option<&str>) -> Result<Vec<Section>> {
        let workflow = &self.ctx.workflow;

        let queries = self
            .ctx
            .generate_queries(
                prompts::PLAN_QUERY_INSTRUCTIONS.to_string(),
                prompts::plan_queries(
                    topic,
                    &workflow.document_structure,
                    feedback,
                    workflow.number_of_queries,
                ),
            )
            .await?;
        debug!(topic, queries = queries.len(), "Generated planning queries");

        let query_strings: Vec<String> = queries.into_iter().map(|q| q.search_query).collect();
        let results = self
            .ctx
            .federator
            .federate(
                &self.ctx.search.provider,
                &query_strings,
                &self.ctx.search.options,
            )
            .await?;
        let context = format_sources(&results.sources, PLANNING_TOKENS_PER_SOURCE, false);

        let plan: SectionPlan = self
            .ctx
            .planner
            .structured(
                prompts::PLANNER_INSTRUCTIONS,
                prompts::planner(topic, &workflow.document_structure, &context, feedback),
            )
            .await
            .map_err(|e| match e {
                LlmError::ResponseParse { message } => PlanError::Malformed { message }.into(),
                other => crate::error::ScrivenerError::from(other),
            })?;

        let sections = validate_plan(plan.sections)?;
        info!(
            topic,
            sections = sections.len(),
            research = sections.iter().filter(|s| s.requires_research).count(),
            "Plan ready"
        );
        Ok(sections)
    }
}

/// Check the outline and reset any content the model put in it.
pub fn validate_plan(sections: Vec<Section>) -> std::result::Result<Vec<Section>, PlanError> {
    if sections.is_empty() {
        return Err(PlanError::Empty);
    }

    let mut seen = HashSet::new();
    let mut validated = Vec::with_capacity(sections.len());
    for mut section in sections {
        let name = section.name.trim().to_string();
        if name.is_empty() {
            return Err(PlanError::Malformed {
                message: "section without a name".to_string(),
            });
        }
        if !seen.insert(name.clone()) {
            return Err(PlanError::DuplicateSection { name });
        }
        section.name = name;
        section.content.clear();
        validated.push(section);
    }
    Ok(validated)
}
