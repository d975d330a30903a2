//! Fan-out/fan-in over sections.
//!
//! Each eligible section gets its own future; all of them are joined before
//! the coordinator returns. Results come back per task and are merged here,
//! so no worker touches shared state.

use super::{
    CompletedSection, FinalSectionSynthesizer, PipelineContext, Section, SectionWorker,
    format_sections,
};
use crate::error::Result;
use std::collections::HashSet;
use tracing::info;

pub struct Coordinator<'a> {
    ctx: &'a PipelineContext,
}

impl<'a> Coordinator<'a> {
    pub fn new(ctx: &'a PipelineContext) -> Self {
        Self { ctx }
    }

    /// Run one worker per research section concurrently and join them all.
    ///
    /// Sections already present in `completed` are skipped. The returned
    /// entries are in completion order.
    pub async fn research(
        &self,
        topic: &str,
        sections: &[Section],
        completed: &[CompletedSection],
    ) -> Result<Vec<CompletedSection>> {
        let done: HashSet<&str> = completed.iter().map(|c| c.name()).collect();
        let eligible: Vec<&Section> = sections
            .iter()
            .filter(|s| s.requires_research && !done.contains(s.name.as_str()))
            .collect();
        info!(workers = eligible.len(), "Spawning section workers");

        let tasks = eligible
            .into_iter()
            .map(|section| SectionWorker::new(self.ctx, topic, section.clone()).run());
        join_in_completion_order(tasks).await
    }

    /// Draft every remaining planned section from the completed ones, concurrently.
    pub async fn synthesize(
        &self,
        topic: &str,
        sections: &[Section],
        completed: &[CompletedSection],
    ) -> Result<Vec<CompletedSection>> {
        let done: HashSet<&str> = completed.iter().map(|c| c.name()).collect();

        // Context lists completed sections in plan order
        let finished: Vec<&Section> = sections
            .iter()
            .filter_map(|planned| {
                completed
                    .iter()
                    .find(|c| c.name() == planned.name)
                    .map(|c| &c.section)
            })
            .collect();
        let context = format_sections(finished);

        let remaining: Vec<&Section> = sections
            .iter()
            .filter(|s| !done.contains(s.name.as_str()))
            .collect();
        info!(sections = remaining.len(), "Writing final sections");

        let synthesizer = FinalSectionSynthesizer::new(self.ctx);
        let context = context.as_str();
        let synthesizer = &synthesizer;
        let tasks = remaining
            .into_iter()
            .map(|section| synthesizer.synthesize(topic, section.clone(), context));
        join_in_completion_order(tasks).await
    }
}

/// Await all futures; return results in the order they finished.
///
/// Every future runs to completion even if another fails; the first error
/// (by completion) is returned after the join.
async fn join_in_completion_order<F>(tasks: impl IntoIterator<Item = F>) -> Result<Vec<CompletedSection>>
where
    F: std::future::Future<Output = Result<CompletedSection>>,
{
    use futures::StreamExt;

    let mut pending: futures::stream::FuturesUnordered<F> = tasks.into_iter().collect();
    let mut finished = Vec::new();
    let mut first_error = None;
    while let Some(result) = pending.next().await {
        match result {
            Ok(section) => finished.push(section),
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(finished),
    }
}
