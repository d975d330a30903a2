//! Per-section research loop.
//!
//! `GenerateQueries → Search → Aggregate → Draft → Grade → {Done | GenerateQueries}`.
//! The loop is bounded: after `max_search_depth` follow-up rounds the section
//! is completed with its last draft even if the grader still fails it.

use super::{
    CompletedSection, Feedback, PipelineContext, Section, SectionQuality, prompts,
};
use crate::error::{LlmError, Result};
use crate::search::{SearchQuery, SourceRecord, dedupe_by_url, format_sources};
use tracing::{debug, info, warn};

/// Where a worker is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    GenerateQueries,
    Search,
    Aggregate,
    Draft,
    Grade,
    Done,
}

/// Drives one research section to completion.
pub struct SectionWorker<'a> {
    ctx: &'a PipelineContext,
    topic: &'a str,
    section: Section,
    state: WorkerState,
    queries: Vec<SearchQuery>,
    /// Every source seen across rounds, deduplicated by URL.
    sources: Vec<SourceRecord>,
    context: String,
    search_iterations: u32,
    rounds: u32,
    grades: u32,
    quality: Option<SectionQuality>,
}

impl<'a> SectionWorker<'a> {
    pub fn new(ctx: &'a PipelineContext, topic: &'a str, section: Section) -> Self {
        Self {
            ctx,
            topic,
            section,
            state: WorkerState::GenerateQueries,
            queries: Vec::new(),
            sources: Vec::new(),
            context: String::new(),
            search_iterations: 0,
            rounds: 0,
            grades: 0,
            quality: None,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Number of grade evaluations performed so far.
    pub fn grades(&self) -> u32 {
        self.grades
    }

    /// Run the loop until `Done`.
    pub async fn run(mut self) -> Result<CompletedSection> {
        self.ctx.callback.on_worker_spawned(&self.section.name);
        while self.state != WorkerState::Done {
            self.state = self.step().await?;
        }

        let quality = self.quality.unwrap_or(SectionQuality::Forced);
        let completed = CompletedSection {
            section: self.section,
            quality,
            search_iterations: self.search_iterations,
        };
        info!(
            section = %completed.section.name,
            quality = ?completed.quality,
            search_iterations = completed.search_iterations,
            grades = self.grades,
            "Section complete"
        );
        self.ctx.callback.on_section_completed(&completed);
        Ok(completed)
    }

    /// Execute the current state and return the next one.
    async fn step(&mut self) -> Result<WorkerState> {
        match self.state {
            WorkerState::GenerateQueries => {
                self.generate_queries().await?;
                Ok(WorkerState::Search)
            }
            WorkerState::Search => {
                self.search().await?;
                Ok(WorkerState::Aggregate)
            }
            WorkerState::Aggregate => {
                self.context = format_sources(
                    &self.sources,
                    self.ctx.search.max_tokens_per_source,
                    self.ctx.search.include_raw_content,
                );
                Ok(WorkerState::Draft)
            }
            WorkerState::Draft => {
                self.section.content = self
                    .ctx
                    .writer
                    .text(
                        prompts::SECTION_WRITER_INSTRUCTIONS,
                        prompts::section_writer(self.topic, &self.section, &self.context),
                    )
                    .await?;
                Ok(WorkerState::Grade)
            }
            WorkerState::Grade => {
                let feedback = self.grade().await?;
                Ok(self.transition(feedback))
            }
            WorkerState::Done => Ok(WorkerState::Done),
        }
    }

    async fn generate_queries(&mut self) -> Result<()> {
        if !self.queries.is_empty() {
            debug!(section = %self.section.name, queries = self.queries.len(), "Using follow-up queries");
            return Ok(());
        }
        self.queries = self
            .ctx
            .generate_queries(
                prompts::SECTION_QUERY_INSTRUCTIONS.to_string(),
                prompts::section_queries(
                    self.topic,
                    &self.section,
                    self.ctx.workflow.number_of_queries,
                ),
            )
            .await?;
        Ok(())
    }

    async fn search(&mut self) -> Result<()> {
        let queries: Vec<String> = self
            .queries
            .iter()
            .map(|q| q.search_query.clone())
            .collect();
        let results = self
            .ctx
            .federator
            .federate(&self.ctx.search.provider, &queries, &self.ctx.search.options)
            .await?;

        self.rounds += 1;
        let merged = std::mem::take(&mut self.sources)
            .into_iter()
            .chain(results.sources);
        self.sources = dedupe_by_url(merged);
        self.ctx
            .callback
            .on_search_iteration(&self.section.name, self.rounds, self.sources.len());
        Ok(())
    }

    /// Grade the draft. Unparsable verdicts degrade to `fail` with no follow-ups.
    async fn grade(&mut self) -> Result<Feedback> {
        self.grades += 1;
        let verdict = self
            .ctx
            .planner
            .structured::<Feedback>(
                prompts::SECTION_GRADER_INSTRUCTIONS,
                prompts::section_grader(
                    self.topic,
                    &self.section,
                    self.ctx.workflow.number_of_queries,
                ),
            )
            .await;
        match verdict {
            Ok(feedback) => Ok(feedback.normalized()),
            Err(LlmError::ResponseParse { message }) => {
                warn!(
                    section = %self.section.name,
                    error = %message,
                    "Unparsable grading verdict; treating as fail"
                );
                Ok(Feedback::degraded())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn transition(&mut self, feedback: Feedback) -> WorkerState {
        if feedback.passed() {
            self.quality = Some(SectionQuality::Passed);
            return WorkerState::Done;
        }
        if self.search_iterations >= self.ctx.workflow.max_search_depth {
            warn!(
                section = %self.section.name,
                search_iterations = self.search_iterations,
                "Search depth exhausted; completing section with its last draft"
            );
            self.quality = Some(SectionQuality::Forced);
            return WorkerState::Done;
        }
        self.search_iterations += 1;
        // An empty list here sends the next round back to query generation
        self.queries = self.ctx.bound_queries(feedback.follow_up_queries);
        WorkerState::GenerateQueries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::{Brain, MockLlmProvider};
    use crate::config::{SearchConfig, WorkflowConfig};
    use crate::generation::RecordingCallback;
    use crate::search::{MockSearchProvider, ProviderRegistry, SearchFederator};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Fixture {
        ctx: PipelineContext,
        llm: Arc<MockLlmProvider>,
        search: Arc<MockSearchProvider>,
        callback: Arc<RecordingCallback>,
    }

    fn fixture<F>(max_search_depth: u32, grader: F) -> Fixture
    where
        F: Fn(u32) -> String + Send + Sync + 'static,
    {
        let grades = AtomicU32::new(0);
        let llm = Arc::new(MockLlmProvider::with_responder(move |req| {
            let system = req.system_prompt().unwrap_or_default();
            let user = req.user_prompt().unwrap_or_default();
            if system == prompts::SECTION_QUERY_INSTRUCTIONS {
                Ok(r#"{"queries":[{"search_query":"q1"},{"search_query":"q2"},{"search_query":"q3"},{"search_query":"q4"}]}"#.to_string())
            } else if system == prompts::SECTION_WRITER_INSTRUCTIONS {
                let name = prompts::field(user, "Section name").unwrap_or_default();
                Ok(format!("## {name}\nDrafted."))
            } else if system == prompts::SECTION_GRADER_INSTRUCTIONS {
                Ok(grader(grades.fetch_add(1, Ordering::SeqCst) + 1))
            } else {
                Err(LlmError::ApiRequest {
                    message: "unexpected prompt".into(),
                })
            }
        }));
        let search = Arc::new(MockSearchProvider::new("mock"));
        let mut registry = ProviderRegistry::new();
        registry.register(search.clone()).unwrap();
        let callback = Arc::new(RecordingCallback::new());
        let brain = Arc::new(Brain::new(llm.clone()));
        let ctx = PipelineContext {
            planner: brain.clone(),
            writer: brain,
            federator: SearchFederator::new(Arc::new(registry)),
            search: SearchConfig {
                provider: "mock".into(),
                ..SearchConfig::default()
            },
            workflow: WorkflowConfig {
                number_of_queries: 3,
                max_search_depth,
                ..WorkflowConfig::default()
            },
            callback: callback.clone(),
        };
        Fixture {
            ctx,
            llm,
            search,
            callback,
        }
    }

    fn grader_calls(llm: &MockLlmProvider) -> usize {
        llm.requests()
            .iter()
            .filter(|r| r.system_prompt() == Some(prompts::SECTION_GRADER_INSTRUCTIONS))
            .count()
    }

    #[tokio::test]
    async fn test_pass_on_first_grade() {
        let fx = fixture(2, |_| r#"{"grade":"pass","follow_up_queries":[]}"#.to_string());
        let section = Section::new("Body", "Details", true);
        let done = SectionWorker::new(&fx.ctx, "topic", section)
            .run()
            .await
            .unwrap();

        assert_eq!(done.quality, SectionQuality::Passed);
        assert_eq!(done.search_iterations, 0);
        assert_eq!(done.section.content, "## Body\nDrafted.");
        assert_eq!(grader_calls(&fx.llm), 1);
        assert_eq!(fx.callback.search_rounds("Body"), 1);
        // number_of_queries caps the generated list
        assert_eq!(fx.search.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_always_fail_stops_at_depth() {
        for depth in 0..4u32 {
            let fx = fixture(depth, |n| {
                format!(r#"{{"grade":"fail","follow_up_queries":[{{"search_query":"follow {n}"}}]}}"#)
            });
            let done = SectionWorker::new(&fx.ctx, "topic", Section::new("S", "d", true))
                .run()
                .await
                .unwrap();
            assert_eq!(done.quality, SectionQuality::Forced);
            assert_eq!(done.search_iterations, depth);
            assert_eq!(grader_calls(&fx.llm), depth as usize + 1);
        }
    }

    #[tokio::test]
    async fn test_follow_up_queries_replace_generated_ones() {
        let fx = fixture(3, |n| {
            if n == 1 {
                r#"{"grade":"fail","follow_up_queries":[{"search_query":"deeper"}]}"#.to_string()
            } else {
                r#"{"grade":"pass"}"#.to_string()
            }
        });
        let done = SectionWorker::new(&fx.ctx, "topic", Section::new("S", "d", true))
            .run()
            .await
            .unwrap();
        assert_eq!(done.quality, SectionQuality::Passed);
        assert_eq!(done.search_iterations, 1);

        let queries: Vec<String> = fx.search.calls().into_iter().map(|(q, _)| q).collect();
        assert_eq!(queries, vec!["q1", "q2", "q3", "deeper"]);
        // Query generation ran once; the retry used the grader's follow-ups.
        let generated = fx
            .llm
            .requests()
            .iter()
            .filter(|r| r.system_prompt() == Some(prompts::SECTION_QUERY_INSTRUCTIONS))
            .count();
        assert_eq!(generated, 1);
    }

    #[tokio::test]
    async fn test_follow_up_queries_are_capped_and_blank_ones_dropped() {
        let fx = fixture(1, |n| {
            if n == 1 {
                let mut queries: Vec<String> = (1..=10)
                    .map(|i| format!(r#"{{"search_query":"follow {i}"}}"#))
                    .collect();
                queries.insert(0, r#"{"search_query":"  "}"#.to_string());
                format!(r#"{{"grade":"fail","follow_up_queries":[{}]}}"#, queries.join(","))
            } else {
                r#"{"grade":"pass"}"#.to_string()
            }
        });
        let done = SectionWorker::new(&fx.ctx, "topic", Section::new("S", "d", true))
            .run()
            .await
            .unwrap();
        assert_eq!(done.quality, SectionQuality::Passed);

        let queries: Vec<String> = fx.search.calls().into_iter().map(|(q, _)| q).collect();
        assert_eq!(
            queries,
            vec!["q1", "q2", "q3", "follow 1", "follow 2", "follow 3"]
        );
    }

    #[tokio::test]
    async fn test_blank_follow_ups_fall_back_to_generation() {
        let fx = fixture(1, |n| {
            if n == 1 {
                r#"{"grade":"fail","follow_up_queries":[{"search_query":""},{"search_query":" "}]}"#
                    .to_string()
            } else {
                r#"{"grade":"pass"}"#.to_string()
            }
        });
        SectionWorker::new(&fx.ctx, "topic", Section::new("S", "d", true))
            .run()
            .await
            .unwrap();

        let queries: Vec<String> = fx.search.calls().into_iter().map(|(q, _)| q).collect();
        assert_eq!(queries, vec!["q1", "q2", "q3", "q1", "q2", "q3"]);
    }

    #[tokio::test]
    async fn test_unparsable_grade_degrades_to_fail() {
        let fx = fixture(1, |_| "looks fine to me".to_string());
        let done = SectionWorker::new(&fx.ctx, "topic", Section::new("S", "d", true))
            .run()
            .await
            .unwrap();
        assert_eq!(done.quality, SectionQuality::Forced);
        assert_eq!(grader_calls(&fx.llm), 2);
        // No follow-ups, so fresh queries were generated for the retry.
        assert_eq!(fx.search.calls().len(), 6);
    }

    #[tokio::test]
    async fn test_redraft_sees_previous_draft() {
        let fx = fixture(1, |n| {
            if n == 1 {
                r#"{"grade":"fail","follow_up_queries":[{"search_query":"more"}]}"#.to_string()
            } else {
                r#"{"grade":"pass"}"#.to_string()
            }
        });
        SectionWorker::new(&fx.ctx, "topic", Section::new("S", "d", true))
            .run()
            .await
            .unwrap();
        let drafts: Vec<String> = fx
            .llm
            .requests()
            .iter()
            .filter(|r| r.system_prompt() == Some(prompts::SECTION_WRITER_INSTRUCTIONS))
            .map(|r| r.user_prompt().unwrap_or_default().to_string())
            .collect();
        assert_eq!(drafts.len(), 2);
        assert!(drafts[0].contains("Existing draft:\n(none)"));
        assert!(drafts[1].contains("Existing draft:\n## S\nDrafted."));
        // Sources from both rounds are in the second draft's context.
        assert!(drafts[1].contains("q=q1"));
        assert!(drafts[1].contains("q=more"));
    }
}
