//! Drafting of sections that build on already completed sections.

use super::{CompletedSection, PipelineContext, Section, SectionQuality, prompts};
use crate::error::Result;
use std::fmt::Write;
use tracing::info;

/// Render sections as context for the final-section writer.
pub fn format_sections<'s>(sections: impl IntoIterator<Item = &'s Section>) -> String {
    let rule = "=".repeat(60);
    let mut out = String::new();
    for (idx, section) in sections.into_iter().enumerate() {
        let content = if section.content.is_empty() {
            "[Not yet written]"
        } else {
            section.content.as_str()
        };
        let _ = write!(
            out,
            "\n{rule}\nSection {}: {}\n{rule}\nDescription:\n{}\nRequires Research: \n{}\n\nContent:\n{content}\n\n",
            idx + 1,
            section.name,
            section.description,
            section.requires_research,
        );
    }
    out
}

/// Single-shot writer for non-research sections. No grading, no retries.
pub struct FinalSectionSynthesizer<'a> {
    ctx: &'a PipelineContext,
}

impl<'a> FinalSectionSynthesizer<'a> {
    pub fn new(ctx: &'a PipelineContext) -> Self {
        Self { ctx }
    }

    /// Draft `section` from `context` (the rendered completed sections).
    pub async fn synthesize(
        &self,
        topic: &str,
        mut section: Section,
        context: &str,
    ) -> Result<CompletedSection> {
        section.content = self
            .ctx
            .writer
            .text(
                prompts::FINAL_SECTION_INSTRUCTIONS,
                prompts::final_section(topic, &section, context),
            )
            .await?;
        info!(section = %section.name, chars = section.content.len(), "Final section written");

        let completed = CompletedSection {
            section,
            quality: SectionQuality::Synthesized,
            search_iterations: 0,
        };
        self.ctx.callback.on_section_completed(&completed);
        Ok(completed)
    }
}
