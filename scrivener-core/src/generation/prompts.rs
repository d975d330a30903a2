//! Prompt construction for each LLM stage.
//!
//! Instructions go in the system message; topic, section and source data go
//! in the user message as `Label: value` lines.

use super::Section;

pub const PLAN_QUERY_INSTRUCTIONS: &str = "\
You write web search queries that gather background for planning a document.

The queries should cover the topic broadly enough to decide which sections the \
document needs, following the requested organisation.

Respond with a single JSON object: {\"queries\": [{\"search_query\": \"...\"}]}";

pub const PLANNER_INSTRUCTIONS: &str = "\
You plan the section outline of a document.

Use the background research and the requested organisation. Sections must not \
overlap. Mark a section as requiring research when it needs facts gathered from \
the web; introductions and conclusions draw on the other sections instead. \
If reviewer feedback is given, the new outline must address it.

Respond with a single JSON object: \
{\"sections\": [{\"name\": \"...\", \"description\": \"...\", \"requires_research\": true, \"content\": \"\"}]}";

pub const SECTION_QUERY_INSTRUCTIONS: &str = "\
You write web search queries for one section of a document.

Cover distinct aspects of the section topic: facts, recent data and concrete examples.

Respond with a single JSON object: {\"queries\": [{\"search_query\": \"...\"}]}";

pub const SECTION_WRITER_INSTRUCTIONS: &str = "\
You draft one section of a document from the provided sources.

Rewrite the whole section; if an existing draft is given, improve it with the \
new sources rather than appending to it. Write in markdown, start with a `## ` \
heading carrying the section name, and cite the sources you rely on.";

pub const SECTION_GRADER_INSTRUCTIONS: &str = "\
You review a drafted section of a document against its topic.

Grade `pass` when the section covers its topic accurately and in enough depth. \
Otherwise grade `fail` and propose follow-up web search queries that would fill \
the gaps.

Respond with a single JSON object: \
{\"grade\": \"pass\" | \"fail\", \"follow_up_queries\": [{\"search_query\": \"...\"}]}";

pub const FINAL_SECTION_INSTRUCTIONS: &str = "\
You write a section that draws on the rest of an already researched document, \
such as an introduction or a conclusion.

Do not introduce new facts; use only the completed sections. Write in markdown \
and start with a `## ` heading carrying the section name.";

pub fn plan_queries(topic: &str, structure: &str, feedback: Option<&str>, count: usize) -> String {
    let mut prompt = format!(
        "Topic: {topic}\nQuery count: {count}\n\nDocument organisation:\n{structure}\n"
    );
    if let Some(feedback) = feedback {
        prompt.push_str(&format!("\nReviewer feedback: {feedback}\n"));
    }
    prompt
}

pub fn planner(topic: &str, structure: &str, context: &str, feedback: Option<&str>) -> String {
    format!(
        "Topic: {topic}\n\nDocument organisation:\n{structure}\n\nReviewer feedback: {}\n\nBackground research:\n{context}\n",
        feedback.unwrap_or("none"),
    )
}

pub fn section_queries(topic: &str, section: &Section, count: usize) -> String {
    format!(
        "Topic: {topic}\nSection name: {}\nSection description: {}\nQuery count: {count}\n",
        section.name, section.description
    )
}

pub fn section_writer(topic: &str, section: &Section, context: &str) -> String {
    let draft = if section.content.is_empty() {
        "(none)"
    } else {
        section.content.as_str()
    };
    format!(
        "Topic: {topic}\nSection name: {}\nSection description: {}\n\nExisting draft:\n{draft}\n\nSources:\n{context}\n",
        section.name, section.description
    )
}

pub fn section_grader(topic: &str, section: &Section, follow_up_count: usize) -> String {
    format!(
        "Topic: {topic}\nSection name: {}\nSection description: {}\nFollow-up query count: {follow_up_count}\n\nDraft:\n{}\n",
        section.name, section.description, section.content
    )
}

pub fn final_section(topic: &str, section: &Section, context: &str) -> String {
    format!(
        "Topic: {topic}\nSection name: {}\nSection description: {}\n\nCompleted sections:\n{context}\n",
        section.name, section.description
    )
}

/// Read a `Label: value` line back out of a rendered prompt.
pub fn field<'a>(prompt: &'a str, label: &str) -> Option<&'a str> {
    prompt.lines().find_map(|line| {
        line.strip_prefix(label)
            .and_then(|rest| rest.strip_prefix(": "))
            .map(str::trim)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_prompts_carry_section_name() {
        let mut section = Section::new("골밀도 검사", "DEXA scans", true);
        let user = section_queries("골밀도", &section, 3);
        assert_eq!(field(&user, "Section name"), Some("골밀도 검사"));
        assert_eq!(field(&user, "Query count"), Some("3"));

        let user = section_writer("골밀도", &section, "Content from sources:");
        assert!(user.contains("Existing draft:\n(none)"));

        section.content = "## 골밀도 검사\nDraft".into();
        let user = section_writer("골밀도", &section, "");
        assert!(user.contains("## 골밀도 검사\nDraft"));
    }

    #[test]
    fn test_plan_queries_includes_feedback() {
        let user = plan_queries("topic", "structure", Some("more history"), 2);
        assert_eq!(field(&user, "Reviewer feedback"), Some("more history"));
        let user = plan_queries("topic", "structure", None, 2);
        assert_eq!(field(&user, "Reviewer feedback"), None);
    }

    #[test]
    fn test_field_requires_exact_label() {
        let text = "Section name: A\nSection description: B";
        assert_eq!(field(text, "Section"), None);
        assert_eq!(field(text, "Section description"), Some("B"));
    }
}
