//! Reassembles completed sections in plan order.

use super::{CompletedSection, Section};
use crate::error::CompileError;
use std::collections::HashMap;

/// Separator between sections in the compiled document.
pub const SECTION_SEPARATOR: &str = "\n\n";

/// The compiled output: plan-ordered sections with content, and the joined text.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledDocument {
    pub sections: Vec<Section>,
    pub text: String,
}

/// Look up each planned section by name and join the contents in plan order.
///
/// Completion order is irrelevant. A planned section with no completed entry
/// is a coordinator defect and fails the compile.
pub fn compile_document(
    plan: &[Section],
    completed: &[CompletedSection],
) -> Result<CompiledDocument, CompileError> {
    let by_name: HashMap<&str, &CompletedSection> =
        completed.iter().map(|c| (c.name(), c)).collect();

    let sections = plan
        .iter()
        .map(|planned| {
            let done = by_name
                .get(planned.name.as_str())
                .ok_or_else(|| CompileError::MissingSection {
                    name: planned.name.clone(),
                })?;
            let mut section = planned.clone();
            section.content = done.section.content.clone();
            Ok(section)
        })
        .collect::<Result<Vec<_>, CompileError>>()?;

    let text = sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join(SECTION_SEPARATOR);

    Ok(CompiledDocument { sections, text })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::SectionQuality;
    use pretty_assertions::assert_eq;

    fn done(name: &str, content: &str) -> CompletedSection {
        let mut section = Section::new(name, "", true);
        section.content = content.to_string();
        CompletedSection {
            section,
            quality: SectionQuality::Passed,
            search_iterations: 0,
        }
    }

    fn plan() -> Vec<Section> {
        ["A", "B", "C"]
            .iter()
            .map(|n| Section::new(*n, format!("about {n}"), false))
            .collect()
    }

    #[test]
    fn test_compile_uses_plan_order() {
        let completed = vec![done("C", "third"), done("A", "first"), done("B", "second")];
        let doc = compile_document(&plan(), &completed).unwrap();
        assert_eq!(doc.text, "first\n\nsecond\n\nthird");
        assert_eq!(doc.sections[1].name, "B");
        assert_eq!(doc.sections[1].description, "about B");
        assert_eq!(doc.sections[1].content, "second");
    }

    #[test]
    fn test_compile_missing_section_is_fatal() {
        let completed = vec![done("A", "first"), done("C", "third")];
        match compile_document(&plan(), &completed) {
            Err(CompileError::MissingSection { name }) => assert_eq!(name, "B"),
            other => panic!("Expected MissingSection, got {:?}", other),
        }
    }

    #[test]
    fn test_compile_ignores_unplanned_entries() {
        let completed = vec![
            done("A", "first"),
            done("B", "second"),
            done("C", "third"),
            done("Z", "stray"),
        ];
        let doc = compile_document(&plan(), &completed).unwrap();
        assert!(!doc.text.contains("stray"));
    }
}
