//! Property-based tests for search federation helpers using proptest.

use proptest::prelude::*;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

use scrivener_core::generation::prompts;
use scrivener_core::search::{SourceRecord, dedupe_by_url, filter_options, format_sources};

fn records() -> impl Strategy<Value = Vec<SourceRecord>> {
    prop::collection::vec((0usize..6, 0.0f64..1.0), 0..30).prop_map(|items| {
        items
            .into_iter()
            .enumerate()
            .map(|(i, (url, score))| {
                SourceRecord::new(
                    format!("title {i}"),
                    format!("https://example.org/{url}"),
                    "content",
                    score,
                )
            })
            .collect()
    })
}

// --- Deduplication properties ---

proptest! {
    #[test]
    fn dedupe_leaves_unique_urls(input in records()) {
        let output = dedupe_by_url(input.clone());
        let urls: HashSet<&str> = output.iter().map(|r| r.url.as_str()).collect();
        prop_assert_eq!(urls.len(), output.len());

        let expected: HashSet<&str> = input.iter().map(|r| r.url.as_str()).collect();
        prop_assert_eq!(urls, expected);
    }

    #[test]
    fn dedupe_keeps_highest_score(input in records()) {
        let mut best: HashMap<String, f64> = HashMap::new();
        for record in &input {
            let entry = best.entry(record.url.clone()).or_insert(f64::MIN);
            if record.score > *entry {
                *entry = record.score;
            }
        }
        for record in dedupe_by_url(input) {
            prop_assert_eq!(Some(&record.score), best.get(&record.url));
        }
    }

    #[test]
    fn dedupe_is_idempotent(input in records()) {
        let once = dedupe_by_url(input);
        let twice = dedupe_by_url(once.clone());
        prop_assert_eq!(once, twice);
    }
}

// --- Option filtering properties ---

proptest! {
    #[test]
    fn filtered_options_are_accepted_subset(
        keys in prop::collection::vec("[a-z_]{1,8}", 0..10),
        accepted in prop::collection::vec("[a-z_]{1,8}", 0..5),
    ) {
        let options: Map<String, Value> = keys
            .iter()
            .enumerate()
            .map(|(i, k)| (k.clone(), Value::from(i)))
            .collect();
        let accepted_refs: Vec<&str> = accepted.iter().map(String::as_str).collect();

        let filtered = filter_options(&accepted_refs, &options);
        for (key, value) in &filtered {
            prop_assert!(accepted_refs.contains(&key.as_str()));
            prop_assert_eq!(Some(value), options.get(key));
        }
        for key in &accepted {
            prop_assert_eq!(filtered.contains_key(key), options.contains_key(key));
        }
    }
}

// --- Formatting properties ---

proptest! {
    #[test]
    fn raw_content_truncation_never_splits_chars(
        raw in "[가-힣a-z ]{0,200}",
        limit in 1usize..20,
    ) {
        let source = SourceRecord::new("t", "https://example.org/x", "c", 0.5)
            .with_raw_content(raw);
        // Panics on a non-boundary slice, which is the failure we guard against
        let text = format_sources(&[source], limit, true);
        prop_assert!(text.starts_with("Content from sources:"));
    }

    #[test]
    fn prompt_fields_round_trip(name in "[가-힣A-Za-z][가-힣A-Za-z ]{0,30}[가-힣A-Za-z]") {
        let prompt = format!("Topic: t\nSection name: {name}\nSection description: d\n");
        prop_assert_eq!(prompts::field(&prompt, "Section name"), Some(name.as_str()));
    }
}
