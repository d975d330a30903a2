//! Typed access to the loosely typed provider option map.
//!
//! A key that is present with the wrong JSON type is an `InvalidOptions`
//! error rather than being ignored.

use scrivener_core::error::SearchError;
use scrivener_core::search::SearchOptions;
use serde_json::Value;

fn invalid(provider: &str, key: &str, expected: &str, found: &Value) -> SearchError {
    SearchError::InvalidOptions {
        provider: provider.to_string(),
        reason: format!("`{key}` must be {expected}, got {found}"),
    }
}

pub(crate) fn u64_opt(
    provider: &str,
    options: &SearchOptions,
    key: &str,
) -> Result<Option<u64>, SearchError> {
    match options.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| invalid(provider, key, "a non-negative integer", value)),
    }
}

pub(crate) fn bool_opt(
    provider: &str,
    options: &SearchOptions,
    key: &str,
) -> Result<Option<bool>, SearchError> {
    match options.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_bool()
            .map(Some)
            .ok_or_else(|| invalid(provider, key, "a boolean", value)),
    }
}

pub(crate) fn str_opt<'o>(
    provider: &str,
    options: &'o SearchOptions,
    key: &str,
) -> Result<Option<&'o str>, SearchError> {
    match options.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| invalid(provider, key, "a string", value)),
    }
}

/// A list of strings. Empty lists read as absent.
pub(crate) fn str_list_opt(
    provider: &str,
    options: &SearchOptions,
    key: &str,
) -> Result<Option<Vec<String>>, SearchError> {
    let Some(value) = options.get(key).filter(|v| !v.is_null()) else {
        return Ok(None);
    };
    let items = value
        .as_array()
        .ok_or_else(|| invalid(provider, key, "a list of strings", value))?;
    let list = items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| invalid(provider, key, "a list of strings", value))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(if list.is_empty() { None } else { Some(list) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(value: Value) -> SearchOptions {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_missing_and_null_are_absent() {
        let opts = options(json!({"num_results": null}));
        assert_eq!(u64_opt("exa", &opts, "num_results").unwrap(), None);
        assert_eq!(bool_opt("exa", &opts, "other").unwrap(), None);
    }

    #[test]
    fn test_wrong_type_is_invalid() {
        let opts = options(json!({"num_results": "five"}));
        match u64_opt("exa", &opts, "num_results") {
            Err(SearchError::InvalidOptions { provider, reason }) => {
                assert_eq!(provider, "exa");
                assert!(reason.contains("num_results"));
            }
            other => panic!("Expected InvalidOptions, got {:?}", other),
        }
    }

    #[test]
    fn test_string_lists() {
        let opts = options(json!({
            "include_domains": ["nih.gov", "who.int"],
            "exclude_domains": [],
            "bad": ["ok", 3]
        }));
        assert_eq!(
            str_list_opt("exa", &opts, "include_domains").unwrap(),
            Some(vec!["nih.gov".to_string(), "who.int".to_string()])
        );
        assert_eq!(str_list_opt("exa", &opts, "exclude_domains").unwrap(), None);
        assert!(str_list_opt("exa", &opts, "bad").is_err());
    }
}
