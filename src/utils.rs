//! Request and display helpers
//!
//! - [`build_form_data`] flattens JSON into the nested form keys Rails expects
//!   (`course[title]`, `course[tabs][0][id]`), for endpoints that take
//!   `multipart/form-data` or url-encoded bodies instead of JSON.
//! - [`safe_truncate`] and [`truncate_for_display`] shorten server bodies for
//!   error messages without splitting UTF-8 characters.

use serde_json::Value;

/// Flatten a JSON value into Rails nested-attribute form fields.
///
/// Objects become `root[key]`, arrays become `root[key][index]`, an empty
/// array becomes a single `root[key][]` field with an empty value, booleans
/// are written as `true`/`false`, and nulls are omitted.
///
/// # Example
/// ```
/// use coursemology_sdk::utils::build_form_data;
/// use serde_json::json;
///
/// let fields = build_form_data(&json!({"details": {"a": 1, "tags": []}}), "item");
/// assert!(fields.contains(&("item[details][a]".to_string(), "1".to_string())));
/// assert!(fields.contains(&("item[details][tags][]".to_string(), String::new())));
/// ```
#[must_use]
pub fn build_form_data(data: &Value, root_key: &str) -> Vec<(String, String)> {
    let mut fields = Vec::new();
    flatten_into(data, root_key.to_string(), &mut fields);
    fields
}

fn flatten_into(value: &Value, prefix: String, fields: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                flatten_into(nested, format!("{prefix}[{key}]"), fields);
            }
        }
        Value::Array(items) if items.is_empty() => {
            fields.push((format!("{prefix}[]"), String::new()));
        }
        Value::Array(items) => {
            for (index, nested) in items.iter().enumerate() {
                flatten_into(nested, format!("{prefix}[{index}]"), fields);
            }
        }
        Value::Bool(b) => fields.push((prefix, b.to_string())),
        Value::String(s) => fields.push((prefix, s.clone())),
        Value::Number(n) => fields.push((prefix, n.to_string())),
        Value::Null => {}
    }
}

/// Safely truncate a string at a UTF-8 character boundary.
///
/// Returns a slice of at most `max_bytes` bytes.
///
/// # Example
/// ```
/// use coursemology_sdk::utils::safe_truncate;
///
/// let text = "Café";
/// assert_eq!(safe_truncate(text, 4), "Caf"); // 'é' is 2 bytes
/// ```
#[inline]
#[must_use]
pub fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }

    let mut boundary = max_bytes;
    while boundary > 0 && !s.is_char_boundary(boundary) {
        boundary -= 1;
    }

    &s[..boundary]
}

/// Truncate a string for display, appending "..." if anything was cut.
#[must_use]
pub fn truncate_for_display(s: &str, max_bytes: usize) -> String {
    let truncated = safe_truncate(s, max_bytes);
    if truncated.len() < s.len() {
        format!("{truncated}...")
    } else {
        truncated.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field<'a>(fields: &'a [(String, String)], key: &str) -> Option<&'a str> {
        fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_build_form_data_nested() {
        let data = json!({
            "title": "Mission 1",
            "published": true,
            "tab": {"id": 7, "weight": 1.5},
            "description": null
        });
        let fields = build_form_data(&data, "assessment");

        assert_eq!(field(&fields, "assessment[title]"), Some("Mission 1"));
        assert_eq!(field(&fields, "assessment[published]"), Some("true"));
        assert_eq!(field(&fields, "assessment[tab][id]"), Some("7"));
        assert_eq!(field(&fields, "assessment[tab][weight]"), Some("1.5"));
        assert_eq!(field(&fields, "assessment[description]"), None);
        assert_eq!(fields.len(), 4);
    }

    #[test]
    fn test_build_form_data_arrays() {
        let data = json!({
            "tags": [],
            "options": [{"correct": false, "text": "A"}, {"correct": true, "text": "B"}]
        });
        let fields = build_form_data(&data, "question");

        assert_eq!(field(&fields, "question[tags][]"), Some(""));
        assert_eq!(field(&fields, "question[options][0][correct]"), Some("false"));
        assert_eq!(field(&fields, "question[options][1][text]"), Some("B"));
    }

    #[test]
    fn test_build_form_data_scalar_root() {
        let fields = build_form_data(&json!("plain"), "comment");
        assert_eq!(fields, vec![("comment".to_string(), "plain".to_string())]);
    }

    #[test]
    fn test_safe_truncate_multibyte() {
        let text = "你好世界"; // 3 bytes each
        assert_eq!(safe_truncate(text, 4), "你");
        assert_eq!(safe_truncate(text, 6), "你好");
        assert_eq!(safe_truncate(text, 100), text);
    }

    #[test]
    fn test_truncate_for_display() {
        let text = "This is a long message";
        assert_eq!(truncate_for_display(text, 100), text);
        assert_eq!(truncate_for_display(text, 10), "This is a ...");
        assert_eq!(truncate_for_display("Hello 🌍 World", 7), "Hello ...");
    }
}
