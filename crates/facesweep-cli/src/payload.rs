use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;

/// Inline JSON, or `@path` to read it from a file.
pub fn parse(arg: &str) -> Result<Value> {
    let raw = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(Path::new(path)).with_context(|| format!("reading payload {path}"))?,
        None => arg.to_string(),
    };
    serde_json::from_str(&raw).context("payload is not valid JSON")
}

/// Re-indent a response body for the terminal; non-JSON passes through.
pub fn pretty_body(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .and_then(|v| serde_json::to_string_pretty(&v))
        .unwrap_or_else(|_| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inline_payload() {
        assert_eq!(parse(r#"{"user_ids": ["a"]}"#).unwrap(), json!({"user_ids": ["a"]}));
        assert!(parse("{not json").is_err());
    }

    #[test]
    fn test_payload_from_file() {
        let path = std::env::temp_dir().join(format!("facesweep-payload-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"user_id": "a", "new_user_id": "b"}"#).unwrap();
        let value = parse(&format!("@{}", path.display())).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(value["new_user_id"], "b");
    }

    #[test]
    fn test_missing_payload_file() {
        let err = parse("@/nonexistent/payload.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/payload.json"));
    }

    #[test]
    fn test_pretty_body() {
        assert_eq!(pretty_body(r#"{"a":1}"#), "{\n  \"a\": 1\n}");
        assert_eq!(pretty_body("plain"), "plain");
    }
}
