//! Typed handlers for structured agent messages.
//!
//! A handler is registered per request name. The raw JSON the LLM produced
//! is deserialized into the concrete `AgentMessage` type, validated, and
//! passed to the user-supplied closure.

use llmagent_core::{AgentMessage, MessageError};
use serde_json::Value;

/// Type-erased handler: raw request JSON in, reply text out.
pub type MessageHandler = Box<dyn Fn(Value) -> Result<String, MessageError> + Send + Sync>;

/// Wrap a closure over a concrete message type as a `MessageHandler`.
pub fn typed_handler<M, F>(handler: F) -> MessageHandler
where
    M: AgentMessage,
    F: Fn(M) -> String + Send + Sync + 'static,
{
    Box::new(move |mut value: Value| {
        if let Some(map) = value.as_object_mut() {
            // Function-call arguments omit the request name, and the LLM
            // never sees a `result` field.
            map.entry("request")
                .or_insert_with(|| Value::String(M::REQUEST.to_string()));
            map.entry("result")
                .or_insert_with(|| Value::String(String::new()));
        }
        let msg: M = serde_json::from_value(value).map_err(|e| MessageError::Malformed {
            request: M::REQUEST.to_string(),
            reason: e.to_string(),
        })?;
        msg.validate()?;
        Ok(handler(msg))
    })
}

/// The first balanced `{...}` block in `text`, if any. Braces inside JSON
/// strings are ignored.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// The `request` name of a JSON object embedded in `text`, with the parsed object.
pub fn find_request(text: &str) -> Option<(String, Value)> {
    let raw = extract_json_object(text)?;
    let value: Value = serde_json::from_str(raw).ok()?;
    let request = value.get("request")?.as_str()?.to_string();
    Some((request, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct PythonVersion {
        request: String,
        #[serde(default)]
        result: String,
    }

    impl AgentMessage for PythonVersion {
        const REQUEST: &'static str = "python_version";

        fn request(&self) -> &str {
            &self.request
        }

        fn result(&self) -> &str {
            &self.result
        }

        fn examples() -> Vec<Self> {
            vec![Self {
                request: Self::REQUEST.into(),
                result: "3.9".into(),
            }]
        }

        fn use_when(&self) -> Vec<String> {
            vec!["I need to know which python version the repo uses.".into()]
        }
    }

    #[test]
    fn extracts_embedded_object() {
        let text = r#"Sure. {"request": "python_version", "note": "a } brace"} thanks"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"request": "python_version", "note": "a } brace"}"#)
        );
    }

    #[test]
    fn nested_objects_are_balanced() {
        let text = r#"{"a": {"b": 1}} trailing"#;
        assert_eq!(extract_json_object(text), Some(r#"{"a": {"b": 1}}"#));
    }

    #[test]
    fn no_object_or_unbalanced() {
        assert_eq!(extract_json_object("plain text"), None);
        assert_eq!(extract_json_object("{\"open\": 1"), None);
    }

    #[test]
    fn find_request_reads_name() {
        let (name, value) = find_request(r#"{"request": "python_version"}"#).unwrap();
        assert_eq!(name, "python_version");
        assert_eq!(value["request"], "python_version");
        assert!(find_request(r#"{"filename": "a.py"}"#).is_none());
    }

    #[test]
    fn typed_handler_fills_missing_fields() {
        let handler = typed_handler(|m: PythonVersion| format!("handled {}", m.request));
        let reply = handler(serde_json::json!({})).unwrap();
        assert_eq!(reply, "handled python_version");
    }

    #[test]
    fn typed_handler_rejects_wrong_request() {
        let handler = typed_handler(|_: PythonVersion| String::new());
        let err = handler(serde_json::json!({"request": "other"})).unwrap_err();
        assert!(matches!(err, MessageError::InvalidRequest { .. }));
    }

    #[test]
    fn typed_handler_reports_malformed_fields() {
        let handler = typed_handler(|_: PythonVersion| String::new());
        let err = handler(serde_json::json!({"request": 7})).unwrap_err();
        assert!(matches!(err, MessageError::Malformed { .. }));
    }
}
