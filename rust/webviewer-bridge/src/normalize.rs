use serde_json::Value;

use crate::{BridgeError, CallId};

/// Turn raw result text into a structured value where that is possible.
///
/// Text that starts with `{` or `[` is decoded as JSON. Anything else, and
/// any text that fails to decode, comes back unchanged as
/// [`Value::String`]: decoding is an enrichment, never a new way to fail.
pub fn normalize_result(raw: String) -> Value {
    if !looks_structured(&raw) {
        return Value::String(raw);
    }

    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(error) => {
            tracing::debug!(%error, "Result looked like JSON but did not decode; returning text");
            Value::String(raw)
        }
    }
}

/// Turn the error text the host delivered for a call into a
/// [`BridgeError::CallRejected`].
///
/// A JSON object payload keeps its `code` and `message` (or those of the
/// first entry of a data API style `messages` list). Any other payload is
/// carried verbatim as the message.
pub fn normalize_rejection(call_id: CallId, raw: String) -> BridgeError {
    let detail = if looks_structured(&raw) {
        serde_json::from_str::<Value>(&raw).ok()
    } else {
        None
    };

    let Some(detail @ Value::Object(_)) = detail else {
        return BridgeError::CallRejected {
            call_id,
            code: None,
            message: raw,
            detail: None,
        };
    };

    let source = detail
        .get("messages")
        .and_then(|messages| messages.get(0))
        .unwrap_or(&detail);
    let code = source.get("code").and_then(scalar_text);
    let message = source
        .get("message")
        .and_then(scalar_text)
        .unwrap_or_else(|| raw.clone());

    BridgeError::CallRejected {
        call_id,
        code,
        message,
        detail: Some(detail),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn looks_structured(raw: &str) -> bool {
    matches!(raw.as_bytes().first(), Some(b'{' | b'['))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn it_decodes_objects_and_arrays() {
        assert_eq!(normalize_result(r#"{"x":1}"#.into()), json!({ "x": 1 }));
        assert_eq!(normalize_result("[1,2]".into()), json!([1, 2]));
    }

    #[test]
    fn it_falls_back_to_the_original_text() {
        let raw = "not json but starts with {".to_string();
        assert_eq!(normalize_result(raw.clone()), Value::String(raw));

        let raw = "{ broken".to_string();
        assert_eq!(normalize_result(raw.clone()), Value::String(raw));
    }

    #[test]
    fn it_extracts_code_and_message_from_structured_rejections() {
        let error = normalize_rejection(
            CallId::from(3),
            r#"{"code":401,"message":"No records match the request"}"#.into(),
        );

        assert_eq!(
            error,
            BridgeError::CallRejected {
                call_id: CallId::from(3),
                code: Some("401".into()),
                message: "No records match the request".into(),
                detail: Some(json!({ "code": 401, "message": "No records match the request" })),
            }
        );
    }

    #[test]
    fn it_reads_data_api_style_rejections() {
        let error = normalize_rejection(
            CallId::from(5),
            r#"{"messages":[{"code":"102","message":"Field is missing"}],"response":{}}"#.into(),
        );

        let BridgeError::CallRejected { code, message, .. } = error else {
            panic!("expected a rejection");
        };
        assert_eq!(code.as_deref(), Some("102"));
        assert_eq!(message, "Field is missing");
    }

    #[test]
    fn it_carries_plain_text_rejections_verbatim() {
        let error = normalize_rejection(CallId::from(9), "Script not found".into());

        assert_eq!(
            error,
            BridgeError::CallRejected {
                call_id: CallId::from(9),
                code: None,
                message: "Script not found".into(),
                detail: None,
            }
        );
        assert_eq!(
            error.to_string(),
            "Call 9 was rejected by the host: Script not found"
        );
    }

    #[test]
    fn it_leaves_scalars_as_text() {
        assert_eq!(normalize_result("42".into()), json!("42"));
        assert_eq!(normalize_result("true".into()), json!("true"));
        assert_eq!(normalize_result(" {\"x\":1}".into()), json!(" {\"x\":1}"));
        assert_eq!(normalize_result(String::new()), json!(""));
    }
}
