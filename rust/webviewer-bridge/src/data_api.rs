//! The host's structured data API.
//!
//! Requests are JSON documents naming an action (`read` when absent) and its
//! arguments. Every response is an envelope of the form
//!
//! ```json
//! { "messages": [{ "code": "0", "message": "OK" }], "response": { ... } }
//! ```
//!
//! where a first message code other than `"0"` reports a failure.

mod request;
pub use request::*;

mod record;
pub use record::*;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{Bindings, Bridge, BridgeError, CallOptions, Host};

/// The message code of a successful data API call
pub const SUCCESS_CODE: &str = "0";

const DATA_API_EXPRESSION: &str = "ExecuteFileMakerDataAPI ( ~request )";

/// One entry of a response's message list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataApiMessage {
    /// `"0"` for success, a host error code otherwise
    #[serde(deserialize_with = "code_text")]
    pub code: String,
    /// A description of the outcome
    #[serde(default)]
    pub message: String,
}

fn code_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    request::text_or_number(deserializer)?
        .ok_or_else(|| serde::de::Error::custom("message code is missing"))
}

/// A validated, successful data API response
#[derive(Debug, Clone, PartialEq)]
pub struct DataApiResponse {
    action: DataAction,
    messages: Vec<DataApiMessage>,
    response: Value,
}

impl DataApiResponse {
    /// Validate the raw text the host returned for a request
    pub fn from_text(action: DataAction, raw: &str) -> Result<Self, BridgeError> {
        let envelope = serde_json::from_str::<Value>(raw).map_err(|error| {
            BridgeError::MalformedEnvelope(format!("response is not JSON: {error}"))
        })?;
        Self::from_value(action, envelope)
    }

    /// Validate a decoded response envelope
    pub fn from_value(action: DataAction, mut envelope: Value) -> Result<Self, BridgeError> {
        let Some(body) = envelope.as_object_mut() else {
            return Err(BridgeError::MalformedEnvelope(
                "response is not an object".into(),
            ));
        };

        let messages = match body.remove("messages") {
            Some(messages) => serde_json::from_value::<Vec<DataApiMessage>>(messages)
                .map_err(|error| {
                    BridgeError::MalformedEnvelope(format!("unreadable message list: {error}"))
                })?,
            None => Vec::new(),
        };

        let Some(first) = messages.first() else {
            return Err(BridgeError::MalformedEnvelope(
                "response has no messages".into(),
            ));
        };

        if first.code != SUCCESS_CODE {
            return Err(BridgeError::Application {
                code: first.code.clone(),
                message: first.message.clone(),
            });
        }

        Ok(Self {
            action,
            messages,
            response: body.remove("response").unwrap_or(Value::Null),
        })
    }

    /// The action this response answers
    pub fn action(&self) -> DataAction {
        self.action
    }

    /// The messages the host reported; the first one is always a success
    pub fn messages(&self) -> &[DataApiMessage] {
        &self.messages
    }

    /// The response body, exactly as the host sent it
    pub fn response(&self) -> &Value {
        &self.response
    }

    /// The record id reported by a create, update or duplicate
    pub fn record_id(&self) -> Option<&str> {
        self.response.get("recordId").and_then(Value::as_str)
    }

    /// The modification id reported by a create, update or duplicate
    pub fn mod_id(&self) -> Option<&str> {
        self.response.get("modId").and_then(Value::as_str)
    }

    /// The records of a read response, with portals folded into each
    /// record. The response itself is left untouched, so this can be called
    /// any number of times.
    pub fn records(&self) -> Result<RecordSet, BridgeError> {
        if self.action != DataAction::Read {
            return Err(BridgeError::NotReadable(self.action));
        }
        RecordSet::from_response(&self.response)
    }

    /// The records of a read response, each decoded into `T`
    pub fn records_as<T>(&self) -> Result<Vec<T>, BridgeError>
    where
        T: DeserializeOwned,
    {
        self.records()?
            .iter()
            .map(|record| serde_json::from_value(record.to_value()).map_err(BridgeError::from))
            .collect()
    }
}

impl<H> Bridge<H>
where
    H: Host + 'static,
{
    /// Run a data API request through the host
    pub async fn execute_data_action(
        &self,
        request: &DataApiRequest,
    ) -> Result<DataApiResponse, BridgeError> {
        let bindings = Bindings::new().bind("~request", serde_json::to_string(request)?)?;

        let raw = self
            .evaluate_with(
                DATA_API_EXPRESSION,
                &bindings,
                CallOptions::default().always_return_string(),
            )
            .await?;

        match raw {
            Value::String(raw) => DataApiResponse::from_text(request.action, &raw),
            other => DataApiResponse::from_value(request.action, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn it_accepts_successful_envelopes() {
        let response = DataApiResponse::from_text(
            DataAction::Read,
            r#"{"messages":[{"code":"0","message":"OK"}],"response":{"data":[{"fieldData":{"a":1},"portalData":{"P":[{"a":2}]},"recordId":"5","modId":"1"}]}}"#,
        )
        .unwrap();

        let records = response.records().unwrap();
        assert_eq!(records.len(), 1);

        let record = &records.records()[0];
        assert_eq!(
            serde_json::to_value(record).unwrap(),
            json!({ "a": 1, "P": [{ "a": 2 }] })
        );
        assert_eq!(record.record_id(), Some("5"));
        assert_eq!(record.mod_id(), Some("1"));

        // Flattening again yields the same records
        assert_eq!(response.records().unwrap(), records);
    }

    #[test]
    fn it_raises_application_errors() {
        let error = DataApiResponse::from_text(
            DataAction::Read,
            r#"{"messages":[{"code":"101","message":"No records"}],"response":{}}"#,
        )
        .unwrap_err();

        assert_eq!(
            error,
            BridgeError::Application {
                code: "101".into(),
                message: "No records".into()
            }
        );
    }

    #[test]
    fn it_accepts_numeric_codes() {
        let error = DataApiResponse::from_value(
            DataAction::Delete,
            json!({ "messages": [{ "code": 401, "message": "No records match the request" }] }),
        )
        .unwrap_err();

        assert!(matches!(error, BridgeError::Application { code, .. } if code == "401"));
    }

    #[test]
    fn it_rejects_envelopes_without_messages() {
        for raw in [
            r#"{"response":{}}"#,
            r#"{"messages":[],"response":{}}"#,
            r#"{"messages":"OK"}"#,
            r#"[]"#,
            "not json",
        ] {
            assert!(
                matches!(
                    DataApiResponse::from_text(DataAction::Read, raw),
                    Err(BridgeError::MalformedEnvelope(_))
                ),
                "{raw} should be malformed"
            );
        }
    }

    #[test]
    fn it_only_offers_records_for_reads() {
        let response = DataApiResponse::from_value(
            DataAction::Create,
            json!({
                "messages": [{ "code": "0", "message": "OK" }],
                "response": { "recordId": "12", "modId": "0" }
            }),
        )
        .unwrap();

        assert_eq!(response.record_id(), Some("12"));
        assert_eq!(response.mod_id(), Some("0"));
        assert_eq!(
            response.records().unwrap_err(),
            BridgeError::NotReadable(DataAction::Create)
        );
    }

    #[test]
    fn it_decodes_records_into_types() {
        #[derive(Debug, PartialEq, Deserialize)]
        struct Invoice {
            number: u32,
            #[serde(rename = "Lines")]
            lines: Vec<Line>,
        }

        #[derive(Debug, PartialEq, Deserialize)]
        struct Line {
            qty: u32,
        }

        let response = DataApiResponse::from_value(
            DataAction::Read,
            json!({
                "messages": [{ "code": "0", "message": "OK" }],
                "response": { "data": [{
                    "fieldData": { "number": 1001 },
                    "portalData": { "Lines": [{ "Lines::qty": 3, "recordId": "1", "modId": "0" }] },
                    "recordId": "5",
                    "modId": "1"
                }] }
            }),
        )
        .unwrap();

        assert_eq!(
            response.records_as::<Invoice>().unwrap(),
            vec![Invoice {
                number: 1001,
                lines: vec![Line { qty: 3 }]
            }]
        );
    }
}
