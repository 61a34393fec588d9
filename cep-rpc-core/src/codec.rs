use crate::ids::CallId;
use crate::msg::{Request, Response, JSONRPC_VERSION};
use crate::RpcError;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

pub fn encode_request(request: &Request) -> Result<Bytes, RpcError> {
    let json = serde_json::to_vec(request)?;
    Ok(Bytes::from(json))
}

/// Decodes a request that arrived either as a JSON object or as JSON text.
pub fn decode_request(data: &Value) -> Result<Request, RpcError> {
    match data {
        Value::String(text) => Ok(serde_json::from_str(text)?),
        other => Ok(serde_json::from_value(other.clone())?),
    }
}

/// Decodes a `result` field.
///
/// Remote results are usually JSON text; anything that fails to parse is
/// kept as the raw value rather than treated as an error.
pub fn decode_result(raw: Value) -> Value {
    match raw {
        Value::String(text) => match serde_json::from_str(&text) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::debug!(error = %e, raw = %text, "Keeping non-JSON result as raw string");
                Value::String(text)
            }
        },
        other => other,
    }
}

/// Decodes a response envelope, tolerating both object and string forms.
pub fn decode_response(data: &Value) -> Result<Response, RpcError> {
    let envelope = match data {
        Value::String(text) => serde_json::from_str::<Value>(text)?,
        other => other.clone(),
    };

    let obj = envelope
        .as_object()
        .ok_or_else(|| RpcError::bad_request("Response must be a JSON object"))?;

    let id = obj
        .get("id")
        .and_then(Value::as_u64)
        .map(CallId::new)
        .ok_or_else(|| RpcError::bad_request("Response is missing a numeric id"))?;

    let result = decode_result(obj.get("result").cloned().unwrap_or(Value::Null));
    Ok(Response { id, result })
}

/// Builds the response envelope the remote side sends for `id`.
pub fn encode_response(id: CallId, result: &Value) -> Result<Value, RpcError> {
    Ok(json!({
        "id": id,
        "jsonrpc": JSONRPC_VERSION,
        "result": serde_json::to_string(result)?,
    }))
}

/// One-way event payloads travel as JSON text.
pub fn encode_payload<T: Serialize>(payload: &T) -> Result<Value, RpcError> {
    Ok(Value::String(serde_json::to_string(payload)?))
}

pub fn decode_payload<T: DeserializeOwned>(data: &Value) -> Result<T, RpcError> {
    match data {
        Value::String(text) => Ok(serde_json::from_str(text)?),
        other => Ok(serde_json::from_value(other.clone())?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::Method;

    #[test]
    fn test_encode_decode_request() {
        let req = Request::new(CallId::new(1), Method::Eval, vec![json!("1 + 1")]);
        let encoded = encode_request(&req).unwrap();
        let text = String::from_utf8(encoded.to_vec()).unwrap();
        assert_eq!(decode_request(&Value::String(text)).unwrap(), req);
        assert_eq!(decode_request(&serde_json::to_value(&req).unwrap()).unwrap(), req);
    }

    #[test]
    fn test_decode_result_json_text() {
        assert_eq!(decode_result(json!("2")), json!(2));
        assert_eq!(decode_result(json!("{\"a\": true}")), json!({"a": true}));
        assert_eq!(decode_result(json!("\"quoted\"")), json!("quoted"));
    }

    #[test]
    fn test_decode_result_falls_back_to_raw() {
        assert_eq!(decode_result(json!("not json")), json!("not json"));
        assert_eq!(decode_result(json!(5)), json!(5));
        assert_eq!(decode_result(Value::Null), Value::Null);
    }

    #[test]
    fn test_decode_response_string_and_object() {
        let text = json!("{\"id\": 4, \"jsonrpc\": \"2.0\", \"result\": \"[1,2]\"}");
        let resp = decode_response(&text).unwrap();
        assert_eq!(resp.id, CallId::new(4));
        assert_eq!(resp.result, json!([1, 2]));

        let obj = json!({"id": 5, "result": "undefined"});
        let resp = decode_response(&obj).unwrap();
        assert_eq!(resp.id, CallId::new(5));
        assert_eq!(resp.result, json!("undefined"));
    }

    #[test]
    fn test_decode_response_without_id() {
        assert!(decode_response(&json!({"result": "1"})).is_err());
        assert!(decode_response(&json!("garbage")).is_err());
        assert!(decode_response(&json!([1])).is_err());
    }

    #[test]
    fn test_response_envelope_round_trip() {
        let result = json!({"__uniqueid": 9, "properties": [], "methods": {}});
        let envelope = encode_response(CallId::new(3), &result).unwrap();
        assert!(envelope["result"].is_string());
        let resp = decode_response(&envelope).unwrap();
        assert_eq!(resp.result, result);
    }

    #[test]
    fn test_payloads_accept_text_or_structure() {
        #[derive(Debug, PartialEq, serde::Deserialize)]
        struct Log {
            level: String,
        }

        let from_text: Log = decode_payload(&json!("{\"level\": \"info\"}")).unwrap();
        let from_obj: Log = decode_payload(&json!({"level": "info"})).unwrap();
        assert_eq!(from_text, from_obj);

        let encoded = encode_payload(&json!({"display": "Shot 010"})).unwrap();
        assert_eq!(encoded, json!("{\"display\":\"Shot 010\"}"));
    }
}
