//! JSON body to query string translation for the `/forward` route.

use serde_json::Value;
use url::form_urlencoded;

use crate::error::{GatewayError, GatewayResult};

/// Key holding the parameters to forward.
pub const TARGET_PARAMS: &str = "targetParams";

/// Convert `{"targetParams": {...}}` into a percent-encoded query string.
///
/// Strings are used as-is, other scalars use their JSON text and `null`
/// becomes an empty value. Nested arrays or objects are rejected.
pub fn body_to_query(body: &[u8]) -> GatewayResult<String> {
    let document: Value = serde_json::from_slice(body)
        .map_err(|e| GatewayError::MalformedRequest(format!("body is not JSON: {}", e)))?;

    let params = document
        .as_object()
        .ok_or_else(|| GatewayError::MalformedRequest("body is not a JSON object".into()))?
        .get(TARGET_PARAMS)
        .ok_or_else(|| GatewayError::MalformedRequest(format!("missing {}", TARGET_PARAMS)))?
        .as_object()
        .ok_or_else(|| {
            GatewayError::MalformedRequest(format!("{} is not an object", TARGET_PARAMS))
        })?;

    let mut query = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        let value = match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            Value::Bool(_) | Value::Number(_) => value.to_string(),
            Value::Array(_) | Value::Object(_) => {
                return Err(GatewayError::MalformedRequest(format!(
                    "{}.{} is not a scalar",
                    TARGET_PARAMS, key
                )))
            }
        };
        query.append_pair(key, &value);
    }

    let query = query.finish();
    tracing::debug!(query = %query, "Translated body to query");
    Ok(query)
}
