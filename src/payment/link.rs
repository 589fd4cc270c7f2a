//! Request/response mapping for the generic payment-link integration.

use crate::config::PaymentLinkConfig;
use crate::payment::gateway::{CheckoutLink, PaymentRequest};
use crate::PlaygateError;
use serde_json::Value;

/// Build the request body: template fields, overlaid with the payment request.
pub fn build_link_body(config: &PaymentLinkConfig, request: &PaymentRequest) -> Result<Value, PlaygateError> {
    let mut body = config.request_template.clone();
    let request = serde_json::to_value(request)
        .map_err(|e| PlaygateError::ProtocolError(format!("Failed to serialize: {}", e)))?;
    if let Value::Object(fields) = request {
        body.extend(fields);
    }
    Ok(Value::Object(body))
}

/// Flatten a JSON object body into query pairs for GET endpoints.
pub fn query_pairs(body: &Value) -> Vec<(String, String)> {
    let Some(fields) = body.as_object() else {
        return Vec::new();
    };
    fields
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}

/// Extract the checkout link from the endpoint's response.
pub fn map_link_response(config: &PaymentLinkConfig, response: &Value) -> Result<CheckoutLink, PlaygateError> {
    if let Some(pointer) = &config.success_pointer {
        if !is_truthy(response.pointer(pointer)) {
            let message = response
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Failed to create payment link");
            return Err(PlaygateError::VerificationFailed(message.to_string()));
        }
    }

    let url = response
        .pointer(&config.url_pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            PlaygateError::ProtocolError(format!(
                "Payment link response has no URL at {}",
                config.url_pointer
            ))
        })?;

    let order_id = config
        .order_id_pointer
        .as_deref()
        .and_then(|p| response.pointer(p))
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

    Ok(CheckoutLink {
        url: url.to_string(),
        order_id,
        checkout_session_id: None,
    })
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty() && s != "false" && s != "0",
        Some(Value::Null) | None => false,
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn link_config() -> PaymentLinkConfig {
        let mut request_template = serde_json::Map::new();
        request_template.insert("source_type_id".to_string(), json!(1));
        PaymentLinkConfig {
            endpoint: "/Front-End/cashfree/ppv-payment".to_string(),
            method: Default::default(),
            headers: Default::default(),
            request_template,
            url_pointer: "/Payment_Link_URL".to_string(),
            order_id_pointer: Some("/order_id".to_string()),
            success_pointer: Some("/status".to_string()),
        }
    }

    fn request() -> PaymentRequest {
        PaymentRequest {
            gateway_id: "cashfree".to_string(),
            session_id: "s-1".to_string(),
            amount: Some(99.0),
            currency: Some("INR".to_string()),
            user_id: None,
            video_id: Some("v-7".to_string()),
            slug: None,
        }
    }

    #[test]
    fn test_body_merges_template_and_request() {
        let body = build_link_body(&link_config(), &request()).unwrap();
        assert_eq!(body["source_type_id"], 1);
        assert_eq!(body["gatewayId"], "cashfree");
        assert_eq!(body["amount"], 99.0);
        assert!(body.get("userId").is_none());
    }

    #[test]
    fn test_query_pairs_skip_nulls() {
        let pairs = query_pairs(&json!({"a": "x", "b": 2, "c": null}));
        assert_eq!(pairs, vec![("a".to_string(), "x".to_string()), ("b".to_string(), "2".to_string())]);
    }

    #[test]
    fn test_map_response() {
        let response = json!({"status": true, "Payment_Link_URL": "https://pay.example/abc", "order_id": 991});
        let link = map_link_response(&link_config(), &response).unwrap();
        assert_eq!(link.url, "https://pay.example/abc");
        assert_eq!(link.order_id.as_deref(), Some("991"));
    }

    #[test]
    fn test_map_response_failure_flag() {
        let response = json!({"status": false, "message": "Amount too low"});
        let result = map_link_response(&link_config(), &response);
        assert!(matches!(result, Err(PlaygateError::VerificationFailed(m)) if m == "Amount too low"));
    }

    #[test]
    fn test_map_response_missing_url() {
        let response = json!({"status": true});
        assert!(matches!(
            map_link_response(&link_config(), &response),
            Err(PlaygateError::ProtocolError(_))
        ));
    }
}
