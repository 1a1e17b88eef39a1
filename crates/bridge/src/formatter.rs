//! Notification text for incoming bus messages.

use {
    mqtg_store::{DataType, SubscriptionRecord},
    serde_json::Value,
    serde_json_path::JsonPath,
    tracing::debug,
};

/// Placeholder for the subscription's own topic filter.
pub const SUBSCRIPTION_TOPIC: &str = "%s";
/// Placeholder for the topic the message actually arrived on.
pub const WIRE_TOPIC: &str = "%t";

/// Result of formatting one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formatted {
    /// Text of the notification (the caption for images).
    pub text: String,
    /// Value kept as the subscription's last payload and in history: the
    /// extracted value for structured data, the raw bytes otherwise.
    pub payload: Vec<u8>,
}

/// Format a message received on `wire_topic` for `subscription`.
pub fn format_message(subscription: &SubscriptionRecord, wire_topic: &str, payload: &[u8]) -> Formatted {
    let before = substitute(&subscription.before_text, &subscription.topic, wire_topic);
    if subscription.data_type == DataType::Image {
        return Formatted {
            text: before,
            payload: payload.to_vec(),
        };
    }

    let after = substitute(&subscription.after_text, &subscription.topic, wire_topic);
    let value = if subscription.json_path.len() > 1 {
        extract(&subscription.json_path, payload)
            .map(String::into_bytes)
            .unwrap_or_else(|| payload.to_vec())
    } else {
        payload.to_vec()
    };
    Formatted {
        text: format!("{before} {} {after}", String::from_utf8_lossy(&value)),
        payload: value,
    }
}

/// Replace both topic placeholders in `template`.
pub fn substitute(template: &str, topic: &str, wire_topic: &str) -> String {
    template
        .replace(SUBSCRIPTION_TOPIC, &code(topic))
        .replace(WIRE_TOPIC, &code(wire_topic))
}

/// Wrap `text` in an HTML `<code>` element.
pub fn code(text: &str) -> String {
    format!("<code>{}</code>", escape_html(text))
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Evaluate `path` against a JSON payload. `None` when the payload is not
/// JSON, the path does not parse, or nothing matches.
pub fn extract(path: &str, payload: &[u8]) -> Option<String> {
    let value: Value = match serde_json::from_slice(payload) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "payload is not json, using raw text");
            return None;
        },
    };
    let path = match JsonPath::parse(path) {
        Ok(path) => path,
        Err(e) => {
            debug!(path, error = %e, "invalid json path, using raw text");
            return None;
        },
    };

    let nodes = path.query(&value).all();
    match nodes.as_slice() {
        [] => None,
        [single] => Some(render(single)),
        many => Some(Value::Array(many.iter().map(|v| (*v).clone()).collect()).to_string()),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        mqtg_store::SubscriptionType,
        rstest::rstest,
    };

    fn subscription(before: &str, after: &str, path: &str, data_type: DataType) -> SubscriptionRecord {
        SubscriptionRecord {
            id: 1,
            chat_id: 10,
            topic: "home/+/temp".into(),
            qos: 0,
            retained: false,
            data_type,
            before_text: before.into(),
            after_text: after.into(),
            json_path: path.into(),
            subscription_type: SubscriptionType::NotifyAndStore,
            last_payload: Vec::new(),
            last_message: String::new(),
        }
    }

    #[test]
    fn extracts_value_with_json_path() {
        let sub = subscription("Value:", "", "$.value", DataType::Other);
        let out = format_message(&sub, "home/kitchen/temp", br#"{"value":42}"#);
        assert_eq!(out.text, "Value: 42 ");
        assert_eq!(out.payload, b"42");
    }

    #[test]
    fn formatting_is_deterministic() {
        let sub = subscription("%s ->", "(%t)", "$.v", DataType::Other);
        let a = format_message(&sub, "home/a/temp", br#"{"v":"x"}"#);
        let b = format_message(&sub, "home/a/temp", br#"{"v":"x"}"#);
        assert_eq!(a, b);
    }

    #[test]
    fn placeholders_render_both_topics() {
        let sub = subscription("%s at %t:", "on %t", "", DataType::Other);
        let out = format_message(&sub, "home/kitchen/temp", b"21.5");
        assert_eq!(
            out.text,
            "<code>home/+/temp</code> at <code>home/kitchen/temp</code>: 21.5 on <code>home/kitchen/temp</code>"
        );
    }

    #[rstest]
    #[case::not_json("$.value", b"plain text".as_slice(), "plain text")]
    #[case::no_match("$.missing", br#"{"value":1}"#.as_slice(), r#"{"value":1}"#)]
    #[case::bad_path("$[", br#"{"value":1}"#.as_slice(), r#"{"value":1}"#)]
    #[case::trivial_path("$", br#"{"value":1}"#.as_slice(), r#"{"value":1}"#)]
    #[case::string_unquoted("$.name", br#"{"name":"boiler"}"#.as_slice(), "boiler")]
    #[case::object("$.nested", br#"{"nested":{"a":1}}"#.as_slice(), r#"{"a":1}"#)]
    #[case::many("$.items[*]", br#"{"items":[1,2]}"#.as_slice(), "[1,2]")]
    fn extraction_falls_back_to_raw_payload(
        #[case] path: &str,
        #[case] payload: &[u8],
        #[case] expected: &str,
    ) {
        let sub = subscription("", "", path, DataType::Other);
        let out = format_message(&sub, "t", payload);
        assert_eq!(out.text, format!(" {expected} "));
    }

    #[test]
    fn image_uses_before_template_only() {
        let sub = subscription("Snapshot %t", "ignored", "$.x", DataType::Image);
        let jpeg = [0xff, 0xd8, 0xff, 0xe0];
        let out = format_message(&sub, "cam/1", &jpeg);
        assert_eq!(out.text, "Snapshot <code>cam/1</code>");
        assert_eq!(out.payload, jpeg);
    }

    #[test]
    fn topics_are_html_escaped() {
        assert_eq!(substitute("%s", "a<b>", "t"), "<code>a&lt;b&gt;</code>");
    }
}
