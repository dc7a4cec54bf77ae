use std::borrow::Cow;

use opentelemetry::Value;
use opentelemetry_proto::tonic::common::v1::{any_value, KeyValue as ProtoKeyValue};
use opentelemetry_sdk::Resource;

/// Read access to an attribute set, regardless of whether it came from an
/// OTLP payload or from the SDK.
pub(crate) trait Attributes {
    /// Returns `true` if an attribute with this key is present, whatever its value.
    fn contains_key(&self, key: &str) -> bool;

    /// Returns the attribute rendered as a string.
    ///
    /// Scalar values (bool, integer, double) are converted to their string
    /// form. Arrays, maps and bytes are treated as absent.
    fn get_str(&self, key: &str) -> Option<Cow<'_, str>>;
}

impl Attributes for [ProtoKeyValue] {
    fn contains_key(&self, key: &str) -> bool {
        self.iter().any(|kv| kv.key == key)
    }

    fn get_str(&self, key: &str) -> Option<Cow<'_, str>> {
        let value = self
            .iter()
            .find(|kv| kv.key == key)?
            .value
            .as_ref()?
            .value
            .as_ref()?;
        match value {
            any_value::Value::StringValue(s) => Some(Cow::Borrowed(s.as_str())),
            any_value::Value::BoolValue(b) => Some(Cow::Owned(b.to_string())),
            any_value::Value::IntValue(i) => Some(Cow::Owned(i.to_string())),
            any_value::Value::DoubleValue(d) => Some(Cow::Owned(d.to_string())),
            _ => None,
        }
    }
}

impl Attributes for [opentelemetry::KeyValue] {
    fn contains_key(&self, key: &str) -> bool {
        self.iter().any(|kv| kv.key.as_str() == key)
    }

    fn get_str(&self, key: &str) -> Option<Cow<'_, str>> {
        self.iter()
            .find(|kv| kv.key.as_str() == key)
            .and_then(|kv| value_as_str(&kv.value))
    }
}

impl Attributes for Resource {
    fn contains_key(&self, key: &str) -> bool {
        self.iter().any(|(k, _)| k.as_str() == key)
    }

    fn get_str(&self, key: &str) -> Option<Cow<'_, str>> {
        self.iter()
            .find(|(k, _)| k.as_str() == key)
            .and_then(|(_, v)| value_as_str(v))
    }
}

fn value_as_str(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        Value::Bool(b) => Some(Cow::Owned(b.to_string())),
        Value::I64(i) => Some(Cow::Owned(i.to_string())),
        Value::F64(f) => Some(Cow::Owned(f.to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::Attributes;
    use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, KeyValue as ProtoKeyValue};

    fn proto_kv(key: &str, value: any_value::Value) -> ProtoKeyValue {
        ProtoKeyValue {
            key: key.to_string(),
            value: Some(AnyValue { value: Some(value) }),
            ..Default::default()
        }
    }

    #[test]
    fn proto_attributes_render_scalars() {
        let attrs = vec![
            proto_kv("s", any_value::Value::StringValue("checkout".into())),
            proto_kv("b", any_value::Value::BoolValue(true)),
            proto_kv("i", any_value::Value::IntValue(42)),
            proto_kv("bytes", any_value::Value::BytesValue(vec![1, 2])),
        ];

        assert_eq!(attrs.get_str("s").as_deref(), Some("checkout"));
        assert_eq!(attrs.get_str("b").as_deref(), Some("true"));
        assert_eq!(attrs.get_str("i").as_deref(), Some("42"));
        assert_eq!(attrs.get_str("bytes"), None);
        assert_eq!(attrs.get_str("missing"), None);
        assert!(attrs.contains_key("bytes"));
        assert!(!attrs.contains_key("missing"));
    }

    #[test]
    fn proto_attribute_without_value_is_present_but_unreadable() {
        let attrs = vec![ProtoKeyValue {
            key: "http.route".to_string(),
            value: None,
            ..Default::default()
        }];

        assert!(attrs.contains_key("http.route"));
        assert_eq!(attrs.get_str("http.route"), None);
    }

    #[test]
    fn sdk_attributes_render_scalars() {
        let attrs = vec![
            opentelemetry::KeyValue::new("s", "checkout"),
            opentelemetry::KeyValue::new("i", 7_i64),
        ];

        assert_eq!(attrs.get_str("s").as_deref(), Some("checkout"));
        assert_eq!(attrs.get_str("i").as_deref(), Some("7"));
        assert!(!attrs.contains_key("missing"));
    }
}
