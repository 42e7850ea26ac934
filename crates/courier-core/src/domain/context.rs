use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Connection metadata handed over by the protocol tunnel.
///
/// `metadata` is free-form (user id, host, protocol, ...). Its scalar values
/// feed template placeholders; the whole map is echoed in webhook events
/// after redaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionContext {
    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// Per-connection bucket override; wins over the configured bucket.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
}

impl ConnectionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Scalar metadata value rendered as text, for template substitution.
    ///
    /// Null, arrays and objects have no textual form and count as missing.
    pub fn lookup(&self, key: &str) -> Option<String> {
        match self.metadata.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_renders_scalars_only() {
        let ctx = ConnectionContext::new()
            .with_meta("userId", "u1")
            .with_meta("port", 3389)
            .with_meta("readOnly", true)
            .with_meta("tags", json!(["a"]))
            .with_meta("nothing", Value::Null);

        assert_eq!(ctx.lookup("userId").as_deref(), Some("u1"));
        assert_eq!(ctx.lookup("port").as_deref(), Some("3389"));
        assert_eq!(ctx.lookup("readOnly").as_deref(), Some("true"));
        assert_eq!(ctx.lookup("tags"), None);
        assert_eq!(ctx.lookup("nothing"), None);
        assert_eq!(ctx.lookup("absent"), None);
    }
}
