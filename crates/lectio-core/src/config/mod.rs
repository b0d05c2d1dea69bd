use serde_json::{Map, Value, json};
use std::time::Duration;

/// Pipeline configuration as a JSON object with dotted-path access.
///
/// Unknown keys are kept so hosts can stash their own settings next to ours. Getters fall back
/// to [`LectioConfig::defaults`] when a key is missing or has the wrong type.
#[derive(Debug, Clone, PartialEq)]
pub struct LectioConfig(Value);

impl Default for LectioConfig {
    fn default() -> Self {
        Self::defaults()
    }
}

impl LectioConfig {
    pub const DEFAULT_ATTEMPT_TIMEOUT_MS: u64 = 10_000;
    pub const DEFAULT_EXCERPT_CHARS: u64 = 120;
    pub const DEFAULT_RETRY_LABEL_LIMIT: u64 = 24;
    pub const DEFAULT_ID_PREFIX: &'static str = "lectio";

    pub fn empty_object() -> Self {
        Self(Value::Object(Map::new()))
    }

    pub fn defaults() -> Self {
        Self(json!({
            "diagram": {
                "attemptTimeoutMs": Self::DEFAULT_ATTEMPT_TIMEOUT_MS,
                "excerptChars": Self::DEFAULT_EXCERPT_CHARS,
                "retryLabelLimit": Self::DEFAULT_RETRY_LABEL_LIMIT,
            },
            "render": {
                "idPrefix": Self::DEFAULT_ID_PREFIX,
            }
        }))
    }

    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// Defaults with `overrides` merged on top.
    pub fn with_overrides(overrides: &Value) -> Self {
        let mut cfg = Self::defaults();
        cfg.deep_merge(overrides);
        cfg
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn as_value_mut(&mut self) -> &mut Value {
        &mut self.0
    }

    fn lookup(&self, dotted_path: &str) -> Option<&Value> {
        let mut cur = &self.0;
        for segment in dotted_path.split('.') {
            cur = cur.as_object()?.get(segment)?;
        }
        Some(cur)
    }

    pub fn get_str(&self, dotted_path: &str) -> Option<&str> {
        self.lookup(dotted_path)?.as_str()
    }

    pub fn get_bool(&self, dotted_path: &str) -> Option<bool> {
        self.lookup(dotted_path)?.as_bool()
    }

    pub fn get_u64(&self, dotted_path: &str) -> Option<u64> {
        self.lookup(dotted_path)?.as_u64()
    }

    pub fn set_value(&mut self, dotted_path: &str, value: Value) {
        if !self.0.is_object() {
            self.0 = Value::Object(Map::new());
        }

        let Value::Object(ref mut root) = self.0 else {
            return;
        };
        let mut cur: &mut Map<String, Value> = root;
        let mut segments = dotted_path.split('.').peekable();
        while let Some(seg) = segments.next() {
            if segments.peek().is_none() {
                cur.insert(seg.to_string(), value);
                return;
            }
            let slot = cur.entry(seg).or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            let Some(next) = slot.as_object_mut() else {
                return;
            };
            cur = next;
        }
    }

    pub fn deep_merge(&mut self, other: &Value) {
        deep_merge_value(&mut self.0, other);
    }

    /// Bounded wait for one diagram engine attempt.
    pub fn attempt_timeout(&self) -> Duration {
        let ms = self
            .get_u64("diagram.attemptTimeoutMs")
            .filter(|ms| *ms > 0)
            .unwrap_or(Self::DEFAULT_ATTEMPT_TIMEOUT_MS);
        Duration::from_millis(ms)
    }

    pub fn excerpt_chars(&self) -> usize {
        self.get_u64("diagram.excerptChars")
            .filter(|n| *n > 0)
            .unwrap_or(Self::DEFAULT_EXCERPT_CHARS) as usize
    }

    pub fn retry_label_limit(&self) -> usize {
        // Anything shorter than an ellipsis plus one character cannot be truncated meaningfully.
        self.get_u64("diagram.retryLabelLimit")
            .filter(|n| *n >= 4)
            .unwrap_or(Self::DEFAULT_RETRY_LABEL_LIMIT) as usize
    }

    pub fn id_prefix(&self) -> &str {
        self.get_str("render.idPrefix")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(Self::DEFAULT_ID_PREFIX)
    }

    /// Checks the typed keys and reports the first one with an unusable value.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.0.is_object() {
            return Err(crate::Error::Config {
                message: "configuration must be a JSON object".to_string(),
            });
        }
        for key in [
            "diagram.attemptTimeoutMs",
            "diagram.excerptChars",
            "diagram.retryLabelLimit",
        ] {
            if let Some(v) = self.lookup(key) {
                if v.as_u64().is_none() {
                    return Err(crate::Error::Config {
                        message: format!("`{key}` must be a non-negative integer, got {v}"),
                    });
                }
            }
        }
        if let Some(v) = self.lookup("render.idPrefix") {
            if !v.is_string() {
                return Err(crate::Error::Config {
                    message: format!("`render.idPrefix` must be a string, got {v}"),
                });
            }
        }
        Ok(())
    }
}

fn deep_merge_value(base: &mut Value, incoming: &Value) {
    match (base, incoming) {
        (Value::Object(base_map), Value::Object(in_map)) => {
            for (key, in_value) in in_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge_value(base_value, in_value),
                    None => {
                        base_map.insert(key.clone(), in_value.clone());
                    }
                }
            }
        }
        (base_slot, in_value) => {
            *base_slot = in_value.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_expose_typed_getters() {
        let cfg = LectioConfig::default();
        assert_eq!(cfg.attempt_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.excerpt_chars(), 120);
        assert_eq!(cfg.retry_label_limit(), 24);
        assert_eq!(cfg.id_prefix(), "lectio");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn overrides_merge_without_dropping_siblings() {
        let cfg = LectioConfig::with_overrides(&json!({ "diagram": { "attemptTimeoutMs": 250 } }));
        assert_eq!(cfg.attempt_timeout(), Duration::from_millis(250));
        assert_eq!(cfg.excerpt_chars(), 120);
    }

    #[test]
    fn set_value_coerces_non_object_roots() {
        let mut cfg = LectioConfig::from_value(json!(42));
        cfg.set_value("render.idPrefix", json!("lesson"));
        assert_eq!(cfg.id_prefix(), "lesson");
    }

    #[test]
    fn validate_rejects_wrongly_typed_keys() {
        let cfg = LectioConfig::with_overrides(&json!({ "diagram": { "excerptChars": "long" } }));
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("diagram.excerptChars"), "{err}");
    }

    #[test]
    fn zero_timeout_falls_back_to_default() {
        let cfg = LectioConfig::with_overrides(&json!({ "diagram": { "attemptTimeoutMs": 0 } }));
        assert_eq!(cfg.attempt_timeout(), Duration::from_secs(10));
    }
}
