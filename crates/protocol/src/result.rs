use serde::Serialize;
use serde_json::Value;

/// Outcome of parsing the captured output of a tool process.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CapturedJson {
    NotRequested,
    Parsed(Value),
    Invalid(String),
}

/// Record of one finished tool process. Built once at exit, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessResult {
    exit_code: i32,
    raw_output: String,
    json: CapturedJson,
}

impl ProcessResult {
    /// Builds the record, parsing the whole of `raw_output` as one JSON document
    /// when `capture_json` is set. A parse failure is recorded, not raised.
    pub fn new(exit_code: i32, raw_output: String, capture_json: bool) -> Self {
        let json = if capture_json {
            parse_document(&raw_output)
        } else {
            CapturedJson::NotRequested
        };
        Self {
            exit_code,
            raw_output,
            json,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn raw_output(&self) -> &str {
        &self.raw_output
    }

    pub fn json(&self) -> &CapturedJson {
        &self.json
    }

    pub fn parsed_payload(&self) -> Option<&Value> {
        match &self.json {
            CapturedJson::Parsed(value) => Some(value),
            _ => None,
        }
    }

    pub fn parse_error(&self) -> Option<&str> {
        match &self.json {
            CapturedJson::Invalid(message) => Some(message),
            _ => None,
        }
    }

    pub fn into_payload(self) -> Option<Value> {
        match self.json {
            CapturedJson::Parsed(value) => Some(value),
            _ => None,
        }
    }
}

fn parse_document(raw: &str) -> CapturedJson {
    if raw.trim().is_empty() {
        return CapturedJson::Invalid("tool produced no output".to_string());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => CapturedJson::Parsed(value),
        Err(err) => CapturedJson::Invalid(format!("invalid JSON output: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn whole_output_is_one_document() {
        let raw = "{\n  \"ok\": true,\n  \"hits\": [1, 2]\n}\n".to_string();
        let result = ProcessResult::new(0, raw, true);
        assert_eq!(result.parsed_payload(), Some(&json!({"ok": true, "hits": [1, 2]})));
        assert_eq!(result.parse_error(), None);
    }

    #[test]
    fn trailing_log_line_is_a_parse_error() {
        let raw = "{\"ok\":true}\nwarning: cache cold\n".to_string();
        let result = ProcessResult::new(0, raw, true);
        assert!(result.parse_error().is_some());
        assert_eq!(result.exit_code(), 0);
    }

    #[test]
    fn parse_failure_does_not_mask_exit_code() {
        let result = ProcessResult::new(3, "boom".to_string(), true);
        assert_eq!(result.exit_code(), 3);
        assert!(result.parse_error().is_some());
        assert_eq!(result.raw_output(), "boom");
    }

    #[test]
    fn capture_off_skips_parsing() {
        let result = ProcessResult::new(0, "not json".to_string(), false);
        assert_eq!(result.json(), &CapturedJson::NotRequested);
    }
}
