use cleats_runner::WindowKey;
use serde::Serialize;
use serde_json::Value;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

/// Named output areas of the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Panel {
    #[serde(rename = "pairofcleats-index")]
    Index,
    #[serde(rename = "pairofcleats-validate")]
    Validate,
    #[serde(rename = "pairofcleats-map")]
    Map,
    #[serde(rename = "pairofcleats-results")]
    Results,
}

impl Panel {
    pub fn as_str(self) -> &'static str {
        match self {
            Panel::Index => "pairofcleats-index",
            Panel::Validate => "pairofcleats-validate",
            Panel::Map => "pairofcleats-map",
            Panel::Results => "pairofcleats-results",
        }
    }
}

/// The editor surface a dispatch reports to.
///
/// Implementations must tolerate calls from any task.
pub trait EditorPort: Send + Sync {
    fn show_status(&self, window: &WindowKey, message: &str);
    fn show_error(&self, window: &WindowKey, message: &str);
    /// Replaces the panel content.
    fn write_panel(&self, window: &WindowKey, panel: Panel, text: &str);
    fn append_panel_line(&self, window: &WindowKey, panel: Panel, line: &str);
}

/// Port for one-shot commands: statuses and errors on stderr, panel text on
/// stdout unless stdout is reserved for JSON.
#[derive(Debug, Default)]
pub struct TerminalPort {
    json_output: bool,
}

impl TerminalPort {
    pub fn new(json_output: bool) -> Self {
        Self { json_output }
    }

    fn panel_text(&self, text: &str) {
        let text = text.trim_end_matches('\n');
        if self.json_output {
            eprintln!("{text}");
            return;
        }
        let mut stdout = io::stdout().lock();
        if let Err(err) = writeln!(stdout, "{text}").and_then(|_| stdout.flush()) {
            if err.kind() != io::ErrorKind::BrokenPipe {
                log::warn!("Failed to write panel output: {err}");
            }
        }
    }
}

impl EditorPort for TerminalPort {
    fn show_status(&self, _window: &WindowKey, message: &str) {
        eprintln!("PairOfCleats: {message}");
    }

    fn show_error(&self, _window: &WindowKey, message: &str) {
        eprintln!("PairOfCleats error: {message}");
    }

    fn write_panel(&self, _window: &WindowKey, _panel: Panel, text: &str) {
        self.panel_text(text);
    }

    fn append_panel_line(&self, _window: &WindowKey, _panel: Panel, line: &str) {
        self.panel_text(line);
    }
}

/// One line of the session protocol written to the frontend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BridgeEvent {
    Status {
        window: WindowKey,
        message: String,
    },
    Error {
        window: WindowKey,
        message: String,
    },
    Panel {
        window: WindowKey,
        panel: Panel,
        text: String,
    },
    Line {
        window: WindowKey,
        panel: Panel,
        line: String,
    },
    Result {
        #[serde(skip_serializing_if = "Value::is_null")]
        id: Value,
        window: WindowKey,
        ok: bool,
        #[serde(skip_serializing_if = "Value::is_null")]
        data: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Port for the session server: every call becomes one JSON line.
pub struct JsonLinesPort {
    out: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesPort {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn emit(&self, event: &BridgeEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(err) => {
                log::error!("Failed to serialize event: {err}");
                return;
            }
        };
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = writeln!(out, "{line}").and_then(|_| out.flush()) {
            log::warn!("Failed to write event: {err}");
        }
    }
}

impl EditorPort for JsonLinesPort {
    fn show_status(&self, window: &WindowKey, message: &str) {
        self.emit(&BridgeEvent::Status {
            window: window.clone(),
            message: message.to_string(),
        });
    }

    fn show_error(&self, window: &WindowKey, message: &str) {
        self.emit(&BridgeEvent::Error {
            window: window.clone(),
            message: message.to_string(),
        });
    }

    fn write_panel(&self, window: &WindowKey, panel: Panel, text: &str) {
        self.emit(&BridgeEvent::Panel {
            window: window.clone(),
            panel,
            text: text.to_string(),
        });
    }

    fn append_panel_line(&self, window: &WindowKey, panel: Panel, line: &str) {
        self.emit(&BridgeEvent::Line {
            window: window.clone(),
            panel,
            line: line.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn json_lines_port_writes_one_event_per_line() {
        let buf = SharedBuf::default();
        let port = JsonLinesPort::new(buf.clone());
        let window = WindowKey::from("w1");
        port.show_status(&window, "searching...");
        port.append_panel_line(&window, Panel::Index, "indexed 3 files");

        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let events: Vec<Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(
            events,
            vec![
                serde_json::json!({"event": "status", "window": "w1", "message": "searching..."}),
                serde_json::json!({
                    "event": "line",
                    "window": "w1",
                    "panel": "pairofcleats-index",
                    "line": "indexed 3 files"
                }),
            ]
        );
    }
}
