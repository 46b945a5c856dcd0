//! JSON-lines session protocol for editor frontends.
//!
//! Each input line is one request object carrying `window`, `action` and the
//! action's fields (plus optional `id`, `hint`, `open_folders`). Requests run
//! concurrently; their statuses, panel output and final `result` events are
//! written as single JSON lines. All requests share one session registry, so
//! the one-watch-per-window rule holds for the whole editor.

use crate::dispatch::{Action, DispatchTarget, Dispatcher};
use crate::port::{BridgeEvent, EditorPort, JsonLinesPort};
use anyhow::Result;
use cleats_runner::WindowKey;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::JoinSet;

/// Serves requests from `input` until EOF or Ctrl-C. Pending requests are
/// answered before every watch is stopped.
pub async fn serve<R>(input: R, dispatcher: Arc<Dispatcher>, events: Arc<JsonLinesPort>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut in_flight = JoinSet::new();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    log::debug!("Session input closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_request(&line) {
                    Ok((id, target, action)) => {
                        let dispatcher = Arc::clone(&dispatcher);
                        let events = Arc::clone(&events);
                        in_flight.spawn(async move {
                            handle_request(&dispatcher, &events, id, target, action).await;
                        });
                    }
                    Err((id, window, message)) => {
                        log::warn!("Rejected session request: {message}");
                        events.emit(&BridgeEvent::Result {
                            id,
                            window,
                            ok: false,
                            data: Value::Null,
                            error: Some(message),
                        });
                    }
                }
            }
            _ = &mut ctrl_c => {
                log::info!("Interrupted; shutting down session");
                break;
            }
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(err) = joined {
            log::error!("Session request task failed: {err}");
        }
    }
    dispatcher.shutdown().await;
    Ok(())
}

/// Serves the session protocol on stdin/stdout.
pub async fn run_stdio(dispatcher: Arc<Dispatcher>, events: Arc<JsonLinesPort>) -> Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    serve(stdin, dispatcher, events).await
}

type Rejection = (Value, WindowKey, String);

fn parse_request(line: &str) -> std::result::Result<(Value, DispatchTarget, Action), Rejection> {
    let value: Value = serde_json::from_str(line)
        .map_err(|err| (Value::Null, WindowKey::new(""), format!("invalid request JSON: {err}")))?;
    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let window = value
        .get("window")
        .and_then(Value::as_str)
        .map(WindowKey::new)
        .unwrap_or_else(|| WindowKey::new(""));

    let target: DispatchTarget = serde_json::from_value(value.clone())
        .map_err(|err| (id.clone(), window.clone(), format!("invalid request target: {err}")))?;
    let action: Action = serde_json::from_value(value)
        .map_err(|err| (id.clone(), window.clone(), format!("invalid action: {err}")))?;
    Ok((id, target, action))
}

async fn handle_request(
    dispatcher: &Dispatcher,
    events: &JsonLinesPort,
    id: Value,
    target: DispatchTarget,
    action: Action,
) {
    let window = target.window.clone();
    match dispatcher.dispatch(&target, action).await {
        Ok(outcome) => events.emit(&BridgeEvent::Result {
            id,
            window,
            ok: true,
            data: outcome.to_json(),
            error: None,
        }),
        Err(err) => {
            events.show_error(&window, &err.to_string());
            events.emit(&BridgeEvent::Result {
                id,
                window,
                ok: false,
                data: serde_json::json!({ "kind": err.kind() }),
                error: Some(err.to_string()),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_target_and_action() {
        let (id, target, action) = parse_request(
            r#"{"id": 7, "window": "w1", "hint": "/r/src/a.js", "action": "watch"}"#,
        )
        .unwrap();
        assert_eq!(id, serde_json::json!(7));
        assert_eq!(target.window, WindowKey::from("w1"));
        assert_eq!(target.hint.as_deref(), Some(std::path::Path::new("/r/src/a.js")));
        assert_eq!(action, Action::Watch);
    }

    #[test]
    fn missing_window_is_rejected_with_id() {
        let (id, _, message) = parse_request(r#"{"id": "a", "action": "validate"}"#).unwrap_err();
        assert_eq!(id, serde_json::json!("a"));
        assert!(message.starts_with("invalid request target"));
    }

    #[test]
    fn unknown_action_is_rejected() {
        let (_, window, message) =
            parse_request(r#"{"window": "w", "action": "explode"}"#).unwrap_err();
        assert_eq!(window, WindowKey::from("w"));
        assert!(message.starts_with("invalid action"));
    }
}
