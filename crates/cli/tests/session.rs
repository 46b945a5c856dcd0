#![cfg(unix)]

use assert_cmd::Command;
use cleats_cli::dispatch::Dispatcher;
use cleats_cli::port::JsonLinesPort;
use cleats_cli::serve::serve;
use cleats_cli::settings::BridgeSettings;
use cleats_runner::ProcessRunner;
use serde_json::Value;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;

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

impl SharedBuf {
    fn events(&self) -> Vec<Value> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).expect("one JSON event per line"))
            .collect()
    }
}

fn setup_repo() -> (TempDir, PathBuf) {
    let temp = TempDir::new().expect("tempdir");
    let root = temp.path().join("repo");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join(".pairofcleats.json"), "{}").unwrap();
    fs::write(
        temp.path().join("tool.sh"),
        "case \"$1 $2\" in \"index watch\") exec sleep 30 ;; esac\n",
    )
    .unwrap();
    (temp, root)
}

#[tokio::test]
async fn session_answers_each_request_and_stops_watches_on_eof() {
    let (temp, root) = setup_repo();
    let mut settings = BridgeSettings::default();
    settings.tool_path = Some(PathBuf::from("/bin/sh"));
    settings.tool_args = vec![temp.path().join("tool.sh").to_string_lossy().into_owned()];

    let buf = SharedBuf::default();
    let events = Arc::new(JsonLinesPort::new(buf.clone()));
    let dispatcher = Arc::new(Dispatcher::new(settings, events.clone()));
    let registry = Arc::clone(dispatcher.registry());

    let hint = root.to_string_lossy().into_owned();
    let input = format!(
        "{}\n{}\n\nnot json\n",
        serde_json::json!({"id": 1, "window": "w1", "hint": hint, "action": "watch"}),
        serde_json::json!({"id": 2, "window": "w1", "hint": hint, "action": "watch"}),
    );
    serve(input.as_bytes(), dispatcher, events).await.unwrap();

    let results: Vec<Value> = buf
        .events()
        .into_iter()
        .filter(|event| event["event"] == "result")
        .collect();
    assert_eq!(results.len(), 3);

    let by_id = |id: i64| {
        results
            .iter()
            .find(|event| event["id"] == id)
            .cloned()
            .unwrap_or_else(|| panic!("no result for request {id}"))
    };
    assert_eq!(by_id(1)["ok"], true);
    assert_eq!(by_id(1)["data"]["kind"], "watch_started");
    assert_eq!(by_id(2)["data"]["kind"], "watch_already_running");

    let rejected = results
        .iter()
        .find(|event| event["id"].is_null())
        .expect("malformed line is answered");
    assert_eq!(rejected["ok"], false);

    assert!(registry.active_windows().is_empty());
}

async fn wait_for_pid(path: &Path) -> String {
    for _ in 0..250 {
        if let Ok(pid) = fs::read_to_string(path) {
            if !pid.trim().is_empty() {
                return pid.trim().to_string();
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("watch never wrote {}", path.display());
}

fn process_alive(pid: &str) -> bool {
    std::process::Command::new("/bin/sh")
        .args(["-c", &format!("kill -0 {pid}")])
        .stderr(std::process::Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn session_end_outlasts_watches_that_ignore_terminate() {
    let (temp, root) = setup_repo();
    let pid_file = temp.path().join("watch.pid");
    fs::write(
        temp.path().join("stubborn.sh"),
        "case \"$1 $2\" in \"index watch\") trap '' TERM; echo $$ > \"$(dirname \"$0\")/watch.pid\"; exec sleep 30 ;; esac\n",
    )
    .unwrap();
    let mut settings = BridgeSettings::default();
    settings.tool_path = Some(PathBuf::from("/bin/sh"));
    settings.tool_args = vec![temp.path().join("stubborn.sh").to_string_lossy().into_owned()];

    let buf = SharedBuf::default();
    let events = Arc::new(JsonLinesPort::new(buf.clone()));
    let dispatcher = Arc::new(
        Dispatcher::new(settings, events.clone())
            .with_runner(ProcessRunner::with_grace(Duration::from_millis(300))),
    );

    let (mut client, server) = tokio::io::duplex(4096);
    let session = tokio::spawn(serve(tokio::io::BufReader::new(server), dispatcher, events));
    let request = serde_json::json!({
        "id": 1, "window": "w1", "hint": root.to_string_lossy(), "action": "watch"
    });
    client
        .write_all(format!("{request}\n").as_bytes())
        .await
        .unwrap();
    let pid = wait_for_pid(&pid_file).await;
    assert!(process_alive(&pid));

    drop(client);
    tokio::time::timeout(Duration::from_secs(10), session)
        .await
        .expect("session ends after the kill deadline")
        .unwrap()
        .unwrap();
    assert!(!process_alive(&pid), "watch {pid} survived the session");
}

#[test]
#[allow(deprecated)]
fn watch_prints_its_outcome_as_json() {
    let (temp, root) = setup_repo();
    fs::write(temp.path().join("quick.sh"), "exit 0\n").unwrap();
    let settings = temp.path().join("settings.json");
    fs::write(
        &settings,
        serde_json::json!({
            "tool_path": "/bin/sh",
            "tool_args": [temp.path().join("quick.sh")],
        })
        .to_string(),
    )
    .unwrap();

    let output = Command::cargo_bin("cleats-bridge")
        .expect("binary")
        .args(["--quiet", "--json", "--settings"])
        .arg(&settings)
        .args(["watch", "--path"])
        .arg(&root)
        .output()
        .expect("command run");
    assert!(output.status.success());
    let outcome: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(outcome["kind"], "watch_started");
    assert_eq!(outcome["root"], root.to_string_lossy().as_ref());
}

#[test]
#[allow(deprecated)]
fn locate_prints_marked_root() {
    let (_temp, root) = setup_repo();
    let nested = root.join("src/deep");
    fs::create_dir_all(&nested).unwrap();

    let output = Command::cargo_bin("cleats-bridge")
        .expect("binary")
        .args(["--quiet", "--json", "locate", "--path"])
        .arg(&nested)
        .output()
        .expect("command run");
    assert!(output.status.success());
    let located: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(located["root"], root.to_string_lossy().as_ref());
    assert!(located["diagnostic"].is_null());
}

#[test]
#[allow(deprecated)]
fn resolve_reports_explicit_tool() {
    let (temp, root) = setup_repo();
    let tool = temp.path().join("tool.sh");

    let output = Command::cargo_bin("cleats-bridge")
        .expect("binary")
        .args(["--quiet", "resolve", "--tool-path"])
        .arg(&tool)
        .arg("--path")
        .arg(&root)
        .output()
        .expect("command run");
    assert!(output.status.success());
    let body: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(body["invocation"]["executable"], tool.to_string_lossy().as_ref());
    assert_eq!(body["invocation"]["source"], "explicit_config");
}
