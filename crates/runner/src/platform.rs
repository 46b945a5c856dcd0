use std::path::{Path, PathBuf};

const CMD_SHELL: &str = "cmd.exe";
const SCRIPT_HOST: &str = "powershell.exe";

/// Rewrites `(executable, argv)` so batch and PowerShell scripts can be
/// spawned directly on Windows. Other targets pass through untouched.
pub fn wrap_for_platform(executable: &Path, argv: Vec<String>, windows: bool) -> (PathBuf, Vec<String>) {
    if !windows {
        return (executable.to_path_buf(), argv);
    }
    let ext = executable
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    let target = executable.to_string_lossy().into_owned();
    match ext.as_deref() {
        Some("cmd") | Some("bat") => {
            let mut wrapped = vec!["/d".to_string(), "/c".to_string(), target];
            wrapped.extend(argv);
            (PathBuf::from(CMD_SHELL), wrapped)
        }
        Some("ps1") => {
            let mut wrapped = vec![
                "-NoProfile".to_string(),
                "-ExecutionPolicy".to_string(),
                "Bypass".to_string(),
                "-File".to_string(),
                target,
            ];
            wrapped.extend(argv);
            (PathBuf::from(SCRIPT_HOST), wrapped)
        }
        _ => (executable.to_path_buf(), argv),
    }
}
