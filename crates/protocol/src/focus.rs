//! Map focus strings: repo-relative, forward-slash paths, optionally suffixed
//! with `::symbol`.

use std::path::Path;

/// Focus for a file or directory, relative to `root` when it lives under it.
pub fn relative_focus(root: &Path, target: &Path) -> String {
    if target.as_os_str().is_empty() {
        return String::new();
    }
    if target.is_absolute() {
        if let Ok(rel) = target.strip_prefix(root) {
            return normalize_focus_path(&rel.to_string_lossy());
        }
        return target.to_string_lossy().replace('\\', "/");
    }
    normalize_focus_path(&target.to_string_lossy())
}

/// Focus for a symbol, qualified by its file when one is known.
pub fn symbol_focus(root: &Path, file: Option<&Path>, symbol: &str) -> String {
    let symbol = symbol.trim();
    match file.map(|file| relative_focus(root, file)) {
        Some(rel) if !rel.is_empty() => format!("{rel}::{symbol}"),
        _ => symbol.to_string(),
    }
}

pub fn normalize_focus_path(raw: &str) -> String {
    let mut value = raw.trim().replace('\\', "/");
    while let Some(stripped) = value.strip_prefix("./") {
        value = stripped.to_string();
    }
    let value = value.trim_end_matches('/');
    if value == "." {
        return String::new();
    }
    value.to_string()
}
