use cleats_protocol::{ToolSource, PROJECT_MARKER_FILE};
use cleats_runner::{ProjectLocator, RootDiagnostic, ToolConfig, ToolResolver};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, "").expect("write file");
}

#[test]
fn nested_marker_wins_over_enclosing_checkout() {
    let temp = TempDir::new().expect("tempdir");
    let outer = temp.path().join("mono");
    let inner = outer.join("packages/app");
    fs::create_dir_all(outer.join(".git")).expect("git dir");
    touch(&inner.join(PROJECT_MARKER_FILE));
    touch(&inner.join("src/index.js"));

    let located = ProjectLocator::default().locate(Some(&inner.join("src/index.js")), &[]);
    assert_eq!(located.root, Some(inner));
    assert_eq!(located.diagnostic, None);
}

#[test]
fn located_root_is_an_ancestor_of_the_hint() {
    let temp = TempDir::new().expect("tempdir");
    let repo = temp.path().join("repo");
    fs::create_dir_all(repo.join(".git")).expect("git dir");
    let deep = repo.join("a/b/c");
    fs::create_dir_all(&deep).expect("deep dir");

    let located = ProjectLocator::default().locate(Some(&deep), &[]);
    let root = located.root.expect("root");
    assert!(deep.starts_with(&root));
    assert!(root.join(".git").exists());
}

#[test]
fn open_folders_are_searched_in_sorted_order() {
    let temp = TempDir::new().expect("tempdir");
    let beta = temp.path().join("beta");
    let alpha = temp.path().join("alpha");
    fs::create_dir_all(beta.join(".git")).expect("beta git");
    fs::create_dir_all(alpha.join(".git")).expect("alpha git");

    let located = ProjectLocator::default().locate(None, &[beta, alpha.clone()]);
    assert_eq!(located.root, Some(alpha));
}

#[test]
fn unmarked_hint_falls_back_with_diagnostic() {
    let temp = TempDir::new().expect("tempdir");
    let locator = ProjectLocator::new(vec![PROJECT_MARKER_FILE.to_string()], Vec::new());
    let plain = temp.path().join("plain");
    fs::create_dir_all(&plain).expect("plain dir");

    let located = locator.locate(Some(&plain), &[]);
    assert_eq!(located.root, Some(plain));
    assert_eq!(located.diagnostic, Some(RootDiagnostic::UsingHintPath));

    let folder = temp.path().join("folder");
    fs::create_dir_all(&folder).expect("folder dir");
    let located = locator.locate(None, &[folder.clone()]);
    assert_eq!(located.root, Some(folder));
    assert_eq!(located.diagnostic, Some(RootDiagnostic::UsingOpenFolder));
}

#[test]
fn explicit_tool_path_beats_everything_else() {
    let temp = TempDir::new().expect("tempdir");
    let root = temp.path();
    touch(&root.join("node_modules/.bin/pairofcleats"));
    touch(&root.join("bin/pairofcleats.js"));

    let config = ToolConfig {
        tool_path: Some(PathBuf::from("tools/custom-cleats")),
        ..ToolConfig::default()
    };
    let invocation = ToolResolver.resolve(&config, root);
    assert_eq!(invocation.source(), ToolSource::ExplicitConfig);
    assert_eq!(invocation.executable(), &root.join("tools/custom-cleats"));
    assert!(invocation.args_prefix().is_empty());
}

#[test]
fn local_install_beats_repo_script() {
    let temp = TempDir::new().expect("tempdir");
    let root = temp.path();
    touch(&root.join("node_modules/.bin/pairofcleats.cmd"));
    touch(&root.join("bin/pairofcleats.js"));

    let invocation = ToolResolver.resolve(&ToolConfig::default(), root);
    assert_eq!(invocation.source(), ToolSource::LocalInstall);
    assert_eq!(
        invocation.executable(),
        &root.join("node_modules/.bin/pairofcleats.cmd")
    );
}

#[test]
fn repo_script_runs_through_the_interpreter_without_extra_args() {
    let temp = TempDir::new().expect("tempdir");
    let root = temp.path();
    let script = root.join("bin/pairofcleats.js");
    touch(&script);

    let config = ToolConfig {
        tool_args: vec!["--trace".to_string()],
        interpreter: Some(PathBuf::from("/opt/node/bin/node")),
        ..ToolConfig::default()
    };
    let invocation = ToolResolver.resolve(&config, root);
    assert_eq!(invocation.source(), ToolSource::RepoLocal);
    assert_eq!(invocation.executable(), &PathBuf::from("/opt/node/bin/node"));
    assert_eq!(
        invocation.args_prefix().to_vec(),
        vec![script.to_string_lossy().into_owned()]
    );
}

#[test]
fn command_on_path_keeps_extra_args() {
    let temp = TempDir::new().expect("tempdir");
    let config = ToolConfig {
        tool_args: vec!["--trace".to_string()],
        ..ToolConfig::default()
    };
    let invocation = ToolResolver.resolve(&config, temp.path());
    assert_eq!(invocation.source(), ToolSource::SystemPath);
    assert_eq!(invocation.executable(), &PathBuf::from("pairofcleats"));
    assert_eq!(invocation.args_prefix().to_vec(), vec!["--trace".to_string()]);
}
