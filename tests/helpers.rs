// tests/helpers.rs

//! Helper selection, fallback installs and helper provisioning

mod common;

use blackarch_aio::exec::CommandOutput;
use blackarch_aio::helpers::HelperRegistry;
use blackarch_aio::ignore::IgnoreSet;
use common::ScriptedExecutor;

#[tokio::test]
async fn test_fallback_stops_at_first_success() {
    let registry = HelperRegistry::builtin().unwrap();
    let executor = ScriptedExecutor::with_tools(&["paru", "yay", "trizen"]);
    executor.respond("pacman -S ", CommandOutput::failed(1, "error: target not found: nmap-git"));
    executor.respond("paru -S ", CommandOutput::failed(1, "error: build failed"));

    let attempt = registry
        .install_with_fallback(&executor, "nmap-git", &IgnoreSet::new())
        .await;

    assert!(attempt.success);
    assert_eq!(attempt.helper.as_deref(), Some("yay"));

    let programs: Vec<String> = executor
        .calls()
        .iter()
        .map(|c| c.program().to_string())
        .collect();
    assert_eq!(programs, vec!["pacman", "paru", "yay"]);
    assert_eq!(executor.count("trizen"), 0);
}

#[tokio::test]
async fn test_fallback_skips_helpers_that_are_not_installed() {
    let registry = HelperRegistry::builtin().unwrap();
    let executor = ScriptedExecutor::with_tools(&["pikaur"]);
    executor.respond("pacman -S ", CommandOutput::failed(1, "error: target not found"));

    let attempt = registry
        .install_with_fallback(&executor, "wcc", &IgnoreSet::new())
        .await;

    assert_eq!(attempt.helper.as_deref(), Some("pikaur"));
    assert_eq!(
        executor.command_lines(),
        vec![
            "pacman -S --needed --noconfirm --disable-download-timeout wcc",
            "pikaur -S --needed --noconfirm wcc",
        ]
    );
}

#[tokio::test]
async fn test_fallback_exhausted() {
    let registry = HelperRegistry::builtin().unwrap();
    let executor = ScriptedExecutor::with_tools(&["yay"]);
    executor.respond(" -S ", CommandOutput::failed(1, "error: nope"));

    let attempt = registry
        .install_with_fallback(&executor, "nope", &IgnoreSet::new())
        .await;

    assert!(!attempt.success);
    assert_eq!(attempt.helper, None);
    assert_eq!(executor.calls().len(), 2);
}

#[tokio::test]
async fn test_install_carries_ignore_flags() {
    let registry = HelperRegistry::builtin().unwrap();
    let executor = ScriptedExecutor::new();
    let mut ignore = IgnoreSet::new();
    ignore.insert("wcc");

    registry.install_with_fallback(&executor, "nodejs", &ignore).await;

    let call = &executor.calls()[0];
    assert!(call.privileged);
    assert_eq!(
        call.command_line(),
        "pacman -S --needed --noconfirm --disable-download-timeout nodejs --ignore wcc"
    );
}

#[test]
fn test_best_available_is_deterministic() {
    let registry = HelperRegistry::builtin().unwrap();

    let executor = ScriptedExecutor::with_tools(&["pikaur", "yay", "paru"]);
    assert_eq!(registry.best_available(&executor).name, "paru");
    assert_eq!(registry.best_available(&executor).name, "paru");

    let executor = ScriptedExecutor::with_tools(&["pikaur", "trizen"]);
    assert_eq!(registry.best_available(&executor).name, "trizen");

    // GUI frontends are never picked
    let executor = ScriptedExecutor::with_tools(&["octopi", "bauh"]);
    assert_eq!(registry.best_available(&executor).name, "pacman");
    assert!(registry.secondary(&executor).is_none());
}

#[tokio::test]
async fn test_ensure_helpers_bootstraps_through_baseline() {
    let registry = HelperRegistry::builtin().unwrap();
    let executor = ScriptedExecutor::with_tools(&["paru"]);

    let report = registry.ensure_helpers(&executor).await;

    assert!(report.bootstrap_ready());
    assert_eq!(report.installed[0], "yay");
    assert!(report.present.contains(&"paru".to_string()));
    assert!(report.failed.is_empty());

    let lines = executor.command_lines();
    assert_eq!(
        lines[0],
        "pacman -S --needed --noconfirm --disable-download-timeout yay"
    );
    assert!(lines[1..].iter().all(|l| l.starts_with("yay -S --needed --noconfirm ")));
    assert!(executor.matching("paru").is_empty());
}

#[tokio::test]
async fn test_ensure_helpers_without_bootstrap() {
    let registry = HelperRegistry::builtin().unwrap();
    let executor = ScriptedExecutor::new();
    executor.respond("pacman -S ", CommandOutput::failed(1, "error: target not found: yay"));

    let report = registry.ensure_helpers(&executor).await;

    assert!(!report.bootstrap_ready());
    assert!(report.installed.is_empty());
    assert!(report.failed.contains(&"yay".to_string()));
    assert!(report.failed.contains(&"paru".to_string()));
    assert_eq!(executor.calls().len(), 1);
}
