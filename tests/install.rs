// tests/install.rs

//! Full installation flow and the small entry points

mod common;

use blackarch_aio::exec::CommandOutput;
use common::{Harness, ScriptedExecutor, StaticLocator};
use serde_json::json;
use std::fs;

#[tokio::test]
async fn test_install_pins_unavailable_core_package() {
    let executor = ScriptedExecutor::with_tools(&["yay", "reflector"]);
    executor.respond(
        "blackarch-officials",
        CommandOutput::failed(1, "error: target not found: blackarch-officials"),
    );
    let h = Harness::new(executor);

    let outcome = h.orchestrator.run_install().await;

    assert!(outcome.success);
    assert_eq!(outcome.details["helper"], json!("yay"));
    assert_eq!(outcome.details["ignored"], json!(["blackarch-officials"]));
    assert_eq!(outcome.details["mirrors"]["success"], json!(true));

    // pacman.conf is only ever written by a privileged install
    let pacman_conf = h.orchestrator.config().paths.pacman_conf.clone();
    let writes: Vec<_> = h
        .executor
        .calls()
        .into_iter()
        .filter(|c| c.program() == "install")
        .collect();
    assert_eq!(writes.len(), 1);
    assert!(writes[0].privileged);
    assert_eq!(writes[0].argv[1..3], ["-m".to_string(), "644".to_string()]);
    assert_eq!(writes[0].argv.last(), Some(&pacman_conf.to_string_lossy().into_owned()));

    let conf = fs::read_to_string(&pacman_conf).unwrap();
    assert!(conf.contains("[options]\nIgnorePkg = blackarch-officials\n"));
    assert!(conf.contains("[blackarch]"));

    // pacman then yay; no other helper is installed
    assert_eq!(h.executor.count("blackarch-officials"), 2);

    let tags = h.backend.tags();
    assert_eq!(tags.first().map(String::as_str), Some("install-full [pre]"));
    assert_eq!(tags.last().map(String::as_str), Some("install-full [post-OK]"));
    for tag in [
        "install-ensure-helpers [post-OK]",
        "install-fix-problematic-packages [post-FAILED]",
        "install-pin-ignored [post-OK]",
        "install-categories-yay [post-OK]",
        "install-update-mirrorlist [post-OK]",
    ] {
        assert!(tags.contains(&tag.to_string()), "missing {tag}");
    }
}

#[tokio::test]
async fn test_install_falls_back_to_next_helper_for_categories() {
    let executor = ScriptedExecutor::with_tools(&["yay", "reflector"]);
    executor.respond("yay -S --needed --noconfirm blackarch-", CommandOutput::failed(1, "error: conflicting files"));
    let h = Harness::new(executor);

    let outcome = h.orchestrator.run_install().await;

    assert!(outcome.success);
    assert_eq!(outcome.details["helper"], json!("pacman"));
    assert!(h.backend.tags().contains(&"install-categories-yay [post-FAILED]".to_string()));
}

#[tokio::test]
async fn test_install_fails_when_every_helper_fails() {
    let executor = ScriptedExecutor::with_tools(&["reflector"]);
    executor.respond("blackarch-webapp", CommandOutput::failed(1, "error: conflicting files"));
    let h = Harness::new(executor);

    let outcome = h.orchestrator.run_install().await;

    assert!(!outcome.success);
    assert_eq!(h.executor.count("reflector --"), 0);
    assert_eq!(
        h.backend.tags().last().map(String::as_str),
        Some("install-full [post-FAILED]")
    );
}

#[tokio::test]
async fn test_new_official_categories_are_installed() {
    let executor = ScriptedExecutor::with_tools(&["yay", "reflector"]);
    executor.respond(
        "pacman -Sg",
        CommandOutput::ok("blackarch-webapp nmap\nblackarch-quantum qiskit\nbase-devel gcc\n"),
    );
    let h = Harness::new(executor);

    let outcome = h.orchestrator.run_install().await;

    assert!(outcome.success);
    let install = h.executor.matching("yay -S --needed --noconfirm blackarch-");
    assert_eq!(install.len(), 1);
    assert!(install[0].contains("blackarch-quantum"));
    assert!(!install[0].contains("base-devel"));
}

#[tokio::test]
async fn test_helper_ensure_entry_point() {
    let executor = ScriptedExecutor::new();
    executor.respond("paru", CommandOutput::failed(1, "error: build failed"));
    let h = Harness::new(executor);

    let outcome = h.orchestrator.run_helper_ensure().await;

    assert!(outcome.success);
    assert_eq!(outcome.details["helpers"]["installed"][0], json!("yay"));
    assert_eq!(outcome.details["helpers"]["failed"], json!(["paru"]));
    assert!(h.executor.position("pkill") < h.executor.position("-S --needed"));

    assert_eq!(h.backend.tags(), vec!["fix-helpers [pre]", "fix-helpers [post-OK]"]);
    assert_eq!(
        h.backend.paired_with("fix-helpers [post-OK]"),
        h.backend.id_of("fix-helpers [pre]")
    );
}

#[tokio::test]
async fn test_mirror_entry_point_reports_selection() {
    let h = Harness::build(
        ScriptedExecutor::with_tools(&["reflector"]),
        StaticLocator::unreachable(),
        |_| {},
    );

    let outcome = h.orchestrator.run_mirror_optimize(Some("br")).await;

    assert!(outcome.success);
    assert_eq!(outcome.details["mirrors"]["tier"], json!("proximity"));
    assert_eq!(outcome.details["mirrors"]["country"], json!("BR"));
    assert_eq!(h.locator.lookups(), 0);

    assert_eq!(
        h.backend.tags(),
        vec!["update-mirrorlist [pre]", "update-mirrorlist [post-OK]"]
    );
    assert_eq!(
        h.backend.paired_with("update-mirrorlist [post-OK]"),
        h.backend.id_of("update-mirrorlist [pre]")
    );
}

#[tokio::test]
async fn test_failed_mirror_entry_point_closes_scope_as_failed() {
    let executor = ScriptedExecutor::with_tools(&["reflector"]);
    executor.respond("reflector --", CommandOutput::failed(1, "error: no mirrors"));
    let h = Harness::build(executor, StaticLocator::unreachable(), |_| {});

    let outcome = h.orchestrator.run_mirror_optimize(None).await;

    assert!(!outcome.success);
    assert_eq!(outcome.details["mirrors"]["success"], json!(false));
    assert_eq!(
        h.backend.tags(),
        vec!["update-mirrorlist [pre]", "update-mirrorlist [post-FAILED]"]
    );
}

#[tokio::test]
async fn test_failed_pacman_conf_write_closes_pin_scope_as_failed() {
    let executor = ScriptedExecutor::with_tools(&["yay", "reflector"]);
    executor.respond(
        "blackarch-officials",
        CommandOutput::failed(1, "error: target not found: blackarch-officials"),
    );
    executor.respond("install -m 644", CommandOutput::failed(1, "install: Permission denied"));
    let h = Harness::new(executor);

    let outcome = h.orchestrator.run_install().await;

    assert!(outcome.success);
    let conf = fs::read_to_string(&h.orchestrator.config().paths.pacman_conf).unwrap();
    assert!(!conf.contains("IgnorePkg"));
    assert!(h.backend.tags().contains(&"install-pin-ignored [post-FAILED]".to_string()));
}
