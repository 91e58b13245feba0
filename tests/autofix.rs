// tests/autofix.rs

//! Error classification driving concrete fixes

mod common;

use blackarch_aio::exec::CommandOutput;
use blackarch_aio::ignore::IgnoreSet;
use common::{Harness, ScriptedExecutor};

#[tokio::test]
async fn test_missing_packages_go_through_best_helper() {
    let h = Harness::new(ScriptedExecutor::with_tools(&["yay"]));
    let mut ignore = IgnoreSet::new();

    let handled = h
        .orchestrator
        .fixer()
        .classify_and_fix(
            "error: could not find all required packages: foo-utils bar-lib",
            &mut ignore,
        )
        .await;

    assert!(handled);
    assert!(ignore.is_empty());
    assert_eq!(h.executor.count("yay -S --needed --noconfirm foo-utils"), 1);
    assert_eq!(h.executor.count("yay -S --needed --noconfirm bar-lib"), 1);
    // The database lock is cleared before the installs
    assert!(h.executor.position("pkill -9 -x pacman") < h.executor.position("foo-utils"));
}

#[tokio::test]
async fn test_umbrella_package_replaces_missing_target() {
    let h = Harness::new(ScriptedExecutor::with_tools(&["yay"]));
    let mut ignore = IgnoreSet::new();

    let handled = h
        .orchestrator
        .fixer()
        .classify_and_fix(
            "error: target not found: nodejs-lts-iron\nerror: target not found: nodejs-lts-jod",
            &mut ignore,
        )
        .await;

    assert!(handled);
    let installs = h.executor.matching(" -S ");
    assert_eq!(
        installs,
        vec!["pacman -S --needed --noconfirm --disable-download-timeout nodejs"]
    );
    assert!(h.executor.calls().iter().any(|c| c.privileged && c.program() == "pacman"));
}

#[tokio::test]
async fn test_umbrellas_are_checked_in_configured_order() {
    let h = Harness::new(ScriptedExecutor::new());
    let fixer = h.orchestrator.fixer();

    assert_eq!(fixer.umbrella_for("nodejs-llvm-bindings"), Some("nodejs"));
    assert_eq!(fixer.umbrella_for("llvm-nodejs-shim"), Some("nodejs"));
    assert_eq!(fixer.umbrella_for("llvm17-libs"), Some("llvm"));
    assert_eq!(fixer.umbrella_for("foo-utils"), None);

    let mut ignore = IgnoreSet::new();
    let handled = fixer
        .classify_and_fix("error: target not found: llvm-nodejs-shim", &mut ignore)
        .await;
    assert!(handled);
    assert_eq!(
        h.executor.matching(" -S "),
        vec!["pacman -S --needed --noconfirm --disable-download-timeout nodejs"]
    );
}

#[tokio::test]
async fn test_unresolvable_dependency_ignores_parent() {
    let h = Harness::new(ScriptedExecutor::with_tools(&["reflector"]));
    let mut ignore = IgnoreSet::new();

    let handled = h
        .orchestrator
        .fixer()
        .classify_and_fix(
            "error: failed to prepare transaction (could not satisfy dependencies)\n\
             :: unable to satisfy dependency 'linenoise' required by wcc\n\
             warning: cannot resolve \"linenoise\", a dependency of \"wcc\"",
            &mut ignore,
        )
        .await;

    assert!(handled);
    assert!(ignore.contains("wcc"));
    assert!(!ignore.contains("linenoise"));
    assert!(h.executor.calls().is_empty());
}

#[tokio::test]
async fn test_mirror_failure_reselects_mirrors() {
    let h = Harness::new(ScriptedExecutor::with_tools(&["reflector"]));
    let mut ignore = IgnoreSet::new();

    let handled = h
        .orchestrator
        .fixer()
        .classify_and_fix(
            "error: failed retrieving file 'extra.db' from mirror.example : Operation too slow",
            &mut ignore,
        )
        .await;

    assert!(handled);
    assert!(h.executor.count("reflector") >= 1);
    assert_eq!(h.locator.lookups(), 1);
}

#[tokio::test]
async fn test_mirror_failure_is_handled_even_when_reselection_fails() {
    let executor = ScriptedExecutor::with_tools(&["reflector"]);
    executor.respond("reflector", CommandOutput::failed(1, "error: no mirrors"));
    let h = Harness::new(executor);
    let mut ignore = IgnoreSet::new();

    let handled = h
        .orchestrator
        .fixer()
        .classify_and_fix("error: failed to retrieve some files", &mut ignore)
        .await;

    assert!(handled);
    assert_eq!(h.executor.count("mv -f"), 0);
}

#[tokio::test]
async fn test_failed_generic_install_is_still_handled() {
    let executor = ScriptedExecutor::with_tools(&["paru"]);
    executor.respond("paru -S", CommandOutput::failed(1, "error: build failed"));
    let h = Harness::new(executor);
    let mut ignore = IgnoreSet::new();

    let handled = h
        .orchestrator
        .fixer()
        .classify_and_fix("-> No AUR package found for ghidra-git", &mut ignore)
        .await;

    assert!(handled);
    assert_eq!(h.executor.count("paru -S --needed --noconfirm ghidra-git"), 1);
}

#[tokio::test]
async fn test_unclassified_error_takes_no_action() {
    let h = Harness::new(ScriptedExecutor::with_tools(&["yay", "reflector"]));
    let mut ignore = IgnoreSet::new();

    let handled = h
        .orchestrator
        .fixer()
        .classify_and_fix("error: could not open file /var/cache: Permission denied", &mut ignore)
        .await;

    assert!(!handled);
    assert!(ignore.is_empty());
    assert!(h.executor.calls().is_empty());
}
