// src/helpers/catalog.rs

//! Built-in helper catalog
//!
//! Declaration order matters: it is the order the installer walks when it
//! tries every installed helper in turn.

use super::{CommandTemplate, HelperActions, HelperDescriptor};

fn template(argv: &[&str]) -> CommandTemplate {
    CommandTemplate::new(argv.iter().copied())
}

fn helper(name: &str, install: &[&str], upgrade: &[&str], download: &[&str]) -> HelperDescriptor {
    HelperDescriptor::new(
        name,
        HelperActions {
            install: template(install),
            upgrade: template(upgrade),
            download: template(download),
        },
    )
}

/// Every helper the orchestrator knows how to drive
pub fn builtin_helpers() -> Vec<HelperDescriptor> {
    vec![
        helper(
            "yay",
            &["yay", "-S", "--needed", "--noconfirm"],
            &[
                "yay",
                "-Syuu",
                "--noconfirm",
                "--answerclean=All",
                "--answerdiff=None",
                "--mflags",
                "--nocheck",
                "--overwrite",
                "*",
            ],
            &["yay", "-Syuuw", "--noconfirm"],
        ),
        helper(
            "paru",
            &["paru", "-S", "--needed", "--noconfirm"],
            &[
                "paru",
                "-Syuu",
                "--noconfirm",
                "--mflags",
                "--nocheck",
                "--overwrite",
                "*",
            ],
            &["paru", "-Syuuw", "--noconfirm"],
        ),
        helper(
            "pacaur",
            &["pacaur", "-S", "--needed", "--noconfirm"],
            &["pacaur", "-Syuu", "--noconfirm", "--noedit"],
            &["pacaur", "-Syuuw", "--noconfirm"],
        ),
        helper(
            "trizen",
            &["trizen", "-S", "--needed", "--noconfirm", "--noedit"],
            &["trizen", "-Syuu", "--noconfirm", "--noedit"],
            &["trizen", "-Syuuw", "--noconfirm", "--noedit"],
        ),
        helper(
            "pikaur",
            &["pikaur", "-S", "--needed", "--noconfirm"],
            &["pikaur", "-Syuu", "--noconfirm"],
            &["pikaur", "-Syuuw", "--noconfirm"],
        ),
        helper(
            "aurman",
            &["aurman", "-S", "--needed", "--noconfirm", "--noedit"],
            &["aurman", "-Syuu", "--noconfirm", "--noedit"],
            &["aurman", "-Syuuw", "--noconfirm", "--noedit"],
        ),
        helper(
            "pamac",
            &["pamac", "install", "--no-confirm"],
            &["pamac", "upgrade", "--no-confirm"],
            &["pamac", "update", "--download-only", "--no-confirm"],
        ),
        helper(
            "pacman",
            &[
                "pacman",
                "-S",
                "--needed",
                "--noconfirm",
                "--disable-download-timeout",
            ],
            &[
                "pacman",
                "-Syuu",
                "--needed",
                "--noconfirm",
                "--noprogressbar",
                "--disable-download-timeout",
                "--ask",
                "4",
                "--overwrite",
                "*",
            ],
            &[
                "pacman",
                "-Syuuw",
                "--needed",
                "--noconfirm",
                "--noprogressbar",
                "--disable-download-timeout",
                "--ask",
                "4",
            ],
        )
        .privileged(),
        // GUI frontends: known, never driven automatically
        HelperDescriptor::gui("bauh"),
        HelperDescriptor::gui("octopi"),
    ]
}
