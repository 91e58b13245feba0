// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("blackarch-aio")
        .version(env!("CARGO_PKG_VERSION"))
        .author("BlackArch AIO Contributors")
        .about("BlackArch installer and self-repairing system updater")
        .subcommand_required(false)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .global(true)
                .help("Configuration file (default: /etc/blackarch-aio/config.toml)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(clap::ArgAction::SetTrue)
                .help("Debug logging unless RUST_LOG says otherwise"),
        )
        .subcommand(Command::new("install").about("Run the full BlackArch installation"))
        .subcommand(Command::new("update").about("Unified system update with automatic repair"))
        .subcommand(Command::new("fix-helpers").about("Install missing AUR helpers"))
        .subcommand(
            Command::new("mirrors")
                .about("Rank mirrors and install a fresh mirrorlist")
                .arg(
                    Arg::new("country")
                        .long("country")
                        .value_name("CC")
                        .help("Two-letter country code (default: geolocated)"),
                ),
        )
        .subcommand(
            Command::new("kernel-upgrade")
                .about("Upgrade pending kernel packages, rebuild DKMS modules and initramfs"),
        )
        .subcommand(
            Command::new("system-fixes")
                .about("Apply preventive fixes (libjodycode, dracut, kernel-install)"),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell to generate completions for"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("blackarch-aio.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
