// src/repo/categories.rs

//! BlackArch package groups

/// Groups installed by a full install, before syncing with the repository
pub const CATEGORIES: &[&str] = &[
    "blackarch-anti-forensic",
    "blackarch-automation",
    "blackarch-backdoor",
    "blackarch-binary",
    "blackarch-bluetooth",
    "blackarch-code-audit",
    "blackarch-config",
    "blackarch-cracker",
    "blackarch-crypto",
    "blackarch-database",
    "blackarch-debugger",
    "blackarch-decompiler",
    "blackarch-disassembler",
    "blackarch-dos",
    "blackarch-drone",
    "blackarch-exploitation",
    "blackarch-forensic",
    "blackarch-fingerprint",
    "blackarch-firmware",
    "blackarch-fuzzer",
    "blackarch-gpu",
    "blackarch-hardware",
    "blackarch-honeypot",
    "blackarch-ids",
    "blackarch-keylogger",
    "blackarch-malware",
    "blackarch-misc",
    "blackarch-mobile",
    "blackarch-networking",
    "blackarch-nfc",
    "blackarch-packer",
    "blackarch-proxy",
    "blackarch-radio",
    "blackarch-recon",
    "blackarch-reversing",
    "blackarch-scanner",
    "blackarch-sniffer",
    "blackarch-social",
    "blackarch-spoof",
    "blackarch-stego",
    "blackarch-tunnel",
    "blackarch-unpacker",
    "blackarch-voip",
    "blackarch-webap",
    "blackarch-webapp",
    "blackarch-windows",
    "blackarch-wireless",
];

pub const GROUP_PREFIX: &str = "blackarch-";

pub fn builtin_categories() -> Vec<String> {
    CATEGORIES.iter().map(|c| c.to_string()).collect()
}

/// BlackArch group names from `pacman -Sg` output, sorted and unique
///
/// Each line is `<group> <package>`.
pub fn parse_groups(output: &str) -> Vec<String> {
    let mut groups: Vec<String> = output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter(|group| group.starts_with(GROUP_PREFIX))
        .map(str::to_string)
        .collect();
    groups.sort();
    groups.dedup();
    groups
}

/// Union of two category lists, sorted
pub fn merge_categories(known: &[String], official: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = known.iter().chain(official).cloned().collect();
    merged.sort();
    merged.dedup();
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_categories() {
        assert_eq!(CATEGORIES.len(), 47);
        assert!(CATEGORIES.iter().all(|c| c.starts_with(GROUP_PREFIX)));
    }

    #[test]
    fn test_parse_groups() {
        let output = "blackarch-scanner nmap\n\
                      blackarch-scanner masscan\n\
                      base-devel gcc\n\
                      blackarch-ai pentestgpt\n\
                      \n";
        assert_eq!(parse_groups(output), vec!["blackarch-ai", "blackarch-scanner"]);
    }

    #[test]
    fn test_merge_keeps_known_and_adds_new() {
        let merged = merge_categories(
            &builtin_categories(),
            &["blackarch-ai".to_string(), "blackarch-scanner".to_string()],
        );
        assert_eq!(merged.len(), 48);
        assert_eq!(merged[0], "blackarch-ai");
        assert!(merged.windows(2).all(|w| w[0] < w[1]));
    }
}
