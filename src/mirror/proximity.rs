// src/mirror/proximity.rs

//! Static geographic fallback clusters for mirror selection

use std::collections::HashMap;

/// Country code -> cluster, the country itself first
const CLUSTERS: &[(&str, &[&str])] = &[
    // Latin America
    ("CO", &["CO", "EC", "VE", "PA", "BR", "CL", "US"]),
    ("EC", &["EC", "CO", "PE", "CL", "BR", "US"]),
    ("BR", &["BR", "CL", "CO", "AR", "US"]),
    ("CL", &["CL", "BR", "AR", "CO", "US"]),
    ("AR", &["AR", "CL", "BR", "UY", "US"]),
    ("MX", &["MX", "US", "CA", "CO", "BR"]),
    // North America
    ("US", &["US", "CA"]),
    ("CA", &["CA", "US"]),
    // Europe West
    ("DE", &["DE", "AT", "NL", "CZ", "FR", "DK"]),
    ("FR", &["FR", "DE", "BE", "NL", "GB", "ES"]),
    ("GB", &["GB", "IE", "FR", "NL", "DE"]),
    ("NL", &["NL", "DE", "BE", "FR", "GB"]),
    ("ES", &["ES", "FR", "PT", "IT"]),
    ("IT", &["IT", "AT", "DE", "FR", "CH"]),
    ("AT", &["AT", "DE", "CZ", "HU", "IT"]),
    ("CH", &["CH", "DE", "FR", "AT", "IT"]),
    ("BE", &["BE", "NL", "DE", "FR", "GB"]),
    // Europe North
    ("SE", &["SE", "NO", "DK", "FI", "DE"]),
    ("NO", &["NO", "SE", "DK", "FI", "DE"]),
    ("DK", &["DK", "SE", "NO", "DE", "NL"]),
    ("FI", &["FI", "SE", "EE", "NO", "DE"]),
    // Europe East
    ("PL", &["PL", "CZ", "DE", "SK", "AT"]),
    ("CZ", &["CZ", "DE", "PL", "AT", "SK"]),
    ("RO", &["RO", "BG", "HU", "PL", "DE"]),
    ("HU", &["HU", "AT", "SK", "CZ", "RO"]),
    // Asia / Pacific
    ("JP", &["JP", "KR", "TW", "HK", "SG"]),
    ("KR", &["KR", "JP", "TW", "HK", "SG"]),
    ("IN", &["IN", "SG", "BD", "HK", "JP"]),
    ("SG", &["SG", "HK", "JP", "IN", "AU"]),
    ("CN", &["CN", "HK", "TW", "JP", "KR", "SG"]),
    ("AU", &["AU", "NZ", "SG", "JP", "US"]),
    ("NZ", &["NZ", "AU", "SG", "JP"]),
];

/// Read-only lookup of proximity clusters
#[derive(Debug, Clone)]
pub struct ProximityTable {
    clusters: HashMap<String, Vec<String>>,
}

impl ProximityTable {
    pub fn builtin() -> Self {
        Self::from_entries(CLUSTERS.iter().map(|(code, cluster)| {
            (
                code.to_string(),
                cluster.iter().map(|c| c.to_string()).collect(),
            )
        }))
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, Vec<String>)>) -> Self {
        Self {
            clusters: entries.into_iter().collect(),
        }
    }

    /// The cluster for a country; unknown countries form a cluster of one
    pub fn cluster(&self, country: &str) -> Vec<String> {
        self.clusters
            .get(country)
            .cloned()
            .unwrap_or_else(|| vec![country.to_string()])
    }
}
