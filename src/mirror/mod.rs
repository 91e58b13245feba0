// src/mirror/mod.rs

//! Geographic mirror selection
//!
//! Mirrors are ranked by `reflector` in a three-tier cascade that stops at
//! the first tier that succeeds:
//!
//! 1. **Proximity**: the country's proximity cluster, very fresh mirrors only
//! 2. **Country**: the country alone with relaxed freshness
//! 3. **Global**: no country filter
//!
//! Tiers 1 and 2 need a country code, given explicitly or found by
//! geolocation. Each tier writes to a staging file that replaces the live
//! mirrorlist only once the tier has succeeded, so a run where every tier
//! fails leaves the previous mirrorlist in place.

mod geo;
mod proximity;

pub use geo::{GeoLocation, GeoLocator, IpInfoLocator, normalize_country};
pub use proximity::ProximityTable;

use crate::config::{AioConfig, MirrorConfig};
use crate::exec::{CommandExecutor, CommandSpec};
use crate::helpers::HelperRegistry;
use crate::ignore::IgnoreSet;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Mirror ranking tool
pub const REFLECTOR: &str = "reflector";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MirrorTier {
    Proximity,
    Country,
    Global,
}

/// One reflector invocation's parameter set
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectorParams {
    pub tier: MirrorTier,
    /// Country filter; `None` ranks mirrors worldwide
    pub countries: Option<Vec<String>>,
    /// Maximum hours since last sync
    pub age_hours: u32,
    /// Maximum sync delay in hours
    pub delay_hours: Option<f32>,
    pub min_score: Option<u32>,
    pub completion_percent: u32,
    /// Number of fastest mirrors kept
    pub fastest: u32,
    pub connection_timeout: u32,
    pub download_timeout: u32,
    pub threads: u32,
    pub save: PathBuf,
}

impl ReflectorParams {
    fn base(tier: MirrorTier, config: &MirrorConfig, save: &Path) -> Self {
        Self {
            tier,
            countries: None,
            age_hours: 12,
            delay_hours: None,
            min_score: None,
            completion_percent: 100,
            fastest: 10,
            connection_timeout: config.connection_timeout_secs,
            download_timeout: config.download_timeout_secs,
            threads: config.threads,
            save: save.to_path_buf(),
        }
    }

    /// Arguments passed to reflector
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(countries) = &self.countries {
            args.push("--country".to_string());
            args.push(countries.join(","));
        }
        args.push("--age".to_string());
        args.push(self.age_hours.to_string());
        if let Some(delay) = self.delay_hours {
            args.push("--delay".to_string());
            args.push(delay.to_string());
        }
        if let Some(score) = self.min_score {
            args.push("--score".to_string());
            args.push(score.to_string());
        }

        args.extend([
            "--completion-percent".to_string(),
            self.completion_percent.to_string(),
            "--fastest".to_string(),
            self.fastest.to_string(),
            "--sort".to_string(),
            "rate".to_string(),
            "--protocol".to_string(),
            "https".to_string(),
            "--connection-timeout".to_string(),
            self.connection_timeout.to_string(),
            "--download-timeout".to_string(),
            self.download_timeout.to_string(),
            "--threads".to_string(),
            self.threads.to_string(),
            "--save".to_string(),
            self.save.to_string_lossy().into_owned(),
        ]);
        args
    }
}

/// The tiers to try, in order, for a known (or unknown) country
pub fn plan_tiers(
    country: Option<&str>,
    table: &ProximityTable,
    config: &MirrorConfig,
    save: &Path,
) -> Vec<ReflectorParams> {
    let mut tiers = Vec::with_capacity(3);

    if let Some(country) = country {
        tiers.push(ReflectorParams {
            countries: Some(table.cluster(country)),
            age_hours: 1,
            delay_hours: Some(0.5),
            fastest: 15,
            ..ReflectorParams::base(MirrorTier::Proximity, config, save)
        });
        tiers.push(ReflectorParams {
            countries: Some(vec![country.to_string()]),
            min_score: Some(10),
            ..ReflectorParams::base(MirrorTier::Country, config, save)
        });
    }

    tiers.push(ReflectorParams {
        min_score: Some(15),
        completion_percent: 95,
        fastest: 20,
        ..ReflectorParams::base(MirrorTier::Global, config, save)
    });
    tiers
}

/// Result of one selection run
#[derive(Debug, Clone, Default, Serialize)]
pub struct MirrorSelection {
    pub success: bool,
    /// The tier whose list was installed
    pub tier: Option<MirrorTier>,
    pub country: Option<String>,
    pub location: Option<GeoLocation>,
    pub attempted: Vec<MirrorTier>,
}

/// Runs the tier cascade
#[derive(Clone)]
pub struct MirrorSelector {
    config: Arc<AioConfig>,
    executor: Arc<dyn CommandExecutor>,
    helpers: Arc<HelperRegistry>,
    locator: Arc<dyn GeoLocator>,
    proximity: ProximityTable,
}

impl MirrorSelector {
    pub fn new(
        config: Arc<AioConfig>,
        executor: Arc<dyn CommandExecutor>,
        helpers: Arc<HelperRegistry>,
        locator: Arc<dyn GeoLocator>,
    ) -> Self {
        Self {
            config,
            executor,
            helpers,
            locator,
            proximity: ProximityTable::builtin(),
        }
    }

    /// Select mirrors; `true` if some tier installed a new mirrorlist
    pub async fn select(&self, explicit_country: Option<&str>) -> bool {
        self.select_mirrors(explicit_country).await.success
    }

    /// Select mirrors and report what happened
    ///
    /// Never fails: every problem degrades to a later tier, and exhausting
    /// the tiers leaves the live mirrorlist untouched.
    pub async fn select_mirrors(&self, explicit_country: Option<&str>) -> MirrorSelection {
        self.ensure_reflector().await;

        let mut selection = MirrorSelection::default();
        match normalize_country(explicit_country) {
            Some(country) => selection.country = Some(country),
            None => {
                selection.location = self.locator.locate().await;
                selection.country = selection
                    .location
                    .as_ref()
                    .and_then(|l| normalize_country(l.country_code.as_deref()));
            }
        }

        match (&selection.country, &selection.location) {
            (Some(country), Some(location)) => info!(
                "Optimizing mirrors for location: {} ({}, {})",
                country,
                location.city.as_deref().unwrap_or("unknown"),
                location.region.as_deref().unwrap_or("unknown")
            ),
            (Some(country), None) => info!("Optimizing mirrors for country: {}", country),
            (None, _) => warn!("Could not determine location, using global mirrors"),
        }

        let paths = &self.config.paths;
        let tiers = plan_tiers(
            selection.country.as_deref(),
            &self.proximity,
            &self.config.mirrors,
            &paths.mirrorlist_staging,
        );

        for params in &tiers {
            selection.attempted.push(params.tier);
            if self.run_tier(params).await {
                info!("Mirrors updated using {} tier", params.tier);
                selection.success = true;
                selection.tier = Some(params.tier);
                return selection;
            }
        }

        error!("All reflector tiers failed. Mirrorlist unchanged.");
        selection
    }

    async fn run_tier(&self, params: &ReflectorParams) -> bool {
        let mirrors = &self.config.mirrors;
        let spec = CommandSpec::new([REFLECTOR])
            .args(params.to_args())
            .privileged()
            .timeout(mirrors.tier_timeout())
            .describe(format!("reflector ({} tier)", params.tier));

        info!("Trying {} mirror tier...", params.tier);
        let ranked = self.executor.outcome(&spec).await;
        if !ranked.success {
            warn!("{} tier failed: {}", params.tier, ranked.error_text());
            return false;
        }

        self.promote_staging(&params.save).await
    }

    /// Move a freshly ranked list over the live mirrorlist
    async fn promote_staging(&self, staging: &Path) -> bool {
        let live = &self.config.paths.mirrorlist;
        let spec = CommandSpec::new([
            "mv".to_string(),
            "-f".to_string(),
            staging.to_string_lossy().into_owned(),
            live.to_string_lossy().into_owned(),
        ])
        .privileged()
        .describe("Installing ranked mirrorlist");

        let moved = self.executor.outcome(&spec).await;
        if !moved.success {
            warn!("Could not replace {}: {}", live.display(), moved.error_text());
        }
        moved.success
    }

    /// Install reflector through the baseline helper when missing
    ///
    /// Returns whether reflector is usable afterwards.
    pub async fn ensure_reflector(&self) -> bool {
        if self.executor.tool_available(REFLECTOR) {
            return true;
        }

        info!("Dependency '{}' not found. Installing...", REFLECTOR);
        let spec = self
            .helpers
            .baseline()
            .install_cmd(&[REFLECTOR.to_string()], &IgnoreSet::new());
        let installed = match spec {
            Some(spec) => self.executor.outcome(&spec).await,
            None => return false,
        };
        if !installed.success {
            warn!("Failed to install {}: {}", REFLECTOR, installed.error_text());
        }
        installed.success
    }
}
