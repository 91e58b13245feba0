// src/mirror/geo.rs

//! IP-based geolocation

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Where the host appears to be; every field may be missing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GeoLocation {
    pub country_code: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
}

impl GeoLocation {
    pub fn country(code: impl Into<String>) -> Self {
        Self {
            country_code: Some(code.into()),
            ..Self::default()
        }
    }
}

/// Resolves the current location; `None` on any failure
#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn locate(&self) -> Option<GeoLocation>;
}

#[derive(Debug, Deserialize)]
struct IpInfoResponse {
    country: Option<String>,
    city: Option<String>,
    region: Option<String>,
}

/// ipinfo.io-style JSON endpoint
pub struct IpInfoLocator {
    client: reqwest::Client,
    url: String,
}

impl IpInfoLocator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("blackarch-aio/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn fetch(&self) -> Result<GeoLocation> {
        let response: IpInfoResponse = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(GeoLocation {
            country_code: normalize_country(response.country.as_deref()),
            city: response.city.filter(|c| !c.is_empty()),
            region: response.region.filter(|r| !r.is_empty()),
        })
    }
}

#[async_trait]
impl GeoLocator for IpInfoLocator {
    async fn locate(&self) -> Option<GeoLocation> {
        match self.fetch().await {
            Ok(location) => {
                debug!("Geolocation: {:?}", location);
                Some(location)
            }
            Err(e) => {
                warn!("Geolocation lookup failed: {}", e);
                None
            }
        }
    }
}

/// Trim and uppercase a country code; blank input is no country
pub fn normalize_country(code: Option<&str>) -> Option<String> {
    code.map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_ascii_uppercase)
}
