//! Reverse geocoding — coordinates to a human-readable address.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::exif::GpsCoords;

const REGEO_ENDPOINT: &str = "https://restapi.amap.com/v3/geocode/regeo";
const SEARCH_RADIUS_M: u32 = 10;

/// Trait for reverse-geocoding services.
///
/// `resolve` never fails: any network, HTTP, or envelope problem degrades to
/// an empty address string and a log entry. The `deadline` parameter exists
/// so callers can express a budget; the shipped [`AmapGeocoder`] ignores it
/// and blocks until the endpoint answers.
#[async_trait::async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// The display name of this service (e.g., "Amap").
    fn name(&self) -> &str;

    /// Resolve coordinates to a province+city+district address string.
    ///
    /// Returns an empty string when resolution is skipped or fails.
    async fn resolve(&self, coords: GpsCoords, deadline: Option<Duration>) -> String;
}

/// Reverse geocoder backed by the Amap regeo endpoint.
pub struct AmapGeocoder {
    api_key: String,
    client: Client,
}

impl AmapGeocoder {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: Client::new(),
        }
    }

    async fn fetch(&self, coords: GpsCoords) -> Result<String> {
        let url = format!(
            "{REGEO_ENDPOINT}?output=JSON&location={:.6},{:.6}&key={}&radius={SEARCH_RADIUS_M}",
            coords.longitude, coords.latitude, self.api_key
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("Regeo request failed")?;

        let status = resp.status();
        let text = resp.text().await.context("Failed to read regeo response")?;

        if !status.is_success() {
            anyhow::bail!("Regeo API error ({status}): {text}");
        }

        parse_regeo_body(&text)
    }
}

#[async_trait::async_trait]
impl ReverseGeocoder for AmapGeocoder {
    fn name(&self) -> &str {
        "Amap"
    }

    async fn resolve(&self, coords: GpsCoords, _deadline: Option<Duration>) -> String {
        if self.api_key.is_empty() {
            log::debug!("No geocoding API key configured, skipping lookup");
            return String::new();
        }

        match self.fetch(coords).await {
            Ok(address) => {
                log::info!(
                    "Resolved ({:.6}, {:.6}) to \"{address}\"",
                    coords.latitude,
                    coords.longitude
                );
                address
            }
            Err(e) => {
                log::warn!("Reverse geocoding failed: {e}");
                String::new()
            }
        }
    }
}

/// Response envelope of the regeo endpoint. `status` is `"1"` on success.
#[derive(Debug, Deserialize)]
struct RegeoResponse {
    status: String,
    #[serde(default)]
    regeocode: Option<Regeocode>,
}

#[derive(Debug, Default, Deserialize)]
struct Regeocode {
    #[serde(rename = "addressComponent", default)]
    address_component: AddressComponent,
}

#[derive(Debug, Default, Deserialize)]
struct AddressComponent {
    #[serde(default)]
    province: String,
    #[serde(default)]
    city: CityField,
    #[serde(default)]
    district: String,
}

/// The `city` field arrives as a plain string for most regions but as an
/// array (usually empty) for municipalities. Both wire shapes normalize to
/// one string before reaching the address assembly.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CityField {
    Name(String),
    Names(Vec<String>),
}

impl CityField {
    fn into_name(self) -> String {
        match self {
            Self::Name(name) => name,
            Self::Names(names) => names.into_iter().next().unwrap_or_default(),
        }
    }
}

impl Default for CityField {
    fn default() -> Self {
        Self::Name(String::new())
    }
}

/// Parse a regeo response body into the composite address string.
fn parse_regeo_body(text: &str) -> Result<String> {
    let resp: RegeoResponse =
        serde_json::from_str(text).context("Failed to parse regeo response JSON")?;

    if resp.status != "1" {
        anyhow::bail!("Regeo returned error status {}", resp.status);
    }

    let component = resp
        .regeocode
        .map(|r| r.address_component)
        .unwrap_or_default();

    Ok(assemble_address(
        &component.province,
        &component.city.into_name(),
        &component.district,
    ))
}

/// Join address segments in province, city, district order, no separator.
fn assemble_address(province: &str, city: &str, district: &str) -> String {
    let mut address = String::from(province);
    address.push_str(city);
    address.push_str(district);
    address
}
