use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::config::AppConfig;
use crate::errors::AppResult;

/// A resolved lat/lon pair. Kept as one value so the two components are
/// always present together or not at all.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// Best match returned by the postal lookup service.
#[derive(Debug, Clone, Default)]
pub struct GeocodedPlace {
    pub postcode: Option<String>,
    pub locality: Option<String>,
    pub state: Option<String>,
    pub coords: Option<Coordinates>,
}

/// Seam between resolvers and the wire. `Err` means the service could not be
/// reached; `Ok(None)` means it answered and found nothing. Callers that do
/// not care about the difference fold both into `None`.
#[async_trait]
pub trait GeocodeLookup: Send + Sync {
    async fn search_postal(&self, zip: &str) -> AppResult<Option<GeocodedPlace>>;
    async fn search_free_text(&self, query: &str) -> AppResult<Option<GeocodedPlace>>;
}

#[derive(Clone)]
pub struct GeocodeService {
    inner: Arc<dyn GeocodeLookup>,
}

impl GeocodeService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            inner: Arc::new(HttpGeocodeClient::new(config)),
        }
    }

    pub fn from_lookup(lookup: Arc<dyn GeocodeLookup>) -> Self {
        Self { inner: lookup }
    }

    /// Single-attempt coordinate resolution for a ZIP. Transport failures,
    /// empty result sets, and responses without coordinates all collapse to
    /// `None`; callers treat that as "coordinates unavailable".
    pub async fn resolve_zip(&self, zip: &str) -> Option<Coordinates> {
        match self.inner.search_postal(zip).await {
            Ok(Some(place)) => place.coords,
            Ok(None) => None,
            Err(err) => {
                warn!(?err, zip, "geocoder lookup failed; coordinates unavailable");
                None
            }
        }
    }

    /// Forward postal lookup preserving the failed/empty distinction, for
    /// the ZIP validation state machine.
    pub async fn lookup_postal(&self, zip: &str) -> AppResult<Option<GeocodedPlace>> {
        self.inner.search_postal(zip).await
    }

    /// Free-text suggestion query. Failure here never blocks anything, so
    /// errors fold into "no suggestion".
    pub async fn suggest(&self, query: &str) -> Option<GeocodedPlace> {
        match self.inner.search_free_text(query).await {
            Ok(result) => result,
            Err(err) => {
                warn!(?err, query, "geocoder suggestion query failed");
                None
            }
        }
    }
}

struct HttpGeocodeClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpGeocodeClient {
    fn new(config: &AppConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.geocoder_timeout_secs))
            .user_agent(config.geocoder_user_agent.clone())
            .build()
            .expect("geocoder http client");
        Self {
            http,
            base_url: config.geocoder_base_url.clone(),
        }
    }

    async fn search(&self, params: &[(&str, &str)]) -> AppResult<Option<GeocodedPlace>> {
        let url = format!("{}/search", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(params)
            .query(&[
                ("format", "jsonv2"),
                ("addressdetails", "1"),
                ("limit", "1"),
            ])
            .send()
            .await?
            .error_for_status()?;

        let mut matches: Vec<SearchResult> = response.json().await?;
        let Some(best) = matches.drain(..).next() else {
            trace!(?params, "geocoder returned no candidates");
            return Ok(None);
        };
        Ok(Some(best.into_place()))
    }
}

#[async_trait]
impl GeocodeLookup for HttpGeocodeClient {
    async fn search_postal(&self, zip: &str) -> AppResult<Option<GeocodedPlace>> {
        self.search(&[("postalcode", zip), ("country", "United States")])
            .await
    }

    async fn search_free_text(&self, query: &str) -> AppResult<Option<GeocodedPlace>> {
        self.search(&[("q", query), ("countrycodes", "us")]).await
    }
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    lat: Option<String>,
    lon: Option<String>,
    #[serde(default)]
    address: SearchAddress,
}

#[derive(Debug, Default, Deserialize)]
struct SearchAddress {
    postcode: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    hamlet: Option<String>,
    municipality: Option<String>,
    county: Option<String>,
    state: Option<String>,
}

impl SearchResult {
    fn into_place(self) -> GeocodedPlace {
        let coords = match (
            self.lat.as_deref().and_then(|v| v.parse::<f64>().ok()),
            self.lon.as_deref().and_then(|v| v.parse::<f64>().ok()),
        ) {
            (Some(lat), Some(lon)) => Some(Coordinates { lat, lon }),
            _ => None,
        };
        let SearchAddress {
            postcode,
            city,
            town,
            village,
            hamlet,
            municipality,
            county,
            state,
        } = self.address;
        // Locality fallback order: city, town, village, hamlet,
        // municipality, county. First non-empty wins.
        let locality = [city, town, village, hamlet, municipality, county]
            .into_iter()
            .flatten()
            .find(|value| !value.trim().is_empty());
        GeocodedPlace {
            postcode: postcode.filter(|value| !value.trim().is_empty()),
            locality,
            state: state.filter(|value| !value.trim().is_empty()),
            coords,
        }
    }
}
