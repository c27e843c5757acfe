use serde::Serialize;
use tracing::{debug, warn};

use crate::geocode::GeocodeService;
use crate::states::{normalize_state, StateCode};

/// Outcome of validating a user-supplied ZIP. `Suggested` and `Invalid` both
/// mean "do not proceed without user confirmation"; they differ only in
/// whether a correction is known.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ZipValidation {
    Valid {
        normalized_zip: Option<String>,
        city: Option<String>,
        state: Option<StateCode>,
        /// Set when the lookup service was unreachable and the ZIP was
        /// accepted as given. Callers may warn but must not block.
        lookup_failed: bool,
    },
    Suggested {
        zip: String,
        city: Option<String>,
        state: Option<StateCode>,
    },
    Invalid,
}

/// Read-only orchestration over the geocoder: forward ZIP lookup, then a
/// city/state reverse suggestion for genuinely unknown codes. Availability
/// beats strictness: a *failed* lookup (as opposed to a miss) never blocks.
#[derive(Clone)]
pub struct ZipResolver {
    geocoder: GeocodeService,
}

impl ZipResolver {
    pub fn new(geocoder: GeocodeService) -> Self {
        Self { geocoder }
    }

    pub async fn validate(
        &self,
        zip: Option<&str>,
        city: Option<&str>,
        state: Option<&str>,
    ) -> ZipValidation {
        let city = non_empty(city);
        let state_code = normalize_state(state);

        let Some(zip) = non_empty(zip) else {
            // The field is optional at this layer.
            return ZipValidation::Valid {
                normalized_zip: None,
                city,
                state: state_code,
                lookup_failed: false,
            };
        };

        match self.geocoder.lookup_postal(&zip).await {
            Ok(Some(place)) => {
                let resolved_state = place
                    .state
                    .as_deref()
                    .and_then(|value| normalize_state(Some(value)))
                    .or(state_code);
                ZipValidation::Valid {
                    normalized_zip: Some(place.postcode.unwrap_or_else(|| zip.clone())),
                    city: place.locality.or(city),
                    state: resolved_state,
                    lookup_failed: false,
                }
            }
            Err(err) => {
                warn!(?err, zip, "zip lookup unavailable; accepting as given");
                ZipValidation::Valid {
                    normalized_zip: Some(zip),
                    city,
                    state: state_code,
                    lookup_failed: true,
                }
            }
            Ok(None) => self.suggest_from_locality(&zip, city, state, state_code).await,
        }
    }

    async fn suggest_from_locality(
        &self,
        zip: &str,
        city: Option<String>,
        state: Option<&str>,
        state_code: Option<StateCode>,
    ) -> ZipValidation {
        let mut parts = Vec::new();
        if let Some(city) = &city {
            parts.push(city.clone());
        }
        if let Some(code) = state_code {
            parts.push(code.as_str().to_string());
        } else if let Some(state) = non_empty(state) {
            parts.push(state);
        }
        if parts.is_empty() {
            debug!(zip, "unknown zip with no locality to suggest from");
            return ZipValidation::Invalid;
        }

        let query = parts.join(", ");
        match self.geocoder.suggest(&query).await {
            Some(place) => match place.postcode {
                Some(suggested_zip) => {
                    debug!(zip, suggested_zip, "offering corrected zip");
                    ZipValidation::Suggested {
                        zip: suggested_zip,
                        city: place.locality.or(city),
                        state: place
                            .state
                            .as_deref()
                            .and_then(|value| normalize_state(Some(value)))
                            .or(state_code),
                    }
                }
                None => ZipValidation::Invalid,
            },
            None => ZipValidation::Invalid,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::errors::{AppError, AppResult};
    use crate::geocode::{Coordinates, GeocodeLookup, GeocodedPlace};

    use super::*;

    #[derive(Default)]
    struct ScriptedLookup {
        postal: Mutex<Vec<AppResult<Option<GeocodedPlace>>>>,
        free_text: Mutex<Vec<AppResult<Option<GeocodedPlace>>>>,
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GeocodeLookup for ScriptedLookup {
        async fn search_postal(&self, _zip: &str) -> AppResult<Option<GeocodedPlace>> {
            self.postal.lock().pop().unwrap_or(Ok(None))
        }

        async fn search_free_text(&self, query: &str) -> AppResult<Option<GeocodedPlace>> {
            self.queries.lock().push(query.to_string());
            self.free_text.lock().pop().unwrap_or(Ok(None))
        }
    }

    fn resolver(lookup: ScriptedLookup) -> ZipResolver {
        ZipResolver::new(GeocodeService::from_lookup(Arc::new(lookup)))
    }

    fn phoenix() -> GeocodedPlace {
        GeocodedPlace {
            postcode: Some("85004".into()),
            locality: Some("Phoenix".into()),
            state: Some("Arizona".into()),
            coords: Some(Coordinates {
                lat: 33.4484,
                lon: -112.074,
            }),
        }
    }

    #[tokio::test]
    async fn empty_zip_is_always_valid() {
        let resolver = resolver(ScriptedLookup::default());
        let result = resolver.validate(Some("   "), Some("Phoenix"), Some("Arizona")).await;
        assert_eq!(
            result,
            ZipValidation::Valid {
                normalized_zip: None,
                city: Some("Phoenix".into()),
                state: normalize_state(Some("AZ")),
                lookup_failed: false,
            }
        );
    }

    #[tokio::test]
    async fn forward_match_fills_city_and_state() {
        let lookup = ScriptedLookup::default();
        lookup.postal.lock().push(Ok(Some(phoenix())));
        let resolver = resolver(lookup);

        let result = resolver.validate(Some("85004"), None, None).await;
        let ZipValidation::Valid {
            normalized_zip,
            city,
            state,
            lookup_failed,
        } = result
        else {
            panic!("expected valid outcome");
        };
        assert_eq!(normalized_zip.as_deref(), Some("85004"));
        assert_eq!(city.as_deref(), Some("Phoenix"));
        assert_eq!(state.unwrap().as_str(), "AZ");
        assert!(!lookup_failed);
    }

    #[tokio::test]
    async fn caller_values_survive_a_sparse_match() {
        let lookup = ScriptedLookup::default();
        lookup.postal.lock().push(Ok(Some(GeocodedPlace {
            postcode: None,
            locality: None,
            state: None,
            coords: None,
        })));
        let resolver = resolver(lookup);

        let result = resolver
            .validate(Some("85004"), Some("Phoenix"), Some("AZ"))
            .await;
        let ZipValidation::Valid {
            normalized_zip,
            city,
            state,
            ..
        } = result
        else {
            panic!("expected valid outcome");
        };
        assert_eq!(normalized_zip.as_deref(), Some("85004"));
        assert_eq!(city.as_deref(), Some("Phoenix"));
        assert_eq!(state.unwrap().as_str(), "AZ");
    }

    #[tokio::test]
    async fn service_failure_accepts_zip_with_flag() {
        let lookup = ScriptedLookup::default();
        lookup
            .postal
            .lock()
            .push(Err(AppError::Config("connection refused".into())));
        let resolver = resolver(lookup);

        let result = resolver.validate(Some("85004"), None, Some("az")).await;
        let ZipValidation::Valid {
            normalized_zip,
            lookup_failed,
            state,
            ..
        } = result
        else {
            panic!("expected valid outcome");
        };
        assert_eq!(normalized_zip.as_deref(), Some("85004"));
        assert!(lookup_failed);
        assert_eq!(state.unwrap().as_str(), "AZ");
    }

    #[tokio::test]
    async fn unknown_zip_yields_suggestion_from_city_state() {
        let lookup = ScriptedLookup::default();
        lookup.free_text.lock().push(Ok(Some(phoenix())));
        let resolver = resolver(lookup);

        let result = resolver
            .validate(Some("00000"), Some("Phoenix"), Some("AZ"))
            .await;
        assert_eq!(
            result,
            ZipValidation::Suggested {
                zip: "85004".into(),
                city: Some("Phoenix".into()),
                state: normalize_state(Some("AZ")),
            }
        );
    }

    #[tokio::test]
    async fn suggestion_query_is_built_from_available_parts() {
        let shared = Arc::new(ScriptedLookup::default());
        let resolver = ZipResolver::new(GeocodeService::from_lookup(shared.clone()));
        let _ = resolver
            .validate(Some("00000"), Some("Phoenix"), Some("Arizona"))
            .await;
        assert_eq!(shared.queries.lock().as_slice(), ["Phoenix, AZ"]);
    }

    #[tokio::test]
    async fn unknown_zip_without_locality_is_invalid() {
        let resolver = resolver(ScriptedLookup::default());
        let result = resolver.validate(Some("00000"), None, None).await;
        assert_eq!(result, ZipValidation::Invalid);
    }

    #[tokio::test]
    async fn suggestion_without_postcode_is_invalid() {
        let lookup = ScriptedLookup::default();
        lookup.free_text.lock().push(Ok(Some(GeocodedPlace {
            postcode: None,
            locality: Some("Phoenix".into()),
            state: Some("Arizona".into()),
            coords: None,
        })));
        let resolver = resolver(lookup);

        let result = resolver
            .validate(Some("00000"), Some("Phoenix"), None)
            .await;
        assert_eq!(result, ZipValidation::Invalid);
    }
}
