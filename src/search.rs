use std::cmp;

use serde::Serialize;
use tracing::debug;

use crate::errors::AppResult;
use crate::geocode::GeocodeService;
use crate::listings::{ListingFilters, ListingStore};
use crate::states::normalize_state;
use crate::trades::TradeBook;

pub const MAX_RADIUS_MILES: f64 = 500.0;
const DEFAULT_PAGE_SIZE: usize = 25;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub trade: Option<String>,
    pub state: Option<String>,
    pub keyword: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct SearchPagination {
    pub page: usize,
    pub page_size: usize,
}

impl SearchPagination {
    pub fn new(page: Option<usize>, page_size: Option<usize>) -> Self {
        let sanitized_page_size = page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let sanitized_page = page.unwrap_or(1).max(1);
        Self {
            page: sanitized_page,
            page_size: sanitized_page_size,
        }
    }

    fn with_total(self, total: usize) -> Self {
        if total == 0 {
            return Self {
                page: 1,
                page_size: self.page_size,
            };
        }
        let pages = (total + self.page_size - 1) / self.page_size;
        Self {
            page: cmp::min(self.page, pages).max(1),
            page_size: self.page_size,
        }
    }

    fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }
}

impl Default for SearchPagination {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RadiusSearchRequest {
    pub origin_zip: Option<String>,
    pub radius_miles: f64,
    pub filters: SearchFilters,
    pub pagination: Option<SearchPagination>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ListingMatch {
    pub id: i64,
    /// Present only for spatial-tier results.
    pub distance_miles: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub matches: Vec<ListingMatch>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

/// Tiered matcher: geo-distance when the origin resolves, exact-ZIP recency
/// when it does not or the radius comes back empty, plain categorical
/// filtering when no ZIP was supplied at all.
#[derive(Clone)]
pub struct RadiusMatcher {
    store: ListingStore,
    geocoder: GeocodeService,
    trades: &'static TradeBook,
}

impl RadiusMatcher {
    pub fn new(store: ListingStore, geocoder: GeocodeService) -> Self {
        Self {
            store,
            geocoder,
            trades: TradeBook::default_book(),
        }
    }

    pub async fn search(&self, request: &RadiusSearchRequest) -> AppResult<SearchPage> {
        let radius = request.radius_miles.clamp(0.0, MAX_RADIUS_MILES);
        let pagination = request.pagination.unwrap_or_default();
        let filters = self.storage_filters(&request.filters);
        let origin_zip = request
            .origin_zip
            .as_deref()
            .map(str::trim)
            .filter(|zip| !zip.is_empty());

        if let Some(zip) = origin_zip {
            if radius > 0.0 {
                if let Some(origin) = self.geocoder.resolve_zip(zip).await {
                    let within = self.store.within_radius(origin, radius, &filters)?;
                    if !within.is_empty() {
                        let matches: Vec<ListingMatch> = within
                            .into_iter()
                            .map(|(id, distance)| ListingMatch {
                                id,
                                distance_miles: Some(distance),
                            })
                            .collect();
                        return Ok(paginate(matches, pagination));
                    }
                    debug!(zip, radius, "spatial tier empty; using exact-zip fallback");
                } else {
                    debug!(zip, "origin unresolvable; using exact-zip fallback");
                }
            }
            let ids = self.store.recent_matching(&filters, Some(zip))?;
            return Ok(paginate(without_distance(ids), pagination));
        }

        let ids = self.store.recent_matching(&filters, None)?;
        Ok(paginate(without_distance(ids), pagination))
    }

    fn storage_filters(&self, filters: &SearchFilters) -> ListingFilters {
        ListingFilters {
            trades: filters
                .trade
                .as_deref()
                .map(str::trim)
                .filter(|trade| !trade.is_empty())
                .map(|trade| self.trades.synonyms(trade))
                .unwrap_or_default(),
            state: normalize_state(filters.state.as_deref()),
            keyword: filters
                .keyword
                .as_deref()
                .map(str::trim)
                .filter(|keyword| !keyword.is_empty())
                .map(str::to_string),
        }
    }
}

fn without_distance(ids: Vec<i64>) -> Vec<ListingMatch> {
    ids.into_iter()
        .map(|id| ListingMatch {
            id,
            distance_miles: None,
        })
        .collect()
}

fn paginate(matches: Vec<ListingMatch>, pagination: SearchPagination) -> SearchPage {
    let total = matches.len();
    let effective = pagination.with_total(total);
    let page_matches = matches
        .into_iter()
        .skip(effective.offset())
        .take(effective.page_size)
        .collect();
    SearchPage {
        matches: page_matches,
        total,
        page: effective.page,
        page_size: effective.page_size,
    }
}
