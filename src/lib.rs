mod config;
mod db;
mod errors;
mod geocode;
mod listings;
mod search;
mod states;
mod trades;
mod zip;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use crate::config::AppConfig;
pub use crate::db::{bootstrap, DatabaseContext};
pub use crate::errors::{AppError, AppResult};
pub use crate::geocode::{Coordinates, GeocodeLookup, GeocodeService, GeocodedPlace};
pub use crate::listings::{haversine_miles, ListingFilters, ListingStore, NewListing};
pub use crate::search::{
    ListingMatch, RadiusMatcher, RadiusSearchRequest, SearchFilters, SearchPage,
    SearchPagination, MAX_RADIUS_MILES,
};
pub use crate::states::{normalize_state, state_name, StateCode, STATE_TABLE};
pub use crate::trades::{TradeBook, TradeLabel};
pub use crate::zip::{ZipResolver, ZipValidation};

/// Wires the normalization and matching components over one listing store.
/// Everything here is request-scoped and stateless apart from the shared
/// database handle.
pub struct MatchEngine {
    store: ListingStore,
    geocoder: GeocodeService,
    zip_resolver: ZipResolver,
    matcher: RadiusMatcher,
    db_path: PathBuf,
}

impl MatchEngine {
    pub fn initialize(data_dir: &Path, config: &AppConfig) -> AppResult<Self> {
        init_tracing();
        let context = bootstrap(data_dir, &config.database_file_name)?;
        let store = ListingStore::new(Arc::new(Mutex::new(context.connection)));
        let geocoder = GeocodeService::new(config);
        Ok(Self {
            zip_resolver: ZipResolver::new(geocoder.clone()),
            matcher: RadiusMatcher::new(store.clone(), geocoder.clone()),
            store,
            geocoder,
            db_path: context.path,
        })
    }

    pub fn store(&self) -> &ListingStore {
        &self.store
    }

    pub fn zip_resolver(&self) -> &ZipResolver {
        &self.zip_resolver
    }

    pub fn matcher(&self) -> &RadiusMatcher {
        &self.matcher
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Inserts a listing and annotates it with coordinates when its ZIP
    /// resolves. Resolution failure never blocks the write; the listing
    /// simply stays without coordinates until the next successful refresh.
    pub async fn create_listing(&self, listing: &NewListing) -> AppResult<i64> {
        let id = self.store.insert(listing)?;
        if let Some(zip) = listing.zip.as_deref().map(str::trim).filter(|z| !z.is_empty()) {
            match self.geocoder.resolve_zip(zip).await {
                Some(coords) => self.store.refresh_coordinates(id, coords)?,
                None => warn!(id, zip, "listing stored without coordinates"),
            }
        }
        Ok(id)
    }
}

fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,craftmatch=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
