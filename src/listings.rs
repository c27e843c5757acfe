use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use tracing::trace;

use crate::errors::{AppError, AppResult};
use crate::geocode::Coordinates;
use crate::states::StateCode;

const EARTH_RADIUS_MILES: f64 = 3958.8;
const MILES_PER_DEGREE_LAT: f64 = 69.0;

/// Categorical filters shared by every search tier. An empty trade set means
/// "any trade"; the set is normally a synonym expansion so listings stored
/// under any alias match.
#[derive(Debug, Clone, Default)]
pub struct ListingFilters {
    pub trades: Vec<String>,
    pub state: Option<StateCode>,
    pub keyword: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewListing {
    pub title: String,
    pub description: Option<String>,
    pub trade: String,
    pub city: Option<String>,
    pub state: Option<StateCode>,
    pub zip: Option<String>,
}

/// Persistence collaborator for job listings: conventional writes plus the
/// two query shapes the matcher needs (radius-ordered and recency-ordered).
#[derive(Clone)]
pub struct ListingStore {
    db: Arc<Mutex<Connection>>,
}

impl ListingStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    pub fn insert(&self, listing: &NewListing) -> AppResult<i64> {
        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO listings (title, description, trade, city, state, zip)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            (
                listing.title.as_str(),
                listing.description.as_deref(),
                listing.trade.as_str(),
                listing.city.as_deref(),
                listing.state.map(|code| code.as_str()),
                listing.zip.as_deref(),
            ),
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Overwrites the stored coordinate pair after a successful resolution.
    /// Failed resolutions leave the previous pair untouched, so stale
    /// coordinates beat missing ones.
    pub fn refresh_coordinates(&self, listing_id: i64, coords: Coordinates) -> AppResult<()> {
        let conn = self.db.lock();
        let updated = conn.execute(
            "UPDATE listings SET lat = ?2, lon = ?3 WHERE id = ?1",
            (listing_id, coords.lat, coords.lon),
        )?;
        if updated == 0 {
            return Err(AppError::Config(format!(
                "listing {listing_id} not found for coordinate refresh"
            )));
        }
        trace!(listing_id, lat = coords.lat, lon = coords.lon, "coordinates refreshed");
        Ok(())
    }

    /// Spatial primitive: IDs of listings whose stored coordinates fall
    /// within `radius_miles` of `origin`, ordered by great-circle distance
    /// ascending. Listings without coordinates never match this query.
    pub fn within_radius(
        &self,
        origin: Coordinates,
        radius_miles: f64,
        filters: &ListingFilters,
    ) -> AppResult<Vec<(i64, f64)>> {
        let mut sql = String::from(
            "SELECT id, lat, lon FROM listings
            WHERE lat IS NOT NULL AND lon IS NOT NULL
            AND lat BETWEEN ?1 AND ?2 AND lon BETWEEN ?3 AND ?4",
        );
        // Bounding-box prefilter; exact distances are computed per candidate.
        let lat_delta = radius_miles / MILES_PER_DEGREE_LAT;
        let lon_scale = origin.lat.to_radians().cos().abs().max(0.01);
        let lon_delta = radius_miles / (MILES_PER_DEGREE_LAT * lon_scale);
        let mut params: Vec<Value> = vec![
            (origin.lat - lat_delta).into(),
            (origin.lat + lat_delta).into(),
            (origin.lon - lon_delta).into(),
            (origin.lon + lon_delta).into(),
        ];
        append_filters(&mut sql, &mut params, filters);

        let candidates = {
            let conn = self.db.lock();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(params), |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, f64>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut matches: Vec<(i64, f64)> = candidates
            .into_iter()
            .filter_map(|(id, lat, lon)| {
                let distance = haversine_miles(origin, Coordinates { lat, lon });
                (distance <= radius_miles).then_some((id, distance))
            })
            .collect();
        matches.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        Ok(matches)
    }

    /// Equality/recency primitive: categorical filters plus an optional
    /// exact ZIP match, most recent listings first.
    pub fn recent_matching(
        &self,
        filters: &ListingFilters,
        exact_zip: Option<&str>,
    ) -> AppResult<Vec<i64>> {
        let mut sql = String::from("SELECT id FROM listings WHERE 1=1");
        let mut params: Vec<Value> = Vec::new();
        if let Some(zip) = exact_zip {
            params.push(zip.to_string().into());
            sql.push_str(&format!(" AND zip = ?{}", params.len()));
        }
        append_filters(&mut sql, &mut params, filters);
        sql.push_str(" ORDER BY created_at DESC, id DESC");

        let conn = self.db.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(params), |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn append_filters(sql: &mut String, params: &mut Vec<Value>, filters: &ListingFilters) {
    if !filters.trades.is_empty() {
        let placeholders: Vec<String> = filters
            .trades
            .iter()
            .map(|trade| {
                params.push(trade.clone().into());
                format!("?{}", params.len())
            })
            .collect();
        sql.push_str(&format!(
            " AND trade COLLATE NOCASE IN ({})",
            placeholders.join(", ")
        ));
    }
    if let Some(state) = filters.state {
        params.push(state.as_str().to_string().into());
        sql.push_str(&format!(" AND state = ?{}", params.len()));
    }
    if let Some(keyword) = &filters.keyword {
        let pattern = format!("%{}%", keyword.trim());
        params.push(pattern.into());
        sql.push_str(&format!(
            " AND (title LIKE ?{n} OR description LIKE ?{n})",
            n = params.len()
        ));
    }
}

/// Great-circle distance between two points in miles.
pub fn haversine_miles(a: Coordinates, b: Coordinates) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_MILES * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use crate::db::bootstrap;
    use crate::states::normalize_state;

    use super::*;

    fn store() -> (tempfile::TempDir, ListingStore) {
        let dir = tempdir().unwrap();
        let context = bootstrap(dir.path(), "listings.db").unwrap();
        let store = ListingStore::new(Arc::new(Mutex::new(context.connection)));
        (dir, store)
    }

    fn listing(title: &str, trade: &str, state: &str, zip: &str) -> NewListing {
        NewListing {
            title: title.to_string(),
            description: None,
            trade: trade.to_string(),
            city: None,
            state: normalize_state(Some(state)),
            zip: Some(zip.to_string()),
        }
    }

    #[test]
    fn haversine_matches_known_distance() {
        // Phoenix to Tucson is roughly 108 miles.
        let phoenix = Coordinates {
            lat: 33.4484,
            lon: -112.074,
        };
        let tucson = Coordinates {
            lat: 32.2226,
            lon: -110.9747,
        };
        let distance = haversine_miles(phoenix, tucson);
        assert!((100.0..120.0).contains(&distance), "got {distance}");
        assert_eq!(haversine_miles(phoenix, phoenix), 0.0);
    }

    #[test]
    fn radius_query_orders_by_distance() {
        let (_dir, store) = store();
        let phoenix = Coordinates {
            lat: 33.4484,
            lon: -112.074,
        };

        let near = store.insert(&listing("Near", "Electrician", "AZ", "85004")).unwrap();
        let far = store.insert(&listing("Far", "Electrician", "AZ", "85301")).unwrap();
        let outside = store.insert(&listing("Outside", "Electrician", "AZ", "85701")).unwrap();
        store
            .refresh_coordinates(near, Coordinates { lat: 33.45, lon: -112.07 })
            .unwrap();
        store
            .refresh_coordinates(far, Coordinates { lat: 33.53, lon: -112.18 })
            .unwrap();
        store
            .refresh_coordinates(outside, Coordinates { lat: 32.2226, lon: -110.9747 })
            .unwrap();
        // No coordinates at all: never matches the spatial query.
        store.insert(&listing("Unresolved", "Electrician", "AZ", "85004")).unwrap();

        let matches = store
            .within_radius(phoenix, 25.0, &ListingFilters::default())
            .unwrap();
        let ids: Vec<i64> = matches.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![near, far]);
        assert!(matches.windows(2).all(|pair| pair[0].1 <= pair[1].1));
    }

    #[test]
    fn filters_apply_to_both_primitives() {
        let (_dir, store) = store();
        let origin = Coordinates { lat: 33.45, lon: -112.07 };

        let wired = store
            .insert(&listing("Inside wiring crew", "Inside Wireman", "AZ", "85004"))
            .unwrap();
        let pipes = store
            .insert(&listing("Pipe crew", "Plumber", "AZ", "85004"))
            .unwrap();
        store.refresh_coordinates(wired, origin).unwrap();
        store.refresh_coordinates(pipes, origin).unwrap();

        let filters = ListingFilters {
            trades: vec!["Electrician".into(), "Inside Wireman".into()],
            state: None,
            keyword: None,
        };
        let spatial = store.within_radius(origin, 10.0, &filters).unwrap();
        assert_eq!(spatial.len(), 1);
        assert_eq!(spatial[0].0, wired);

        let fallback = store.recent_matching(&filters, Some("85004")).unwrap();
        assert_eq!(fallback, vec![wired]);

        let keyword = ListingFilters {
            trades: Vec::new(),
            state: None,
            keyword: Some("pipe".into()),
        };
        let by_keyword = store.recent_matching(&keyword, None).unwrap();
        assert_eq!(by_keyword, vec![pipes]);
    }

    #[test]
    fn recency_order_is_most_recent_first() {
        let (_dir, store) = store();
        let first = store.insert(&listing("One", "Laborer", "TX", "75001")).unwrap();
        let second = store.insert(&listing("Two", "Laborer", "TX", "75001")).unwrap();

        let ids = store
            .recent_matching(&ListingFilters::default(), None)
            .unwrap();
        assert_eq!(ids, vec![second, first]);
    }

    #[test]
    fn refresh_requires_an_existing_listing() {
        let (_dir, store) = store();
        let err = store
            .refresh_coordinates(42, Coordinates { lat: 1.0, lon: 2.0 })
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
