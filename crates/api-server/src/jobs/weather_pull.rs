//! Daily weather pull for located sites

use chrono::{Duration, NaiveDate, Utc};
use tracing::{info, warn};

use crate::state::AppState;

/// Fetch one observation per located site and upsert it on (site, date).
pub async fn run_pull(state: &AppState, date: NaiveDate) -> usize {
    let mut written = 0;
    for site in state.fleet_store().sites_with_location().await {
        let (Some(lat), Some(lon)) = (site.lat, site.lon) else {
            continue;
        };
        let observation = match state.weather_provider().observe(lat, lon, date).await {
            Ok(observation) => observation,
            Err(err) => {
                warn!("Weather pull failed for site {}: {}", site.id, err);
                continue;
            }
        };
        match state.weather_store().upsert(site.id, date, observation).await {
            Ok(_) => written += 1,
            Err(err) => warn!("Weather upsert failed for site {}: {}", site.id, err),
        }
    }

    info!("Weather pull for {}: {} site(s)", date, written);
    written
}

pub fn start(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        let mut last_run: Option<NaiveDate> = None;
        loop {
            interval.tick().await;
            let now = Utc::now();
            let today = now.date_naive();
            if now.time() >= state.config().weather_time && last_run != Some(today) {
                run_pull(&state, today - Duration::days(1)).await;
                last_run = Some(today);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use crate::state::test_support::build_state;
    use crate::testutil::{create_locked_site, create_tenant, register_user};

    use super::*;

    #[tokio::test]
    async fn pull_upserts_once_per_site_day() {
        let (state, _temp_dir) = build_state().await;
        register_user(&state, "root@example.com").await;
        let tenant = create_tenant(&state, "Acme Solar").await;
        let site = create_locked_site(&state, tenant.id, 37.975, 23.735).await;

        let date = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
        assert_eq!(run_pull(&state, date).await, 1);
        assert_eq!(run_pull(&state, date).await, 1);

        let rows = state.weather_store().for_site(site.id, 10).await;
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn sites_without_coordinates_are_skipped() {
        let (state, _temp_dir) = build_state().await;
        register_user(&state, "root@example.com").await;
        let tenant = create_tenant(&state, "Acme Solar").await;
        state
            .fleet_store()
            .create_site(
                tenant.id,
                hf_core::fleet::NewSite {
                    name: "Unlocated".to_string(),
                    address_line: None,
                    city: None,
                    postal_code: None,
                    country: None,
                    lat: None,
                    lon: None,
                    location_lock: false,
                },
            )
            .await
            .unwrap();

        let date = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
        assert_eq!(run_pull(&state, date).await, 0);
    }
}
