//! Daily analytics rollup

use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use tracing::{info, warn};

use hf_core::fleet::DeviceStatus;
use hf_core::rollup::compute_daily_rollup;

use crate::state::AppState;

const ROLLUP_STATUSES: &[DeviceStatus] = &[DeviceStatus::Active, DeviceStatus::Installed];

/// Aggregate one calendar day for every active/installed device that has
/// telemetry in the window. Returns the number of rollups written.
pub async fn run_for_day(state: &AppState, day: NaiveDate) -> usize {
    let start = day.and_time(NaiveTime::MIN).and_utc();
    let end = start + Duration::days(1);
    let mut written = 0;

    for device in state.fleet_store().all_devices_in(ROLLUP_STATUSES).await {
        let readings = state
            .fleet_store()
            .telemetry_between(device.id, start, end)
            .await;
        if readings.is_empty() {
            continue;
        }
        let values = compute_daily_rollup(&readings);
        match state
            .rollup_store()
            .upsert(device.tenant_id, device.id, day, values)
            .await
        {
            Ok(_) => written += 1,
            Err(err) => warn!("Rollup upsert failed for device {}: {}", device.id, err),
        }
    }

    info!("Daily rollup for {}: {} device(s)", day, written);
    written
}

/// Fire once a day when the wall clock passes the configured mark,
/// aggregating the previous day.
pub fn start(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        let mut last_run: Option<NaiveDate> = None;
        loop {
            interval.tick().await;
            let now = Utc::now();
            let today = now.date_naive();
            if now.time() >= state.config().rollup_time && last_run != Some(today) {
                run_for_day(&state, today - Duration::days(1)).await;
                last_run = Some(today);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::TimeZone;

    use hf_core::fleet::{DeviceUpdate, IngestReading, MetricValue};

    use crate::state::test_support::build_state;
    use crate::testutil::{create_tenant, provision_device, register_user};

    use super::*;

    #[tokio::test]
    async fn rollup_aggregates_and_reruns_identically() {
        let (state, _temp_dir) = build_state().await;
        register_user(&state, "root@example.com").await;
        let tenant = create_tenant(&state, "Acme Solar").await;
        let (device, _) = provision_device(&state, tenant.id, "SN-1", None).await;
        state
            .fleet_store()
            .update_device(
                None,
                device.id,
                DeviceUpdate {
                    status: Some(DeviceStatus::Active),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let day = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
        for (minute, power, heater) in [(0, 1800.0, true), (10, 1800.0, true), (20, 0.0, false)] {
            let mut metrics = BTreeMap::new();
            metrics.insert("powerW".to_string(), MetricValue::Number(power));
            metrics.insert("heaterOn".to_string(), MetricValue::Bool(heater));
            metrics.insert("tankTempC".to_string(), MetricValue::Number(50.0 + minute as f64));
            state
                .fleet_store()
                .ingest_telemetry(IngestReading {
                    device_id: device.id,
                    ts: Utc.with_ymd_and_hms(2026, 2, 10, 9, minute, 0).unwrap(),
                    metrics,
                    geo: None,
                })
                .await
                .unwrap();
        }

        assert_eq!(run_for_day(&state, day).await, 1);
        let first = state.rollup_store().get(device.id, day).await.unwrap();
        // 1.8 kW for 5 min + 1.8 kW for 10 min = 0.45 kWh
        assert_eq!(first.energy_kwh, 0.45);
        assert_eq!(first.heater_on_minutes, 15);
        assert_eq!(first.tank_temp_min, Some(50.0));
        assert_eq!(first.tank_temp_max, Some(70.0));

        // re-running the job yields the same row
        assert_eq!(run_for_day(&state, day).await, 1);
        let second = state.rollup_store().get(device.id, day).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.energy_kwh, first.energy_kwh);
    }

    #[tokio::test]
    async fn devices_without_telemetry_are_skipped() {
        let (state, _temp_dir) = build_state().await;
        register_user(&state, "root@example.com").await;
        let tenant = create_tenant(&state, "Acme Solar").await;
        let (device, _) = provision_device(&state, tenant.id, "SN-1", None).await;
        state
            .fleet_store()
            .update_device(
                None,
                device.id,
                DeviceUpdate {
                    status: Some(DeviceStatus::Active),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let day = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
        assert_eq!(run_for_day(&state, day).await, 0);
        assert!(state.rollup_store().get(device.id, day).await.is_none());
    }
}
