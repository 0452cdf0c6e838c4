//! Periodic alert rule sweep

use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use hf_core::alert::dedupe_key;
use hf_core::fleet::DeviceStatus;

use crate::state::AppState;

const SWEEP_STATUSES: &[DeviceStatus] = &[DeviceStatus::Active, DeviceStatus::Installed];

/// One full sweep over every enabled rule. Returns the number of events
/// opened.
pub async fn run_sweep(state: &AppState) -> usize {
    let defaults = state.config().eval_defaults();
    let now = Utc::now();
    let mut opened = 0;

    for rule in state.alert_store().enabled_rules().await {
        let devices = state
            .fleet_store()
            .devices_for_tenant_in(rule.tenant_id, SWEEP_STATUSES)
            .await;
        for device in devices {
            let key = dedupe_key(device.id, rule.id);
            if state.alert_store().has_active_event(&key).await {
                continue;
            }

            let recent = match rule.spec.telemetry_needs(&defaults) {
                None => Vec::new(),
                Some(needs) => {
                    let since = needs
                        .within_minutes
                        .map(|minutes| now - Duration::minutes(minutes));
                    state
                        .fleet_store()
                        .recent_telemetry(device.id, needs.limit, since)
                        .await
                }
            };
            let twin = state.fleet_store().get_twin(None, device.id).await.ok();

            let Some(details) =
                rule.spec
                    .should_fire(&defaults, now, &device, twin.as_ref(), &recent)
            else {
                continue;
            };

            match state.alert_store().open_event(&rule, device.id, details).await {
                Ok(event) => {
                    opened += 1;
                    let payload = json!({
                        "alertEventId": event.id,
                        "deviceId": event.device_id,
                        "rule": rule.name,
                        "severity": event.severity,
                        "openedAt": event.opened_at,
                        "details": event.details,
                    });
                    if let Err(err) = state
                        .notify_store()
                        .enqueue_for_alert(&event, payload)
                        .await
                    {
                        warn!("Failed to enqueue notifications for alert {}: {}", event.id, err);
                    }
                }
                // a concurrent sweep won the insert race; nothing to do
                Err(hf_core::Error::Conflict(_)) => {
                    debug!("Alert event for {} already open", key);
                }
                Err(err) => warn!("Failed to open alert event for {}: {}", key, err),
            }
        }
    }

    if opened > 0 {
        info!("Alert sweep opened {} event(s)", opened);
    }
    opened
}

pub fn start(state: AppState) {
    let minutes = state.config().alert_eval_interval_minutes.max(1);
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(minutes * 60));
        loop {
            interval.tick().await;
            run_sweep(&state).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use hf_core::alert::{AlertStatus, NewAlertRule, RuleSpec, Severity};
    use hf_core::fleet::{DeviceUpdate, IngestReading, MetricValue};
    use hf_core::notify::{ChannelType, NewNotificationChannel};

    use crate::state::test_support::build_state;
    use crate::state::AppState;
    use crate::testutil::{create_tenant, provision_device, register_user};

    use super::run_sweep;

    async fn activate(state: &AppState, device_id: Uuid) {
        state
            .fleet_store()
            .update_device(
                None,
                device_id,
                DeviceUpdate {
                    status: Some(hf_core::fleet::DeviceStatus::Active),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    async fn ingest_tank_temp(state: &AppState, device_id: Uuid, temp: f64) {
        let mut metrics = std::collections::BTreeMap::new();
        metrics.insert("tankTempC".to_string(), MetricValue::Number(temp));
        state
            .fleet_store()
            .ingest_telemetry(IngestReading {
                device_id,
                ts: chrono::Utc::now(),
                metrics,
                geo: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn sweep_opens_and_dedupes_and_notifies() {
        let (state, _temp_dir) = build_state().await;
        register_user(&state, "root@example.com").await;
        let tenant = create_tenant(&state, "Acme Solar").await;
        let (device, _) = provision_device(&state, tenant.id, "SN-1", None).await;
        activate(&state, device.id).await;

        state
            .notify_store()
            .create_channel(
                tenant.id,
                NewNotificationChannel {
                    channel_type: ChannelType::Webhook,
                    config: json!({}),
                    enabled: true,
                },
            )
            .await
            .unwrap();
        state
            .alert_store()
            .create_rule(
                tenant.id,
                NewAlertRule {
                    name: "overheat".to_string(),
                    enabled: true,
                    spec: RuleSpec::OverTemp { threshold_c: Some(85.0) },
                    severity: Severity::Critical,
                },
            )
            .await
            .unwrap();

        ingest_tank_temp(&state, device.id, 91.0).await;

        assert_eq!(run_sweep(&state).await, 1);
        // a second sweep with no state change opens nothing
        assert_eq!(run_sweep(&state).await, 0);

        let (events, total) = state
            .alert_store()
            .list_events(tenant.id, Default::default())
            .await;
        assert_eq!(total, 1);
        assert_eq!(events[0].status, AlertStatus::Open);
        assert_eq!(events[0].details["lastTankTempC"], json!(91.0));

        // the webhook channel got one queued notification
        let queued = state.notify_store().queued_events(100).await;
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].alert_event_id, Some(events[0].id));
    }

    #[tokio::test]
    async fn closed_event_allows_a_reopen_on_next_sweep() {
        let (state, _temp_dir) = build_state().await;
        register_user(&state, "root@example.com").await;
        let tenant = create_tenant(&state, "Acme Solar").await;
        let (device, _) = provision_device(&state, tenant.id, "SN-1", None).await;
        activate(&state, device.id).await;

        state
            .alert_store()
            .create_rule(
                tenant.id,
                NewAlertRule {
                    name: "overheat".to_string(),
                    enabled: true,
                    spec: RuleSpec::OverTemp { threshold_c: Some(85.0) },
                    severity: Severity::Warning,
                },
            )
            .await
            .unwrap();
        ingest_tank_temp(&state, device.id, 95.0).await;

        assert_eq!(run_sweep(&state).await, 1);
        let (events, _) = state
            .alert_store()
            .list_events(tenant.id, Default::default())
            .await;
        state
            .alert_store()
            .close_event(Some(tenant.id), events[0].id)
            .await
            .unwrap();

        // the condition still holds, so the pair re-opens
        assert_eq!(run_sweep(&state).await, 1);
    }

    #[tokio::test]
    async fn provisioned_devices_are_not_swept() {
        let (state, _temp_dir) = build_state().await;
        register_user(&state, "root@example.com").await;
        let tenant = create_tenant(&state, "Acme Solar").await;
        let (_device, _) = provision_device(&state, tenant.id, "SN-1", None).await;
        // left in PROVISIONED

        state
            .alert_store()
            .create_rule(
                tenant.id,
                NewAlertRule {
                    name: "silence".to_string(),
                    enabled: true,
                    spec: RuleSpec::NoTelemetry { threshold_minutes: Some(30) },
                    severity: Severity::Warning,
                },
            )
            .await
            .unwrap();

        assert_eq!(run_sweep(&state).await, 0);
    }

    #[tokio::test]
    async fn disabled_rules_are_skipped() {
        let (state, _temp_dir) = build_state().await;
        register_user(&state, "root@example.com").await;
        let tenant = create_tenant(&state, "Acme Solar").await;
        let (device, _) = provision_device(&state, tenant.id, "SN-1", None).await;
        activate(&state, device.id).await;

        state
            .alert_store()
            .create_rule(
                tenant.id,
                NewAlertRule {
                    name: "silence".to_string(),
                    enabled: false,
                    spec: RuleSpec::NoTelemetry { threshold_minutes: Some(30) },
                    severity: Severity::Warning,
                },
            )
            .await
            .unwrap();

        assert_eq!(run_sweep(&state).await, 0);
    }
}
