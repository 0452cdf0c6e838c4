//! File-backed fleet storage
//!
//! Sites, devices, device secrets, telemetry and twins live in one state
//! file so the telemetry ingest fan-out happens under a single write lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{Error, Result};

use super::geo::haversine_km;
use super::model::*;

/// Audit action emitted the first time a device fills an empty site location.
pub const AUDIT_SITE_LOCATION_SET_FROM_DEVICE: &str = "SITE_LOCATION_SET_FROM_DEVICE";
/// Audit action emitted when a reported position is > 1 km from the site.
pub const AUDIT_DEVICE_GEO_LARGE_JUMP: &str = "DEVICE_GEO_LARGE_JUMP";

const GEO_JUMP_THRESHOLD_KM: f64 = 1.0;

#[derive(Debug, Default)]
struct FleetState {
    sites: HashMap<Uuid, Site>,
    devices: HashMap<Uuid, Device>,
    secrets: HashMap<Uuid, DeviceSecret>,
    telemetry: Vec<Telemetry>,
    twins: HashMap<Uuid, DeviceTwin>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredFleetState {
    sites: Vec<Site>,
    devices: Vec<Device>,
    secrets: Vec<DeviceSecret>,
    telemetry: Vec<Telemetry>,
    twins: Vec<DeviceTwin>,
}

impl From<StoredFleetState> for FleetState {
    fn from(value: StoredFleetState) -> Self {
        Self {
            sites: value.sites.into_iter().map(|s| (s.id, s)).collect(),
            devices: value.devices.into_iter().map(|d| (d.id, d)).collect(),
            secrets: value.secrets.into_iter().map(|s| (s.device_id, s)).collect(),
            telemetry: value.telemetry,
            twins: value.twins.into_iter().map(|t| (t.device_id, t)).collect(),
        }
    }
}

impl From<&FleetState> for StoredFleetState {
    fn from(value: &FleetState) -> Self {
        Self {
            sites: value.sites.values().cloned().collect(),
            devices: value.devices.values().cloned().collect(),
            secrets: value.secrets.values().cloned().collect(),
            telemetry: value.telemetry.clone(),
            twins: value.twins.values().cloned().collect(),
        }
    }
}

/// Per-status device counts for the dashboard.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCounts {
    pub total: usize,
    pub provisioned: usize,
    pub installed: usize,
    pub active: usize,
    pub suspended: usize,
    pub retired: usize,
    pub online: usize,
}

pub struct FleetStore {
    state: RwLock<FleetState>,
    file_path: PathBuf,
}

impl FleetStore {
    pub async fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir).await?;
        let file_path = data_dir.join("fleet.json");
        let state = load_state(&file_path).await?;
        Ok(Self {
            state: RwLock::new(state),
            file_path,
        })
    }

    // --- sites ---

    pub async fn create_site(&self, tenant_id: Uuid, new: NewSite) -> Result<Site> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("Site name cannot be empty".to_string()));
        }

        let now = Utc::now();
        let site = Site {
            id: Uuid::new_v4(),
            tenant_id,
            name: name.to_string(),
            address_line: new.address_line,
            city: new.city,
            postal_code: new.postal_code,
            country: new.country,
            lat: new.lat,
            lon: new.lon,
            location_source: new.lat.and(new.lon).map(|_| GeoSource::Manual),
            location_accuracy_m: None,
            location_confidence: None,
            location_updated_at: new.lat.and(new.lon).map(|_| now),
            location_updated_by: None,
            location_lock: new.location_lock,
            created_at: now,
            updated_at: now,
        };

        let mut state = self.state.write().await;
        state.sites.insert(site.id, site.clone());
        persist_state(&self.file_path, &state).await?;
        Ok(site)
    }

    /// Fetch a site; a `Some` tenant scopes the lookup and hides foreign rows.
    pub async fn get_site(&self, tenant_id: Option<Uuid>, site_id: Uuid) -> Result<Site> {
        let state = self.state.read().await;
        state
            .sites
            .get(&site_id)
            .filter(|site| tenant_id.is_none_or(|t| site.tenant_id == t))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Site {} not found", site_id)))
    }

    pub async fn list_sites(&self, tenant_id: Uuid) -> Result<Vec<Site>> {
        let state = self.state.read().await;
        let mut sites: Vec<Site> = state
            .sites
            .values()
            .filter(|site| site.tenant_id == tenant_id)
            .cloned()
            .collect();
        sites.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(sites)
    }

    pub async fn update_site_location(
        &self,
        tenant_id: Option<Uuid>,
        site_id: Uuid,
        update: SiteLocationUpdate,
        updated_by: Uuid,
    ) -> Result<Site> {
        let mut state = self.state.write().await;
        let site = state
            .sites
            .get_mut(&site_id)
            .filter(|site| tenant_id.is_none_or(|t| site.tenant_id == t))
            .ok_or_else(|| Error::NotFound(format!("Site {} not found", site_id)))?;

        let now = Utc::now();
        site.lat = Some(update.lat);
        site.lon = Some(update.lon);
        site.location_source = Some(update.source);
        site.location_accuracy_m = update.accuracy_m;
        site.location_updated_at = Some(now);
        site.location_updated_by = Some(updated_by);
        if let Some(lock) = update.lock {
            site.location_lock = lock;
        }
        if update.address_line.is_some() {
            site.address_line = update.address_line;
        }
        if update.city.is_some() {
            site.city = update.city;
        }
        if update.postal_code.is_some() {
            site.postal_code = update.postal_code;
        }
        if update.country.is_some() {
            site.country = update.country;
        }
        site.updated_at = now;

        let site = site.clone();
        persist_state(&self.file_path, &state).await?;
        Ok(site)
    }

    /// Sites that have coordinates, across every tenant. Used by the daily
    /// weather pull.
    pub async fn sites_with_location(&self) -> Vec<Site> {
        let state = self.state.read().await;
        state
            .sites
            .values()
            .filter(|site| site.lat.is_some() && site.lon.is_some())
            .cloned()
            .collect()
    }

    /// Whether any device on the site is owned by the given user. Backs the
    /// END_USER site-location permission check.
    pub async fn site_has_device_owned_by(&self, site_id: Uuid, user_id: Uuid) -> bool {
        let state = self.state.read().await;
        state
            .devices
            .values()
            .any(|device| device.site_id == Some(site_id) && device.owner_user_id == Some(user_id))
    }

    // --- devices ---

    pub async fn create_device(
        &self,
        tenant_id: Uuid,
        new: NewDevice,
        mac_digest: String,
    ) -> Result<Device> {
        self.create_device_with_id(Uuid::new_v4(), tenant_id, new, mac_digest)
            .await
    }

    /// Provisioning mints the MAC token from the device id before the row
    /// exists, so the caller may pre-assign the id.
    pub async fn create_device_with_id(
        &self,
        device_id: Uuid,
        tenant_id: Uuid,
        new: NewDevice,
        mac_digest: String,
    ) -> Result<Device> {
        let serial = new.serial_number.trim();
        if serial.is_empty() {
            return Err(Error::InvalidInput(
                "Device serial number cannot be empty".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        if let Some(site_id) = new.site_id {
            if !state
                .sites
                .get(&site_id)
                .is_some_and(|site| site.tenant_id == tenant_id)
            {
                return Err(Error::NotFound(format!("Site {} not found", site_id)));
            }
        }
        if state
            .devices
            .values()
            .any(|device| device.tenant_id == tenant_id && device.serial_number == serial)
        {
            return Err(Error::Conflict(format!(
                "Device serial '{}' already exists in tenant",
                serial
            )));
        }

        if state.devices.contains_key(&device_id) {
            return Err(Error::Conflict(format!(
                "Device {} already exists",
                device_id
            )));
        }

        let now = Utc::now();
        let device = Device {
            id: device_id,
            tenant_id,
            site_id: new.site_id,
            owner_user_id: new.owner_user_id,
            serial_number: serial.to_string(),
            model: new.model,
            name: new.name,
            notes: new.notes,
            tags: new.tags,
            status: DeviceStatus::Provisioned,
            last_seen_at: None,
            firmware_version: None,
            sim_iccid: new.sim_iccid,
            reported_lat: None,
            reported_lon: None,
            reported_geo_source: None,
            reported_accuracy_m: None,
            created_at: now,
            updated_at: now,
        };
        let secret = DeviceSecret {
            device_id: device.id,
            mac_digest,
            created_at: now,
        };

        state.devices.insert(device.id, device.clone());
        state.secrets.insert(device.id, secret);
        persist_state(&self.file_path, &state).await?;
        Ok(device)
    }

    pub async fn get_device(&self, tenant_id: Option<Uuid>, device_id: Uuid) -> Result<Device> {
        let state = self.state.read().await;
        state
            .devices
            .get(&device_id)
            .filter(|device| tenant_id.is_none_or(|t| device.tenant_id == t))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Device {} not found", device_id)))
    }

    pub async fn list_devices(
        &self,
        tenant_id: Uuid,
        filter: DeviceFilter,
    ) -> Result<(Vec<Device>, usize)> {
        let state = self.state.read().await;
        let search = filter.search.as_deref().map(str::to_lowercase);
        let mut devices: Vec<Device> = state
            .devices
            .values()
            .filter(|device| device.tenant_id == tenant_id)
            .filter(|device| filter.status.is_none_or(|s| device.status == s))
            .filter(|device| filter.site_id.is_none_or(|s| device.site_id == Some(s)))
            .filter(|device| {
                search.as_deref().is_none_or(|needle| {
                    device.serial_number.to_lowercase().contains(needle)
                        || device
                            .name
                            .as_deref()
                            .is_some_and(|name| name.to_lowercase().contains(needle))
                })
            })
            .cloned()
            .collect();
        devices.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let total = devices.len();
        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(100).clamp(1, 1000);
        let page = devices.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }

    pub async fn update_device(
        &self,
        tenant_id: Option<Uuid>,
        device_id: Uuid,
        update: DeviceUpdate,
    ) -> Result<Device> {
        let mut state = self.state.write().await;
        if let Some(site_id) = update.site_id {
            let owner_tenant = state.devices.get(&device_id).map(|d| d.tenant_id);
            if !state
                .sites
                .get(&site_id)
                .is_some_and(|site| Some(site.tenant_id) == owner_tenant)
            {
                return Err(Error::NotFound(format!("Site {} not found", site_id)));
            }
        }
        let device = state
            .devices
            .get_mut(&device_id)
            .filter(|device| tenant_id.is_none_or(|t| device.tenant_id == t))
            .ok_or_else(|| Error::NotFound(format!("Device {} not found", device_id)))?;

        if let Some(name) = update.name {
            device.name = Some(name);
        }
        if let Some(notes) = update.notes {
            device.notes = Some(notes);
        }
        if let Some(site_id) = update.site_id {
            device.site_id = Some(site_id);
        }
        if let Some(owner) = update.owner_user_id {
            device.owner_user_id = Some(owner);
        }
        if let Some(status) = update.status {
            device.status = status;
        }
        if let Some(iccid) = update.sim_iccid {
            device.sim_iccid = Some(iccid);
        }
        if let Some(tags) = update.tags {
            device.tags = tags;
        }
        device.updated_at = Utc::now();

        let device = device.clone();
        persist_state(&self.file_path, &state).await?;
        Ok(device)
    }

    /// Write a new firmware version after a successful OTA report.
    pub async fn set_firmware_version(&self, device_id: Uuid, version: &str) -> Result<Device> {
        let mut state = self.state.write().await;
        let device = state
            .devices
            .get_mut(&device_id)
            .ok_or_else(|| Error::NotFound(format!("Device {} not found", device_id)))?;
        device.firmware_version = Some(version.to_string());
        device.updated_at = Utc::now();
        let device = device.clone();
        persist_state(&self.file_path, &state).await?;
        Ok(device)
    }

    pub async fn device_secret(&self, device_id: Uuid) -> Result<DeviceSecret> {
        let state = self.state.read().await;
        state
            .secrets
            .get(&device_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("No secret for device {}", device_id)))
    }

    pub async fn devices_for_tenant_in(
        &self,
        tenant_id: Uuid,
        statuses: &[DeviceStatus],
    ) -> Vec<Device> {
        let state = self.state.read().await;
        state
            .devices
            .values()
            .filter(|device| device.tenant_id == tenant_id && statuses.contains(&device.status))
            .cloned()
            .collect()
    }

    pub async fn all_devices_in(&self, statuses: &[DeviceStatus]) -> Vec<Device> {
        let state = self.state.read().await;
        state
            .devices
            .values()
            .filter(|device| statuses.contains(&device.status))
            .cloned()
            .collect()
    }

    // --- telemetry ingest ---

    /// Persist a reading and fan out to device, twin and site state. The
    /// whole sequence runs under one write lock and one persist.
    pub async fn ingest_telemetry(&self, reading: IngestReading) -> Result<IngestOutcome> {
        let warnings = validate_metrics(&reading.metrics);
        let mut audits = Vec::new();

        let mut state = self.state.write().await;
        let device = state
            .devices
            .get_mut(&reading.device_id)
            .ok_or_else(|| Error::NotFound(format!("Device {} not found", reading.device_id)))?;
        let tenant_id = device.tenant_id;
        let site_id = device.site_id;
        let now = Utc::now();

        device.last_seen_at = Some(reading.ts);
        if let Some(geo) = &reading.geo {
            device.reported_lat = Some(geo.lat);
            device.reported_lon = Some(geo.lon);
            device.reported_geo_source = Some(geo.source);
            device.reported_accuracy_m = geo.accuracy_m;
        }
        device.updated_at = now;

        let telemetry = Telemetry {
            id: Uuid::new_v4(),
            device_id: reading.device_id,
            ts: reading.ts,
            metrics: reading.metrics.clone(),
            geo: reading.geo.clone(),
            created_at: now,
        };
        let telemetry_id = telemetry.id;
        state.telemetry.push(telemetry);

        let twin = state
            .twins
            .entry(reading.device_id)
            .or_insert_with(|| DeviceTwin {
                device_id: reading.device_id,
                last_ts: None,
                derived_state: Default::default(),
                updated_at: now,
            });
        apply_reading_to_twin(twin, &reading, now);

        if let (Some(site_id), Some(geo)) = (site_id, reading.geo.as_ref()) {
            if let Some(site) = state.sites.get_mut(&site_id) {
                let previous = site.lat.zip(site.lon);
                if !site.location_lock && site.lat.is_none() {
                    site.lat = Some(geo.lat);
                    site.lon = Some(geo.lon);
                    site.location_source = Some(geo.source);
                    site.location_accuracy_m = geo.accuracy_m;
                    site.location_updated_at = Some(now);
                    site.updated_at = now;
                    audits.push(PendingAudit {
                        tenant_id: Some(tenant_id),
                        action: AUDIT_SITE_LOCATION_SET_FROM_DEVICE,
                        entity_type: "site",
                        entity_id: site_id.to_string(),
                        metadata: json!({
                            "deviceId": reading.device_id,
                            "lat": geo.lat,
                            "lon": geo.lon,
                            "source": geo.source,
                            "accuracyM": geo.accuracy_m,
                        }),
                    });
                }
                if let Some((site_lat, site_lon)) = previous {
                    let distance_km = haversine_km(site_lat, site_lon, geo.lat, geo.lon);
                    if distance_km > GEO_JUMP_THRESHOLD_KM {
                        audits.push(PendingAudit {
                            tenant_id: Some(tenant_id),
                            action: AUDIT_DEVICE_GEO_LARGE_JUMP,
                            entity_type: "device",
                            entity_id: reading.device_id.to_string(),
                            metadata: json!({
                                "siteId": site_id,
                                "previous": { "lat": site_lat, "lon": site_lon },
                                "reported": { "lat": geo.lat, "lon": geo.lon },
                                "distanceKm": distance_km,
                            }),
                        });
                    }
                }
            }
        }

        persist_state(&self.file_path, &state).await?;
        Ok(IngestOutcome {
            telemetry_id,
            warnings,
            audits,
        })
    }

    pub async fn get_twin(&self, tenant_id: Option<Uuid>, device_id: Uuid) -> Result<DeviceTwin> {
        let state = self.state.read().await;
        let device = state
            .devices
            .get(&device_id)
            .filter(|device| tenant_id.is_none_or(|t| device.tenant_id == t))
            .ok_or_else(|| Error::NotFound(format!("Device {} not found", device_id)))?;
        state
            .twins
            .get(&device.id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("No twin for device {}", device_id)))
    }

    /// Most recent readings first, optionally bounded to a time window.
    pub async fn recent_telemetry(
        &self,
        device_id: Uuid,
        limit: usize,
        since: Option<DateTime<Utc>>,
    ) -> Vec<Telemetry> {
        let state = self.state.read().await;
        let mut rows: Vec<Telemetry> = state
            .telemetry
            .iter()
            .filter(|row| row.device_id == device_id)
            .filter(|row| since.is_none_or(|cutoff| row.ts >= cutoff))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.ts.cmp(&a.ts).then(b.created_at.cmp(&a.created_at)));
        rows.truncate(limit);
        rows
    }

    /// Readings in `[start, end)` ordered by ts ascending.
    pub async fn telemetry_between(
        &self,
        device_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<Telemetry> {
        let state = self.state.read().await;
        let mut rows: Vec<Telemetry> = state
            .telemetry
            .iter()
            .filter(|row| row.device_id == device_id && row.ts >= start && row.ts < end)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.ts.cmp(&b.ts).then(a.created_at.cmp(&b.created_at)));
        rows
    }

    // --- map + dashboard ---

    /// Devices with an effective position inside the bounding box. The
    /// device-reported position wins over the site position.
    pub async fn devices_in_bbox(
        &self,
        tenant_id: Uuid,
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
    ) -> Vec<DeviceMarker> {
        let state = self.state.read().await;
        state
            .devices
            .values()
            .filter(|device| device.tenant_id == tenant_id)
            .filter_map(|device| {
                let (lat, lon) = effective_position(device, &state.sites)?;
                if lat >= min_lat && lat <= max_lat && lon >= min_lon && lon <= max_lon {
                    Some(DeviceMarker {
                        device_id: device.id,
                        serial_number: device.serial_number.clone(),
                        name: device.name.clone(),
                        status: device.status,
                        lat,
                        lon,
                    })
                } else {
                    None
                }
            })
            .collect()
    }

    pub async fn device_counts(&self, tenant_id: Uuid, online_within: Duration) -> DeviceCounts {
        let state = self.state.read().await;
        let cutoff = Utc::now() - online_within;
        let mut counts = DeviceCounts::default();
        for device in state.devices.values() {
            if device.tenant_id != tenant_id {
                continue;
            }
            counts.total += 1;
            match device.status {
                DeviceStatus::Provisioned => counts.provisioned += 1,
                DeviceStatus::Installed => counts.installed += 1,
                DeviceStatus::Active => counts.active += 1,
                DeviceStatus::Suspended => counts.suspended += 1,
                DeviceStatus::Retired => counts.retired += 1,
            }
            if device.last_seen_at.is_some_and(|seen| seen >= cutoff) {
                counts.online += 1;
            }
        }
        counts
    }
}

fn effective_position(device: &Device, sites: &HashMap<Uuid, Site>) -> Option<(f64, f64)> {
    if let (Some(lat), Some(lon)) = (device.reported_lat, device.reported_lon) {
        return Some((lat, lon));
    }
    let site = device.site_id.and_then(|id| sites.get(&id))?;
    site.lat.zip(site.lon)
}

fn apply_reading_to_twin(twin: &mut DeviceTwin, reading: &IngestReading, now: DateTime<Utc>) {
    for (key, value) in &reading.metrics {
        twin.derived_state.insert(
            format!("last_{}", key),
            serde_json::to_value(value).unwrap_or(Value::Null),
        );
    }

    copy_number(twin, &reading.metrics, "tankTempC", "lastTankTempC");
    copy_number(twin, &reading.metrics, "ambientTempC", "lastAmbientTempC");
    copy_number(twin, &reading.metrics, "powerW", "lastPowerW");
    copy_number(twin, &reading.metrics, "rssiDbm", "lastRssi");
    if let Some(on) = reading.metrics.get("heaterOn").and_then(MetricValue::as_bool) {
        twin.derived_state.insert("heaterOn".to_string(), json!(on));
    }

    twin.derived_state.insert("isOnline".to_string(), json!(true));
    twin.derived_state
        .insert("healthScore".to_string(), json!(health_score(&reading.metrics)));

    if let Some(geo) = &reading.geo {
        twin.derived_state.insert("lastGeoLat".to_string(), json!(geo.lat));
        twin.derived_state.insert("lastGeoLon".to_string(), json!(geo.lon));
        twin.derived_state
            .insert("lastGeoSource".to_string(), serde_json::to_value(geo.source).unwrap_or(Value::Null));
    }

    twin.last_ts = Some(reading.ts);
    twin.updated_at = now;
}

fn copy_number(
    twin: &mut DeviceTwin,
    metrics: &std::collections::BTreeMap<String, MetricValue>,
    metric: &str,
    field: &str,
) {
    if let Some(value) = metrics.get(metric).and_then(MetricValue::as_f64) {
        twin.derived_state.insert(field.to_string(), json!(value));
    }
}

fn health_score(metrics: &std::collections::BTreeMap<String, MetricValue>) -> i64 {
    let mut score: i64 = 100;
    if metrics.get("rssiDbm").and_then(MetricValue::as_f64).is_some_and(|v| v < -100.0) {
        score -= 20;
    }
    if metrics.get("batteryPct").and_then(MetricValue::as_f64).is_some_and(|v| v < 20.0) {
        score -= 30;
    }
    if metrics.get("tankTempC").and_then(MetricValue::as_f64).is_some_and(|v| v > 85.0) {
        score -= 20;
    }
    score.max(0)
}

async fn load_state(path: &Path) -> Result<FleetState> {
    if !path.exists() {
        return Ok(FleetState::default());
    }
    let content = tokio::fs::read_to_string(path).await?;
    if content.trim().is_empty() {
        return Ok(FleetState::default());
    }
    let stored: StoredFleetState = serde_json::from_str(&content)?;
    Ok(stored.into())
}

async fn persist_state(path: &Path, state: &FleetState) -> Result<()> {
    let content = serde_json::to_string_pretty(&StoredFleetState::from(state))?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await?;
    Ok(())
}
