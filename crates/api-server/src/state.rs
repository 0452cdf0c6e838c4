//! Application state

use std::path::PathBuf;
use std::sync::Arc;

use hf_core::alert::AlertStore;
use hf_core::command::CommandStore;
use hf_core::entitlement::EntitlementStore;
use hf_core::fleet::FleetStore;
use hf_core::integrations::{
    GeocodingProvider, SimProvider, StubGeocodingProvider, StubSimProvider, StubWeatherProvider,
    WeatherProvider,
};
use hf_core::notify::{ChannelAdapter, NotifyStore, StubChannelAdapter};
use hf_core::ota::OtaStore;
use hf_core::rollup::RollupStore;
use hf_core::weather::WeatherStore;

use crate::audit::AuditStore;
use crate::auth::IdentityStore;
use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    identity: IdentityStore,
    fleet: FleetStore,
    commands: CommandStore,
    alerts: AlertStore,
    notify: NotifyStore,
    ota: OtaStore,
    entitlements: EntitlementStore,
    rollups: RollupStore,
    weather: WeatherStore,
    audit: AuditStore,
    weather_provider: Arc<dyn WeatherProvider>,
    geocoding_provider: Arc<dyn GeocodingProvider>,
    sim_provider: Arc<dyn SimProvider>,
    channel_adapter: Arc<dyn ChannelAdapter>,
}

impl AppState {
    /// Create the state with every store rooted under the data directory
    /// and the stub integration adapters.
    pub async fn new(config: Config) -> Result<Self, String> {
        let data_dir = PathBuf::from(&config.data_dir);

        let identity = IdentityStore::new(&data_dir)
            .await
            .map_err(|err| format!("Failed to open identity store: {}", err))?;
        let fleet = open(FleetStore::new(&data_dir).await, "fleet")?;
        let commands = open(CommandStore::new(&data_dir).await, "command")?;
        let alerts = open(AlertStore::new(&data_dir).await, "alert")?;
        let notify = open(NotifyStore::new(&data_dir).await, "notification")?;
        let ota = open(OtaStore::new(&data_dir).await, "ota")?;
        let entitlements = open(EntitlementStore::new(&data_dir).await, "entitlement")?;
        let rollups = open(RollupStore::new(&data_dir).await, "rollup")?;
        let weather = open(WeatherStore::new(&data_dir).await, "weather")?;
        let audit = AuditStore::new(data_dir)
            .await
            .map_err(|err| format!("Failed to open audit store: {}", err))?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                identity,
                fleet,
                commands,
                alerts,
                notify,
                ota,
                entitlements,
                rollups,
                weather,
                audit,
                weather_provider: Arc::new(StubWeatherProvider),
                geocoding_provider: Arc::new(StubGeocodingProvider),
                sim_provider: Arc::new(StubSimProvider),
                channel_adapter: Arc::new(StubChannelAdapter),
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn identity_store(&self) -> &IdentityStore {
        &self.inner.identity
    }

    pub fn fleet_store(&self) -> &FleetStore {
        &self.inner.fleet
    }

    pub fn command_store(&self) -> &CommandStore {
        &self.inner.commands
    }

    pub fn alert_store(&self) -> &AlertStore {
        &self.inner.alerts
    }

    pub fn notify_store(&self) -> &NotifyStore {
        &self.inner.notify
    }

    pub fn ota_store(&self) -> &OtaStore {
        &self.inner.ota
    }

    pub fn entitlement_store(&self) -> &EntitlementStore {
        &self.inner.entitlements
    }

    pub fn rollup_store(&self) -> &RollupStore {
        &self.inner.rollups
    }

    pub fn weather_store(&self) -> &WeatherStore {
        &self.inner.weather
    }

    pub fn audit_store(&self) -> &AuditStore {
        &self.inner.audit
    }

    pub fn weather_provider(&self) -> &Arc<dyn WeatherProvider> {
        &self.inner.weather_provider
    }

    pub fn geocoding_provider(&self) -> &Arc<dyn GeocodingProvider> {
        &self.inner.geocoding_provider
    }

    pub fn sim_provider(&self) -> &Arc<dyn SimProvider> {
        &self.inner.sim_provider
    }

    pub fn channel_adapter(&self) -> &Arc<dyn ChannelAdapter> {
        &self.inner.channel_adapter
    }
}

fn open<T>(result: hf_core::Result<T>, name: &str) -> Result<T, String> {
    result.map_err(|err| format!("Failed to open {} store: {}", name, err))
}
