//! Home-scoped endpoints.
//!
//! Read endpoints that change slowly (home info, devices, users, weather, the zone
//! listing, ...) are memoized in the home's own [`TtlCache`]; state and command
//! endpoints always go to the network.

use log::{debug, info};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::cache::TtlCache;
use crate::client::{Session, decode};
use crate::error::{Result, TadoError};
use crate::models::tado::{HomeId, HomePresence, Object, OverlayRequest, TemperatureUnit, Termination, ZoneId, ZoneInfo};
use crate::utils::{lookup, serde_enum_name};
use crate::zone::Zone;

pub struct Home {
    session: Session,
    id: HomeId,
    temperature_unit: TemperatureUnit,
    cache: TtlCache<Object>,
    zone_caches: Mutex<BTreeMap<ZoneId, Arc<TtlCache<Object>>>>,
}

impl core::fmt::Debug for Home {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Home")
            .field("id", &self.id)
            .field("temperature_unit", &self.temperature_unit)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl Home {
    pub fn new(session: Session) -> Self {
        let config = session.config();
        Home {
            id: session.home_id(),
            temperature_unit: config.temperature_unit,
            cache: TtlCache::new(config.cache),
            zone_caches: Mutex::new(BTreeMap::new()),
            session,
        }
    }

    pub fn id(&self) -> HomeId {
        self.id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn temperature_unit(&self) -> TemperatureUnit {
        self.temperature_unit
    }

    fn path(&self, suffix: &str) -> String {
        format!("homes/{}{}", self.id, suffix)
    }

    fn zone_path(&self, zone: ZoneId, suffix: &str) -> String {
        format!("homes/{}/zones/{}{}", self.id, zone, suffix)
    }

    fn cached(&self, key: &str, path: &str) -> Result<Object> {
        self.cache.get_or_try_insert_with(key, || self.session.get(path))
    }

    /// Drop every memoized read of this home and its zones.
    pub fn invalidate_cache(&self) {
        self.cache.clear();
        for cache in self.zone_caches.lock().unwrap_or_else(PoisonError::into_inner).values() {
            cache.clear();
        }
    }

    // =====================
    // Cached reads
    // =====================

    /// Address, contact details, time zone and settings of the home.
    pub fn home(&self) -> Result<Object> {
        self.cached("home", &self.path(""))
    }

    pub fn devices(&self) -> Result<Object> {
        self.cached("devices", &self.path("/devices"))
    }

    /// Passed through untouched; the vendor returns an array of opaque objects.
    pub fn installations(&self) -> Result<Object> {
        self.cached("installations", &self.path("/installations"))
    }

    pub fn invitations(&self) -> Result<Object> {
        self.cached("invitations", &self.path("/invitations"))
    }

    /// Profile of the logged-in user.
    pub fn me(&self) -> Result<Object> {
        self.cached("me", "me")
    }

    pub fn mobile_devices(&self) -> Result<Object> {
        self.cached("mobile_devices", &self.path("/mobileDevices"))
    }

    pub fn users(&self) -> Result<Object> {
        self.cached("users", &self.path("/users"))
    }

    pub fn weather(&self) -> Result<Object> {
        self.cached("weather", &self.path("/weather"))
    }

    /// Zones of the home keyed by ID. The listing is cached; each zone keeps its
    /// own cache across calls.
    pub fn zones(&self) -> Result<BTreeMap<ZoneId, Zone<'_>>> {
        let raw = self.cached("zones", &self.path("/zones"))?;
        let listing: Vec<ZoneInfo> = decode(raw)?;
        debug!("Home {} has {} zone(s)", self.id, listing.len());
        Ok(listing
            .into_iter()
            .map(|info| {
                let cache = self.zone_cache(info.id);
                (info.id, Zone::new(self, info, cache))
            })
            .collect())
    }

    pub fn zone(&self, id: ZoneId) -> Result<Zone<'_>> {
        self.zones()?
            .remove(&id)
            .ok_or_else(|| TadoError::MissingField(format!("zone {} in home {}", id, self.id)))
    }

    fn zone_cache(&self, id: ZoneId) -> Arc<TtlCache<Object>> {
        let policy = self.cache.policy();
        self.zone_caches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_insert_with(|| Arc::new(TtlCache::new(policy)))
            .clone()
    }

    // =====================
    // Pass-through reads
    // =====================

    pub fn presence(&self) -> Result<Object> {
        self.session.get(&self.path("/presence"))
    }

    pub fn home_state(&self) -> Result<Object> {
        self.session.get(&self.path("/state"))
    }

    /// Temperature ranges and type of a zone.
    pub fn get_capabilities(&self, zone: ZoneId) -> Result<Object> {
        self.session.get(&self.zone_path(zone, "/capabilities"))
    }

    /// Whether early start is enabled for a zone.
    pub fn get_early_start(&self, zone: ZoneId) -> Result<bool> {
        let response = self.session.get(&self.zone_path(zone, "/earlyStart"))?;
        lookup(&response, &["enabled"])?
            .as_bool()
            .ok_or_else(|| TadoError::MissingField("enabled (not a boolean)".into()))
    }

    /// ID and type (`ONE_DAY`, `THREE_DAY`, `SEVEN_DAY`) of the active timetable.
    pub fn get_schedule(&self, zone: ZoneId) -> Result<Object> {
        self.session.get(&self.zone_path(zone, "/schedule/activeTimetable"))
    }

    /// Setting, overlay and sensor readings of a zone.
    pub fn get_state(&self, zone: ZoneId) -> Result<Object> {
        self.session.get(&self.zone_path(zone, "/state"))
    }

    // =====================
    // Commands
    // =====================

    pub fn set_early_start(&self, zone: ZoneId, enabled: bool) -> Result<Object> {
        info!("Zone {}: early start {}", zone, if enabled { "on" } else { "off" });
        self.session
            .put(&self.zone_path(zone, "/earlyStart"), &json!({ "enabled": enabled }))
    }

    /// Put a manual heating overlay on a zone.
    ///
    /// A target below 5 degrees switches the zone off instead. The overlay lasts
    /// until cancelled, until the next schedule change, or for a number of seconds,
    /// depending on `termination`. NaN and infinities are rejected before any request.
    pub fn set_temperature(&self, zone: ZoneId, temperature: f64, termination: Termination) -> Result<Object> {
        if !temperature.is_finite() {
            return Err(TadoError::Config(format!("temperature must be a finite number, got {}", temperature)));
        }
        let overlay = OverlayRequest::heating(temperature, termination);
        info!(
            "Zone {}: overlay power={} temperature={} termination={}",
            zone,
            serde_enum_name(&overlay.setting.power).unwrap_or_default(),
            temperature,
            serde_enum_name(&overlay.termination.r#type).unwrap_or_default()
        );
        let body = serde_json::to_value(&overlay)?;
        self.session.put(&self.zone_path(zone, "/overlay"), &body)
    }

    /// Remove the overlay so the zone follows its schedule again.
    pub fn end_manual_control(&self, zone: ZoneId) -> Result<Object> {
        info!("Zone {}: ending manual control", zone);
        self.session.delete(&self.zone_path(zone, "/overlay"))
    }

    pub fn set_presence(&self, presence: HomePresence) -> Result<Object> {
        info!("Home {}: presence -> {:?}", self.id, presence);
        self.session
            .put(&self.path("/presence"), &json!({ "homePresence": presence }))
    }
}

