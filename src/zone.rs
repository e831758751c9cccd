//! Per-zone view over a [`Home`].

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::cache::TtlCache;
use crate::error::{Result, TadoError};
use crate::home::Home;
use crate::models::tado::{Object, Termination, ZoneId, ZoneInfo};
use crate::utils::lookup_f64;

const EARLY_START: &str = "early_start";

/// One zone of a home. Every call delegates to the owning [`Home`] with this zone's ID.
///
/// `schedule`, `early_start`, `state` and `capabilities` are cached per zone, so the
/// derived readings (`inside_temperature`, `humidity`) are as fresh as the cached state.
#[derive(Debug, Clone)]
pub struct Zone<'h> {
    home: &'h Home,
    info: ZoneInfo,
    cache: Arc<TtlCache<Object>>,
}

impl<'h> Zone<'h> {
    pub(crate) fn new(home: &'h Home, info: ZoneInfo, cache: Arc<TtlCache<Object>>) -> Self {
        Zone { home, info, cache }
    }

    pub fn id(&self) -> ZoneId {
        self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn info(&self) -> &ZoneInfo {
        &self.info
    }

    /// Vendor fields of the zone listing not modelled by [`ZoneInfo`].
    pub fn extras(&self) -> &std::collections::BTreeMap<String, Value> {
        &self.info.extras
    }

    pub fn home(&self) -> &'h Home {
        self.home
    }

    pub fn schedule(&self) -> Result<Object> {
        self.cache
            .get_or_try_insert_with("schedule", || self.home.get_schedule(self.id()))
    }

    pub fn early_start(&self) -> Result<bool> {
        let value = self
            .cache
            .get_or_try_insert_with(EARLY_START, || self.home.get_early_start(self.id()).map(Value::Bool))?;
        value
            .as_bool()
            .ok_or_else(|| TadoError::MissingField("enabled (not a boolean)".into()))
    }

    pub fn state(&self) -> Result<Object> {
        self.cache
            .get_or_try_insert_with("state", || self.home.get_state(self.id()))
    }

    pub fn capabilities(&self) -> Result<Object> {
        self.cache
            .get_or_try_insert_with("capabilities", || self.home.get_capabilities(self.id()))
    }

    /// Measured temperature in the home's configured unit.
    pub fn inside_temperature(&self) -> Result<f64> {
        let unit = self.home.temperature_unit().as_key();
        lookup_f64(&self.state()?, &["sensorDataPoints", "insideTemperature", unit])
    }

    /// Measured relative humidity in percent.
    pub fn humidity(&self) -> Result<f64> {
        lookup_f64(&self.state()?, &["sensorDataPoints", "humidity", "percentage"])
    }

    pub fn set_temperature(&self, temperature: f64, termination: Termination) -> Result<Object> {
        self.home.set_temperature(self.id(), temperature, termination)
    }

    pub fn end_manual_control(&self) -> Result<Object> {
        self.home.end_manual_control(self.id())
    }

    pub fn set_early_start(&self, enabled: bool) -> Result<Object> {
        let result = self.home.set_early_start(self.id(), enabled);
        self.cache.invalidate(EARLY_START);
        result
    }

    /// The listing entry as JSON, with `id` and `name` merged back into the vendor fields.
    pub fn to_json(&self) -> Object {
        let mut map: Map<String, Value> = self.info.extras.clone().into_iter().collect();
        map.insert("id".into(), Value::from(self.info.id.0));
        map.insert("name".into(), Value::from(self.info.name.clone()));
        if let Some(created) = self.info.date_created {
            map.insert(
                "dateCreated".into(),
                Value::from(created.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
            );
        }
        Value::Object(map)
    }
}

impl PartialEq for Zone<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.home, other.home) && self.info == other.info
    }
}
