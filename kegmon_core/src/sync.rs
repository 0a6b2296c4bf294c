//! Narrow HTTP+JSON channel to the inventory service.
//!
//! Every request goes through `with_retries`: up to `max_retries` attempts,
//! no delay between them, any 2xx ends the loop. Exhaustion is reported as a
//! plain `false`/unresolved value and logged; nothing is queued for later.

use kegmon_traits::{BoxError, HttpResponse, Transport};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SyncCfg;

pub const PING_PATH: &str = "/api/v1/ping";
pub const DEVICES_PATH: &str = "/api/v1/devices";

/// Backend-assigned identity. Held in memory for the boot session only.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceIdentity {
    pub id: String,
    pub device_type: String,
    pub empty_keg_weight_grams: Option<f32>,
    pub resolved: bool,
}

impl DeviceIdentity {
    pub fn unresolved() -> Self {
        Self::default()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }
}

/// Outcome of looking the device up by chip id.
#[derive(Debug, Clone, PartialEq)]
pub enum FindOutcome {
    Found(DeviceIdentity),
    NotFound,
    /// Request or decoding failed. Callers must not register on this: the
    /// device may exist and a second record would be created.
    Failed,
}

/// Status payload in domain terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusReport {
    pub latest_measurement: f32,
    pub latest_measurement_ts: i64,
    pub state: i32,
    pub empty_keg_weight_grams: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterBody<'a> {
    chip_id: &'a str,
    chip_type: &'a str,
    device_type: &'a str,
    chip_model: &'a str,
}

#[derive(Serialize)]
struct MeasurementBody {
    m: f32,
    ts: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody {
    latest_measurement: f32,
    #[serde(rename = "latestMeasurementTS")]
    latest_measurement_ts: i64,
    state: i32,
    empty_keg_weight_grams: f32,
}

impl From<&StatusReport> for StatusBody {
    fn from(r: &StatusReport) -> Self {
        Self {
            latest_measurement: r.latest_measurement,
            latest_measurement_ts: r.latest_measurement_ts,
            state: r.state,
            empty_keg_weight_grams: r.empty_keg_weight_grams,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceRecord {
    id: String,
    #[serde(default)]
    device_type: Option<String>,
    #[serde(default)]
    empty_keg_weight_grams: Option<f32>,
}

impl From<DeviceRecord> for DeviceIdentity {
    fn from(r: DeviceRecord) -> Self {
        Self {
            id: r.id,
            device_type: r.device_type.unwrap_or_default(),
            empty_keg_weight_grams: r.empty_keg_weight_grams,
            resolved: true,
        }
    }
}

pub struct DeviceSyncClient {
    transport: Box<dyn Transport + Send>,
    cfg: SyncCfg,
    reachable: bool,
}

impl DeviceSyncClient {
    pub fn new(transport: Box<dyn Transport + Send>, cfg: SyncCfg) -> Self {
        let reachable = !cfg.enabled;
        Self {
            transport,
            cfg,
            reachable,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.cfg.enabled
    }

    /// Whether the most recent request sequence reached the service.
    pub fn reachable(&self) -> bool {
        self.reachable
    }

    fn with_retries<F>(&mut self, op: &str, mut attempt: F) -> Option<HttpResponse>
    where
        F: FnMut(&mut dyn Transport) -> Result<HttpResponse, BoxError>,
    {
        let budget = self.cfg.max_retries.max(1);
        for n in 1..=budget {
            match attempt(self.transport.as_mut()) {
                Ok(resp) if resp.is_success() => {
                    debug!(op, attempt = n, status = resp.status, "request ok");
                    self.reachable = true;
                    return Some(resp);
                }
                Ok(resp) => {
                    warn!(op, attempt = n, status = resp.status, "request rejected")
                }
                Err(e) => warn!(op, attempt = n, error = %e, "request failed"),
            }
        }
        warn!(op, attempts = budget, "giving up");
        self.reachable = false;
        None
    }

    /// Liveness probe.
    pub fn ping(&mut self) -> bool {
        if !self.cfg.enabled {
            return true;
        }
        self.with_retries("ping", |t| t.get(PING_PATH)).is_some()
    }

    pub fn find(&mut self) -> FindOutcome {
        if !self.cfg.enabled {
            return FindOutcome::NotFound;
        }
        let path = format!(
            "{DEVICES_PATH}/find?chip_type={}&chip_id={}",
            encode_component(&self.cfg.chip_type),
            encode_component(&self.cfg.chip_id)
        );
        let Some(resp) = self.with_retries("find", |t| t.get(&path)) else {
            return FindOutcome::Failed;
        };
        match serde_json::from_str::<Vec<DeviceRecord>>(&resp.body) {
            Ok(records) => match records.into_iter().next() {
                Some(r) => FindOutcome::Found(r.into()),
                None => FindOutcome::NotFound,
            },
            Err(e) => {
                warn!(error = %e, "undecodable find response");
                FindOutcome::Failed
            }
        }
    }

    pub fn register(&mut self) -> Option<DeviceIdentity> {
        if !self.cfg.enabled {
            return None;
        }
        let body = RegisterBody {
            chip_id: &self.cfg.chip_id,
            chip_type: &self.cfg.chip_type,
            device_type: &self.cfg.device_type,
            chip_model: &self.cfg.chip_model,
        };
        let body = encode_body("register", &body)?;
        let resp = self.with_retries("register", |t| t.post(DEVICES_PATH, &body))?;
        match serde_json::from_str::<DeviceRecord>(&resp.body) {
            Ok(r) => Some(r.into()),
            Err(e) => {
                warn!(error = %e, "undecodable register response");
                None
            }
        }
    }

    /// ping → find → register. Any failure yields an unresolved identity;
    /// the caller retries on its next opportunity.
    pub fn resolve_identity(&mut self) -> DeviceIdentity {
        if !self.cfg.enabled {
            return DeviceIdentity::unresolved();
        }
        if !self.ping() {
            warn!("service unreachable; identity unresolved");
            return DeviceIdentity::unresolved();
        }
        let identity = match self.find() {
            FindOutcome::Found(identity) => identity,
            FindOutcome::NotFound => {
                info!(chip_id = %self.cfg.chip_id, "device unknown to service; registering");
                self.register().unwrap_or_default()
            }
            FindOutcome::Failed => DeviceIdentity::unresolved(),
        };
        if identity.is_resolved() {
            info!(id = %identity.id, "device identity resolved");
        }
        identity
    }

    pub fn push_measurement(&mut self, id: &str, value: f32, timestamp: i64) -> bool {
        if !self.cfg.enabled {
            return true;
        }
        let path = format!("{DEVICES_PATH}/{}/measurements", encode_component(id));
        let Some(body) = encode_body("measurement", &MeasurementBody { m: value, ts: timestamp })
        else {
            return false;
        };
        self.with_retries("measurement", |t| t.post(&path, &body))
            .is_some()
    }

    pub fn push_status(&mut self, id: &str, report: &StatusReport) -> bool {
        if !self.cfg.enabled {
            return true;
        }
        let path = format!("{DEVICES_PATH}/{}/status", encode_component(id));
        let Some(body) = encode_body("status", &StatusBody::from(report)) else {
            return false;
        };
        self.with_retries("status", |t| t.post(&path, &body)).is_some()
    }
}

fn encode_body<T: Serialize>(op: &str, body: &T) -> Option<String> {
    serde_json::to_string(body)
        .map_err(|e| warn!(op, error = %e, "request body encoding failed"))
        .ok()
}

/// Everything outside the RFC 3986 unreserved set.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn encode_component(s: &str) -> String {
    utf8_percent_encode(s, COMPONENT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::ScriptedTransport;

    fn client(transport: &ScriptedTransport) -> DeviceSyncClient {
        let cfg = SyncCfg {
            chip_id: "e00f ce68".into(),
            ..SyncCfg::default()
        };
        DeviceSyncClient::new(Box::new(transport.clone()), cfg)
    }

    #[test]
    fn component_encoding_escapes_reserved() {
        assert_eq!(encode_component("a b&c=d"), "a%20b%26c%3Dd");
        assert_eq!(encode_component("Particle-1.0_~"), "Particle-1.0_~");
        assert_eq!(encode_component("küh/1"), "k%C3%BCh%2F1");
    }

    #[test]
    fn status_body_uses_wire_names() {
        let body = serde_json::to_value(StatusBody::from(&StatusReport {
            latest_measurement: 12.5,
            latest_measurement_ts: 1_700_000_000,
            state: 1,
            empty_keg_weight_grams: 4_500.0,
        }))
        .expect("encode");
        assert_eq!(body["latestMeasurementTS"], 1_700_000_000);
        assert_eq!(body["latestMeasurement"], 12.5);
        assert_eq!(body["emptyKegWeightGrams"], 4_500.0);
        assert_eq!(body["state"], 1);
    }

    #[test]
    fn find_takes_first_record() {
        let t = ScriptedTransport::new();
        t.on_get(
            "/api/v1/devices/find",
            200,
            r#"[{"id":"abc","deviceType":"weight","emptyKegWeightGrams":4400.0},{"id":"zzz"}]"#,
        );
        let mut c = client(&t);
        let FindOutcome::Found(id) = c.find() else {
            panic!("expected a record");
        };
        assert_eq!(id.id, "abc");
        assert_eq!(id.empty_keg_weight_grams, Some(4400.0));
        assert!(t.requests()[0].path.contains("chip_id=e00f%20ce68"));
    }

    #[test]
    fn find_failure_does_not_register() {
        let t = ScriptedTransport::new();
        t.on_get(PING_PATH, 200, "{}");
        t.on_get("/api/v1/devices/find", 200, "not json");
        let mut c = client(&t);
        let id = c.resolve_identity();
        assert!(!id.is_resolved());
        assert_eq!(t.count("POST", DEVICES_PATH), 0);
    }

    #[test]
    fn unknown_device_is_registered() {
        let t = ScriptedTransport::new();
        t.on_get(PING_PATH, 200, "{}");
        t.on_get("/api/v1/devices/find", 200, "[]");
        t.on_post(DEVICES_PATH, 201, r#"{"id":"new-1","deviceType":"weight"}"#);
        let mut c = client(&t);
        let id = c.resolve_identity();
        assert!(id.is_resolved());
        assert_eq!(id.id, "new-1");
        let reg = &t.requests()[2];
        let body: serde_json::Value = serde_json::from_str(&reg.body).expect("json");
        assert_eq!(body["chipId"], "e00f ce68");
        assert_eq!(body["chipType"], "Particle");
        assert_eq!(body["deviceType"], "weight");
        assert_eq!(body["chipModel"], "rpi");
    }

    #[test]
    fn non_2xx_exhausts_budget() {
        let t = ScriptedTransport::new();
        t.on_post("/api/v1/devices/x/measurements", 500, "");
        let mut c = client(&t);
        assert!(!c.push_measurement("x", 1.0, 2));
        assert_eq!(t.count("POST", "/api/v1/devices/x/measurements"), 3);
        assert!(!c.reachable());
    }

    #[test]
    fn disabled_service_never_touches_transport() {
        let t = ScriptedTransport::new();
        let cfg = SyncCfg {
            enabled: false,
            ..SyncCfg::default()
        };
        let mut c = DeviceSyncClient::new(Box::new(t.clone()), cfg);
        assert!(c.ping());
        assert!(c.push_measurement("x", 1.0, 2));
        assert!(!c.resolve_identity().is_resolved());
        assert!(c.reachable());
        assert!(t.requests().is_empty());
    }
}
