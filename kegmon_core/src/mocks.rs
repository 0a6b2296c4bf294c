//! Scriptable collaborators for tests and simulations.
//!
//! Every mock is a cheap `Clone` handle over shared state: hand one clone to
//! the builder and keep another to script behavior and inspect calls.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};
use kegmon_traits::{BoxError, Button, ByteStore, HttpResponse, Indicator, LoadCell, Signal, Transport};

use crate::calibration::{CalibrationData, RECORD_ADDR, RECORD_LEN};

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Load cell ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct CellState {
    raw: f64,
    queued: VecDeque<f64>,
    powered: bool,
    failing: bool,
    power_ups: u32,
    power_downs: u32,
    reads: u32,
}

struct Gate {
    started: Sender<()>,
    release: Receiver<()>,
}

/// Load cell returning a settable raw average.
///
/// Reads while powered down fail, so a missing power-up shows in tests.
#[derive(Clone, Default)]
pub struct ScriptedLoadCell {
    state: Arc<Mutex<CellState>>,
    gate: Arc<Mutex<Option<Gate>>>,
}

impl ScriptedLoadCell {
    pub fn new(raw: f64) -> Self {
        let cell = Self::default();
        cell.set_raw(raw);
        cell
    }

    pub fn set_raw(&self, raw: f64) {
        guard(&self.state).raw = raw;
    }

    /// Values returned by the next reads, in order, before falling back to
    /// the steady raw value.
    pub fn push_reads(&self, values: &[f64]) {
        guard(&self.state).queued.extend(values.iter().copied());
    }

    /// Make reads fail until cleared.
    pub fn set_failing(&self, failing: bool) {
        guard(&self.state).failing = failing;
    }

    pub fn power_ups(&self) -> u32 {
        guard(&self.state).power_ups
    }

    pub fn power_downs(&self) -> u32 {
        guard(&self.state).power_downs
    }

    pub fn reads(&self) -> u32 {
        guard(&self.state).reads
    }

    pub fn is_powered(&self) -> bool {
        guard(&self.state).powered
    }

    /// Block the next read until the returned gate is released.
    pub fn gate_next_read(&self) -> ReadGate {
        let (started_tx, started_rx) = bounded(1);
        let (release_tx, release_rx) = bounded(1);
        *guard(&self.gate) = Some(Gate {
            started: started_tx,
            release: release_rx,
        });
        ReadGate {
            started: started_rx,
            release: release_tx,
        }
    }
}

/// Test-side half of a gated read.
pub struct ReadGate {
    started: Receiver<()>,
    release: Sender<()>,
}

impl ReadGate {
    /// Wait until the gated read is blocked inside the load cell.
    pub fn wait_started(&self, timeout: Duration) -> bool {
        self.started.recv_timeout(timeout).is_ok()
    }

    pub fn release(&self) {
        let _ = self.release.send(());
    }
}

impl LoadCell for ScriptedLoadCell {
    fn power_up(&mut self) -> Result<(), BoxError> {
        let mut s = guard(&self.state);
        s.powered = true;
        s.power_ups += 1;
        Ok(())
    }

    fn power_down(&mut self) -> Result<(), BoxError> {
        let mut s = guard(&self.state);
        s.powered = false;
        s.power_downs += 1;
        Ok(())
    }

    fn read_average(&mut self, _samples: u32) -> Result<f64, BoxError> {
        let gate = guard(&self.gate).take();
        if let Some(gate) = gate {
            let _ = gate.started.send(());
            let _ = gate.release.recv();
        }
        let mut s = guard(&self.state);
        if s.failing {
            return Err("scripted load cell failure".into());
        }
        if !s.powered {
            return Err("load cell is powered down".into());
        }
        s.reads += 1;
        let raw = s.raw;
        Ok(s.queued.pop_front().unwrap_or(raw))
    }
}

// ── Byte store ───────────────────────────────────────────────────────────────

#[derive(Debug)]
struct StoreState {
    bytes: Vec<u8>,
    writes: u32,
    failing: bool,
}

/// In-memory EEPROM image, erased to 0xFF.
#[derive(Clone)]
pub struct MemStore {
    state: Arc<Mutex<StoreState>>,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new(64)
    }
}

impl MemStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState {
                bytes: vec![0xFF; capacity],
                writes: 0,
                failing: false,
            })),
        }
    }

    /// Store preloaded with a calibration record.
    pub fn with_record(data: CalibrationData) -> Self {
        let store = Self::default();
        guard(&store.state).bytes[RECORD_ADDR..RECORD_ADDR + RECORD_LEN]
            .copy_from_slice(&data.to_bytes());
        store
    }

    pub fn record(&self) -> CalibrationData {
        let mut buf = [0u8; RECORD_LEN];
        buf.copy_from_slice(&guard(&self.state).bytes[RECORD_ADDR..RECORD_ADDR + RECORD_LEN]);
        CalibrationData::from_bytes(buf)
    }

    pub fn writes(&self) -> u32 {
        guard(&self.state).writes
    }

    pub fn set_failing(&self, failing: bool) {
        guard(&self.state).failing = failing;
    }
}

impl ByteStore for MemStore {
    fn read(&mut self, addr: usize, buf: &mut [u8]) -> Result<(), BoxError> {
        let s = guard(&self.state);
        let src = addr
            .checked_add(buf.len())
            .and_then(|end| s.bytes.get(addr..end))
            .ok_or("read out of bounds")?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn write(&mut self, addr: usize, bytes: &[u8]) -> Result<(), BoxError> {
        let mut s = guard(&self.state);
        if s.failing {
            return Err("scripted store failure".into());
        }
        let dst = addr
            .checked_add(bytes.len())
            .and_then(|end| s.bytes.get_mut(addr..end))
            .ok_or("write out of bounds")?;
        dst.copy_from_slice(bytes);
        s.writes += 1;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), BoxError> {
        let mut s = guard(&self.state);
        if s.failing {
            return Err("scripted store failure".into());
        }
        s.bytes.fill(0xFF);
        s.writes += 1;
        Ok(())
    }
}

// ── Transport ────────────────────────────────────────────────────────────────

/// A request as seen by `ScriptedTransport`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: &'static str,
    pub path: String,
    pub body: String,
}

#[derive(Debug, Clone)]
enum Reply {
    Status(u16, String),
    Fail,
}

#[derive(Debug)]
struct Route {
    method: &'static str,
    prefix: String,
    once: VecDeque<Reply>,
    sticky: Option<Reply>,
}

#[derive(Debug, Default)]
struct TransportState {
    routes: Vec<Route>,
    requests: Vec<Request>,
}

/// Transport answering from scripted routes.
///
/// A request is matched to the route with the longest path prefix for its
/// method. Queued one-shot replies are used first, then the sticky reply.
/// Unmatched requests fail as if the network were down.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<TransportState>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn route_mut<'a>(s: &'a mut TransportState, method: &'static str, prefix: &str) -> &'a mut Route {
        let idx = match s
            .routes
            .iter()
            .position(|r| r.method == method && r.prefix == prefix)
        {
            Some(i) => i,
            None => {
                s.routes.push(Route {
                    method,
                    prefix: prefix.to_string(),
                    once: VecDeque::new(),
                    sticky: None,
                });
                s.routes.len() - 1
            }
        };
        &mut s.routes[idx]
    }

    fn set(&self, method: &'static str, prefix: &str, reply: Reply, once: bool) {
        let mut s = guard(&self.state);
        let route = Self::route_mut(&mut s, method, prefix);
        if once {
            route.once.push_back(reply);
        } else {
            route.sticky = Some(reply);
        }
    }

    pub fn on_get(&self, prefix: &str, status: u16, body: &str) {
        self.set("GET", prefix, Reply::Status(status, body.to_string()), false);
    }

    pub fn on_post(&self, prefix: &str, status: u16, body: &str) {
        self.set("POST", prefix, Reply::Status(status, body.to_string()), false);
    }

    pub fn once_get(&self, prefix: &str, status: u16, body: &str) {
        self.set("GET", prefix, Reply::Status(status, body.to_string()), true);
    }

    pub fn once_post(&self, prefix: &str, status: u16, body: &str) {
        self.set("POST", prefix, Reply::Status(status, body.to_string()), true);
    }

    /// Make matching requests fail at the transport level.
    pub fn fail(&self, method: &'static str, prefix: &str) {
        self.set(method, prefix, Reply::Fail, false);
    }

    /// Answer the full happy path for a device with `id`.
    pub fn serve_device(&self, id: &str, empty_keg_weight_grams: Option<f32>) {
        let record = match empty_keg_weight_grams {
            Some(w) => format!(r#"{{"id":"{id}","deviceType":"weight","emptyKegWeightGrams":{w}}}"#),
            None => format!(r#"{{"id":"{id}","deviceType":"weight"}}"#),
        };
        self.on_get("/api/v1/ping", 200, "{}");
        self.on_get("/api/v1/devices/find", 200, &format!("[{record}]"));
        self.on_post(&format!("/api/v1/devices/{id}/"), 201, "{}");
    }

    pub fn requests(&self) -> Vec<Request> {
        guard(&self.state).requests.clone()
    }

    /// Requests with `method` whose path starts with `prefix`.
    pub fn count(&self, method: &str, prefix: &str) -> usize {
        guard(&self.state)
            .requests
            .iter()
            .filter(|r| r.method == method && r.path.starts_with(prefix))
            .count()
    }

    fn answer(&self, method: &'static str, path: &str, body: &str) -> Result<HttpResponse, BoxError> {
        let mut s = guard(&self.state);
        s.requests.push(Request {
            method,
            path: path.to_string(),
            body: body.to_string(),
        });
        let reply = s
            .routes
            .iter_mut()
            .filter(|r| r.method == method && path.starts_with(r.prefix.as_str()))
            .max_by_key(|r| r.prefix.len())
            .and_then(|r| r.once.pop_front().or_else(|| r.sticky.clone()));
        match reply {
            Some(Reply::Status(status, body)) => Ok(HttpResponse { status, body }),
            Some(Reply::Fail) | None => Err(format!("{method} {path}: connection refused").into()),
        }
    }
}

impl Transport for ScriptedTransport {
    fn get(&mut self, path: &str) -> Result<HttpResponse, BoxError> {
        self.answer("GET", path, "")
    }

    fn post(&mut self, path: &str, body: &str) -> Result<HttpResponse, BoxError> {
        self.answer("POST", path, body)
    }
}

// ── Indicator and button ─────────────────────────────────────────────────────

/// Indicator that remembers every signal shown.
#[derive(Clone, Default)]
pub struct RecordingIndicator {
    shown: Arc<Mutex<Vec<Signal>>>,
}

impl RecordingIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<Signal> {
        guard(&self.shown).last().copied()
    }

    pub fn history(&self) -> Vec<Signal> {
        guard(&self.shown).clone()
    }

    pub fn clear(&self) {
        guard(&self.shown).clear();
    }
}

impl Indicator for RecordingIndicator {
    fn show(&mut self, signal: Signal) {
        guard(&self.shown).push(signal);
    }
}

#[derive(Clone, Default)]
pub struct ScriptedButton {
    pressed: Arc<AtomicBool>,
}

impl ScriptedButton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pressed(&self, pressed: bool) {
        self.pressed.store(pressed, Ordering::SeqCst);
    }
}

impl Button for ScriptedButton {
    fn is_pressed(&mut self) -> bool {
        self.pressed.load(Ordering::SeqCst)
    }
}
