//! Test doubles and common utilities for contract tests
//!
//! The doubles script the hardware seams (radio and datagram channel) and
//! record what the observational collaborators were told.

#![allow(dead_code)]

use async_trait::async_trait;
use nodelink_core::config::{AddressingMode, NodeConfig};
use nodelink_core::error::Result;
use nodelink_core::traits::{
    DebugRelay, DiscoveryChannel, Indicator, MAX_DATAGRAM_LEN, PortalOutcome, ScannedNetwork,
    WifiRadio,
};
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Address the scripted radio hands out on association
pub const NODE_ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 50);

/// The static tuple used throughout the reconnect contracts
pub fn static_mode() -> AddressingMode {
    AddressingMode::Static {
        address: Ipv4Addr::new(10, 0, 0, 5),
        gateway: Ipv4Addr::new(10, 0, 0, 1),
        netmask: Ipv4Addr::new(255, 255, 255, 0),
    }
}

/// Default configuration with a fallback network name
pub fn test_config() -> NodeConfig {
    NodeConfig::new().with_fallback_ssid("net")
}

/// Discovery payload announcing `id`
pub fn announcement(id: &str) -> Vec<u8> {
    format!(r#"{{"de":"{}"}}"#, id).into_bytes()
}

pub fn ip(s: &str) -> IpAddr {
    s.parse().expect("valid test address")
}

struct RadioScript {
    join_results: VecDeque<bool>,
    default_join: bool,
    portal_outcome: PortalOutcome,
    portal_hangs: bool,
    associated: bool,
    current_ssid: Option<String>,
    ssid_override: Option<String>,
    scans: VecDeque<Result<Vec<ScannedNetwork>>>,
}

/// A WifiRadio whose answers are scripted by the test
pub struct ScriptedRadio {
    script: Mutex<RadioScript>,
    configured: Mutex<Vec<AddressingMode>>,
    join_calls: AtomicUsize,
    portal_calls: AtomicUsize,
    scan_calls: AtomicUsize,
    erase_calls: AtomicUsize,
}

impl ScriptedRadio {
    /// A radio whose saved credentials always work
    pub fn new() -> Self {
        Self {
            script: Mutex::new(RadioScript {
                join_results: VecDeque::new(),
                default_join: true,
                portal_outcome: PortalOutcome::failed(),
                portal_hangs: false,
                associated: false,
                current_ssid: None,
                ssid_override: None,
                scans: VecDeque::new(),
            }),
            configured: Mutex::new(Vec::new()),
            join_calls: AtomicUsize::new(0),
            portal_calls: AtomicUsize::new(0),
            scan_calls: AtomicUsize::new(0),
            erase_calls: AtomicUsize::new(0),
        }
    }

    /// Saved credentials never work; the portal decides
    pub fn refusing_saved_credentials() -> Self {
        let radio = Self::new();
        radio.script.lock().unwrap().default_join = false;
        radio
    }

    /// Queue the result of the next `join_saved` call
    pub fn queue_join(&self, joined: bool) {
        self.script.lock().unwrap().join_results.push_back(joined);
    }

    /// Set what the portal reports when it closes
    pub fn set_portal_outcome(&self, outcome: PortalOutcome) {
        self.script.lock().unwrap().portal_outcome = outcome;
    }

    /// Make the portal wait forever
    pub fn hang_portal(&self) {
        self.script.lock().unwrap().portal_hangs = true;
    }

    /// Queue the result of the next scan
    pub fn queue_scan(&self, networks: Vec<ScannedNetwork>) {
        self.script.lock().unwrap().scans.push_back(Ok(networks));
    }

    /// Queue a failing scan
    pub fn queue_scan_error(&self) {
        self.script
            .lock()
            .unwrap()
            .scans
            .push_back(Err(nodelink_core::Error::radio("scan aborted")));
    }

    /// Report a different live network name than the one joined
    pub fn override_current_ssid(&self, ssid: &str) {
        self.script.lock().unwrap().ssid_override = Some(ssid.to_string());
    }

    /// Simulate the access point going away
    pub fn drop_link(&self) {
        let mut script = self.script.lock().unwrap();
        script.associated = false;
    }

    pub fn configured_modes(&self) -> Vec<AddressingMode> {
        self.configured.lock().unwrap().clone()
    }

    pub fn join_calls(&self) -> usize {
        self.join_calls.load(Ordering::SeqCst)
    }

    pub fn portal_calls(&self) -> usize {
        self.portal_calls.load(Ordering::SeqCst)
    }

    pub fn scan_calls(&self) -> usize {
        self.scan_calls.load(Ordering::SeqCst)
    }

    pub fn erase_calls(&self) -> usize {
        self.erase_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WifiRadio for ScriptedRadio {
    async fn configure(&self, mode: &AddressingMode) -> Result<()> {
        self.configured.lock().unwrap().push(*mode);
        Ok(())
    }

    async fn join_saved(&self, ssid: &str) -> Result<bool> {
        self.join_calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        let joined = match script.join_results.pop_front() {
            Some(joined) => joined,
            None => script.default_join,
        };
        if joined {
            script.associated = true;
            script.current_ssid = Some(ssid.to_string());
        }
        Ok(joined)
    }

    async fn run_portal(&self, ssid: &str, _timeout: Duration) -> Result<PortalOutcome> {
        self.portal_calls.fetch_add(1, Ordering::SeqCst);
        let (hangs, outcome) = {
            let mut script = self.script.lock().unwrap();
            if script.portal_outcome.associated {
                script.associated = true;
                script.current_ssid = Some(ssid.to_string());
            }
            (script.portal_hangs, script.portal_outcome)
        };
        if hangs {
            std::future::pending::<()>().await;
        }
        Ok(outcome)
    }

    async fn is_associated(&self) -> bool {
        self.script.lock().unwrap().associated
    }

    async fn local_ip(&self) -> Option<Ipv4Addr> {
        self.script
            .lock()
            .unwrap()
            .associated
            .then_some(NODE_ADDRESS)
    }

    async fn current_ssid(&self) -> Option<String> {
        let script = self.script.lock().unwrap();
        if !script.associated {
            return None;
        }
        script
            .ssid_override
            .clone()
            .or_else(|| script.current_ssid.clone())
    }

    async fn scan(&self) -> Result<Vec<ScannedNetwork>> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .scans
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn erase_credentials(&self) -> Result<()> {
        self.erase_calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        script.default_join = false;
        script.join_results.clear();
        Ok(())
    }
}

#[derive(Default)]
struct ChannelState {
    queue: VecDeque<(IpAddr, Vec<u8>)>,
    pending: Option<(IpAddr, Vec<u8>)>,
    cursor: usize,
    bound_port: Option<u16>,
    bind_calls: usize,
    close_calls: usize,
    flush_calls: usize,
}

/// A DiscoveryChannel fed by the test
///
/// Clones share the same queue, so the test keeps one handle while the
/// listener owns another.
#[derive(Clone, Default)]
pub struct ScriptedChannel {
    state: Arc<Mutex<ChannelState>>,
    arrivals: Arc<Notify>,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a datagram from `sender`
    pub fn send(&self, sender: IpAddr, payload: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .queue
            .push_back((sender, payload.to_vec()));
        self.arrivals.notify_one();
    }

    /// Bytes of the pending packet that were never read or flushed
    pub fn residual(&self) -> usize {
        let state = self.state.lock().unwrap();
        state
            .pending
            .as_ref()
            .map(|(_, bytes)| bytes.len().min(MAX_DATAGRAM_LEN) - state.cursor)
            .unwrap_or(0)
    }

    pub fn bound_port(&self) -> Option<u16> {
        self.state.lock().unwrap().bound_port
    }

    pub fn bind_calls(&self) -> usize {
        self.state.lock().unwrap().bind_calls
    }

    pub fn close_calls(&self) -> usize {
        self.state.lock().unwrap().close_calls
    }

    pub fn flush_calls(&self) -> usize {
        self.state.lock().unwrap().flush_calls
    }

    pub fn queued(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    /// Pop the next queued datagram if there is one
    fn take_next(&self) -> Option<usize> {
        let mut state = self.state.lock().unwrap();
        let (sender, bytes) = state.queue.pop_front()?;
        let len = bytes.len().min(MAX_DATAGRAM_LEN);
        state.pending = Some((sender, bytes));
        state.cursor = 0;
        Some(len)
    }
}

#[async_trait]
impl DiscoveryChannel for ScriptedChannel {
    async fn bind(&mut self, port: u16) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.bind_calls += 1;
        state.bound_port = Some(port);
        Ok(())
    }

    async fn close(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.close_calls += 1;
        state.bound_port = None;
    }

    async fn next_packet(&mut self) -> Result<usize> {
        loop {
            if let Some(len) = self.take_next() {
                return Ok(len);
            }
            self.arrivals.notified().await;
        }
    }

    fn remote_ip(&self) -> Option<IpAddr> {
        self.state
            .lock()
            .unwrap()
            .pending
            .as_ref()
            .map(|(sender, _)| *sender)
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut state = self.state.lock().unwrap();
        let cursor = state.cursor;
        let Some((_, bytes)) = state.pending.as_ref() else {
            return 0;
        };
        let available = &bytes[cursor.min(bytes.len())..bytes.len().min(MAX_DATAGRAM_LEN)];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        state.cursor += n;
        n
    }

    fn flush(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.flush_calls += 1;
        state.pending = None;
        state.cursor = 0;
    }
}

/// A DebugRelay that keeps every report
#[derive(Default)]
pub struct RecordingRelay {
    reports: Mutex<Vec<(String, String)>>,
}

impl RecordingRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages reported on behalf of `sender`
    pub fn messages_from(&self, sender: &str) -> Vec<String> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == sender)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

#[async_trait]
impl DebugRelay for RecordingRelay {
    async fn report(&self, message: &str, sender_id: &str) {
        self.reports
            .lock()
            .unwrap()
            .push((sender_id.to_string(), message.to_string()));
    }
}

/// An Indicator that counts start and stop calls
#[derive(Default)]
pub struct CountingIndicator {
    starts: AtomicUsize,
    stops: AtomicUsize,
    intensities: Mutex<Vec<f32>>,
}

impl CountingIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn intensities(&self) -> Vec<f32> {
        self.intensities.lock().unwrap().clone()
    }

    /// Every start was followed by a stop
    pub fn is_balanced(&self) -> bool {
        self.starts() == self.stops()
    }
}

impl Indicator for CountingIndicator {
    fn start(&self, intensity: f32) {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.intensities.lock().unwrap().push(intensity);
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}
