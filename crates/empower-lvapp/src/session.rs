//! Per-connection LVAPP session.
//!
//! ```text
//!  Disconnected ──HELLO_REQ (known device)──▶ Connected ──CAPS_RES──▶ Online
//!       ▲                                          │                    │
//!       └──────────── transport / framing error, heartbeat expiry ──────┘
//! ```
//!
//! A [`Session`] does no I/O itself: inbound frames are handed to
//! [`Session::handle_frame`] by the owner of the socket reader, and outbound
//! bytes go through an unbounded channel to the socket writer, so frames
//! leave in the order they were emitted.

use std::collections::HashMap;
use std::time::Duration;

use empower_core::{Address, BlockRef, RadioBlock, Ssid, TxPolicy};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::codec::{
    encode, AssocResponse, CapsResponse, DelLvap, Frame, Hello, Lvap, LvapFlags, LvapResult,
    Message, MessageType, Network, ProbeResponse, RcStatsRequest, Slice, TxPolicyFrame, Vap,
};
use crate::error::{RegistryError, SessionError};
use crate::registry::{ApRegistry, ConnId};

/// Hello period assumed until the AP announces its own.
pub const DEFAULT_HELLO_PERIOD: Duration = Duration::from_millis(2000);

/// A session is closed after this many hello periods without traffic.
pub const HELLO_TIMEOUT_FACTOR: u32 = 3;

/// How often the controller checks session liveness.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(500);

/// Reply channel of a [`Session::request`].
pub type PendingReply = oneshot::Receiver<Result<Frame, SessionError>>;

/// Connection state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Disconnected,
    Connected,
    Online,
}

/// Knobs shared by every session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Hello period in milliseconds, used until the AP announces its own.
    pub hello_period_ms: u64,
    /// SSID served on every block; `None` leaves VAPs and slices alone.
    pub default_ssid: Option<Ssid>,
    /// Airtime quantum of the default slice.
    pub slice_quantum: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            hello_period_ms: DEFAULT_HELLO_PERIOD.as_millis() as u64,
            default_ssid: None,
            slice_quantum: 12_000,
        }
    }
}

impl SessionConfig {
    pub fn hello_period(&self) -> Duration {
        Duration::from_millis(self.hello_period_ms)
    }
}

/// An outstanding request and the reply type that resolves it.
#[derive(Debug)]
struct Pending {
    reply_type: MessageType,
    reply: oneshot::Sender<Result<Frame, SessionError>>,
}

/// Protocol state of one AP connection.
#[derive(Debug)]
pub struct Session {
    conn: ConnId,
    device: Option<Address>,
    state: SessionState,
    config: SessionConfig,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    seq: u32,
    xid: u32,
    pending: HashMap<u32, Pending>,
    hello_period: Duration,
    last_seen: Instant,
    next_assoc_id: u16,
}

impl Session {
    /// A freshly accepted connection, `Disconnected` until its first hello.
    pub fn new(conn: ConnId, config: SessionConfig, outbound: mpsc::UnboundedSender<Vec<u8>>, now: Instant) -> Self {
        let hello_period = config.hello_period();
        Self {
            conn,
            device: None,
            state: SessionState::Disconnected,
            config,
            outbound,
            seq: 0,
            xid: 0,
            pending: HashMap::new(),
            hello_period,
            last_seen: now,
            next_assoc_id: 0,
        }
    }

    pub fn conn(&self) -> ConnId {
        self.conn
    }

    /// AP address, known after the first hello.
    pub fn device(&self) -> Option<Address> {
        self.device
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_online(&self) -> bool {
        self.state == SessionState::Online
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    // -- Outbound ----------------------------------------------------------

    /// Encode and queue `message` with a fresh seq and xid. Returns the xid.
    pub fn send(&mut self, message: Message) -> Result<u32, SessionError> {
        self.seq = self.seq.wrapping_add(1);
        self.xid = self.xid.wrapping_add(1);
        let device = self.device.unwrap_or(Address::ZERO);
        let bytes = encode(self.seq, self.xid, device, &message)?;
        debug!(conn = %self.conn, msg = %message.msg_type(), xid = self.xid, len = bytes.len(), "tx");
        self.outbound.send(bytes).map_err(|_| SessionError::Closed)?;
        Ok(self.xid)
    }

    /// Send `message` and get a receiver resolved by the first inbound reply
    /// of the matching type carrying the same xid.
    pub fn request(&mut self, message: Message) -> Result<PendingReply, SessionError> {
        let msg_type = message.msg_type();
        let reply_type = msg_type
            .reply_type()
            .ok_or_else(|| SessionError::protocol(format!("{msg_type} has no reply")))?;
        let xid = self.send(message)?;
        let (reply, rx) = oneshot::channel();
        self.pending.insert(xid, Pending { reply_type, reply });
        Ok(rx)
    }

    /// Push a tx policy for one of this AP's blocks.
    pub fn send_tx_policy(&mut self, block_id: u8, policy: TxPolicy) -> Result<u32, SessionError> {
        self.send(Message::SetTxPolicy(TxPolicyFrame {
            iface_id: u32::from(block_id),
            policy,
        }))
    }

    /// Ask the AP for a station's rate-control table.
    pub fn request_rc_stats(&mut self, sta: Address) -> Result<PendingReply, SessionError> {
        self.request(Message::WifiRcStatsRequest(RcStatsRequest { sta }))
    }

    /// Fire-and-forget variant of [`request_rc_stats`](Self::request_rc_stats);
    /// the reply only updates the registry.
    pub fn poll_rc_stats(&mut self, sta: Address) -> Result<u32, SessionError> {
        self.send(Message::WifiRcStatsRequest(RcStatsRequest { sta }))
    }

    /// Tear a station's LVAP down and forget the station.
    pub fn remove_station(&mut self, sta: Address, registry: &mut ApRegistry) -> Result<u32, SessionError> {
        let xid = self.send(Message::DelLvapRequest(DelLvap {
            sta,
            csa_switch_mode: 0,
            csa_switch_count: 0,
            csa_switch_channel: 0,
        }))?;
        registry.disassociate(sta);
        Ok(xid)
    }

    // -- Inbound -----------------------------------------------------------

    /// Process one inbound frame.
    ///
    /// Errors with [`SessionError::is_fatal`] require the caller to tear the
    /// session down; the rest are reported and the frame dropped.
    pub fn handle_frame(&mut self, frame: Frame, registry: &mut ApRegistry, now: Instant) -> Result<(), SessionError> {
        self.last_seen = now;

        self.resolve(&frame);

        match self.state {
            SessionState::Disconnected => match frame.message {
                Message::HelloRequest(hello) => self.on_first_hello(hello, frame.header.device, registry),
                other => {
                    debug!(conn = %self.conn, msg = %other.msg_type(), "dropped before hello");
                    Ok(())
                }
            },
            SessionState::Connected => {
                let device = self.check_device(&frame)?;
                touch(registry, device, frame.header.seq);
                match frame.message {
                    Message::HelloRequest(hello) => {
                        self.refresh(hello);
                        Ok(())
                    }
                    Message::CapsResponse(caps) => self.on_caps(device, caps, registry),
                    other => {
                        debug!(ap = %device, msg = %other.msg_type(), "dropped before caps");
                        Ok(())
                    }
                }
            }
            SessionState::Online => {
                let device = self.check_device(&frame)?;
                touch(registry, device, frame.header.seq);
                self.dispatch(device, frame.message, registry)
            }
        }
    }

    /// Hand `frame` to the request waiting on its xid, if it is the reply
    /// that request expects. Other frames reusing the xid leave it pending.
    fn resolve(&mut self, frame: &Frame) {
        let xid = frame.header.xid;
        let expected = self.pending.get(&xid).map(|p| p.reply_type);
        if expected != Some(frame.msg_type()) {
            return;
        }
        if let Some(pending) = self.pending.remove(&xid) {
            if pending.reply.send(Ok(frame.clone())).is_err() {
                debug!(conn = %self.conn, xid, "requester went away");
            }
        }
    }

    fn check_device(&self, frame: &Frame) -> Result<Address, SessionError> {
        let device = self.device.unwrap_or(Address::ZERO);
        if frame.header.device != device {
            return Err(SessionError::protocol(format!(
                "{} from {} on a session of {}",
                frame.msg_type(),
                frame.header.device,
                device
            )));
        }
        Ok(device)
    }

    fn refresh(&mut self, hello: Hello) {
        if hello.period > 0 {
            self.hello_period = Duration::from_millis(u64::from(hello.period));
        }
    }

    fn on_first_hello(&mut self, hello: Hello, device: Address, registry: &mut ApRegistry) -> Result<(), SessionError> {
        if !registry.contains(device) {
            return Err(SessionError::UnknownDevice(device));
        }
        registry.attach(device, self.conn)?;
        self.device = Some(device);
        self.state = SessionState::Connected;
        self.refresh(hello);
        info!(ap = %device, conn = %self.conn, period_ms = hello.period, "AP connected");

        self.send(Message::HelloResponse(hello))?;
        self.send(Message::CapsRequest)?;
        Ok(())
    }

    fn on_caps(&mut self, device: Address, caps: CapsResponse, registry: &mut ApRegistry) -> Result<(), SessionError> {
        let blocks = caps
            .blocks
            .iter()
            .map(|b| RadioBlock::new(b.block_id, b.hwaddr, b.channel, b.band))
            .collect::<Result<Vec<_>, _>>()
            .map_err(RegistryError::from)?;

        registry.set_blocks(device, blocks.iter().cloned())?;
        registry.set_online(device, true)?;
        self.state = SessionState::Online;
        info!(ap = %device, blocks = blocks.len(), "AP online");

        self.send(Message::LvapStatusRequest)?;
        self.send(Message::VapStatusRequest)?;
        self.send(Message::SliceStatusRequest)?;
        self.send(Message::TxPolicyStatusRequest)?;

        if let Some(ssid) = self.config.default_ssid.clone() {
            for block in &blocks {
                let iface_id = u32::from(block.block_id);
                self.send(Message::SetSlice(Slice {
                    iface_id,
                    amsdu_aggregation: false,
                    ssid: ssid.clone(),
                    slice_id: 0,
                    quantum: self.config.slice_quantum,
                    sta_scheduler: 0,
                    stas: Vec::new(),
                }))?;
                self.send(Message::AddVap(Vap {
                    iface_id,
                    bssid: block.hwaddr.to_local(),
                    ssid: ssid.clone(),
                }))?;
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, device: Address, message: Message, registry: &mut ApRegistry) -> Result<(), SessionError> {
        match message {
            Message::HelloRequest(hello) => self.refresh(hello),

            Message::ProbeRequest(probe) => {
                let Some(ssid) = self.config.default_ssid.clone() else {
                    return Ok(());
                };
                if probe.ssid.is_wildcard() || probe.ssid == ssid {
                    self.send(Message::ProbeResponse(ProbeResponse {
                        iface_id: probe.iface_id,
                        sta: probe.sta,
                        ssid,
                    }))?;
                }
            }

            Message::AuthRequest(auth) => {
                self.send(Message::AuthResponse(auth))?;
            }

            Message::AssocRequest(req) => {
                let block = block_ref(device, req.iface_id)?;
                registry.associate(block, req.sta, req.ht_caps, req.ssid.clone())?;
                self.next_assoc_id = self.next_assoc_id.wrapping_add(1);
                info!(ap = %device, sta = %req.sta, block = block.block_id, "station associated");

                self.send(Message::AddLvapRequest(Lvap {
                    iface_id: req.iface_id,
                    flags: LvapFlags {
                        authenticated: true,
                        associated: true,
                        set_mask: false,
                        ht_caps: req.ht_caps,
                    },
                    assoc_id: self.next_assoc_id,
                    ht_caps_info: req.ht_caps_info,
                    sta: req.sta,
                    encap: Address::ZERO,
                    bssid: req.bssid,
                    ssid: req.ssid.clone(),
                    networks: vec![Network {
                        bssid: req.bssid,
                        ssid: req.ssid,
                    }],
                }))?;
                self.send(Message::AssocResponse(AssocResponse {
                    iface_id: req.iface_id,
                    sta: req.sta,
                }))?;
            }

            Message::AddLvapResponse(result) | Message::DelLvapResponse(result) => {
                check_status(&result)?;
            }

            Message::LvapStatusResponse(lvap) => {
                if lvap.flags.associated {
                    let block = block_ref(device, lvap.iface_id)?;
                    registry.associate(block, lvap.sta, lvap.flags.ht_caps, lvap.ssid)?;
                } else {
                    registry.disassociate(lvap.sta);
                }
            }

            Message::VapStatusResponse(vap) => registry.record_vap(device, vap)?,
            Message::SliceStatusResponse(slice) => registry.record_slice(device, slice)?,

            Message::TxPolicyStatusResponse(status) => {
                let block = block_ref(device, status.iface_id)?;
                registry.set_reported_policy(block, status.policy)?;
            }

            Message::WifiRcStatsResponse(stats) => {
                let table = registry.update_rates(
                    stats.sta,
                    stats.entries.iter().map(|e| (e.mcs, e.to_rate_entry())),
                )?;
                debug!(
                    sta = %stats.sta,
                    rates = table.len(),
                    best_ewma = table.best_ewma(),
                    "rate table updated"
                );
            }

            other => {
                return Err(SessionError::protocol(format!(
                    "unexpected {} from {}",
                    other.msg_type(),
                    device
                )));
            }
        }
        Ok(())
    }

    // -- Liveness and teardown ---------------------------------------------

    /// Time allowed without inbound traffic.
    pub fn timeout(&self) -> Duration {
        self.hello_period * HELLO_TIMEOUT_FACTOR
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen) > self.timeout()
    }

    /// `HeartbeatTimeout` once the session is expired.
    pub fn check_heartbeat(&self, now: Instant) -> Result<(), SessionError> {
        if self.is_expired(now) {
            return Err(SessionError::HeartbeatTimeout {
                elapsed_ms: now.saturating_duration_since(self.last_seen).as_millis(),
            });
        }
        Ok(())
    }

    /// Return to `Disconnected`: cancel pending requests and release the AP.
    pub fn teardown(&mut self, registry: &mut ApRegistry) {
        let cancelled = self.pending.len();
        for (_, pending) in self.pending.drain() {
            let _ = pending.reply.send(Err(SessionError::Cancelled));
        }
        if let Some(device) = self.device {
            if registry.detach(device, self.conn) {
                info!(ap = %device, conn = %self.conn, cancelled, "AP disconnected");
            }
        }
        self.state = SessionState::Disconnected;
    }
}

fn block_ref(device: Address, iface_id: u32) -> Result<BlockRef, SessionError> {
    let block_id = u8::try_from(iface_id).map_err(|_| {
        SessionError::protocol(format!("interface id {iface_id} out of range on {device}"))
    })?;
    Ok(BlockRef::new(device, block_id))
}

fn touch(registry: &mut ApRegistry, device: Address, seq: u32) {
    match registry.touch(device, seq) {
        Ok(0) => {}
        Ok(missed) => debug!(ap = %device, seq, missed, "sequence gap"),
        Err(e) => debug!(ap = %device, error = %e, "frame from unregistered AP"),
    }
}

/// The caller logs the returned error.
fn check_status(result: &LvapResult) -> Result<(), SessionError> {
    if result.is_success() {
        Ok(())
    } else {
        Err(SessionError::protocol(format!(
            "LVAP status {} for {}",
            result.status, result.sta
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{
        decode, AssocRequest, BlockCaps, ProbeRequest, RcStatsEntry, RcStatsResponse,
    };
    use empower_core::Band;

    fn ap() -> Address {
        Address::parse("00:0D:B9:2F:56:64").unwrap()
    }

    fn sta(n: u8) -> Address {
        Address([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, n])
    }

    struct Harness {
        session: Session,
        registry: ApRegistry,
        rx: mpsc::UnboundedReceiver<Vec<u8>>,
        now: Instant,
        seq: u32,
    }

    impl Harness {
        fn new(config: SessionConfig) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let now = Instant::now();
            let mut registry = ApRegistry::default();
            registry.upsert(ap(), "test");
            Self {
                session: Session::new(ConnId(1), config, tx, now),
                registry,
                rx,
                now,
                seq: 0,
            }
        }

        fn inject(&mut self, message: Message) -> Result<(), SessionError> {
            self.inject_xid(message, 0)
        }

        fn inject_xid(&mut self, message: Message, xid: u32) -> Result<(), SessionError> {
            self.seq += 1;
            let frame = decode(&encode(self.seq, xid, ap(), &message).unwrap()).unwrap();
            self.session.handle_frame(frame, &mut self.registry, self.now)
        }

        fn drain(&mut self) -> Vec<Frame> {
            let mut out = Vec::new();
            while let Ok(bytes) = self.rx.try_recv() {
                out.push(decode(&bytes).unwrap());
            }
            out
        }

        fn bring_online(&mut self) {
            self.inject(Message::HelloRequest(Hello { period: 2000 })).unwrap();
            self.inject(Message::CapsResponse(CapsResponse {
                blocks: vec![BlockCaps {
                    block_id: 0,
                    hwaddr: Address::parse("04:F0:21:09:F9:9E").unwrap(),
                    channel: 36,
                    band: Band::HT20,
                }],
            }))
            .unwrap();
            self.drain();
        }
    }

    fn types(frames: &[Frame]) -> Vec<MessageType> {
        frames.iter().map(Frame::msg_type).collect()
    }

    #[test]
    fn test_hello_then_caps_brings_session_online() {
        let mut h = Harness::new(SessionConfig::default());
        h.inject(Message::HelloRequest(Hello { period: 2000 })).unwrap();
        assert_eq!(h.session.state(), SessionState::Connected);
        let out = h.drain();
        assert_eq!(types(&out), vec![MessageType::HelloResponse, MessageType::CapsRequest]);
        assert_eq!(out[0].message, Message::HelloResponse(Hello { period: 2000 }));

        h.inject(Message::CapsResponse(CapsResponse {
            blocks: vec![BlockCaps {
                block_id: 0,
                hwaddr: Address::parse("04:F0:21:09:F9:9E").unwrap(),
                channel: 36,
                band: Band::HT20,
            }],
        }))
        .unwrap();
        assert_eq!(h.session.state(), SessionState::Online);
        assert!(h.registry.is_online(ap()));
        assert_eq!(
            types(&h.drain()),
            vec![
                MessageType::LvapStatusRequest,
                MessageType::VapStatusRequest,
                MessageType::SliceStatusRequest,
                MessageType::TxPolicyStatusRequest,
            ]
        );
    }

    #[test]
    fn test_disconnected_ignores_everything_but_hello() {
        let mut h = Harness::new(SessionConfig::default());
        h.inject(Message::CapsResponse(CapsResponse::default())).unwrap();
        h.inject(Message::AuthRequest(crate::codec::Auth {
            iface_id: 0,
            sta: sta(1),
            bssid: ap(),
        }))
        .unwrap();
        assert_eq!(h.session.state(), SessionState::Disconnected);
        assert!(h.drain().is_empty());
    }

    #[test]
    fn test_unknown_device_is_fatal() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = Session::new(ConnId(7), SessionConfig::default(), tx, Instant::now());
        let mut registry = ApRegistry::default();
        let frame = decode(&encode(1, 1, ap(), &Message::HelloRequest(Hello { period: 2000 })).unwrap()).unwrap();
        let err = session.handle_frame(frame, &mut registry, Instant::now()).unwrap_err();
        assert!(matches!(err, SessionError::UnknownDevice(_)));
        assert!(err.is_fatal());
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_connected_drops_other_frames() {
        let mut h = Harness::new(SessionConfig::default());
        h.inject(Message::HelloRequest(Hello { period: 2000 })).unwrap();
        h.drain();
        h.inject(Message::LvapStatusRequest).unwrap();
        assert_eq!(h.session.state(), SessionState::Connected);
        assert!(h.drain().is_empty());
    }

    #[test]
    fn test_default_ssid_installs_slice_and_vap() {
        let config = SessionConfig {
            default_ssid: Some(Ssid::new("EmPOWER").unwrap()),
            ..SessionConfig::default()
        };
        let mut h = Harness::new(config);
        h.inject(Message::HelloRequest(Hello { period: 2000 })).unwrap();
        h.inject(Message::CapsResponse(CapsResponse {
            blocks: vec![BlockCaps {
                block_id: 0,
                hwaddr: Address::parse("04:F0:21:09:F9:9E").unwrap(),
                channel: 36,
                band: Band::HT20,
            }],
        }))
        .unwrap();
        let out = h.drain();
        let tail: Vec<MessageType> = types(&out).into_iter().skip(6).collect();
        assert_eq!(tail, vec![MessageType::SetSlice, MessageType::AddVap]);
        match &out[7].message {
            Message::AddVap(vap) => assert!(vap.bssid.is_local()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_assoc_creates_station_and_lvap() {
        let mut h = Harness::new(SessionConfig::default());
        h.bring_online();
        h.inject(Message::AssocRequest(AssocRequest {
            iface_id: 0,
            sta: sta(1),
            bssid: Address::parse("06:F0:21:09:F9:9E").unwrap(),
            ht_caps: true,
            ht_caps_info: 0x1ec,
            ssid: Ssid::new("EmPOWER").unwrap(),
        }))
        .unwrap();

        let station = h.registry.station(sta(1)).unwrap();
        assert_eq!(station.block, BlockRef::new(ap(), 0));
        assert!(station.ht_caps);

        let out = h.drain();
        assert_eq!(types(&out), vec![MessageType::AddLvapRequest, MessageType::AssocResponse]);
        match &out[0].message {
            Message::AddLvapRequest(lvap) => {
                assert!(lvap.flags.associated && lvap.flags.authenticated && lvap.flags.ht_caps);
                assert_eq!(lvap.assoc_id, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_probe_answered_only_for_served_ssid() {
        let config = SessionConfig {
            default_ssid: Some(Ssid::new("EmPOWER").unwrap()),
            ..SessionConfig::default()
        };
        let mut h = Harness::new(config);
        h.bring_online();

        let probe = |ssid: &str| {
            Message::ProbeRequest(ProbeRequest {
                iface_id: 0,
                sta: sta(1),
                ht_caps: false,
                ht_caps_info: 0,
                ssid: Ssid::new(ssid).unwrap(),
            })
        };
        h.inject(probe("other")).unwrap();
        assert!(h.drain().is_empty());
        h.inject(probe("")).unwrap();
        h.inject(probe("EmPOWER")).unwrap();
        assert_eq!(
            types(&h.drain()),
            vec![MessageType::ProbeResponse, MessageType::ProbeResponse]
        );
    }

    #[test]
    fn test_rc_stats_feed_rate_table() {
        let mut h = Harness::new(SessionConfig::default());
        h.bring_online();
        h.registry
            .associate(BlockRef::new(ap(), 0), sta(1), true, Ssid::wildcard())
            .unwrap();

        let entry = |mcs, prob| RcStatsEntry {
            mcs,
            ewma_prob: prob,
            cur_prob: prob,
            cur_tp: 10,
            last_attempts: 1,
            last_successes: 1,
            hist_attempts: 1,
            hist_successes: 1,
        };
        h.inject(Message::WifiRcStatsResponse(RcStatsResponse {
            sta: sta(1),
            entries: vec![entry(4, 180), entry(5, 170), entry(6, 90)],
        }))
        .unwrap();

        let rates = &h.registry.station(sta(1)).unwrap().rates;
        assert_eq!(rates.valid_ewma().iter().copied().collect::<Vec<_>>(), vec![4, 5]);
        assert_eq!(rates.best_ewma(), 4);
    }

    #[test]
    fn test_rc_stats_for_unknown_station_is_not_found() {
        let mut h = Harness::new(SessionConfig::default());
        h.bring_online();
        let err = h
            .inject(Message::WifiRcStatsResponse(RcStatsResponse {
                sta: sta(9),
                entries: vec![],
            }))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_failed_lvap_status_is_protocol_error() {
        let mut h = Harness::new(SessionConfig::default());
        h.bring_online();
        let err = h
            .inject(Message::AddLvapResponse(LvapResult {
                iface_id: 0,
                sta: sta(1),
                status: 1,
            }))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Protocol);
        assert_eq!(h.session.state(), SessionState::Online);
    }

    #[test]
    fn test_request_resolves_once_by_xid() {
        let mut h = Harness::new(SessionConfig::default());
        h.bring_online();
        h.registry
            .associate(BlockRef::new(ap(), 0), sta(1), true, Ssid::wildcard())
            .unwrap();

        let mut reply = h.session.request_rc_stats(sta(1)).unwrap();
        let xid = h.drain()[0].header.xid;
        assert_eq!(h.session.pending_requests(), 1);

        let response = Message::WifiRcStatsResponse(RcStatsResponse {
            sta: sta(1),
            entries: vec![],
        });
        h.inject_xid(response.clone(), xid).unwrap();
        let frame = reply.try_recv().unwrap().unwrap();
        assert_eq!(frame.message, response);
        assert_eq!(h.session.pending_requests(), 0);
    }

    #[test]
    fn test_unrelated_frame_with_pending_xid_leaves_request_open() {
        let mut h = Harness::new(SessionConfig::default());
        h.bring_online();
        h.registry
            .associate(BlockRef::new(ap(), 0), sta(1), true, Ssid::wildcard())
            .unwrap();

        let mut reply = h.session.request_rc_stats(sta(1)).unwrap();
        let xid = h.drain()[0].header.xid;

        h.inject_xid(
            Message::ProbeRequest(ProbeRequest {
                iface_id: 0,
                sta: sta(2),
                ht_caps: false,
                ht_caps_info: 0,
                ssid: Ssid::wildcard(),
            }),
            xid,
        )
        .unwrap();
        assert_eq!(h.session.pending_requests(), 1);
        assert!(matches!(reply.try_recv(), Err(oneshot::error::TryRecvError::Empty)));

        let response = Message::WifiRcStatsResponse(RcStatsResponse {
            sta: sta(1),
            entries: vec![],
        });
        h.inject_xid(response.clone(), xid).unwrap();
        assert_eq!(reply.try_recv().unwrap().unwrap().message, response);
        assert_eq!(h.session.pending_requests(), 0);
    }

    #[test]
    fn test_request_needs_a_reply_type() {
        let mut h = Harness::new(SessionConfig::default());
        h.bring_online();
        let err = h
            .session
            .request(Message::HelloResponse(Hello { period: 2000 }))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Protocol);
        assert!(h.drain().is_empty());
        assert_eq!(h.session.pending_requests(), 0);
    }

    #[test]
    fn test_caps_with_bad_channel_closes_session() {
        let mut h = Harness::new(SessionConfig::default());
        h.inject(Message::HelloRequest(Hello { period: 2000 })).unwrap();
        let caps = Message::CapsResponse(CapsResponse {
            blocks: vec![BlockCaps {
                block_id: 0,
                hwaddr: Address::parse("04:F0:21:09:F9:9E").unwrap(),
                channel: 0,
                band: Band::HT20,
            }],
        });
        let err: SessionError = decode(&encode(2, 0, ap(), &caps).unwrap()).unwrap_err().into();
        assert_eq!(err.kind(), crate::error::ErrorKind::Framing);
        assert!(err.is_fatal());
        assert_eq!(h.session.state(), SessionState::Connected);
        assert!(!h.registry.is_online(ap()));
    }

    #[test]
    fn test_frames_from_removed_ap_are_still_handled() {
        let mut h = Harness::new(SessionConfig::default());
        h.bring_online();
        h.registry.remove(ap());
        h.inject(Message::HelloRequest(Hello { period: 1000 })).unwrap();
        assert_eq!(h.session.timeout(), Duration::from_millis(3000));
    }

    #[test]
    fn test_teardown_cancels_pending_and_detaches() {
        let mut h = Harness::new(SessionConfig::default());
        h.bring_online();
        let mut reply = h.session.request(Message::VapStatusRequest).unwrap();

        h.session.teardown(&mut h.registry);
        assert_eq!(h.session.state(), SessionState::Disconnected);
        assert!(matches!(reply.try_recv().unwrap(), Err(SessionError::Cancelled)));
        assert!(!h.registry.is_online(ap()));
        assert!(h.registry.blocks_of(ap()).is_empty());
    }

    #[test]
    fn test_heartbeat_expiry() {
        let mut h = Harness::new(SessionConfig::default());
        h.inject(Message::HelloRequest(Hello { period: 1000 })).unwrap();
        let start = h.now;
        assert!(!h.session.is_expired(start + Duration::from_millis(3000)));
        assert!(h.session.is_expired(start + Duration::from_millis(3001)));
        let err = h
            .session
            .check_heartbeat(start + Duration::from_millis(3500))
            .unwrap_err();
        assert!(matches!(err, SessionError::HeartbeatTimeout { elapsed_ms: 3500 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_follows_runtime_clock() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut registry = ApRegistry::default();
        registry.upsert(ap(), "test");
        let mut session = Session::new(ConnId(3), SessionConfig::default(), tx, Instant::now());

        let hello = decode(&encode(1, 0, ap(), &Message::HelloRequest(Hello { period: 500 })).unwrap()).unwrap();
        session.handle_frame(hello, &mut registry, Instant::now()).unwrap();

        tokio::time::advance(Duration::from_millis(1400)).await;
        assert!(session.check_heartbeat(Instant::now()).is_ok());

        let refresh = decode(&encode(2, 0, ap(), &Message::HelloRequest(Hello { period: 500 })).unwrap()).unwrap();
        session.handle_frame(refresh, &mut registry, Instant::now()).unwrap();
        tokio::time::advance(Duration::from_millis(1400)).await;
        assert!(session.check_heartbeat(Instant::now()).is_ok());

        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(matches!(
            session.check_heartbeat(Instant::now()),
            Err(SessionError::HeartbeatTimeout { elapsed_ms: 1600 })
        ));
    }

    #[test]
    fn test_outbound_seq_and_xid_increase() {
        let mut h = Harness::new(SessionConfig::default());
        h.bring_online();
        h.session.send(Message::LvapStatusRequest).unwrap();
        h.session.send(Message::LvapStatusRequest).unwrap();
        let out = h.drain();
        assert!(out[1].header.xid > out[0].header.xid);
        assert!(out[1].header.seq > out[0].header.seq);
        assert_eq!(out[0].header.device, ap());
    }
}
