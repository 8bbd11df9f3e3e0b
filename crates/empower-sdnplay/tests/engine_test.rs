//! End-to-end tests of the rate-adaptation loop over a real LVAPP session.
//!
//! An AP is brought online through [`Session::handle_frame`], receivers are
//! associated and fed `WIFI_RC_STATS_RES` frames, and the engine's output is
//! read back as decoded `SET_TX_POLICY` frames from the session's outbound
//! channel. No sockets are involved.

use approx::assert_relative_eq;
use empower_core::{Address, BlockRef, McastMode, MulticastGroup, TxPolicy};
use empower_lvapp::codec::{
    decode, encode, AssocRequest, BlockCaps, CapsResponse, Frame, Hello, Message, MessageType,
    RcStatsEntry, RcStatsResponse, TxPolicyFrame,
};
use empower_lvapp::{ApRegistry, ConnId, Session, SessionConfig, SessionError};
use empower_sdnplay::{DemoMode, Engine, EngineConfig, GroupScheduler, Phase, TxPolicySink};
use tokio::sync::mpsc;
use tokio::time::Instant;

const AP: &str = "00:0D:B9:2F:56:64";
const RECV1: &str = "AA:BB:CC:DD:EE:01";
const RECV2: &str = "AA:BB:CC:DD:EE:02";

fn addr(s: &str) -> Address {
    Address::parse(s).unwrap()
}

/// Sink writing straight into the one session under test.
struct SessionSink<'a> {
    session: &'a mut Session,
}

impl TxPolicySink for SessionSink<'_> {
    fn send_tx_policy(&mut self, block: BlockRef, policy: &TxPolicy) -> Result<(), SessionError> {
        self.session.send_tx_policy(block.block_id, policy.clone()).map(|_| ())
    }

    fn request_rc_stats(&mut self, _ap: Address, sta: Address) -> Result<(), SessionError> {
        self.session.poll_rc_stats(sta).map(|_| ())
    }
}

struct Testbed {
    session: Session,
    registry: ApRegistry,
    outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    engine: Engine,
    seq: u32,
}

impl Testbed {
    /// S1: AP online with one HT20 block on channel 36.
    fn online(config: EngineConfig) -> Self {
        let (tx, outbound) = mpsc::unbounded_channel();
        let mut registry = ApRegistry::new(config.prob_threshold);
        registry.upsert(addr(AP), "ap-1");
        let mut bed = Self {
            session: Session::new(ConnId(1), SessionConfig::default(), tx, Instant::now()),
            registry,
            outbound,
            engine: Engine::new(config).unwrap(),
            seq: 0,
        };
        bed.inject(Message::HelloRequest(Hello { period: 2000 }));
        bed.inject(Message::CapsResponse(CapsResponse {
            blocks: vec![BlockCaps {
                block_id: 0,
                hwaddr: addr("04:F0:21:09:F9:9E"),
                channel: 36,
                band: empower_core::Band::HT20,
            }],
        }));
        bed
    }

    fn inject(&mut self, message: Message) {
        self.seq += 1;
        let frame = decode(&encode(self.seq, 0, addr(AP), &message).unwrap()).unwrap();
        self.session
            .handle_frame(frame, &mut self.registry, Instant::now())
            .unwrap();
    }

    fn associate(&mut self, sta: &str) {
        self.inject(Message::AssocRequest(AssocRequest {
            iface_id: 0,
            sta: addr(sta),
            bssid: addr("06:F0:21:09:F9:9E"),
            ht_caps: true,
            ht_caps_info: 0,
            ssid: empower_core::Ssid::new("EmPOWER").unwrap(),
        }));
    }

    /// Feed a rate table; `probs` are raw values out of 180.
    fn rc_stats(&mut self, sta: &str, probs: &[(u8, u32)]) {
        let entries = probs
            .iter()
            .map(|&(mcs, p)| RcStatsEntry {
                mcs,
                ewma_prob: p,
                cur_prob: p,
                cur_tp: 0,
                last_attempts: 0,
                last_successes: 0,
                hist_attempts: 0,
                hist_successes: 0,
            })
            .collect();
        self.inject(Message::WifiRcStatsResponse(RcStatsResponse {
            sta: addr(sta),
            entries,
        }));
    }

    fn add_group(&mut self) -> MulticastGroup {
        let group = MulticastGroup::new("224.0.1.200".parse().unwrap(), [addr(RECV1), addr(RECV2)]).unwrap();
        self.registry.add_group(group.clone()).unwrap();
        group
    }

    fn drain(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(bytes) = self.outbound.try_recv() {
            frames.push(decode(&bytes).unwrap());
        }
        frames
    }

    /// Tick once and return the SET_TX_POLICY bodies emitted.
    fn tick(&mut self) -> Vec<TxPolicyFrame> {
        self.drain();
        let mut sink = SessionSink {
            session: &mut self.session,
        };
        self.engine.tick(&mut self.registry, &mut sink);
        self.drain()
            .into_iter()
            .filter_map(|f| match f.message {
                Message::SetTxPolicy(p) => Some(p),
                _ => None,
            })
            .collect()
    }
}

fn legacy_only() -> EngineConfig {
    EngineConfig {
        demo_mode: DemoMode::Legacy,
        ..EngineConfig::default()
    }
}

#[test]
fn test_s2_group_creation() {
    let mut bed = Testbed::online(EngineConfig::default());
    let group = bed.add_group();
    assert_eq!(group.addr.to_string(), "01:00:5E:00:01:C8");
    assert_eq!(bed.engine.scheduler().cycle_len(), 10);
    let dms = bed
        .engine
        .scheduler()
        .schedule()
        .iter()
        .filter(|p| **p == Phase::Dms)
        .count();
    assert_eq!(dms, 1);
    assert_relative_eq!(bed.engine.config().prob_threshold, 0.9);
}

#[test]
fn test_s3_dms_phase() {
    let mut bed = Testbed::online(EngineConfig::default());
    let group = bed.add_group();
    bed.engine.register_group(group.addr);
    assert_eq!(bed.engine.scheduler().peek_phase(group.addr), Some(Phase::Dms));

    let frames = bed.tick();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].iface_id, 0);
    assert_eq!(frames[0].policy.addr, group.addr);
    assert_eq!(frames[0].policy.mcast, McastMode::Dms);
    assert_eq!(frames[0].policy.mcast.code(), 0x1);
}

#[test]
fn test_s4_legacy_with_full_intersection() {
    let mut bed = Testbed::online(legacy_only());
    bed.associate(RECV1);
    bed.associate(RECV2);
    let valid: Vec<(u8, u32)> = (4..=7).map(|m| (m, 180)).chain((0..4).map(|m| (m, 20))).collect();
    bed.rc_stats(RECV1, &valid);
    bed.rc_stats(RECV2, &valid);
    bed.add_group();

    let frames = bed.tick();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].policy.mcast, McastMode::Legacy);
    assert_eq!(frames[0].policy.mcast.code(), 0x0);
    assert_eq!(frames[0].policy.ht_mcs, vec![7]);
}

#[test]
fn test_s5_legacy_with_fallback() {
    let mut bed = Testbed::online(legacy_only());
    bed.associate(RECV1);
    bed.associate(RECV2);
    // recv1: nothing above threshold, best_ewma is 3
    bed.rc_stats(RECV1, &[(0, 60), (1, 80), (2, 100), (3, 140), (4, 30)]);
    // recv2: {6, 7} valid
    bed.rc_stats(RECV2, &[(5, 120), (6, 170), (7, 175)]);
    bed.add_group();

    let recv1 = bed.registry.station(addr(RECV1)).unwrap().rates.clone();
    let recv2 = bed.registry.station(addr(RECV2)).unwrap().rates.clone();
    assert!(recv1.valid_ewma().is_empty());
    assert_eq!(recv2.valid_ewma().iter().copied().collect::<Vec<_>>(), vec![6, 7]);

    let frames = bed.tick();
    let expected = recv1.best_ewma().min(recv2.best_ewma());
    assert_eq!(expected, 3);
    assert_eq!(frames[0].policy.mcast, McastMode::Legacy);
    assert_eq!(frames[0].policy.ht_mcs, vec![expected]);
}

#[test]
fn test_band_clamp_on_restricted_ht_block() {
    let mut bed = Testbed::online(legacy_only());
    bed.associate(RECV1);
    bed.rc_stats(RECV1, &[(1, 180), (2, 180), (3, 40)]);
    bed.add_group();

    let block = BlockRef::new(addr(AP), 0);
    let restricted = bed
        .registry
        .block(block)
        .unwrap()
        .block
        .clone()
        .with_ht_supports([4, 5, 6, 7]);
    let recv = bed.registry.station(addr(RECV1)).unwrap().rates.clone();
    assert_eq!(empower_sdnplay::McsSelector::select_for(&[&recv], &restricted), 4);
}

#[test]
fn test_receivers_are_polled_after_policies() {
    let mut bed = Testbed::online(EngineConfig::default());
    bed.associate(RECV1);
    bed.add_group();
    bed.drain();

    let mut sink = SessionSink {
        session: &mut bed.session,
    };
    let report = bed.engine.tick(&mut bed.registry, &mut sink);
    assert_eq!(report.polled, 1);
    let types: Vec<MessageType> = bed.drain().iter().map(Frame::msg_type).collect();
    assert_eq!(types, vec![MessageType::SetTxPolicy, MessageType::WifiRcStatsRequest]);
    assert_eq!(bed.session.pending_requests(), 0);
}

#[test]
fn test_idempotent_ticks_in_same_phase() {
    let mut bed = Testbed::online(legacy_only());
    bed.associate(RECV1);
    bed.associate(RECV2);
    bed.rc_stats(RECV1, &[(4, 180), (5, 180), (6, 100)]);
    bed.rc_stats(RECV2, &[(4, 180), (5, 170), (6, 180)]);
    bed.add_group();

    let first = bed.tick();
    let second = bed.tick();
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn test_scheduler_fairness() {
    for (dms, legacy, groups) in [(1u32, 9u32, 10usize), (1, 9, 4), (2, 4, 3), (3, 3, 2), (1, 0, 1)] {
        let len = (dms + legacy) as usize;
        let mut sched = GroupScheduler::new(dms, legacy, DemoMode::SdnPlay);
        let addrs: Vec<Address> = (0..groups)
            .map(|i| Address([0x01, 0x00, 0x5E, 0x00, 0x02, i as u8]))
            .collect();
        for a in &addrs {
            sched.register(*a);
        }

        // start the window at an arbitrary offset
        for _ in 0..3 {
            for a in &addrs {
                sched.next_phase(*a);
            }
        }

        let mut dms_count = vec![0u32; groups];
        for _ in 0..len {
            let mut in_dms = 0;
            for (i, a) in addrs.iter().enumerate() {
                if sched.next_phase(*a) == Phase::Dms {
                    dms_count[i] += 1;
                    in_dms += 1;
                }
            }
            assert!(in_dms <= 1, "two groups in DMS at once ({dms}+{legacy}, G={groups})");
        }
        assert!(
            dms_count.iter().all(|&c| c == dms),
            "{dms_count:?} for {dms}+{legacy}, G={groups}"
        );
    }
}

#[test]
fn test_disconnect_stops_output_for_ap() {
    let mut bed = Testbed::online(EngineConfig::default());
    bed.add_group();
    assert_eq!(bed.tick().len(), 1);

    bed.session.teardown(&mut bed.registry);
    assert!(bed.registry.blocks_of(addr(AP)).is_empty());
    assert!(bed.tick().is_empty());
}
