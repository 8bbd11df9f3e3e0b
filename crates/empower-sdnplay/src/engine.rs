//! The periodic rate-adaptation loop.
//!
//! Each [`Engine::tick`] walks every multicast group, asks the scheduler for
//! the group's phase, decides the multicast mode (and, in LEGACY, the MCS)
//! for every block of every online AP, stores the resulting tx policy in
//! the registry and hands it to a [`TxPolicySink`]. The tick never awaits;
//! the sink only queues frames.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use empower_core::{Address, BlockRef, LegacyRate, McastMode, MulticastGroup, TxPolicy};
use empower_lvapp::{ApRegistry, SessionError};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::config::{DemoMode, EngineConfig};
use crate::error::ConfigError;
use crate::scheduler::{GroupScheduler, Phase};
use crate::selector::McsSelector;

/// Where the engine's output goes; implemented over the AP sessions.
pub trait TxPolicySink {
    /// Push `policy` to `block`.
    fn send_tx_policy(&mut self, block: BlockRef, policy: &TxPolicy) -> Result<(), SessionError>;

    /// Ask `ap` for the rate-control table of `sta`.
    fn request_rc_stats(&mut self, ap: Address, sta: Address) -> Result<(), SessionError>;
}

/// Outcome of one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: u64,
    /// Policies handed to the sink, in emission order.
    pub policies: Vec<(BlockRef, TxPolicy)>,
    /// Sink failures.
    pub failed: usize,
    /// Rate-control polls issued.
    pub polled: usize,
}

/// SDN@Play control loop state.
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    scheduler: GroupScheduler,
    last_phase: HashMap<Address, Phase>,
    ticks: u64,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let scheduler = GroupScheduler::new(config.dms_slots, config.legacy_slots, config.demo_mode);
        Ok(Self {
            config,
            scheduler,
            last_phase: HashMap::new(),
            ticks: 0,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &GroupScheduler {
        &self.scheduler
    }

    pub fn period(&self) -> Duration {
        self.config.period()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn set_demo_mode(&mut self, mode: DemoMode) {
        self.config.demo_mode = mode;
        self.scheduler.set_demo_mode(mode);
    }

    /// Give a group its scheduler slot ahead of the first tick.
    pub fn register_group(&mut self, addr: Address) -> u32 {
        self.scheduler.register(addr)
    }

    /// Run one iteration of the control loop.
    pub fn tick(&mut self, registry: &mut ApRegistry, sink: &mut dyn TxPolicySink) -> TickReport {
        self.ticks += 1;
        let mut report = TickReport {
            tick: self.ticks,
            ..TickReport::default()
        };

        let groups: Vec<MulticastGroup> = registry.groups().cloned().collect();
        let known: BTreeSet<Address> = groups.iter().map(|g| g.addr).collect();
        self.scheduler.retain(|addr| known.contains(&addr));
        self.last_phase.retain(|addr, _| known.contains(addr));
        for group in &groups {
            self.scheduler.register(group.addr);
        }

        let blocks: Vec<BlockRef> = registry.online_blocks().map(|(r, _)| r).collect();

        for group in &groups {
            let scheduled = self.scheduler.next_phase(group.addr);
            let phase = if group.is_enabled() { scheduled } else { Phase::Dms };
            self.log_transition(group.addr, phase);

            for &block in &blocks {
                let Some(policy) = self.apply(group, phase, block, registry) else {
                    continue;
                };
                if let Err(e) = sink.send_tx_policy(block, &policy) {
                    warn!(%block, group = %group.addr, error = %e, "SET_TX_POLICY not sent");
                    report.failed += 1;
                }
                report.policies.push((block, policy));
            }
        }

        report.polled = self.poll_rates(&groups, registry, sink);
        trace!(tick = report.tick, policies = report.policies.len(), polled = report.polled, "tick done");
        report
    }

    /// Decide and store the policy of `group` on `block`.
    fn apply(&self, group: &MulticastGroup, phase: Phase, block: BlockRef, registry: &mut ApRegistry) -> Option<TxPolicy> {
        let band = registry.block(block)?.block.band;
        let mcs = match phase {
            Phase::Dms => 0,
            Phase::Legacy => McsSelector::select(group, block, registry),
        };

        let result = registry.update_tx_policy(block, group.addr, |txp| {
            if mcs == 0 {
                txp.mcast = McastMode::Dms;
            } else {
                txp.mcast = McastMode::Legacy;
                if band.is_ht() {
                    txp.ht_mcs = vec![mcs];
                } else {
                    txp.mcs = vec![LegacyRate(mcs)];
                }
            }
        });
        match result {
            Ok(policy) => {
                trace!(%block, group = %group.addr, %phase, mcs, mode = %policy.mcast, "policy");
                Some(policy.clone())
            }
            Err(e) => {
                warn!(%block, group = %group.addr, error = %e, "cannot update tx policy");
                None
            }
        }
    }

    fn log_transition(&mut self, group: Address, phase: Phase) {
        let previous = self.last_phase.insert(group, phase);
        if previous != Some(phase) {
            debug!(
                %group,
                from = previous.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
                to = %phase,
                "phase transition"
            );
        }
    }

    /// Ask for fresh rate tables of every associated receiver of an enabled
    /// group, once per station.
    fn poll_rates(&self, groups: &[MulticastGroup], registry: &ApRegistry, sink: &mut dyn TxPolicySink) -> usize {
        let receivers: BTreeSet<Address> = groups
            .iter()
            .filter(|g| g.is_enabled())
            .flat_map(|g| g.receivers.iter().copied())
            .collect();

        let mut polled = 0;
        for addr in receivers {
            let Some(sta) = registry.station(addr) else {
                continue;
            };
            match sink.request_rc_stats(sta.block.ap, addr) {
                Ok(()) => polled += 1,
                Err(e) => warn!(sta = %addr, ap = %sta.block.ap, error = %e, "rate poll not sent"),
            }
        }
        polled
    }
}
