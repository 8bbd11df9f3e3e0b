//! AP registry: the connection graph the controller owns.
//!
//! APs are keyed by their device address. Each AP owns its radio blocks;
//! each block owns the stations attached to it and the tx policies the
//! controller pushed (plus the ones the AP reported back). Multicast groups
//! are process-wide and live here too so that the engine reads one
//! structure.
//!
//! The registry is owned by the controller task; external readers go
//! through [`ApRegistry::snapshot`].

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use empower_core::{
    Address, BlockRef, CoreError, GroupStatus, MulticastGroup, RadioBlock, RateEntry, RateTable,
    Ssid, TxPolicy, DEFAULT_PROB_THRESHOLD,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::codec::{Slice, Vap};
use crate::error::RegistryError;

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Opaque id of one accepted TCP connection.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ConnId(pub u64);

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A client station attached to one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub addr: Address,
    pub block: BlockRef,
    pub ht_caps: bool,
    pub ssid: Ssid,
    pub rates: RateTable,
}

/// A radio block and everything hanging off it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockState {
    pub block: RadioBlock,
    /// Addresses of stations attached to this block.
    pub stations: BTreeSet<Address>,
    /// Policies the controller has set, keyed by destination address.
    pub tx_policies: BTreeMap<Address, TxPolicy>,
    /// Policies as last reported by `TX_POLICY_STATUS_RES`.
    pub reported_policies: BTreeMap<Address, TxPolicy>,
}

impl BlockState {
    fn new(block: RadioBlock) -> Self {
        Self {
            block,
            stations: BTreeSet::new(),
            tx_policies: BTreeMap::new(),
            reported_policies: BTreeMap::new(),
        }
    }
}

/// A registered access point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPoint {
    pub addr: Address,
    pub label: String,
    /// Connection currently speaking for this AP.
    pub conn: Option<ConnId>,
    pub online: bool,
    pub blocks: BTreeMap<u8, BlockState>,
    pub last_seen_seq: Option<u32>,
    pub last_seen: Option<DateTime<Utc>>,
    /// Inbound frames missed according to sequence gaps.
    pub seq_gaps: u64,
    pub vaps: BTreeMap<Address, Vap>,
    pub slices: Vec<Slice>,
}

impl AccessPoint {
    fn new(addr: Address, label: String) -> Self {
        Self {
            addr,
            label,
            conn: None,
            online: false,
            blocks: BTreeMap::new(),
            last_seen_seq: None,
            last_seen: None,
            seq_gaps: 0,
            vaps: BTreeMap::new(),
            slices: Vec::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }
}

/// Consistent copy of the registry for readers outside the controller task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub taken_at: DateTime<Utc>,
    pub aps: Vec<AccessPoint>,
    pub stations: Vec<Station>,
    pub groups: Vec<MulticastGroup>,
}

// ---------------------------------------------------------------------------
// ApRegistry
// ---------------------------------------------------------------------------

/// Owner of APs, blocks, stations, tx policies and multicast groups.
#[derive(Debug, Clone)]
pub struct ApRegistry {
    aps: BTreeMap<Address, AccessPoint>,
    stations: HashMap<Address, Station>,
    groups: BTreeMap<Address, MulticastGroup>,
    prob_threshold: f64,
}

impl Default for ApRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_PROB_THRESHOLD)
    }
}

impl ApRegistry {
    /// Empty registry; new stations get rate tables with `prob_threshold`.
    pub fn new(prob_threshold: f64) -> Self {
        Self {
            aps: BTreeMap::new(),
            stations: HashMap::new(),
            groups: BTreeMap::new(),
            prob_threshold,
        }
    }

    pub fn prob_threshold(&self) -> f64 {
        self.prob_threshold
    }

    /// Change the validity cutoff of every station's rate table.
    pub fn set_prob_threshold(&mut self, prob_threshold: f64) {
        self.prob_threshold = prob_threshold;
        for sta in self.stations.values_mut() {
            sta.rates.set_prob_threshold(prob_threshold);
        }
    }

    // -- APs ---------------------------------------------------------------

    /// Register an AP, or relabel it if already known.
    pub fn upsert(&mut self, addr: Address, label: impl Into<String>) -> &AccessPoint {
        let label = label.into();
        let ap = self
            .aps
            .entry(addr)
            .or_insert_with(|| AccessPoint::new(addr, String::new()));
        ap.label = label;
        &*ap
    }

    /// Forget an AP and everything attached to it.
    pub fn remove(&mut self, addr: Address) -> Option<AccessPoint> {
        let ap = self.aps.remove(&addr)?;
        for block in ap.blocks.values() {
            for sta in &block.stations {
                self.stations.remove(sta);
            }
        }
        info!(ap = %addr, "AP removed from registry");
        Some(ap)
    }

    pub fn get(&self, addr: Address) -> Option<&AccessPoint> {
        self.aps.get(&addr)
    }

    pub fn contains(&self, addr: Address) -> bool {
        self.aps.contains_key(&addr)
    }

    pub fn aps(&self) -> impl Iterator<Item = &AccessPoint> {
        self.aps.values()
    }

    fn ap_mut(&mut self, addr: Address) -> RegistryResult<&mut AccessPoint> {
        self.aps.get_mut(&addr).ok_or(RegistryError::UnknownAp(addr))
    }

    /// Bind `conn` to a registered AP. A previous connection loses the AP
    /// and its blocks are dropped.
    pub fn attach(&mut self, addr: Address, conn: ConnId) -> RegistryResult<()> {
        let previous = self.ap_mut(addr)?.conn.replace(conn);
        if let Some(old) = previous.filter(|old| *old != conn) {
            debug!(ap = %addr, %old, new = %conn, "AP reattached on a new connection");
            self.clear_blocks(addr)?;
            self.ap_mut(addr)?.online = false;
        }
        Ok(())
    }

    /// Unbind `conn` from the AP, if it is still the AP's connection. The
    /// AP goes offline and loses its blocks and stations. Returns whether
    /// anything changed.
    pub fn detach(&mut self, addr: Address, conn: ConnId) -> bool {
        match self.aps.get_mut(&addr) {
            Some(ap) if ap.conn == Some(conn) => {
                ap.conn = None;
                ap.online = false;
                ap.vaps.clear();
                ap.slices.clear();
            }
            _ => return false,
        }
        let _ = self.clear_blocks(addr);
        true
    }

    pub fn set_online(&mut self, addr: Address, online: bool) -> RegistryResult<()> {
        self.ap_mut(addr)?.online = online;
        Ok(())
    }

    pub fn is_online(&self, addr: Address) -> bool {
        self.aps.get(&addr).map(|ap| ap.online).unwrap_or(false)
    }

    /// Replace the AP's radio blocks.
    pub fn set_blocks(&mut self, addr: Address, blocks: impl IntoIterator<Item = RadioBlock>) -> RegistryResult<()> {
        self.clear_blocks(addr)?;
        let ap = self.ap_mut(addr)?;
        for block in blocks {
            ap.blocks.insert(block.block_id, BlockState::new(block));
        }
        Ok(())
    }

    /// Drop every block of the AP together with its stations and policies.
    pub fn clear_blocks(&mut self, addr: Address) -> RegistryResult<()> {
        let ap = self.ap_mut(addr)?;
        let blocks = std::mem::take(&mut ap.blocks);
        for block in blocks.values() {
            for sta in &block.stations {
                self.stations.remove(sta);
            }
        }
        Ok(())
    }

    /// Radio blocks of one AP, in block id order.
    pub fn blocks_of(&self, addr: Address) -> Vec<&RadioBlock> {
        self.aps
            .get(&addr)
            .map(|ap| ap.blocks.values().map(|b| &b.block).collect())
            .unwrap_or_default()
    }

    pub fn block(&self, block: BlockRef) -> Option<&BlockState> {
        self.aps.get(&block.ap)?.blocks.get(&block.block_id)
    }

    fn block_mut(&mut self, block: BlockRef) -> RegistryResult<&mut BlockState> {
        self.ap_mut(block.ap)?
            .blocks
            .get_mut(&block.block_id)
            .ok_or(RegistryError::UnknownBlock(block))
    }

    /// Every block of every online AP, in (AP, block id) order.
    pub fn online_blocks(&self) -> impl Iterator<Item = (BlockRef, &BlockState)> {
        self.aps
            .values()
            .filter(|ap| ap.online)
            .flat_map(|ap| {
                ap.blocks
                    .iter()
                    .map(move |(&id, state)| (BlockRef::new(ap.addr, id), state))
            })
    }

    /// Record an inbound frame's sequence number and arrival time. Returns
    /// the number of frames skipped since the last one.
    pub fn touch(&mut self, addr: Address, seq: u32) -> RegistryResult<u32> {
        let ap = self.ap_mut(addr)?;
        let gap = match ap.last_seen_seq {
            Some(last) => {
                let expected = last.wrapping_add(1);
                if seq > expected {
                    seq - expected
                } else {
                    0
                }
            }
            None => 0,
        };
        ap.seq_gaps += u64::from(gap);
        ap.last_seen_seq = Some(seq);
        ap.last_seen = Some(Utc::now());
        Ok(gap)
    }

    pub fn record_vap(&mut self, addr: Address, vap: Vap) -> RegistryResult<()> {
        self.ap_mut(addr)?.vaps.insert(vap.bssid, vap);
        Ok(())
    }

    pub fn record_slice(&mut self, addr: Address, slice: Slice) -> RegistryResult<()> {
        let ap = self.ap_mut(addr)?;
        match ap.slices.iter_mut().find(|s| {
            s.iface_id == slice.iface_id && s.slice_id == slice.slice_id && s.ssid == slice.ssid
        }) {
            Some(existing) => *existing = slice,
            None => ap.slices.push(slice),
        }
        Ok(())
    }

    // -- Stations ----------------------------------------------------------

    /// Attach a station to `block`, moving it if it was elsewhere. Its rate
    /// table survives a move.
    pub fn associate(&mut self, block: BlockRef, addr: Address, ht_caps: bool, ssid: Ssid) -> RegistryResult<&Station> {
        if !addr.is_unicast() {
            return Err(CoreError::NotUnicast {
                address: addr.to_string(),
            }
            .into());
        }
        if !self.aps.contains_key(&block.ap) {
            return Err(RegistryError::UnknownAp(block.ap));
        }
        if !self.is_online(block.ap) {
            return Err(RegistryError::NotOnline(block.ap));
        }
        self.block_mut(block)?.stations.insert(addr);

        let previous = self.stations.get(&addr).map(|s| s.block);
        if let Some(old) = previous.filter(|old| *old != block) {
            if let Ok(state) = self.block_mut(old) {
                state.stations.remove(&addr);
            }
            debug!(sta = %addr, from = %old, to = %block, "station moved");
        }

        let prob_threshold = self.prob_threshold;
        let sta = self.stations.entry(addr).or_insert_with(|| Station {
            addr,
            block,
            ht_caps,
            ssid: ssid.clone(),
            rates: RateTable::new(prob_threshold),
        });
        sta.block = block;
        sta.ht_caps = ht_caps;
        sta.ssid = ssid;
        Ok(&*sta)
    }

    /// Detach and forget a station.
    pub fn disassociate(&mut self, addr: Address) -> Option<Station> {
        let sta = self.stations.remove(&addr)?;
        if let Ok(state) = self.block_mut(sta.block) {
            state.stations.remove(&addr);
        }
        Some(sta)
    }

    pub fn station(&self, addr: Address) -> Option<&Station> {
        self.stations.get(&addr)
    }

    pub fn stations(&self) -> impl Iterator<Item = &Station> {
        self.stations.values()
    }

    /// Stations attached to `block`, in address order.
    pub fn stations_on(&self, block: BlockRef) -> impl Iterator<Item = &Station> {
        self.block(block)
            .into_iter()
            .flat_map(|state| state.stations.iter())
            .filter_map(|addr| self.stations.get(addr))
    }

    /// Replace a station's rate table.
    pub fn update_rates(&mut self, addr: Address, entries: impl IntoIterator<Item = (u8, RateEntry)>) -> RegistryResult<&RateTable> {
        let sta = self
            .stations
            .get_mut(&addr)
            .ok_or(RegistryError::UnknownStation(addr))?;
        sta.rates.update(entries);
        Ok(&sta.rates)
    }

    // -- Tx policies -------------------------------------------------------

    /// Store `policy` on `block`, restricted to the block's capabilities.
    pub fn set_tx_policy(&mut self, block: BlockRef, mut policy: TxPolicy) -> RegistryResult<&TxPolicy> {
        let state = self.block_mut(block)?;
        policy.clamp_to(&state.block);
        let addr = policy.addr;
        state.tx_policies.insert(addr, policy);
        Ok(&state.tx_policies[&addr])
    }

    pub fn tx_policy(&self, block: BlockRef, addr: Address) -> Option<&TxPolicy> {
        self.block(block)?.tx_policies.get(&addr)
    }

    /// Policy for `(block, addr)`, created with the block defaults if missing.
    pub fn tx_policy_mut(&mut self, block: BlockRef, addr: Address) -> RegistryResult<&mut TxPolicy> {
        let state = self.block_mut(block)?;
        let radio = &state.block;
        Ok(state
            .tx_policies
            .entry(addr)
            .or_insert_with(|| TxPolicy::new(addr, radio)))
    }

    /// Get-or-create the policy, apply `f`, then clamp it to the block.
    pub fn update_tx_policy(
        &mut self,
        block: BlockRef,
        addr: Address,
        f: impl FnOnce(&mut TxPolicy),
    ) -> RegistryResult<&TxPolicy> {
        let state = self.block_mut(block)?;
        let BlockState {
            block: radio,
            tx_policies,
            ..
        } = state;
        let policy = tx_policies
            .entry(addr)
            .or_insert_with(|| TxPolicy::new(addr, radio));
        f(policy);
        policy.clamp_to(radio);
        Ok(&*policy)
    }

    /// Record a policy as reported by the AP.
    pub fn set_reported_policy(&mut self, block: BlockRef, policy: TxPolicy) -> RegistryResult<()> {
        self.block_mut(block)?
            .reported_policies
            .insert(policy.addr, policy);
        Ok(())
    }

    // -- Multicast groups --------------------------------------------------

    pub fn add_group(&mut self, group: MulticastGroup) -> RegistryResult<&MulticastGroup> {
        if self.groups.contains_key(&group.addr) {
            return Err(RegistryError::DuplicateGroup(group.addr));
        }
        let addr = group.addr;
        info!(group = %addr, ip = %group.ip, receivers = group.receivers.len(), "multicast group added");
        Ok(&*self.groups.entry(addr).or_insert(group))
    }

    /// Remove a group and the policies pushed for it.
    pub fn remove_group(&mut self, addr: Address) -> RegistryResult<MulticastGroup> {
        let group = self
            .groups
            .remove(&addr)
            .ok_or(RegistryError::UnknownGroup(addr))?;
        for ap in self.aps.values_mut() {
            for state in ap.blocks.values_mut() {
                state.tx_policies.remove(&addr);
            }
        }
        info!(group = %addr, "multicast group removed");
        Ok(group)
    }

    pub fn group(&self, addr: Address) -> Option<&MulticastGroup> {
        self.groups.get(&addr)
    }

    /// Groups in address order.
    pub fn groups(&self) -> impl Iterator<Item = &MulticastGroup> {
        self.groups.values()
    }

    pub fn set_group_status(&mut self, addr: Address, status: GroupStatus) -> RegistryResult<()> {
        self.groups
            .get_mut(&addr)
            .ok_or(RegistryError::UnknownGroup(addr))?
            .status = status;
        Ok(())
    }

    /// Copy of everything, for readers outside the owning task.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut stations: Vec<Station> = self.stations.values().cloned().collect();
        stations.sort_by_key(|s| s.addr);
        RegistrySnapshot {
            taken_at: Utc::now(),
            aps: self.aps.values().cloned().collect(),
            stations,
            groups: self.groups.values().cloned().collect(),
        }
    }
}
