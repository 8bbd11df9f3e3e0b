//! Radio-side data model: radio blocks, tx policies and multicast groups.

use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::address::{mcast_ip_to_ether, Address};
use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Band
// ---------------------------------------------------------------------------

/// Channel width / PHY family of a radio block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    /// 20 MHz legacy (802.11a/g).
    L20,
    /// 20 MHz HT (802.11n).
    HT20,
}

impl Band {
    /// Wire code carried in `CAPS_RES`.
    pub fn code(self) -> u8 {
        match self {
            Self::L20 => 0,
            Self::HT20 => 1,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, CoreError> {
        match code {
            0 => Ok(Self::L20),
            1 => Ok(Self::HT20),
            _ => Err(CoreError::UnknownBand { code }),
        }
    }

    pub fn is_ht(self) -> bool {
        matches!(self, Self::HT20)
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::L20 => write!(f, "L20"),
            Self::HT20 => write!(f, "HT20"),
        }
    }
}

// ---------------------------------------------------------------------------
// LegacyRate
// ---------------------------------------------------------------------------

/// A legacy (non-HT) data rate in half-Mbps units.
///
/// This is also the wire encoding: `round(mbps * 2)`. Ordering matches the
/// ordering of the underlying Mbps value.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct LegacyRate(pub u8);

impl LegacyRate {
    /// Build from a rate in Mbps.
    pub fn from_mbps(mbps: f64) -> Result<Self, CoreError> {
        let code = (mbps * 2.0).round();
        if !(1.0..=255.0).contains(&code) {
            return Err(CoreError::InvalidRate { mbps });
        }
        Ok(Self(code as u8))
    }

    /// Wire code (half-Mbps units).
    pub fn code(self) -> u8 {
        self.0
    }

    pub fn mbps(self) -> f64 {
        f64::from(self.0) / 2.0
    }
}

impl fmt::Debug for LegacyRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LegacyRate({self})")
    }
}

impl fmt::Display for LegacyRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % 2 == 0 {
            write!(f, "{}", self.0 / 2)
        } else {
            write!(f, "{}.5", self.0 / 2)
        }
    }
}

/// OFDM rates available on every band, in Mbps.
pub const OFDM_RATES: [f64; 8] = [6.0, 9.0, 12.0, 18.0, 24.0, 36.0, 48.0, 54.0];

/// DSSS/CCK rates only available on 2.4 GHz channels, in Mbps.
pub const DSSS_RATES: [f64; 4] = [1.0, 2.0, 5.5, 11.0];

/// HT MCS indices advertised for a single spatial stream.
pub const HT20_MCS: [u8; 8] = [0, 1, 2, 3, 4, 5, 6, 7];

// ---------------------------------------------------------------------------
// RadioBlock
// ---------------------------------------------------------------------------

/// Identifies one radio block across the controller: the owning AP and the
/// block id inside it.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct BlockRef {
    pub ap: Address,
    pub block_id: u8,
}

impl BlockRef {
    pub fn new(ap: Address, block_id: u8) -> Self {
        Self { ap, block_id }
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.ap, self.block_id)
    }
}

/// One radio interface of an AP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadioBlock {
    pub block_id: u8,
    pub hwaddr: Address,
    pub channel: u8,
    pub band: Band,
    /// Legacy rates the radio supports.
    pub supports: BTreeSet<LegacyRate>,
    /// HT MCS indices the radio supports.
    pub ht_supports: BTreeSet<u8>,
}

impl RadioBlock {
    /// Channels a block may sit on: 1 to 165.
    pub fn check_channel(channel: u8) -> Result<u8, CoreError> {
        if (1..=165).contains(&channel) {
            Ok(channel)
        } else {
            Err(CoreError::InvalidChannel { channel })
        }
    }

    /// Build a block and derive its capabilities from channel and band.
    ///
    /// 5 GHz channels get the OFDM rates; 2.4 GHz channels add DSSS/CCK.
    /// HT20 blocks support MCS 0–7.
    pub fn new(block_id: u8, hwaddr: Address, channel: u8, band: Band) -> Result<Self, CoreError> {
        let channel = Self::check_channel(channel)?;

        let mut supports = BTreeSet::new();
        for mbps in OFDM_RATES {
            supports.insert(LegacyRate::from_mbps(mbps)?);
        }
        if channel <= 14 {
            for mbps in DSSS_RATES {
                supports.insert(LegacyRate::from_mbps(mbps)?);
            }
        }

        let ht_supports = if band.is_ht() {
            HT20_MCS.iter().copied().collect()
        } else {
            BTreeSet::new()
        };

        Ok(Self {
            block_id,
            hwaddr,
            channel,
            band,
            supports,
            ht_supports,
        })
    }

    /// Replace the derived HT capability set.
    pub fn with_ht_supports(mut self, ht_supports: impl IntoIterator<Item = u8>) -> Self {
        self.ht_supports = ht_supports.into_iter().collect();
        self
    }

    /// Replace the derived legacy capability set.
    pub fn with_supports(mut self, supports: impl IntoIterator<Item = LegacyRate>) -> Self {
        self.supports = supports.into_iter().collect();
        self
    }

    /// Lowest rate code usable on this block's band: the minimum HT index on
    /// HT20, the minimum legacy half-Mbps code on L20. Zero when the block
    /// reports no capability at all.
    pub fn min_rate_code(&self) -> u8 {
        if self.band.is_ht() {
            self.ht_supports.iter().next().copied().unwrap_or(0)
        } else {
            self.supports.iter().next().map(|r| r.code()).unwrap_or(0)
        }
    }
}

// ---------------------------------------------------------------------------
// TxPolicy
// ---------------------------------------------------------------------------

/// Multicast transmission mode of a tx policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum McastMode {
    /// One broadcast frame at a pinned rate.
    Legacy,
    /// Directed multicast: per-receiver unicast retransmission.
    Dms,
    /// Unsolicited retransmission.
    Ur,
}

impl McastMode {
    pub fn code(self) -> u8 {
        match self {
            Self::Legacy => 0,
            Self::Dms => 1,
            Self::Ur => 2,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, CoreError> {
        match code {
            0 => Ok(Self::Legacy),
            1 => Ok(Self::Dms),
            2 => Ok(Self::Ur),
            _ => Err(CoreError::UnknownMcastMode { code }),
        }
    }
}

impl fmt::Display for McastMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy"),
            Self::Dms => write!(f, "dms"),
            Self::Ur => write!(f, "ur"),
        }
    }
}

/// Per-(block, address) transmission configuration pushed to the AP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxPolicy {
    pub addr: Address,
    pub mcast: McastMode,
    pub mcs: Vec<LegacyRate>,
    pub ht_mcs: Vec<u8>,
    pub no_ack: bool,
    pub rts_cts: u16,
    pub max_amsdu_len: u16,
    pub ur_count: u8,
}

impl TxPolicy {
    pub const DEFAULT_RTS_CTS: u16 = 2436;
    pub const DEFAULT_MAX_AMSDU_LEN: u16 = 3839;
    pub const DEFAULT_UR_COUNT: u8 = 3;

    /// Default policy for `addr` on `block`: every supported rate allowed.
    pub fn new(addr: Address, block: &RadioBlock) -> Self {
        Self {
            addr,
            mcast: McastMode::Legacy,
            mcs: block.supports.iter().copied().collect(),
            ht_mcs: block.ht_supports.iter().copied().collect(),
            no_ack: false,
            rts_cts: Self::DEFAULT_RTS_CTS,
            max_amsdu_len: Self::DEFAULT_MAX_AMSDU_LEN,
            ur_count: Self::DEFAULT_UR_COUNT,
        }
    }

    /// Restrict legacy rates to `block.supports`; an empty result falls back
    /// to the full supported set. Same for HT MCS.
    pub fn clamp_to(&mut self, block: &RadioBlock) {
        self.mcs.retain(|r| block.supports.contains(r));
        if self.mcs.is_empty() {
            self.mcs = block.supports.iter().copied().collect();
        }
        self.ht_mcs.retain(|m| block.ht_supports.contains(m));
        if self.ht_mcs.is_empty() {
            self.ht_mcs = block.ht_supports.iter().copied().collect();
        }
    }
}

// ---------------------------------------------------------------------------
// MulticastGroup
// ---------------------------------------------------------------------------

/// Whether the engine should adapt a group's rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupStatus {
    Enabled,
    Disabled,
}

/// An IP multicast destination with a known receiver set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MulticastGroup {
    /// Ethernet group address derived from `ip`.
    pub addr: Address,
    pub ip: Ipv4Addr,
    pub receivers: BTreeSet<Address>,
    pub status: GroupStatus,
    /// Free-form label (e.g. "video").
    pub kind: String,
}

impl MulticastGroup {
    /// Build an enabled group; `receivers` must all be unicast.
    pub fn new(ip: Ipv4Addr, receivers: impl IntoIterator<Item = Address>) -> Result<Self, CoreError> {
        let addr = mcast_ip_to_ether(ip)?;
        let receivers: BTreeSet<Address> = receivers.into_iter().collect();
        if let Some(bad) = receivers.iter().find(|r| !r.is_unicast()) {
            return Err(CoreError::NotUnicast {
                address: bad.to_string(),
            });
        }
        Ok(Self {
            addr,
            ip,
            receivers,
            status: GroupStatus::Enabled,
            kind: String::new(),
        })
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.status == GroupStatus::Enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hw() -> Address {
        Address::parse("04:F0:21:09:F9:9E").unwrap()
    }

    #[test]
    fn test_legacy_rate_encoding() {
        let mbps = [1.0, 2.0, 5.5, 6.0, 9.0, 11.0, 12.0, 18.0, 24.0, 36.0, 48.0, 54.0];
        for m in mbps {
            let rate = LegacyRate::from_mbps(m).unwrap();
            assert_eq!(rate.code(), (m * 2.0_f64).round() as u8);
            assert_eq!(rate.mbps(), m);
        }
        assert_eq!(LegacyRate::from_mbps(5.5).unwrap().to_string(), "5.5");
        assert_eq!(LegacyRate::from_mbps(54.0).unwrap().to_string(), "54");
        assert!(LegacyRate::from_mbps(0.0).is_err());
        assert!(LegacyRate::from_mbps(200.0).is_err());
    }

    #[test]
    fn test_block_capabilities_5ghz_ht20() {
        let block = RadioBlock::new(0, hw(), 36, Band::HT20).unwrap();
        assert_eq!(block.supports.len(), 8);
        assert_eq!(block.ht_supports.len(), 8);
        assert_eq!(block.min_rate_code(), 0);
    }

    #[test]
    fn test_block_capabilities_24ghz_l20() {
        let block = RadioBlock::new(1, hw(), 6, Band::L20).unwrap();
        assert_eq!(block.supports.len(), 12);
        assert!(block.ht_supports.is_empty());
        assert_eq!(block.min_rate_code(), 2);
    }

    #[test]
    fn test_block_rejects_bad_channel() {
        assert!(RadioBlock::new(0, hw(), 0, Band::L20).is_err());
        assert!(RadioBlock::new(0, hw(), 166, Band::L20).is_err());
        assert_eq!(RadioBlock::check_channel(165).unwrap(), 165);
        assert!(matches!(
            RadioBlock::check_channel(0),
            Err(CoreError::InvalidChannel { channel: 0 })
        ));
    }

    #[test]
    fn test_tx_policy_clamp_falls_back_to_full_set() {
        let block = RadioBlock::new(0, hw(), 36, Band::HT20)
            .unwrap()
            .with_ht_supports([4, 5, 6, 7]);
        let mut txp = TxPolicy::new(Address::parse("01:00:5E:00:01:C8").unwrap(), &block);
        txp.ht_mcs = vec![9, 10];
        txp.mcs = vec![LegacyRate::from_mbps(54.0).unwrap()];
        txp.clamp_to(&block);
        assert_eq!(txp.ht_mcs, vec![4, 5, 6, 7]);
        assert_eq!(txp.mcs, vec![LegacyRate(108)]);
    }

    #[test]
    fn test_group_from_ip() {
        let r1 = Address::parse("AA:BB:CC:DD:EE:01").unwrap();
        let r2 = Address::parse("AA:BB:CC:DD:EE:02").unwrap();
        let group = MulticastGroup::new("224.0.1.200".parse().unwrap(), [r1, r2]).unwrap();
        assert_eq!(group.addr.to_string(), "01:00:5E:00:01:C8");
        assert_eq!(group.receivers.len(), 2);
        assert!(group.is_enabled());
    }

    #[test]
    fn test_group_rejects_multicast_receiver() {
        let bad = Address::parse("01:00:5E:00:00:01").unwrap();
        let result = MulticastGroup::new("224.0.1.200".parse().unwrap(), [bad]);
        assert!(matches!(result, Err(CoreError::NotUnicast { .. })));
    }

    #[test]
    fn test_mode_codes() {
        for mode in [McastMode::Legacy, McastMode::Dms, McastMode::Ur] {
            assert_eq!(McastMode::from_code(mode.code()).unwrap(), mode);
        }
        assert_eq!(McastMode::Dms.code(), 1);
        assert!(McastMode::from_code(7).is_err());
    }
}
