//! LVAPP message bodies.
//!
//! Each body struct knows how to write itself after the header and how to
//! read itself back from the bytes between the header and `length`. Numeric
//! fields are big-endian; SSIDs are 33-byte zero-padded fields; legacy rates
//! are half-Mbps codes.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use empower_core::{
    Address, Band, CoreError, LegacyRate, McastMode, Probability, RadioBlock, RateEntry, Ssid,
    TxPolicy,
};
use serde::{Deserialize, Serialize};

use crate::codec::header::MessageType;
use crate::error::CodecError;

// ---------------------------------------------------------------------------
// Body reader / writer helpers
// ---------------------------------------------------------------------------

/// Cursor over one message body that reports short reads as `ShortBody`.
pub(crate) struct BodyReader<'a> {
    cursor: Cursor<&'a [u8]>,
    msg_type: MessageType,
}

impl<'a> BodyReader<'a> {
    pub(crate) fn new(body: &'a [u8], msg_type: MessageType) -> Self {
        Self {
            cursor: Cursor::new(body),
            msg_type,
        }
    }

    fn short(&self) -> CodecError {
        CodecError::ShortBody {
            msg_type: self.msg_type,
            offset: self.cursor.position() as usize,
        }
    }

    fn malformed(&self, source: CoreError) -> CodecError {
        CodecError::Malformed {
            msg_type: self.msg_type,
            source,
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.cursor.get_ref().len() - self.cursor.position() as usize
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        self.cursor.read_u8().map_err(|_| self.short())
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        self.cursor.read_u16::<BigEndian>().map_err(|_| self.short())
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        self.cursor.read_u32::<BigEndian>().map_err(|_| self.short())
    }

    fn addr(&mut self) -> Result<Address, CodecError> {
        let mut bytes = [0u8; 6];
        self.cursor.read_exact(&mut bytes).map_err(|_| self.short())?;
        Ok(Address(bytes))
    }

    fn ssid(&mut self) -> Result<Ssid, CodecError> {
        let mut field = [0u8; Ssid::WIRE_LEN];
        self.cursor.read_exact(&mut field).map_err(|_| self.short())?;
        Ssid::from_wire(&field).map_err(|e| self.malformed(e))
    }

    fn bytes(&mut self, n: usize) -> Result<Vec<u8>, CodecError> {
        let mut out = vec![0u8; n];
        self.cursor.read_exact(&mut out).map_err(|_| self.short())?;
        Ok(out)
    }

    /// Fail if anything is left after a fixed layout.
    pub(crate) fn finish(self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            extra => Err(CodecError::TrailingBytes {
                msg_type: self.msg_type,
                extra,
            }),
        }
    }
}

// Writes into a Vec cannot fail; the helpers below drop the io::Result.

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    let _ = buf.write_u16::<BigEndian>(v);
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    let _ = buf.write_u32::<BigEndian>(v);
}

fn put_addr(buf: &mut Vec<u8>, addr: &Address) {
    buf.extend_from_slice(addr.as_bytes());
}

fn put_ssid(buf: &mut Vec<u8>, ssid: &Ssid) {
    buf.extend_from_slice(&ssid.to_wire());
}

/// Count field of a list, rejecting lists the field cannot express.
fn count_u8(msg_type: MessageType, field: &'static str, len: usize) -> Result<u8, CodecError> {
    u8::try_from(len).map_err(|_| CodecError::TooManyEntries {
        msg_type,
        field,
        count: len,
        max: usize::from(u8::MAX),
    })
}

fn count_u16(msg_type: MessageType, field: &'static str, len: usize) -> Result<u16, CodecError> {
    u16::try_from(len).map_err(|_| CodecError::TooManyEntries {
        msg_type,
        field,
        count: len,
        max: usize::from(u16::MAX),
    })
}

fn flag(flags: u8, bit: u8) -> bool {
    flags & (1 << bit) != 0
}

// ---------------------------------------------------------------------------
// Bodies
// ---------------------------------------------------------------------------

/// `HELLO_REQ` / `HELLO_RES`: the AP's hello period in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    pub period: u32,
}

/// One radio block as reported in `CAPS_RES`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockCaps {
    pub block_id: u8,
    pub hwaddr: Address,
    pub channel: u8,
    pub band: Band,
}

/// `CAPS_RES`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CapsResponse {
    pub blocks: Vec<BlockCaps>,
}

/// `PROBE_REQ`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeRequest {
    pub iface_id: u32,
    pub sta: Address,
    pub ht_caps: bool,
    pub ht_caps_info: u16,
    pub ssid: Ssid,
}

/// `PROBE_RES`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResponse {
    pub iface_id: u32,
    pub sta: Address,
    pub ssid: Ssid,
}

/// `AUTH_REQ` / `AUTH_RES`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auth {
    pub iface_id: u32,
    pub sta: Address,
    pub bssid: Address,
}

/// `ASSOC_REQ`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssocRequest {
    pub iface_id: u32,
    pub sta: Address,
    pub bssid: Address,
    pub ht_caps: bool,
    pub ht_caps_info: u16,
    pub ssid: Ssid,
}

/// `ASSOC_RES`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssocResponse {
    pub iface_id: u32,
    pub sta: Address,
}

/// Flag byte of `ADD_LVAP_REQ` / `LVAP_STATUS_RES`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LvapFlags {
    pub authenticated: bool,
    pub associated: bool,
    pub set_mask: bool,
    pub ht_caps: bool,
}

impl LvapFlags {
    fn to_byte(self) -> u8 {
        (self.authenticated as u8)
            | (self.associated as u8) << 1
            | (self.set_mask as u8) << 2
            | (self.ht_caps as u8) << 3
    }

    fn from_byte(b: u8) -> Self {
        Self {
            authenticated: flag(b, 0),
            associated: flag(b, 1),
            set_mask: flag(b, 2),
            ht_caps: flag(b, 3),
        }
    }
}

/// A `(bssid, ssid)` tuple of the trailing networks list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub bssid: Address,
    pub ssid: Ssid,
}

impl Network {
    const WIRE_LEN: usize = Address::LEN + Ssid::WIRE_LEN;
}

/// `ADD_LVAP_REQ` / `LVAP_STATUS_RES`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lvap {
    pub iface_id: u32,
    pub flags: LvapFlags,
    pub assoc_id: u16,
    pub ht_caps_info: u16,
    pub sta: Address,
    pub encap: Address,
    pub bssid: Address,
    pub ssid: Ssid,
    /// Greedy list: element count follows from the frame length.
    pub networks: Vec<Network>,
}

/// `ADD_LVAP_RES` / `DEL_LVAP_RES`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LvapResult {
    pub iface_id: u32,
    pub sta: Address,
    /// Zero on success.
    pub status: u32,
}

impl LvapResult {
    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

/// `DEL_LVAP_REQ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelLvap {
    pub sta: Address,
    pub csa_switch_mode: u8,
    pub csa_switch_count: u8,
    pub csa_switch_channel: u8,
}

/// `SET_SLICE` / `SLICE_STATUS_RES`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slice {
    pub iface_id: u32,
    pub amsdu_aggregation: bool,
    pub ssid: Ssid,
    pub slice_id: u8,
    pub quantum: u32,
    pub sta_scheduler: u32,
    pub stas: Vec<Address>,
}

/// `DEL_SLICE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelSlice {
    pub iface_id: u32,
    pub ssid: Ssid,
    pub slice_id: u8,
}

/// `SET_TX_POLICY` / `TX_POLICY_STATUS_RES`: a [`TxPolicy`] bound to a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxPolicyFrame {
    pub iface_id: u32,
    pub policy: TxPolicy,
}

/// `DEL_TX_POLICY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelTxPolicy {
    pub iface_id: u32,
    pub sta: Address,
}

/// `ADD_VAP` / `VAP_STATUS_RES`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vap {
    pub iface_id: u32,
    pub bssid: Address,
    pub ssid: Ssid,
}

/// `DEL_VAP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelVap {
    pub bssid: Address,
}

/// `WIFI_RC_STATS_REQ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RcStatsRequest {
    pub sta: Address,
}

/// One minstrel row of `WIFI_RC_STATS_RES`. Probabilities are scaled by 180.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RcStatsEntry {
    pub mcs: u8,
    pub ewma_prob: u32,
    pub cur_prob: u32,
    pub cur_tp: u32,
    pub last_attempts: u32,
    pub last_successes: u32,
    pub hist_attempts: u32,
    pub hist_successes: u32,
}

impl RcStatsEntry {
    const WIRE_LEN: usize = 1 + 7 * 4;

    /// Rate-table row for this entry.
    pub fn to_rate_entry(&self) -> RateEntry {
        RateEntry {
            ewma_prob: Probability::from_raw(self.ewma_prob),
            cur_prob: Probability::from_raw(self.cur_prob),
            cur_tp: self.cur_tp,
            last_attempts: self.last_attempts,
            last_successes: self.last_successes,
            hist_attempts: self.hist_attempts,
            hist_successes: self.hist_successes,
        }
    }
}

/// `WIFI_RC_STATS_RES`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RcStatsResponse {
    pub sta: Address,
    pub entries: Vec<RcStatsEntry>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A decoded LVAPP message body, tagged by type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    HelloRequest(Hello),
    HelloResponse(Hello),
    CapsRequest,
    CapsResponse(CapsResponse),
    ProbeRequest(ProbeRequest),
    ProbeResponse(ProbeResponse),
    AuthRequest(Auth),
    AuthResponse(Auth),
    AssocRequest(AssocRequest),
    AssocResponse(AssocResponse),
    AddLvapRequest(Lvap),
    AddLvapResponse(LvapResult),
    DelLvapRequest(DelLvap),
    DelLvapResponse(LvapResult),
    LvapStatusRequest,
    LvapStatusResponse(Lvap),
    SetSlice(Slice),
    DelSlice(DelSlice),
    SliceStatusRequest,
    SliceStatusResponse(Slice),
    SetTxPolicy(TxPolicyFrame),
    DelTxPolicy(DelTxPolicy),
    TxPolicyStatusRequest,
    TxPolicyStatusResponse(TxPolicyFrame),
    AddVap(Vap),
    DelVap(DelVap),
    VapStatusRequest,
    VapStatusResponse(Vap),
    WifiRcStatsRequest(RcStatsRequest),
    WifiRcStatsResponse(RcStatsResponse),
}

impl Message {
    pub fn msg_type(&self) -> MessageType {
        match self {
            Self::HelloRequest(_) => MessageType::HelloRequest,
            Self::HelloResponse(_) => MessageType::HelloResponse,
            Self::CapsRequest => MessageType::CapsRequest,
            Self::CapsResponse(_) => MessageType::CapsResponse,
            Self::ProbeRequest(_) => MessageType::ProbeRequest,
            Self::ProbeResponse(_) => MessageType::ProbeResponse,
            Self::AuthRequest(_) => MessageType::AuthRequest,
            Self::AuthResponse(_) => MessageType::AuthResponse,
            Self::AssocRequest(_) => MessageType::AssocRequest,
            Self::AssocResponse(_) => MessageType::AssocResponse,
            Self::AddLvapRequest(_) => MessageType::AddLvapRequest,
            Self::AddLvapResponse(_) => MessageType::AddLvapResponse,
            Self::DelLvapRequest(_) => MessageType::DelLvapRequest,
            Self::DelLvapResponse(_) => MessageType::DelLvapResponse,
            Self::LvapStatusRequest => MessageType::LvapStatusRequest,
            Self::LvapStatusResponse(_) => MessageType::LvapStatusResponse,
            Self::SetSlice(_) => MessageType::SetSlice,
            Self::DelSlice(_) => MessageType::DelSlice,
            Self::SliceStatusRequest => MessageType::SliceStatusRequest,
            Self::SliceStatusResponse(_) => MessageType::SliceStatusResponse,
            Self::SetTxPolicy(_) => MessageType::SetTxPolicy,
            Self::DelTxPolicy(_) => MessageType::DelTxPolicy,
            Self::TxPolicyStatusRequest => MessageType::TxPolicyStatusRequest,
            Self::TxPolicyStatusResponse(_) => MessageType::TxPolicyStatusResponse,
            Self::AddVap(_) => MessageType::AddVap,
            Self::DelVap(_) => MessageType::DelVap,
            Self::VapStatusRequest => MessageType::VapStatusRequest,
            Self::VapStatusResponse(_) => MessageType::VapStatusResponse,
            Self::WifiRcStatsRequest(_) => MessageType::WifiRcStatsRequest,
            Self::WifiRcStatsResponse(_) => MessageType::WifiRcStatsResponse,
        }
    }

    /// Serialize the body (everything after the header).
    pub(crate) fn write_body(&self, buf: &mut Vec<u8>) -> Result<(), CodecError> {
        let msg_type = self.msg_type();
        match self {
            Self::HelloRequest(h) | Self::HelloResponse(h) => put_u32(buf, h.period),
            Self::CapsRequest
            | Self::LvapStatusRequest
            | Self::SliceStatusRequest
            | Self::TxPolicyStatusRequest
            | Self::VapStatusRequest => {}
            Self::CapsResponse(caps) => {
                buf.push(count_u8(msg_type, "blocks", caps.blocks.len())?);
                for b in &caps.blocks {
                    buf.push(b.block_id);
                    put_addr(buf, &b.hwaddr);
                    buf.push(b.channel);
                    buf.push(b.band.code());
                }
            }
            Self::ProbeRequest(p) => {
                put_u32(buf, p.iface_id);
                put_addr(buf, &p.sta);
                buf.push(p.ht_caps as u8);
                put_u16(buf, p.ht_caps_info);
                put_ssid(buf, &p.ssid);
            }
            Self::ProbeResponse(p) => {
                put_u32(buf, p.iface_id);
                put_addr(buf, &p.sta);
                put_ssid(buf, &p.ssid);
            }
            Self::AuthRequest(a) | Self::AuthResponse(a) => {
                put_u32(buf, a.iface_id);
                put_addr(buf, &a.sta);
                put_addr(buf, &a.bssid);
            }
            Self::AssocRequest(a) => {
                put_u32(buf, a.iface_id);
                put_addr(buf, &a.sta);
                put_addr(buf, &a.bssid);
                buf.push(a.ht_caps as u8);
                put_u16(buf, a.ht_caps_info);
                put_ssid(buf, &a.ssid);
            }
            Self::AssocResponse(a) => {
                put_u32(buf, a.iface_id);
                put_addr(buf, &a.sta);
            }
            Self::AddLvapRequest(l) | Self::LvapStatusResponse(l) => {
                put_u32(buf, l.iface_id);
                buf.push(l.flags.to_byte());
                put_u16(buf, l.assoc_id);
                put_u16(buf, l.ht_caps_info);
                put_addr(buf, &l.sta);
                put_addr(buf, &l.encap);
                put_addr(buf, &l.bssid);
                put_ssid(buf, &l.ssid);
                for n in &l.networks {
                    put_addr(buf, &n.bssid);
                    put_ssid(buf, &n.ssid);
                }
            }
            Self::AddLvapResponse(r) | Self::DelLvapResponse(r) => {
                put_u32(buf, r.iface_id);
                put_addr(buf, &r.sta);
                put_u32(buf, r.status);
            }
            Self::DelLvapRequest(d) => {
                put_addr(buf, &d.sta);
                buf.push(d.csa_switch_mode);
                buf.push(d.csa_switch_count);
                buf.push(d.csa_switch_channel);
            }
            Self::SetSlice(s) | Self::SliceStatusResponse(s) => {
                put_u32(buf, s.iface_id);
                buf.push(s.amsdu_aggregation as u8);
                put_ssid(buf, &s.ssid);
                buf.push(s.slice_id);
                put_u32(buf, s.quantum);
                put_u32(buf, s.sta_scheduler);
                put_u16(buf, count_u16(msg_type, "stations", s.stas.len())?);
                for sta in &s.stas {
                    put_addr(buf, sta);
                }
            }
            Self::DelSlice(d) => {
                put_u32(buf, d.iface_id);
                put_ssid(buf, &d.ssid);
                buf.push(d.slice_id);
            }
            Self::SetTxPolicy(t) | Self::TxPolicyStatusResponse(t) => {
                let p = &t.policy;
                put_u32(buf, t.iface_id);
                buf.push(p.no_ack as u8);
                put_addr(buf, &p.addr);
                put_u16(buf, p.rts_cts);
                put_u16(buf, p.max_amsdu_len);
                buf.push(p.mcast.code());
                buf.push(p.ur_count);
                buf.push(count_u8(msg_type, "legacy rates", p.mcs.len())?);
                buf.push(count_u8(msg_type, "HT rates", p.ht_mcs.len())?);
                buf.extend(p.mcs.iter().map(|r| r.code()));
                buf.extend_from_slice(&p.ht_mcs);
            }
            Self::DelTxPolicy(d) => {
                put_u32(buf, d.iface_id);
                put_addr(buf, &d.sta);
            }
            Self::AddVap(v) | Self::VapStatusResponse(v) => {
                put_u32(buf, v.iface_id);
                put_addr(buf, &v.bssid);
                put_ssid(buf, &v.ssid);
            }
            Self::DelVap(d) => put_addr(buf, &d.bssid),
            Self::WifiRcStatsRequest(r) => put_addr(buf, &r.sta),
            Self::WifiRcStatsResponse(r) => {
                put_addr(buf, &r.sta);
                put_u16(buf, count_u16(msg_type, "rate entries", r.entries.len())?);
                for e in &r.entries {
                    buf.push(e.mcs);
                    put_u32(buf, e.ewma_prob);
                    put_u32(buf, e.cur_prob);
                    put_u32(buf, e.cur_tp);
                    put_u32(buf, e.last_attempts);
                    put_u32(buf, e.last_successes);
                    put_u32(buf, e.hist_attempts);
                    put_u32(buf, e.hist_successes);
                }
            }
        }
        Ok(())
    }

    /// Parse a body of the given type.
    pub(crate) fn read_body(msg_type: MessageType, body: &[u8]) -> Result<Self, CodecError> {
        let mut r = BodyReader::new(body, msg_type);
        let msg = match msg_type {
            MessageType::HelloRequest => Self::HelloRequest(Hello { period: r.u32()? }),
            MessageType::HelloResponse => Self::HelloResponse(Hello { period: r.u32()? }),
            MessageType::CapsRequest => Self::CapsRequest,
            MessageType::LvapStatusRequest => Self::LvapStatusRequest,
            MessageType::SliceStatusRequest => Self::SliceStatusRequest,
            MessageType::TxPolicyStatusRequest => Self::TxPolicyStatusRequest,
            MessageType::VapStatusRequest => Self::VapStatusRequest,
            MessageType::CapsResponse => {
                let n = r.u8()?;
                let mut blocks = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    let block_id = r.u8()?;
                    let hwaddr = r.addr()?;
                    let channel = RadioBlock::check_channel(r.u8()?).map_err(|e| r.malformed(e))?;
                    let code = r.u8()?;
                    let band = Band::from_code(code).map_err(|e| r.malformed(e))?;
                    blocks.push(BlockCaps {
                        block_id,
                        hwaddr,
                        channel,
                        band,
                    });
                }
                Self::CapsResponse(CapsResponse { blocks })
            }
            MessageType::ProbeRequest => Self::ProbeRequest(ProbeRequest {
                iface_id: r.u32()?,
                sta: r.addr()?,
                ht_caps: flag(r.u8()?, 0),
                ht_caps_info: r.u16()?,
                ssid: r.ssid()?,
            }),
            MessageType::ProbeResponse => Self::ProbeResponse(ProbeResponse {
                iface_id: r.u32()?,
                sta: r.addr()?,
                ssid: r.ssid()?,
            }),
            MessageType::AuthRequest => Self::AuthRequest(read_auth(&mut r)?),
            MessageType::AuthResponse => Self::AuthResponse(read_auth(&mut r)?),
            MessageType::AssocRequest => Self::AssocRequest(AssocRequest {
                iface_id: r.u32()?,
                sta: r.addr()?,
                bssid: r.addr()?,
                ht_caps: flag(r.u8()?, 0),
                ht_caps_info: r.u16()?,
                ssid: r.ssid()?,
            }),
            MessageType::AssocResponse => Self::AssocResponse(AssocResponse {
                iface_id: r.u32()?,
                sta: r.addr()?,
            }),
            MessageType::AddLvapRequest => Self::AddLvapRequest(read_lvap(&mut r)?),
            MessageType::LvapStatusResponse => Self::LvapStatusResponse(read_lvap(&mut r)?),
            MessageType::AddLvapResponse => Self::AddLvapResponse(read_lvap_result(&mut r)?),
            MessageType::DelLvapResponse => Self::DelLvapResponse(read_lvap_result(&mut r)?),
            MessageType::DelLvapRequest => Self::DelLvapRequest(DelLvap {
                sta: r.addr()?,
                csa_switch_mode: r.u8()?,
                csa_switch_count: r.u8()?,
                csa_switch_channel: r.u8()?,
            }),
            MessageType::SetSlice => Self::SetSlice(read_slice(&mut r)?),
            MessageType::SliceStatusResponse => Self::SliceStatusResponse(read_slice(&mut r)?),
            MessageType::DelSlice => Self::DelSlice(DelSlice {
                iface_id: r.u32()?,
                ssid: r.ssid()?,
                slice_id: r.u8()?,
            }),
            MessageType::SetTxPolicy => Self::SetTxPolicy(read_tx_policy(&mut r)?),
            MessageType::TxPolicyStatusResponse => {
                Self::TxPolicyStatusResponse(read_tx_policy(&mut r)?)
            }
            MessageType::DelTxPolicy => Self::DelTxPolicy(DelTxPolicy {
                iface_id: r.u32()?,
                sta: r.addr()?,
            }),
            MessageType::AddVap => Self::AddVap(read_vap(&mut r)?),
            MessageType::VapStatusResponse => Self::VapStatusResponse(read_vap(&mut r)?),
            MessageType::DelVap => Self::DelVap(DelVap { bssid: r.addr()? }),
            MessageType::WifiRcStatsRequest => {
                Self::WifiRcStatsRequest(RcStatsRequest { sta: r.addr()? })
            }
            MessageType::WifiRcStatsResponse => {
                let sta = r.addr()?;
                let n = r.u16()? as usize;
                if r.remaining() < n * RcStatsEntry::WIRE_LEN {
                    return Err(r.short());
                }
                let mut entries = Vec::with_capacity(n);
                for _ in 0..n {
                    entries.push(RcStatsEntry {
                        mcs: r.u8()?,
                        ewma_prob: r.u32()?,
                        cur_prob: r.u32()?,
                        cur_tp: r.u32()?,
                        last_attempts: r.u32()?,
                        last_successes: r.u32()?,
                        hist_attempts: r.u32()?,
                        hist_successes: r.u32()?,
                    });
                }
                Self::WifiRcStatsResponse(RcStatsResponse { sta, entries })
            }
        };
        r.finish()?;
        Ok(msg)
    }
}

fn read_auth(r: &mut BodyReader<'_>) -> Result<Auth, CodecError> {
    Ok(Auth {
        iface_id: r.u32()?,
        sta: r.addr()?,
        bssid: r.addr()?,
    })
}

fn read_lvap(r: &mut BodyReader<'_>) -> Result<Lvap, CodecError> {
    let iface_id = r.u32()?;
    let flags = LvapFlags::from_byte(r.u8()?);
    let assoc_id = r.u16()?;
    let ht_caps_info = r.u16()?;
    let sta = r.addr()?;
    let encap = r.addr()?;
    let bssid = r.addr()?;
    let ssid = r.ssid()?;

    if r.remaining() % Network::WIRE_LEN != 0 {
        return Err(CodecError::TrailingBytes {
            msg_type: r.msg_type,
            extra: r.remaining() % Network::WIRE_LEN,
        });
    }
    let mut networks = Vec::with_capacity(r.remaining() / Network::WIRE_LEN);
    while r.remaining() > 0 {
        networks.push(Network {
            bssid: r.addr()?,
            ssid: r.ssid()?,
        });
    }

    Ok(Lvap {
        iface_id,
        flags,
        assoc_id,
        ht_caps_info,
        sta,
        encap,
        bssid,
        ssid,
        networks,
    })
}

fn read_lvap_result(r: &mut BodyReader<'_>) -> Result<LvapResult, CodecError> {
    Ok(LvapResult {
        iface_id: r.u32()?,
        sta: r.addr()?,
        status: r.u32()?,
    })
}

fn read_slice(r: &mut BodyReader<'_>) -> Result<Slice, CodecError> {
    let iface_id = r.u32()?;
    let amsdu_aggregation = flag(r.u8()?, 0);
    let ssid = r.ssid()?;
    let slice_id = r.u8()?;
    let quantum = r.u32()?;
    let sta_scheduler = r.u32()?;
    let n = r.u16()?;
    let mut stas = Vec::with_capacity(n as usize);
    for _ in 0..n {
        stas.push(r.addr()?);
    }
    Ok(Slice {
        iface_id,
        amsdu_aggregation,
        ssid,
        slice_id,
        quantum,
        sta_scheduler,
        stas,
    })
}

fn read_tx_policy(r: &mut BodyReader<'_>) -> Result<TxPolicyFrame, CodecError> {
    let iface_id = r.u32()?;
    let no_ack = flag(r.u8()?, 0);
    let addr = r.addr()?;
    let rts_cts = r.u16()?;
    let max_amsdu_len = r.u16()?;
    let mcast = McastMode::from_code(r.u8()?).map_err(|e| r.malformed(e))?;
    let ur_count = r.u8()?;
    let nb_mcses = r.u8()? as usize;
    let nb_ht_mcses = r.u8()? as usize;
    let mcs = r.bytes(nb_mcses)?.into_iter().map(LegacyRate).collect();
    let ht_mcs = r.bytes(nb_ht_mcses)?;

    Ok(TxPolicyFrame {
        iface_id,
        policy: TxPolicy {
            addr,
            mcast,
            mcs,
            ht_mcs,
            no_ack,
            rts_cts,
            max_amsdu_len,
            ur_count,
        },
    })
}

fn read_vap(r: &mut BodyReader<'_>) -> Result<Vap, CodecError> {
    Ok(Vap {
        iface_id: r.u32()?,
        bssid: r.addr()?,
        ssid: r.ssid()?,
    })
}
