//! [`TxPolicySink`] over the live AP sessions.

use std::collections::HashMap;

use empower_core::{Address, BlockRef, TxPolicy};
use empower_lvapp::{ApRegistry, ConnId, RegistryError, Session, SessionError};
use empower_sdnplay::TxPolicySink;

/// Routes engine output to the session attached to each AP.
///
/// The AP to connection map is captured before the tick because the engine
/// holds the registry mutably while it writes.
pub struct SessionSink<'a> {
    routes: HashMap<Address, ConnId>,
    sessions: &'a mut HashMap<ConnId, Session>,
}

impl<'a> SessionSink<'a> {
    pub fn new(registry: &ApRegistry, sessions: &'a mut HashMap<ConnId, Session>) -> Self {
        let routes = registry
            .aps()
            .filter_map(|ap| ap.conn.map(|conn| (ap.addr, conn)))
            .collect();
        Self { routes, sessions }
    }

    fn session(&mut self, ap: Address) -> Result<&mut Session, SessionError> {
        self.routes
            .get(&ap)
            .and_then(|conn| self.sessions.get_mut(conn))
            .ok_or(SessionError::Registry(RegistryError::UnknownAp(ap)))
    }
}

impl TxPolicySink for SessionSink<'_> {
    fn send_tx_policy(&mut self, block: BlockRef, policy: &TxPolicy) -> Result<(), SessionError> {
        self.session(block.ap)?
            .send_tx_policy(block.block_id, policy.clone())
            .map(|_| ())
    }

    fn request_rc_stats(&mut self, ap: Address, sta: Address) -> Result<(), SessionError> {
        self.session(ap)?.poll_rc_stats(sta).map(|_| ())
    }
}
