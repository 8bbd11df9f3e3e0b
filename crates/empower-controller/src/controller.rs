//! The controller task.
//!
//! One task owns the registry, every session and the engine. Socket readers
//! and writers run as separate tasks and talk to it through channels:
//!
//! ```text
//!  reader task ──Event──▶ ┌────────────┐ ──bytes──▶ writer task
//!  reader task ──Event──▶ │ Controller │ ──bytes──▶ writer task
//!  ControllerHandle ─Cmd─▶ └────────────┘
//!                          ▲          ▲
//!                    engine timer  heartbeat timer
//! ```
//!
//! Nothing in the loop body awaits, so a tick or a frame is handled to
//! completion before the next event is looked at.

use std::collections::HashMap;
use std::net::SocketAddr;

use empower_core::{Address, CoreError, GroupStatus, MulticastGroup};
use empower_lvapp::codec::{DelTxPolicy, Message, RcStatsResponse};
use empower_lvapp::transport::{read_frame, write_frames};
use empower_lvapp::{
    ApRegistry, ConnId, ErrorKind, Frame, PendingReply, RegistryError, RegistrySnapshot, Session,
    SessionError, HEARTBEAT_INTERVAL,
};
use empower_sdnplay::{DemoMode, Engine, TickReport};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::sink::SessionSink;

/// Depth of the command queue.
const COMMAND_QUEUE: usize = 64;

/// Reply channel of a [`Command`].
pub type Reply<T> = oneshot::Sender<Result<T, ControllerError>>;

/// Requests from outside the controller task.
#[derive(Debug)]
pub enum Command {
    RegisterAp {
        addr: Address,
        label: String,
        reply: Reply<()>,
    },
    RemoveAp {
        addr: Address,
        reply: Reply<()>,
    },
    AddGroup {
        group: MulticastGroup,
        reply: Reply<u32>,
    },
    RemoveGroup {
        addr: Address,
        reply: Reply<()>,
    },
    SetGroupStatus {
        addr: Address,
        status: GroupStatus,
        reply: Reply<()>,
    },
    SetDemoMode {
        mode: DemoMode,
        reply: Reply<()>,
    },
    RemoveStation {
        sta: Address,
        reply: Reply<()>,
    },
    RcStats {
        sta: Address,
        reply: Reply<RcStatsResponse>,
    },
    Snapshot {
        reply: Reply<RegistrySnapshot>,
    },
    Tick {
        reply: Reply<TickReport>,
    },
    Shutdown,
}

/// What socket tasks report back.
#[derive(Debug)]
enum Event {
    Frame { conn: ConnId, frame: Frame },
    Closed { conn: ConnId },
    Failed { conn: ConnId, error: SessionError },
}

/// Cloneable front door to a running [`Controller`].
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    commands: mpsc::Sender<Command>,
}

impl ControllerHandle {
    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, ControllerError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| ControllerError::Stopped)?;
        rx.await.map_err(|_| ControllerError::Stopped)?
    }

    /// Allow an AP to connect.
    pub async fn register_ap(&self, addr: Address, label: impl Into<String>) -> Result<(), ControllerError> {
        let label = label.into();
        self.call(|reply| Command::RegisterAp { addr, label, reply }).await
    }

    /// Forget an AP, closing its session.
    pub async fn remove_ap(&self, addr: Address) -> Result<(), ControllerError> {
        self.call(|reply| Command::RemoveAp { addr, reply }).await
    }

    /// Add a group; returns its scheduler index.
    pub async fn add_group(&self, group: MulticastGroup) -> Result<u32, ControllerError> {
        self.call(|reply| Command::AddGroup { group, reply }).await
    }

    pub async fn remove_group(&self, addr: Address) -> Result<(), ControllerError> {
        self.call(|reply| Command::RemoveGroup { addr, reply }).await
    }

    pub async fn set_group_status(&self, addr: Address, status: GroupStatus) -> Result<(), ControllerError> {
        self.call(|reply| Command::SetGroupStatus { addr, status, reply }).await
    }

    pub async fn set_demo_mode(&self, mode: DemoMode) -> Result<(), ControllerError> {
        self.call(|reply| Command::SetDemoMode { mode, reply }).await
    }

    /// Tear a station's LVAP down on its AP.
    pub async fn remove_station(&self, sta: Address) -> Result<(), ControllerError> {
        self.call(|reply| Command::RemoveStation { sta, reply }).await
    }

    /// Fetch a station's rate-control table from its AP.
    pub async fn rc_stats(&self, sta: Address) -> Result<RcStatsResponse, ControllerError> {
        self.call(|reply| Command::RcStats { sta, reply }).await
    }

    pub async fn snapshot(&self) -> Result<RegistrySnapshot, ControllerError> {
        self.call(|reply| Command::Snapshot { reply }).await
    }

    /// Run one engine iteration now, outside the timer.
    pub async fn tick(&self) -> Result<TickReport, ControllerError> {
        self.call(|reply| Command::Tick { reply }).await
    }

    pub async fn shutdown(&self) -> Result<(), ControllerError> {
        self.commands
            .send(Command::Shutdown)
            .await
            .map_err(|_| ControllerError::Stopped)
    }
}

/// Owner of all controller state.
pub struct Controller {
    config: ControllerConfig,
    registry: ApRegistry,
    engine: Engine,
    sessions: HashMap<ConnId, Session>,
    readers: HashMap<ConnId, JoinHandle<()>>,
    next_conn: u64,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    commands: mpsc::Receiver<Command>,
}

impl Controller {
    /// Validate `config`, seed the registry with its APs and groups, and
    /// return the controller with a handle to it.
    pub fn new(config: ControllerConfig) -> Result<(Self, ControllerHandle), ControllerError> {
        config.validate()?;
        let mut registry = ApRegistry::new(config.engine.prob_threshold);
        let mut engine = Engine::new(config.engine.clone())?;

        for ap in &config.aps {
            registry.upsert(ap.addr, ap.label.clone());
        }
        for group in &config.groups {
            let group = group.to_group()?;
            engine.register_group(group.addr);
            registry.add_group(group)?;
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands) = mpsc::channel(COMMAND_QUEUE);
        let controller = Self {
            config,
            registry,
            engine,
            sessions: HashMap::new(),
            readers: HashMap::new(),
            next_conn: 0,
            events_tx,
            events_rx,
            commands,
        };
        Ok((controller, ControllerHandle { commands: commands_tx }))
    }

    pub fn registry(&self) -> &ApRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Bind the configured address and run until shut down.
    pub async fn serve(self) -> Result<(), ControllerError> {
        let addr = self.config.listen;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ControllerError::Bind { addr, source })?;
        self.run(listener).await
    }

    /// Run on an already bound listener until a [`Command::Shutdown`]
    /// arrives or every handle is dropped.
    pub async fn run(mut self, listener: TcpListener) -> Result<(), ControllerError> {
        info!(
            listen = %listener.local_addr().map(|a| a.to_string()).unwrap_or_default(),
            every_ms = self.engine.config().every,
            demo_mode = %self.engine.config().demo_mode,
            aps = self.config.aps.len(),
            groups = self.config.groups.len(),
            "controller started"
        );

        let mut engine_timer = tokio::time::interval(self.engine.period());
        engine_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.on_accept(stream, peer),
                    Err(e) => warn!(error = %e, "accept failed"),
                },
                Some(event) = self.events_rx.recv() => self.on_event(event),
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.on_command(command),
                },
                _ = engine_timer.tick() => {
                    self.tick();
                }
                _ = heartbeat.tick() => self.check_heartbeats(Instant::now()),
            }
        }

        self.shutdown();
        Ok(())
    }

    // -- Connections -------------------------------------------------------

    fn on_accept(&mut self, stream: TcpStream, peer: SocketAddr) {
        self.next_conn += 1;
        let conn = ConnId(self.next_conn);
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%conn, error = %e, "cannot set TCP_NODELAY");
        }
        let (reader, mut writer) = stream.into_split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        let session = Session::new(conn, self.config.session.clone(), outbound, Instant::now());
        self.sessions.insert(conn, session);
        info!(%conn, %peer, "connection accepted");

        let events = self.events_tx.clone();
        self.readers.insert(conn, tokio::spawn(read_loop(conn, reader, events)));

        let events = self.events_tx.clone();
        tokio::spawn(async move {
            if let Err(error) = write_frames(&mut writer, outbound_rx).await {
                let _ = events.send(Event::Failed { conn, error });
            }
        });
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::Frame { conn, frame } => {
                let Some(session) = self.sessions.get_mut(&conn) else {
                    return;
                };
                let msg_type = frame.msg_type();
                if let Err(e) = session.handle_frame(frame, &mut self.registry, Instant::now()) {
                    if e.is_fatal() {
                        warn!(%conn, msg = %msg_type, error = %e, "closing session");
                        self.teardown(conn);
                    } else if e.kind() == ErrorKind::NotFound {
                        debug!(%conn, msg = %msg_type, error = %e, "frame ignored");
                    } else {
                        warn!(%conn, msg = %msg_type, error = %e, "frame discarded");
                    }
                }
            }
            Event::Closed { conn } => {
                info!(%conn, "connection closed by peer");
                self.teardown(conn);
            }
            Event::Failed { conn, error } => {
                warn!(%conn, error = %error, "connection failed");
                self.teardown(conn);
            }
        }
    }

    /// Drop a session: pending requests cancelled, AP released, sockets
    /// closed.
    fn teardown(&mut self, conn: ConnId) {
        if let Some(mut session) = self.sessions.remove(&conn) {
            session.teardown(&mut self.registry);
        }
        if let Some(reader) = self.readers.remove(&conn) {
            reader.abort();
        }
    }

    fn check_heartbeats(&mut self, now: Instant) {
        let expired: Vec<(ConnId, SessionError)> = self
            .sessions
            .iter()
            .filter_map(|(conn, s)| s.check_heartbeat(now).err().map(|e| (*conn, e)))
            .collect();
        for (conn, error) in expired {
            warn!(%conn, error = %error, "heartbeat expired");
            self.teardown(conn);
        }
    }

    fn session_of(&mut self, ap: Address) -> Result<&mut Session, ControllerError> {
        let conn = self
            .registry
            .get(ap)
            .and_then(|a| a.conn)
            .ok_or(ControllerError::NotConnected(ap))?;
        self.sessions.get_mut(&conn).ok_or(ControllerError::NotConnected(ap))
    }

    fn tick(&mut self) -> TickReport {
        let mut sink = SessionSink::new(&self.registry, &mut self.sessions);
        self.engine.tick(&mut self.registry, &mut sink)
    }

    fn shutdown(&mut self) {
        let conns: Vec<ConnId> = self.sessions.keys().copied().collect();
        for conn in conns {
            self.teardown(conn);
        }
        info!("controller stopped");
    }

    // -- Commands ----------------------------------------------------------

    fn on_command(&mut self, command: Command) {
        match command {
            Command::RegisterAp { addr, label, reply } => {
                let result = self.register_ap(addr, label);
                let _ = reply.send(result);
            }
            Command::RemoveAp { addr, reply } => {
                let result = self.remove_ap(addr);
                let _ = reply.send(result);
            }
            Command::AddGroup { group, reply } => {
                let result = self.add_group(group);
                let _ = reply.send(result);
            }
            Command::RemoveGroup { addr, reply } => {
                let result = self.remove_group(addr);
                let _ = reply.send(result);
            }
            Command::SetGroupStatus { addr, status, reply } => {
                let result = self.registry.set_group_status(addr, status).map_err(Into::into);
                let _ = reply.send(result);
            }
            Command::SetDemoMode { mode, reply } => {
                info!(%mode, "demo mode set");
                self.engine.set_demo_mode(mode);
                let _ = reply.send(Ok(()));
            }
            Command::RemoveStation { sta, reply } => {
                let result = self.remove_station(sta);
                let _ = reply.send(result);
            }
            Command::RcStats { sta, reply } => match self.request_rc_stats(sta) {
                Ok(pending) => {
                    tokio::spawn(await_rc_stats(sta, pending, reply));
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            Command::Snapshot { reply } => {
                let _ = reply.send(Ok(self.registry.snapshot()));
            }
            Command::Tick { reply } => {
                let _ = reply.send(Ok(self.tick()));
            }
            Command::Shutdown => {}
        }
    }

    fn register_ap(&mut self, addr: Address, label: String) -> Result<(), ControllerError> {
        if !addr.is_unicast() {
            return Err(CoreError::NotUnicast {
                address: addr.to_string(),
            }
            .into());
        }
        self.registry.upsert(addr, label);
        info!(ap = %addr, "AP registered");
        Ok(())
    }

    fn remove_ap(&mut self, addr: Address) -> Result<(), ControllerError> {
        if let Some(conn) = self.registry.get(addr).and_then(|ap| ap.conn) {
            self.teardown(conn);
        }
        self.registry
            .remove(addr)
            .ok_or(ControllerError::Registry(RegistryError::UnknownAp(addr)))?;
        info!(ap = %addr, "AP removed");
        Ok(())
    }

    fn add_group(&mut self, group: MulticastGroup) -> Result<u32, ControllerError> {
        let addr = group.addr;
        self.registry.add_group(group)?;
        let index = self.engine.register_group(addr);
        info!(group = %addr, index, "multicast group added");
        Ok(index)
    }

    /// Remove a group and withdraw its policies from every online block.
    fn remove_group(&mut self, addr: Address) -> Result<(), ControllerError> {
        let blocks: Vec<_> = self
            .registry
            .online_blocks()
            .filter(|(_, state)| state.tx_policies.contains_key(&addr))
            .map(|(block, _)| block)
            .collect();
        self.registry.remove_group(addr)?;

        for block in blocks {
            let message = Message::DelTxPolicy(DelTxPolicy {
                iface_id: u32::from(block.block_id),
                sta: addr,
            });
            match self.session_of(block.ap) {
                Ok(session) => {
                    if let Err(e) = session.send(message) {
                        warn!(%block, group = %addr, error = %e, "DEL_TX_POLICY not sent");
                    }
                }
                Err(e) => debug!(%block, error = %e, "no session for block"),
            }
        }
        info!(group = %addr, "multicast group removed");
        Ok(())
    }

    fn remove_station(&mut self, sta: Address) -> Result<(), ControllerError> {
        let ap = self
            .registry
            .station(sta)
            .map(|s| s.block.ap)
            .ok_or(ControllerError::Registry(RegistryError::UnknownStation(sta)))?;
        let conn = self
            .registry
            .get(ap)
            .and_then(|a| a.conn)
            .ok_or(ControllerError::NotConnected(ap))?;
        let session = self.sessions.get_mut(&conn).ok_or(ControllerError::NotConnected(ap))?;
        session.remove_station(sta, &mut self.registry)?;
        Ok(())
    }

    fn request_rc_stats(&mut self, sta: Address) -> Result<PendingReply, ControllerError> {
        let ap = self
            .registry
            .station(sta)
            .map(|s| s.block.ap)
            .ok_or(ControllerError::Registry(RegistryError::UnknownStation(sta)))?;
        Ok(self.session_of(ap)?.request_rc_stats(sta)?)
    }
}

async fn read_loop(conn: ConnId, mut reader: OwnedReadHalf, events: mpsc::UnboundedSender<Event>) {
    loop {
        let event = match read_frame(&mut reader).await {
            Ok(Some(frame)) => Event::Frame { conn, frame },
            Ok(None) => Event::Closed { conn },
            Err(error) => Event::Failed { conn, error },
        };
        let done = !matches!(event, Event::Frame { .. });
        if events.send(event).is_err() || done {
            return;
        }
    }
}

async fn await_rc_stats(sta: Address, pending: PendingReply, reply: Reply<RcStatsResponse>) {
    let result = match pending.await {
        Ok(Ok(Frame {
            message: Message::WifiRcStatsResponse(stats),
            ..
        })) => Ok(stats),
        Ok(Ok(frame)) => Err(SessionError::protocol(format!("{} in reply to WIFI_RC_STATS_REQ", frame.msg_type())).into()),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(ControllerError::Stopped),
    };
    if reply.send(result).is_err() {
        debug!(%sta, "rate stats caller went away");
    }
}
