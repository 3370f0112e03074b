//! A multi-room relay server.
//!
//! Owns every room's membership set and every connection's outbound
//! channel. All mutations and fan-outs are serialized through a command
//! channel, so the maps need no locking; anything that wants to talk to
//! the server clones a [`RelayServerHandle`].

use std::{
    collections::{HashMap, HashSet},
    io,
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use campusconnect_directory::UserProfile;
use campusconnect_ws::models::{EventSender, OutboundPayload, RelayEnvelope};
use campusconnect_ws::{RelaySendError, RelaySender, rooms};
use log::{debug, error, info};
use rand::Rng as _;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::ws::{ConnId, Msg, RoomId};

/// A command received by the [`RelayServer`].
#[derive(Debug)]
enum Command {
    Connect {
        identity: EventSender,
        conn_tx: mpsc::UnboundedSender<Msg>,
        res_tx: oneshot::Sender<ConnId>,
    },

    Disconnect {
        conn: ConnId,
    },

    List {
        res_tx: oneshot::Sender<Vec<RoomId>>,
    },

    Join {
        conn: ConnId,
        room: RoomId,
        res_tx: oneshot::Sender<()>,
    },

    Leave {
        conn: ConnId,
        room: RoomId,
        res_tx: oneshot::Sender<()>,
    },

    SendRoom {
        room: RoomId,
        skip: ConnId,
        msg: Msg,
        res_tx: oneshot::Sender<()>,
    },
}

/// A multi-room relay server.
///
/// Call and spawn [`run`](Self::run) to start processing commands.
#[derive(Debug)]
pub struct RelayServer {
    /// Map of connection IDs to their message receivers.
    sessions: HashMap<ConnId, mpsc::UnboundedSender<Msg>>,

    /// Map of room name to participant IDs in that room.
    rooms: HashMap<RoomId, HashSet<ConnId>>,

    /// Identity summary per connection, fixed at registration. Used to tag
    /// the presence departure relayed on disconnect.
    identities: HashMap<ConnId, EventSender>,

    /// Tracks total number of historical connections established.
    visitor_count: AtomicUsize,

    /// Command receiver.
    cmd_rx: mpsc::UnboundedReceiver<Command>,
}

impl RelayServer {
    #[must_use]
    pub fn new() -> (Self, RelayServerHandle) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        (
            Self {
                sessions: HashMap::new(),
                rooms: HashMap::new(),
                identities: HashMap::new(),
                visitor_count: AtomicUsize::new(0),
                cmd_rx,
            },
            RelayServerHandle { cmd_tx },
        )
    }

    /// Send message to users in a room.
    ///
    /// `skip` is used to prevent messages triggered by a connection also
    /// being received by it.
    fn send_to_room(&self, room: &str, skip: ConnId, msg: impl Into<String>) {
        if let Some(members) = self.rooms.get(room) {
            let msg = msg.into();

            for conn_id in members {
                if *conn_id != skip {
                    if let Some(tx) = self.sessions.get(conn_id) {
                        // errors if client disconnected abruptly and hasn't been timed-out yet
                        let _ = tx.send(msg.clone());
                    }
                }
            }
        }
    }

    /// Register new session and assign unique ID to this session.
    fn connect(&mut self, identity: EventSender, tx: mpsc::UnboundedSender<Msg>) -> ConnId {
        // rand 0.9's `StandardUniform` doesn't implement `Distribution<usize>`
        // (platform-dependent width), so sample a `u64` and cast to the
        // `usize` `ConnId`.
        let id = rand::rng().random::<u64>() as usize;

        info!("{} connected as {id}", identity.user_id);

        self.sessions.insert(id, tx);
        self.identities.insert(id, identity);

        let count = self.visitor_count.fetch_add(1, Ordering::SeqCst);
        debug!("Visitor count: {}", count + 1);

        id
    }

    /// Unregister connection from every room and relay a presence departure
    /// to any community room it was a member of.
    fn disconnect(&mut self, conn_id: ConnId) {
        info!("Disconnected {conn_id}");
        let count = self.visitor_count.fetch_sub(1, Ordering::SeqCst);
        debug!("Visitor count: {}", count - 1);

        let identity = self.identities.remove(&conn_id);

        if self.sessions.remove(&conn_id).is_none() {
            return;
        }

        let mut departed: Vec<RoomId> = Vec::new();

        for (name, members) in &mut self.rooms {
            if members.remove(&conn_id) {
                departed.push(name.clone());
            }
        }

        // a room only exists while it has members
        self.rooms.retain(|_, members| !members.is_empty());

        let Some(identity) = identity else {
            return;
        };

        for room in departed.iter().filter(|room| rooms::is_community(room)) {
            let event =
                OutboundPayload::UserOffline(RelayEnvelope::new(identity.clone(), Value::Null));

            match serde_json::to_value(&event) {
                Ok(json) => self.send_to_room(room, conn_id, json.to_string()),
                Err(error) => error!("Failed to serialize departure event: {error:?}"),
            }
        }
    }

    /// Returns list of created room names.
    fn list_rooms(&mut self) -> Vec<String> {
        self.rooms.keys().cloned().collect()
    }

    /// Join `room`, creating it if it does not exist. A connection may be in
    /// any number of rooms at once.
    fn join_room(&mut self, conn_id: ConnId, room: RoomId) {
        debug!("{conn_id} joining room {room}");
        self.rooms.entry(room).or_default().insert(conn_id);
    }

    fn leave_room(&mut self, conn_id: ConnId, room: &str) {
        debug!("{conn_id} leaving room {room}");

        if let Some(members) = self.rooms.get_mut(room) {
            members.remove(&conn_id);

            if members.is_empty() {
                self.rooms.remove(room);
            }
        }
    }

    fn process_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect {
                identity,
                conn_tx,
                res_tx,
            } => {
                let conn_id = self.connect(identity, conn_tx);
                if res_tx.send(conn_id).is_err() {
                    error!("Failed to respond to connect command");
                }
            }

            Command::Disconnect { conn } => self.disconnect(conn),

            Command::List { res_tx } => {
                let _ = res_tx.send(self.list_rooms());
            }

            Command::Join { conn, room, res_tx } => {
                self.join_room(conn, room);
                let _ = res_tx.send(());
            }

            Command::Leave { conn, room, res_tx } => {
                self.leave_room(conn, &room);
                let _ = res_tx.send(());
            }

            Command::SendRoom {
                room,
                skip,
                msg,
                res_tx,
            } => {
                self.send_to_room(&room, skip, msg);
                let _ = res_tx.send(());
            }
        }
    }

    /// # Errors
    ///
    /// * If a command fails to process
    pub async fn run(mut self) -> io::Result<()> {
        while let Some(cmd) = self.cmd_rx.recv().await {
            self.process_command(cmd);
        }

        Ok(())
    }
}

/// Handle and command sender for the relay server.
///
/// Reduces boilerplate of setting up response channels in WebSocket
/// handlers.
#[derive(Debug, Clone)]
pub struct RelayServerHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl RelayServerHandle {
    /// Register client message sender and obtain connection ID.
    pub async fn connect(
        &self,
        profile: &UserProfile,
        conn_tx: mpsc::UnboundedSender<Msg>,
    ) -> ConnId {
        let (res_tx, res_rx) = oneshot::channel();

        // unwrap: relay server should not have been dropped
        self.cmd_tx
            .send(Command::Connect {
                identity: EventSender {
                    user_id: profile.user_id.clone(),
                    name: profile.name.clone(),
                },
                conn_tx,
                res_tx,
            })
            .unwrap();

        // unwrap: relay server does not drop our response channel
        res_rx.await.unwrap()
    }

    /// List all created rooms.
    pub async fn list_rooms(&self) -> Vec<RoomId> {
        let (res_tx, res_rx) = oneshot::channel();

        // unwrap: relay server should not have been dropped
        self.cmd_tx.send(Command::List { res_tx }).unwrap();

        // unwrap: relay server does not drop our response channel
        res_rx.await.unwrap()
    }

    /// Join `room`, creating it if it does not exist.
    pub async fn join(&self, conn: ConnId, room: impl Into<String>) {
        let (res_tx, res_rx) = oneshot::channel();

        // unwrap: relay server should not have been dropped
        self.cmd_tx
            .send(Command::Join {
                conn,
                room: room.into(),
                res_tx,
            })
            .unwrap();

        // unwrap: relay server does not drop our response channel
        res_rx.await.unwrap();
    }

    /// Leave `room`.
    pub async fn leave(&self, conn: ConnId, room: impl Into<String>) {
        let (res_tx, res_rx) = oneshot::channel();

        // unwrap: relay server should not have been dropped
        self.cmd_tx
            .send(Command::Leave {
                conn,
                room: room.into(),
                res_tx,
            })
            .unwrap();

        // unwrap: relay server does not drop our response channel
        res_rx.await.unwrap();
    }

    /// Deliver `msg` to every member of `room` except `skip`.
    pub async fn send_room(&self, room: impl Into<String>, skip: ConnId, msg: impl Into<String>) {
        let (res_tx, res_rx) = oneshot::channel();

        // unwrap: relay server should not have been dropped
        self.cmd_tx
            .send(Command::SendRoom {
                room: room.into(),
                skip,
                msg: msg.into(),
                res_tx,
            })
            .unwrap();

        // unwrap: relay server does not drop our response channel
        res_rx.await.unwrap();
    }

    /// Unregister message sender and relay a presence departure to the
    /// connection's community rooms.
    pub fn disconnect(&self, conn: ConnId) {
        // unwrap: relay server should not have been dropped
        self.cmd_tx.send(Command::Disconnect { conn }).unwrap();
    }
}

#[async_trait]
impl RelaySender for RelayServerHandle {
    async fn send_room_except(
        &self,
        room: &str,
        connection_id: &str,
        data: &str,
    ) -> Result<(), RelaySendError> {
        let conn = connection_id.parse::<usize>()?;
        self.send_room(room, conn, data).await;
        Ok(())
    }

    async fn join_room(&self, connection_id: &str, room: &str) -> Result<(), RelaySendError> {
        let conn = connection_id.parse::<usize>()?;
        self.join(conn, room).await;
        Ok(())
    }

    async fn leave_room(&self, connection_id: &str, room: &str) -> Result<(), RelaySendError> {
        let conn = connection_id.parse::<usize>()?;
        self.leave(conn, room).await;
        Ok(())
    }
}
