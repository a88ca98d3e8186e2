//! Server orchestrator.
//!
//! Owns the player, chunk, and item registries and drives the four
//! execution units: the accept loop, the fixed-tick simulation loop, the
//! world-generation loop, and the operator console. The tokio runtime is
//! the reactor; each loop runs as its own task and observes one shared
//! shutdown signal.
//!
//! Lock ordering: the player registry is acquired before the chunk store
//! whenever both are needed (`with_world`), and the item registry is always
//! acquired last and never held while taking either of the other two
//! (`with_players_and_items`).

use std::collections::HashSet;
use std::io::Write as _;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use rand::Rng;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use terra_shared::config::ServerConfig;
use terra_shared::items::{DroppedItem, ItemCatalog, ItemId, ItemTemplate};
use terra_shared::math::Vec3;
use terra_shared::message::{compress_chunk_records, pack_chunk_records, ItemRecord, Message};
use terra_shared::wire::axis_flags;

use crate::player::{Player, PlayerId};
use crate::registry::GuardedMap;
use crate::session::{self, SessionHandle, Stage};
use crate::terrain::{ChunkMap, ChunkStore};
use crate::udp::{self, UdpMux, UdpSend};

/// Cadence of the background world-generation loop.
const WORLDGEN_INTERVAL: Duration = Duration::from_millis(100);

/// Seconds between time-of-day re-broadcasts.
const TIMEOFDAY_SYNC_INTERVAL: f32 = 10.0;

type PlayerMap = std::collections::HashMap<PlayerId, Player>;
type ItemMap = std::collections::HashMap<i32, DroppedItem>;

/// The authoritative world server.
pub struct WorldServer {
    pub cfg: ServerConfig,
    config_json: String,
    catalog: ItemCatalog,

    players: GuardedMap<PlayerId, Player>,
    pub terrain: ChunkStore,
    items: GuardedMap<i32, DroppedItem>,
    pub udp: UdpMux,

    tcp_addr: SocketAddr,
    next_player_id: AtomicI32,
    /// Player ids whose id assignment must be re-sent over TCP.
    resend_ids: Mutex<Vec<PlayerId>>,
    /// Item-removal notices queued by pickups, flushed once per tick.
    pending_item_unloads: Mutex<Vec<(i32, Vec3)>>,
    /// Day/night cycle position in [0, 1).
    time_of_day: Mutex<f32>,
    show_debug: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl WorldServer {
    /// Binds both transports and builds the server. Pass port 0 in the
    /// config to bind ephemeral ports (tests).
    pub async fn bind(
        cfg: ServerConfig,
        catalog: ItemCatalog,
    ) -> anyhow::Result<(Arc<Self>, TcpListener)> {
        let tcp_bind = SocketAddr::from(([0, 0, 0, 0], cfg.tcp_port));
        let listener = TcpListener::bind(tcp_bind).await.context("tcp bind")?;
        let tcp_addr = listener.local_addr()?;

        let udp_bind = SocketAddr::from(([0, 0, 0, 0], cfg.udp_port));
        let udp = UdpMux::bind(udp_bind).await?;

        let config_json = cfg.to_json_string().context("serialize server config")?;
        let terrain = ChunkStore::new(&cfg);
        let (shutdown_tx, _) = watch::channel(true);

        Ok((
            Arc::new(Self {
                cfg,
                config_json,
                catalog,
                players: GuardedMap::new(),
                terrain,
                items: GuardedMap::new(),
                udp,
                tcp_addr,
                next_player_id: AtomicI32::new(1),
                resend_ids: Mutex::new(Vec::new()),
                pending_item_unloads: Mutex::new(Vec::new()),
                time_of_day: Mutex::new(0.25),
                show_debug: AtomicBool::new(false),
                shutdown_tx,
            }),
            listener,
        ))
    }

    pub fn tcp_addr(&self) -> SocketAddr {
        self.tcp_addr
    }

    pub fn udp_addr(&self) -> anyhow::Result<SocketAddr> {
        self.udp.local_addr()
    }

    pub fn catalog_json(&self) -> &str {
        self.catalog.json()
    }

    pub fn config_json(&self) -> &str {
        &self.config_json
    }

    pub fn time_of_day(&self) -> f32 {
        *self.time_of_day.lock().unwrap()
    }

    pub fn show_debug(&self) -> bool {
        self.show_debug.load(Ordering::Relaxed)
    }

    pub fn set_show_debug(&self, on: bool) {
        self.show_debug.store(on, Ordering::Relaxed);
    }

    pub fn online_count(&self) -> usize {
        self.players.len()
    }

    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Signals every loop to exit.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(false);
    }

    // ─── Scoped registry access (lock ordering lives here) ───

    pub fn with_players<R>(&self, f: impl FnOnce(&mut PlayerMap) -> R) -> R {
        self.players.with(f)
    }

    /// Player registry, then chunk store. The only way to hold both.
    pub fn with_world<R>(&self, f: impl FnOnce(&mut PlayerMap, &mut ChunkMap) -> R) -> R {
        self.players.with(|players| {
            let mut chunks = self.terrain.lock();
            f(players, &mut chunks)
        })
    }

    /// Player registry, then item registry. The item lock is the innermost
    /// lock and is never held while acquiring another.
    pub fn with_players_and_items<R>(&self, f: impl FnOnce(&mut PlayerMap, &mut ItemMap) -> R) -> R {
        self.players.with(|players| self.items.with(|items| f(players, items)))
    }

    pub fn with_items<R>(&self, f: impl FnOnce(&mut ItemMap) -> R) -> R {
        self.items.with(f)
    }

    pub fn session_of(&self, id: PlayerId) -> Option<SessionHandle> {
        self.with_players(|players| players.get(&id).map(|p| p.session.clone()))
    }

    // ─── Lifecycle ───

    /// Spawns the accept, datagram, tick, and world-gen loops.
    pub fn start(self: &Arc<Self>, listener: TcpListener) -> Vec<JoinHandle<()>> {
        info!(tcp = %self.tcp_addr, udp = ?self.udp.local_addr().ok(), "server listening");
        vec![
            tokio::spawn(accept_loop(Arc::clone(self), listener)),
            tokio::spawn(udp::run(Arc::clone(self))),
            tokio::spawn(tick_loop(Arc::clone(self))),
            tokio::spawn(worldgen_loop(Arc::clone(self))),
        ]
    }

    /// Runs the server until operator shutdown: starts all loops, services
    /// the console, then joins the loops and releases the chunk store.
    pub async fn run(
        self: Arc<Self>,
        listener: TcpListener,
        mut console_rx: mpsc::Receiver<String>,
    ) -> anyhow::Result<()> {
        let handles = self.start(listener);
        let mut shutdown = self.shutdown_rx();

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if !*shutdown.borrow() {
                        break;
                    }
                }
                line = console_rx.recv() => match line {
                    Some(line) => {
                        if !self.handle_console_line(&line) {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }

        self.shutdown();
        for handle in handles {
            let _ = handle.await;
        }

        let released = self.terrain.lock().release_all();
        info!(chunks = released, "world released, server closed");
        Ok(())
    }

    /// Interprets one operator console line. Returns false on shutdown.
    pub fn handle_console_line(&self, line: &str) -> bool {
        match line.trim() {
            "" => {}
            "end" => {
                info!("operator requested shutdown");
                self.shutdown();
                return false;
            }
            "clear" => {
                print!("\x1b[2J\x1b[H");
                let _ = std::io::stdout().flush();
            }
            "spawn_item" => {
                self.spawn_item(ItemId(1), Vec3::new(3.0, 5.0, -2.0));
            }
            "show_debug" => self.set_show_debug(true),
            "hide_debug" => self.set_show_debug(false),
            "online" => println!("Online players: {}", self.online_count()),
            other => println!("Unknown command: {other}"),
        }
        true
    }

    // ─── Players ───

    fn register_connection(self: &Arc<Self>, stream: tokio::net::TcpStream, peer: SocketAddr) {
        let id = PlayerId(self.next_player_id.fetch_add(1, Ordering::Relaxed));
        let (handle, outbound_rx) = SessionHandle::new(id);
        let player = Player::new(id, handle.clone(), &self.cfg);
        self.players.insert(id, player);

        tokio::spawn(session::run(
            Arc::clone(self),
            stream,
            handle.clone(),
            outbound_rx,
        ));

        handle.send(&Message::PlayerId { player_id: id.0 });
        handle.advance_stage(Stage::IdAssigned);
        info!(player = %id, %peer, "connection accepted, id assigned");
    }

    /// Removes a player and announces the departure. Safe to call twice;
    /// the second call is a no-op.
    pub fn remove_player(&self, id: PlayerId) {
        if self.players.remove(&id).is_none() {
            return;
        }
        self.udp.remove_endpoint(id);
        info!(player = %id, "player removed");
        self.broadcast(&Message::ServerMessage {
            text: format!("Player {id} left the server"),
        });
    }

    /// Sends a message to every session, regardless of handshake stage.
    pub fn broadcast(&self, msg: &Message) {
        self.with_players(|players| {
            for player in players.values() {
                player.session.send(msg);
            }
        });
    }

    /// Removes chunk coordinates from one player's loaded set. The chunk
    /// store itself is untouched; other players may still need the chunks.
    pub fn unload_player_chunks(&self, id: PlayerId, positions: &[terra_shared::chunk::ChunkPos]) {
        self.with_players(|players| {
            let Some(player) = players.get_mut(&id) else {
                warn!(player = %id, "chunk unload for unknown player");
                return;
            };
            let mut removed = 0;
            for pos in positions {
                if player.loaded_chunks.remove(pos) {
                    removed += 1;
                }
            }
            info!(player = %id, chunks = removed, "player unloaded chunks");
        });
    }

    // ─── Items ───

    /// Spawns a dropped item with a collision-checked random uuid.
    pub fn spawn_item(&self, item_id: ItemId, pos: Vec3) -> Option<i32> {
        let Some(template) = self.catalog.get(item_id) else {
            warn!(?item_id, "spawn of unknown item type");
            return None;
        };

        let uuid = self.items.with(|items| {
            let mut rng = rand::thread_rng();
            loop {
                let uuid: i32 = rng.gen_range(0..i32::MAX);
                if !items.contains_key(&uuid) {
                    items.insert(uuid, DroppedItem::from_template(template, uuid, pos));
                    return uuid;
                }
            }
        });

        info!(
            item = %template.entry_name,
            x = pos.x, y = pos.y, z = pos.z,
            uuid,
            "item spawned"
        );
        Some(uuid)
    }

    /// Handles a pickup request: the lookup, the registry removal, and the
    /// removal-notice enqueue all happen in one locked section so a
    /// concurrent pickup of the same uuid can never double-claim it.
    pub fn pickup_item(&self, player_id: PlayerId, uuid: i32) {
        self.with_players_and_items(|players, items| {
            let Some(player) = players.get_mut(&player_id) else {
                warn!(player = %player_id, "pickup from unknown player");
                return;
            };
            let Some(item) = items.get(&uuid) else {
                warn!(player = %player_id, uuid, "pickup of unknown item uuid");
                return;
            };
            if player.pos.distance(item.pos) > self.cfg.item_pickup_distance {
                warn!(player = %player_id, uuid, "pickup request from too far away");
                return;
            }

            let item = items.remove(&uuid).expect("item present under lock");
            let template = ItemTemplate {
                id: item.item_id,
                entry_name: item.entry_name.clone(),
                display_name: item.display_name.clone(),
            };
            if !player.inventory.add(template) {
                warn!(player = %player_id, uuid, "inventory full, pickup refused");
                items.insert(uuid, item);
                return;
            }

            self.pending_item_unloads.lock().unwrap().push((uuid, item.pos));
            info!(player = %player_id, item = %item.display_name, uuid, "item picked up");
        });
    }

    // ─── Tick internals ───

    /// One simulation step. `dt` is the nominal tick duration in seconds.
    pub async fn tick_once(&self, dt: f32) {
        self.resend_pending_ids();

        let mut failed: Vec<PlayerId> = Vec::new();
        for (id, msg) in self.collect_chunk_batches() {
            match self.udp.send(id, &msg).await {
                UdpSend::NoEndpoint => self.resend_ids.lock().unwrap().push(id),
                UdpSend::Failed => failed.push(id),
                _ => {}
            }
        }

        for (id, msg) in self.collect_player_updates(dt) {
            match self.udp.send(id, &msg).await {
                UdpSend::NoEndpoint => self.resend_ids.lock().unwrap().push(id),
                UdpSend::Failed => failed.push(id),
                _ => {}
            }
        }

        for (id, msg) in self.collect_item_updates() {
            match self.udp.send(id, &msg).await {
                UdpSend::NoEndpoint => self.resend_ids.lock().unwrap().push(id),
                UdpSend::Failed => failed.push(id),
                _ => {}
            }
        }

        self.flush_item_unloads();

        failed.sort();
        failed.dedup();
        for id in failed {
            self.remove_player(id);
        }
    }

    /// Re-issues the id assignment over TCP for every player whose datagram
    /// endpoint is still unknown, plus any ids queued by dropped sends.
    fn resend_pending_ids(&self) {
        let mut ids = std::mem::take(&mut *self.resend_ids.lock().unwrap());
        self.with_players(|players| {
            for player in players.values() {
                if self.udp.endpoint_of(player.id).is_none() && !ids.contains(&player.id) {
                    ids.push(player.id);
                }
            }
        });

        for id in ids {
            let Some(session) = self.session_of(id) else {
                continue;
            };
            debug!(player = %id, "re-sending id assignment");
            session.send(&Message::PlayerId { player_id: id.0 });
        }
    }

    /// Packs and compresses each fully-connected player's new nearby
    /// chunks. A compression failure rolls back that player's loaded-chunk
    /// additions so the batch is retried next tick.
    fn collect_chunk_batches(&self) -> Vec<(PlayerId, Message)> {
        let mut batches = Vec::new();
        let radius = self.cfg.render_distance;
        let max_raw = self.cfg.chunkdata_max_bytes;

        self.with_world(|players, map| {
            for player in players.values_mut() {
                if !player.is_fully_connected() {
                    continue;
                }

                let (px, pz) = (player.pos.x, player.pos.z);
                let mut raw = Vec::new();
                let mut added = Vec::new();
                let loaded = &mut player.loaded_chunks;

                map.for_each_nearby(px, pz, radius, |chunk, pos| {
                    // Oversized batches are split across ticks.
                    if raw.len() >= max_raw {
                        return;
                    }
                    let Some(chunk) = chunk else {
                        return; // Not generated yet; the world-gen loop will catch up.
                    };
                    if loaded.contains(&pos) {
                        return;
                    }
                    pack_chunk_records(&mut raw, pos, chunk.heights());
                    loaded.insert(pos);
                    added.push(pos);
                });

                if added.is_empty() {
                    continue;
                }

                match compress_chunk_records(&raw) {
                    Ok(blob) => {
                        debug!(
                            player = %player.id,
                            uncompressed = raw.len(),
                            compressed = blob.len(),
                            chunks = added.len(),
                            "chunk batch ready"
                        );
                        batches.push((player.id, Message::ChunkData { blob }));
                    }
                    Err(e) => {
                        warn!(player = %player.id, error = %e, "chunk batch failed, retrying next tick");
                        for pos in added {
                            player.loaded_chunks.remove(&pos);
                        }
                    }
                }
            }
        });

        batches
    }

    /// Applies gravity and the terrain surface to every fully-connected
    /// player, emits each player's own `PLAYER_POSITION`, and broadcasts
    /// everyone's transform to everyone else.
    fn collect_player_updates(&self, dt: f32) -> Vec<(PlayerId, Message)> {
        let mut outgoing = Vec::new();
        let gravity = self.cfg.gravity;
        let cam_height = self.cfg.player_cam_height;

        self.with_world(|players, map| {
            for player in players.values_mut() {
                if !player.is_fully_connected() {
                    continue;
                }

                let surface = map.surface_level(player.pos);
                player.surface_y = surface;
                let target = surface + cam_height;

                if player.pos.y > target {
                    player.velocity.y -= gravity * dt;
                    player.pos.y = (player.pos.y + player.velocity.y * dt).max(target);
                } else {
                    player.pos.y = target;
                    player.velocity.y = 0.0;
                }
                player.on_ground = player.pos.y <= target;

                let mut flags = axis_flags::UPDATE_Y_AXIS;
                if player.pos_xz_updated {
                    flags |= axis_flags::UPDATE_XZ_AXIS;
                    player.pos_xz_updated = false;
                }

                outgoing.push((
                    player.id,
                    Message::PlayerPosition {
                        on_ground: player.on_ground,
                        chunk: map.chunk_pos_at(player.pos.x, player.pos.z),
                        axis_flags: flags,
                        pos: player.pos,
                    },
                ));
            }

            // Tell players each other's position, camera, and animation.
            let snapshot: Vec<_> = players
                .values()
                .filter(|p| p.is_fully_connected())
                .map(|p| (p.id, p.anim_id, p.pos, p.cam_yaw, p.cam_pitch))
                .collect();

            for (id, anim_id, pos, yaw, pitch) in &snapshot {
                for (other_id, ..) in &snapshot {
                    if other_id == id {
                        continue;
                    }
                    outgoing.push((
                        *other_id,
                        Message::PlayerMovementAndCamera {
                            player_id: id.0,
                            anim_id: *anim_id,
                            pos: *pos,
                            yaw: *yaw,
                            pitch: *pitch,
                        },
                    ));
                }
            }
        });

        outgoing
    }

    /// Announces nearby dropped items to each fully-connected player.
    fn collect_item_updates(&self) -> Vec<(PlayerId, Message)> {
        let mut outgoing = Vec::new();
        let near = self.cfg.item_near_distance;

        self.with_players_and_items(|players, items| {
            if items.is_empty() {
                return;
            }
            for player in players.values() {
                if !player.is_fully_connected() {
                    continue;
                }
                let records: Vec<ItemRecord> = items
                    .values()
                    .filter(|item| player.pos.distance(item.pos) <= near)
                    .map(|item| ItemRecord {
                        uuid: item.uuid,
                        item_id: item.item_id.0,
                        pos: item.pos,
                        entry_name: item.entry_name.clone(),
                    })
                    .collect();
                if !records.is_empty() {
                    outgoing.push((player.id, Message::ItemUpdate { items: records }));
                }
            }
        });

        outgoing
    }

    /// Delivers queued item-removal notices to players near the removal.
    fn flush_item_unloads(&self) {
        let unloads = std::mem::take(&mut *self.pending_item_unloads.lock().unwrap());
        if unloads.is_empty() {
            return;
        }
        let near = self.cfg.item_near_distance;

        self.with_players(|players| {
            for (uuid, pos) in &unloads {
                for player in players.values() {
                    if !player.is_fully_connected() {
                        continue;
                    }
                    if player.pos.distance(*pos) <= near {
                        player
                            .session
                            .send(&Message::PlayerUnloadDroppedItem { uuid: *uuid });
                    }
                }
            }
        });
    }

    /// Advances the day/night accumulator and re-broadcasts the clock when
    /// due. `elapsed` is the measured duration of the finished iteration.
    fn advance_day_cycle(&self, elapsed: f32, since_sync: &mut f32) {
        let day_secs = self.cfg.day_cycle_minutes * 60.0;
        if day_secs > 0.0 {
            let mut tod = self.time_of_day.lock().unwrap();
            *tod = (*tod + elapsed / day_secs).fract();
        }

        *since_sync += elapsed;
        if *since_sync >= TIMEOFDAY_SYNC_INTERVAL {
            *since_sync = 0.0;
            let msg = Message::TimeOfDaySync {
                time_of_day: self.time_of_day(),
            };
            self.with_players(|players| {
                for player in players.values().filter(|p| p.is_fully_connected()) {
                    player.session.send(&msg);
                }
            });
        }
    }

    /// Generates every missing chunk within interest radius of any
    /// fully-connected player.
    pub fn generate_near_players(&self) {
        let radius = self.cfg.render_distance;
        self.with_world(|players, map| {
            let mut missing = HashSet::new();
            for player in players.values() {
                if !player.is_fully_connected() {
                    continue;
                }
                map.for_each_nearby(player.pos.x, player.pos.z, radius, |chunk, pos| {
                    if chunk.is_none() {
                        missing.insert(pos);
                    }
                });
            }
            for pos in missing {
                map.insert(self.terrain.generate_chunk(pos));
                debug!(x = pos.x, z = pos.z, "chunk generated");
            }
        });
    }
}

async fn accept_loop(server: Arc<WorldServer>, listener: TcpListener) {
    let mut shutdown = server.shutdown_rx();
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if !*shutdown.borrow() {
                    return;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => server.register_connection(stream, peer),
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }
    }
}

/// Fixed-interval simulation loop with drift correction: iterations that
/// run long are not compounded into permanent lag.
async fn tick_loop(server: Arc<WorldServer>) {
    let tick = Duration::from_secs_f32(server.cfg.tick_delay_ms / 1000.0);
    let shutdown = server.shutdown_rx();
    let mut since_sync = 0.0f32;

    while *shutdown.borrow() {
        let started = Instant::now();
        server.tick_once(tick.as_secs_f32()).await;
        let elapsed = started.elapsed();

        // The iteration costs at least one tick interval; long iterations
        // advance the clock by their true duration.
        server.advance_day_cycle(elapsed.max(tick).as_secs_f32(), &mut since_sync);

        if elapsed < tick {
            tokio::time::sleep(tick - elapsed).await;
        }
    }
}

async fn worldgen_loop(server: Arc<WorldServer>) {
    let shutdown = server.shutdown_rx();
    while *shutdown.borrow() {
        server.generate_near_players();
        tokio::time::sleep(WORLDGEN_INTERVAL).await;
    }
}

/// Test helper: bind both transports on ephemeral ports.
pub async fn bind_ephemeral(mut cfg: ServerConfig) -> anyhow::Result<(Arc<WorldServer>, TcpListener)> {
    cfg.tcp_port = 0;
    cfg.udp_port = 0;
    WorldServer::bind(cfg, ItemCatalog::builtin()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawned_items_get_unique_uuids() {
        let (server, _listener) = bind_ephemeral(ServerConfig::default()).await.unwrap();
        let mut uuids = HashSet::new();
        for _ in 0..64 {
            let uuid = server.spawn_item(ItemId(0), Vec3::ZERO).unwrap();
            assert!(uuids.insert(uuid), "duplicate item uuid {uuid}");
        }
        assert_eq!(server.with_items(|items| items.len()), 64);
    }

    #[tokio::test]
    async fn unknown_item_type_is_a_noop() {
        let (server, _listener) = bind_ephemeral(ServerConfig::default()).await.unwrap();
        assert!(server.spawn_item(ItemId(999), Vec3::ZERO).is_none());
        assert_eq!(server.with_items(|items| items.len()), 0);
    }

    #[tokio::test]
    async fn console_commands() {
        let (server, _listener) = bind_ephemeral(ServerConfig::default()).await.unwrap();
        assert!(server.handle_console_line("online"));
        assert!(server.handle_console_line("show_debug"));
        assert!(server.show_debug());
        assert!(server.handle_console_line("hide_debug"));
        assert!(!server.show_debug());
        assert!(server.handle_console_line("bogus"));
        assert!(server.handle_console_line("spawn_item"));
        assert_eq!(server.with_items(|items| items.len()), 1);
        assert!(!server.handle_console_line("end"));
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn worldgen_only_serves_fully_connected_players() {
        let (server, _listener) = bind_ephemeral(ServerConfig::default()).await.unwrap();
        let (handle, _rx) = SessionHandle::new(PlayerId(1));
        server.with_players(|players| {
            players.insert(PlayerId(1), Player::new(PlayerId(1), handle.clone(), &server.cfg));
        });

        server.generate_near_players();
        assert!(server.terrain.lock().is_empty());

        handle.advance_stage(Stage::FullyConnected);
        server.generate_near_players();
        let expected = (2 * server.cfg.render_distance + 1).pow(2) as usize;
        assert_eq!(server.terrain.lock().len(), expected);
    }
}
