//! Game state and main loop.

use crate::collision::{self, StepCollision};
use crate::config::Config;
use crate::entity::Player;
use crate::error::GameError;
use crate::world::World;
use protocol::packets::{ClientMessage, LeaderboardEntry, ServerMessage, StateSnapshot};
use protocol::Direction;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::client::Client;
use super::{GameCommand, StateBroadcast, TargetedMessage};

/// Main game state.
///
/// Owned by the game loop task. Connection tasks never touch it directly;
/// they go through the command queue.
pub struct GameState {
    pub config: Config,
    pub world: World,
    pub tick_count: u64,

    /// Connected sessions, identified or not.
    pub clients: HashMap<u32, Client>,

    /// Player records keyed by client id. Iteration order (ascending id,
    /// i.e. join order) is the collision scan order.
    pub players: BTreeMap<u32, Player>,

    rng: StdRng,

    // Average tick duration in milliseconds (exponential moving average).
    pub update_time_avg: f64,
}

impl GameState {
    /// Create a new game state with an OS-seeded RNG.
    pub fn new(config: Config) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Create a new game state with a fixed seed.
    pub fn seeded(config: Config, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: Config, mut rng: StdRng) -> Self {
        let mut world = World::new(&config);
        world.replenish_apples(&mut rng);

        Self {
            config,
            world,
            tick_count: 0,
            clients: HashMap::new(),
            players: BTreeMap::new(),
            rng,
            update_time_avg: 0.0,
        }
    }

    /// Apply one queued command. Returns a reply for the sending client.
    pub fn apply_command(&mut self, command: GameCommand) -> Option<TargetedMessage> {
        match command {
            GameCommand::Connect { client_id, addr, .. } => {
                self.add_client(client_id, addr);
                None
            }
            GameCommand::Message { client_id, message } => self
                .handle_message(client_id, message)
                .map(|message| TargetedMessage { client_id, message }),
            GameCommand::Disconnect { client_id } => {
                self.remove_client(client_id);
                None
            }
        }
    }

    /// Register a new, unidentified session.
    pub fn add_client(&mut self, id: u32, addr: SocketAddr) {
        self.clients.insert(id, Client::new(addr));
        info!("Client {} connected from {}", id, addr);
    }

    /// Remove a session and its player.
    pub fn remove_client(&mut self, id: u32) {
        if let Some(client) = self.clients.remove(&id) {
            info!(
                "Client {} ({}) disconnected after {:?}",
                id,
                client.addr,
                client.connected_at.elapsed()
            );
        }
        if let Some(player) = self.players.remove(&id) {
            debug!("Removed player '{}' (score {})", player.name, player.score);
        }
    }

    /// Handle a message from a client.
    pub fn handle_message(&mut self, client_id: u32, message: ClientMessage) -> Option<ServerMessage> {
        let Some(client) = self.clients.get_mut(&client_id) else {
            debug!("Message from unknown client {}: {:?}", client_id, message);
            return None;
        };
        let identified = client.identified;

        match message {
            ClientMessage::Init { pseudo } => {
                if identified {
                    debug!("Client {} sent init twice, ignoring", client_id);
                    return None;
                }
                client.identified = true;
                let name = resolve_name(pseudo.as_deref(), client_id, self.config.player.max_nick_length);
                self.spawn_player(client_id, name.clone());
                info!("Client {} joined as '{}'", client_id, name);
                Some(ServerMessage::InitAck { id: client_id, pseudo: name })
            }
            message if !identified => {
                debug!("Client {} sent {:?} before init, ignoring", client_id, message);
                None
            }
            ClientMessage::Direction { direction } => {
                match (Direction::from_vector(direction), self.players.get_mut(&client_id)) {
                    (Some(dir), Some(player)) => player.direction = dir,
                    (None, _) => debug!("Client {} sent invalid direction {:?}", client_id, direction),
                    (_, None) => {}
                }
                None
            }
            ClientMessage::Restart => {
                self.respawn_player(client_id);
                None
            }
            ClientMessage::Boost => {
                self.try_boost(client_id);
                None
            }
        }
    }

    /// Create the player record for a freshly identified client.
    pub fn spawn_player(&mut self, client_id: u32, name: String) {
        let head = self.world.grid.random_cell(&mut self.rng);
        self.players.insert(client_id, Player::new(client_id, name, head));
        debug!("Spawned player {} at {:?}", client_id, head);
    }

    /// Reinitialize a player in place, dead or alive.
    pub fn respawn_player(&mut self, client_id: u32) {
        let head = self.world.grid.random_cell(&mut self.rng);
        let keep_score = self.config.player.keep_score_on_restart;
        if let Some(player) = self.players.get_mut(&client_id) {
            player.respawn(head, keep_score);
            debug!("Respawned player {} at {:?}", client_id, head);
        }
    }

    /// Activate boost if the player is eligible; otherwise do nothing.
    pub fn try_boost(&mut self, client_id: u32) {
        let boost = &self.config.boost;
        if let Some(player) = self.players.get_mut(&client_id) {
            if player.can_boost(boost) {
                player.activate_boost(boost);
                debug!("Player {} boosted", client_id);
            } else {
                debug!("Player {} boost rejected", client_id);
            }
        }
    }

    /// Run a single game tick and return the snapshot to broadcast.
    pub fn tick(&mut self) -> Result<StateSnapshot, GameError> {
        self.tick_count += 1;

        self.update_boosts();
        self.update_movement();

        let expired = self.world.age_apples();
        self.world.replenish_apples(&mut self.rng);

        self.clear_dead_bodies();
        self.check_invariants()?;

        if self.tick_count % 300 == 0 {
            debug!(
                "Tick #{}: {:.2}ms avg | {} clients, {} players ({} alive), {} apples ({} expired)",
                self.tick_count,
                self.update_time_avg,
                self.clients.len(),
                self.players.len(),
                self.players.values().filter(|p| p.alive).count(),
                self.world.apples.len(),
                expired
            );
        }

        Ok(self.snapshot())
    }

    /// Boost timers and boost shrink, for every player.
    fn update_boosts(&mut self) {
        let boost = &self.config.boost;
        for player in self.players.values_mut() {
            player.update_boost(boost);
        }
    }

    /// Move every snake that is alive at the start of the tick.
    fn update_movement(&mut self) {
        let movers: Vec<u32> = self.players.values().filter(|p| p.alive).map(|p| p.id).collect();
        for &id in &movers {
            self.move_player(id, &movers);
        }
    }

    /// Advance one snake by one step, or several while boosted.
    fn move_player(&mut self, id: u32, movers: &[u32]) {
        let Some(player) = self.players.get(&id) else {
            return;
        };
        // Cut at the head by an earlier mover this tick.
        if !player.alive {
            return;
        }
        let steps = if player.boosted { self.config.boost.steps_per_tick } else { 1 };

        for _ in 0..steps {
            let Some(player) = self.players.get(&id) else {
                return;
            };
            let Some(head) = player.head() else {
                return;
            };
            let boosted = player.boosted;
            let next = self.world.teleport(self.world.grid.step(head, player.direction));

            match collision::check_step(&self.players, id, next, movers) {
                StepCollision::None => {}
                StepCollision::SelfHit => {
                    if let Some(player) = self.players.get_mut(&id) {
                        player.kill();
                    }
                    debug!("Player {} ran into itself at {:?}", id, next);
                    return;
                }
                StepCollision::Opponent { victim, index } if boosted => {
                    self.cut_snake(id, victim, index);
                }
                StepCollision::Opponent { victim, .. } => {
                    self.resolve_kill(id, victim);
                    return;
                }
            }

            let ate = self.world.take_apple_at(next);
            if ate {
                self.world.spawn_apple(&mut self.rng);
            }

            let growth = self.config.apple.growth;
            let Some(player) = self.players.get_mut(&id) else {
                return;
            };
            player.body.push_front(next);
            if ate {
                player.pending_growth += growth;
            }
            player.settle_tail();
        }
    }

    /// A boosted snake passes through `victim` at `index`: the victim keeps
    /// the segments before the hit, the rest turn into apples.
    fn cut_snake(&mut self, cutter: u32, victim: u32, index: usize) {
        let Some(other) = self.players.get_mut(&victim) else {
            return;
        };
        let removed = other.body.split_off(index);
        if index == 0 {
            other.kill();
        }
        debug!(
            "Player {} cut player {} at segment {} ({} segments dropped{})",
            cutter,
            victim,
            index,
            removed.len(),
            if index == 0 { ", killed" } else { "" }
        );
        for segment in removed {
            self.world.spawn_apple_at(segment);
        }
    }

    /// An unboosted snake runs into `killer`: it dies and the killer is
    /// rewarded with a point and the victim's length in growth.
    fn resolve_kill(&mut self, victim: u32, killer: u32) {
        let Some(dead) = self.players.get_mut(&victim) else {
            return;
        };
        dead.kill();
        let length = dead.len() as u32;

        if let Some(winner) = self.players.get_mut(&killer) {
            winner.score += 1;
            winner.pending_growth += length;
            debug!(
                "Player {} killed player {} (score {}, +{} growth)",
                killer, victim, winner.score, length
            );
        }
    }

    fn clear_dead_bodies(&mut self) {
        for player in self.players.values_mut().filter(|p| !p.alive) {
            player.body.clear();
        }
    }

    /// End-of-tick sanity checks.
    fn check_invariants(&self) -> Result<(), GameError> {
        if self.world.apples.len() < self.world.apple_target {
            return Err(GameError::ApplePoolUnderflow {
                count: self.world.apples.len(),
                target: self.world.apple_target,
            });
        }
        for player in self.players.values() {
            if player.alive && player.is_empty() {
                return Err(GameError::EmptyLivingBody(player.id));
            }
            if let Some(&at) = player.body.iter().find(|&&c| !self.world.grid.contains(c)) {
                return Err(GameError::SegmentOutOfBounds { id: player.id, at });
            }
        }
        Ok(())
    }

    /// Top players by score. Ties keep join order.
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut ranked: Vec<&Player> = self.players.values().collect();
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        ranked
            .into_iter()
            .take(self.config.player.leaderboard_size)
            .map(|p| LeaderboardEntry { pseudo: p.name.clone(), score: p.score })
            .collect()
    }

    /// Build the broadcast view of the current state.
    pub fn snapshot(&self) -> StateSnapshot {
        let mut snapshot = StateSnapshot {
            apples: self.world.apples.iter().map(|a| a.position).collect(),
            portals: self.world.portals.clone(),
            leaderboard: self.leaderboard(),
            ..StateSnapshot::default()
        };
        for (&id, player) in &self.players {
            snapshot.snakes.insert(id, player.body.iter().copied().collect());
            snapshot.alive.insert(id, player.alive);
            snapshot.scores.insert(id, player.score);
            snapshot.boosts.insert(id, player.boosted);
            snapshot.boost_cooldowns.insert(id, player.boost_cooldown);
            snapshot.pseudos.insert(id, player.name.clone());
        }
        snapshot
    }
}

/// Trim and truncate a requested display name, falling back to `Player<id>`.
pub fn resolve_name(requested: Option<&str>, client_id: u32, max_len: usize) -> String {
    let name: String = requested.unwrap_or("").trim().chars().take(max_len).collect();
    if name.is_empty() {
        format!("Player{}", client_id)
    } else {
        name
    }
}

/// Run the main game loop.
///
/// Drains the command queue at every tick boundary, steps the simulation
/// and publishes one encoded snapshot per tick. Replies go to the sending
/// connection's own channel.
pub async fn run_game_loop(
    mut game: GameState,
    mut commands: mpsc::UnboundedReceiver<GameCommand>,
    world_tx: broadcast::Sender<StateBroadcast>,
) {
    let tick_interval_ms = game.config.server.tick_interval_ms;
    let period = Duration::from_millis(tick_interval_ms);
    let mut ticker = interval_at(Instant::now() + period, period);
    // A late tick is dropped rather than run back-to-back.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        "World initialized: {}x{} grid, {} portals, {} apples",
        game.world.grid.cols,
        game.world.grid.rows,
        game.world.portals.len(),
        game.world.apples.len()
    );

    let mut outboxes: HashMap<u32, mpsc::UnboundedSender<ServerMessage>> = HashMap::new();

    loop {
        ticker.tick().await;

        loop {
            match commands.try_recv() {
                Ok(command) => {
                    match &command {
                        GameCommand::Connect { client_id, replies, .. } => {
                            outboxes.insert(*client_id, replies.clone());
                        }
                        GameCommand::Disconnect { client_id } => {
                            outboxes.remove(client_id);
                        }
                        GameCommand::Message { .. } => {}
                    }
                    if let Some(TargetedMessage { client_id, message }) = game.apply_command(command) {
                        // The socket task may already be gone.
                        if let Some(outbox) = outboxes.get(&client_id) {
                            let _ = outbox.send(message);
                        }
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    info!("Command queue closed, stopping game loop");
                    return;
                }
            }
        }

        // Nobody to simulate for.
        if game.clients.is_empty() {
            continue;
        }

        let tick_start = std::time::Instant::now();
        let result = game.tick();
        let tick_ms = tick_start.elapsed().as_secs_f64() * 1000.0;
        game.update_time_avg = game.update_time_avg * 0.5 + tick_ms * 0.5;

        let tick_budget = tick_interval_ms as f64 * 0.9;
        if tick_ms > tick_budget {
            warn!(
                "Slow tick #{}: {:.3}ms (budget: {:.1}ms) - {} players, {} apples",
                game.tick_count,
                tick_ms,
                tick_budget,
                game.players.len(),
                game.world.apples.len()
            );
        }

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Tick #{} failed, skipping broadcast: {}", game.tick_count, e);
                continue;
            }
        };

        match ServerMessage::State(snapshot).encode() {
            Ok(payload) => {
                // No receivers is fine.
                let _ = world_tx.send(StateBroadcast {
                    tick: game.tick_count,
                    payload: payload.into(),
                });
            }
            Err(e) => error!("Failed to encode state for tick #{}: {}", game.tick_count, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::Vector;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 4000)
    }

    fn game() -> GameState {
        let mut config = Config::default();
        config.portals.clear();
        GameState::seeded(config, 1)
    }

    #[test]
    fn test_resolve_name() {
        assert_eq!(resolve_name(Some("  viper "), 3, 30), "viper");
        assert_eq!(resolve_name(Some("   "), 3, 30), "Player3");
        assert_eq!(resolve_name(None, 12, 30), "Player12");
        assert_eq!(resolve_name(Some("abcdefgh"), 1, 4), "abcd");
    }

    #[test]
    fn test_commands_before_init_are_ignored() {
        let mut game = game();
        game.add_client(1, addr());

        assert!(game.handle_message(1, ClientMessage::Boost).is_none());
        assert!(game.handle_message(1, ClientMessage::Restart).is_none());
        assert!(game
            .handle_message(1, ClientMessage::Direction { direction: Vector { x: 0, y: 1 } })
            .is_none());
        assert!(game.players.is_empty());
    }

    #[test]
    fn test_init_creates_player_and_acks() {
        let mut game = game();
        game.add_client(4, addr());

        let reply = game.handle_message(4, ClientMessage::Init { pseudo: None });
        assert_eq!(reply, Some(ServerMessage::InitAck { id: 4, pseudo: "Player4".into() }));

        let player = &game.players[&4];
        assert!(player.alive);
        assert_eq!(player.len(), 1);
        assert_eq!(player.score, 0);
        assert_eq!(player.direction, Direction::Right);
        assert!(game.world.grid.contains(player.body[0]));

        // A second init does not create a new player.
        assert!(game.handle_message(4, ClientMessage::Init { pseudo: Some("x".into()) }).is_none());
        assert_eq!(game.players[&4].name, "Player4");
    }

    #[test]
    fn test_direction_is_latched_verbatim() {
        let mut game = game();
        game.add_client(1, addr());
        game.handle_message(1, ClientMessage::Init { pseudo: Some("a".into()) });

        // Reversal is accepted here; the tick decides what happens.
        game.handle_message(1, ClientMessage::Direction { direction: Vector { x: -1, y: 0 } });
        assert_eq!(game.players[&1].direction, Direction::Left);

        game.handle_message(1, ClientMessage::Direction { direction: Vector { x: 3, y: 0 } });
        assert_eq!(game.players[&1].direction, Direction::Left);
    }

    #[test]
    fn test_disconnect_removes_player() {
        let mut game = game();
        let (replies, _reply_rx) = mpsc::unbounded_channel();
        game.apply_command(GameCommand::Connect { client_id: 9, addr: addr(), replies });
        let reply = game.apply_command(GameCommand::Message {
            client_id: 9,
            message: ClientMessage::Init { pseudo: Some("nine".into()) },
        });
        assert_eq!(reply.map(|r| r.client_id), Some(9));
        assert!(game.players.contains_key(&9));

        game.apply_command(GameCommand::Disconnect { client_id: 9 });
        assert!(game.players.is_empty());
        assert!(game.clients.is_empty());
        assert!(!game.tick().unwrap().snakes.contains_key(&9));
    }

    #[test]
    fn test_invariant_violation_is_reported() {
        let mut game = game();
        game.add_client(1, addr());
        game.handle_message(1, ClientMessage::Init { pseudo: None });
        game.players.get_mut(&1).unwrap().body.clear();

        assert!(matches!(game.tick(), Err(GameError::EmptyLivingBody(1))));
    }

    fn loop_config() -> Config {
        let mut config = Config::default();
        config.portals.clear();
        config.server.tick_interval_ms = 5;
        config
    }

    #[tokio::test]
    async fn test_loop_skips_broadcast_on_invariant_failure() {
        let mut game = GameState::seeded(loop_config(), 1);
        game.add_client(1, addr());
        game.handle_message(1, ClientMessage::Init { pseudo: None });
        game.players.get_mut(&1).unwrap().body.clear();

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (world_tx, mut world_rx) = broadcast::channel(5);
        let handle = tokio::spawn(run_game_loop(game, command_rx, world_tx));

        // Every tick fails until the player gets a body again.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(matches!(
            world_rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));

        command_tx
            .send(GameCommand::Message { client_id: 1, message: ClientMessage::Restart })
            .unwrap();
        let state = tokio::time::timeout(Duration::from_secs(2), world_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(state.tick > 1, "failed ticks were not broadcast");
        match ServerMessage::parse(state.payload.as_str()).unwrap() {
            ServerMessage::State(snapshot) => assert_eq!(snapshot.alive[&1], true),
            other => panic!("expected state, got {:?}", other),
        }

        // Closing the queue stops the loop.
        drop(command_tx);
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_loop_routes_replies_to_sender_only() {
        let game = GameState::seeded(loop_config(), 1);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (world_tx, _world_rx) = broadcast::channel(5);
        tokio::spawn(run_game_loop(game, command_rx, world_tx));

        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();
        command_tx.send(GameCommand::Connect { client_id: 1, addr: addr(), replies: a_tx }).unwrap();
        command_tx.send(GameCommand::Connect { client_id: 2, addr: addr(), replies: b_tx }).unwrap();
        command_tx
            .send(GameCommand::Message {
                client_id: 2,
                message: ClientMessage::Init { pseudo: Some("bee".into()) },
            })
            .unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(2), b_rx.recv()).await.unwrap();
        assert_eq!(reply, Some(ServerMessage::InitAck { id: 2, pseudo: "bee".into() }));
        assert!(a_rx.try_recv().is_err());
    }
}
