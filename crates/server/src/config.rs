//! Server configuration.

use protocol::{Coord, Portal};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub apple: AppleConfig,
    #[serde(default)]
    pub boost: BoostConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default = "default_portals")]
    pub portals: Vec<PortalConfig>,
}

impl Config {
    /// Load configuration from `config.toml` or use defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = Path::new("config.toml");
        if path.exists() {
            Self::load_from(path)
        } else {
            info!("No config.toml found, creating default config");
            let default_config = Self::default();
            std::fs::write(path, toml::to_string_pretty(&default_config)?)?;
            Ok(default_config)
        }
    }

    /// Load and validate configuration from an explicit path.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the simulation cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        let (cols, rows) = self.grid.dimensions();
        anyhow::ensure!(
            cols > 0 && rows > 0,
            "grid {}x{} with cell size {} has no cells",
            self.grid.width,
            self.grid.height,
            self.grid.cell_size
        );
        anyhow::ensure!(self.apple.target_count > 0, "apple.target_count must be at least 1");
        anyhow::ensure!(self.server.tick_interval_ms > 0, "server.tick_interval_ms must be positive");
        anyhow::ensure!(self.boost.steps_per_tick > 0, "boost.steps_per_tick must be positive");
        anyhow::ensure!(self.boost.min_body_length > 0, "boost.min_body_length must be at least 1");

        let in_grid = |c: Coord| c.x >= 0 && c.y >= 0 && c.x < cols && c.y < rows;
        for (i, portal) in self.portals.iter().enumerate() {
            anyhow::ensure!(
                in_grid(portal.entry) && in_grid(portal.exit),
                "portal #{} ({:?} <-> {:?}) lies outside the {}x{} grid",
                i,
                portal.entry,
                portal.exit,
                cols,
                rows
            );
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            grid: GridConfig::default(),
            apple: AppleConfig::default(),
            boost: BoostConfig::default(),
            player: PlayerConfig::default(),
            portals: default_portals(),
        }
    }
}

/// Server networking and general settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Connections per IP limit.
    #[serde(default = "default_ip_limit")]
    pub ip_limit: usize,
    /// Server name shown in logs.
    #[serde(default = "default_name")]
    pub name: String,
    /// Tick interval in milliseconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            max_connections: default_max_connections(),
            ip_limit: default_ip_limit(),
            name: default_name(),
            tick_interval_ms: default_tick_interval(),
        }
    }
}

fn default_port() -> u16 {
    3001
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_max_connections() -> usize {
    100
}
fn default_ip_limit() -> usize {
    100
}
fn default_name() -> String {
    "Serpent Arena".to_string()
}
fn default_tick_interval() -> u64 {
    67
}

/// Logical world size and cell size; the grid is `floor(size / cell_size)`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GridConfig {
    #[serde(default = "default_grid_width")]
    pub width: f64,
    #[serde(default = "default_grid_height")]
    pub height: f64,
    #[serde(default = "default_cell_size")]
    pub cell_size: f64,
}

impl GridConfig {
    /// Grid dimensions as `(cols, rows)`.
    pub fn dimensions(&self) -> (i32, i32) {
        if self.cell_size <= 0.0 {
            return (0, 0);
        }
        (
            (self.width / self.cell_size).floor() as i32,
            (self.height / self.cell_size).floor() as i32,
        )
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: default_grid_width(),
            height: default_grid_height(),
            cell_size: default_cell_size(),
        }
    }
}

fn default_grid_width() -> f64 {
    160.0
}
fn default_grid_height() -> f64 {
    90.0
}
fn default_cell_size() -> f64 {
    1.3
}

/// Apple pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppleConfig {
    /// Pool size restored after every tick.
    #[serde(default = "default_apple_target")]
    pub target_count: usize,
    /// Whether apples expire on their own.
    #[serde(default = "default_true")]
    pub ttl_enabled: bool,
    /// Apple lifetime in ticks when `ttl_enabled`.
    #[serde(default = "default_apple_lifetime")]
    pub lifetime_ticks: u32,
    /// Segments owed to a snake per apple eaten.
    #[serde(default = "default_apple_growth")]
    pub growth: u32,
}

impl Default for AppleConfig {
    fn default() -> Self {
        Self {
            target_count: default_apple_target(),
            ttl_enabled: true,
            lifetime_ticks: default_apple_lifetime(),
            growth: default_apple_growth(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_apple_target() -> usize {
    20
}
fn default_apple_lifetime() -> u32 {
    150
}
fn default_apple_growth() -> u32 {
    3
}

/// Speed boost configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BoostConfig {
    #[serde(default = "default_boost_duration")]
    pub duration_ticks: u32,
    /// Gate re-activation behind `cooldown_ticks`.
    #[serde(default = "default_true")]
    pub cooldown_enabled: bool,
    #[serde(default = "default_boost_cooldown")]
    pub cooldown_ticks: u32,
    /// Minimum body length to activate.
    #[serde(default = "default_boost_min_length")]
    pub min_length: usize,
    /// Segments lost per boosted tick.
    #[serde(default = "default_boost_shrink")]
    pub shrink_per_tick: usize,
    /// Boost shrink never takes a body below this length.
    #[serde(default = "default_boost_min_body")]
    pub min_body_length: usize,
    /// Movement steps per tick while boosted.
    #[serde(default = "default_boost_steps")]
    pub steps_per_tick: usize,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            duration_ticks: default_boost_duration(),
            cooldown_enabled: true,
            cooldown_ticks: default_boost_cooldown(),
            min_length: default_boost_min_length(),
            shrink_per_tick: default_boost_shrink(),
            min_body_length: default_boost_min_body(),
            steps_per_tick: default_boost_steps(),
        }
    }
}

fn default_boost_duration() -> u32 {
    20
}
fn default_boost_cooldown() -> u32 {
    75
}
fn default_boost_min_length() -> usize {
    5
}
fn default_boost_shrink() -> usize {
    2
}
fn default_boost_min_body() -> usize {
    2
}
fn default_boost_steps() -> usize {
    2
}

/// Player configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayerConfig {
    #[serde(default = "default_max_nick_length")]
    pub max_nick_length: usize,
    /// Keep the accumulated score across `restart`.
    #[serde(default)]
    pub keep_score_on_restart: bool,
    /// Number of leaderboard rows.
    #[serde(default = "default_leaderboard_size")]
    pub leaderboard_size: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            max_nick_length: default_max_nick_length(),
            keep_score_on_restart: false,
            leaderboard_size: default_leaderboard_size(),
        }
    }
}

fn default_max_nick_length() -> usize {
    30
}
fn default_leaderboard_size() -> usize {
    10
}

/// A portal pair as written in `config.toml`.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct PortalConfig {
    pub entry: Coord,
    pub exit: Coord,
}

impl From<PortalConfig> for Portal {
    fn from(p: PortalConfig) -> Self {
        Portal { entry: p.entry, exit: p.exit }
    }
}

fn default_portals() -> Vec<PortalConfig> {
    vec![
        PortalConfig { entry: Coord::new(10, 10), exit: Coord::new(50, 50) },
        PortalConfig { entry: Coord::new(30, 20), exit: Coord::new(70, 60) },
    ]
}
