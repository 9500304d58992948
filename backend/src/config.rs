use common::Gamemode;

#[derive(Debug, Clone, clap::Parser)]
#[command(about = "Accepts, validates and ranks run submissions")]
pub struct Config {
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:3000")]
    pub listen: std::net::SocketAddr,

    /// Accepted replays are written here.
    #[arg(long, env = "UPLOAD_FOLDER", default_value = "uploads/")]
    pub upload_folder: std::path::PathBuf,

    /// JSON array of maps with their zones.
    #[arg(long, env = "MAP_CATALOG", default_value = "maps.json")]
    pub map_catalog: std::path::PathBuf,

    /// Gamemode ids runs are accepted for, all of them if empty.
    #[arg(long, env = "ALLOWED_GAMEMODES", value_delimiter = ',', value_parser = parse_gamemode)]
    pub allowed_gamemodes: Vec<Gamemode>,

    /// How often a submission retries when its leaderboard changed underneath it.
    #[arg(long, env = "MAX_COMMIT_ATTEMPTS", default_value_t = crate::ranks::DEFAULT_MAX_ATTEMPTS)]
    pub max_commit_attempts: u32,

    /// Seconds without updates after which a session is dropped.
    #[arg(long, env = "SESSION_IDLE_TIMEOUT", default_value_t = 3600)]
    pub session_idle_timeout: u64,

    /// Seconds between sweeps for idle sessions.
    #[arg(long, env = "SESSION_SWEEP_INTERVAL", default_value_t = 60)]
    pub session_sweep_interval: u64,

    /// Largest accepted replay in bytes.
    #[arg(long, env = "MAX_REPLAY_SIZE", default_value_t = 100 * 1024 * 1024)]
    pub max_replay_size: usize,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: tracing::Level,
}

fn parse_gamemode(value: &str) -> Result<Gamemode, String> {
    let id: u8 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid gamemode id {:?}: {}", value, e))?;
    Gamemode::try_from(id).map_err(|e| e.to_string())
}

impl Config {
    pub fn allowed_gamemodes(&self) -> Vec<Gamemode> {
        if self.allowed_gamemodes.is_empty() {
            Gamemode::ALL.to_vec()
        } else {
            self.allowed_gamemodes.clone()
        }
    }

    pub fn session_idle_timeout(&self) -> chrono::Duration {
        i64::try_from(self.session_idle_timeout)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn session_sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.session_sweep_interval.max(1))
    }
}
