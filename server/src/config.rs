use pong_shared::config::GameConfig;
use std::str::FromStr;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Target room loop rate
    pub tick_rate_hz: u32,
    /// Upper bound on one tick's dt (seconds)
    pub max_dt: f64,
    pub rng_seed: u64,
    /// game_state frames buffered per room before a subscriber skips ahead
    pub broadcast_capacity: usize,
    /// Replies and room events queued per connection before it is dropped
    pub client_queue_capacity: usize,
    /// Inbound text frames above this size close the connection
    pub max_message_bytes: usize,
    /// Malformed inbound frames tolerated before the connection is closed
    pub max_parse_errors: u32,
    pub game: GameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:5000".to_string(),
            tick_rate_hz: 60,
            max_dt: 0.05,
            rng_seed: 42,
            broadcast_capacity: 1024,
            client_queue_capacity: 256,
            max_message_bytes: 1024,
            max_parse_errors: 5,
            game: GameConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `HOST`, `PORT`, `PONG_TICK_RATE_HZ`,
    /// `PONG_MAX_DT`, `PONG_RNG_SEED` and `PONG_MAX_SCORE`. Without a seed
    /// every run gets a fresh one.
    pub fn from_env() -> Self {
        let mut config = Self::from_lookup(|key| std::env::var(key).ok());
        if std::env::var("PONG_RNG_SEED").is_err() {
            config.rng_seed = rand::random();
        }
        config
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_var(&lookup, "PORT").unwrap_or(5000u16);
        config.listen_addr = format!("{host}:{port}");

        if let Some(hz) = parse_var(&lookup, "PONG_TICK_RATE_HZ") {
            config.tick_rate_hz = hz;
        }
        if let Some(max_dt) = parse_var(&lookup, "PONG_MAX_DT") {
            config.max_dt = max_dt;
        }
        if let Some(seed) = parse_var(&lookup, "PONG_RNG_SEED") {
            config.rng_seed = seed;
        }
        if let Some(max_score) = parse_var(&lookup, "PONG_MAX_SCORE") {
            config.game.max_score = max_score;
        }
        config
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate_hz.max(1)))
    }

    /// Validate configuration values. Returns an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_rate_hz == 0 || self.tick_rate_hz > 1000 {
            return Err(format!(
                "tick_rate_hz must be in 1..=1000, got {}",
                self.tick_rate_hz
            ));
        }
        if !self.max_dt.is_finite() || self.max_dt <= 0.0 {
            return Err(format!("max_dt must be finite and > 0, got {}", self.max_dt));
        }
        if self.broadcast_capacity == 0 {
            return Err("broadcast_capacity must be > 0".to_string());
        }
        if self.client_queue_capacity == 0 {
            return Err("client_queue_capacity must be > 0".to_string());
        }
        if self.max_message_bytes == 0 {
            return Err("max_message_bytes must be > 0".to_string());
        }
        if self.max_parse_errors == 0 {
            return Err("max_parse_errors must be > 0".to_string());
        }
        if self.game.max_score == 0 {
            return Err("max_score must be > 0".to_string());
        }
        self.game.validate()
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}
