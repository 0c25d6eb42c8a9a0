//! Environment-driven configuration. Everything has a default except the
//! connection URLs, which are only needed when the Postgres/Redis-backed
//! implementations are wired in.

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    /// Bounded wait to acquire an instrument lock.
    pub lock_wait: Duration,
    /// Maximum lease hold before a crashed holder's lock expires.
    pub lock_hold: Duration,
    /// Price levels in a freshly seeded IPO ladder.
    pub ipo_price_levels: usize,
    /// Ladder spread above the base price, in basis points.
    pub ipo_spread_bps: i64,
    /// Sell orders per ladder level.
    pub ipo_orders_per_level: usize,
    /// Price levels per side in published snapshots.
    pub snapshot_depth: usize,
}

impl Config {
    /// Read configuration from the environment (a `.env` file is honored).
    pub fn from_env() -> Config {
        dotenvy::dotenv().ok();
        Config {
            database_url: env::var("DATABASE_URL").ok(),
            redis_url: env::var("REDIS_URL").ok(),
            lock_wait: Duration::from_secs(env_u64("LOCK_WAIT_SECS", 10)),
            lock_hold: Duration::from_secs(env_u64("LOCK_HOLD_SECS", 30)),
            ipo_price_levels: env_u64("IPO_PRICE_LEVELS", 20) as usize,
            ipo_spread_bps: env_u64("IPO_SPREAD_BPS", 1_500) as i64,
            ipo_orders_per_level: env_u64("IPO_ORDERS_PER_LEVEL", 3) as usize,
            snapshot_depth: env_u64("SNAPSHOT_DEPTH", 10) as usize,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: None,
            redis_url: None,
            lock_wait: Duration::from_secs(10),
            lock_hold: Duration::from_secs(30),
            ipo_price_levels: 20,
            ipo_spread_bps: 1_500,
            ipo_orders_per_level: 3,
            snapshot_depth: 10,
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
