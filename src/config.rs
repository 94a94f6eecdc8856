// Application configuration, loaded from environment variables and CLI flags.

use std::path::PathBuf;

use crate::engine::spatial::DEFAULT_CELL_SIZE;
use crate::scheduler::DEFAULT_TICK_INTERVAL_MS;

/// Default idle-shutdown timeout for empty zones: five minutes.
pub const DEFAULT_IDLE_TIMEOUT_MS: i64 = 300_000;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to bind the HTTP status server to.
    pub port: u16,
    /// Directory containing static data JSON files.
    pub data_dir: PathBuf,
    /// Heartbeat period in milliseconds.
    pub tick_interval_ms: u64,
    /// Spatial grid cell size in world units.
    pub cell_size: f32,
    /// How long an empty zone lingers before shutting down.
    pub idle_timeout_ms: i64,
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `PORT` - HTTP status server port (default: 3000)
    /// - `ZONE_DATA_DIR` - Path to the static data directory (default: `data`)
    /// - `ZONE_TICK_INTERVAL_MS` - Heartbeat period (default: 100)
    /// - `ZONE_CELL_SIZE` - Spatial grid cell size (default: 50)
    /// - `ZONE_IDLE_TIMEOUT_MS` - Empty-zone shutdown delay (default: 300000)
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = Self::parse_cli_value(&args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| std::env::var("PORT").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(3000);

        let data_dir = std::env::var("ZONE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));

        let tick_interval_ms = std::env::var("ZONE_TICK_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TICK_INTERVAL_MS);

        let cell_size = std::env::var("ZONE_CELL_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_CELL_SIZE);

        let idle_timeout_ms = std::env::var("ZONE_IDLE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_IDLE_TIMEOUT_MS);

        Config {
            port,
            data_dir,
            tick_interval_ms,
            cell_size,
            idle_timeout_ms,
        }
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}
