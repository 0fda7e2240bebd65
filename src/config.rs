use std::path::PathBuf;

use rand::Rng;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub live_data_dir: PathBuf,
    pub archive_dir: PathBuf,
    /// Log file the game server writes inside the live data directory.
    pub logs_path: PathBuf,
    pub image: String,
    pub container_name: String,
    pub network_name: String,
    pub memory_gib: i64,
    pub game_port: u16,
    pub container_env: Vec<String>,
    pub bucket: Option<String>,
    pub bucket_region: Option<String>,
    pub max_concurrent_transfers: usize,
    pub max_upload_bytes: usize,
    pub log_level: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        // Chosen once per process so repeated starts reuse the same network
        // name unless reconfigured.
        let network_name = std::env::var("NETWORK_NAME").unwrap_or_else(|_| {
            format!("gamenet-{}", rand::thread_rng().gen_range(0..10_000))
        });

        let live_data_dir = PathBuf::from(
            std::env::var("LIVE_DATA_DIR").unwrap_or_else(|_| "serverfiles/gamedata".into()),
        );
        let logs_path = std::env::var("LOGS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| live_data_dir.join("logs/latest.log"));

        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            live_data_dir,
            archive_dir: PathBuf::from(
                std::env::var("ARCHIVE_DIR").unwrap_or_else(|_| "backups".into()),
            ),
            logs_path,
            image: std::env::var("CONTAINER_IMAGE")
                .unwrap_or_else(|_| "itzg/minecraft-server:latest".into()),
            container_name: std::env::var("CONTAINER_NAME")
                .unwrap_or_else(|_| "craftwarden-server".into()),
            network_name,
            memory_gib: std::env::var("MEMORY_GIB")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),
            game_port: std::env::var("GAME_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(25565),
            container_env: std::env::var("CONTAINER_ENV")
                .map(|v| v.split(',').map(str::to_string).collect())
                .unwrap_or_else(|_| vec!["EULA=TRUE".into()]),
            bucket: std::env::var("BACKUPS_BUCKET").ok().filter(|v| !v.is_empty()),
            bucket_region: std::env::var("BUCKET_REGION").ok().filter(|v| !v.is_empty()),
            max_concurrent_transfers: std::env::var("MAX_CONCURRENT_TRANSFERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
            max_upload_bytes: std::env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1 << 30),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
        }
    }
}
