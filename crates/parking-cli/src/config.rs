use std::path::PathBuf;
use std::time::Duration;

/// Console configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database file.
    pub db_path: PathBuf,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing the SCRFD model file.
    pub model_dir: PathBuf,
    /// Upper bound on one presence check; `None` waits for the operator.
    pub gate_timeout: Option<Duration>,
    /// Where to save the last annotated gate frame, if anywhere.
    pub snapshot_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `PARKING_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("parking");

        let db_path = std::env::var("PARKING_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("parking.db"));

        let timeout_secs = env_u64("PARKING_GATE_TIMEOUT_SECS", 30);

        Self {
            db_path,
            camera_device: std::env::var("PARKING_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            model_dir: std::env::var("PARKING_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/usr/share/parking/models")),
            gate_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            snapshot_path: std::env::var("PARKING_SNAPSHOT_PATH")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join("det_10g.onnx")
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
