const TCPD_WORKERS: &str = "TCPD_WORKERS";

/// Worker cap from the environment, if set to a positive number
pub fn get_workers() -> Option<usize> {
    let workers_from_env = std::env::var(TCPD_WORKERS);
    workers_from_env
        .ok()
        .and_then(|res| res.parse().ok())
        .filter(|workers| *workers > 0)
}

const TCPD_CONFIG: &str = "TCPD_CONFIG";

pub fn get_config_path() -> Option<String> {
    let path_from_env = std::env::var(TCPD_CONFIG);
    path_from_env.ok().filter(|path| !path.is_empty())
}

/// Serialize a `Duration` as whole milliseconds
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
