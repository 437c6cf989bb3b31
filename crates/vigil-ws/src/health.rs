//! Health check endpoint payload.

use serde::{Deserialize, Serialize};

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always "ok" when the server can answer at all.
    pub status: String,
    /// Seconds since the server was created.
    pub uptime_secs: u64,
    /// Currently connected clients.
    pub connections: usize,
    /// Connections with an installed liveness record.
    pub supervised: usize,
    /// Whether heartbeat supervision is armed.
    pub supervising: bool,
}

/// Build a health snapshot.
#[must_use]
pub fn health_check(
    uptime_secs: u64,
    connections: usize,
    supervised: usize,
    supervising: bool,
) -> HealthResponse {
    HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        connections,
        supervised,
        supervising,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_ok() {
        let resp = health_check(12, 3, 2, true);
        assert_eq!(resp.status, "ok");
        assert_eq!(resp.uptime_secs, 12);
        assert_eq!(resp.connections, 3);
        assert_eq!(resp.supervised, 2);
        assert!(resp.supervising);
    }

    #[test]
    fn serializes_expected_fields() {
        let json = serde_json::to_value(health_check(0, 0, 0, false)).unwrap();
        assert!(json.get("status").is_some());
        assert!(json.get("uptime_secs").is_some());
        assert!(json.get("connections").is_some());
        assert!(json.get("supervised").is_some());
        assert!(json.get("supervising").is_some());
    }
}
