use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the UNIX epoch. Peer liveness, pending-ACK timestamps
/// and route freshness are all tracked on this clock.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time is before UNIX epoch")
        .as_millis() as u64
}
