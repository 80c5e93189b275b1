pub mod mock_http;
pub mod mock_ws;

use std::time::Duration;
use tether_client::AppConfig;
use tether_ws::TransportConfig;

/// Config pointing at the mock servers, with short reconnect and request
/// deadlines so real-time tests stay fast.
pub fn test_config(ws_url: String, http_base_url: String) -> AppConfig {
    AppConfig {
        ws_url,
        http_base_url,
        http_timeout_ms: 2_000,
        transport: TransportConfig {
            reconnect_base_delay_ms: 50,
            reconnect_max_delay_ms: 200,
            request_timeout_ms: 300,
            connect_timeout_ms: 1_000,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
