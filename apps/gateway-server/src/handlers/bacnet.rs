//! BACnet 发现
//!
//! - POST /api/bacnet/discover

use crate::AppState;
use crate::utils::response::{bad_request_error, upstream_unavailable_error};
use api_contract::{ApiResponse, DiscoverRequest, DiscoveredDeviceDto};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::device::DEFAULT_BACNET_PORT;
use gateway_config::MAX_BACNET_DISCOVERY_SECONDS;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// 向目标地址（默认本地广播）发送 Who-Is，收集时限内的 I-Am 应答。
pub async fn discover_devices(
    State(state): State<AppState>,
    Json(req): Json<DiscoverRequest>,
) -> Response {
    let target = match parse_target(req.target.as_deref()) {
        Ok(target) => target,
        Err(message) => return bad_request_error(message),
    };
    let timeout = req
        .timeout_seconds
        .map(Duration::from_secs)
        .unwrap_or(state.discovery_timeout)
        .min(Duration::from_secs(MAX_BACNET_DISCOVERY_SECONDS));

    match gateway_protocol::discover(target, timeout).await {
        Ok(devices) => {
            let data: Vec<DiscoveredDeviceDto> = devices
                .into_iter()
                .map(|device| DiscoveredDeviceDto {
                    device_id: device.device_id,
                    address: device.address.to_string(),
                    max_apdu: device.max_apdu,
                    segmentation: device.segmentation,
                    vendor_id: device.vendor_id,
                })
                .collect();
            (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
        }
        Err(err) => upstream_unavailable_error(err.to_string()),
    }
}

/// 接受 `ip`、`ip:port` 或空（广播）。
fn parse_target(target: Option<&str>) -> Result<SocketAddr, String> {
    let Some(target) = target.map(str::trim).filter(|target| !target.is_empty()) else {
        return Ok(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::BROADCAST),
            DEFAULT_BACNET_PORT,
        ));
    };
    if let Ok(addr) = target.parse::<SocketAddr>() {
        return Ok(addr);
    }
    target
        .parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, DEFAULT_BACNET_PORT))
        .map_err(|_| format!("invalid discovery target: {target}"))
}

#[cfg(test)]
mod tests {
    use super::parse_target;

    #[test]
    fn target_defaults_to_broadcast() {
        assert_eq!(
            parse_target(None).expect("target").to_string(),
            "255.255.255.255:47808"
        );
        assert_eq!(
            parse_target(Some("  ")).expect("target").to_string(),
            "255.255.255.255:47808"
        );
    }

    #[test]
    fn target_accepts_ip_with_or_without_port() {
        assert_eq!(
            parse_target(Some("192.168.1.255")).expect("target").to_string(),
            "192.168.1.255:47808"
        );
        assert_eq!(
            parse_target(Some("10.0.0.7:47809")).expect("target").to_string(),
            "10.0.0.7:47809"
        );
        assert!(parse_target(Some("not-an-address")).is_err());
    }
}
