use std::fmt::{Display, Formatter};
use std::time::Duration;

use chrono::{DateTime, Utc};
use derivative::Derivative;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::time::{timeout, Instant};

use crate::error::SpaResult;
use crate::util::traits::SpaConnector;

/// A decoded answer to the discovery probe.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct DiscoveryResponse {
    pub host: String,
    pub hostname: String,
    pub mac_address: String,
}

impl Display for DiscoveryResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}, MAC: {})",
            self.host, self.hostname, self.mac_address
        )
    }
}

#[derive(Derivative)]
#[derivative(Hash, PartialEq, Eq)]
#[derive(Debug, Clone, Serialize)]
pub struct DeviceIdentifier {
    pub host: String,
    pub mac_address: String,
    pub device_name: String,

    /// When the first response from this device arrived. Not part of the identity.
    #[derivative(Hash = "ignore", PartialEq = "ignore")]
    pub discovered_at: DateTime<Utc>,
}

impl DeviceIdentifier {
    pub fn new(host: String, mac_address: String, device_name: String) -> Self {
        DeviceIdentifier {
            host,
            mac_address,
            device_name,
            discovered_at: Utc::now(),
        }
    }
}

impl From<DiscoveryResponse> for DeviceIdentifier {
    fn from(response: DiscoveryResponse) -> Self {
        DeviceIdentifier::new(response.host, response.mac_address, response.hostname)
    }
}

pub struct Discovery;

impl Discovery {
    /**
    Decodes a response datagram.

    Spas answer with their hostname and MAC address, each terminated by CRLF:
    `BWGSPA\r\n00-15-27-AB-CD-EF\r\n`. Anything else is ignored.
     */
    pub fn decode_discovery_response(data: &[u8], source: &str) -> Option<DiscoveryResponse> {
        let text = std::str::from_utf8(data).ok()?;
        let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());

        let hostname = lines.next()?;
        let mac_address = Self::normalize_mac(lines.next()?)?;

        Some(DiscoveryResponse {
            host: source.to_string(),
            hostname: hostname.to_string(),
            mac_address,
        })
    }

    /// Lower-case, colon separated form of a MAC address given with `-` or `:` separators.
    pub fn normalize_mac(mac: &str) -> Option<String> {
        let parts: Vec<&str> = mac.split(|c| c == '-' || c == ':').collect();
        if parts.len() != 6 {
            return None;
        }
        let mut bytes = Vec::with_capacity(6);
        for part in parts {
            if part.len() != 2 || !part.chars().all(|c| c.is_ascii_hexdigit()) {
                return None;
            }
            bytes.push(u8::from_str_radix(part, 16).ok()?);
        }
        Some(
            bytes
                .iter()
                .map(|byte| format!("{:02x}", byte))
                .collect::<Vec<_>>()
                .join(":"),
        )
    }

    /**
    Finds spas on the local network.

    Returns as soon as the first spa answers when `first_only` is set, otherwise
    collects answers until `given_timeout` elapses or the transport reports that
    nothing else can arrive. Finding nothing is not an error.
     */
    pub async fn find_devices(
        connector: &dyn SpaConnector,
        first_only: bool,
        given_timeout: Duration,
    ) -> SpaResult<Vec<DeviceIdentifier>> {
        let mut transport = connector.open_discovery().await?;
        transport.send_probe().await?;

        let mut discovered_devices = Vec::<DeviceIdentifier>::new();
        let timeout_end = Instant::now() + given_timeout;

        loop {
            if Instant::now() >= timeout_end {
                break;
            }

            let remaining_time = timeout_end - Instant::now();
            match timeout(remaining_time, transport.recv()).await {
                Ok(Ok(Some((received_data, source)))) => {
                    let Some(discovery_response) =
                        Self::decode_discovery_response(&received_data, &source)
                    else {
                        warn!("Ignoring malformed discovery response from {}", source);
                        continue;
                    };
                    // Spas may answer one probe several times.
                    let device = DeviceIdentifier::from(discovery_response);
                    if discovered_devices.contains(&device) {
                        debug!("Found spa {} again, skipping", device.host);
                        continue;
                    }
                    info!(
                        "Found spa {} at {} (MAC: {})",
                        device.device_name, device.host, device.mac_address
                    );
                    discovered_devices.push(device);
                    if first_only {
                        break;
                    }
                }
                Ok(Ok(None)) => {
                    debug!("Discovery transport exhausted");
                    break;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    debug!("Discovery time complete");
                    break;
                }
            }
        }

        Ok(discovered_devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimConnector;
    use crate::util::config::{SimSpaConfig, SimulatorConfig};

    fn fleet(hosts: &[&str]) -> SimulatorConfig {
        SimulatorConfig {
            spas: hosts
                .iter()
                .enumerate()
                .map(|(i, host)| SimSpaConfig {
                    host: host.to_string(),
                    mac_address: format!("00:15:27:00:00:{:02x}", i),
                    ..SimSpaConfig::default()
                })
                .collect(),
            ..SimulatorConfig::default()
        }
    }

    #[test]
    fn test_decode_discovery_response() {
        let response =
            Discovery::decode_discovery_response(b"BWGSPA\r\n00-15-27-AB-CD-EF\r\n", "10.0.0.5")
                .unwrap();
        assert_eq!(response.host, "10.0.0.5");
        assert_eq!(response.hostname, "BWGSPA");
        assert_eq!(response.mac_address, "00:15:27:ab:cd:ef");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Discovery::decode_discovery_response(b"BWGSPA\r\n", "10.0.0.5").is_none());
        assert!(Discovery::decode_discovery_response(b"BWGSPA\r\nnot-a-mac\r\n", "x").is_none());
        assert!(Discovery::decode_discovery_response(&[0xff, 0xfe, 0x00], "x").is_none());
    }

    #[test]
    fn test_normalize_mac_requires_hex_pairs() {
        assert_eq!(
            Discovery::normalize_mac("00-15-27-AB-CD-EF").as_deref(),
            Some("00:15:27:ab:cd:ef")
        );
        assert_eq!(Discovery::normalize_mac("+f-15-27-ab-cd-ef"), None);
        assert_eq!(Discovery::normalize_mac("0x:15:27:ab:cd:ef"), None);
        assert_eq!(Discovery::normalize_mac("00:15:27:ab:cd"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_find_all_devices() {
        let connector = SimConnector::new(fleet(&["10.0.0.5", "10.0.0.6"]));
        let devices = Discovery::find_devices(&connector, false, Duration::from_secs(10))
            .await
            .unwrap();
        let hosts: Vec<&str> = devices.iter().map(|d| d.host.as_str()).collect();
        assert_eq!(hosts, vec!["10.0.0.5", "10.0.0.6"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_find_first_device_only() {
        let connector = SimConnector::new(fleet(&["10.0.0.5", "10.0.0.6"]));
        let devices = Discovery::find_devices(&connector, true, Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(devices.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_find_nothing_is_not_an_error() {
        let connector = SimConnector::new(fleet(&[]));
        let devices = Discovery::find_devices(&connector, false, Duration::from_secs(10))
            .await
            .unwrap();
        assert!(devices.is_empty());
    }

    struct EchoTransport {
        responses: Vec<(Vec<u8>, String)>,
    }

    #[async_trait::async_trait]
    impl crate::util::traits::DiscoveryTransport for EchoTransport {
        async fn send_probe(&mut self) -> SpaResult<()> {
            Ok(())
        }

        async fn recv(&mut self) -> SpaResult<Option<(Vec<u8>, String)>> {
            if self.responses.is_empty() {
                // Nothing else arrives; let the discovery timeout end the search.
                std::future::pending::<()>().await;
            }
            Ok(Some(self.responses.remove(0)))
        }
    }

    struct EchoConnector;

    #[async_trait::async_trait]
    impl SpaConnector for EchoConnector {
        async fn open_discovery(
            &self,
        ) -> SpaResult<Box<dyn crate::util::traits::DiscoveryTransport>> {
            let answer = b"BWGSPA\r\n00-15-27-AB-CD-EF\r\n".to_vec();
            Ok(Box::new(EchoTransport {
                responses: vec![
                    (answer.clone(), "10.0.0.5".to_string()),
                    (b"garbage".to_vec(), "10.0.0.9".to_string()),
                    (answer, "10.0.0.5".to_string()),
                ],
            }))
        }

        fn spa(&self, _host: &str, _mac_address: Option<&str>) -> Box<dyn crate::util::traits::Spa> {
            unimplemented!("discovery only")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_answers_are_reported_once() {
        let started = Instant::now();
        let devices = Discovery::find_devices(&EchoConnector, false, Duration::from_secs(3))
            .await
            .unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].mac_address, "00:15:27:ab:cd:ef");
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_spas_do_not_answer() {
        let mut config = fleet(&["10.0.0.5", "10.0.0.6"]);
        config.spas[0].reachable = false;
        let connector = SimConnector::new(config);
        let devices = Discovery::find_devices(&connector, false, Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].host, "10.0.0.6");
    }
}
