//! HTTP tracker client implementation with query templating and response parsing

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::types::{
    AnnounceRequest, AnnounceResponse, TrackerClient, TrackerClientProvider, TrackerError,
};
use super::udp::UdpTrackerClient;
use crate::announce::AnnounceError;
use crate::config::NetworkConfig;
use crate::seed::ClientProfile;

type BencodeDict<'a> = HashMap<&'a [u8], bencode_rs::Value<'a>>;

const COMPACT_PEER_V4_SIZE: usize = 6;
const COMPACT_PEER_V6_SIZE: usize = 18;

/// HTTP tracker client implementation
pub struct HttpTrackerClient {
    pub(super) announce_url: String,
    pub(super) query_template: Arc<str>,
    pub(super) client: reqwest::Client,
}

impl HttpTrackerClient {
    /// Creates an HTTP tracker client sharing `client`'s connection pool.
    ///
    /// `query_template` is the emulated client's announce query, with
    /// `{placeholder}` tokens substituted per request.
    pub fn new(announce_url: String, query_template: Arc<str>, client: reqwest::Client) -> Self {
        Self {
            announce_url,
            query_template,
            client,
        }
    }

    /// Build announce URL with query parameters
    pub(super) fn build_announce_url(&self, request: &AnnounceRequest) -> String {
        let query = render_query(&self.query_template, request);
        // Private trackers carry a passkey in the announce URL's own query
        let separator = if self.announce_url.contains('?') {
            '&'
        } else {
            '?'
        };
        format!("{}{separator}{query}", self.announce_url)
    }

    fn transport_error(&self, error: &reqwest::Error) -> TrackerError {
        if error.is_timeout() {
            TrackerError::Timeout {
                url: self.announce_url.clone(),
            }
        } else {
            TrackerError::ConnectionFailed {
                url: self.announce_url.clone(),
                reason: error.to_string(),
            }
        }
    }
}

#[async_trait]
impl TrackerClient for HttpTrackerClient {
    /// Announces to the tracker over HTTP GET.
    ///
    /// # Errors
    /// - `TrackerError::ConnectionFailed` / `Timeout` - Network error
    /// - `TrackerError::HttpStatus` - Non-2xx status
    /// - `TrackerError::Protocol` / `FailureReason` - Invalid or rejecting response
    async fn announce(&self, request: AnnounceRequest) -> Result<AnnounceResponse, TrackerError> {
        let url = self.build_announce_url(&request);
        tracing::debug!(
            "Announcing {} to {} (uploaded={})",
            request.event,
            self.announce_url,
            request.uploaded
        );

        let response = self.client.get(&url).send().await.map_err(|e| {
            tracing::warn!("HTTP request to {} failed: {}", self.announce_url, e);
            self.transport_error(&e)
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                "Tracker {} returned error status: {}",
                self.announce_url,
                status
            );
            return Err(TrackerError::HttpStatus {
                url: self.announce_url.clone(),
                status: status.as_u16(),
            });
        }

        let response_bytes = response.bytes().await.map_err(|e| {
            tracing::warn!(
                "Failed to read response body from {}: {}",
                self.announce_url,
                e
            );
            self.transport_error(&e)
        })?;

        parse_announce_response(&response_bytes).inspect_err(|e| {
            tracing::warn!("Failed to parse response from {}: {}", self.announce_url, e);
        })
    }

    fn tracker_url(&self) -> &str {
        &self.announce_url
    }
}

/// Substitutes request values into an announce query template.
///
/// Pairs whose value is `{event}` are dropped for regular announces and
/// pairs whose value is `{ip}` are dropped when no address is reported.
pub(crate) fn render_query(template: &str, request: &AnnounceRequest) -> String {
    let event = request.event.as_query_value();

    template
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let value = pair.split_once('=').map_or("", |(_, value)| value);
            match value {
                "{event}" => event.is_some(),
                "{ip}" => request.ip.is_some(),
                _ => true,
            }
        })
        .map(|pair| {
            pair.replace("{infohash}", &url_encode_bytes(request.info_hash.as_bytes()))
                .replace("{peerid}", &url_encode_bytes(&request.peer_id))
                .replace("{port}", &request.port.to_string())
                .replace("{uploaded}", &request.uploaded.to_string())
                .replace("{downloaded}", &request.downloaded.to_string())
                .replace("{left}", &request.left.to_string())
                .replace("{key}", &urlencoding::encode(&request.key))
                .replace("{numwant}", &request.num_want.to_string())
                .replace("{event}", event.unwrap_or_default())
                .replace(
                    "{ip}",
                    &urlencoding::encode(request.ip.as_deref().unwrap_or_default()),
                )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// URL encode raw bytes for tracker query parameters.
pub(crate) fn url_encode_bytes(bytes: &[u8]) -> String {
    urlencoding::encode_binary(bytes).into_owned()
}

/// Parse compact IPv4 peer list (6 bytes per peer)
///
/// # Errors
/// - `TrackerError::Protocol` - Length is not a multiple of 6
pub(crate) fn parse_compact_peers(peer_bytes: &[u8]) -> Result<Vec<SocketAddr>, TrackerError> {
    if !peer_bytes.len().is_multiple_of(COMPACT_PEER_V4_SIZE) {
        return Err(TrackerError::Protocol {
            message: "Invalid compact peer data length".to_string(),
        });
    }

    Ok(peer_bytes
        .chunks(COMPACT_PEER_V4_SIZE)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            SocketAddr::V4(SocketAddrV4::new(ip, port))
        })
        .collect())
}

/// Parse compact IPv6 peer list (18 bytes per peer)
///
/// # Errors
/// - `TrackerError::Protocol` - Length is not a multiple of 18
pub(crate) fn parse_compact_peers6(peer_bytes: &[u8]) -> Result<Vec<SocketAddr>, TrackerError> {
    if !peer_bytes.len().is_multiple_of(COMPACT_PEER_V6_SIZE) {
        return Err(TrackerError::Protocol {
            message: "Invalid compact IPv6 peer data length".to_string(),
        });
    }

    Ok(peer_bytes
        .chunks(COMPACT_PEER_V6_SIZE)
        .map(|chunk| {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&chunk[..16]);
            let port = u16::from_be_bytes([chunk[16], chunk[17]]);
            SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::from(octets), port, 0, 0))
        })
        .collect())
}

/// Parse the non-compact peer list form (`[{ip, port, peer id}]`)
fn parse_peer_dictionaries(entries: &[bencode_rs::Value<'_>]) -> Vec<SocketAddr> {
    entries
        .iter()
        .filter_map(|entry| {
            let bencode_rs::Value::Dictionary(dict) = entry else {
                return None;
            };
            let ip = match dict.get(b"ip".as_slice()) {
                Some(bencode_rs::Value::Bytes(ip)) => std::str::from_utf8(ip).ok()?,
                _ => return None,
            };
            let port = match dict.get(b"port".as_slice()) {
                Some(bencode_rs::Value::Integer(port)) => u16::try_from(*port).ok()?,
                _ => return None,
            };
            let ip: std::net::IpAddr = ip.parse().ok()?;
            Some(SocketAddr::new(ip, port))
        })
        .collect()
}

fn integer_field(dict: &BencodeDict<'_>, key: &[u8]) -> Option<i64> {
    match dict.get(key) {
        Some(bencode_rs::Value::Integer(value)) => Some(*value),
        _ => None,
    }
}

fn count_field(dict: &BencodeDict<'_>, key: &[u8]) -> u32 {
    integer_field(dict, key)
        .and_then(|value| u32::try_from(value).ok())
        .unwrap_or(0)
}

fn seconds_field(dict: &BencodeDict<'_>, key: &[u8]) -> Option<Duration> {
    integer_field(dict, key).map(|secs| Duration::from_secs(secs.max(0) as u64))
}

/// Parse tracker announce response from bencode data
///
/// # Errors
/// - `TrackerError::Protocol` - Undecodable body or missing `interval`
/// - `TrackerError::FailureReason` - Tracker returned `failure reason`
pub(crate) fn parse_announce_response(
    response_bytes: &[u8],
) -> Result<AnnounceResponse, TrackerError> {
    let parsed = bencode_rs::Value::parse(response_bytes).map_err(|e| TrackerError::Protocol {
        message: format!("Failed to parse tracker response: {e:?}"),
    })?;

    let Some(bencode_rs::Value::Dictionary(dict)) = parsed.first() else {
        return Err(TrackerError::Protocol {
            message: "Invalid tracker response format".to_string(),
        });
    };

    if let Some(bencode_rs::Value::Bytes(failure_reason)) = dict.get(b"failure reason".as_slice())
    {
        return Err(TrackerError::FailureReason {
            reason: String::from_utf8_lossy(failure_reason).into_owned(),
        });
    }

    if let Some(bencode_rs::Value::Bytes(warning)) = dict.get(b"warning message".as_slice()) {
        tracing::warn!("Tracker warning: {}", String::from_utf8_lossy(warning));
    }

    let interval =
        seconds_field(dict, b"interval").ok_or_else(|| TrackerError::Protocol {
            message: "Missing interval in tracker response".to_string(),
        })?;

    let tracker_id = match dict.get(b"tracker id".as_slice()) {
        Some(bencode_rs::Value::Bytes(id_bytes)) => {
            Some(String::from_utf8_lossy(id_bytes).into_owned())
        }
        _ => None,
    };

    let mut peers = match dict.get(b"peers".as_slice()) {
        Some(bencode_rs::Value::Bytes(peer_data)) => parse_compact_peers(peer_data)?,
        Some(bencode_rs::Value::List(entries)) => parse_peer_dictionaries(entries),
        _ => Vec::new(),
    };

    if let Some(bencode_rs::Value::Bytes(peer_data)) = dict.get(b"peers6".as_slice()) {
        peers.extend(parse_compact_peers6(peer_data)?);
    }

    Ok(AnnounceResponse {
        interval,
        min_interval: seconds_field(dict, b"min interval"),
        tracker_id,
        seeders: count_field(dict, b"complete"),
        leechers: count_field(dict, b"incomplete"),
        peers,
    })
}

/// Builds HTTP tracker clients sharing one connection pool.
///
/// `udp://` trackers get the [`UdpTrackerClient`] stub; any other scheme
/// is a configuration error.
pub struct HttpTrackerProvider {
    client: reqwest::Client,
    query_template: Arc<str>,
}

impl HttpTrackerProvider {
    /// Creates the provider for an emulated client profile.
    ///
    /// # Errors
    /// - `AnnounceError::HttpClient` - TLS backend or client builder failure
    pub fn new(profile: &ClientProfile, network: &NetworkConfig) -> Result<Self, AnnounceError> {
        let client = reqwest::Client::builder()
            .timeout(network.tracker_timeout)
            .user_agent(profile.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()
            .map_err(|e| AnnounceError::HttpClient {
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            query_template: Arc::from(profile.query.as_str()),
        })
    }
}

impl TrackerClientProvider for HttpTrackerProvider {
    fn tracker_client(&self, url: &str) -> Result<Arc<dyn TrackerClient>, AnnounceError> {
        let parsed = url::Url::parse(url).map_err(|source| AnnounceError::InvalidTrackerUrl {
            url: url.to_string(),
            source,
        })?;

        match parsed.scheme() {
            "http" | "https" => Ok(Arc::new(HttpTrackerClient::new(
                url.to_string(),
                Arc::clone(&self.query_template),
                self.client.clone(),
            ))),
            "udp" => Ok(Arc::new(UdpTrackerClient::new(url.to_string()))),
            _ => Err(AnnounceError::UnsupportedScheme {
                url: url.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tracker_client_tests {
    use super::*;
    use crate::torrent::InfoHash;
    use crate::torrent::tracker::AnnounceEvent;

    const TEMPLATE: &str = "info_hash={infohash}&peer_id={peerid}&port={port}&uploaded={uploaded}&downloaded={downloaded}&left={left}&corrupt=0&key={key}&event={event}&numwant={numwant}&compact=1&no_peer_id=1";

    fn create_test_client(announce_url: &str) -> HttpTrackerClient {
        HttpTrackerClient::new(
            announce_url.to_string(),
            Arc::from(TEMPLATE),
            reqwest::Client::new(),
        )
    }

    fn create_test_request(event: AnnounceEvent) -> AnnounceRequest {
        AnnounceRequest {
            info_hash: InfoHash::new([0x11; 20]),
            peer_id: *b"-qB4650-abcdefghijkl",
            uploaded: 1000,
            downloaded: 0,
            left: 0,
            event,
            ip: None,
            key: "1A2B3C4D".to_string(),
            port: 6881,
            num_want: 200,
        }
    }

    #[test]
    fn test_build_announce_url() {
        let client = create_test_client("http://tracker.example.com/announce");
        let url = client.build_announce_url(&create_test_request(AnnounceEvent::Started));

        assert!(url.starts_with("http://tracker.example.com/announce?info_hash="));
        assert!(
            url.contains("info_hash=%11%11%11%11%11%11%11%11%11%11%11%11%11%11%11%11%11%11%11%11")
        );
        assert!(url.contains("peer_id=-qB4650-abcdefghijkl"));
        assert!(url.contains("port=6881"));
        assert!(url.contains("uploaded=1000"));
        assert!(url.contains("left=0"));
        assert!(url.contains("key=1A2B3C4D"));
        assert!(url.contains("event=started"));
        assert!(url.contains("numwant=200"));
        assert!(url.ends_with("no_peer_id=1"));
    }

    #[test]
    fn test_regular_announce_omits_event() {
        let client = create_test_client("http://tracker.example.com/announce");
        let url = client.build_announce_url(&create_test_request(AnnounceEvent::Regular));

        assert!(!url.contains("event="));
        assert!(url.contains("&key=1A2B3C4D&numwant=200"));
    }

    #[test]
    fn test_passkey_url_keeps_existing_query() {
        let client = create_test_client("http://tracker.example.com/announce?passkey=abc");
        let url = client.build_announce_url(&create_test_request(AnnounceEvent::Stopped));

        assert!(url.starts_with("http://tracker.example.com/announce?passkey=abc&info_hash="));
        assert!(url.contains("event=stopped"));
    }

    #[test]
    fn test_ip_placeholder() {
        let template = "info_hash={infohash}&ip={ip}&port={port}";
        let mut request = create_test_request(AnnounceEvent::Regular);
        assert!(!render_query(template, &request).contains("ip="));

        request.ip = Some("10.0.0.1".to_string());
        assert!(render_query(template, &request).contains("&ip=10.0.0.1&"));
    }

    #[test]
    fn test_parse_compact_peers_success() {
        let peer_bytes = vec![
            127, 0, 0, 1, 26, 225, // 127.0.0.1:6881
            192, 168, 1, 100, 195, 80, // 192.168.1.100:50000
        ];

        let peers = parse_compact_peers(&peer_bytes).unwrap();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].to_string(), "127.0.0.1:6881");
        assert_eq!(peers[1].to_string(), "192.168.1.100:50000");
    }

    #[test]
    fn test_parse_compact_peers_invalid_length() {
        let result = parse_compact_peers(&[127, 0, 0, 1, 26]);
        assert!(matches!(
            result.unwrap_err(),
            TrackerError::Protocol { message } if message.contains("Invalid compact peer data length")
        ));
    }

    #[test]
    fn test_parse_announce_response_success() {
        let bencode_data =
            b"d8:intervali1800e8:completei10e10:incompletei5e5:peers6:\x7f\x00\x00\x01\x1a\x09e";

        let response = parse_announce_response(bencode_data).unwrap();
        assert_eq!(response.interval, Duration::from_secs(1800));
        assert_eq!(response.seeders, 10);
        assert_eq!(response.leechers, 5);
        assert_eq!(response.peers.len(), 1);
        assert_eq!(response.peers[0].to_string(), "127.0.0.1:6665");
    }

    #[test]
    fn test_parse_announce_response_merges_ipv6_peers() {
        let mut bencode_data = Vec::new();
        bencode_data.extend_from_slice(b"d8:intervali900e5:peers6:\x7f\x00\x00\x01\x1a\xe16:peers618:");
        bencode_data.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        bencode_data.extend_from_slice(&[0x1a, 0xe1]);
        bencode_data.extend_from_slice(b"e");

        let response = parse_announce_response(&bencode_data).unwrap();
        assert_eq!(response.peers.len(), 2);
        assert_eq!(response.peers[1].to_string(), "[::1]:6881");
        assert_eq!(response.swarm(), crate::torrent::Swarm::new(0, 0));
    }

    #[test]
    fn test_parse_announce_response_failure_reason() {
        let result = parse_announce_response(b"d14:failure reason5:errore");
        assert_eq!(
            result.unwrap_err(),
            TrackerError::FailureReason {
                reason: "error".to_string()
            }
        );
    }

    #[test]
    fn test_parse_announce_response_missing_interval() {
        let result = parse_announce_response(b"d8:completei1ee");
        assert!(matches!(result, Err(TrackerError::Protocol { .. })));
    }

    #[test]
    fn test_parse_announce_response_garbage() {
        assert!(parse_announce_response(b"not bencode").is_err());
    }

    #[test]
    fn test_provider_selects_client_by_scheme() {
        let provider = HttpTrackerProvider::new(
            &ClientProfile::default(),
            &NetworkConfig::default(),
        )
        .unwrap();

        let http = provider
            .tracker_client("http://tracker.example.com/announce")
            .unwrap();
        assert_eq!(http.tracker_url(), "http://tracker.example.com/announce");

        let udp = provider
            .tracker_client("udp://tracker.example.com:1337/announce")
            .unwrap();
        assert_eq!(udp.tracker_url(), "udp://tracker.example.com:1337/announce");

        assert!(matches!(
            provider.tracker_client("wss://tracker.example.com"),
            Err(AnnounceError::UnsupportedScheme { .. })
        ));
        assert!(matches!(
            provider.tracker_client("not a url"),
            Err(AnnounceError::InvalidTrackerUrl { .. })
        ));
    }
}
