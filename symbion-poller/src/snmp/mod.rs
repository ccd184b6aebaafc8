//! SNMPv2c GET client
//!
//! One UDP request carrying every metric OID, one response. Varbinds that come
//! back as `noSuchObject`/`noSuchInstance` are left out of the result so the
//! prober can default them.

pub mod ber;

use crate::reading::{MetricValue, RawMetrics};
use crate::source::FetchError;
use ber::{Reader, SnmpCodecError};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::debug;

const VERSION_2C: i64 = 1;
const MAX_DATAGRAM: usize = 65_507;

/// Decoded GetResponse PDU
#[derive(Debug, Clone, PartialEq)]
pub struct GetResponse {
    pub request_id: i32,
    pub error_status: i64,
    pub error_index: i64,
    pub varbinds: Vec<(String, Option<MetricValue>)>,
}

impl GetResponse {
    pub fn into_metrics(self) -> RawMetrics {
        self.varbinds
            .into_iter()
            .filter_map(|(oid, value)| value.map(|v| (oid, v)))
            .collect()
    }
}

/// RFC 3416 error-status names
pub fn error_status_name(status: i64) -> &'static str {
    match status {
        0 => "noError",
        1 => "tooBig",
        2 => "noSuchName",
        3 => "badValue",
        4 => "readOnly",
        5 => "genErr",
        6 => "noAccess",
        7 => "wrongType",
        8 => "wrongLength",
        9 => "wrongEncoding",
        10 => "wrongValue",
        11 => "noCreation",
        12 => "inconsistentValue",
        13 => "resourceUnavailable",
        14 => "commitFailed",
        15 => "undoFailed",
        16 => "authorizationError",
        17 => "notWritable",
        18 => "inconsistentName",
        _ => "unknownError",
    }
}

pub fn encode_get_request(
    community: &str,
    request_id: i32,
    oids: &[&str],
) -> Result<Vec<u8>, SnmpCodecError> {
    let mut bindings = Vec::with_capacity(oids.len() * 16);
    for oid in oids {
        let mut binding = Vec::with_capacity(16);
        ber::encode_oid(oid, &mut binding)?;
        ber::encode_tlv(ber::TAG_NULL, &[], &mut binding);
        ber::encode_tlv(ber::TAG_SEQUENCE, &binding, &mut bindings);
    }

    let mut pdu = Vec::with_capacity(bindings.len() + 16);
    ber::encode_integer(i64::from(request_id), &mut pdu);
    ber::encode_integer(0, &mut pdu);
    ber::encode_integer(0, &mut pdu);
    ber::encode_tlv(ber::TAG_SEQUENCE, &bindings, &mut pdu);

    let mut message = Vec::with_capacity(pdu.len() + community.len() + 16);
    ber::encode_integer(VERSION_2C, &mut message);
    ber::encode_tlv(ber::TAG_OCTET_STRING, community.as_bytes(), &mut message);
    ber::encode_tlv(ber::TAG_GET_REQUEST, &pdu, &mut message);

    let mut out = Vec::with_capacity(message.len() + 4);
    ber::encode_tlv(ber::TAG_SEQUENCE, &message, &mut out);
    Ok(out)
}

pub fn decode_response(buf: &[u8]) -> Result<GetResponse, SnmpCodecError> {
    let mut outer = Reader::new(buf);
    let mut message = Reader::new(outer.expect(ber::TAG_SEQUENCE)?);
    if !outer.is_empty() {
        return Err(SnmpCodecError::TrailingBytes);
    }

    let _version = message.read_integer()?;
    let _community = message.expect(ber::TAG_OCTET_STRING)?;
    let mut pdu = Reader::new(message.expect(ber::TAG_GET_RESPONSE)?);

    let request_id = pdu.read_integer()?;
    let request_id = i32::try_from(request_id).map_err(|_| SnmpCodecError::IntegerOverflow)?;
    let error_status = pdu.read_integer()?;
    let error_index = pdu.read_integer()?;

    let mut list = Reader::new(pdu.expect(ber::TAG_SEQUENCE)?);
    let mut varbinds = Vec::new();
    while !list.is_empty() {
        let mut binding = Reader::new(list.expect(ber::TAG_SEQUENCE)?);
        let oid = ber::decode_oid(binding.expect(ber::TAG_OID)?)?;
        let (tag, content) = binding.read_tlv()?;
        varbinds.push((oid, decode_value(tag, content)?));
    }

    Ok(GetResponse {
        request_id,
        error_status,
        error_index,
        varbinds,
    })
}

fn decode_value(tag: u8, content: &[u8]) -> Result<Option<MetricValue>, SnmpCodecError> {
    let value = match tag {
        ber::TAG_INTEGER => MetricValue::Integer(ber::decode_integer(content)?),
        ber::TAG_OCTET_STRING => MetricValue::Text(String::from_utf8_lossy(content).into_owned()),
        ber::TAG_OID => MetricValue::Text(ber::decode_oid(content)?),
        ber::TAG_IP_ADDRESS => match <[u8; 4]>::try_from(content) {
            Ok(octets) => MetricValue::Text(Ipv4Addr::from(octets).to_string()),
            Err(_) => return Ok(None),
        },
        ber::TAG_COUNTER32 | ber::TAG_GAUGE32 | ber::TAG_TIMETICKS | ber::TAG_COUNTER64 => {
            MetricValue::Unsigned(ber::decode_unsigned(content)?)
        }
        // NULL, Opaque, noSuchObject/noSuchInstance/endOfMibView
        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// UDP SNMPv2c client; one socket per request so concurrent targets never share state
#[derive(Debug)]
pub struct SnmpClient {
    community: String,
    port: u16,
    timeout: Duration,
    next_request_id: AtomicI32,
}

impl SnmpClient {
    pub fn new(community: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            community: community.into(),
            port,
            timeout,
            next_request_id: AtomicI32::new(1),
        }
    }

    pub async fn get(&self, address: &str, oids: &[&str]) -> Result<RawMetrics, FetchError> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed) & 0x7FFF_FFFF;
        let request = encode_get_request(&self.community, request_id, oids)?;

        let peer = tokio::net::lookup_host((address, self.port))
            .await?
            .next()
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no address for {address}"),
                )
            })?;
        let local: SocketAddr = match peer {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(peer).await?;
        socket.send(&request).await?;

        let deadline = tokio::time::Instant::now() + self.timeout;
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let len = tokio::time::timeout_at(deadline, socket.recv(&mut buf))
                .await
                .map_err(|_| FetchError::Timeout)??;
            let response = decode_response(&buf[..len])?;

            if response.request_id != request_id {
                debug!(%address, expected = request_id, got = response.request_id, "ignoring stale SNMP response");
                continue;
            }
            if response.error_status != 0 {
                return Err(FetchError::Rejected {
                    status: error_status_name(response.error_status).to_string(),
                    index: response.error_index,
                });
            }
            return Ok(response.into_metrics());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a GetResponse the way an agent would
    fn response(request_id: i32, error_status: i64, bindings: &[(&str, u8, &[u8])]) -> Vec<u8> {
        let mut list = Vec::new();
        for (oid, tag, content) in bindings {
            let mut binding = Vec::new();
            ber::encode_oid(oid, &mut binding).unwrap();
            ber::encode_tlv(*tag, content, &mut binding);
            ber::encode_tlv(ber::TAG_SEQUENCE, &binding, &mut list);
        }
        let mut pdu = Vec::new();
        ber::encode_integer(i64::from(request_id), &mut pdu);
        ber::encode_integer(error_status, &mut pdu);
        ber::encode_integer(if error_status == 0 { 0 } else { 1 }, &mut pdu);
        ber::encode_tlv(ber::TAG_SEQUENCE, &list, &mut pdu);

        let mut message = Vec::new();
        ber::encode_integer(VERSION_2C, &mut message);
        ber::encode_tlv(ber::TAG_OCTET_STRING, b"public", &mut message);
        ber::encode_tlv(ber::TAG_GET_RESPONSE, &pdu, &mut message);
        let mut out = Vec::new();
        ber::encode_tlv(ber::TAG_SEQUENCE, &message, &mut out);
        out
    }

    #[test]
    fn test_get_request_layout() {
        let request = encode_get_request("public", 7, &["1.3.6.1.2.1.1.3.0"]).unwrap();
        let expected = vec![
            0x30, 0x26, // message
            0x02, 0x01, 0x01, // version v2c
            0x04, 0x06, b'p', b'u', b'b', b'l', b'i', b'c', // community
            0xA0, 0x19, // GetRequest
            0x02, 0x01, 0x07, // request-id
            0x02, 0x01, 0x00, // error-status
            0x02, 0x01, 0x00, // error-index
            0x30, 0x0E, // varbind list
            0x30, 0x0C, // varbind
            0x06, 0x08, 0x2B, 0x06, 0x01, 0x02, 0x01, 0x01, 0x03, 0x00, // sysUpTime.0
            0x05, 0x00, // NULL
        ];
        assert_eq!(request, expected);
    }

    #[test]
    fn test_decode_response_values() {
        let buf = response(
            9,
            0,
            &[
                ("1.3.6.1.2.1.1.1.0", ber::TAG_OCTET_STRING, b"Linux server1"),
                ("1.3.6.1.2.1.1.3.0", ber::TAG_TIMETICKS, &[0x01, 0x00]),
                ("1.3.6.1.4.1.2021.10.1.3.1", ber::TAG_OCTET_STRING, b"0.42"),
                ("1.3.6.1.4.1.2021.11.9.0", ber::TAG_INTEGER, &[0x03]),
                ("1.3.6.1.4.1.2021.9.1.9.1", ber::TAG_NO_SUCH_INSTANCE, &[]),
            ],
        );
        let decoded = decode_response(&buf).unwrap();
        assert_eq!(decoded.request_id, 9);
        assert_eq!(decoded.varbinds.len(), 5);

        let metrics = decoded.into_metrics();
        assert_eq!(metrics.len(), 4);
        assert_eq!(metrics["1.3.6.1.2.1.1.1.0"], MetricValue::Text("Linux server1".into()));
        assert_eq!(metrics["1.3.6.1.2.1.1.3.0"], MetricValue::Unsigned(256));
        assert_eq!(metrics["1.3.6.1.4.1.2021.10.1.3.1"].as_f64(), Some(0.42));
        assert_eq!(metrics["1.3.6.1.4.1.2021.11.9.0"], MetricValue::Integer(3));
        assert!(!metrics.contains_key("1.3.6.1.4.1.2021.9.1.9.1"));
    }

    #[test]
    fn test_decode_rejects_trailing_and_truncated() {
        let mut buf = response(1, 0, &[]);
        buf.push(0x00);
        assert_eq!(decode_response(&buf), Err(SnmpCodecError::TrailingBytes));

        let buf = response(1, 0, &[("1.3.6.1.2.1.1.3.0", ber::TAG_TIMETICKS, &[0x01])]);
        assert_eq!(decode_response(&buf[..buf.len() - 3]), Err(SnmpCodecError::Truncated));
    }

    #[test]
    fn test_error_status_names() {
        assert_eq!(error_status_name(2), "noSuchName");
        assert_eq!(error_status_name(5), "genErr");
        assert_eq!(error_status_name(99), "unknownError");
    }

    #[tokio::test]
    async fn test_get_against_local_agent() {
        let agent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = agent.local_addr().unwrap().port();

        let responder = tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            let (len, peer) = agent.recv_from(&mut buf).await.unwrap();

            // Pull the request-id back out of the GetRequest
            let mut outer = Reader::new(&buf[..len]);
            let mut message = Reader::new(outer.expect(ber::TAG_SEQUENCE).unwrap());
            message.read_integer().unwrap();
            message.expect(ber::TAG_OCTET_STRING).unwrap();
            let mut pdu = Reader::new(message.expect(ber::TAG_GET_REQUEST).unwrap());
            let request_id = pdu.read_integer().unwrap() as i32;

            // A stale datagram first, then the real answer
            let stale = response(request_id.wrapping_add(100), 0, &[]);
            agent.send_to(&stale, peer).await.unwrap();
            let reply = response(
                request_id,
                0,
                &[("1.3.6.1.4.1.2021.4.5.0", ber::TAG_INTEGER, &[0x7F, 0xFF])],
            );
            agent.send_to(&reply, peer).await.unwrap();
        });

        let client = SnmpClient::new("public", port, Duration::from_secs(2));
        let metrics = client
            .get("127.0.0.1", &["1.3.6.1.4.1.2021.4.5.0"])
            .await
            .unwrap();
        assert_eq!(metrics["1.3.6.1.4.1.2021.4.5.0"], MetricValue::Integer(32767));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_get_times_out_without_agent() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = silent.local_addr().unwrap().port();

        let client = SnmpClient::new("public", port, Duration::from_millis(100));
        let result = client.get("127.0.0.1", &["1.3.6.1.2.1.1.3.0"]).await;
        assert!(matches!(result, Err(FetchError::Timeout)));
    }

    #[tokio::test]
    async fn test_error_status_is_rejected() {
        let agent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = agent.local_addr().unwrap().port();

        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            let (_, peer) = agent.recv_from(&mut buf).await.unwrap();
            // First request issued by a fresh client always carries id 1
            let reply = response(1, 5, &[]);
            agent.send_to(&reply, peer).await.unwrap();
        });

        let client = SnmpClient::new("public", port, Duration::from_secs(2));
        let result = client.get("127.0.0.1", &["1.3.6.1.2.1.1.3.0"]).await;
        match result {
            Err(FetchError::Rejected { status, index }) => {
                assert_eq!(status, "genErr");
                assert_eq!(index, 1);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }
}
