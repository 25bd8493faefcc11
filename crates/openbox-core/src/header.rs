//! Header fields and exact-match predicates

use crate::error::GraphValidationError;
use crate::packet::PacketHeaders;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Matchable header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HeaderField {
    EthSrc,
    EthDst,
    EthType,
    IpProto,
    Ipv4Src,
    Ipv4Dst,
    TcpSrc,
    TcpDst,
    UdpSrc,
    UdpDst,
}

impl HeaderField {
    /// Value kind this field carries
    fn kind(self) -> ValueKind {
        match self {
            Self::EthSrc | Self::EthDst => ValueKind::Mac,
            Self::EthType => ValueKind::EtherType,
            Self::IpProto => ValueKind::Proto,
            Self::Ipv4Src | Self::Ipv4Dst => ValueKind::Ipv4,
            Self::TcpSrc | Self::TcpDst | Self::UdpSrc | Self::UdpDst => ValueKind::Port,
        }
    }

    /// Read the field from parsed headers
    pub fn extract(self, h: &PacketHeaders) -> Option<HeaderValue> {
        match self {
            Self::EthSrc => h.eth_src.map(HeaderValue::Mac),
            Self::EthDst => h.eth_dst.map(HeaderValue::Mac),
            Self::EthType => h.eth_type.map(HeaderValue::EtherType),
            Self::IpProto => h.ip_proto.map(HeaderValue::Proto),
            Self::Ipv4Src => h.ipv4_src.map(HeaderValue::Ipv4),
            Self::Ipv4Dst => h.ipv4_dst.map(HeaderValue::Ipv4),
            Self::TcpSrc => h.tcp_src.map(HeaderValue::Port),
            Self::TcpDst => h.tcp_dst.map(HeaderValue::Port),
            Self::UdpSrc => h.udp_src.map(HeaderValue::Port),
            Self::UdpDst => h.udp_dst.map(HeaderValue::Port),
        }
    }
}

impl fmt::Display for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::EthSrc => "ETH_SRC",
            Self::EthDst => "ETH_DST",
            Self::EthType => "ETH_TYPE",
            Self::IpProto => "IP_PROTO",
            Self::Ipv4Src => "IPV4_SRC",
            Self::Ipv4Dst => "IPV4_DST",
            Self::TcpSrc => "TCP_SRC",
            Self::TcpDst => "TCP_DST",
            Self::UdpSrc => "UDP_SRC",
            Self::UdpDst => "UDP_DST",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Mac,
    EtherType,
    Proto,
    Ipv4,
    Port,
}

/// Typed header value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderValue {
    Mac([u8; 6]),
    EtherType(u16),
    Proto(u8),
    Ipv4(Ipv4Addr),
    Port(u16),
}

impl HeaderValue {
    fn kind(&self) -> ValueKind {
        match self {
            Self::Mac(_) => ValueKind::Mac,
            Self::EtherType(_) => ValueKind::EtherType,
            Self::Proto(_) => ValueKind::Proto,
            Self::Ipv4(_) => ValueKind::Ipv4,
            Self::Port(_) => ValueKind::Port,
        }
    }
}

/// Transport-layer port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportPort(pub u16);

impl From<TransportPort> for HeaderValue {
    fn from(p: TransportPort) -> Self {
        Self::Port(p.0)
    }
}

impl From<Ipv4Addr> for HeaderValue {
    fn from(ip: Ipv4Addr) -> Self {
        Self::Ipv4(ip)
    }
}

impl From<[u8; 6]> for HeaderValue {
    fn from(mac: [u8; 6]) -> Self {
        Self::Mac(mac)
    }
}

/// Conjunction of exact field matches. Empty matches every packet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawHeaderMatch")]
pub struct HeaderMatch {
    fields: Vec<(HeaderField, HeaderValue)>,
}

/// Unchecked wire form, validated through [`HeaderMatchBuilder`]
#[derive(Deserialize)]
struct RawHeaderMatch {
    fields: Vec<(HeaderField, HeaderValue)>,
}

impl TryFrom<RawHeaderMatch> for HeaderMatch {
    type Error = GraphValidationError;

    fn try_from(raw: RawHeaderMatch) -> Result<Self, Self::Error> {
        raw.fields
            .into_iter()
            .fold(HeaderMatch::builder(), |b, (field, value)| b.exact(field, value))
            .build()
    }
}

impl HeaderMatch {
    pub fn builder() -> HeaderMatchBuilder {
        HeaderMatchBuilder::default()
    }

    /// Wildcard match
    pub fn any() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_catch_all(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[(HeaderField, HeaderValue)] {
        &self.fields
    }

    /// True when every field is present in the headers with the given value
    #[inline]
    pub fn matches(&self, headers: &PacketHeaders) -> bool {
        self.fields
            .iter()
            .all(|(field, value)| field.extract(headers).as_ref() == Some(value))
    }
}

/// Builder for [`HeaderMatch`]
#[derive(Debug, Default)]
pub struct HeaderMatchBuilder {
    fields: Vec<(HeaderField, HeaderValue)>,
}

impl HeaderMatchBuilder {
    /// Require `field == value`. Setting a field twice keeps the last value.
    pub fn exact(mut self, field: HeaderField, value: impl Into<HeaderValue>) -> Self {
        let value = value.into();
        self.fields.retain(|(f, _)| *f != field);
        self.fields.push((field, value));
        self
    }

    pub fn build(mut self) -> Result<HeaderMatch, GraphValidationError> {
        for (field, value) in &self.fields {
            if field.kind() != value.kind() {
                return Err(GraphValidationError::InvalidMatch(format!(
                    "{} cannot hold {:?}",
                    field, value
                )));
            }
        }
        self.fields.sort_by_key(|(f, _)| *f);
        Ok(HeaderMatch { fields: self.fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketBuilder;

    #[test]
    fn test_exact_match() {
        let m = HeaderMatch::builder()
            .exact(HeaderField::TcpSrc, TransportPort(80))
            .build()
            .unwrap();

        let http = PacketBuilder::tcp().src_port(80).build();
        let other = PacketBuilder::tcp().src_port(8080).build();
        let udp = PacketBuilder::udp().src_port(80).build();

        assert!(m.matches(http.headers()));
        assert!(!m.matches(other.headers()));
        assert!(!m.matches(udp.headers()));
    }

    #[test]
    fn test_conjunction() {
        let m = HeaderMatch::builder()
            .exact(HeaderField::TcpDst, TransportPort(22))
            .exact(HeaderField::Ipv4Src, Ipv4Addr::new(192, 168, 1, 1))
            .build()
            .unwrap();

        let hit = PacketBuilder::tcp().dst_port(22).build();
        let miss = PacketBuilder::tcp().dst_port(22).src_ip(Ipv4Addr::new(1, 1, 1, 1)).build();

        assert!(m.matches(hit.headers()));
        assert!(!m.matches(miss.headers()));
    }

    #[test]
    fn test_wildcard() {
        let m = HeaderMatch::builder().build().unwrap();
        assert!(m.is_catch_all());
        assert!(m.matches(&PacketHeaders::default()));
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let err = HeaderMatch::builder()
            .exact(HeaderField::Ipv4Src, TransportPort(80))
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphValidationError::InvalidMatch(_)));
    }

    #[test]
    fn test_deserialize_checks_kinds() {
        let port = HeaderMatch::builder()
            .exact(HeaderField::TcpSrc, TransportPort(80))
            .build()
            .unwrap();
        let json = serde_json::to_value(&port).unwrap();
        assert_eq!(serde_json::from_value::<HeaderMatch>(json.clone()).unwrap(), port);

        let mut wrong = json;
        wrong["fields"][0][0] = serde_json::to_value(HeaderField::Ipv4Src).unwrap();
        let err = serde_json::from_value::<HeaderMatch>(wrong).unwrap_err();
        assert!(err.to_string().contains("invalid header match"));
    }
}
