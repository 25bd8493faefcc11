//! Packets
//!
//! Owned, cheaply clonable frames with their L2-L4 header fields extracted
//! once at construction. Parsing is lenient: fields a frame does not carry
//! are simply absent, so classification never fails on short or non-IP
//! frames.

use bytes::Bytes;
use std::net::Ipv4Addr;

const ETH_HEADER_LEN: usize = 14;
const ETHERTYPE_IPV4: u16 = 0x0800;
const IPPROTO_TCP: u8 = 6;
const IPPROTO_UDP: u8 = 17;
const UDP_HEADER_LEN: usize = 8;
const TCP_MIN_HEADER_LEN: usize = 20;

/// Parsed header fields of a frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketHeaders {
    pub eth_src: Option<[u8; 6]>,
    pub eth_dst: Option<[u8; 6]>,
    pub eth_type: Option<u16>,
    pub ip_proto: Option<u8>,
    pub ipv4_src: Option<Ipv4Addr>,
    pub ipv4_dst: Option<Ipv4Addr>,
    pub tcp_src: Option<u16>,
    pub tcp_dst: Option<u16>,
    pub udp_src: Option<u16>,
    pub udp_dst: Option<u16>,
    /// Offset of the L4 payload, if the frame carries TCP or UDP
    pub payload_offset: Option<usize>,
}

impl PacketHeaders {
    /// Extract Ethernet, IPv4 and TCP/UDP fields
    pub fn parse(data: &[u8]) -> Self {
        let mut h = Self::default();
        if data.len() < ETH_HEADER_LEN {
            return h;
        }

        let mut dst = [0u8; 6];
        let mut src = [0u8; 6];
        dst.copy_from_slice(&data[0..6]);
        src.copy_from_slice(&data[6..12]);
        let ethertype = u16::from_be_bytes([data[12], data[13]]);
        h.eth_dst = Some(dst);
        h.eth_src = Some(src);
        h.eth_type = Some(ethertype);

        if ethertype != ETHERTYPE_IPV4 || data.len() < ETH_HEADER_LEN + 20 {
            return h;
        }

        let l3 = ETH_HEADER_LEN;
        let ihl = ((data[l3] & 0x0F) as usize) * 4;
        if ihl < 20 {
            return h;
        }
        let protocol = data[l3 + 9];
        h.ip_proto = Some(protocol);
        h.ipv4_src = Some(Ipv4Addr::new(data[l3 + 12], data[l3 + 13], data[l3 + 14], data[l3 + 15]));
        h.ipv4_dst = Some(Ipv4Addr::new(data[l3 + 16], data[l3 + 17], data[l3 + 18], data[l3 + 19]));

        let l4 = l3 + ihl;
        if l4 + 4 > data.len() {
            return h;
        }
        let src_port = u16::from_be_bytes([data[l4], data[l4 + 1]]);
        let dst_port = u16::from_be_bytes([data[l4 + 2], data[l4 + 3]]);

        match protocol {
            IPPROTO_TCP => {
                h.tcp_src = Some(src_port);
                h.tcp_dst = Some(dst_port);
                if l4 + 13 <= data.len() {
                    let doff = ((data[l4 + 12] >> 4) as usize) * 4;
                    let doff = doff.max(TCP_MIN_HEADER_LEN);
                    h.payload_offset = Some((l4 + doff).min(data.len()));
                }
            }
            IPPROTO_UDP => {
                h.udp_src = Some(src_port);
                h.udp_dst = Some(dst_port);
                h.payload_offset = Some((l4 + UDP_HEADER_LEN).min(data.len()));
            }
            _ => {}
        }

        h
    }
}

/// A frame flowing through the processing graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    data: Bytes,
    headers: PacketHeaders,
}

impl Packet {
    /// Wrap raw frame bytes
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let headers = PacketHeaders::parse(&data);
        Self { data, headers }
    }

    /// Whole frame
    #[inline(always)]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Shared handle to the frame bytes
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    #[inline(always)]
    pub fn headers(&self) -> &PacketHeaders {
        &self.headers
    }

    /// L4 payload for TCP/UDP frames, the whole frame otherwise
    #[inline]
    pub fn payload(&self) -> &[u8] {
        match self.headers.payload_offset {
            Some(off) => &self.data[off..],
            None => &self.data,
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Transport protocol used by [`PacketBuilder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transport {
    Tcp,
    Udp,
}

/// Builds Ethernet/IPv4/TCP|UDP frames, used for replay fixtures and tests.
#[derive(Debug, Clone)]
pub struct PacketBuilder {
    transport: Transport,
    eth_src: [u8; 6],
    eth_dst: [u8; 6],
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    payload: Vec<u8>,
}

impl PacketBuilder {
    pub fn tcp() -> Self {
        Self::with_transport(Transport::Tcp)
    }

    pub fn udp() -> Self {
        Self::with_transport(Transport::Udp)
    }

    fn with_transport(transport: Transport) -> Self {
        Self {
            transport,
            eth_src: [0x02, 0, 0, 0, 0, 0x01],
            eth_dst: [0x02, 0, 0, 0, 0, 0x02],
            src_ip: Ipv4Addr::new(192, 168, 1, 1),
            dst_ip: Ipv4Addr::new(10, 0, 0, 1),
            src_port: 12345,
            dst_port: 443,
            payload: Vec::new(),
        }
    }

    pub fn eth_src(mut self, mac: [u8; 6]) -> Self {
        self.eth_src = mac;
        self
    }

    pub fn eth_dst(mut self, mac: [u8; 6]) -> Self {
        self.eth_dst = mac;
        self
    }

    pub fn src_ip(mut self, ip: Ipv4Addr) -> Self {
        self.src_ip = ip;
        self
    }

    pub fn dst_ip(mut self, ip: Ipv4Addr) -> Self {
        self.dst_ip = ip;
        self
    }

    pub fn src_port(mut self, port: u16) -> Self {
        self.src_port = port;
        self
    }

    pub fn dst_port(mut self, port: u16) -> Self {
        self.dst_port = port;
        self
    }

    pub fn payload(mut self, payload: impl AsRef<[u8]>) -> Self {
        self.payload = payload.as_ref().to_vec();
        self
    }

    pub fn build(self) -> Packet {
        let (proto, l4_len) = match self.transport {
            Transport::Tcp => (IPPROTO_TCP, TCP_MIN_HEADER_LEN),
            Transport::Udp => (IPPROTO_UDP, UDP_HEADER_LEN),
        };
        let ip_total = (20 + l4_len + self.payload.len()) as u16;

        let mut frame = Vec::with_capacity(ETH_HEADER_LEN + ip_total as usize);

        // Ethernet
        frame.extend_from_slice(&self.eth_dst);
        frame.extend_from_slice(&self.eth_src);
        frame.extend_from_slice(&ETHERTYPE_IPV4.to_be_bytes());

        // IPv4, no options, checksum left zero
        frame.push(0x45);
        frame.push(0x00);
        frame.extend_from_slice(&ip_total.to_be_bytes());
        frame.extend_from_slice(&[0x00, 0x00, 0x40, 0x00]);
        frame.push(64);
        frame.push(proto);
        frame.extend_from_slice(&[0x00, 0x00]);
        frame.extend_from_slice(&self.src_ip.octets());
        frame.extend_from_slice(&self.dst_ip.octets());

        // L4
        frame.extend_from_slice(&self.src_port.to_be_bytes());
        frame.extend_from_slice(&self.dst_port.to_be_bytes());
        match self.transport {
            Transport::Tcp => {
                frame.extend_from_slice(&[0u8; 8]); // seq, ack
                frame.push(0x50); // data offset 5
                frame.push(0x18); // PSH|ACK
                frame.extend_from_slice(&[0u8; 6]);
            }
            Transport::Udp => {
                frame.extend_from_slice(&((UDP_HEADER_LEN + self.payload.len()) as u16).to_be_bytes());
                frame.extend_from_slice(&[0x00, 0x00]);
            }
        }

        frame.extend_from_slice(&self.payload);
        Packet::new(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp() {
        let pkt = PacketBuilder::tcp().src_port(80).dst_port(5555).payload(b"GET /").build();
        let h = pkt.headers();

        assert_eq!(h.eth_type, Some(ETHERTYPE_IPV4));
        assert_eq!(h.ip_proto, Some(IPPROTO_TCP));
        assert_eq!(h.ipv4_src, Some(Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(h.tcp_src, Some(80));
        assert_eq!(h.tcp_dst, Some(5555));
        assert_eq!(h.udp_src, None);
        assert_eq!(pkt.payload(), b"GET /");
    }

    #[test]
    fn test_parse_udp() {
        let pkt = PacketBuilder::udp().src_port(53).dst_port(5353).payload(b"dns").build();
        let h = pkt.headers();

        assert_eq!(h.udp_src, Some(53));
        assert_eq!(h.tcp_src, None);
        assert_eq!(pkt.payload(), b"dns");
    }

    #[test]
    fn test_short_frame_has_no_fields() {
        let pkt = Packet::new(&b"hello"[..]);
        assert_eq!(*pkt.headers(), PacketHeaders::default());
        assert_eq!(pkt.payload(), b"hello");
    }

    #[test]
    fn test_truncated_ipv4() {
        let full = PacketBuilder::tcp().build();
        let pkt = Packet::new(full.data()[..30].to_vec());
        let h = pkt.headers();

        assert_eq!(h.eth_type, Some(ETHERTYPE_IPV4));
        assert_eq!(h.ip_proto, None);
        assert_eq!(h.tcp_src, None);
    }
}
