//! Binary wire format for discovery and transfer messages.
//!
//! All frames share a common prefix that separates lanperf traffic from
//! unrelated datagrams arriving on the same ports:
//!
//! ```text
//! ┌──────────────┬──────────────┬─────────────────────────────┐
//! │ Magic cookie │ Message type │      type-specific body     │
//! │  (4 bytes)   │   (1 byte)   │                             │
//! └──────────────┴──────────────┴─────────────────────────────┘
//! ```
//!
//! - **Offer** (`0x2`): `u16 udp_port, u16 tcp_port`, broadcast by the server.
//! - **Request** (`0x3`): `u64 transfer_size`, sent by a client to start a
//!   transfer, over TCP and UDP alike.
//! - **Payload segment** (`0x4`): `u64 total_segments, u64 segment_index`
//!   followed by up to one segment's worth of payload bytes.
//!
//! All integers are big-endian with no padding. Decoding never fails loudly:
//! a frame that is too short, carries the wrong cookie, or the wrong type tag
//! decodes to `None` and the caller drops it. Foreign traffic on these ports
//! is expected.

use serde::{Deserialize, Serialize};

/// Magic cookie identifying lanperf frames.
pub const MAGIC_COOKIE: u32 = 0xABCD_DCBA;

/// Type tag for an offer frame.
pub const OFFER_TYPE: u8 = 0x2;
/// Type tag for a request frame.
pub const REQUEST_TYPE: u8 = 0x3;
/// Type tag for a payload segment frame.
pub const PAYLOAD_TYPE: u8 = 0x4;

/// Server announcement broadcast on the discovery port.
///
/// Carries the two service ports a client needs to run transfers against the
/// sender. The sender's address is taken from the datagram source, not the
/// frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    /// UDP transfer port the server listens on
    pub udp_port: u16,
    /// TCP transfer port the server listens on
    pub tcp_port: u16,
}

impl Offer {
    /// Encoded size in bytes: cookie + type + two ports.
    pub const SIZE: usize = 9;

    /// Serializes the offer to its wire representation.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
        bytes[4] = OFFER_TYPE;
        bytes[5..7].copy_from_slice(&self.udp_port.to_be_bytes());
        bytes[7..9].copy_from_slice(&self.tcp_port.to_be_bytes());
        bytes
    }

    /// Decodes an offer from a received datagram.
    ///
    /// Returns `None` if the buffer is too short, the cookie does not match,
    /// or the type tag is not [`OFFER_TYPE`].
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        let cookie = u32::from_be_bytes(bytes[0..4].try_into().ok()?);
        if cookie != MAGIC_COOKIE || bytes[4] != OFFER_TYPE {
            return None;
        }
        let udp_port = u16::from_be_bytes(bytes[5..7].try_into().ok()?);
        let tcp_port = u16::from_be_bytes(bytes[7..9].try_into().ok()?);
        Some(Self { udp_port, tcp_port })
    }
}

/// Client request to start one transfer of `transfer_size` bytes.
///
/// The same frame is used as the TCP request body and as the UDP request
/// datagram; the receiving socket scopes it, so it carries no session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Number of payload bytes the client wants back
    pub transfer_size: u64,
}

impl Request {
    /// Encoded size in bytes: cookie + type + size.
    pub const SIZE: usize = 13;

    /// Serializes the request to its wire representation.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
        bytes[4] = REQUEST_TYPE;
        bytes[5..13].copy_from_slice(&self.transfer_size.to_be_bytes());
        bytes
    }

    /// Decodes a request, rejecting anything that is not one.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        let cookie = u32::from_be_bytes(bytes[0..4].try_into().ok()?);
        if cookie != MAGIC_COOKIE || bytes[4] != REQUEST_TYPE {
            return None;
        }
        let transfer_size = u64::from_be_bytes(bytes[5..13].try_into().ok()?);
        Some(Self { transfer_size })
    }
}

/// Header of one UDP payload segment.
///
/// Segment indices are 0-based: a transfer of `total_segments` segments
/// carries indices `0..total_segments`. Each segment travels in its own
/// datagram and may be lost, duplicated, or reordered in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Total number of segments in this transfer
    pub total_segments: u64,
    /// 0-based index of this segment
    pub segment_index: u64,
}

impl SegmentHeader {
    /// Encoded size in bytes: cookie + type + total + index.
    pub const SIZE: usize = 21;

    /// Serializes the header to its wire representation.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
        bytes[4] = PAYLOAD_TYPE;
        bytes[5..13].copy_from_slice(&self.total_segments.to_be_bytes());
        bytes[13..21].copy_from_slice(&self.segment_index.to_be_bytes());
        bytes
    }

    /// Decodes a segment header from the front of a datagram.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        let cookie = u32::from_be_bytes(bytes[0..4].try_into().ok()?);
        if cookie != MAGIC_COOKIE || bytes[4] != PAYLOAD_TYPE {
            return None;
        }
        let total_segments = u64::from_be_bytes(bytes[5..13].try_into().ok()?);
        let segment_index = u64::from_be_bytes(bytes[13..21].try_into().ok()?);
        Some(Self {
            total_segments,
            segment_index,
        })
    }
}

/// Builds a complete payload segment datagram: header followed by payload.
pub fn encode_segment(header: SegmentHeader, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(SegmentHeader::SIZE + payload.len());
    frame.extend_from_slice(&header.to_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Splits a datagram into segment header and payload.
///
/// The payload is whatever follows the fixed header; its length is implied by
/// the datagram length. Returns `None` for anything that is not a payload
/// segment.
pub fn parse_segment(frame: &[u8]) -> Option<(SegmentHeader, &[u8])> {
    let header = SegmentHeader::from_bytes(frame)?;
    Some((header, &frame[SegmentHeader::SIZE..]))
}

/// Number of segments needed to carry `transfer_size` bytes in
/// `segment_size`-byte segments: `ceil(transfer_size / segment_size)`.
pub fn segment_count(transfer_size: u64, segment_size: usize) -> u64 {
    transfer_size.div_ceil(segment_size as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_roundtrip() {
        let offer = Offer {
            udp_port: 3000,
            tcp_port: 4000,
        };
        let bytes = offer.to_bytes();
        assert_eq!(bytes.len(), Offer::SIZE);
        let parsed = Offer::from_bytes(&bytes).expect("Failed to parse offer");
        assert_eq!(parsed, offer);
    }

    #[test]
    fn test_offer_wire_layout() {
        let offer = Offer {
            udp_port: 0x1234,
            tcp_port: 0x5678,
        };
        let bytes = offer.to_bytes();
        assert_eq!(&bytes[0..4], &[0xAB, 0xCD, 0xDC, 0xBA]);
        assert_eq!(bytes[4], 0x2);
        assert_eq!(&bytes[5..7], &[0x12, 0x34]);
        assert_eq!(&bytes[7..9], &[0x56, 0x78]);
    }

    #[test]
    fn test_request_roundtrip() {
        let request = Request {
            transfer_size: 1_048_576,
        };
        let parsed = Request::from_bytes(&request.to_bytes()).expect("Failed to parse request");
        assert_eq!(parsed.transfer_size, 1_048_576);
    }

    #[test]
    fn test_segment_roundtrip() {
        let header = SegmentHeader {
            total_segments: 10,
            segment_index: 3,
        };
        let payload = vec![0x41u8; 1024];
        let frame = encode_segment(header, &payload);
        assert_eq!(frame.len(), SegmentHeader::SIZE + 1024);

        let (parsed, body) = parse_segment(&frame).expect("Failed to parse segment");
        assert_eq!(parsed, header);
        assert_eq!(body, &payload[..]);
    }

    #[test]
    fn test_invalid_cookie_rejected() {
        let mut bytes = Offer {
            udp_port: 1,
            tcp_port: 2,
        }
        .to_bytes();
        bytes[0..4].copy_from_slice(&0x1234_5678u32.to_be_bytes());
        assert!(Offer::from_bytes(&bytes).is_none());
    }

    #[test]
    fn test_wrong_type_tag_rejected() {
        // A valid request frame must not decode as an offer, and vice versa.
        let request = Request { transfer_size: 42 }.to_bytes();
        assert!(Offer::from_bytes(&request).is_none());

        let offer = Offer {
            udp_port: 1,
            tcp_port: 2,
        }
        .to_bytes();
        assert!(Request::from_bytes(&offer).is_none());
        assert!(SegmentHeader::from_bytes(&offer).is_none());
    }

    #[test]
    fn test_short_buffer_rejected() {
        assert!(Offer::from_bytes(&[0xAB, 0xCD]).is_none());
        assert!(Request::from_bytes(&[]).is_none());
        assert!(parse_segment(&[0u8; SegmentHeader::SIZE - 1]).is_none());
    }

    #[test]
    fn test_empty_payload_segment() {
        let header = SegmentHeader {
            total_segments: 1,
            segment_index: 0,
        };
        let frame = encode_segment(header, &[]);
        let (_, body) = parse_segment(&frame).expect("Failed to parse segment");
        assert!(body.is_empty());
    }

    #[test]
    fn test_segment_count() {
        assert_eq!(segment_count(10_000, 1024), 10);
        assert_eq!(segment_count(10_240, 1024), 10);
        assert_eq!(segment_count(10_241, 1024), 11);
        assert_eq!(segment_count(1, 1024), 1);
        assert_eq!(segment_count(0, 1024), 0);
    }

    // ============================================================
    // Property-Based Tests
    // ============================================================

    #[cfg(test)]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: any offer survives an encode/decode cycle
            #[test]
            fn prop_offer_roundtrip(udp_port in any::<u16>(), tcp_port in any::<u16>()) {
                let offer = Offer { udp_port, tcp_port };
                let parsed = Offer::from_bytes(&offer.to_bytes());
                prop_assert_eq!(parsed, Some(offer));
            }

            /// Property: any request survives an encode/decode cycle
            #[test]
            fn prop_request_roundtrip(transfer_size in any::<u64>()) {
                let request = Request { transfer_size };
                let parsed = Request::from_bytes(&request.to_bytes());
                prop_assert_eq!(parsed, Some(request));
            }

            /// Property: segment header and payload survive framing
            #[test]
            fn prop_segment_roundtrip(
                total_segments in any::<u64>(),
                segment_index in any::<u64>(),
                payload in proptest::collection::vec(any::<u8>(), 0..2048),
            ) {
                let header = SegmentHeader { total_segments, segment_index };
                let frame = encode_segment(header, &payload);
                let (parsed, body) = parse_segment(&frame).unwrap();
                prop_assert_eq!(parsed, header);
                prop_assert_eq!(body, &payload[..]);
            }

            /// Property: a frame whose cookie differs never decodes
            #[test]
            fn prop_foreign_cookie_rejected(
                cookie in any::<u32>().prop_filter("not the magic cookie", |c| *c != MAGIC_COOKIE),
                rest in proptest::collection::vec(any::<u8>(), 5..64),
            ) {
                let mut frame = cookie.to_be_bytes().to_vec();
                frame.extend_from_slice(&rest);
                prop_assert!(Offer::from_bytes(&frame).is_none());
                prop_assert!(Request::from_bytes(&frame).is_none());
                prop_assert!(SegmentHeader::from_bytes(&frame).is_none());
            }

            /// Property: segment_count is the exact ceiling division
            #[test]
            fn prop_segment_count_ceiling(
                transfer_size in 1u64..1_000_000_000,
                segment_size in 1usize..65536,
            ) {
                let count = segment_count(transfer_size, segment_size);
                let segment_size = segment_size as u64;
                // Enough segments to cover the transfer, with none to spare.
                prop_assert!(count * segment_size >= transfer_size);
                prop_assert!((count - 1) * segment_size < transfer_size);
            }
        }
    }
}
