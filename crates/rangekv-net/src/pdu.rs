//! Protocol data units and their wire layouts.
//!
//! Every PDU starts with a one-byte tag. Layouts are packed, multi-byte
//! integers and IPv4 addresses are big-endian (network order).
//!
//! ```text
//! NET_ALIVE               0    tag
//! NET_GET_NODE            1    tag
//! NET_GET_NODE_RESPONSE   2    tag addr(4) port(2)
//! NET_JOIN                3    tag src_addr(4) src_port(2) max_span(1) max_addr(4) max_port(2)
//! NET_JOIN_RESPONSE       4    tag next_addr(4) next_port(2) start(1) end(1)
//! NET_CLOSE_CONNECTION    5    tag
//! NET_NEW_RANGE           6    tag start(1) end(1)
//! NET_LEAVING             7    tag new_addr(4) new_port(2)
//! NET_NEW_RANGE_RESPONSE  8    tag
//! VAL_INSERT            100    tag id(12) name_len(1) name email_len(1) email
//! VAL_REMOVE            101    tag id(12)
//! VAL_LOOKUP            102    tag id(12) sender_addr(4) sender_port(2)
//! VAL_LOOKUP_RESPONSE   103    tag id(12) name_len(1) name email_len(1) email
//! STUN_LOOKUP           200    tag
//! STUN_RESPONSE         201    tag addr(4)
//! ```
//!
//! Several PDUs may arrive back to back in one datagram; [`Frames`] walks
//! them in order and stops at the first malformed one. On a TCP link a PDU
//! may also straddle two reads, so links feed a [`FrameBuffer`] instead,
//! which holds an incomplete tail until the rest of it arrives.

use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use rangekv_core::{KeyRange, NodeAddr, RecordId, RecordValue, RECORD_ID_LEN};

use crate::error::DecodeError;

/// PDU tag bytes.
pub mod tags {
    pub const NET_ALIVE: u8 = 0;
    pub const NET_GET_NODE: u8 = 1;
    pub const NET_GET_NODE_RESPONSE: u8 = 2;
    pub const NET_JOIN: u8 = 3;
    pub const NET_JOIN_RESPONSE: u8 = 4;
    pub const NET_CLOSE_CONNECTION: u8 = 5;
    pub const NET_NEW_RANGE: u8 = 6;
    pub const NET_LEAVING: u8 = 7;
    pub const NET_NEW_RANGE_RESPONSE: u8 = 8;
    pub const VAL_INSERT: u8 = 100;
    pub const VAL_REMOVE: u8 = 101;
    pub const VAL_LOOKUP: u8 = 102;
    pub const VAL_LOOKUP_RESPONSE: u8 = 103;
    pub const STUN_LOOKUP: u8 = 200;
    pub const STUN_RESPONSE: u8 = 201;
}

/// Encoded sizes of the fixed-layout PDUs, tag included.
pub mod sizes {
    pub const NET_ALIVE: usize = 1;
    pub const NET_GET_NODE: usize = 1;
    pub const NET_GET_NODE_RESPONSE: usize = 7;
    pub const NET_JOIN: usize = 14;
    pub const NET_JOIN_RESPONSE: usize = 9;
    pub const NET_CLOSE_CONNECTION: usize = 1;
    pub const NET_NEW_RANGE: usize = 3;
    pub const NET_LEAVING: usize = 7;
    pub const NET_NEW_RANGE_RESPONSE: usize = 1;
    pub const VAL_REMOVE: usize = 13;
    pub const VAL_LOOKUP: usize = 19;
    pub const STUN_LOOKUP: usize = 1;
    pub const STUN_RESPONSE: usize = 5;
    /// Smallest VAL_INSERT / VAL_LOOKUP_RESPONSE: both fields empty.
    pub const VAL_RECORD_MIN: usize = 15;
}

/// The join request as it travels around the ring.
///
/// `max_span` / `max` accumulate the widest node seen so far; the joiner
/// sends them zeroed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinRequest {
    /// The joining node: its public address and listening port.
    pub src: NodeAddr,
    pub max_span: u8,
    /// Listening identity of the widest node seen so far.
    pub max: NodeAddr,
}

impl JoinRequest {
    pub fn new(src: NodeAddr) -> Self {
        Self {
            src,
            max_span: 0,
            max: NodeAddr::UNSPECIFIED,
        }
    }

    /// Record `who` as the widest node seen so far.
    pub fn claim(self, span: u8, who: NodeAddr) -> Self {
        Self {
            max_span: span,
            max: who,
            ..self
        }
    }
}

/// Protocol data units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pdu {
    /// Liveness announcement to the tracker.
    NetAlive,
    /// Ask the tracker for a live member.
    NetGetNode,
    /// Tracker reply; an unspecified address means the network is empty.
    NetGetNodeResponse { member: NodeAddr },
    NetJoin(JoinRequest),
    /// Sent by the splitting node to the joiner over their new link.
    NetJoinResponse { next: NodeAddr, range: KeyRange },
    NetCloseConnection,
    /// A departing neighbor hands over its whole range.
    NetNewRange { range: KeyRange },
    /// The departing node's predecessor must connect to `next` instead.
    NetLeaving { next: NodeAddr },
    NetNewRangeResponse,
    ValInsert { id: RecordId, value: RecordValue },
    ValRemove { id: RecordId },
    ValLookup { id: RecordId, reply_to: NodeAddr },
    ValLookupResponse { id: RecordId, value: RecordValue },
    /// Ask the tracker for our public address.
    StunLookup,
    StunResponse { addr: Ipv4Addr },
}

impl Pdu {
    pub fn tag(&self) -> u8 {
        match self {
            Pdu::NetAlive => tags::NET_ALIVE,
            Pdu::NetGetNode => tags::NET_GET_NODE,
            Pdu::NetGetNodeResponse { .. } => tags::NET_GET_NODE_RESPONSE,
            Pdu::NetJoin(_) => tags::NET_JOIN,
            Pdu::NetJoinResponse { .. } => tags::NET_JOIN_RESPONSE,
            Pdu::NetCloseConnection => tags::NET_CLOSE_CONNECTION,
            Pdu::NetNewRange { .. } => tags::NET_NEW_RANGE,
            Pdu::NetLeaving { .. } => tags::NET_LEAVING,
            Pdu::NetNewRangeResponse => tags::NET_NEW_RANGE_RESPONSE,
            Pdu::ValInsert { .. } => tags::VAL_INSERT,
            Pdu::ValRemove { .. } => tags::VAL_REMOVE,
            Pdu::ValLookup { .. } => tags::VAL_LOOKUP,
            Pdu::ValLookupResponse { .. } => tags::VAL_LOOKUP_RESPONSE,
            Pdu::StunLookup => tags::STUN_LOOKUP,
            Pdu::StunResponse { .. } => tags::STUN_RESPONSE,
        }
    }

    pub fn name(&self) -> &'static str {
        tag_name(self.tag()).unwrap_or("UNKNOWN")
    }

    /// True for the four `VAL_*` PDUs.
    pub fn is_value(&self) -> bool {
        matches!(
            self,
            Pdu::ValInsert { .. }
                | Pdu::ValRemove { .. }
                | Pdu::ValLookup { .. }
                | Pdu::ValLookupResponse { .. }
        )
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            Pdu::NetAlive => sizes::NET_ALIVE,
            Pdu::NetGetNode => sizes::NET_GET_NODE,
            Pdu::NetGetNodeResponse { .. } => sizes::NET_GET_NODE_RESPONSE,
            Pdu::NetJoin(_) => sizes::NET_JOIN,
            Pdu::NetJoinResponse { .. } => sizes::NET_JOIN_RESPONSE,
            Pdu::NetCloseConnection => sizes::NET_CLOSE_CONNECTION,
            Pdu::NetNewRange { .. } => sizes::NET_NEW_RANGE,
            Pdu::NetLeaving { .. } => sizes::NET_LEAVING,
            Pdu::NetNewRangeResponse => sizes::NET_NEW_RANGE_RESPONSE,
            Pdu::ValInsert { value, .. } | Pdu::ValLookupResponse { value, .. } => {
                1 + RECORD_ID_LEN + value.encoded_len()
            }
            Pdu::ValRemove { .. } => sizes::VAL_REMOVE,
            Pdu::ValLookup { .. } => sizes::VAL_LOOKUP,
            Pdu::StunLookup => sizes::STUN_LOOKUP,
            Pdu::StunResponse { .. } => sizes::STUN_RESPONSE,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut dst);
        dst.freeze()
    }

    pub fn encode_into(&self, dst: &mut BytesMut) {
        dst.put_u8(self.tag());
        match self {
            Pdu::NetAlive
            | Pdu::NetGetNode
            | Pdu::NetCloseConnection
            | Pdu::NetNewRangeResponse
            | Pdu::StunLookup => {}
            Pdu::NetGetNodeResponse { member } => put_addr(dst, member),
            Pdu::NetJoin(request) => {
                put_addr(dst, &request.src);
                dst.put_u8(request.max_span);
                put_addr(dst, &request.max);
            }
            Pdu::NetJoinResponse { next, range } => {
                put_addr(dst, next);
                put_range(dst, range);
            }
            Pdu::NetNewRange { range } => put_range(dst, range),
            Pdu::NetLeaving { next } => put_addr(dst, next),
            Pdu::ValInsert { id, value } | Pdu::ValLookupResponse { id, value } => {
                dst.put_slice(id.as_bytes());
                put_field(dst, value.name());
                put_field(dst, value.email());
            }
            Pdu::ValRemove { id } => dst.put_slice(id.as_bytes()),
            Pdu::ValLookup { id, reply_to } => {
                dst.put_slice(id.as_bytes());
                put_addr(dst, reply_to);
            }
            Pdu::StunResponse { addr } => dst.put_u32(u32::from(*addr)),
        }
    }

    /// Decode one PDU from the front of `buf`.
    ///
    /// Returns the PDU and the number of bytes it occupied. Trailing bytes
    /// are left for the caller.
    pub fn decode(buf: &[u8]) -> Result<(Pdu, usize), DecodeError> {
        let tag = *buf.first().ok_or(DecodeError::Empty)?;
        let name = tag_name(tag).ok_or(DecodeError::UnknownTag(tag))?;
        let mut r = Reader::new(buf, name);
        r.advance(1);

        let pdu = match tag {
            tags::NET_ALIVE => Pdu::NetAlive,
            tags::NET_GET_NODE => Pdu::NetGetNode,
            tags::NET_CLOSE_CONNECTION => Pdu::NetCloseConnection,
            tags::NET_NEW_RANGE_RESPONSE => Pdu::NetNewRangeResponse,
            tags::STUN_LOOKUP => Pdu::StunLookup,
            tags::NET_GET_NODE_RESPONSE => {
                r.require(sizes::NET_GET_NODE_RESPONSE)?;
                Pdu::NetGetNodeResponse { member: r.addr() }
            }
            tags::NET_JOIN => {
                r.require(sizes::NET_JOIN)?;
                let src = r.addr();
                let max_span = r.buf.get_u8();
                let max = r.addr();
                Pdu::NetJoin(JoinRequest { src, max_span, max })
            }
            tags::NET_JOIN_RESPONSE => {
                r.require(sizes::NET_JOIN_RESPONSE)?;
                let next = r.addr();
                let range = r.range()?;
                Pdu::NetJoinResponse { next, range }
            }
            tags::NET_NEW_RANGE => {
                r.require(sizes::NET_NEW_RANGE)?;
                Pdu::NetNewRange { range: r.range()? }
            }
            tags::NET_LEAVING => {
                r.require(sizes::NET_LEAVING)?;
                Pdu::NetLeaving { next: r.addr() }
            }
            tags::VAL_REMOVE => {
                r.require(sizes::VAL_REMOVE)?;
                Pdu::ValRemove { id: r.id() }
            }
            tags::VAL_LOOKUP => {
                r.require(sizes::VAL_LOOKUP)?;
                let id = r.id();
                Pdu::ValLookup { id, reply_to: r.addr() }
            }
            tags::VAL_INSERT | tags::VAL_LOOKUP_RESPONSE => {
                r.require(1 + RECORD_ID_LEN)?;
                let id = r.id();
                let name = r.field()?;
                let email = r.field()?;
                let value = RecordValue::new(name, email)?;
                if tag == tags::VAL_INSERT {
                    Pdu::ValInsert { id, value }
                } else {
                    Pdu::ValLookupResponse { id, value }
                }
            }
            tags::STUN_RESPONSE => {
                r.require(sizes::STUN_RESPONSE)?;
                Pdu::StunResponse {
                    addr: Ipv4Addr::from(r.buf.get_u32()),
                }
            }
            other => return Err(DecodeError::UnknownTag(other)),
        };

        Ok((pdu, r.consumed()))
    }
}

/// Wire name of a known tag.
pub fn tag_name(tag: u8) -> Option<&'static str> {
    Some(match tag {
        tags::NET_ALIVE => "NET_ALIVE",
        tags::NET_GET_NODE => "NET_GET_NODE",
        tags::NET_GET_NODE_RESPONSE => "NET_GET_NODE_RESPONSE",
        tags::NET_JOIN => "NET_JOIN",
        tags::NET_JOIN_RESPONSE => "NET_JOIN_RESPONSE",
        tags::NET_CLOSE_CONNECTION => "NET_CLOSE_CONNECTION",
        tags::NET_NEW_RANGE => "NET_NEW_RANGE",
        tags::NET_LEAVING => "NET_LEAVING",
        tags::NET_NEW_RANGE_RESPONSE => "NET_NEW_RANGE_RESPONSE",
        tags::VAL_INSERT => "VAL_INSERT",
        tags::VAL_REMOVE => "VAL_REMOVE",
        tags::VAL_LOOKUP => "VAL_LOOKUP",
        tags::VAL_LOOKUP_RESPONSE => "VAL_LOOKUP_RESPONSE",
        tags::STUN_LOOKUP => "STUN_LOOKUP",
        tags::STUN_RESPONSE => "STUN_RESPONSE",
        _ => return None,
    })
}

fn put_addr(dst: &mut BytesMut, addr: &NodeAddr) {
    dst.put_u32(u32::from(addr.ip));
    dst.put_u16(addr.port);
}

fn put_range(dst: &mut BytesMut, range: &KeyRange) {
    dst.put_u8(range.start());
    dst.put_u8(range.end());
}

// Field lengths are bounded by RecordValue construction.
fn put_field(dst: &mut BytesMut, field: &[u8]) {
    dst.put_u8(field.len() as u8);
    dst.put_slice(field);
}

/// Bounds-checked cursor over one PDU.
///
/// `require` checks a fixed size up front; the unchecked getters after it
/// cannot run past the end.
struct Reader<'a> {
    buf: &'a [u8],
    total: usize,
    pdu: &'static str,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], pdu: &'static str) -> Self {
        Self {
            buf,
            total: buf.len(),
            pdu,
        }
    }

    fn consumed(&self) -> usize {
        self.total - self.buf.len()
    }

    fn advance(&mut self, n: usize) {
        self.buf.advance(n);
    }

    /// Ensure the PDU, `size` bytes from its tag, is fully present.
    fn require(&self, size: usize) -> Result<(), DecodeError> {
        if self.total < size {
            return Err(DecodeError::Truncated {
                pdu: self.pdu,
                needed: size,
                available: self.total,
            });
        }
        Ok(())
    }

    fn addr(&mut self) -> NodeAddr {
        let ip = Ipv4Addr::from(self.buf.get_u32());
        NodeAddr::new(ip, self.buf.get_u16())
    }

    fn id(&mut self) -> RecordId {
        let mut id = [0u8; RECORD_ID_LEN];
        self.buf.copy_to_slice(&mut id);
        RecordId::from_bytes(id)
    }

    fn range(&mut self) -> Result<KeyRange, DecodeError> {
        let start = self.buf.get_u8();
        let end = self.buf.get_u8();
        KeyRange::new(start, end).map_err(|_| DecodeError::InvalidRange { start, end })
    }

    /// One length-prefixed field.
    fn field(&mut self) -> Result<Bytes, DecodeError> {
        let len = match self.buf.first() {
            Some(len) => *len as usize,
            None => return Err(self.short(1)),
        };
        if self.buf.len() < 1 + len {
            return Err(self.short(1 + len));
        }
        self.buf.advance(1);
        let field = Bytes::copy_from_slice(&self.buf[..len]);
        self.buf.advance(len);
        Ok(field)
    }

    fn short(&self, more: usize) -> DecodeError {
        DecodeError::Truncated {
            pdu: self.pdu,
            needed: self.consumed() + more,
            available: self.total,
        }
    }
}

/// Iterator over the PDUs packed into one read.
///
/// Yields every well-formed PDU in order. The first malformed one is
/// yielded as an error and ends the iteration; the rest of the buffer is
/// dropped.
pub struct Frames<'a> {
    buf: &'a [u8],
    failed: bool,
}

impl<'a> Frames<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, failed: false }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }
}

impl Iterator for Frames<'_> {
    type Item = Result<Pdu, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.buf.is_empty() {
            return None;
        }
        match Pdu::decode(self.buf) {
            Ok((pdu, used)) => {
                self.buf = &self.buf[used..];
                Some(Ok(pdu))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// Reassembles PDUs from a byte stream.
///
/// Bytes are appended as they are read; complete PDUs are taken from the
/// front. A PDU cut short by the end of the buffer stays queued. Any other
/// decode error means the stream can no longer be framed, so the buffer is
/// discarded along with it.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: BytesMut,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes held, complete PDUs and the incomplete tail together.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Whether [`next_pdu`](Self::next_pdu) would return something other
    /// than `Ok(None)`.
    pub fn is_ready(&self) -> bool {
        !self.buf.is_empty()
            && !matches!(Pdu::decode(&self.buf), Err(DecodeError::Truncated { .. }))
    }

    /// Take the next complete PDU.
    ///
    /// `Ok(None)` means the buffer is empty or ends in an incomplete PDU.
    pub fn next_pdu(&mut self) -> Result<Option<Pdu>, DecodeError> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        match Pdu::decode(&self.buf) {
            Ok((pdu, used)) => {
                self.buf.advance(used);
                Ok(Some(pdu))
            }
            Err(DecodeError::Truncated { .. }) => Ok(None),
            Err(err) => {
                self.buf.clear();
                Err(err)
            }
        }
    }

    /// Take exactly `len` raw bytes, if that many are buffered.
    pub fn take(&mut self, len: usize) -> Option<Bytes> {
        (self.buf.len() >= len).then(|| self.buf.split_to(len).freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn addr(a: u8, b: u8, c: u8, d: u8, port: u16) -> NodeAddr {
        NodeAddr::new(Ipv4Addr::new(a, b, c, d), port)
    }

    fn roundtrip(pdu: Pdu) {
        let bytes = pdu.encode();
        assert_eq!(bytes.len(), pdu.encoded_len());
        let (decoded, used) = Pdu::decode(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn test_join_layout_is_network_order() {
        let request = JoinRequest::new(addr(192, 168, 1, 10, 0x1F90))
            .claim(127, addr(10, 0, 0, 1, 0x0102));
        let bytes = Pdu::NetJoin(request).encode();
        assert_eq!(
            hex::encode(&bytes),
            "03c0a8010a1f907f0a0000010102"
        );
        roundtrip(Pdu::NetJoin(request));
    }

    #[test]
    fn test_join_response_layout() {
        let pdu = Pdu::NetJoinResponse {
            next: addr(127, 0, 0, 1, 4000),
            range: KeyRange::new(128, 255).unwrap(),
        };
        assert_eq!(hex::encode(pdu.encode()), "047f0000010fa080ff");
        roundtrip(pdu);
    }

    #[test]
    fn test_record_pdus_roundtrip() {
        let id = RecordId::from_bytes(*b"199001011234");
        let value = RecordValue::new("Ada", "ada@example.org").unwrap();
        roundtrip(Pdu::ValInsert { id, value: value.clone() });
        roundtrip(Pdu::ValLookupResponse { id, value });
        roundtrip(Pdu::ValLookupResponse { id, value: RecordValue::default() });
        roundtrip(Pdu::ValLookup { id, reply_to: addr(127, 0, 0, 1, 9999) });
        roundtrip(Pdu::ValRemove { id });
    }

    #[test]
    fn test_empty_buffer() {
        assert_eq!(Pdu::decode(&[]), Err(DecodeError::Empty));
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(Pdu::decode(&[42, 0, 0]), Err(DecodeError::UnknownTag(42)));
    }

    #[test]
    fn test_truncated_fixed_pdu() {
        let bytes = Pdu::NetLeaving { next: addr(1, 2, 3, 4, 5) }.encode();
        assert_eq!(
            Pdu::decode(&bytes[..6]),
            Err(DecodeError::Truncated {
                pdu: "NET_LEAVING",
                needed: 7,
                available: 6,
            })
        );
    }

    #[test]
    fn test_overlong_field_length() {
        let mut bytes = BytesMut::new();
        bytes.put_u8(tags::VAL_INSERT);
        bytes.put_slice(&[b'1'; 12]);
        bytes.put_u8(3);
        bytes.put_slice(b"Ada");
        bytes.put_u8(200);
        bytes.put_slice(b"short");
        assert_eq!(
            Pdu::decode(&bytes),
            Err(DecodeError::Truncated {
                pdu: "VAL_INSERT",
                needed: 17 + 1 + 200,
                available: 23,
            })
        );
    }

    #[test]
    fn test_inverted_range_rejected() {
        assert_eq!(
            Pdu::decode(&[tags::NET_NEW_RANGE, 9, 3]),
            Err(DecodeError::InvalidRange { start: 9, end: 3 })
        );
    }

    #[test]
    fn test_frames_walks_concatenated_pdus() {
        let mut buf = BytesMut::new();
        Pdu::NetNewRangeResponse.encode_into(&mut buf);
        Pdu::ValRemove { id: RecordId::ZERO }.encode_into(&mut buf);
        Pdu::NetCloseConnection.encode_into(&mut buf);

        let pdus: Vec<_> = Frames::new(&buf).collect::<Result<_, _>>().unwrap();
        assert_eq!(
            pdus,
            vec![
                Pdu::NetNewRangeResponse,
                Pdu::ValRemove { id: RecordId::ZERO },
                Pdu::NetCloseConnection,
            ]
        );
    }

    #[test]
    fn test_frames_stops_at_first_error() {
        let mut buf = BytesMut::new();
        Pdu::NetAlive.encode_into(&mut buf);
        buf.put_u8(77);
        Pdu::NetAlive.encode_into(&mut buf);

        let mut frames = Frames::new(&buf);
        assert_eq!(frames.next(), Some(Ok(Pdu::NetAlive)));
        assert_eq!(frames.next(), Some(Err(DecodeError::UnknownTag(77))));
        assert_eq!(frames.next(), None);
    }

    #[test]
    fn test_join_response_leaves_trailing_bytes() {
        let mut buf = BytesMut::new();
        Pdu::NetJoinResponse {
            next: addr(127, 0, 0, 1, 1),
            range: KeyRange::FULL,
        }
        .encode_into(&mut buf);
        Pdu::ValRemove { id: RecordId::ZERO }.encode_into(&mut buf);

        let (_, used) = Pdu::decode(&buf).unwrap();
        assert_eq!(used, sizes::NET_JOIN_RESPONSE);
    }

    #[test]
    fn test_frame_buffer_holds_split_pdu() {
        let pdu = Pdu::ValInsert {
            id: RecordId::from_bytes(*b"199001011234"),
            value: RecordValue::new("Ada", "ada@example.org").unwrap(),
        };
        let bytes = pdu.encode();
        let mut frames = FrameBuffer::new();

        frames.extend(&bytes[..10]);
        assert!(!frames.is_ready());
        assert_eq!(frames.next_pdu(), Ok(None));
        assert_eq!(frames.buffered(), 10);

        frames.extend(&bytes[10..]);
        Pdu::NetAlive.encode_into(&mut frames.buf);
        assert!(frames.is_ready());
        assert_eq!(frames.next_pdu(), Ok(Some(pdu)));
        assert_eq!(frames.next_pdu(), Ok(Some(Pdu::NetAlive)));
        assert_eq!(frames.next_pdu(), Ok(None));
        assert_eq!(frames.buffered(), 0);
    }

    #[test]
    fn test_frame_buffer_discards_unframeable_stream() {
        let mut frames = FrameBuffer::new();
        frames.extend(&[tags::NET_ALIVE, 77, tags::NET_ALIVE]);
        assert_eq!(frames.next_pdu(), Ok(Some(Pdu::NetAlive)));
        assert!(frames.is_ready());
        assert_eq!(frames.next_pdu(), Err(DecodeError::UnknownTag(77)));
        assert_eq!(frames.buffered(), 0);
    }

    #[test]
    fn test_frame_buffer_take_leaves_rest() {
        let mut frames = FrameBuffer::new();
        frames.extend(&Pdu::NetNewRange { range: KeyRange::FULL }.encode());
        frames.extend(&[tags::NET_CLOSE_CONNECTION]);
        assert_eq!(frames.take(4), None);
        assert_eq!(frames.take(3).as_deref(), Some(&[tags::NET_NEW_RANGE, 0, 255][..]));
        assert_eq!(frames.next_pdu(), Ok(Some(Pdu::NetCloseConnection)));
    }

    proptest! {
        #[test]
        fn decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..600)) {
            for frame in Frames::new(&bytes) {
                if let Ok(pdu) = frame {
                    prop_assert!(pdu.encoded_len() <= bytes.len());
                }
            }
        }

        #[test]
        fn decode_consumes_exact_encoding(
            id in any::<[u8; 12]>(),
            name in prop::collection::vec(any::<u8>(), 0..=255),
            email in prop::collection::vec(any::<u8>(), 0..=255),
            trailing in prop::collection::vec(any::<u8>(), 0..16),
        ) {
            let pdu = Pdu::ValInsert {
                id: RecordId::from_bytes(id),
                value: RecordValue::new(name, email).unwrap(),
            };
            let mut buf = BytesMut::new();
            pdu.encode_into(&mut buf);
            buf.put_slice(&trailing);
            let (decoded, used) = Pdu::decode(&buf).unwrap();
            prop_assert_eq!(used, pdu.encoded_len());
            prop_assert_eq!(decoded, pdu);
        }
    }
}
