//! Proptest generators for property-based testing.

use std::net::Ipv4Addr;

use proptest::prelude::*;

use rangekv_core::{KeyRange, NodeAddr, RecordId, RecordValue, MAX_FIELD_LEN};
use rangekv_net::{JoinRequest, Pdu};

/// Generate a random RecordId.
pub fn record_id() -> impl Strategy<Value = RecordId> {
    any::<[u8; 12]>().prop_map(RecordId::from_bytes)
}

/// Generate a field of at most `max_len` bytes.
pub fn field(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len.min(MAX_FIELD_LEN))
}

/// Generate a record value, empty fields included.
pub fn record_value() -> impl Strategy<Value = RecordValue> {
    (field(MAX_FIELD_LEN), field(MAX_FIELD_LEN)).prop_filter_map(
        "fields fit the wire format",
        |(name, email)| RecordValue::new(name, email).ok(),
    )
}

/// Generate a valid range (`start <= end`).
pub fn key_range() -> impl Strategy<Value = KeyRange> {
    (any::<u8>(), any::<u8>()).prop_filter_map("ordered bounds", |(a, b)| {
        KeyRange::new(a.min(b), a.max(b)).ok()
    })
}

/// Generate a node address.
pub fn node_addr() -> impl Strategy<Value = NodeAddr> {
    (any::<u32>(), any::<u16>()).prop_map(|(ip, port)| NodeAddr::new(Ipv4Addr::from(ip), port))
}

/// Generate a join request at any point of its trip around the ring.
pub fn join_request() -> impl Strategy<Value = JoinRequest> {
    (node_addr(), any::<u8>(), node_addr())
        .prop_map(|(src, span, max)| JoinRequest::new(src).claim(span, max))
}

/// Generate any PDU.
pub fn pdu() -> impl Strategy<Value = Pdu> {
    prop_oneof![
        Just(Pdu::NetAlive),
        Just(Pdu::NetGetNode),
        node_addr().prop_map(|member| Pdu::NetGetNodeResponse { member }),
        join_request().prop_map(Pdu::NetJoin),
        (node_addr(), key_range()).prop_map(|(next, range)| Pdu::NetJoinResponse { next, range }),
        Just(Pdu::NetCloseConnection),
        key_range().prop_map(|range| Pdu::NetNewRange { range }),
        node_addr().prop_map(|next| Pdu::NetLeaving { next }),
        Just(Pdu::NetNewRangeResponse),
        (record_id(), record_value()).prop_map(|(id, value)| Pdu::ValInsert { id, value }),
        record_id().prop_map(|id| Pdu::ValRemove { id }),
        (record_id(), node_addr()).prop_map(|(id, reply_to)| Pdu::ValLookup { id, reply_to }),
        (record_id(), record_value())
            .prop_map(|(id, value)| Pdu::ValLookupResponse { id, value }),
        Just(Pdu::StunLookup),
        any::<u32>().prop_map(|ip| Pdu::StunResponse { addr: Ipv4Addr::from(ip) }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use rangekv_net::{FrameBuffer, Frames};

    proptest! {
        #[test]
        fn test_decode_inverts_encode(pdu in pdu()) {
            let bytes = pdu.encode();
            prop_assert_eq!(bytes.len(), pdu.encoded_len());
            let (decoded, used) = Pdu::decode(&bytes).unwrap();
            prop_assert_eq!(used, bytes.len());
            prop_assert_eq!(decoded, pdu);
        }

        #[test]
        fn test_concatenated_pdus_decode_in_order(
            pdus in prop::collection::vec(pdu(), 1..8)
        ) {
            let mut buf = BytesMut::new();
            for pdu in &pdus {
                pdu.encode_into(&mut buf);
            }

            let decoded: Vec<Pdu> = Frames::new(&buf).collect::<Result<_, _>>().unwrap();
            prop_assert_eq!(decoded, pdus);
        }

        #[test]
        fn test_stream_reassembles_across_any_read_size(
            pdus in prop::collection::vec(pdu(), 1..8),
            chunk in 1usize..64,
        ) {
            let mut stream = BytesMut::new();
            for pdu in &pdus {
                pdu.encode_into(&mut stream);
            }

            let mut frames = FrameBuffer::new();
            let mut decoded = Vec::new();
            for read in stream.chunks(chunk) {
                frames.extend(read);
                while let Some(pdu) = frames.next_pdu().unwrap() {
                    decoded.push(pdu);
                }
            }
            prop_assert_eq!(decoded, pdus);
            prop_assert_eq!(frames.buffered(), 0);
        }

        #[test]
        fn test_truncated_pdu_is_rejected(pdu in pdu(), cut in any::<prop::sample::Index>()) {
            let bytes = pdu.encode();
            prop_assume!(bytes.len() > 1);
            let len = 1 + cut.index(bytes.len() - 1);
            prop_assert!(Pdu::decode(&bytes[..len]).is_err());
        }

        #[test]
        fn test_split_of_generated_range_tiles_it(range in key_range()) {
            prop_assume!(range.span() > 0);
            let (kept, ceded) = range.split().unwrap();
            prop_assert_eq!(kept.start(), range.start());
            prop_assert_eq!(ceded.end(), range.end());
            prop_assert_eq!(kept.len() + ceded.len(), range.len());
        }
    }
}
