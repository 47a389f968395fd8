//! Golden wire vectors.
//!
//! One vector per PDU type, fixing the exact big-endian byte layout that
//! every node and tracker on the network must agree on.

use std::net::Ipv4Addr;

use rangekv_core::{KeyRange, NodeAddr, RecordId, RecordValue};
use rangekv_net::{JoinRequest, Pdu};

/// A golden wire vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub pdu: Pdu,
    /// Expected encoding (hex).
    pub hex: &'static str,
}

fn id() -> RecordId {
    RecordId::from_bytes(*b"199001011234")
}

fn addr(a: u8, b: u8, c: u8, d: u8, port: u16) -> NodeAddr {
    NodeAddr::new(Ipv4Addr::new(a, b, c, d), port)
}

fn range(start: u8, end: u8) -> KeyRange {
    KeyRange::new(start, end).unwrap_or(KeyRange::FULL)
}

/// Get all golden vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "NET_ALIVE",
            pdu: Pdu::NetAlive,
            hex: "00",
        },
        GoldenVector {
            name: "NET_GET_NODE",
            pdu: Pdu::NetGetNode,
            hex: "01",
        },
        GoldenVector {
            name: "NET_GET_NODE_RESPONSE with member",
            pdu: Pdu::NetGetNodeResponse {
                member: addr(10, 0, 0, 1, 4000),
            },
            hex: "020a0000010fa0",
        },
        GoldenVector {
            name: "NET_GET_NODE_RESPONSE for empty network",
            pdu: Pdu::NetGetNodeResponse {
                member: NodeAddr::UNSPECIFIED,
            },
            hex: "02000000000000",
        },
        GoldenVector {
            name: "NET_JOIN as sent by the joiner",
            pdu: Pdu::NetJoin(JoinRequest::new(addr(192, 168, 1, 10, 8080))),
            hex: "03c0a8010a1f9000000000000000",
        },
        GoldenVector {
            name: "NET_JOIN after a claim",
            pdu: Pdu::NetJoin(
                JoinRequest::new(addr(192, 168, 1, 10, 8080)).claim(127, addr(10, 0, 0, 1, 258)),
            ),
            hex: "03c0a8010a1f907f0a0000010102",
        },
        GoldenVector {
            name: "NET_JOIN_RESPONSE",
            pdu: Pdu::NetJoinResponse {
                next: addr(127, 0, 0, 1, 4000),
                range: range(128, 255),
            },
            hex: "047f0000010fa080ff",
        },
        GoldenVector {
            name: "NET_CLOSE_CONNECTION",
            pdu: Pdu::NetCloseConnection,
            hex: "05",
        },
        GoldenVector {
            name: "NET_NEW_RANGE",
            pdu: Pdu::NetNewRange {
                range: range(0, 127),
            },
            hex: "06007f",
        },
        GoldenVector {
            name: "NET_LEAVING",
            pdu: Pdu::NetLeaving {
                next: addr(127, 0, 0, 1, 4001),
            },
            hex: "077f0000010fa1",
        },
        GoldenVector {
            name: "NET_NEW_RANGE_RESPONSE",
            pdu: Pdu::NetNewRangeResponse,
            hex: "08",
        },
        GoldenVector {
            name: "VAL_INSERT",
            pdu: Pdu::ValInsert {
                id: id(),
                value: RecordValue::new("Ada", "a@b.se").unwrap_or_default(),
            },
            hex: "6431393930303130313132333403416461066140622e7365",
        },
        GoldenVector {
            name: "VAL_REMOVE",
            pdu: Pdu::ValRemove { id: id() },
            hex: "65313939303031303131323334",
        },
        GoldenVector {
            name: "VAL_LOOKUP",
            pdu: Pdu::ValLookup {
                id: id(),
                reply_to: addr(127, 0, 0, 1, 9999),
            },
            hex: "663139393030313031313233347f000001270f",
        },
        GoldenVector {
            name: "VAL_LOOKUP_RESPONSE for an absent record",
            pdu: Pdu::ValLookupResponse {
                id: id(),
                value: RecordValue::default(),
            },
            hex: "673139393030313031313233340000",
        },
        GoldenVector {
            name: "STUN_LOOKUP",
            pdu: Pdu::StunLookup,
            hex: "c8",
        },
        GoldenVector {
            name: "STUN_RESPONSE",
            pdu: Pdu::StunResponse {
                addr: Ipv4Addr::new(203, 0, 113, 7),
            },
            hex: "c9cb007107",
        },
    ]
}

/// Check every vector in both directions.
///
/// Returns the name of the first vector that fails.
pub fn verify_all_vectors() -> Result<(), String> {
    for vector in all_vectors() {
        let encoded = hex::encode(vector.pdu.encode());
        if encoded != vector.hex {
            return Err(format!(
                "{}: encoded {encoded}, expected {}",
                vector.name, vector.hex
            ));
        }
        let bytes = hex::decode(vector.hex).map_err(|e| format!("{}: {e}", vector.name))?;
        match Pdu::decode(&bytes) {
            Ok((pdu, used)) if pdu == vector.pdu && used == bytes.len() => {}
            Ok((pdu, used)) => {
                return Err(format!(
                    "{}: decoded {pdu:?} from {used} bytes",
                    vector.name
                ))
            }
            Err(err) => return Err(format!("{}: {err}", vector.name)),
        }
    }
    Ok(())
}
