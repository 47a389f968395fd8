//! Strong type definitions for rangekv.
//!
//! Identifiers and addresses are newtypes so the wire layer and the
//! membership logic cannot mix them up.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

/// Length of a [`RecordId`] in bytes.
pub const RECORD_ID_LEN: usize = 12;

/// A 12-byte record identifier.
///
/// The identifier is a fixed-length byte array. It is never assumed to be
/// NUL-terminated or valid UTF-8.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(pub [u8; RECORD_ID_LEN]);

impl RecordId {
    /// Create a new RecordId from raw bytes.
    pub const fn from_bytes(bytes: [u8; RECORD_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; RECORD_ID_LEN] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        Self::try_from(bytes.as_slice()).map_err(|_| hex::FromHexError::InvalidStringLength)
    }

    /// The all-zero identifier.
    pub const ZERO: Self = Self([0u8; RECORD_ID_LEN]);
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.to_hex())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.escape_ascii())
    }
}

impl AsRef<[u8]> for RecordId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; RECORD_ID_LEN]> for RecordId {
    fn from(bytes: [u8; RECORD_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for RecordId {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; RECORD_ID_LEN] = slice.try_into()?;
        Ok(Self(arr))
    }
}

/// IPv4 address and port of a node.
///
/// This is the identity a node advertises: its tracker-discovered public
/// address and its listening TCP port (or, for tracker replies, its UDP
/// port). The all-zero address means "nobody".
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeAddr {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl NodeAddr {
    /// The unspecified address `0.0.0.0:0`.
    pub const UNSPECIFIED: Self = Self {
        ip: Ipv4Addr::UNSPECIFIED,
        port: 0,
    };

    pub const fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    /// True when the address part is zero, regardless of port.
    pub fn is_unspecified(&self) -> bool {
        self.ip.is_unspecified()
    }

    pub fn to_socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.ip, self.port)
    }
}

impl From<SocketAddrV4> for NodeAddr {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

impl From<NodeAddr> for SocketAddrV4 {
    fn from(addr: NodeAddr) -> Self {
        addr.to_socket_addr()
    }
}

impl fmt::Debug for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeAddr({}:{})", self.ip, self.port)
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_hex_roundtrip() {
        let id = RecordId::from_bytes(*b"199001011234");
        let hex = id.to_hex();
        let recovered = RecordId::from_hex(&hex).unwrap();
        assert_eq!(id, recovered);
    }

    #[test]
    fn test_record_id_from_hex_wrong_length() {
        assert!(RecordId::from_hex("abcd").is_err());
    }

    #[test]
    fn test_record_id_display_escapes_non_ascii() {
        let id = RecordId::from_bytes(*b"19900101123\0");
        assert_eq!(id.to_string(), "19900101123\\x00");
    }

    #[test]
    fn test_record_id_try_from_slice() {
        let bytes = [7u8; 12];
        assert_eq!(RecordId::try_from(&bytes[..]).unwrap(), RecordId([7; 12]));
        assert!(RecordId::try_from(&bytes[..11]).is_err());
    }

    #[test]
    fn test_node_addr_unspecified() {
        assert!(NodeAddr::UNSPECIFIED.is_unspecified());
        assert!(NodeAddr::new(Ipv4Addr::UNSPECIFIED, 4000).is_unspecified());
        assert!(!NodeAddr::new(Ipv4Addr::LOCALHOST, 0).is_unspecified());
    }

    #[test]
    fn test_node_addr_socket_conversion() {
        let sock = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 7), 5123);
        let addr = NodeAddr::from(sock);
        assert_eq!(addr.to_string(), "10.0.0.7:5123");
        assert_eq!(SocketAddrV4::from(addr), sock);
    }
}
