//! # rangekv Testkit
//!
//! Testing utilities for rangekv.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: The byte layout of every PDU, checked in both directions
//! - **Generators**: Proptest strategies for ids, values, ranges and PDUs
//! - **Fixtures**: A mock tracker and a UDP client for running nodes on loopback
//!
//! ## Golden Vectors
//!
//! ```rust
//! use rangekv_testkit::vectors::{all_vectors, verify_all_vectors};
//!
//! assert!(verify_all_vectors().is_ok());
//! for vector in all_vectors() {
//!     println!("{}: {}", vector.name, vector.hex);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use rangekv_testkit::generators::pdu;
//!
//! proptest! {
//!     #[test]
//!     fn decode_never_overreads(pdu in pdu()) {
//!         let (_, used) = rangekv_net::Pdu::decode(&pdu.encode()).unwrap();
//!         prop_assert_eq!(used, pdu.encoded_len());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use rangekv_testkit::fixtures::{id_at, person, MockTracker, TestClient};
//!
//! async fn example() -> std::io::Result<()> {
//!     let tracker = MockTracker::spawn().await?;
//!     let client = TestClient::bind().await?;
//!     // Start nodes against `tracker.addr()`, then:
//!     // client.insert(node, id_at(200), person("Ada")).await?;
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{id_at, local_transport, person, FirstByteHasher, MockTracker, TestClient};
pub use vectors::{all_vectors, verify_all_vectors, GoldenVector};
