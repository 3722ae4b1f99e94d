//! Integration test crate for the Caldera vault.
//!
//! This crate has no library code — it only contains integration tests
//! that exercise end-to-end vault and oracle flows across the workspace
//! crates.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p caldera-integration-tests
//! ```
