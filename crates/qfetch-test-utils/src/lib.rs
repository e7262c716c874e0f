//! qfetch-test-utils: Test infrastructure for qfetch.
//!
//! Provides:
//! - MockConnection / MockClient: in-memory transport for testing without network
//! - Fixture directories with known contents

mod fixtures;
mod mock_transport;

pub use fixtures::{fixture_dir, read_fixture, sorted};
pub use mock_transport::{mock_connection_pair, MockClient, MockConnection};
