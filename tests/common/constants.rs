//! Shared constants for end-to-end tests

// ============================================================================
// Test Payloads
// ============================================================================

/// Connection id used by single-client tests
pub const PCID_1: &str = "pc-1";

/// Second connection id
pub const PCID_2: &str = "pc-2";

/// Columns every stats table starts with
pub const FIXED_COLUMNS: [&str; 2] = ["pcid", "updated"];

// ============================================================================
// Test Timeouts and Configuration
// ============================================================================

/// Maximum time to wait for server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Timeout for individual HTTP requests (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Polling interval when waiting for server ready (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;

/// Queue capacity of the default test server
pub const TEST_QUEUE_CAPACITY: usize = 64;
