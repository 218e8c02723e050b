//! # Entry Definitions
//!
//! Well-known entries and units shared by the engine and the server.
//!
//! Keys are UTF-8 strings because they arrive as URL query parameters and
//! leave as lines of text; values are opaque bytes. Neither has a size limit.

/// Sentinel key seeded before the server accepts traffic.
pub const MAGIC_KEY: &str = "magic";

/// Value stored under [`MAGIC_KEY`].
pub const MAGIC_VALUE: &[u8] = b"key";

/// Bytes per mebibyte.
pub const MIB: u64 = 1024 * 1024;

/// Converts a byte count to whole mebibytes, rounding down.
///
/// # Examples
/// ```rust
/// use dkv_common::{bytes_to_mib, MIB};
///
/// assert_eq!(bytes_to_mib(5 * MIB + 1), 5);
/// ```
pub fn bytes_to_mib(bytes: u64) -> u64 {
    bytes / MIB
}
