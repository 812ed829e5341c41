//! Engine key encodings for multivalued logical databases
//!
//! A multivalued database stores each `(key, value)` pair as one engine
//! key, so that the engine's ordering gives "by key, then by value". The
//! codecs here build those engine keys, the synthetic bounds used to scan
//! them, and take them apart again.
//!
//! | Codec | Key | Value | Engine key |
//! |---|---|---|---|
//! | [`FkfvCodec`] | 16 bytes | 16 bytes | `key ++ value` |
//! | [`VkvvCodec`] | any | any | `len(key) u32 BE ++ flag ++ key ++ value` |

mod fkfv;
mod vkvv;

pub use fkfv::{FkfvCodec, HANDLE_SIZE};
pub use vkvv::{parse, EdgeFlag, ParsedKey, VkvvCodec, VKVV_HEADER_SIZE};

use crate::error::Result;

/// Encoding of `(key, value)` pairs into engine keys.
///
/// Bounds returned by `first_key`/`last_key` and `global_first`/`global_last`
/// are used as *inclusive* scan limits: every stored pair for `key` lies in
/// `[first_key(key), last_key(key)]` and every stored pair lies in
/// `[global_first(), global_last()]`.
pub trait KeyCodec: Clone + Send + Sync + 'static {
    /// Name used in diagnostics
    const NAME: &'static str;

    fn encode(&self, key: &[u8], value: &[u8]) -> Result<Vec<u8>>;

    fn first_key(&self, key: &[u8]) -> Result<Vec<u8>>;

    fn last_key(&self, key: &[u8]) -> Result<Vec<u8>>;

    fn global_first(&self) -> Vec<u8>;

    fn global_last(&self) -> Vec<u8>;

    /// Logical key of an encoded pair
    fn extract_key<'a>(&self, engine_key: &'a [u8]) -> Result<&'a [u8]>;

    /// Logical value of an encoded pair
    fn extract_value<'a>(&self, engine_key: &'a [u8]) -> Result<&'a [u8]>;
}
