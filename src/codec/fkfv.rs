//! Fixed-size key, fixed-size value encoding
//!
//! ```text
//! ┌────────────────┬────────────────┐
//! │ key (16)       │ value (16)     │
//! └────────────────┴────────────────┘
//! ```
//! There is no room for a flag byte, so the per-key bounds are the key
//! followed by an all-zero or all-0xFF value. Both are inclusive bounds:
//! a stored value of all 0xFF is still inside `[first_key, last_key]`.

use super::KeyCodec;
use crate::error::{HgError, Result};

/// Size of keys and values (persistent handles)
pub const HANDLE_SIZE: usize = 16;

#[derive(Debug, Default, Clone, Copy)]
pub struct FkfvCodec;

fn check(what: &str, bytes: &[u8]) -> Result<()> {
    if bytes.len() != HANDLE_SIZE {
        return Err(HgError::Precondition(format!(
            "{} must be {} bytes, got {}",
            what,
            HANDLE_SIZE,
            bytes.len()
        )));
    }
    Ok(())
}

fn with_suffix(key: &[u8], fill: u8) -> Result<Vec<u8>> {
    check("key", key)?;
    let mut engine_key = Vec::with_capacity(2 * HANDLE_SIZE);
    engine_key.extend_from_slice(key);
    engine_key.resize(2 * HANDLE_SIZE, fill);
    Ok(engine_key)
}

impl KeyCodec for FkfvCodec {
    const NAME: &'static str = "fixed-key fixed-value multivalued database";

    fn encode(&self, key: &[u8], value: &[u8]) -> Result<Vec<u8>> {
        check("key", key)?;
        check("value", value)?;
        let mut engine_key = Vec::with_capacity(2 * HANDLE_SIZE);
        engine_key.extend_from_slice(key);
        engine_key.extend_from_slice(value);
        Ok(engine_key)
    }

    fn first_key(&self, key: &[u8]) -> Result<Vec<u8>> {
        with_suffix(key, 0x00)
    }

    fn last_key(&self, key: &[u8]) -> Result<Vec<u8>> {
        with_suffix(key, 0xFF)
    }

    fn global_first(&self) -> Vec<u8> {
        vec![0x00; 2 * HANDLE_SIZE]
    }

    fn global_last(&self) -> Vec<u8> {
        vec![0xFF; 2 * HANDLE_SIZE]
    }

    fn extract_key<'a>(&self, engine_key: &'a [u8]) -> Result<&'a [u8]> {
        if engine_key.len() != 2 * HANDLE_SIZE {
            return Err(HgError::Corruption(format!(
                "fixed-size engine key has {} bytes",
                engine_key.len()
            )));
        }
        Ok(&engine_key[..HANDLE_SIZE])
    }

    fn extract_value<'a>(&self, engine_key: &'a [u8]) -> Result<&'a [u8]> {
        if engine_key.len() != 2 * HANDLE_SIZE {
            return Err(HgError::Corruption(format!(
                "fixed-size engine key has {} bytes",
                engine_key.len()
            )));
        }
        Ok(&engine_key[HANDLE_SIZE..])
    }
}
