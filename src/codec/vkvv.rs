//! Variable-size key, variable-size value encoding
//!
//! ```text
//! ┌──────────────────┬──────────┬──────────┬──────────────┐
//! │ key len (4, BE)  │ flag (1) │ key      │ value        │
//! └──────────────────┴──────────┴──────────┴──────────────┘
//! ```
//! The flag marks real records and the synthetic range edges. Edges are
//! never stored; they only bound scans, and their position in the order is
//! decided by the comparator (see [`crate::comparator::ComparatorAdapter`]),
//! not by their bytes.

use super::KeyCodec;
use crate::error::{HgError, Result};

/// Length prefix + flag
pub const VKVV_HEADER_SIZE: usize = 5;

/// Kind of engine key, stored in byte 4
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EdgeFlag {
    /// A stored `(key, value)` pair
    Real = 0,
    /// Before every value of one key
    RangeStart = 1,
    /// After every value of one key
    RangeEnd = 2,
    /// Before everything
    GlobalStart = 3,
    /// After everything
    GlobalEnd = 4,
}

impl EdgeFlag {
    /// Unknown flag bytes read as [`EdgeFlag::Real`]
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            1 => EdgeFlag::RangeStart,
            2 => EdgeFlag::RangeEnd,
            3 => EdgeFlag::GlobalStart,
            4 => EdgeFlag::GlobalEnd,
            _ => EdgeFlag::Real,
        }
    }
}

/// An engine key split into its parts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedKey<'a> {
    pub flag: EdgeFlag,
    pub key: &'a [u8],
    pub value: &'a [u8],
}

/// Split an engine key.
///
/// Never fails: a short buffer or an over-long length prefix is clamped
/// to what is actually there, so ordering stays total even over garbage.
pub fn parse(engine_key: &[u8]) -> ParsedKey<'_> {
    if engine_key.len() < VKVV_HEADER_SIZE {
        return ParsedKey {
            flag: EdgeFlag::Real,
            key: engine_key,
            value: &[],
        };
    }
    let declared = u32::from_be_bytes([engine_key[0], engine_key[1], engine_key[2], engine_key[3]]) as usize;
    let body = &engine_key[VKVV_HEADER_SIZE..];
    let key_len = declared.min(body.len());
    ParsedKey {
        flag: EdgeFlag::from_byte(engine_key[4]),
        key: &body[..key_len],
        value: &body[key_len..],
    }
}

fn build(flag: EdgeFlag, key: &[u8], value: &[u8]) -> Vec<u8> {
    let mut engine_key = Vec::with_capacity(VKVV_HEADER_SIZE + key.len() + value.len());
    engine_key.extend_from_slice(&(key.len() as u32).to_be_bytes());
    engine_key.push(flag as u8);
    engine_key.extend_from_slice(key);
    engine_key.extend_from_slice(value);
    engine_key
}

fn checked(engine_key: &[u8]) -> Result<ParsedKey<'_>> {
    if engine_key.len() < VKVV_HEADER_SIZE {
        return Err(HgError::Corruption(format!(
            "engine key of {} bytes has no header",
            engine_key.len()
        )));
    }
    let declared = u32::from_be_bytes([engine_key[0], engine_key[1], engine_key[2], engine_key[3]]) as usize;
    if declared > engine_key.len() - VKVV_HEADER_SIZE {
        return Err(HgError::Corruption(format!(
            "engine key declares a {}-byte key but holds {} bytes",
            declared,
            engine_key.len() - VKVV_HEADER_SIZE
        )));
    }
    Ok(parse(engine_key))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct VkvvCodec;

impl KeyCodec for VkvvCodec {
    const NAME: &'static str = "variable-key variable-value multivalued database";

    fn encode(&self, key: &[u8], value: &[u8]) -> Result<Vec<u8>> {
        if key.len() > u32::MAX as usize {
            return Err(HgError::Precondition(format!("key of {} bytes is too long", key.len())));
        }
        Ok(build(EdgeFlag::Real, key, value))
    }

    fn first_key(&self, key: &[u8]) -> Result<Vec<u8>> {
        Ok(build(EdgeFlag::RangeStart, key, &[]))
    }

    fn last_key(&self, key: &[u8]) -> Result<Vec<u8>> {
        Ok(build(EdgeFlag::RangeEnd, key, &[]))
    }

    fn global_first(&self) -> Vec<u8> {
        build(EdgeFlag::GlobalStart, &[], &[])
    }

    fn global_last(&self) -> Vec<u8> {
        build(EdgeFlag::GlobalEnd, &[], &[])
    }

    fn extract_key<'a>(&self, engine_key: &'a [u8]) -> Result<&'a [u8]> {
        checked(engine_key).map(|parsed| parsed.key)
    }

    fn extract_value<'a>(&self, engine_key: &'a [u8]) -> Result<&'a [u8]> {
        checked(engine_key).map(|parsed| parsed.value)
    }
}
