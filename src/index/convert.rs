//! Conversion between typed index keys/values and their byte form
//!
//! The index layer never looks inside converted bytes; their order is
//! whatever the index's comparators (bytewise by default) make of them.

use crate::error::{HgError, Result};

/// Two-way conversion between `T` and bytes
pub trait ByteConverter<T>: Send + Sync {
    fn to_bytes(&self, value: &T) -> Result<Vec<u8>>;

    fn from_bytes(&self, bytes: &[u8]) -> Result<T>;
}

/// Raw bytes, unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesConverter;

impl ByteConverter<Vec<u8>> for BytesConverter {
    fn to_bytes(&self, value: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(value.clone())
    }

    fn from_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

/// UTF-8 strings
#[derive(Debug, Default, Clone, Copy)]
pub struct StringConverter;

impl ByteConverter<String> for StringConverter {
    fn to_bytes(&self, value: &String) -> Result<Vec<u8>> {
        Ok(value.as_bytes().to_vec())
    }

    fn from_bytes(&self, bytes: &[u8]) -> Result<String> {
        String::from_utf8(bytes.to_vec()).map_err(|e| HgError::Conversion(format!("invalid UTF-8: {}", e)))
    }
}

fn fixed<const N: usize>(bytes: &[u8], what: &str) -> Result<[u8; N]> {
    bytes.try_into().map_err(|_| {
        HgError::Conversion(format!("{} needs {} bytes, got {}", what, N, bytes.len()))
    })
}

/// `i32` as sign-flipped big-endian, so byte order is numeric order
#[derive(Debug, Default, Clone, Copy)]
pub struct I32Converter;

impl ByteConverter<i32> for I32Converter {
    fn to_bytes(&self, value: &i32) -> Result<Vec<u8>> {
        Ok(((*value as u32) ^ (1 << 31)).to_be_bytes().to_vec())
    }

    fn from_bytes(&self, bytes: &[u8]) -> Result<i32> {
        let raw = u32::from_be_bytes(fixed::<4>(bytes, "i32")?);
        Ok((raw ^ (1 << 31)) as i32)
    }
}

/// `i64` as sign-flipped big-endian, so byte order is numeric order
#[derive(Debug, Default, Clone, Copy)]
pub struct I64Converter;

impl ByteConverter<i64> for I64Converter {
    fn to_bytes(&self, value: &i64) -> Result<Vec<u8>> {
        Ok(((*value as u64) ^ (1 << 63)).to_be_bytes().to_vec())
    }

    fn from_bytes(&self, bytes: &[u8]) -> Result<i64> {
        let raw = u64::from_be_bytes(fixed::<8>(bytes, "i64")?);
        Ok((raw ^ (1 << 63)) as i64)
    }
}
