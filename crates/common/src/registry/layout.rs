//! Fixed-size little-endian account codec.

use uuid::Uuid;

use crate::crypto::{Commitment, PublicKey};
use crate::storage::ContentHash;

pub const DISCRIMINATOR_SIZE: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("account is {actual} bytes, expected {expected}")]
    WrongSize { expected: usize, actual: usize },
    #[error("account discriminator does not match")]
    WrongDiscriminator,
    #[error("account data truncated")]
    Truncated,
    #[error("invalid {0} value {1}")]
    InvalidValue(&'static str, u64),
    #[error("invalid public key in account")]
    InvalidKey,
}

/// A record type with a fixed on-ledger encoding.
pub trait AccountData: Sized {
    const DISCRIMINATOR: [u8; DISCRIMINATOR_SIZE];

    fn encode(&self) -> Vec<u8>;

    fn decode(data: &[u8]) -> Result<Self, LayoutError>;
}

pub(crate) struct AccountWriter {
    buf: Vec<u8>,
    size: usize,
}

impl AccountWriter {
    pub fn new(discriminator: &[u8; DISCRIMINATOR_SIZE], size: usize) -> Self {
        let mut buf = Vec::with_capacity(size);
        buf.extend_from_slice(discriminator);
        Self { buf, size }
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.u8(value as u8)
    }

    pub fn u16(&mut self, value: u16) -> &mut Self {
        self.bytes(&value.to_le_bytes())
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.bytes(&value.to_le_bytes())
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.bytes(&value.to_le_bytes())
    }

    pub fn i64(&mut self, value: i64) -> &mut Self {
        self.bytes(&value.to_le_bytes())
    }

    pub fn bytes(&mut self, value: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(value);
        self
    }

    pub fn key(&mut self, key: &PublicKey) -> &mut Self {
        self.bytes(key.as_bytes())
    }

    pub fn commitment(&mut self, commitment: &Commitment) -> &mut Self {
        self.bytes(commitment.as_bytes())
    }

    pub fn content(&mut self, content: &ContentHash) -> &mut Self {
        self.bytes(content.as_bytes())
    }

    pub fn uuid(&mut self, id: &Uuid) -> &mut Self {
        self.bytes(id.as_bytes())
    }

    /// Zero-pad the reserved tail up to the fixed size.
    pub fn finish(&mut self) -> Vec<u8> {
        debug_assert!(self.buf.len() <= self.size, "account layout overflow");
        let mut buf = std::mem::take(&mut self.buf);
        buf.resize(self.size, 0);
        buf
    }
}

pub(crate) struct AccountReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> AccountReader<'a> {
    pub fn new(
        data: &'a [u8],
        discriminator: &[u8; DISCRIMINATOR_SIZE],
        size: usize,
    ) -> Result<Self, LayoutError> {
        if data.len() != size {
            return Err(LayoutError::WrongSize {
                expected: size,
                actual: data.len(),
            });
        }
        if data[..DISCRIMINATOR_SIZE] != discriminator[..] {
            return Err(LayoutError::WrongDiscriminator);
        }
        Ok(Self {
            data,
            pos: DISCRIMINATOR_SIZE,
        })
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], LayoutError> {
        let end = self.pos.checked_add(len).ok_or(LayoutError::Truncated)?;
        let slice = self.data.get(self.pos..end).ok_or(LayoutError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], LayoutError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, LayoutError> {
        Ok(self.take(1)?[0])
    }

    pub fn bool(&mut self) -> Result<bool, LayoutError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(LayoutError::InvalidValue("bool", other as u64)),
        }
    }

    pub fn u16(&mut self) -> Result<u16, LayoutError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32, LayoutError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> Result<u64, LayoutError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn i64(&mut self) -> Result<i64, LayoutError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    pub fn key(&mut self) -> Result<PublicKey, LayoutError> {
        PublicKey::try_from(self.array::<32>()?).map_err(|_| LayoutError::InvalidKey)
    }

    pub fn commitment(&mut self) -> Result<Commitment, LayoutError> {
        Ok(Commitment::from(self.array::<32>()?))
    }

    pub fn content(&mut self) -> Result<ContentHash, LayoutError> {
        Ok(ContentHash::from(self.array::<32>()?))
    }

    pub fn uuid(&mut self) -> Result<Uuid, LayoutError> {
        Ok(Uuid::from_bytes(self.array()?))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const DISC: [u8; 8] = *b"vl:test\0";

    #[test]
    fn test_writer_pads_and_reader_checks() {
        let data = AccountWriter::new(&DISC, 32)
            .u8(7)
            .u16(0xBEEF)
            .i64(-5)
            .bool(true)
            .finish();
        assert_eq!(data.len(), 32);

        let mut reader = AccountReader::new(&data, &DISC, 32).unwrap();
        assert_eq!(reader.u8().unwrap(), 7);
        assert_eq!(reader.u16().unwrap(), 0xBEEF);
        assert_eq!(reader.i64().unwrap(), -5);
        assert!(reader.bool().unwrap());
        // Reserved tail is zeroed.
        assert_eq!(reader.u64().unwrap(), 0);
    }

    #[test]
    fn test_reader_rejects_wrong_shape() {
        let data = AccountWriter::new(&DISC, 16).finish();
        assert_eq!(
            AccountReader::new(&data, &DISC, 17).err(),
            Some(LayoutError::WrongSize {
                expected: 17,
                actual: 16
            })
        );
        assert_eq!(
            AccountReader::new(&data, b"vl:other", 16).err(),
            Some(LayoutError::WrongDiscriminator)
        );

        let mut bad = data.clone();
        bad[8] = 2;
        let mut reader = AccountReader::new(&bad, &DISC, 16).unwrap();
        assert!(matches!(reader.bool(), Err(LayoutError::InvalidValue("bool", 2))));
    }
}
