//! TLS presentation-language encoding (RFC 5246 §4) for CT structures.

use crate::error::RgetError;

/// Cursor over TLS-encoded bytes.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    what: &'static str,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8], what: &'static str) -> Self {
        Self { buf, what }
    }

    pub(crate) fn bytes(&mut self, n: usize) -> Result<&'a [u8], RgetError> {
        if self.buf.len() < n {
            return Err(RgetError::parse(format!(
                "truncated {}: need {} bytes, have {}",
                self.what,
                n,
                self.buf.len()
            )));
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn uint(&mut self, width: usize) -> Result<u64, RgetError> {
        Ok(self
            .bytes(width)?
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }

    pub(crate) fn u8(&mut self) -> Result<u8, RgetError> {
        Ok(self.bytes(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, RgetError> {
        Ok(self.uint(2)? as u16)
    }

    pub(crate) fn u64(&mut self) -> Result<u64, RgetError> {
        self.uint(8)
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N], RgetError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    /// `opaque<0..2^16-1>`
    pub(crate) fn vec16(&mut self) -> Result<&'a [u8], RgetError> {
        let n = self.u16()? as usize;
        self.bytes(n)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Fail unless every byte was consumed.
    pub(crate) fn finish(self) -> Result<(), RgetError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(RgetError::parse(format!(
                "{} trailing bytes after {}",
                self.buf.len(),
                self.what
            )))
        }
    }
}

/// Append `opaque<0..2^16-1>`.
pub(crate) fn put_vec16(out: &mut Vec<u8>, data: &[u8]) -> Result<(), RgetError> {
    let n = u16::try_from(data.len())
        .map_err(|_| RgetError::parse(format!("{} bytes exceed a 16-bit vector", data.len())))?;
    out.extend_from_slice(&n.to_be_bytes());
    out.extend_from_slice(data);
    Ok(())
}

/// Append `opaque<1..2^24-1>`.
pub(crate) fn put_vec24(out: &mut Vec<u8>, data: &[u8]) -> Result<(), RgetError> {
    if data.is_empty() || data.len() >= 1 << 24 {
        return Err(RgetError::parse(format!(
            "{} bytes do not fit a 24-bit vector",
            data.len()
        )));
    }
    out.extend_from_slice(&(data.len() as u32).to_be_bytes()[1..]);
    out.extend_from_slice(data);
    Ok(())
}
