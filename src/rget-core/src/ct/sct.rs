//! Signed Certificate Timestamps (RFC 6962 §3.2).
//!
//! ```text
//! struct {
//!     Version sct_version;            // v1(0)
//!     LogID id;                       // SHA-256 of the log key
//!     uint64 timestamp;               // ms since epoch
//!     CtExtensions extensions;        // opaque<0..2^16-1>
//!     digitally-signed struct { ... };
//! } SignedCertificateTimestamp;
//! ```

use chrono::{DateTime, TimeZone, Utc};
use rget_crypto::{HashAlgorithm, SignatureAlgorithm, SignatureScheme};

use super::codec::{put_vec16, Reader};
use crate::error::RgetError;

/// X.509 extension carrying an embedded SCT list.
pub const SCT_LIST_OID: &str = "1.3.6.1.4.1.11129.2.4.2";

/// The only SCT version defined by RFC 6962.
pub const SCT_VERSION_V1: u8 = 0;

/// TLS `DigitallySigned` struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitallySigned {
    /// Hash and signature algorithm.
    pub scheme: SignatureScheme,
    /// Signature bytes (DER for ECDSA).
    pub signature: Vec<u8>,
}

impl DigitallySigned {
    pub(crate) fn read(r: &mut Reader<'_>) -> Result<Self, RgetError> {
        let hash = HashAlgorithm::try_from(r.u8()?)
            .map_err(|b| RgetError::parse(format!("unknown hash algorithm {b}")))?;
        let signature = SignatureAlgorithm::try_from(r.u8()?)
            .map_err(|b| RgetError::parse(format!("unknown signature algorithm {b}")))?;
        Ok(Self {
            scheme: SignatureScheme { hash, signature },
            signature: r.vec16()?.to_vec(),
        })
    }

    pub(crate) fn write(&self, out: &mut Vec<u8>) -> Result<(), RgetError> {
        out.push(self.scheme.hash as u8);
        out.push(self.scheme.signature as u8);
        put_vec16(out, &self.signature)
    }

    /// Decode a standalone `DigitallySigned` (STH signatures arrive this way).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RgetError> {
        let mut r = Reader::new(bytes, "digitally-signed");
        let ds = Self::read(&mut r)?;
        r.finish()?;
        Ok(ds)
    }

    /// Encode as TLS bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RgetError> {
        let mut out = Vec::with_capacity(4 + self.signature.len());
        self.write(&mut out)?;
        Ok(out)
    }
}

/// A v1 Signed Certificate Timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCertificateTimestamp {
    /// SHA-256 of the issuing log's public key.
    pub log_id: [u8; 32],
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Opaque CT extensions.
    pub extensions: Vec<u8>,
    /// Log signature over the certificate timestamp.
    pub signature: DigitallySigned,
}

impl SignedCertificateTimestamp {
    /// Decode one serialized SCT.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RgetError> {
        let mut r = Reader::new(bytes, "SCT");
        let version = r.u8()?;
        if version != SCT_VERSION_V1 {
            return Err(RgetError::parse(format!("unsupported SCT version {version}")));
        }
        let log_id = r.array::<32>()?;
        let timestamp = r.u64()?;
        let extensions = r.vec16()?.to_vec();
        let signature = DigitallySigned::read(&mut r)?;
        r.finish()?;

        Ok(Self {
            log_id,
            timestamp,
            extensions,
            signature,
        })
    }

    /// Encode as a serialized SCT.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RgetError> {
        let mut out = Vec::with_capacity(47 + self.extensions.len() + self.signature.signature.len());
        out.push(SCT_VERSION_V1);
        out.extend_from_slice(&self.log_id);
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        put_vec16(&mut out, &self.extensions)?;
        self.signature.write(&mut out)?;
        Ok(out)
    }

    /// Timestamp as a UTC time.
    #[must_use]
    pub fn time(&self) -> DateTime<Utc> {
        timestamp_to_time(self.timestamp)
    }
}

/// Convert a CT millisecond timestamp to UTC.
#[must_use]
pub fn timestamp_to_time(ms: u64) -> DateTime<Utc> {
    i64::try_from(ms)
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Split a `SignedCertificateTimestampList` into serialized SCTs.
///
/// ```text
/// opaque SerializedSCT<1..2^16-1>;
/// struct { SerializedSCT sct_list<1..2^16-1>; } SignedCertificateTimestampList;
/// ```
pub fn parse_sct_list(bytes: &[u8]) -> Result<Vec<Vec<u8>>, RgetError> {
    let mut outer = Reader::new(bytes, "SCT list");
    let mut list = Reader::new(outer.vec16()?, "SCT list");
    outer.finish()?;

    let mut scts = Vec::new();
    while !list.is_empty() {
        let sct = list.vec16()?;
        if sct.is_empty() {
            return Err(RgetError::parse("empty SCT in list"));
        }
        scts.push(sct.to_vec());
    }
    Ok(scts)
}

/// Build a `SignedCertificateTimestampList` from serialized SCTs.
pub fn encode_sct_list(scts: &[Vec<u8>]) -> Result<Vec<u8>, RgetError> {
    let mut inner = Vec::new();
    for sct in scts {
        put_vec16(&mut inner, sct)?;
    }
    let mut out = Vec::with_capacity(inner.len() + 2);
    put_vec16(&mut out, &inner)?;
    Ok(out)
}
