//! Log entries and the structures CT logs hash and sign over them.
//!
//! A log signs the same timestamped entry it later stores as a Merkle leaf,
//! so [`MerkleTreeLeaf`] produces both the SCT signature input (RFC 6962
//! §3.2) and the leaf hash looked up in `get-proof-by-hash` (§3.4).

use der::asn1::OctetString;
use der::{Decode, Encode};
use sha2::{Digest, Sha256};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::AuthorityInfoAccessSyntax;
use x509_cert::Certificate;

use super::codec::{put_vec16, put_vec24};
use super::sct::{parse_sct_list, SignedCertificateTimestamp, SCT_LIST_OID};
use crate::error::RgetError;
use crate::merkle::{hash_leaf, Hash};

const OID_AUTHORITY_INFO_ACCESS: &str = "1.3.6.1.5.5.7.1.1";
const OID_CA_ISSUERS: &str = "1.3.6.1.5.5.7.48.2";

/// `LogEntryType.x509_entry`
pub const ENTRY_TYPE_X509: u16 = 0;
/// `LogEntryType.precert_entry`
pub const ENTRY_TYPE_PRECERT: u16 = 1;
/// `SignatureType.certificate_timestamp`
pub const SIGNATURE_TYPE_CERTIFICATE_TIMESTAMP: u8 = 0;
/// `SignatureType.tree_hash`
pub const SIGNATURE_TYPE_TREE_HASH: u8 = 1;
/// `MerkleLeafType.timestamped_entry`
pub const LEAF_TYPE_TIMESTAMPED_ENTRY: u8 = 0;

/// What a log recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// A final certificate, as DER.
    X509(Vec<u8>),
    /// A precertificate: issuer key hash plus the leaf TBSCertificate with
    /// the SCT-list extension removed.
    Precert {
        /// SHA-256 of the issuer's DER SubjectPublicKeyInfo.
        issuer_key_hash: [u8; 32],
        /// DER TBSCertificate.
        tbs_certificate: Vec<u8>,
    },
}

/// An RFC 6962 timestamped entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTreeLeaf {
    /// Milliseconds since epoch, taken from the SCT.
    pub timestamp: u64,
    /// The logged entry.
    pub entry: LogEntry,
    /// CT extensions, taken from the SCT.
    pub extensions: Vec<u8>,
}

impl MerkleTreeLeaf {
    /// Leaf for an SCT delivered alongside a final certificate.
    #[must_use]
    pub fn x509(cert_der: &[u8]) -> Self {
        Self {
            timestamp: 0,
            entry: LogEntry::X509(cert_der.to_vec()),
            extensions: Vec::new(),
        }
    }

    /// Leaf for SCTs embedded in `leaf_der`, issued by `issuer_der`.
    pub fn precert(leaf_der: &[u8], issuer_der: &[u8]) -> Result<Self, RgetError> {
        let leaf = parse_certificate(leaf_der)?;
        let issuer = parse_certificate(issuer_der)?;

        let spki = issuer
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| RgetError::parse(format!("issuer key encoding: {e}")))?;
        let issuer_key_hash: [u8; 32] = Sha256::digest(&spki).into();

        let mut tbs = leaf.tbs_certificate;
        if let Some(exts) = tbs.extensions.take() {
            let kept: Vec<_> = exts
                .into_iter()
                .filter(|ext| ext.extn_id.to_string() != SCT_LIST_OID)
                .collect();
            tbs.extensions = (!kept.is_empty()).then_some(kept);
        }
        let tbs_certificate = tbs
            .to_der()
            .map_err(|e| RgetError::parse(format!("TBSCertificate encoding: {e}")))?;

        Ok(Self {
            timestamp: 0,
            entry: LogEntry::Precert {
                issuer_key_hash,
                tbs_certificate,
            },
            extensions: Vec::new(),
        })
    }

    /// Copy of this leaf carrying `sct`'s timestamp and extensions.
    #[must_use]
    pub fn with_sct(&self, sct: &SignedCertificateTimestamp) -> Self {
        Self {
            timestamp: sct.timestamp,
            entry: self.entry.clone(),
            extensions: sct.extensions.clone(),
        }
    }

    /// Bytes a log signs to produce an SCT for this entry.
    pub fn signature_input(&self) -> Result<Vec<u8>, RgetError> {
        self.encode(SIGNATURE_TYPE_CERTIFICATE_TIMESTAMP)
    }

    /// `MerkleTreeLeaf` wire encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RgetError> {
        self.encode(LEAF_TYPE_TIMESTAMPED_ENTRY)
    }

    /// RFC 6962 leaf hash, as submitted to `get-proof-by-hash`.
    pub fn leaf_hash(&self) -> Result<Hash, RgetError> {
        Ok(hash_leaf(&self.to_bytes()?))
    }

    // Both structures are version(0), a one-byte type, then the
    // timestamped entry.
    fn encode(&self, kind: u8) -> Result<Vec<u8>, RgetError> {
        let mut out = Vec::with_capacity(1024);
        out.push(0);
        out.push(kind);
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        match &self.entry {
            LogEntry::X509(cert) => {
                out.extend_from_slice(&ENTRY_TYPE_X509.to_be_bytes());
                put_vec24(&mut out, cert)?;
            }
            LogEntry::Precert {
                issuer_key_hash,
                tbs_certificate,
            } => {
                out.extend_from_slice(&ENTRY_TYPE_PRECERT.to_be_bytes());
                out.extend_from_slice(issuer_key_hash);
                put_vec24(&mut out, tbs_certificate)?;
            }
        }
        put_vec16(&mut out, &self.extensions)?;
        Ok(out)
    }
}

/// Serialized SCTs embedded in a certificate. Empty if it carries none.
pub fn embedded_scts(cert_der: &[u8]) -> Result<Vec<Vec<u8>>, RgetError> {
    let cert = parse_certificate(cert_der)?;
    let Some(ext) = find_extension(&cert, SCT_LIST_OID) else {
        return Ok(Vec::new());
    };
    let list = OctetString::from_der(ext.extn_value.as_bytes())
        .map_err(|e| RgetError::parse(format!("SCT list extension: {e}")))?;
    parse_sct_list(list.as_bytes())
}

/// `caIssuers` URLs from the Authority Information Access extension.
pub fn ca_issuer_urls(cert_der: &[u8]) -> Result<Vec<String>, RgetError> {
    let cert = parse_certificate(cert_der)?;
    let Some(ext) = find_extension(&cert, OID_AUTHORITY_INFO_ACCESS) else {
        return Ok(Vec::new());
    };
    let aia = AuthorityInfoAccessSyntax::from_der(ext.extn_value.as_bytes())
        .map_err(|e| RgetError::parse(format!("AIA extension: {e}")))?;

    Ok(aia
        .0
        .iter()
        .filter(|ad| ad.access_method.to_string() == OID_CA_ISSUERS)
        .filter_map(|ad| match &ad.access_location {
            GeneralName::UniformResourceIdentifier(uri) => Some(uri.to_string()),
            _ => None,
        })
        .collect())
}

pub(crate) fn parse_certificate(der: &[u8]) -> Result<Certificate, RgetError> {
    Certificate::from_der(der).map_err(|e| RgetError::parse(format!("failed to decode certificate DER: {e}")))
}

pub(crate) fn find_extension<'a>(
    cert: &'a Certificate,
    oid: &str,
) -> Option<&'a x509_cert::ext::Extension> {
    cert.tbs_certificate
        .extensions
        .as_ref()?
        .iter()
        .find(|ext| ext.extn_id.to_string() == oid)
}
