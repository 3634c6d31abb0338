//! Ordered URL digest lists and their `SHA256SUMS` text form.
//!
//! A [`UrlSumList`] is the unit that gets recorded: its entries, in order,
//! are the Merkle leaves whose root becomes the record's DNS label.
//!
//! Wire form, one line per entry:
//!
//! ```text
//! <hex digest>  <url>
//! ```
//!
//! The URL is the rest of the line after the separator, spaces included.
//! A `*` in place of the second space (binary mode) is accepted on input.

use std::io::Read;
use std::time::Duration;

use reqwest::Client;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::error::RgetError;
use crate::merkle::{Hash, MerkleAccumulator};

/// One (URL, digest) pair.
///
/// The digest is kept as raw bytes rather than `[u8; 32]` so that lists
/// parsed from arbitrary sum files re-serialize losslessly. Every entry has
/// a non-empty digest and a non-empty single-line URL, so its text form
/// always parses back to the same entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlSum {
    url: String,
    sum: Vec<u8>,
}

impl UrlSum {
    /// Create a new entry.
    pub fn new(url: impl Into<String>, sum: impl Into<Vec<u8>>) -> Result<Self, RgetError> {
        let (url, sum) = (url.into(), sum.into());
        if sum.is_empty() {
            return Err(RgetError::parse(format!("empty digest for {url:?}")));
        }
        if url.is_empty() || url.contains(['\n', '\r']) {
            return Err(RgetError::parse(format!("URL must be one non-empty line: {url:?}")));
        }
        Ok(Self { url, sum })
    }

    /// Source URL or file name.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Digest bytes; the Merkle leaf data.
    #[must_use]
    pub fn sum(&self) -> &[u8] {
        &self.sum
    }

    /// Parse one `SHA256SUMS` line.
    pub fn parse_line(line: &str) -> Result<Self, RgetError> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let Some((hex_sum, rest)) = line.split_once(' ') else {
            return Err(RgetError::parse(format!("expected '<digest>  <url>': {line:?}")));
        };
        let url = rest
            .strip_prefix(' ')
            .or_else(|| rest.strip_prefix('*'))
            .unwrap_or(rest);
        let sum = hex::decode(hex_sum)
            .map_err(|e| RgetError::parse(format!("bad digest {hex_sum:?}: {e}")))?;
        Self::new(url, sum)
    }
}

/// Ordered list of [`UrlSum`]; order is Merkle leaf order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlSumList {
    entries: Vec<UrlSum>,
}

impl UrlSumList {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `SHA256SUMS` file.
    ///
    /// Lines that do not parse are skipped with a warning; blank lines are
    /// skipped silently.
    #[must_use]
    pub fn from_sum_file(text: &str) -> Self {
        let mut entries = Vec::new();
        for (n, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match UrlSum::parse_line(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(line = n + 1, error = %e, "Skipping malformed sum line"),
            }
        }
        Self { entries }
    }

    /// Serialize to `SHA256SUMS` text.
    #[must_use]
    pub fn to_sum_file(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}  {}\n", hex::encode(&e.sum), e.url))
            .collect()
    }

    /// Append an entry.
    pub fn push(&mut self, entry: UrlSum) {
        self.entries.push(entry);
    }

    /// Entries in leaf order.
    #[must_use]
    pub fn entries(&self) -> &[UrlSum] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// RFC 6962 root over the digests in order.
    #[must_use]
    pub fn merkle_root(&self) -> Hash {
        let mut tree = MerkleAccumulator::new();
        for e in &self.entries {
            tree.add_leaf(&e.sum);
        }
        tree.current_root()
    }

    /// Full label: `<hex(root[0:16])>.<hex(root[16:32])>`.
    #[must_use]
    pub fn domain(&self) -> String {
        let root = self.merkle_root();
        format!("{}.{}", hex::encode(&root[..16]), hex::encode(&root[16..]))
    }

    /// Short label: `<hex(root[0:16])>`.
    #[must_use]
    pub fn short_domain(&self) -> String {
        hex::encode(&self.merkle_root()[..16])
    }

    /// Entry for `url`, if present.
    #[must_use]
    pub fn get_url_sum(&self, url: &str) -> Option<&UrlSum> {
        self.entries.iter().find(|e| e.url == url)
    }

    /// Whether any entry carries `sum`.
    #[must_use]
    pub fn sum_exists(&self, sum: &[u8]) -> bool {
        self.entries.iter().any(|e| e.sum == sum)
    }

    /// Hash `reader` and append it under `url`.
    pub fn add_reader(&mut self, url: impl Into<String>, reader: impl Read) -> Result<(), RgetError> {
        let sum = digest_reader(reader)?;
        self.push(UrlSum::new(url, sum.to_vec())?);
        Ok(())
    }

    /// Download `url`, hash its body and append it.
    #[instrument(skip(self))]
    pub async fn add_url(&mut self, url: &str, timeout: Duration) -> Result<(), RgetError> {
        let body = fetch_bytes(url, timeout).await?;
        let sum: Hash = Sha256::digest(&body).into();
        info!(url = %url, sum = %hex::encode(sum), "Hashed download");
        self.push(UrlSum::new(url, sum.to_vec())?);
        Ok(())
    }

    /// Download and parse a `SHA256SUMS` file.
    #[instrument]
    pub async fn fetch(url: &str, timeout: Duration) -> Result<Self, RgetError> {
        let body = fetch_bytes(url, timeout).await?;
        let text = String::from_utf8(body)
            .map_err(|e| RgetError::parse(format!("{url} is not UTF-8: {e}")))?;
        Ok(Self::from_sum_file(&text))
    }
}

impl FromIterator<UrlSum> for UrlSumList {
    fn from_iter<T: IntoIterator<Item = UrlSum>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// SHA-256 of everything `reader` yields.
pub fn digest_reader(mut reader: impl Read) -> Result<Hash, RgetError> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().into())
}

/// GET `url` and return the body.
pub(crate) async fn fetch_bytes(url: &str, timeout: Duration) -> Result<Vec<u8>, RgetError> {
    let client = http_client(timeout)?;
    debug!("Fetching {}", url);

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| RgetError::http(format!("GET {url} failed: {e}")))?;

    if !response.status().is_success() {
        return Err(RgetError::http(format!(
            "GET {url}: HTTP {}",
            response.status()
        )));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| RgetError::http(format!("reading {url}: {e}")))?;
    Ok(body.to_vec())
}

/// Shared client construction for every outbound HTTP call.
pub(crate) fn http_client(timeout: Duration) -> Result<Client, RgetError> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(5).min(timeout))
        .user_agent(format!("rget/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| RgetError::http(format!("Failed to create HTTP client: {e}")))
}

/// The rget v0.0.6 release `SHA256SUMS`.
#[cfg(test)]
pub(crate) const RGET_V006_SUMS: &str = "\
d4cb7fc206cbd147b3397c1e1b88513831c9780fc9675bebc300112365979465  rget-v0.0.6-linux-arm.tar.gz
7239591ab580c911738130cc62d8a5cd9c6c05c79fa7abfdf32bad0d68a70844  rget-v0.0.6-windows-amd64.tar.gz
18908181de67376c12b7e34de7c3e4aeaddc24cebab8c7d8115cf31dfbe236f2  rget-v0.0.6-linux-amd64.tar.gz
38c6ee23c7f5fbdc7ef207dda25d8e030c8300fa94d71b6b4adc878af9343ba8  rget-v0.0.6-linux-arm64.tar.gz
5b64ee638b847ca72dc1d029437d69e987d439ff420135241687975c6ca2484a  rget-v0.0.6-darwin-amd64.tar.gz";
