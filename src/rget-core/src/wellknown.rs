//! Well-known download URL mappings.
//!
//! Maps release download URLs on known hosting sites to the DNS suffix a
//! record is filed under and to the location of the release's
//! `SHA256SUMS`. Only GitHub is mapped today.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::RgetError;

/// Default service root that record labels are certified under.
pub const PUBLIC_SERVICE_HOST: &str = "recorder.merklecounty.com";

/// Length of one hex digest label (16 bytes).
pub const DIGEST_LABEL_LEN: usize = 32;

/// One hosting-site URL shape.
struct SitePath {
    prefix: &'static str,
    pattern: &'static LazyLock<Regex>,
}

static GITHUB_API_ARCHIVE: LazyLock<Regex> = LazyLock::new(|| {
    // https://api.github.com/repos/philips/releases-test/zipball/v2.0
    compile(r"^api\.(?P<root>github\.com)/repos/(?P<org>[A-Za-z0-9_.\-]+)/(?P<repo>[A-Za-z0-9_.\-]+)/(zipball|tarball)/(?P<tag>[A-Za-z0-9_.+\-]+)$")
});

static GITHUB_RELEASE_DOWNLOAD: LazyLock<Regex> = LazyLock::new(|| {
    // https://github.com/philips/releases-test/releases/download/v2.0/SHA256SUMS
    compile(r"^(?P<root>github\.com)/(?P<org>[A-Za-z0-9_.\-]+)/(?P<repo>[A-Za-z0-9_.\-]+)/releases/download/(?P<tag>[A-Za-z0-9_.+\-]+)/(?P<file>[A-Za-z0-9_.+\-]+)$")
});

static GITHUB_ARCHIVE: LazyLock<Regex> = LazyLock::new(|| {
    // https://github.com/philips/releases-test/archive/v2.0.zip
    compile(r"^(?P<root>github\.com)/(?P<org>[A-Za-z0-9_.\-]+)/(?P<repo>[A-Za-z0-9_.\-]+)/archive/(?P<tag>[A-Za-z0-9_.+\-]+)\.(zip|tar\.gz)$")
});

static GITHUB_RELEASE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    // https://github.com/philips/releases-test/releases/tag/v2.0
    compile(r"^(?P<root>github\.com)/(?P<org>[A-Za-z0-9_.\-]+)/(?P<repo>[A-Za-z0-9_.\-]+)/releases/tag/(?P<tag>[A-Za-z0-9_.+\-]+)$")
});

// Patterns are literals; a bad one fails every unit test below.
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static URL pattern")
}

/// URL shapes that identify a release artifact.
static DOWNLOAD_PATHS: [SitePath; 3] = [
    SitePath {
        prefix: "api.github.com/",
        pattern: &GITHUB_API_ARCHIVE,
    },
    SitePath {
        prefix: "github.com/",
        pattern: &GITHUB_RELEASE_DOWNLOAD,
    },
    SitePath {
        prefix: "github.com/",
        pattern: &GITHUB_ARCHIVE,
    },
];

/// Release tag pages, accepted only where a user pastes a URL.
static TAG_PATHS: [SitePath; 1] = [SitePath {
    prefix: "github.com/",
    pattern: &GITHUB_RELEASE_TAG,
}];

/// Fields extracted from a recognized release URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteMatch {
    /// Hosting site root (e.g. `github.com`).
    pub root: String,
    /// Account or organization.
    pub org: String,
    /// Repository name.
    pub repo: String,
    /// Release tag as written.
    pub tag: String,
    /// Release tag made DNS-safe.
    pub dnstag: String,
    /// Record suffix: `<dnstag>.<repo>.<org>.<root>`.
    pub domain: String,
    /// URL prefix of the release's `SHA256SUMS`.
    pub sum_prefix: String,
}

/// Record suffix for a release download URL.
pub fn domain(url: &str) -> Result<String, RgetError> {
    Ok(match_url(url, &DOWNLOAD_PATHS)?.domain)
}

/// URL prefix under which a release's `SHA256SUMS` lives.
pub fn sum_prefix(url: &str) -> Result<String, RgetError> {
    Ok(match_url(url, &DOWNLOAD_PATHS)?.sum_prefix)
}

/// Parse any GitHub release URL, including release tag pages.
pub fn github_matches(url: &str) -> Result<SiteMatch, RgetError> {
    match_url(url, &DOWNLOAD_PATHS).or_else(|_| match_url(url, &TAG_PATHS))
}

/// Whether `label` is a 32 character lowercase hex digest label.
#[must_use]
pub fn is_digest_label(label: &str) -> bool {
    label.len() == DIGEST_LABEL_LEN
        && label
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Strip `<short>.<long>.` and `.<root>` from a record host.
///
/// `2fcd...dd93.1e7c...7514.v0-0-4.rget.merklecounty.github.com.<root>`
/// becomes `v0-0-4.rget.merklecounty.github.com`.
pub fn trim_digest_domain(host: &str, root: &str) -> Result<String, RgetError> {
    let rest = host
        .strip_suffix(root)
        .and_then(|h| h.strip_suffix('.'))
        .ok_or_else(|| RgetError::parse(format!("{host} is not under {root}")))?;

    let mut labels = rest.splitn(3, '.');
    let short = labels.next().unwrap_or_default();
    let long = labels.next().unwrap_or_default();
    let suffix = labels.next().unwrap_or_default();

    if !is_digest_label(short) || !is_digest_label(long) {
        return Err(RgetError::parse(format!("{host} has no digest labels")));
    }
    if suffix.is_empty() {
        return Err(RgetError::parse(format!("{host} has no project domain")));
    }
    Ok(suffix.to_string())
}

fn match_url(url: &str, paths: &[SitePath]) -> Result<SiteMatch, RgetError> {
    let path = url.strip_prefix("https://").unwrap_or(url);

    for site in paths {
        if !path.starts_with(site.prefix) {
            continue;
        }
        let Some(caps) = site.pattern.captures(path) else {
            continue;
        };
        let field = |name: &str| {
            caps.name(name)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default()
        };

        let (root, org, repo, tag) = (field("root"), field("org"), field("repo"), field("tag"));
        // Extra labels break ACME issuance.
        let dnstag = tag.replace(['.', '+'], "-");
        let domain = format!("{dnstag}.{repo}.{org}.{root}");
        let sum_prefix = format!("https://github.com/{org}/{repo}/releases/download/{tag}/");

        return Ok(SiteMatch {
            root,
            org,
            repo,
            tag,
            dnstag,
            domain,
            sum_prefix,
        });
    }

    Err(RgetError::UnknownSite { url: url.into() })
}
