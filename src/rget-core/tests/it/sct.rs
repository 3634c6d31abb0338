//! SCT verification against an in-memory log.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use der::asn1::OctetString;
use der::Encode;
use rcgen::{
    BasicConstraints, CertificateParams, CustomExtension, DnType, IsCa, KeyPair, SerialNumber,
};
use rget_core::ct::{
    encode_sct_list, embedded_scts, CheckOutcome, InclusionOutcome, LogClient, LogDirectory,
    MerkleTreeLeaf, SctSource, SctVerifier, Verdict,
};

use crate::fake_log::{now_ms, FakeLog, HOUR_MS};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);
const SCT_LIST_OID: &[u64] = &[1, 3, 6, 1, 4, 1, 11129, 2, 4, 2];

fn verifier(trusted: &[&Arc<FakeLog>], client: &Arc<FakeLog>) -> SctVerifier {
    verifier_with_timeout(trusted, client, Duration::from_secs(5))
}

fn verifier_with_timeout(
    trusted: &[&Arc<FakeLog>],
    client: &Arc<FakeLog>,
    timeout: Duration,
) -> SctVerifier {
    let logs = LogDirectory::new(trusted.iter().map(|l| l.info.clone()));
    let client: Arc<dyn LogClient> = Arc::clone(client) as Arc<dyn LogClient>;
    SctVerifier::new(Arc::new(logs), client, timeout)
}

fn leaf_cert() -> Vec<u8> {
    let cert = rcgen::generate_simple_self_signed(vec!["record.example".to_string()]).unwrap();
    cert.cert.der().to_vec()
}

struct Issued {
    ca: Vec<u8>,
    leaf: Vec<u8>,
}

/// Issue a leaf twice from the same parameters: once bare (the
/// precertificate body) and once with `scts` embedded.
fn issue_with_scts(sign: impl FnOnce(&MerkleTreeLeaf) -> Vec<Vec<u8>>) -> Issued {
    let ca_key = KeyPair::generate().unwrap();
    let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca_params.distinguished_name.push(DnType::CommonName, "Fake Issuing CA");
    let ca = ca_params.self_signed(&ca_key).unwrap();

    let leaf_key = KeyPair::generate().unwrap();
    let params = || {
        let mut p = CertificateParams::new(vec![
            "cd83cf8f413393d30d53626c5f17f9ae.recorder.merklecounty.com".to_string(),
        ])
        .unwrap();
        p.serial_number = Some(SerialNumber::from(42u64));
        p
    };

    let bare = params().signed_by(&leaf_key, &ca, &ca_key).unwrap();
    let precert = MerkleTreeLeaf::precert(bare.der(), ca.der()).unwrap();
    let list = encode_sct_list(&sign(&precert)).unwrap();

    let mut with_scts = params();
    with_scts.custom_extensions.push(CustomExtension::from_oid_content(
        SCT_LIST_OID,
        OctetString::new(list).unwrap().to_der().unwrap(),
    ));
    let leaf = with_scts.signed_by(&leaf_key, &ca, &ca_key).unwrap();

    Issued {
        ca: ca.der().to_vec(),
        leaf: leaf.der().to_vec(),
    }
}

#[tokio::test]
async fn test_unknown_log_is_invalid_without_network() {
    let trusted = Arc::new(FakeLog::new(DAY));
    let stranger = Arc::new(FakeLog::new(DAY));
    let cert = leaf_cert();
    let leaf = MerkleTreeLeaf::x509(&cert);
    let sct = stranger.issue(&leaf, now_ms() - HOUR_MS);
    stranger.merge(&leaf, &sct);

    let summary = verifier(&[&trusted], &stranger)
        .verify_chain(&[cert], &[sct.to_bytes().unwrap()])
        .await;

    assert_eq!(summary.invalid(), 1);
    assert!(matches!(&summary.reports[0].verdict, Verdict::Invalid(r) if r.contains("Unknown log")));
    assert_eq!(stranger.calls(), 0);
    assert_eq!(trusted.calls(), 0);
}

#[tokio::test]
async fn test_tls_sct_valid() {
    let log = Arc::new(FakeLog::new(DAY));
    let cert = leaf_cert();
    let leaf = MerkleTreeLeaf::x509(&cert);
    let sct = log.issue(&leaf, now_ms() - 2 * HOUR_MS);
    log.merge(&leaf, &sct);

    let summary = verifier(&[&log], &log)
        .verify_chain(&[cert], &[sct.to_bytes().unwrap()])
        .await;

    let report = &summary.reports[0];
    assert_eq!(report.source, SctSource::Tls);
    assert_eq!(report.signature, CheckOutcome::Passed);
    assert_eq!(
        report.inclusion,
        InclusionOutcome::Proven {
            leaf_index: 5,
            tree_size: 6
        }
    );
    assert_eq!(report.verdict, Verdict::Valid);
    assert_eq!(summary.into_result().unwrap().valid(), 1);
}

#[tokio::test]
async fn test_rsa_log_sct_valid() {
    let log = Arc::new(FakeLog::rsa(DAY));
    let cert = leaf_cert();
    let leaf = MerkleTreeLeaf::x509(&cert);
    let sct = log.issue(&leaf, now_ms() - 2 * HOUR_MS);
    log.merge(&leaf, &sct);

    let summary = verifier(&[&log], &log)
        .verify_chain(&[cert], &[sct.to_bytes().unwrap()])
        .await;

    let report = &summary.reports[0];
    assert_eq!(report.signature, CheckOutcome::Passed);
    assert!(matches!(report.inclusion, InclusionOutcome::Proven { .. }));
    assert_eq!(report.verdict, Verdict::Valid);
}

#[tokio::test]
async fn test_bad_signature_with_good_inclusion_is_invalid() {
    let log = Arc::new(FakeLog::new(DAY));
    let cert = leaf_cert();
    let leaf = MerkleTreeLeaf::x509(&cert);
    let sct = log.forge(&leaf, now_ms() - 2 * HOUR_MS);
    log.merge(&leaf, &sct);

    let summary = verifier(&[&log], &log)
        .verify_chain(&[cert], &[sct.to_bytes().unwrap()])
        .await;

    let report = &summary.reports[0];
    assert!(matches!(report.signature, CheckOutcome::Failed(_)));
    assert!(matches!(report.inclusion, InclusionOutcome::Proven { .. }));
    assert!(matches!(report.verdict, Verdict::Invalid(_)));
    assert!(!summary.into_result().unwrap_err().is_retryable_later());
}

#[tokio::test]
async fn test_unmerged_young_sct_is_pending() {
    let log = Arc::new(FakeLog::new(DAY));
    let cert = leaf_cert();
    let leaf = MerkleTreeLeaf::x509(&cert);
    let sct = log.issue(&leaf, now_ms() - HOUR_MS);

    let summary = verifier(&[&log], &log)
        .verify_chain(&[cert], &[sct.to_bytes().unwrap()])
        .await;

    assert_eq!(summary.pending(), 1);
    assert_eq!(summary.valid(), 0);
    assert!(summary.into_result().unwrap_err().is_retryable_later());
}

#[tokio::test]
async fn test_unmerged_old_sct_is_invalid() {
    let log = Arc::new(FakeLog::new(DAY));
    let cert = leaf_cert();
    let leaf = MerkleTreeLeaf::x509(&cert);
    let sct = log.issue(&leaf, now_ms() - 48 * HOUR_MS);

    let summary = verifier(&[&log], &log)
        .verify_chain(&[cert], &[sct.to_bytes().unwrap()])
        .await;

    assert!(matches!(summary.reports[0].inclusion, InclusionOutcome::Unproven { .. }));
    assert_eq!(summary.invalid(), 1);
}

#[tokio::test]
async fn test_offline_log_young_sct_is_pending() {
    let log = Arc::new(FakeLog::new(DAY));
    log.offline.store(true, std::sync::atomic::Ordering::SeqCst);
    let cert = leaf_cert();
    let leaf = MerkleTreeLeaf::x509(&cert);
    let sct = log.issue(&leaf, now_ms() - HOUR_MS);
    log.merge(&leaf, &sct);

    let summary = verifier(&[&log], &log)
        .verify_chain(&[cert], &[sct.to_bytes().unwrap()])
        .await;

    assert_eq!(summary.reports[0].signature, CheckOutcome::Passed);
    assert_eq!(summary.pending(), 1);
    assert_eq!(log.calls(), 1);
}

#[tokio::test]
async fn test_stalled_log_young_sct_is_pending_within_timeout() {
    let log = Arc::new(FakeLog::new(DAY));
    log.stall_ms.store(30_000, Ordering::SeqCst);
    let cert = leaf_cert();
    let leaf = MerkleTreeLeaf::x509(&cert);
    let sct = log.issue(&leaf, now_ms() - HOUR_MS);
    log.merge(&leaf, &sct);

    let started = Instant::now();
    let report = verifier_with_timeout(&[&log], &log, Duration::from_millis(200))
        .check_sct("leaf".into(), SctSource::Tls, &leaf, &sct.to_bytes().unwrap())
        .await;

    assert!(started.elapsed() < Duration::from_secs(5), "{:?}", started.elapsed());
    assert_eq!(report.signature, CheckOutcome::Passed);
    assert!(matches!(report.inclusion, InclusionOutcome::Pending { .. }));
    assert!(matches!(report.verdict, Verdict::Pending(_)));
}

#[tokio::test]
async fn test_stalled_log_old_sct_is_invalid_within_timeout() {
    let log = Arc::new(FakeLog::new(DAY));
    log.stall_ms.store(30_000, Ordering::SeqCst);
    let cert = leaf_cert();
    let leaf = MerkleTreeLeaf::x509(&cert);
    let sct = log.issue(&leaf, now_ms() - 48 * HOUR_MS);
    log.merge(&leaf, &sct);

    let started = Instant::now();
    let report = verifier_with_timeout(&[&log], &log, Duration::from_millis(200))
        .check_sct("leaf".into(), SctSource::Tls, &leaf, &sct.to_bytes().unwrap())
        .await;

    assert!(started.elapsed() < Duration::from_secs(5), "{:?}", started.elapsed());
    assert!(matches!(report.inclusion, InclusionOutcome::Unproven { .. }));
    assert!(matches!(report.verdict, Verdict::Invalid(_)));
}

#[tokio::test]
async fn test_malformed_sct_is_invalid() {
    let log = Arc::new(FakeLog::new(DAY));
    let summary = verifier(&[&log], &log)
        .verify_chain(&[leaf_cert()], &[vec![0x00, 0x01, 0x02]])
        .await;

    assert_eq!(summary.invalid(), 1);
    assert_eq!(log.calls(), 0);
}

#[tokio::test]
async fn test_embedded_sct_valid() {
    let log = Arc::new(FakeLog::new(DAY));
    let timestamp = now_ms() - 3 * HOUR_MS;
    let issued = issue_with_scts(|precert| {
        let sct = log.issue(precert, timestamp);
        log.merge(precert, &sct);
        vec![sct.to_bytes().unwrap()]
    });
    assert_eq!(embedded_scts(&issued.leaf).unwrap().len(), 1);

    let summary = verifier(&[&log], &log)
        .verify_chain(&[issued.leaf, issued.ca], &[])
        .await;

    assert_eq!(summary.reports.len(), 1);
    let report = &summary.reports[0];
    assert_eq!(report.source, SctSource::Embedded);
    assert_eq!(report.timestamp, Some(timestamp));
    assert_eq!(report.verdict, Verdict::Valid);
}

#[tokio::test]
async fn test_embedded_sct_without_issuer_is_invalid() {
    let log = Arc::new(FakeLog::new(DAY));
    let issued = issue_with_scts(|precert| {
        let sct = log.issue(precert, now_ms() - HOUR_MS);
        log.merge(precert, &sct);
        vec![sct.to_bytes().unwrap()]
    });

    // No issuer in the chain and no caIssuers URL to fetch one from.
    let summary = verifier(&[&log], &log).verify_chain(&[issued.leaf], &[]).await;

    assert_eq!(summary.reports.len(), 1);
    assert!(matches!(summary.reports[0].verdict, Verdict::Invalid(_)));
    assert_eq!(log.calls(), 0);
}

#[tokio::test]
async fn test_certificate_without_scts_is_unproven() {
    let log = Arc::new(FakeLog::new(DAY));
    let summary = verifier(&[&log], &log).verify_chain(&[leaf_cert()], &[]).await;

    assert!(summary.reports.is_empty());
    assert!(summary.into_result().is_err());
}
