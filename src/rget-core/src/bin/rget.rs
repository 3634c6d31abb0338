//! rget CLI - record release sum files and verify downloads against
//! Certificate Transparency.
//!
//! Exit status: 0 on success, 1 on failure, 2 when a certificate's SCTs
//! are not yet provably merged into their logs and the check should be
//! retried later.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use rget_core::config::DEFAULT_LOG_LIST_URL;
use rget_core::ct::{fetch_site_chain, Verdict};
use rget_core::server::{self, submit_to};
use rget_core::sums::digest_reader;
use rget_core::wellknown::{self, PUBLIC_SERVICE_HOST};
use rget_core::{
    ContentAddressableCache, DynamicCertPolicy, GitAuditLog, GitAuditOptions, HostPolicy,
    HttpLogClient, LogDirectory, Recorder, RgetConfig, RgetError, SctVerifier, UrlSumList,
    VerificationSummary, BUILD_REVISION, VERSION,
};

const EXIT_FAILURE: i32 = 1;
const EXIT_RETRY_LATER: i32 = 2;

/// rget - binary transparency for release downloads.
///
/// A release's SHA256SUMS is folded into a Merkle tree whose root becomes a
/// DNS name under the recorder's domain. The recorder obtains a certificate
/// for that name, which puts it in public Certificate Transparency logs.
/// `rget verify` recomputes the name from the published sums and checks that
/// a logged certificate vouches for it.
#[derive(Parser)]
#[command(name = "rget")]
#[command(version = VERSION)]
#[command(about = "Binary transparency for release downloads")]
#[command(long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Domain record names are certified under
    #[arg(long, default_value = PUBLIC_SERVICE_HOST)]
    service_root: String,

    /// Trusted CT log list (URL or path)
    #[arg(long, default_value = DEFAULT_LOG_LIST_URL)]
    log_list: String,

    /// Network timeout in seconds
    #[arg(long, default_value = "30")]
    timeout: u64,

    /// Audit repository working tree
    #[arg(long, default_value = "public")]
    cache_dir: PathBuf,

    /// Audit repository remote
    #[arg(long)]
    git_remote: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hash local files into a SHA256SUMS list and print its record name
    Sum {
        /// Files to hash, in list order
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show the record suffix and sum file location for a release URL
    Domain {
        /// Release download or tag URL
        url: String,
    },

    /// Verify a release download against its certified sum file
    ///
    /// The download is hashed in memory and discarded; nothing is written to
    /// disk. Fetch the file separately once it verifies.
    Verify {
        /// Release download URL (checked, not saved)
        url: String,

        /// Hash this local copy instead of downloading the URL
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Record a sum file in the audit repository
    Record {
        /// SHA256SUMS release URL or local path
        source: String,

        /// Record suffix for a local file (e.g. v1-0-0.repo.org.github.com)
        #[arg(long)]
        suffix: Option<String>,
    },

    /// Ask a recorder service to record a release's sum file
    Submit {
        /// SHA256SUMS release URL
        url: String,

        /// Recorder base URL (default: https://<service root>)
        #[arg(long)]
        server: Option<String>,
    },

    /// Run the recorder submission API over the audit repository
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8080")]
        listen: String,
    },

    /// Show the certificate policy for a hostname
    Policy {
        /// SNI hostname
        host: String,
    },

    /// Show version and build information
    Version,
}

impl Cli {
    fn config(&self) -> RgetConfig {
        RgetConfig {
            service_root: self.service_root.clone(),
            log_list: self.log_list.clone(),
            timeout: Duration::from_secs(self.timeout),
            cache_dir: self.cache_dir.clone(),
            git_remote: self.git_remote.clone(),
            ..RgetConfig::default()
        }
    }
}

fn fail(err: &RgetError, json: bool) -> ! {
    if json {
        let output = serde_json::json!({
            "error": err.to_string(),
            "retry_later": err.is_retryable_later(),
        });
        println!("{output}");
    } else {
        eprintln!("rget: {err}");
    }
    if err.is_retryable_later() {
        std::process::exit(EXIT_RETRY_LATER);
    }
    std::process::exit(EXIT_FAILURE);
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => fail(&RgetError::parse(format!("JSON encoding failed: {e}")), false),
    }
}

fn open_cache(config: &RgetConfig) -> Result<Arc<ContentAddressableCache<GitAuditLog>>, RgetError> {
    let log = GitAuditLog::open(GitAuditOptions::from_config(config))?;
    Ok(Arc::new(ContentAddressableCache::new(log)?))
}

fn run_sum(files: &[PathBuf], config: &RgetConfig, json: bool) -> Result<(), RgetError> {
    let mut sums = UrlSumList::new();
    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        sums.add_reader(name, File::open(path)?)?;
    }

    let name = format!("{}.{}", sums.domain(), config.service_root);
    if json {
        print_json(&serde_json::json!({
            "sums": sums.to_sum_file(),
            "domain": sums.domain(),
            "name": name,
        }));
    } else {
        print!("{}", sums.to_sum_file());
        println!();
        println!("{name}");
    }
    Ok(())
}

fn run_domain(url: &str, json: bool) -> Result<(), RgetError> {
    let site = wellknown::github_matches(url)?;
    let sums_url = format!("{}SHA256SUMS", site.sum_prefix);
    if json {
        print_json(&serde_json::json!({
            "domain": site.domain,
            "sums_url": sums_url,
        }));
    } else {
        println!("Domain:   {}", site.domain);
        println!("Sum file: {sums_url}");
    }
    Ok(())
}

async fn run_verify(
    url: &str,
    file: Option<&Path>,
    config: &RgetConfig,
) -> Result<VerificationSummary, RgetError> {
    let site = wellknown::domain(url)?;
    let sums_url = format!("{}SHA256SUMS", wellknown::sum_prefix(url)?);
    let sums = UrlSumList::fetch(&sums_url, config.timeout).await?;
    if sums.is_empty() {
        return Err(RgetError::parse(format!("{sums_url} lists no files")));
    }

    let digest = match file {
        Some(path) => digest_reader(File::open(path)?)?.to_vec(),
        None => {
            let mut download = UrlSumList::new();
            download.add_url(url, config.timeout).await?;
            download
                .entries()
                .first()
                .map(|e| e.sum().to_vec())
                .ok_or_else(|| RgetError::http(format!("no body hashed for {url}")))?
        }
    };
    if !sums.sum_exists(&digest) {
        return Err(RgetError::NotFound {
            name: format!("digest {} in {sums_url}", hex::encode(&digest)),
        });
    }

    let host = format!("{}.{site}.{}", sums.domain(), config.service_root);
    let chain = fetch_site_chain(&format!("https://{host}/"), config.timeout).await?;

    let logs = Arc::new(LogDirectory::load(&config.log_list, config.timeout).await?);
    let client = Arc::new(HttpLogClient::new(config.timeout)?);
    let verifier = SctVerifier::new(logs, client, config.timeout);
    Ok(verifier.verify_chain(&chain.chain, &chain.tls_scts).await)
}

fn print_summary(summary: &VerificationSummary, json: bool) {
    if json {
        print_json(summary);
        return;
    }
    for report in &summary.reports {
        let verdict = match &report.verdict {
            Verdict::Valid => "valid".to_string(),
            Verdict::Pending(reason) => format!("pending ({reason})"),
            Verdict::Invalid(reason) => format!("invalid ({reason})"),
        };
        println!(
            "  {:<18} {:<28} {}",
            report.subject,
            report.log.as_deref().unwrap_or("unknown log"),
            verdict
        );
    }
    println!("{summary}");
}

async fn run_record(
    source: &str,
    suffix: Option<&str>,
    config: &RgetConfig,
    json: bool,
) -> Result<(), RgetError> {
    let cache = open_cache(config)?;
    let recorder = Recorder::new(cache, config.timeout);

    let submission = if source.starts_with("https://") || source.starts_with("http://") {
        recorder.submit_url(source).await?
    } else {
        let bytes = std::fs::read(source)?;
        recorder.submit(&bytes, suffix)?
    };

    if json {
        print_json(&submission);
    } else if submission.cache_hit {
        println!("Already recorded: {}", submission.name);
    } else {
        println!("Recorded: {}", submission.name);
    }
    Ok(())
}

async fn run_submit(
    url: &str,
    server: Option<&str>,
    config: &RgetConfig,
    json: bool,
) -> Result<(), RgetError> {
    let server = server
        .map(String::from)
        .unwrap_or_else(|| format!("https://{}", config.service_root));
    let submission = submit_to(&server, url, config.timeout).await?;

    if json {
        print_json(&submission);
        return Ok(());
    }
    if submission.cache_hit {
        println!("Already recorded: {}", submission.name);
    } else {
        println!("Recorded: {}", submission.name);
    }
    println!("Certificate host: {}.{}", submission.name, config.service_root);
    Ok(())
}

async fn run_serve(listen: &str, config: &RgetConfig) -> Result<(), RgetError> {
    let cache = open_cache(config)?;
    let recorder = Arc::new(Recorder::new(cache, config.timeout));
    server::serve(server::router(recorder), listen).await
}

fn run_policy(host: &str, config: &RgetConfig, json: bool) -> Result<(), RgetError> {
    let cache = open_cache(config)?;
    let policy = DynamicCertPolicy::new(cache, &config.service_root).policy_for(host)?;
    if json {
        print_json(&policy);
    } else {
        println!("CN:  {}", policy.common_name);
        for name in &policy.dns_names {
            println!("SAN: {name}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let json_output = cli.format == "json";

    // Initialize logging (suppress for JSON output)
    if json_output {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::ERROR)
            .with_target(false)
            .init();
    } else if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_target(false)
            .init();
    }

    let config = cli.config();

    let result = match &cli.command {
        Commands::Sum { files } => run_sum(files, &config, json_output),
        Commands::Domain { url } => run_domain(url, json_output),
        Commands::Verify { url, file } => match run_verify(url, file.as_deref(), &config).await {
            Ok(summary) => {
                print_summary(&summary, json_output);
                summary.into_result().map(|_| ())
            },
            Err(e) => Err(e),
        },
        Commands::Record { source, suffix } => {
            run_record(source, suffix.as_deref(), &config, json_output).await
        },
        Commands::Submit { url, server } => {
            run_submit(url, server.as_deref(), &config, json_output).await
        },
        Commands::Serve { listen } => run_serve(listen, &config).await,
        Commands::Policy { host } => run_policy(host, &config, json_output),
        Commands::Version => {
            println!("rget {VERSION} ({BUILD_REVISION})");
            Ok(())
        },
    };

    if let Err(e) = result {
        fail(&e, json_output);
    }
}
