// # ddns-sync - one-shot DDNS reconciler
//
// The ddns-sync binary is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Building the provider and IP source through the registry
// 4. Running exactly one reconciliation and reporting what happened
//
// It is meant to be started by a scheduler (cron, systemd timer). It holds no
// state between runs and never retries; the next scheduled run is the retry.
//
// ## Configuration
//
// ### Record
// - `DDNS_ZONE_NAME`: Zone holding the record (e.g. example.com)
// - `DDNS_RECORD_NAME`: Fully-qualified record name (e.g. home.example.com)
//
// ### DNS Provider
// - `DDNS_PROVIDER_TYPE`: Provider type (cloudflare)
// - `DDNS_PROVIDER_API_TOKEN`: Scoped API token, or
// - `DDNS_PROVIDER_API_EMAIL` + `DDNS_PROVIDER_API_KEY`: global API key
// - `DDNS_PROVIDER_API_URL`: API base URL override (optional)
//
// ### IP Source
// - `DDNS_IP_SOURCE_URL`: URL returning the public IP (default: ipify JSON)
//
// ### Runtime
// - `DDNS_HTTP_TIMEOUT_SECS`: Per-request timeout for both the provider and the
//   IP source, 1-300 (default 30 for the provider, 10 for the IP source)
// - `DDNS_MODE`: `live` (default) or `dry-run`
// - `DDNS_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export DDNS_ZONE_NAME=example.com
// export DDNS_RECORD_NAME=home.example.com
// export DDNS_PROVIDER_API_TOKEN=your_token
//
// ddns-sync
// ```

use anyhow::Result;
use ddns_core::config::{
    CloudflareCredentials, DEFAULT_IP_SOURCE_TIMEOUT_SECS, DEFAULT_IP_SOURCE_URL,
    DEFAULT_PROVIDER_TIMEOUT_SECS,
};
use ddns_core::{
    DdnsConfig, IpSourceConfig, ProviderConfig, ProviderRegistry, ReconcileError,
    ReconcileEvent, ReconcileOutcome, Reconciler, RecordConfig,
};
use std::env;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for the possible run results
///
/// - 0: Record reconciled (including no-op), or a non-fatal step failed
/// - 1: Fatal upstream condition (no public IP, zone not resolvable)
/// - 2: Configuration or startup error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncExitCode {
    /// Run finished
    Success = 0,
    /// Public IP or zone unavailable
    FatalUpstream = 1,
    /// Configuration error or startup failure
    ConfigError = 2,
}

impl From<SyncExitCode> for ExitCode {
    fn from(code: SyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    zone_name: String,
    record_name: String,
    provider_type: String,
    api_token: Option<String>,
    api_email: Option<String>,
    api_key: Option<String>,
    api_url: Option<String>,
    ip_source_url: String,
    /// Overrides both per-component defaults when set
    http_timeout_secs: Option<u64>,
    mode: String,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // Empty values count as unset
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let http_timeout_secs = var("DDNS_HTTP_TIMEOUT_SECS")
            .map(|raw| {
                raw.parse().map_err(|_| {
                    anyhow::anyhow!(
                        "DDNS_HTTP_TIMEOUT_SECS must be a number of seconds. Got: {}",
                        raw
                    )
                })
            })
            .transpose()?;

        Ok(Self {
            zone_name: var("DDNS_ZONE_NAME").unwrap_or_default(),
            record_name: var("DDNS_RECORD_NAME").unwrap_or_default(),
            provider_type: var("DDNS_PROVIDER_TYPE").unwrap_or_else(|| "cloudflare".to_string()),
            api_token: var("DDNS_PROVIDER_API_TOKEN"),
            api_email: var("DDNS_PROVIDER_API_EMAIL"),
            api_key: var("DDNS_PROVIDER_API_KEY"),
            api_url: var("DDNS_PROVIDER_API_URL"),
            ip_source_url: var("DDNS_IP_SOURCE_URL")
                .unwrap_or_else(|| DEFAULT_IP_SOURCE_URL.to_string()),
            http_timeout_secs,
            mode: var("DDNS_MODE").unwrap_or_else(|| "live".to_string()),
            log_level: var("DDNS_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// This performs validation including:
    /// - Required field presence
    /// - Credential shape and placeholder detection
    /// - Domain name format
    /// - Numeric range validation
    /// - Type enumeration validation
    fn validate(&self) -> Result<()> {
        if self.zone_name.is_empty() {
            anyhow::bail!(
                "DDNS_ZONE_NAME is required. \
                Set it via: export DDNS_ZONE_NAME=example.com"
            );
        }

        if self.record_name.is_empty() {
            anyhow::bail!(
                "DDNS_RECORD_NAME is required. \
                Set it via: export DDNS_RECORD_NAME=home.example.com"
            );
        }

        RecordConfig::new(&self.zone_name, &self.record_name).validate()?;

        match self.provider_type.as_str() {
            "cloudflare" => {}
            _ => anyhow::bail!(
                "DDNS_PROVIDER_TYPE '{}' is not supported. \
                Supported providers: cloudflare",
                self.provider_type
            ),
        }

        self.credentials()?;

        if !self.ip_source_url.starts_with("https://") && !self.ip_source_url.starts_with("http://")
        {
            anyhow::bail!(
                "DDNS_IP_SOURCE_URL must use HTTP or HTTPS scheme. Got: {}",
                self.ip_source_url
            );
        }

        if self.ip_source_url.starts_with("http://") {
            eprintln!(
                "WARNING: DDNS_IP_SOURCE_URL uses HTTP (not HTTPS). \
                This is less secure. Consider using HTTPS."
            );
        }

        if let Some(ref url) = self.api_url
            && !url.starts_with("https://")
            && !url.starts_with("http://")
        {
            anyhow::bail!("DDNS_PROVIDER_API_URL must use HTTP or HTTPS scheme. Got: {}", url);
        }

        if let Some(secs) = self.http_timeout_secs
            && !(1..=300).contains(&secs)
        {
            anyhow::bail!(
                "DDNS_HTTP_TIMEOUT_SECS must be between 1 and 300 seconds. Got: {}",
                secs
            );
        }

        match self.mode.to_lowercase().as_str() {
            "live" | "dry-run" => {}
            _ => anyhow::bail!(
                "DDNS_MODE '{}' is not valid. Valid modes: live, dry-run",
                self.mode
            ),
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "DDNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Pick the credential form from the configured variables
    fn credentials(&self) -> Result<CloudflareCredentials> {
        match (&self.api_token, &self.api_email, &self.api_key) {
            (Some(token), None, None) => {
                validate_token(token)?;
                Ok(CloudflareCredentials::ApiToken {
                    api_token: token.clone(),
                })
            }
            (None, Some(email), Some(key)) => {
                if !email.contains('@') {
                    anyhow::bail!("DDNS_PROVIDER_API_EMAIL is not an email address: {}", email);
                }
                Ok(CloudflareCredentials::GlobalKey {
                    email: email.clone(),
                    api_key: key.clone(),
                })
            }
            (Some(_), _, _) => anyhow::bail!(
                "Set either DDNS_PROVIDER_API_TOKEN or \
                DDNS_PROVIDER_API_EMAIL + DDNS_PROVIDER_API_KEY, not both"
            ),
            (None, None, None) => anyhow::bail!(
                "Provider credentials are required. \
                Set them via: export DDNS_PROVIDER_API_TOKEN=your_token"
            ),
            (None, _, _) => anyhow::bail!(
                "DDNS_PROVIDER_API_EMAIL and DDNS_PROVIDER_API_KEY must be set together"
            ),
        }
    }

    fn dry_run(&self) -> bool {
        self.mode.eq_ignore_ascii_case("dry-run")
    }

    fn log_level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    /// Build the immutable core configuration
    fn to_ddns_config(&self) -> Result<DdnsConfig> {
        let config = DdnsConfig {
            ip_source: IpSourceConfig::Http {
                url: self.ip_source_url.clone(),
                timeout_secs: self
                    .http_timeout_secs
                    .unwrap_or(DEFAULT_IP_SOURCE_TIMEOUT_SECS),
            },
            provider: ProviderConfig::Cloudflare {
                credentials: self.credentials()?,
                api_base_url: self.api_url.clone(),
                timeout_secs: self
                    .http_timeout_secs
                    .unwrap_or(DEFAULT_PROVIDER_TIMEOUT_SECS),
                dry_run: self.dry_run(),
            },
            record: RecordConfig::new(&self.zone_name, &self.record_name),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Reject tokens that are obviously wrong before making any request
fn validate_token(token: &str) -> Result<()> {
    // Cloudflare API tokens are 40 characters; anything much shorter is a typo
    if token.len() < 20 {
        anyhow::bail!(
            "DDNS_PROVIDER_API_TOKEN appears too short ({} chars). \
            Cloudflare tokens are typically 40 characters. \
            Verify your token is correct.",
            token.len()
        );
    }

    let token_lower = token.to_lowercase();
    if token_lower.contains("your_token")
        || token_lower.contains("replace_me")
        || token_lower.contains("example")
    {
        anyhow::bail!(
            "DDNS_PROVIDER_API_TOKEN appears to be a placeholder. \
            Use an actual API token from your DNS provider."
        );
    }

    Ok(())
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return SyncExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return SyncExitCode::ConfigError.into();
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level())
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return SyncExitCode::ConfigError.into();
    }

    // Every step depends on the previous one; a single thread is enough
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return SyncExitCode::ConfigError.into();
        }
    };

    rt.block_on(run(config)).into()
}

/// Run one reconciliation
async fn run(config: Config) -> SyncExitCode {
    let ddns_config = match config.to_ddns_config() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            return SyncExitCode::ConfigError;
        }
    };

    let reconciler = match build_reconciler(&ddns_config) {
        Ok(r) => r,
        Err(e) => {
            error!("Startup error: {}", e);
            return SyncExitCode::ConfigError;
        }
    };
    let (reconciler, mut events) = reconciler;

    info!(
        "Starting DDNS update check for {} (zone {}){}",
        ddns_config.record.name,
        ddns_config.record.zone_name,
        if config.dry_run() { " [DRY-RUN]" } else { "" }
    );

    let result = reconciler.reconcile().await;
    report_events(&mut events);

    match &result {
        Ok(outcome) => report_outcome(&ddns_config.record.name, outcome),
        Err(e) => error!("{}", e),
    }

    exit_code_for(&result)
}

/// Map a run result to the process exit status
///
/// Record lookup and upsert failures are not retried here; the next scheduled
/// run picks them up, so they still exit 0.
fn exit_code_for(result: &std::result::Result<ReconcileOutcome, ReconcileError>) -> SyncExitCode {
    match result {
        Ok(_) => SyncExitCode::Success,
        Err(e) if e.is_fatal() => SyncExitCode::FatalUpstream,
        Err(_) => SyncExitCode::Success,
    }
}

/// Build the reconciler from registered components
fn build_reconciler(
    config: &DdnsConfig,
) -> ddns_core::Result<(Reconciler, mpsc::Receiver<ReconcileEvent>)> {
    let registry = ProviderRegistry::new();

    #[cfg(feature = "cloudflare")]
    ddns_provider_cloudflare::register(&registry);
    ddns_ip_http::register(&registry);

    let provider = registry.create_provider(&config.provider)?;
    let ip_source = registry.create_ip_source(&config.ip_source)?;

    Reconciler::new(ip_source, provider, config)
}

/// Turn reconcile events into log lines
fn report_events(events: &mut mpsc::Receiver<ReconcileEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            ReconcileEvent::Started { .. } | ReconcileEvent::Failed { .. } => {}
            ReconcileEvent::DesiredIpResolved { ip, source } => {
                info!("Found public IP via {} source: {}", source, ip);
            }
            ReconcileEvent::ZoneResolved { zone_name, zone_id } => {
                info!("Zone {} has ID {}", zone_name, zone_id);
            }
            ReconcileEvent::AmbiguousRecords {
                record_type,
                matches,
                selected,
            } => {
                warn!(
                    "Provider returned {} {} records for the managed name; using {}. \
                    Remove the duplicates to avoid unpredictable updates.",
                    matches, record_type, selected
                );
            }
            ReconcileEvent::RecordUnchanged { .. } => {}
            ReconcileEvent::ConflictFound { record_id, target } => {
                info!(
                    "Found conflicting CNAME record {} (-> {}). Deleting it...",
                    record_id, target
                );
            }
            ReconcileEvent::ConflictRemoved { record_id } => {
                info!("Deleted conflicting CNAME record {}", record_id);
            }
            ReconcileEvent::ConflictCleanupFailed { error } => {
                warn!("Could not remove conflicting CNAME, creating A record anyway: {}", error);
            }
            ReconcileEvent::RecordUpdated { .. } | ReconcileEvent::RecordCreated { .. } => {}
        }
    }
}

fn report_outcome(record_name: &str, outcome: &ReconcileOutcome) {
    match outcome {
        ReconcileOutcome::Unchanged { ip } => {
            info!(
                "IP address for {} is already up to date ({}). No change needed.",
                record_name, ip
            );
        }
        ReconcileOutcome::Updated {
            record_id,
            previous_content,
            new_ip,
        } => {
            info!(
                "Updated {} (record {}) from {} to {}",
                record_name, record_id, previous_content, new_ip
            );
        }
        ReconcileOutcome::Created {
            record_id, new_ip, ..
        } => {
            info!("Created {} (record {}) -> {}", record_name, record_id, new_ip);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const TOKEN: &str = "0123456789abcdef0123456789abcdef01234567";

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    fn base_vars() -> Vec<(&'static str, &'static str)> {
        vec![
            ("DDNS_ZONE_NAME", "example.com"),
            ("DDNS_RECORD_NAME", "home.example.com"),
            ("DDNS_PROVIDER_API_TOKEN", TOKEN),
        ]
    }

    #[test]
    fn minimal_config_is_valid_with_defaults() {
        let config = config_from(&base_vars()).unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.ip_source_url, DEFAULT_IP_SOURCE_URL);
        assert_eq!(config.http_timeout_secs, None);
        assert!(!config.dry_run());
        assert_eq!(config.log_level(), Level::INFO);
    }

    #[test]
    fn missing_record_names_are_rejected() {
        let config = config_from(&[("DDNS_PROVIDER_API_TOKEN", TOKEN)]).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("DDNS_ZONE_NAME"));
    }

    #[test]
    fn record_outside_zone_is_rejected() {
        let mut vars = base_vars();
        vars[1] = ("DDNS_RECORD_NAME", "home.example.org");
        assert!(config_from(&vars).unwrap().validate().is_err());
    }

    #[test]
    fn global_key_credentials_are_accepted() {
        let config = config_from(&[
            ("DDNS_ZONE_NAME", "example.com"),
            ("DDNS_RECORD_NAME", "example.com"),
            ("DDNS_PROVIDER_API_EMAIL", "ops@example.com"),
            ("DDNS_PROVIDER_API_KEY", "0123456789abcdef"),
        ])
        .unwrap();

        assert!(config.validate().is_ok());
        assert!(matches!(
            config.credentials().unwrap(),
            CloudflareCredentials::GlobalKey { .. }
        ));
    }

    #[test]
    fn conflicting_or_partial_credentials_are_rejected() {
        let mut vars = base_vars();
        vars.push(("DDNS_PROVIDER_API_EMAIL", "ops@example.com"));
        vars.push(("DDNS_PROVIDER_API_KEY", "k"));
        assert!(config_from(&vars).unwrap().validate().is_err());

        let partial = config_from(&[
            ("DDNS_ZONE_NAME", "example.com"),
            ("DDNS_RECORD_NAME", "example.com"),
            ("DDNS_PROVIDER_API_KEY", "k"),
        ])
        .unwrap();
        assert!(partial.validate().is_err());
    }

    #[test]
    fn placeholder_and_short_tokens_are_rejected() {
        assert!(validate_token("short").is_err());
        assert!(validate_token("your_token_goes_here_please").is_err());
        assert!(validate_token(TOKEN).is_ok());
    }

    #[test]
    fn timeout_must_be_numeric_and_in_range() {
        let mut vars = base_vars();
        vars.push(("DDNS_HTTP_TIMEOUT_SECS", "soon"));
        assert!(config_from(&vars).is_err());

        let mut vars = base_vars();
        vars.push(("DDNS_HTTP_TIMEOUT_SECS", "0"));
        assert!(config_from(&vars).unwrap().validate().is_err());
    }

    #[test]
    fn invalid_mode_and_log_level_are_rejected() {
        let mut vars = base_vars();
        vars.push(("DDNS_MODE", "maybe"));
        assert!(config_from(&vars).unwrap().validate().is_err());

        let mut vars = base_vars();
        vars.push(("DDNS_LOG_LEVEL", "loud"));
        assert!(config_from(&vars).unwrap().validate().is_err());
    }

    #[test]
    fn dry_run_flows_into_provider_config() {
        let mut vars = base_vars();
        vars.push(("DDNS_MODE", "dry-run"));
        vars.push(("DDNS_HTTP_TIMEOUT_SECS", "12"));

        let ddns_config = config_from(&vars).unwrap().to_ddns_config().unwrap();

        match ddns_config.provider {
            ProviderConfig::Cloudflare {
                dry_run,
                timeout_secs,
                ..
            } => {
                assert!(dry_run);
                assert_eq!(timeout_secs, 12);
            }
            other => panic!("unexpected provider config: {:?}", other),
        }
    }

    #[cfg(feature = "cloudflare")]
    #[test]
    fn registry_builds_reconciler_from_config() {
        let ddns_config = config_from(&base_vars()).unwrap().to_ddns_config().unwrap();
        assert!(build_reconciler(&ddns_config).is_ok());
    }

    #[test]
    fn ip_source_and_provider_keep_their_own_default_timeouts() {
        let ddns_config = config_from(&base_vars()).unwrap().to_ddns_config().unwrap();

        match ddns_config.ip_source {
            IpSourceConfig::Http { timeout_secs, .. } => {
                assert_eq!(timeout_secs, DEFAULT_IP_SOURCE_TIMEOUT_SECS);
            }
            other => panic!("unexpected ip source config: {:?}", other),
        }
        match ddns_config.provider {
            ProviderConfig::Cloudflare { timeout_secs, .. } => {
                assert_eq!(timeout_secs, DEFAULT_PROVIDER_TIMEOUT_SECS);
            }
            other => panic!("unexpected provider config: {:?}", other),
        }
    }

    #[test]
    fn timeout_override_applies_to_ip_source_too() {
        let mut vars = base_vars();
        vars.push(("DDNS_HTTP_TIMEOUT_SECS", "5"));

        let ddns_config = config_from(&vars).unwrap().to_ddns_config().unwrap();

        match ddns_config.ip_source {
            IpSourceConfig::Http { timeout_secs, .. } => assert_eq!(timeout_secs, 5),
            other => panic!("unexpected ip source config: {:?}", other),
        }
    }

    #[test]
    fn exit_codes() {
        assert_eq!(SyncExitCode::Success as u8, 0);
        assert_eq!(SyncExitCode::FatalUpstream as u8, 1);
        assert_eq!(SyncExitCode::ConfigError as u8, 2);
    }

    #[test]
    fn successful_runs_exit_zero() {
        let ip = "203.0.113.7".parse().unwrap();
        assert_eq!(
            exit_code_for(&Ok(ReconcileOutcome::Unchanged { ip })),
            SyncExitCode::Success
        );
        assert_eq!(
            exit_code_for(&Ok(ReconcileOutcome::Created {
                record_id: ddns_core::traits::RecordId::new("rec-1"),
                new_ip: ip,
                removed_conflict: None,
            })),
            SyncExitCode::Success
        );
    }

    #[test]
    fn upstream_failures_exit_one() {
        let fatal = [
            ReconcileError::IpUnavailable(ddns_core::Error::ip_source("down")),
            ReconcileError::ZoneNotFound("example.com".to_string()),
            ReconcileError::ZoneLookup {
                zone: "example.com".to_string(),
                source: ddns_core::Error::http("connection reset"),
            },
        ];

        for err in fatal {
            assert_eq!(exit_code_for(&Err(err)), SyncExitCode::FatalUpstream);
        }
    }

    #[test]
    fn record_failures_exit_zero() {
        let lookup = ReconcileError::RecordLookup {
            record_name: "home.example.com".to_string(),
            source: ddns_core::Error::http("timeout"),
        };
        let upsert = ReconcileError::Upsert {
            record_name: "home.example.com".to_string(),
            ip: "203.0.113.7".parse().unwrap(),
            source: ddns_core::Error::provider("cloudflare", "81057: Record already exists."),
        };

        assert_eq!(exit_code_for(&Err(lookup)), SyncExitCode::Success);
        assert_eq!(exit_code_for(&Err(upsert)), SyncExitCode::Success);
    }
}
