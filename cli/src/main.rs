//! warden: command-line host for site policies
//!
//! Loads a policy from a dried JSON file (`--policy`) or a TOML
//! configuration (`--config`), falling back to the factory policy, and runs
//! one query or edit against it.
//!
//! Usage:
//!   warden can https://cdn.example.com/app.js --capability script
//!   warden --policy policy.json set example.com trusted --cascade
//!   warden --config policy.toml get https://example.com/ --context https://news.test/
//!   warden request-key https://example.com/x.js script https://example.com/
//!   warden explode-key 'script@https://example.com<https://example.com'

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use warden_contracts::{WardenError, WardenResult};
use warden_policy::{Permissions, Policy, PolicyConfig, SiteGrant};
use warden_sites::{is_internal, is_valid, toggle_secure_domain_key};

// ── CLI definition ────────────────────────────────────────────────────────────

/// Site-scoped capability policy tool.
#[derive(Debug, Parser)]
#[command(
    name = "warden",
    about = "Query and edit site-scoped capability policies",
    long_about = "Decides which capabilities (script, media, frame, ...) a site may use,\n\
                  based on TRUSTED / UNTRUSTED / DEFAULT presets and per-site grants."
)]
struct Cli {
    /// Dried policy JSON to load. `set` writes the result back here.
    #[arg(long, global = true, conflicts_with = "config")]
    policy: Option<PathBuf>,

    /// TOML policy configuration to build the policy from.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print whether a URL may use a capability.
    Can {
        url: String,
        #[arg(long, default_value = "script")]
        capability: String,
        /// URL of the embedding document.
        #[arg(long)]
        context: Option<String>,
    },
    /// Print the effective capability set of a URL and the keys that matched.
    Get {
        url: String,
        #[arg(long)]
        context: Option<String>,
    },
    /// Assign a preset or a custom capability set to a site.
    Set {
        site: String,
        grant: GrantArg,
        /// Capabilities of a `custom` grant, comma separated.
        #[arg(long, value_delimiter = ',')]
        capabilities: Vec<String>,
        /// Also reset every site the new key covers.
        #[arg(long)]
        cascade: bool,
    },
    /// Print the dried policy as JSON.
    Dry {
        #[arg(long)]
        include_temp: bool,
    },
    /// Print the request key for a (resource, type, document) triple.
    RequestKey {
        url: String,
        request_type: String,
        document_url: String,
        #[arg(long)]
        include_path: bool,
    },
    /// Decode a request key.
    ExplodeKey { key: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum GrantArg {
    Trusted,
    Untrusted,
    /// Trusted for this session only.
    Temp,
    Default,
    Custom,
}

impl GrantArg {
    fn into_grant(self, capabilities: &[String]) -> SiteGrant {
        match self {
            GrantArg::Trusted => SiteGrant::Trusted,
            GrantArg::Untrusted => SiteGrant::Untrusted,
            GrantArg::Temp => SiteGrant::TempTrusted,
            GrantArg::Default => SiteGrant::Default,
            GrantArg::Custom => SiteGrant::Custom(Permissions::new(
                capabilities.iter().map(|c| c.trim()).filter(|c| !c.is_empty()),
                false,
            )),
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Set RUST_LOG=debug to trace matching decisions.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("warden error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> WardenResult<()> {
    match cli.command {
        Command::RequestKey {
            url,
            request_type,
            document_url,
            include_path,
        } => {
            println!(
                "{}",
                Policy::request_key(&url, &request_type, &document_url, include_path)
            );
            Ok(())
        }
        Command::ExplodeKey { key } => {
            let exploded = Policy::explode_key(&key)?;
            print_json(&json!({
                "url": exploded.url,
                "type": exploded.request_type,
                "documentUrl": exploded.document_url,
            }))
        }
        Command::Can {
            url,
            capability,
            context,
        } => {
            let policy = load_policy(cli.policy.as_deref(), cli.config.as_deref())?;
            let allowed = policy.can(&url, &capability, context.as_deref());
            println!("{}", if allowed { "allowed" } else { "blocked" });
            Ok(())
        }
        Command::Get { url, context } => {
            let policy = load_policy(cli.policy.as_deref(), cli.config.as_deref())?;
            let resolved = policy.get(&url, context.as_deref());
            print_json(&json!({
                "site": url,
                "match": resolved.site_match,
                "contextMatch": resolved.context_match,
                "permissions": resolved.perms.dry(),
            }))
        }
        Command::Set {
            site,
            grant,
            capabilities,
            cascade,
        } => {
            let path = cli.policy.as_deref().ok_or_else(|| WardenError::ConfigError {
                reason: "`set` needs --policy <FILE> to write the result to".to_string(),
            })?;
            validate_site(&site)?;

            let mut policy = if path.exists() {
                load_policy(Some(path), None)?
            } else {
                info!(path = %path.display(), "policy file not found, starting from factory policy");
                Policy::new()
            };
            let outcome = policy.set(&site, grant.into_grant(&capabilities), cascade);
            write_policy(path, &mut policy)?;

            println!("{} → {:?}", outcome.site_key, grant);
            Ok(())
        }
        Command::Dry { include_temp } => {
            let policy = load_policy(cli.policy.as_deref(), cli.config.as_deref())?;
            print_json(&policy.dry(include_temp))
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn load_policy(policy: Option<&Path>, config: Option<&Path>) -> WardenResult<Policy> {
    if let Some(path) = policy {
        debug!(path = %path.display(), "loading dried policy");
        let json = std::fs::read_to_string(path).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to read policy file '{}': {}", path.display(), e),
        })?;
        return Policy::from_json(&json);
    }
    if let Some(path) = config {
        debug!(path = %path.display(), "loading policy configuration");
        return Ok(Policy::from_config(&PolicyConfig::from_file(path)?));
    }
    Ok(Policy::new())
}

/// Temporary grants are written too: the file is the CLI's session.
fn write_policy(path: &Path, policy: &mut Policy) -> WardenResult<()> {
    let json = serde_json::to_string_pretty(&policy.dry_enforced(true)).map_err(|e| {
        WardenError::Serialization {
            reason: format!("failed to encode dried policy: {}", e),
        }
    })?;
    std::fs::write(path, json).map_err(|e| WardenError::ConfigError {
        reason: format!("failed to write policy file '{}': {}", path.display(), e),
    })
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> WardenResult<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| WardenError::Serialization {
        reason: format!("failed to encode output: {}", e),
    })?;
    println!("{}", json);
    Ok(())
}

/// Reject sites a user may not add: browser-internal pages and strings that
/// are neither a URL nor a hostname.
fn validate_site(site: &str) -> WardenResult<()> {
    let bare = toggle_secure_domain_key(site, false);
    if is_internal(site) || !is_valid(&bare) {
        return Err(WardenError::InvalidSite {
            site: site.to_string(),
        });
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
