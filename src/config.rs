use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::{env, path::PathBuf};
use storage_sync::{DigestAlgorithm, MissingDigestPolicy, ObjectId, PeerUrl};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub uploads_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub peers: Vec<PeerUrl>,
    pub host_id: String,
    pub download_timeout_minutes: u64,
    pub peer_timeout_secs: u64,
    pub max_concurrency: usize,
    pub digest_algorithm: DigestAlgorithm,
    pub missing_digest: MissingDigestPolicy,
    pub new_object_ttl_secs: u64,
    pub fetch: Vec<FetchRequest>,
    pub delete: Vec<ObjectId>,
    pub expected_hashes: Vec<(ObjectId, String)>,
}

/// One object to fetch from the configured peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub object_id: ObjectId,
    pub bag_id: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Storage node synchronization pass")]
pub struct Args {
    /// Directory of committed objects (overrides STORAGE_SYNC_UPLOADS_DIR)
    #[arg(long)]
    pub uploads_dir: Option<PathBuf>,

    /// Scratch directory for in-flight downloads (overrides STORAGE_SYNC_TEMP_DIR)
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,

    /// Peer base URL; repeatable (overrides comma-separated STORAGE_SYNC_PEERS)
    #[arg(long = "peer")]
    pub peers: Vec<String>,

    /// Identifier sent to peers (overrides STORAGE_SYNC_HOST_ID)
    #[arg(long)]
    pub host_id: Option<String>,

    /// Per-download deadline in minutes (overrides STORAGE_SYNC_DOWNLOAD_TIMEOUT_MINUTES)
    #[arg(long)]
    pub download_timeout_minutes: Option<u64>,

    /// Peer state query deadline in seconds (overrides STORAGE_SYNC_PEER_TIMEOUT_SECS)
    #[arg(long)]
    pub peer_timeout_secs: Option<u64>,

    /// Maximum tasks executing at once (overrides STORAGE_SYNC_MAX_CONCURRENCY)
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Digest algorithm, md5 or sha256 (overrides STORAGE_SYNC_DIGEST)
    #[arg(long)]
    pub digest: Option<DigestAlgorithm>,

    /// Refuse downloads without an expected digest (or STORAGE_SYNC_REQUIRE_DIGEST=true)
    #[arg(long)]
    pub require_digest: bool,

    /// Seconds a new upload is protected from deletion (overrides STORAGE_SYNC_NEW_OBJECT_TTL_SECS)
    #[arg(long)]
    pub new_object_ttl_secs: Option<u64>,

    /// Object to fetch, as OBJECT_ID@BAG_ID; repeatable
    #[arg(long)]
    pub fetch: Vec<String>,

    /// Object to delete locally; repeatable
    #[arg(long)]
    pub delete: Vec<String>,

    /// Expected digest, as OBJECT_ID=DIGEST; repeatable
    #[arg(long)]
    pub expected_hash: Vec<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::merge(Args::parse(), |key| env::var(key).ok())
    }

    /// CLI values win; `env` supplies fallbacks, then built-in defaults.
    pub fn merge(args: Args, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        fn env_parsed<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
        where
            T: std::str::FromStr,
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            env(key)
                .map(|value| {
                    value
                        .trim()
                        .parse::<T>()
                        .with_context(|| format!("parsing {} value `{}`", key, value))
                })
                .transpose()
        }

        let env_uploads = env("STORAGE_SYNC_UPLOADS_DIR").unwrap_or_else(|| "./data/uploads".into());
        let env_temp = env("STORAGE_SYNC_TEMP_DIR").unwrap_or_else(|| "./data/temp".into());
        let env_peers: Vec<String> = env("STORAGE_SYNC_PEERS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|peer| !peer.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        let env_host = env("STORAGE_SYNC_HOST_ID").unwrap_or_else(|| "storage-sync".into());
        let env_digest = env("STORAGE_SYNC_DIGEST")
            .map(|value| value.parse::<DigestAlgorithm>().map_err(|err| anyhow!(err)))
            .transpose()
            .context("parsing STORAGE_SYNC_DIGEST")?
            .unwrap_or_default();
        let env_require_digest = env("STORAGE_SYNC_REQUIRE_DIGEST")
            .map(|value| matches!(value.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let download_timeout_minutes = match args.download_timeout_minutes {
            Some(value) => value,
            None => env_parsed::<u64>(&env, "STORAGE_SYNC_DOWNLOAD_TIMEOUT_MINUTES")?.unwrap_or(30),
        };
        let peer_timeout_secs = match args.peer_timeout_secs {
            Some(value) => value,
            None => env_parsed::<u64>(&env, "STORAGE_SYNC_PEER_TIMEOUT_SECS")?.unwrap_or(60),
        };
        let max_concurrency = match args.max_concurrency {
            Some(value) => value,
            None => env_parsed::<usize>(&env, "STORAGE_SYNC_MAX_CONCURRENCY")?.unwrap_or(20),
        };
        let new_object_ttl_secs = match args.new_object_ttl_secs {
            Some(value) => value,
            None => env_parsed::<u64>(&env, "STORAGE_SYNC_NEW_OBJECT_TTL_SECS")?.unwrap_or(600),
        };

        let raw_peers = if args.peers.is_empty() {
            env_peers
        } else {
            args.peers
        };
        let peers = raw_peers
            .iter()
            .map(|raw| PeerUrl::parse(raw).with_context(|| format!("peer {}", raw)))
            .collect::<Result<Vec<_>>>()?;

        let fetch = args
            .fetch
            .iter()
            .map(|raw| parse_fetch(raw))
            .collect::<Result<Vec<_>>>()?;
        let delete = args
            .delete
            .iter()
            .map(|raw| ObjectId::parse(raw.as_str()).with_context(|| format!("--delete {}", raw)))
            .collect::<Result<Vec<_>>>()?;
        let expected_hashes = args
            .expected_hash
            .iter()
            .map(|raw| parse_expected_hash(raw))
            .collect::<Result<Vec<_>>>()?;

        // --- Merge ---
        Ok(Self {
            uploads_dir: args.uploads_dir.unwrap_or_else(|| env_uploads.into()),
            temp_dir: args.temp_dir.unwrap_or_else(|| env_temp.into()),
            peers,
            host_id: args.host_id.unwrap_or(env_host),
            download_timeout_minutes,
            peer_timeout_secs,
            max_concurrency,
            digest_algorithm: args.digest.unwrap_or(env_digest),
            missing_digest: if args.require_digest || env_require_digest {
                MissingDigestPolicy::Reject
            } else {
                MissingDigestPolicy::Accept
            },
            new_object_ttl_secs,
            fetch,
            delete,
            expected_hashes,
        })
    }
}

fn parse_fetch(raw: &str) -> Result<FetchRequest> {
    let (object, bag) = raw
        .split_once('@')
        .ok_or_else(|| anyhow!("--fetch `{}` must look like OBJECT_ID@BAG_ID", raw))?;
    Ok(FetchRequest {
        object_id: ObjectId::parse(object).with_context(|| format!("--fetch {}", raw))?,
        bag_id: bag.to_string(),
    })
}

fn parse_expected_hash(raw: &str) -> Result<(ObjectId, String)> {
    let (object, digest) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("--expected-hash `{}` must look like OBJECT_ID=DIGEST", raw))?;
    let object_id = ObjectId::parse(object).with_context(|| format!("--expected-hash {}", raw))?;
    Ok((object_id, digest.trim().to_string()))
}
