//! stake-accounting CLI: fetch, rewards, time, classify, mangled, delegation, report, verify.

use clap::{Parser, Subcommand};
use stake_accounting::address::{
    classify_all, filter_subgroup, mangled_address_set, unmangle_inputs, AddressInfo,
    AddressSubgroup, Credential, Utxo,
};
use stake_accounting::amount::{MultiTokenAmount, TokenRegistry};
use stake_accounting::chain::{
    account_status, Cache, FetchConfig, Fetcher, KoiosSource, LedgerState, LedgerSync,
};
use stake_accounting::config::NetworkConfig;
use stake_accounting::delegation::{
    DelegationStatus, DelegationTracker, ObservedCertificate, PendingTarget, PoolMetaResolver,
};
use stake_accounting::rewards::{reconstruct, reconstruct_to_current, RewardLedgerEntry};
use stake_accounting::summarize_wallet;
use stake_accounting::time::{normalize_epoch_slot_or_time, EraTable};
use stake_accounting::verify::{reproducibility_hash, verify_bundle, EvidenceBundle};
use stake_accounting_report::{render_report, ReportData};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{info, warn};

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() -> CliResult {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => NetworkConfig::load_from_path(path)?,
        None => NetworkConfig::load()?,
    };
    match cli.command {
        Command::Fetch(args) => run_fetch(&config, args),
        Command::Rewards(args) => run_rewards(&config, args),
        Command::Time(args) => run_time(&config, args),
        Command::Classify(args) => run_classify(args),
        Command::Mangled(args) => run_mangled(&config, args),
        Command::Delegation(args) => run_delegation(&config, args),
        Command::Report(args) => run_report(&config, args),
        Command::Verify(args) => run_verify(args),
    }
}

#[derive(Parser)]
#[command(name = "stake-accounting")]
#[command(author = "gorusys <goru.connector@outlook.com>")]
#[command(about = "Staking rewards, delegation and mangled-funds accounting for Cardano wallets")]
struct Cli {
    /// Network config JSON (default: env STAKE_ACCOUNTING_CONFIG, ./config/network.json, mainnet).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch a stake address's reward ledger and cache it.
    Fetch(FetchArgs),
    /// Reconstruct the dense reward history.
    Rewards(RewardsArgs),
    /// Convert epoch:slot, absolute slot or RFC 3339 time.
    Time(TimeArgs),
    /// Classify wallet addresses into subgroups.
    Classify(ClassifyArgs),
    /// Summarize mangled funds and unmangle inputs.
    Mangled(MangledArgs),
    /// Show delegation status and pool.
    Delegation(DelegationArgs),
    /// Generate HTML report, evidence bundle and hash.
    Report(ReportArgs),
    /// Verify a bundle's reproducibility hash and recompute its history.
    Verify(VerifyArgs),
}

#[derive(Parser, Clone)]
struct NetworkArgs {
    #[arg(long, default_value = "./data/cache")]
    cache_dir: PathBuf,
    #[arg(long)]
    offline: bool,
    /// Drop cached account responses before fetching.
    #[arg(long)]
    refresh: bool,
}

#[derive(Parser)]
struct FetchArgs {
    #[arg(long)]
    stake: String,
    /// Where to write the ledger JSON (default: ./data/<stake>.ledger.json).
    #[arg(long)]
    out: Option<PathBuf>,
    #[command(flatten)]
    net: NetworkArgs,
}

#[derive(Parser)]
struct LedgerArgs {
    /// Reward ledger JSON file; fetched from the network when absent.
    #[arg(long)]
    ledger: Option<PathBuf>,
    #[arg(long)]
    stake: Option<String>,
    /// First epoch (inclusive).
    #[arg(long)]
    from: Option<u64>,
    /// Last epoch (exclusive).
    #[arg(long)]
    to: Option<u64>,
    /// Current epoch; defaults to the chain tip, or wall clock when offline.
    #[arg(long)]
    current: Option<u64>,
    #[command(flatten)]
    net: NetworkArgs,
}

#[derive(Parser)]
struct RewardsArgs {
    #[command(flatten)]
    ledger: LedgerArgs,
    /// Print the history as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
struct TimeArgs {
    /// "epoch:slot", absolute slot, or RFC 3339 time.
    input: String,
}

#[derive(Parser)]
struct WalletArgs {
    /// JSON array of {address, derivation_path, is_used}.
    #[arg(long)]
    addresses: PathBuf,
    /// Current staking key hash (hex, 28 bytes).
    #[arg(long)]
    staking_key: String,
}

#[derive(Parser)]
struct ClassifyArgs {
    #[command(flatten)]
    wallet: WalletArgs,
    #[arg(long)]
    subgroup: Option<String>,
}

#[derive(Parser)]
struct MangledArgs {
    #[command(flatten)]
    wallet: WalletArgs,
    /// JSON array of {tx_hash, output_index, address, amount}.
    #[arg(long)]
    utxos: PathBuf,
    /// Override the estimated reclaim fee, in the default token (e.g. 0.17).
    #[arg(long)]
    fee: Option<String>,
}

#[derive(Parser)]
struct DelegationArgs {
    /// Certificate history JSON; the account snapshot is fetched when absent.
    #[arg(long)]
    certs: Option<PathBuf>,
    #[arg(long)]
    stake: Option<String>,
    /// Pool of a submitted but unconfirmed delegation.
    #[arg(long)]
    pending_pool: Option<String>,
    #[command(flatten)]
    net: NetworkArgs,
}

#[derive(Parser)]
struct ReportArgs {
    #[command(flatten)]
    ledger: LedgerArgs,
    #[arg(long)]
    addresses: Option<PathBuf>,
    #[arg(long)]
    utxos: Option<PathBuf>,
    #[arg(long)]
    staking_key: Option<String>,
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long, default_value = "./reports")]
    reports_dir: PathBuf,
}

#[derive(Parser)]
struct VerifyArgs {
    #[arg(long)]
    bundle: PathBuf,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("read {}: {e}", path.display()))?;
    serde_json::from_str(&content).map_err(|e| format!("parse {}: {e}", path.display()).into())
}

fn file_stem_for(id: &str) -> String {
    id.chars()
        .take(24)
        .collect::<String>()
        .replace([' ', ':', '/'], "_")
}

fn open_fetcher(
    config: &NetworkConfig,
    net: &NetworkArgs,
) -> Result<Arc<Fetcher>, Box<dyn std::error::Error>> {
    let cache = Cache::open(net.cache_dir.join("cache.sqlite"))?;
    let fetch_config = FetchConfig {
        offline: net.offline,
        ..FetchConfig::with_base_url(&config.koios_url)?
    };
    let fetcher = Fetcher::new(fetch_config, Some(cache))?;
    if net.refresh {
        fetcher.invalidate_account_data()?;
    }
    Ok(Arc::new(fetcher))
}

async fn sync_ledger(source: KoiosSource, stake: &str) -> Result<Vec<RewardLedgerEntry>, String> {
    let sync = LedgerSync::new(source);
    sync.set_active_wallet(stake);
    match sync.refresh(stake).await {
        LedgerState::Ready(entries) => Ok(entries),
        LedgerState::Failed(e) => Err(e),
        LedgerState::Pending => Err("ledger fetch superseded".to_string()),
    }
}

/// Labels for every pool in the ledger, resolved concurrently.
async fn pool_labels(
    resolver: &PoolMetaResolver,
    network_id: u32,
    ledger: &[RewardLedgerEntry],
) -> BTreeMap<String, String> {
    let pools: BTreeSet<&str> = ledger
        .iter()
        .map(|e| e.pool_hash.as_str())
        .filter(|p| !p.is_empty())
        .collect();
    let resolved = futures::future::join_all(pools.iter().map(|p| resolver.resolve(network_id, p))).await;
    pools
        .into_iter()
        .zip(resolved)
        .filter_map(|(pool, meta)| meta.map(|m| (pool.to_string(), m.label())))
        .collect()
}

fn now_epoch(table: &EraTable) -> Result<u64, Box<dyn std::error::Error>> {
    Ok(table.epoch_at(OffsetDateTime::now_utc())?.epoch)
}

struct LoadedLedger {
    wallet_id: String,
    entries: Vec<RewardLedgerEntry>,
    labels: BTreeMap<String, String>,
    start: u64,
    end: u64,
}

fn load_ledger(
    config: &NetworkConfig,
    args: &LedgerArgs,
    rt: &tokio::runtime::Runtime,
) -> Result<LoadedLedger, Box<dyn std::error::Error>> {
    let table = config.era_table()?;
    let token = config.default_token_key();
    let fetcher = open_fetcher(config, &args.net)?;
    let source = KoiosSource::new(fetcher.clone(), token.clone());

    let (wallet_id, entries) = match (&args.ledger, &args.stake) {
        (Some(path), stake) => (
            stake.clone().unwrap_or_else(|| file_stem_for(&path.display().to_string())),
            read_json::<Vec<RewardLedgerEntry>>(path)?,
        ),
        (None, Some(stake)) => (stake.clone(), rt.block_on(sync_ledger(source.clone(), stake))?),
        (None, None) => return Err("either --ledger or --stake is required".into()),
    };

    let current = match args.current {
        Some(c) => c,
        None => match rt.block_on(fetcher.tip()) {
            Ok(tip) => tip.epoch_no,
            Err(e) => {
                warn!(error = %e, "tip unavailable, using wall clock");
                now_epoch(&table)?
            }
        },
    };
    let first = entries.iter().map(|e| e.epoch).min().unwrap_or(current);
    let start = args.from.unwrap_or(first.min(current));
    let end = args.to.unwrap_or(current.saturating_add(1));

    let resolver = PoolMetaResolver::new(Arc::new(source));
    let labels = if args.net.offline && args.ledger.is_some() {
        BTreeMap::new()
    } else {
        rt.block_on(pool_labels(&resolver, token.network_id, &entries))
    };
    Ok(LoadedLedger {
        wallet_id,
        entries,
        labels,
        start,
        end,
    })
}

fn run_fetch(config: &NetworkConfig, args: FetchArgs) -> CliResult {
    let fetcher = open_fetcher(config, &args.net)?;
    let source = KoiosSource::new(fetcher.clone(), config.default_token_key());
    let rt = tokio::runtime::Runtime::new()?;
    let entries = rt.block_on(sync_ledger(source, &args.stake))?;
    let account = rt.block_on(fetcher.account_info(&args.stake))?;
    info!(entries = entries.len(), status = ?account_status(account.as_ref()), "fetched account");

    let out = args.out.unwrap_or_else(|| {
        PathBuf::from("./data").join(format!("{}.ledger.json", file_stem_for(&args.stake)))
    });
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&out, serde_json::to_string_pretty(&entries)?)?;
    info!(?out, requests = fetcher.request_count(), "fetch complete");
    println!("{}", out.display());
    Ok(())
}

fn run_rewards(config: &NetworkConfig, args: RewardsArgs) -> CliResult {
    let rt = tokio::runtime::Runtime::new()?;
    let loaded = load_ledger(config, &args.ledger, &rt)?;
    let token = config.default_token_key();
    let label = |hash: &str| {
        loaded
            .labels
            .get(hash)
            .cloned()
            .unwrap_or_else(|| stake_accounting::delegation::short_hash(hash))
    };
    let history = if args.ledger.from.is_none() && args.ledger.to.is_none() {
        reconstruct_to_current(&loaded.entries, loaded.end.saturating_sub(1), &token, label)?
    } else {
        reconstruct(&loaded.entries, loaded.start, loaded.end, &token, label)?
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }
    let registry = config.token_registry();
    println!("epoch\treward\ttotal\tpool");
    for p in &history.points {
        println!(
            "{}\t{}\t{}\t{}",
            p.epoch,
            registry.format_default(&p.delta_amount)?,
            registry.format_default(&p.cumulative_amount)?,
            p.pool_label
        );
    }
    println!("total\t{}", registry.format_default(&history.total())?);
    Ok(())
}

fn run_time(config: &NetworkConfig, args: TimeArgs) -> CliResult {
    let table = config.era_table()?;
    let absolute = normalize_epoch_slot_or_time(&args.input, &table)?;
    let es = table.decompose_slot(absolute);
    let at = table.to_real_time(absolute)?;
    let start = table.epoch_start_time(es.epoch)?;
    let end = table.epoch_end_time(es.epoch)?;
    println!("absolute_slot\t{absolute}");
    println!("epoch\t{}", es.epoch);
    println!("slot\t{}/{}", es.slot, table.current_epoch_length(es.epoch));
    println!("time\t{}", at.format(&Rfc3339)?);
    println!("epoch_start\t{}", start.format(&Rfc3339)?);
    println!("epoch_end\t{}", end.format(&Rfc3339)?);
    Ok(())
}

fn load_wallet(
    args: &WalletArgs,
) -> Result<Vec<stake_accounting::address::ClassifiedAddress>, Box<dyn std::error::Error>> {
    let infos: Vec<AddressInfo> = read_json(&args.addresses)?;
    let key = Credential::key_hash_from_hex(&args.staking_key)?;
    Ok(classify_all(&infos, &key))
}

fn run_classify(args: ClassifyArgs) -> CliResult {
    let classified = load_wallet(&args.wallet)?;
    let subgroup: AddressSubgroup = match &args.subgroup {
        Some(s) => serde_json::from_value(serde_json::Value::String(s.clone()))
            .map_err(|_| format!("unknown subgroup {s}"))?,
        None => AddressSubgroup::All,
    };
    for c in filter_subgroup(&classified, subgroup) {
        let path = c
            .info
            .derivation_path
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_string());
        println!("{:?}\t{}\t{}", c.subgroup, path, c.info.address);
    }
    Ok(())
}

fn print_amount(registry: &TokenRegistry, label: &str, amount: &MultiTokenAmount) -> CliResult {
    println!("{label}\t{}", registry.format_default(amount)?);
    for entry in amount.non_default_entries() {
        println!("\t{}", registry.format_entry(&entry));
    }
    Ok(())
}

fn run_mangled(config: &NetworkConfig, args: MangledArgs) -> CliResult {
    let classified = load_wallet(&args.wallet)?;
    let utxos: Vec<Utxo> = read_json(&args.utxos)?;
    let params = config.unmangle_params_with_fee(args.fee.as_deref())?;
    let token = config.default_token_key();
    let registry = config.token_registry();
    let summary = summarize_wallet(&classified, &utxos, &params, &token)?;
    for (group, amount) in &summary.by_subgroup {
        print_amount(&registry, &format!("{group:?}"), amount)?;
    }
    print_amount(&registry, "can_unmangle", &summary.mangled.can_unmangle)?;
    print_amount(&registry, "cannot_unmangle", &summary.mangled.cannot_unmangle)?;
    let mangled = mangled_address_set(&classified);
    for u in unmangle_inputs(&utxos, &mangled, &params) {
        println!("input\t{}#{}", u.tx_hash, u.output_index);
    }
    Ok(())
}

fn run_delegation(config: &NetworkConfig, args: DelegationArgs) -> CliResult {
    let fetcher = open_fetcher(config, &args.net)?;
    let source = KoiosSource::new(fetcher.clone(), config.default_token_key());
    let rt = tokio::runtime::Runtime::new()?;
    let mut tracker = match (&args.certs, &args.stake) {
        (Some(path), _) => DelegationTracker::replay(&read_json::<Vec<ObservedCertificate>>(path)?),
        (None, Some(stake)) => {
            let account = rt.block_on(fetcher.account_info(stake))?;
            DelegationTracker::from_status(account_status(account.as_ref()))
        }
        (None, None) => return Err("either --certs or --stake is required".into()),
    };
    if let Some(pool) = args.pending_pool {
        tracker.begin_pending(PendingTarget::Pool(pool))?;
    }

    let resolver = PoolMetaResolver::new(Arc::new(source));
    let network_id = config.network_id;
    let describe = |pool: &str| {
        rt.block_on(resolver.resolve(network_id, pool))
            .map(|m| m.label())
            .unwrap_or_else(|| stake_accounting::delegation::short_hash(pool))
    };
    let state = match tracker.status().settled() {
        DelegationStatus::Unregistered => "unregistered",
        DelegationStatus::Registered => "registered",
        DelegationStatus::Delegated { .. } => "delegated",
        DelegationStatus::Deregistered => "deregistered",
        DelegationStatus::PendingConfirmation { .. } => "pending",
    };
    println!("status\t{state}");
    if let Some(pool) = tracker.current_pool() {
        println!("pool\t{}\t{pool}", describe(pool));
    }
    if let Some(pool) = tracker.pending_pool() {
        println!("pending\t{}\t{pool}", describe(pool));
    }
    Ok(())
}

fn run_report(config: &NetworkConfig, args: ReportArgs) -> CliResult {
    let rt = tokio::runtime::Runtime::new()?;
    let loaded = load_ledger(config, &args.ledger, &rt)?;
    let token = config.default_token_key();
    let mut bundle = EvidenceBundle::build(
        loaded.wallet_id.clone(),
        &token,
        loaded.entries,
        loaded.start,
        loaded.end,
        loaded.labels,
    )?;
    if let (Some(addresses), Some(utxos), Some(key)) =
        (&args.addresses, &args.utxos, &args.staking_key)
    {
        let classified = load_wallet(&WalletArgs {
            addresses: addresses.clone(),
            staking_key: key.clone(),
        })?;
        let utxos: Vec<Utxo> = read_json(utxos)?;
        let summary = summarize_wallet(&classified, &utxos, &config.unmangle_params(), &token)?;
        bundle = bundle.with_mangled(summary.mangled);
    }

    if let Some(stake) = &args.ledger.stake {
        let fetcher = open_fetcher(config, &args.ledger.net)?;
        match rt.block_on(fetcher.account_info(stake)) {
            Ok(account) => bundle = bundle.with_delegation(account_status(account.as_ref())),
            Err(e) => warn!(error = %e, "account info unavailable, omitting delegation"),
        }
    }

    let reproducibility_hash_sha256 = reproducibility_hash(&bundle)?;
    let data = ReportData {
        bundle,
        reproducibility_hash_sha256: reproducibility_hash_sha256.clone(),
        default_token: config.default_token.clone(),
    };
    std::fs::create_dir_all(&args.reports_dir)?;
    let stem = file_stem_for(&loaded.wallet_id);
    let html_path = args
        .out
        .unwrap_or_else(|| args.reports_dir.join(format!("{stem}.html")));
    let bundle_path = args.reports_dir.join(format!("{stem}.bundle.json"));
    let hash_path = args.reports_dir.join(format!("{stem}.bundle.sha256"));
    render_report(&data, &html_path)?;
    std::fs::write(&bundle_path, serde_json::to_string_pretty(&data.bundle)?)?;
    std::fs::write(&hash_path, format!("{reproducibility_hash_sha256}\n"))?;
    info!(?html_path, ?bundle_path, ?hash_path, "report complete");
    println!("{reproducibility_hash_sha256}");
    Ok(())
}

fn run_verify(args: VerifyArgs) -> CliResult {
    let bundle: EvidenceBundle = read_json(&args.bundle)?;
    let sha256_path = args.bundle.with_extension("sha256");
    let expected = std::fs::read_to_string(&sha256_path).ok();
    if expected.is_none() {
        warn!(?sha256_path, "no hash file; checking history only");
    }
    let result = verify_bundle(&bundle, expected.as_deref())?;
    if result.ok() {
        println!("OK\t{}", result.bundle_hash);
        return Ok(());
    }
    eprintln!(
        "MISMATCH\tcomputed={}\texpected={:?}\thistory_matches={}",
        result.bundle_hash, result.expected_hash, result.history_matches
    );
    std::process::exit(1);
}
