//! CyberKG CLI: security knowledge graph with MCP server.
//!
//! Usage:
//!   cyberkg init | refresh | reset | stats | frameworks
//!   cyberkg ingest attack [--domain ..] | framework <name> | all
//!   cyberkg ask <question> [--scope ..] [--mode smart|comprehensive]
//!   cyberkg technique <ID> | tactic [name] | group <name> | list <kind>
//!   cyberkg mcp

use clap::{Parser, Subcommand, ValueEnum};
use cyberkg::ingest::{IngestOutcome, IngestSummary, InitOutcome};
use cyberkg::query::CatalogEntry;
use cyberkg::{Framework, Label, Scope, SearchMode, Services, Settings};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "cyberkg",
    version,
    about = "Security knowledge graph over MITRE ATT&CK and compliance frameworks"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to a YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Path to SQLite database file (overrides config and CYBERKG_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Directory of local `<domain>-attack.json` bundles (skips downloading)
    #[arg(long, global = true)]
    bundle_dir: Option<PathBuf>,
    /// More logging (-v debug, -vv trace); RUST_LOG wins when set
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest ATT&CK if the knowledge base is empty
    Init,
    /// Ingest one source or all of them
    Ingest {
        #[command(subcommand)]
        target: IngestTarget,
    },
    /// Wipe the knowledge base and ingest everything again
    Refresh,
    /// Remove every node and relationship
    Reset,
    /// Remove one framework's nodes and relationships
    Delete {
        /// attack, cis, nist, hipaa, ffiec or pci-dss
        framework: String,
    },
    /// Ask a question
    Ask {
        question: String,
        /// all, attack, cis, nist, hipaa, ffiec or pci-dss
        #[arg(long, default_value = "all")]
        scope: String,
        #[arg(long, value_enum, default_value_t = ModeArg::Smart)]
        mode: ModeArg,
    },
    /// Node and relationship counts
    Stats,
    /// Show one ATT&CK technique
    Technique {
        /// Technique ID, e.g. T1055
        id: String,
        /// Also list mitigations
        #[arg(long)]
        mitigations: bool,
    },
    /// Techniques per tactic
    Tactic {
        /// Tactic name or short name; all tactics when omitted
        name: Option<String>,
    },
    /// Techniques used by a threat group
    Group {
        /// Substring of the group name
        name: String,
    },
    /// List catalog entries
    List {
        #[arg(value_enum)]
        kind: ListKind,
    },
    /// Supported frameworks with live node counts
    Frameworks,
    /// Start the MCP (Model Context Protocol) server on stdio
    Mcp,
}

#[derive(Subcommand)]
enum IngestTarget {
    /// ATT&CK STIX bundles
    Attack {
        /// enterprise, mobile or ics; repeatable (defaults to config)
        #[arg(long = "domain")]
        domains: Vec<String>,
    },
    /// One document framework from its PDF
    Framework {
        /// cis, nist, hipaa, ffiec or pci-dss
        name: String,
    },
    /// ATT&CK plus every document framework
    All,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Smart,
    Comprehensive,
}

impl From<ModeArg> for SearchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Smart => SearchMode::Smart,
            ModeArg::Comprehensive => SearchMode::Comprehensive,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ListKind {
    Tactics,
    Groups,
    Mitigations,
    DataSources,
    Campaigns,
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        _ if std::env::var_os("RUST_LOG").is_some() => {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
        }
        0 => EnvFilter::new("info"),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    // stdout belongs to command output and the MCP transport
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_services(
    config: Option<PathBuf>,
    db: Option<PathBuf>,
    bundle_dir: Option<PathBuf>,
) -> Result<Services, String> {
    let mut settings = Settings::load(config.as_deref()).map_err(|e| e.to_string())?;
    if let Some(db) = db {
        settings.db_path = db;
    }
    if bundle_dir.is_some() {
        settings.stix.bundle_dir = bundle_dir;
    }
    Services::from_settings(&settings).map_err(|e| e.to_string())
}

fn parse_framework(name: &str) -> Result<Framework, i32> {
    name.parse().map_err(|e| {
        eprintln!("Error: {}", e);
        2
    })
}

// ---------------------------------------------------------------------------
// Ingestion commands
// ---------------------------------------------------------------------------

fn print_outcome(source: &str, outcome: &IngestOutcome) {
    match outcome {
        IngestOutcome::Ingested { report, used_fallback } => {
            let fallback = if *used_fallback { " (sample data)" } else { "" };
            println!(
                "{:<12}  ok    {:>7} nodes  {:>7} relationships  {:>4} rejected{}",
                source,
                report.nodes_applied,
                report.relationships_applied,
                report.rejections.len(),
                fallback
            );
        }
        IngestOutcome::Failed { reason } => println!("{:<12}  FAIL  {}", source, reason),
    }
}

fn print_summary(summary: &IngestSummary) -> i32 {
    for (domain, outcome) in &summary.attack {
        print_outcome(&format!("attack/{}", domain), outcome);
    }
    for (framework, outcome) in &summary.frameworks {
        print_outcome(framework.code(), outcome);
    }
    if summary.failures() > 0 {
        eprintln!("{} source(s) failed", summary.failures());
        1
    } else {
        0
    }
}

async fn cmd_init(services: &Services) -> i32 {
    match services.ingestor.initialize(&services.domains).await {
        Ok(InitOutcome::AlreadyInitialized { nodes }) => {
            println!("Knowledge base already initialized ({} nodes)", nodes);
            0
        }
        Ok(InitOutcome::Initialized(outcomes)) => {
            let summary = IngestSummary {
                attack: outcomes,
                frameworks: Vec::new(),
            };
            print_summary(&summary)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_ingest(services: &Services, target: IngestTarget) -> i32 {
    match target {
        IngestTarget::Attack { domains } => {
            let domains = if domains.is_empty() {
                services.domains.clone()
            } else {
                match cyberkg::services::attack_domains(&domains) {
                    Ok(d) => d,
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        return 2;
                    }
                }
            };
            let summary = IngestSummary {
                attack: services.ingestor.ingest_attack_domains(&domains).await,
                frameworks: Vec::new(),
            };
            print_summary(&summary)
        }
        IngestTarget::Framework { name } => {
            let framework = match parse_framework(&name) {
                Ok(f) => f,
                Err(code) => return code,
            };
            let outcome = services.ingestor.ingest_framework(framework).await;
            print_outcome(framework.code(), &outcome);
            if outcome.is_ok() {
                0
            } else {
                1
            }
        }
        IngestTarget::All => print_summary(&services.ingestor.ingest_all(&services.domains).await),
    }
}

async fn cmd_refresh(services: &Services) -> i32 {
    match services.ingestor.refresh(&services.domains).await {
        Ok(summary) => print_summary(&summary),
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_reset(services: &Services) -> i32 {
    match services.ingestor.reset() {
        Ok(()) => {
            println!("Knowledge base cleared");
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_delete(services: &Services, name: &str) -> i32 {
    let framework = match parse_framework(name) {
        Ok(f) => f,
        Err(code) => return code,
    };
    match services.ingestor.delete_framework(framework) {
        Ok(removed) => {
            println!("Deleted {} ({} nodes)", framework.code(), removed);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

// ---------------------------------------------------------------------------
// Query commands
// ---------------------------------------------------------------------------

async fn cmd_ask(services: &Services, question: &str, scope: &str, mode: ModeArg) -> i32 {
    let scope: Scope = match scope.parse() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 2;
        }
    };
    println!("{}", services.chat.ask(question, scope, mode.into()).await);
    0
}

fn cmd_stats(services: &Services) -> i32 {
    let stats = match services.queries.stats() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    println!("{:<28}  {:>8}", "LABEL", "NODES");
    println!("{}", "-".repeat(38));
    for label in Label::ALL {
        let n = stats.count(label);
        if n > 0 {
            println!("{:<28}  {:>8}", label, n);
        }
    }
    println!("{}", "-".repeat(38));
    println!("{:<28}  {:>8}", "Total nodes", stats.total_nodes);
    println!("{:<28}  {:>8}", "Relationships", stats.relationships);
    0
}

fn cmd_technique(services: &Services, id: &str, mitigations: bool) -> i32 {
    let detail = match services.queries.technique_by_id(id) {
        Ok(Some(d)) => d,
        Ok(None) => {
            eprintln!("Error: technique '{}' not found", id);
            return 1;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    println!("{} - {}", detail.identifier, detail.name);
    println!("Tactics:       {}", detail.tactics.join(", "));
    println!("Platforms:     {}", detail.platforms.join(", "));
    println!("Threat groups: {}", detail.threat_groups.join(", "));
    println!("Malware:       {}", detail.malware.join(", "));
    println!();
    println!("{}", detail.description);

    if mitigations {
        match services.queries.technique_mitigations(id) {
            Ok(entries) => {
                println!();
                println!("Mitigations:");
                for m in entries {
                    println!("  {:<8}  {}", m.identifier.unwrap_or_default(), m.name);
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
    }
    0
}

fn cmd_tactic(services: &Services, name: Option<&str>) -> i32 {
    match services.queries.techniques_by_tactic(name) {
        Ok(rows) if rows.is_empty() => {
            println!("No techniques found.");
            0
        }
        Ok(rows) => {
            println!("{:<24}  {:<12}  NAME", "TACTIC", "ID");
            println!("{}", "-".repeat(72));
            for row in rows {
                println!("{:<24}  {:<12}  {}", row.tactic, row.identifier, row.name);
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_group(services: &Services, name: &str) -> i32 {
    match services.queries.threat_group_techniques(name) {
        Ok(rows) if rows.is_empty() => {
            println!("No techniques found for '{}'.", name);
            0
        }
        Ok(rows) => {
            println!("{:<20}  {:<12}  {:<10}  TECHNIQUE", "GROUP", "ID", "RELATION");
            println!("{}", "-".repeat(72));
            for row in rows {
                println!(
                    "{:<20}  {:<12}  {:<10}  {}",
                    row.group_name, row.identifier, row.relationship_type, row.technique_name
                );
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_list(services: &Services, kind: ListKind) -> i32 {
    let queries = &services.queries;
    let entries = match kind {
        ListKind::Tactics => queries.list_tactics(),
        ListKind::Groups => queries.list_threat_groups(),
        ListKind::Mitigations => queries.list_mitigations(),
        ListKind::DataSources => queries.list_data_sources(),
        ListKind::Campaigns => queries.list_campaigns(),
    };
    match entries {
        Ok(entries) if entries.is_empty() => {
            println!("Nothing found.");
            0
        }
        Ok(entries) => {
            for entry in &entries {
                println!("{}", catalog_line(entry));
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn catalog_line(entry: &CatalogEntry) -> String {
    let mut line = match &entry.identifier {
        Some(id) => format!("{:<8}  {}", id, entry.name),
        None => entry.name.clone(),
    };
    if !entry.aliases.is_empty() {
        line.push_str(&format!("  ({})", entry.aliases.join(", ")));
    }
    if let (Some(first), Some(last)) = (&entry.first_seen, &entry.last_seen) {
        line.push_str(&format!("  [{} .. {}]", first, last));
    }
    line
}

fn cmd_frameworks(services: &Services) -> i32 {
    match services.queries.framework_info() {
        Ok(frameworks) => {
            println!("{:<8}  {:<38}  {:<22}  {:>7}", "CODE", "NAME", "TYPE", "NODES");
            println!("{}", "-".repeat(82));
            for f in frameworks {
                println!("{:<8}  {:<38}  {:<22}  {:>7}", f.info.code, f.info.name, f.info.kind, f.nodes);
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn run(command: Commands, services: Services) -> i32 {
    match command {
        Commands::Init => cmd_init(&services).await,
        Commands::Ingest { target } => cmd_ingest(&services, target).await,
        Commands::Refresh => cmd_refresh(&services).await,
        Commands::Reset => cmd_reset(&services),
        Commands::Delete { framework } => cmd_delete(&services, &framework),
        Commands::Ask { question, scope, mode } => cmd_ask(&services, &question, &scope, mode).await,
        Commands::Stats => cmd_stats(&services),
        Commands::Technique { id, mitigations } => cmd_technique(&services, &id, mitigations),
        Commands::Tactic { name } => cmd_tactic(&services, name.as_deref()),
        Commands::Group { name } => cmd_group(&services, &name),
        Commands::List { kind } => cmd_list(&services, kind),
        Commands::Frameworks => cmd_frameworks(&services),
        Commands::Mcp => cyberkg::mcp::serve_stdio(services).await,
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let services = match load_services(cli.config, cli.db, cli.bundle_dir) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };
    let code = rt.block_on(run(cli.command, services));
    std::process::exit(code);
}
