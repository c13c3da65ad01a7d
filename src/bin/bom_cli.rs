use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use modular_bom::{
    config::{self, AppConfig},
    db::{self, DbPool},
    services::{
        bom::BomService,
        bom_tree::{BomNode, ManifestSource},
    },
};
use serde::Serialize;
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Migrate => handle_migrate(&context).await?,
        Commands::Tree(args) => handle_tree(&context, args, cli.json).await?,
        Commands::Export(args) => handle_export(&context, args).await?,
        Commands::Import(args) => handle_import(&context, args, cli.json).await?,
        Commands::Activate(args) => handle_activate(&context, args, cli.json).await?,
        Commands::Manifest(args) => handle_manifest(&context, args, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "bom-cli", about = "Modular BOM tree tooling", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Print the expanded tree of a version
    Tree(VersionArgs),
    /// Write the flattened tree of a version as CSV
    Export(ExportArgs),
    /// Replace a version's structure with rows from a CSV file
    Import(ImportArgs),
    /// Make a version the active version of its material
    Activate(VersionArgs),
    /// List the export manifest of a material
    Manifest(ManifestArgs),
}

#[derive(Args)]
struct VersionArgs {
    #[arg(help = "BOM version id")]
    version_id: i64,
}

#[derive(Args)]
struct ExportArgs {
    #[arg(help = "BOM version id")]
    version_id: i64,
    #[arg(long, short, help = "Output file (.xlsx or .csv); CSV on stdout when omitted")]
    out: Option<PathBuf>,
}

#[derive(Args)]
struct ImportArgs {
    #[arg(help = "Target BOM version id")]
    version_id: i64,
    #[arg(
        help = "CSV or xlsx file with display_position_code, component_code and quantity columns"
    )]
    file: PathBuf,
}

#[derive(Args)]
struct ManifestArgs {
    #[arg(help = "Root material id")]
    material_id: i64,
}

struct CliContext {
    _config: AppConfig,
    db: Arc<DbPool>,
    bom_service: BomService,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;
        let db = Arc::new(db_pool);
        let bom_service = BomService::from_config(db.clone(), &config);
        debug!(target: "bom_cli", "CLI context initialized");

        Ok(Self {
            _config: config,
            db,
            bom_service,
        })
    }
}

async fn handle_migrate(context: &CliContext) -> Result<()> {
    db::run_migrations(&context.db)
        .await
        .context("failed to run migrations")?;
    println!("Migrations applied");
    Ok(())
}

async fn handle_tree(context: &CliContext, args: VersionArgs, json: bool) -> Result<()> {
    let tree = context
        .bom_service
        .expand(args.version_id)
        .await
        .with_context(|| format!("failed to expand version {}", args.version_id))?;

    if json {
        print_json(&tree)?;
    } else if tree.is_empty() {
        println!("Version {} has no lines", args.version_id);
    } else {
        for node in &tree {
            render_node(node);
        }
    }
    Ok(())
}

fn is_workbook(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx"))
}

async fn handle_export(context: &CliContext, args: ExportArgs) -> Result<()> {
    let workbook = args.out.as_deref().is_some_and(is_workbook);
    let body = if workbook {
        context.bom_service.export_xlsx(args.version_id).await
    } else {
        context.bom_service.export_csv(args.version_id).await
    }
    .with_context(|| format!("failed to export version {}", args.version_id))?;

    match args.out {
        Some(path) => {
            fs::write(&path, &body)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Exported version {} to {}", args.version_id, path.display());
        }
        None => print!("{}", String::from_utf8_lossy(&body)),
    }
    Ok(())
}

async fn handle_import(context: &CliContext, args: ImportArgs, json: bool) -> Result<()> {
    let summary = if is_workbook(&args.file) {
        let bytes = fs::read(&args.file)
            .with_context(|| format!("failed to read {}", args.file.display()))?;
        context.bom_service.import_xlsx(args.version_id, &bytes).await
    } else {
        let file = fs::File::open(&args.file)
            .with_context(|| format!("failed to open {}", args.file.display()))?;
        context.bom_service.import_csv(args.version_id, file).await
    }
    .with_context(|| format!("import into version {} failed", args.version_id))?;

    if json {
        print_json(&summary)?;
    } else {
        println!(
            "Imported {} lines into version {} ({} reused)",
            summary.imported_count, args.version_id, summary.reused_count
        );
        for code in &summary.created_versions {
            println!("Created version {}", code);
        }
    }
    Ok(())
}

async fn handle_activate(context: &CliContext, args: VersionArgs, json: bool) -> Result<()> {
    let version = context
        .bom_service
        .activate_version(args.version_id)
        .await
        .with_context(|| format!("failed to activate version {}", args.version_id))?;

    if json {
        print_json(&version)?;
    } else {
        println!("Version {} is now active", version.version_code);
    }
    Ok(())
}

async fn handle_manifest(context: &CliContext, args: ManifestArgs, json: bool) -> Result<()> {
    let entries = context
        .bom_service
        .collect_manifest(args.material_id)
        .await
        .with_context(|| format!("failed to collect manifest of material {}", args.material_id))?;

    if json {
        print_json(&entries)?;
        return Ok(());
    }

    for entry in &entries {
        match &entry.source {
            ManifestSource::File(path) => {
                println!("{}  <- {}", entry.destination, path.display())
            }
            ManifestSource::Buffer(body) => {
                println!("{}  <- generated ({} bytes)", entry.destination, body.len())
            }
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_node(node: &BomNode) {
    let indent = "  ".repeat(usize::try_from(node.level - 1).unwrap_or(0));
    println!(
        "{}{} • {} {} • qty {}{}",
        indent,
        node.display_position_code,
        node.component_code,
        node.component_name,
        node.quantity,
        node.component_unit
            .as_deref()
            .map(|u| format!(" {}", u))
            .unwrap_or_default()
    );
    for child in node.children.iter().flatten() {
        render_node(child);
    }
}
