//! Operator command line for catalog reconciliation
//!
//! Prints dry-run plans as JSON on stdout. Plans are never executed from
//! here; applying them is the confirm step of the admin UI.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use catalog_reconcile_lib::application::{ReconciliationService, SkuPlanReportDto, SyncPlanReportDto};
use catalog_reconcile_lib::domain::repositories::TaxonomyFeed;
use catalog_reconcile_lib::infrastructure::logging::{init_logging_with_config, log_system_info};
use catalog_reconcile_lib::infrastructure::{
    AppConfig, ConfigManager, DatabaseConnection, JsonFileTaxonomyFeed, SqliteCatalogRepository, SqliteDictionaryRepository,
    SqlitePlanExecutor, StaticTaxonomyFeed,
};

const USAGE: &str = "\
Usage: catalog-reconcile [--config <file>] <command>

Commands:
  sync-plan <snapshot.json>   Diff an external taxonomy snapshot against the local tree
  sku-plan                    Audit product article codes against their categories
  init-db                     Create the database and apply the schema
  help                        Show this message

Environment:
  CATALOG_RECONCILE_<SECTION>__<KEY> overrides any configuration value,
  e.g. CATALOG_RECONCILE_DATABASE__URL=sqlite:catalog.db";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    SyncPlan { snapshot: PathBuf },
    SkuPlan,
    InitDb,
    Help,
}

#[derive(Debug, PartialEq, Eq)]
struct Cli {
    config: Option<PathBuf>,
    command: Command,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Cli> {
    let mut config = None;
    let mut positional = Vec::new();

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().context("--config requires a file path")?;
                config = Some(PathBuf::from(path));
            }
            "--help" | "-h" => positional.push("help".to_string()),
            flag if flag.starts_with('-') => bail!("unknown option '{flag}'"),
            other => positional.push(other.to_string()),
        }
    }

    let command = match positional.as_slice() {
        [] => Command::Help,
        [command, rest @ ..] => match (command.as_str(), rest) {
            ("sync-plan", [snapshot]) => Command::SyncPlan {
                snapshot: PathBuf::from(snapshot),
            },
            ("sync-plan", _) => bail!("sync-plan takes exactly one snapshot file"),
            ("sku-plan", []) => Command::SkuPlan,
            ("init-db", []) => Command::InitDb,
            ("help", _) => Command::Help,
            (other, _) => bail!("unknown command '{other}'"),
        },
    };

    Ok(Cli { config, command })
}

/// Explicit `--config` file, otherwise the JSON file in the user config
/// directory (created with defaults on first run). Environment variables
/// are layered on top either way.
async fn load_config(explicit: Option<PathBuf>) -> Result<AppConfig> {
    let path = match explicit {
        Some(path) => path,
        None => {
            let manager = ConfigManager::new()?;
            manager.load_config().await?;
            manager.config_path().to_path_buf()
        }
    };
    AppConfig::from_layers(Some(&path)).with_context(|| format!("Failed to load configuration from {:?}", path))
}

async fn open_database(config: &AppConfig) -> Result<DatabaseConnection> {
    let db = DatabaseConnection::new(&config.database.url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.url))?;
    db.migrate().await.context("Failed to apply database schema")?;
    Ok(db)
}

fn build_service(db: &DatabaseConnection, feed: Arc<dyn TaxonomyFeed>, config: &AppConfig) -> Result<ReconciliationService> {
    let pool = db.pool().clone();
    let service = ReconciliationService::new(
        Arc::new(SqliteCatalogRepository::new(pool.clone())),
        Arc::new(SqliteDictionaryRepository::new(pool.clone())),
        Arc::new(SqlitePlanExecutor::new(pool)),
        feed,
        &config.reconciliation,
    )?;
    Ok(service)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize plan")?;
    println!("{json}");
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    if cli.command == Command::Help {
        println!("{USAGE}");
        return Ok(());
    }

    let config = load_config(cli.config).await?;
    init_logging_with_config(&config.logging)?;
    log_system_info();

    let db = open_database(&config).await?;

    match cli.command {
        Command::InitDb => {
            info!("✅ Database ready at {}", config.database.url);
        }
        Command::SyncPlan { snapshot } => {
            let service = build_service(&db, Arc::new(JsonFileTaxonomyFeed::new(&snapshot)), &config)?;
            service.refresh_dictionary().await?;
            let plan = service.fetch_sync_plan().await?;
            print_json(&SyncPlanReportDto::from(&plan))?;
        }
        Command::SkuPlan => {
            // SKU audits never read the feed
            let service = build_service(&db, Arc::new(StaticTaxonomyFeed::new(Vec::new())), &config)?;
            let plan = service.build_sku_resolution_plan().await?;
            print_json(&SkuPlanReportDto::from(&plan))?;
        }
        Command::Help => {}
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = match parse_args(std::env::args().skip(1)) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("error: {e:#}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_sync_plan_with_config() {
        let cli = parse_args(args(&["--config", "reconcile.toml", "sync-plan", "feed.json"])).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("reconcile.toml")));
        assert_eq!(
            cli.command,
            Command::SyncPlan {
                snapshot: PathBuf::from("feed.json")
            }
        );
    }

    #[test]
    fn no_arguments_shows_help() {
        assert_eq!(parse_args(args(&[])).unwrap().command, Command::Help);
        assert_eq!(parse_args(args(&["-h"])).unwrap().command, Command::Help);
    }

    #[test]
    fn rejects_malformed_invocations() {
        assert!(parse_args(args(&["sync-plan"])).is_err());
        assert!(parse_args(args(&["sku-plan", "extra"])).is_err());
        assert!(parse_args(args(&["execute"])).is_err());
        assert!(parse_args(args(&["--config"])).is_err());
        assert!(parse_args(args(&["--verbose", "sku-plan"])).is_err());
    }
}
