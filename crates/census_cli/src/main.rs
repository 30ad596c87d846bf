use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use census_store::{
    AnalyticsApi, CensusConfig, CensusStore, CitizenId, CitizenPatchApi, CitizenReadApi,
    ImportApi, ImportId, load_or_init_config, open_store,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

const LOG_FILE_NAME: &str = "census.log";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match cli.command {
        Command::Check => existing_config(&cli.base_dir)?,
        _ => Some(
            load_or_init_config(&cli.base_dir)
                .with_context(|| format!("load config under {}", cli.base_dir.display()))?,
        ),
    };
    init_logging(config.as_ref(), &cli.base_dir)?;

    match cli.command {
        Command::Init => init(&cli.base_dir).await,
        Command::Check => check(&cli.base_dir, config).await,
        Command::Import { file } => import(&cli.base_dir, &file).await,
        Command::Citizens { import_id } => citizens(&cli.base_dir, import_id).await,
        Command::Citizen {
            import_id,
            citizen_id,
        } => citizen(&cli.base_dir, import_id, citizen_id).await,
        Command::Patch {
            import_id,
            citizen_id,
            file,
        } => patch(&cli.base_dir, import_id, citizen_id, &file).await,
        Command::Birthdays { import_id } => birthdays(&cli.base_dir, import_id).await,
        Command::TownStats { import_id } => town_stats(&cli.base_dir, import_id).await,
    }
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Citizen imports, relatives and birthday statistics"
)]
struct Cli {
    /// Directory holding `census.json` and, by default, the SQLite database.
    #[arg(long, global = true, default_value = ".census")]
    base_dir: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default configuration and run migrations.
    Init,
    /// Report whether the configuration, database and logs directory are usable.
    Check,
    /// Store a `{ "citizens": [...] }` JSON file as a new import.
    Import { file: PathBuf },
    /// Print every citizen of an import.
    Citizens { import_id: i32 },
    /// Print one citizen.
    Citizen { import_id: i32, citizen_id: i64 },
    /// Apply a partial update read from a JSON file.
    Patch {
        import_id: i32,
        citizen_id: i64,
        file: PathBuf,
    },
    /// Presents bought per month.
    Birthdays { import_id: i32 },
    /// Age percentiles per town.
    TownStats { import_id: i32 },
}

fn existing_config(base_dir: &Path) -> Result<Option<CensusConfig>> {
    let path = CensusConfig::config_path(base_dir);
    if !path.exists() {
        return Ok(None);
    }
    let config = CensusConfig::load(&path).with_context(|| format!("read {}", path.display()))?;
    Ok(Some(config))
}

fn init_logging(config: Option<&CensusConfig>, base_dir: &Path) -> Result<()> {
    let level = config.map(CensusConfig::log_level).unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let logs_dir = config.and_then(|config| config.logs_dir(base_dir));
    match logs_dir {
        Some(dir) => {
            fs::create_dir_all(&dir)
                .with_context(|| format!("create logs dir {}", dir.display()))?;
            let file = File::options()
                .create(true)
                .append(true)
                .open(dir.join(LOG_FILE_NAME))
                .with_context(|| format!("open log file under {}", dir.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|err| anyhow!(err))?;
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|err| anyhow!(err))?;
        }
    }
    Ok(())
}

async fn store(base_dir: &Path) -> Result<CensusStore> {
    open_store(base_dir)
        .await
        .with_context(|| format!("open store under {}", base_dir.display()))
}

fn read_json(path: &Path) -> Result<Value> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn init(base_dir: &Path) -> Result<()> {
    let store = store(base_dir).await?;
    log::info!("census: initialised store under {}", base_dir.display());
    print_json(&json!({
        "config": CensusConfig::config_path(base_dir),
        "backend": format!("{:?}", store.backend()).to_lowercase(),
    }))
}

#[derive(Serialize)]
struct CheckReport {
    config_path: PathBuf,
    config_exists: bool,
    database_reachable: bool,
    database_error: Option<String>,
    logs_dir: Option<PathBuf>,
    logs_dir_exists: bool,
}

impl CheckReport {
    fn passed(&self) -> bool {
        self.config_exists && self.database_reachable && self.logs_dir_exists
    }
}

async fn check(base_dir: &Path, config: Option<CensusConfig>) -> Result<()> {
    let config_path = CensusConfig::config_path(base_dir);
    let mut report = CheckReport {
        config_path,
        config_exists: config.is_some(),
        database_reachable: false,
        database_error: None,
        logs_dir: None,
        logs_dir_exists: false,
    };
    if let Some(config) = &config {
        match CensusStore::connect(config, base_dir).await {
            Ok(_) => report.database_reachable = true,
            Err(err) => report.database_error = Some(err.to_string()),
        }
        report.logs_dir = config.logs_dir(base_dir);
        // stderr logging needs no directory
        report.logs_dir_exists = report.logs_dir.as_ref().is_none_or(|dir| dir.is_dir());
    }
    print_json(&report)?;
    if report.passed() {
        Ok(())
    } else {
        Err(anyhow!("configuration check failed"))
    }
}

async fn import(base_dir: &Path, file: &Path) -> Result<()> {
    let payload = read_json(file)?;
    let store = store(base_dir).await?;
    let import_id = store
        .import_citizens(payload)
        .await
        .with_context(|| format!("import {}", file.display()))?;
    print_json(&json!({ "import_id": import_id }))
}

async fn citizens(base_dir: &Path, import_id: i32) -> Result<()> {
    let store = store(base_dir).await?;
    let citizens = store.list_citizens(ImportId(import_id)).await?;
    print_json(&citizens)
}

async fn citizen(base_dir: &Path, import_id: i32, citizen_id: i64) -> Result<()> {
    let store = store(base_dir).await?;
    let citizen = store
        .get_citizen(ImportId(import_id), CitizenId(citizen_id))
        .await?;
    print_json(&citizen)
}

async fn patch(base_dir: &Path, import_id: i32, citizen_id: i64, file: &Path) -> Result<()> {
    let payload = read_json(file)?;
    let store = store(base_dir).await?;
    let citizen = store
        .patch_citizen(ImportId(import_id), CitizenId(citizen_id), payload)
        .await
        .with_context(|| format!("patch citizen {citizen_id} in import {import_id}"))?;
    print_json(&citizen)
}

async fn birthdays(base_dir: &Path, import_id: i32) -> Result<()> {
    let store = store(base_dir).await?;
    let presents = store.birthdays(ImportId(import_id)).await?;
    print_json(&presents)
}

async fn town_stats(base_dir: &Path, import_id: i32) -> Result<()> {
    let store = store(base_dir).await?;
    let stats = store.town_age_stats(ImportId(import_id)).await?;
    print_json(&stats)
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command, check, existing_config, read_json};
    use clap::Parser;
    use tempfile::tempdir;

    #[test]
    fn parses_patch_with_global_base_dir() {
        let cli = Cli::parse_from([
            "census",
            "patch",
            "3",
            "17",
            "body.json",
            "--base-dir",
            "/tmp/c",
        ]);
        assert_eq!(cli.base_dir.to_string_lossy(), "/tmp/c");
        match cli.command {
            Command::Patch {
                import_id,
                citizen_id,
                file,
            } => {
                assert_eq!(import_id, 3);
                assert_eq!(citizen_id, 17);
                assert_eq!(file.to_string_lossy(), "body.json");
            }
            _ => panic!("expected patch command"),
        }
    }

    #[test]
    fn parses_town_stats_and_defaults_base_dir() {
        let cli = Cli::parse_from(["census", "town-stats", "1"]);
        assert_eq!(cli.base_dir.to_string_lossy(), ".census");
        assert!(matches!(cli.command, Command::TownStats { import_id: 1 }));
        assert!(Cli::try_parse_from(["census", "citizens", "abc"]).is_err());
    }

    #[tokio::test]
    async fn check_fails_without_config_and_passes_after_init() {
        let dir = tempdir().expect("tempdir");
        let base = dir.path();
        assert!(existing_config(base).expect("read config").is_none());
        assert!(check(base, None).await.is_err());

        census_store::load_or_init_config(base).expect("init config");
        let config = existing_config(base).expect("read config");
        assert!(config.is_some());
        check(base, config).await.expect("check passes");
    }

    #[test]
    fn read_json_reports_parse_errors() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").expect("write");
        let err = read_json(&path).expect_err("invalid json");
        assert!(err.to_string().contains("bad.json"));
    }
}
