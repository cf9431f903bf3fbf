#![deny(warnings)]

//! Operator CLI for the game point ledger.

mod config;

use anyhow::{bail, Context, Result};
use config::AppConfig;
use persistence::{init_db, prepare_sqlite_path, SqliteStore};
use points_core::import::{contracts_from_json, games_from_json};
use points_core::{format_amount, ContractId, ExcellenceTier, GameId, PointStore};
use points_engine::{PointEngine, ReconcileMode, ReconcileReport};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "\
usage: points-cli [--config FILE] [--json] <command>

commands:
  migrate                              create the database and apply migrations
  import <games.json> <contracts.json> load games and contracts
  usage <game-id>                      pooled self/base usage of one game
  categories <game-id>                 usage by service category
  category-stats                       category usage across every game, with shares
  reconcile <game-id>|--all [--mode proportional|sequential]
  portfolio                            every game with capacity, usage and remaining
  companies                            per-studio roll-up, highest usage rate first
  thresholds                           games at or below a configured threshold
  self-first <contract-id> on|off      set a contract's self-points-first flag
  excellence <game-id> <1st|2nd|3rd> on|off
  version";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Migrate,
    Import { games: PathBuf, contracts: PathBuf },
    Usage(GameId),
    Categories(GameId),
    Reconcile {
        game: Option<GameId>,
        mode: Option<ReconcileMode>,
    },
    Portfolio,
    Companies,
    CategoryStats,
    Thresholds,
    SelfFirst { contract: ContractId, enabled: bool },
    Excellence {
        game: GameId,
        tier: ExcellenceTier,
        enabled: bool,
    },
    Version,
    Help,
}

#[derive(Debug)]
struct Args {
    config: Option<PathBuf>,
    json: bool,
    command: Command,
}

fn game_id(raw: Option<String>) -> Result<GameId> {
    let raw = raw.context("missing game id")?;
    let id = raw
        .parse::<i64>()
        .with_context(|| format!("invalid game id: {raw}"))?;
    Ok(GameId(id))
}

fn switch(raw: Option<String>) -> Result<bool> {
    match raw.as_deref() {
        Some("on") | Some("true") => Ok(true),
        Some("off") | Some("false") => Ok(false),
        other => bail!("expected on|off, got {other:?}"),
    }
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Args> {
    let mut config = None;
    let mut json = false;
    let mut all = false;
    let mut mode = None;
    let mut positional = Vec::new();

    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => config = Some(PathBuf::from(it.next().context("--config needs a path")?)),
            "--json" => json = true,
            "--all" => all = true,
            "--mode" => {
                let raw = it.next().context("--mode needs a value")?;
                mode = Some(raw.parse::<ReconcileMode>().map_err(anyhow::Error::msg)?);
            }
            "-h" | "--help" => positional = vec!["help".to_string()],
            "-V" | "--version" => positional = vec!["version".to_string()],
            _ => positional.push(arg),
        }
    }

    let mut pos = positional.into_iter();
    let command = match pos.next().as_deref() {
        None | Some("help") => Command::Help,
        Some("version") => Command::Version,
        Some("migrate") => Command::Migrate,
        Some("import") => Command::Import {
            games: pos.next().context("missing games file")?.into(),
            contracts: pos.next().context("missing contracts file")?.into(),
        },
        Some("usage") => Command::Usage(game_id(pos.next())?),
        Some("categories") => Command::Categories(game_id(pos.next())?),
        Some("reconcile") => {
            let game = if all { None } else { Some(game_id(pos.next())?) };
            Command::Reconcile { game, mode }
        }
        Some("portfolio") => Command::Portfolio,
        Some("companies") => Command::Companies,
        Some("category-stats") => Command::CategoryStats,
        Some("thresholds") => Command::Thresholds,
        Some("self-first") => Command::SelfFirst {
            contract: ContractId(pos.next().context("missing contract id")?),
            enabled: switch(pos.next())?,
        },
        Some("excellence") => {
            let game = game_id(pos.next())?;
            let tier = ExcellenceTier::from_label(&pos.next().context("missing tier")?)?;
            Command::Excellence {
                game,
                tier,
                enabled: switch(pos.next())?,
            }
        }
        Some(other) => bail!("unknown command: {other}\n\n{USAGE}"),
    };
    if let Some(extra) = pos.next() {
        bail!("unexpected argument: {extra}");
    }
    Ok(Args {
        config,
        json,
        command,
    })
}

fn emit<T: Serialize>(json: bool, value: &T, human: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}

fn print_report(r: &ReconcileReport) {
    println!(
        "game {} ({}) | written: {} | cleared: {} | failed: {} | base: {} | self: {} | excellent: {}",
        r.game_id,
        r.mode,
        r.written.len(),
        r.cleared.len(),
        r.failed.len(),
        format_amount(r.base_total()),
        format_amount(r.self_total()),
        format_amount(r.excellent_total()),
    );
    for f in &r.failed {
        println!("  FAILED {}: {}", f.contract_id, f.error);
    }
}

async fn open_store(cfg: &AppConfig) -> Result<SqliteStore> {
    prepare_sqlite_path(&cfg.database_url)?;
    Ok(init_db(&cfg.database_url).await?)
}

async fn run(args: Args, cfg: AppConfig) -> Result<()> {
    let json = args.json;
    let engine = match args.command {
        Command::Help => {
            println!("{USAGE}");
            return Ok(());
        }
        Command::Version => {
            println!(
                "points-cli {} ({} {})",
                env!("CARGO_PKG_VERSION"),
                env!("GIT_SHA"),
                env!("BUILD_DATE")
            );
            return Ok(());
        }
        _ => PointEngine::new(open_store(&cfg).await?, cfg.engine_settings()),
    };

    match args.command {
        Command::Help | Command::Version => {}
        Command::Migrate => println!("DB migrated at {}", cfg.database_url),
        Command::Import { games, contracts } => {
            let pools = games_from_json(
                &std::fs::read_to_string(&games)
                    .with_context(|| format!("reading {}", games.display()))?,
            )?;
            let records = contracts_from_json(
                &std::fs::read_to_string(&contracts)
                    .with_context(|| format!("reading {}", contracts.display()))?,
            )?;
            for pool in &pools {
                engine.store().save_point_pool(pool).await?;
            }
            for record in &records {
                engine.store().save_contract(record).await?;
            }
            info!(games = pools.len(), contracts = records.len(), "import finished");
            println!("imported {} games, {} contracts", pools.len(), records.len());
        }
        Command::Usage(game) => {
            let usage = engine.usage().compute_usage(game).await?;
            emit(json, &usage, |u| {
                println!(
                    "game {game} | used: {} | self: {} | base: {} | requested: {}{}",
                    format_amount(u.total_used),
                    format_amount(u.self_used),
                    format_amount(u.base_used),
                    format_amount(u.requested),
                    if u.insufficient() {
                        format!(" | INSUFFICIENT by {}", format_amount(u.shortfall()))
                    } else {
                        String::new()
                    }
                )
            })?;
        }
        Command::Categories(game) => {
            let by_category = engine.categories().compute_by_category(game).await?;
            emit(json, &by_category, |m| {
                for (name, c) in m {
                    println!(
                        "{name}: {} contracts | total: {} | self: {} | base: {}",
                        c.contract_count,
                        format_amount(c.total_used),
                        format_amount(c.self_used),
                        format_amount(c.base_used),
                    );
                }
            })?;
        }
        Command::Reconcile { game, mode } => {
            let mode = mode.unwrap_or(cfg.reconcile_mode);
            match game {
                Some(game) => {
                    let report = engine.reconciler().reconcile(game, mode).await?;
                    emit(json, &report, print_report)?;
                    if !report.is_complete() {
                        bail!("{} contract writes failed", report.failed.len());
                    }
                }
                None => {
                    let all = engine.reconciler().reconcile_all(mode).await?;
                    emit(json, &all, |a| {
                        a.reports.iter().for_each(print_report);
                        for (game, e) in &a.errors {
                            println!("game {game} FAILED: {e}");
                        }
                    })?;
                    if !all.is_complete() {
                        bail!("reconciliation incomplete");
                    }
                }
            }
        }
        Command::Portfolio => {
            let games = engine.portfolio().compute_all().await?;
            emit(json, &games, |gs| {
                for g in gs {
                    println!(
                        "{} / {} (#{}) | capacity: {} | used: {} | remaining: {} | {}%{}{}",
                        g.company_name,
                        g.game_name,
                        g.game_id,
                        format_amount(g.capacity.total),
                        format_amount(g.used.total),
                        g.remaining.total,
                        g.usage_rate,
                        if g.insufficient { " | INSUFFICIENT" } else { "" },
                        if g.total_mismatch { " | TOTAL MISMATCH" } else { "" },
                    );
                }
            })?;
        }
        Command::Companies => {
            let companies = engine.portfolio().company_ranking().await?;
            emit(json, &companies, |cs| {
                for c in cs {
                    println!(
                        "{} | games: {} | capacity: {} | used: {} | remaining: {} | {}% | contracted: {} ({}%)",
                        c.company_name,
                        c.game_count,
                        format_amount(c.capacity.total),
                        format_amount(c.used.total),
                        c.remaining.total,
                        c.usage_rate,
                        format_amount(c.contracted),
                        c.contract_rate,
                    );
                }
            })?;
        }
        Command::CategoryStats => {
            let stats = engine.portfolio().compute_categories().await?;
            emit(json, &stats, |st| {
                for c in &st.categories {
                    println!(
                        "{}: {} ({}%) | {} contracts",
                        c.category,
                        format_amount(c.usage.total_used),
                        c.share,
                        c.usage.contract_count,
                    );
                }
                println!("total: {}", format_amount(st.total_used));
            })?;
        }
        Command::Thresholds => {
            let breaches = engine.portfolio().threshold_breaches(&cfg.thresholds).await?;
            emit(json, &breaches, |bs| {
                if bs.is_empty() {
                    println!("no game at or below its threshold ({} rules)", cfg.thresholds.len());
                }
                for b in bs {
                    println!(
                        "{} / {} (#{}) | remaining: {} | threshold: {}",
                        b.company_name,
                        b.game_name,
                        b.game_id,
                        b.remaining,
                        format_amount(b.threshold),
                    );
                }
            })?;
        }
        Command::SelfFirst { contract, enabled } => {
            engine.policy().set_self_points_first(&contract, enabled).await?;
            println!("{contract}: self-points-first {}", if enabled { "on" } else { "off" });
        }
        Command::Excellence {
            game,
            tier,
            enabled,
        } => {
            let pool = engine.policy().set_excellence(game, tier, enabled).await?;
            println!(
                "game {game}: {} tier {} | total: {}",
                tier.label(),
                if enabled { "on" } else { "off" },
                format_amount(pool.total_points)
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;
    let cfg = AppConfig::load(args.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.log_filter.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!(command = ?args.command, db = %cfg.database_url, "starting");
    run(args, cfg).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Args> {
        parse_args(line.split_whitespace().map(String::from))
    }

    #[test]
    fn reconcile_all_with_mode() {
        let args = parse("--json reconcile --all --mode sequential").unwrap();
        assert!(args.json);
        assert_eq!(
            args.command,
            Command::Reconcile {
                game: None,
                mode: Some(ReconcileMode::Sequential)
            }
        );
    }

    #[test]
    fn single_game_commands() {
        assert_eq!(parse("usage 7").unwrap().command, Command::Usage(GameId(7)));
        assert_eq!(
            parse("reconcile 3").unwrap().command,
            Command::Reconcile {
                game: Some(GameId(3)),
                mode: None
            }
        );
        assert_eq!(
            parse("excellence 2 3rd on").unwrap().command,
            Command::Excellence {
                game: GameId(2),
                tier: ExcellenceTier::Third,
                enabled: true
            }
        );
        assert_eq!(
            parse("self-first CT-9 off").unwrap().command,
            Command::SelfFirst {
                contract: ContractId("CT-9".into()),
                enabled: false
            }
        );
    }

    #[test]
    fn config_path_and_defaults() {
        let args = parse("--config ops.yaml portfolio").unwrap();
        assert_eq!(args.config, Some(PathBuf::from("ops.yaml")));
        assert_eq!(args.command, Command::Portfolio);
        assert_eq!(parse("thresholds").unwrap().command, Command::Thresholds);
        assert_eq!(parse("--json category-stats").unwrap().command, Command::CategoryStats);
        assert_eq!(parse("").unwrap().command, Command::Help);
    }

    #[test]
    fn bad_input_is_an_error() {
        assert!(parse("usage seven").is_err());
        assert!(parse("reconcile").is_err());
        assert!(parse("reconcile 1 --mode fastest").is_err());
        assert!(parse("self-first CT-1 maybe").is_err());
        assert!(parse("launch").is_err());
        assert!(parse("usage 1 2").is_err());
    }
}
