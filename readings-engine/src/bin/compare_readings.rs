use anyhow::{bail, Context, Result};
use readings_engine::{
    config::AppConfig, interval::parse_timestamp, metrics_server, observability, CalendarShift,
    CompareTarget, Engine, PgStore,
};
use sqlx::postgres::PgPoolOptions;
use std::env;
use tokio_util::sync::CancellationToken;

const USAGE: &str =
    "usage: compare_readings <meter|group> <id> <curr_start> <curr_end> <shift> <graphic_unit_id>";

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 7 {
        bail!(USAGE);
    }
    let id: i32 = args[2].parse().with_context(|| format!("invalid id '{}'", args[2]))?;
    let target = match args[1].as_str() {
        "meter" => CompareTarget::Meter(id),
        "group" => CompareTarget::Group(id),
        other => bail!("expected 'meter' or 'group', got '{other}'\n{USAGE}"),
    };
    let curr_start = parse_timestamp(&args[3])?;
    let curr_end = parse_timestamp(&args[4])?;
    let shift: CalendarShift = args[5].parse()?;
    let graphic_unit: i32 = args[6]
        .parse()
        .with_context(|| format!("invalid unit id '{}'", args[6]))?;

    let cfg = AppConfig::load()?;
    if let Some(metrics) = &cfg.metrics {
        metrics_server::init(metrics)?;
    }

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;
    let engine = Engine::new(PgStore::new(pool), cfg.engine);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let totals = engine
        .compare(target, curr_start, curr_end, &shift, graphic_unit, &cancel)
        .await?;

    let out = serde_json::json!({
        "curr_use": totals.curr_use,
        "prev_use": totals.prev_use,
        "percent_change": totals.percent_change(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);

    Ok(())
}
