use anyhow::{bail, Context, Result};
use readings_engine::{
    config::AppConfig, metrics_server, observability, Engine, PgStore, TimeInterval,
};
use sqlx::postgres::PgPoolOptions;
use std::env;
use tokio_util::sync::CancellationToken;

const USAGE: &str =
    "usage: bar_readings <meter|group> <id> <graphic_unit_id> <width_days|line> [interval]";

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 5 {
        bail!(USAGE);
    }
    let is_group = match args[1].as_str() {
        "meter" => false,
        "group" => true,
        other => bail!("expected 'meter' or 'group', got '{other}'\n{USAGE}"),
    };
    let id: i32 = args[2].parse().with_context(|| format!("invalid id '{}'", args[2]))?;
    let graphic_unit: i32 = args[3]
        .parse()
        .with_context(|| format!("invalid unit id '{}'", args[3]))?;
    let width_days: Option<u32> = match args[4].as_str() {
        "line" => None,
        width => Some(
            width
                .parse()
                .with_context(|| format!("invalid bar width '{width}'"))?,
        ),
    };
    let interval: TimeInterval = match args.get(5) {
        Some(text) => text.parse()?,
        None => TimeInterval::unbounded(),
    };

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

    let series = match (is_group, width_days) {
        (false, None) => engine.meter_line(id, &interval, graphic_unit).await?,
        (false, Some(width)) => engine.meter_bar(id, &interval, graphic_unit, width).await?,
        (true, None) => engine.group_line(id, &interval, graphic_unit, &cancel).await?,
        (true, Some(width)) => {
            engine
                .group_bar(id, &interval, graphic_unit, width, &cancel)
                .await?
        }
    };

    tracing::info!(id, is_group, %interval, points = series.len(), "series computed");
    println!("{}", serde_json::to_string_pretty(&series)?);

    Ok(())
}
