use anyhow::{bail, Result};
use readings_engine::{config::AppConfig, metrics_server, observability, Engine, PgStore, Role};
use sqlx::postgres::PgPoolOptions;
use std::env;

/// Print every meter-unit to display-unit transform, plus the units derived
/// from suffix units, as JSON. With a meter id, print that meter's graphic
/// units instead.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    let role = if args.iter().any(|a| a == "--admin") {
        Role::Admin
    } else {
        Role::Viewer
    };
    let meter_id = match args.iter().skip(1).find(|a| !a.starts_with("--")) {
        Some(text) => match text.parse::<i32>() {
            Ok(id) => Some(id),
            Err(_) => bail!("usage: cik_report [--admin] [meter_id]"),
        },
        None => None,
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

    let out = match meter_id {
        Some(id) => {
            let units = engine.graphic_units(id, role).await?;
            serde_json::to_value(units)?
        }
        None => {
            let cik = engine.cik().await?;
            let derived: Vec<_> = cik.derived_units().collect();
            serde_json::json!({
                "entries": cik.entries(),
                "derived_units": derived,
            })
        }
    };
    println!("{}", serde_json::to_string_pretty(&out)?);

    Ok(())
}
