//! Example consumer: applies a JSON schema file and prints what the engine sees.
//!
//! Run from repo root: `DATABASE_URL=sqlite:demo.db?mode=rwc SCHEMA_PATH=schema.json cargo run -p example-consumer`

use relational_sdk::{EngineSettings, EngineState, RecordOutcome, SchemaService, TableSchema};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("relational_sdk=info")),
        )
        .init();

    let settings = EngineSettings::load()?;
    let state = EngineState::connect(settings).await?;

    if let Ok(path) = std::env::var("SCHEMA_PATH") {
        let raw = std::fs::read_to_string(&path)?;
        let defs: Vec<TableSchema> = serde_json::from_str(&raw)?;
        let allow_merge = env_flag("SCHEMA_ALLOW_MERGE", true);
        let rollback = env_flag("SCHEMA_ROLLBACK", false);
        let outcomes = SchemaService::create_tables(&state, &defs, allow_merge, rollback).await?;
        for (def, outcome) in defs.iter().zip(&outcomes) {
            match outcome {
                RecordOutcome::Ok(_) => tracing::info!(table = %def.name, "schema applied"),
                RecordOutcome::Err(e) => tracing::warn!(table = %def.name, error = %e.error.message, "schema rejected"),
            }
        }
    }

    let tables = SchemaService::list_tables(&state, None, None).await?;
    println!("tables: {}", tables.join(", "));
    for desc in SchemaService::describe_tables(&state, &tables).await? {
        println!("{}", serde_json::to_string_pretty(desc.as_ref())?);
    }
    Ok(())
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}
