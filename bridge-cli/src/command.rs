use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use bridge_core::{
    BridgeConfig, Encoded, EngineCommand, HostValue, ProcessTransport, Session, encode as encode_value,
};

use crate::env;

/// Where and how to reach the engine for `push`/`pull`.
pub struct EngineContext {
    pub engine: String,
    pub kernel: String,
    pub cwd: Option<PathBuf>,
}

/// Requested names, or every name in the environment (sorted) when none given.
fn selected(env: &BTreeMap<String, HostValue>, names: &[String]) -> Vec<String> {
    if names.is_empty() {
        env.keys().cloned().collect()
    } else {
        names.to_vec()
    }
}

pub fn encode(env_path: &Path, names: &[String]) -> anyhow::Result<()> {
    let env = env::load(env_path)?;
    for name in selected(&env, names) {
        let Some(value) = env.get(&name) else {
            tracing::warn!(name, "not defined in host environment");
            continue;
        };
        match encode_value(&name, value) {
            Ok(Encoded::Statement(statement)) => println!("{}", statement.source),
            Ok(Encoded::Skip(reason)) => tracing::warn!(name, %reason, "skipped"),
            Err(e) => tracing::warn!(name, error = %e, "cannot encode"),
        }
    }
    Ok(())
}

pub fn kernels(config: &BridgeConfig) {
    for spec in &config.kernels {
        println!(
            "{:<8} {:<20} {}",
            spec.language, spec.kernel, spec.background_color
        );
    }
}

/// The adapter command line, told which kernel to start.
fn engine_command(ctx: &EngineContext, config: &BridgeConfig) -> anyhow::Result<EngineCommand> {
    let spec = config.kernel(&ctx.kernel)?;
    Ok(EngineCommand::parse(&ctx.engine)?
        .working_dir(ctx.cwd.clone())
        .kernel(spec))
}

async fn connect(
    ctx: &EngineContext,
    config: BridgeConfig,
) -> anyhow::Result<Session<ProcessTransport>> {
    let command = engine_command(ctx, &config)?;
    let transport = ProcessTransport::spawn(&command)
        .with_context(|| format!("failed to start engine {:?}", ctx.engine))?;
    tracing::info!(engine = %ctx.engine, kernel = %ctx.kernel, "engine started");

    let mut session = Session::new(transport, config);
    session.initialize().await.context("failed to initialize session")?;
    if let Some(dir) = &ctx.cwd {
        session
            .change_dir(&dir.to_string_lossy())
            .await
            .with_context(|| format!("failed to change directory to {}", dir.display()))?;
    }
    Ok(session)
}

pub async fn push(
    ctx: &EngineContext,
    config: BridgeConfig,
    env_path: &Path,
    names: &[String],
) -> anyhow::Result<()> {
    let env = env::load(env_path)?;
    let names = selected(&env, names);
    let mut session = connect(ctx, config).await?;
    let report = session.push(&names, &env).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub async fn pull(ctx: &EngineContext, config: BridgeConfig, names: &[String]) -> anyhow::Result<()> {
    let mut session = connect(ctx, config).await?;
    let report = session.pull(names).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
