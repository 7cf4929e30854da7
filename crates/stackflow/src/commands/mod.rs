//! サブコマンド実装
//!
//! 各コマンドはカレントディレクトリのcomposeファイルを読み込み、
//! インメモリストアに登録した上でオーケストレータを操作する。

pub mod deploy;
pub mod destroy;
pub mod preview;
pub mod profiles;
pub mod ps;
pub mod restart;
pub mod stop;
pub mod validate;

use anyhow::Context as _;
use stackflow_compose::discovery;
use stackflow_deploy::{MemoryStackStore, Orchestrator, Settings};
use stackflow_engine::DockerEngine;
use std::collections::BTreeSet;
use tracing::debug;

pub struct CliContext {
    pub stack: String,
    pub orchestrator: Orchestrator<DockerEngine, MemoryStackStore>,
}

/// composeファイルを発見・登録してオーケストレータを準備する
pub async fn prepare(stack: Option<String>) -> anyhow::Result<CliContext> {
    let dir = std::env::current_dir()?;
    let stack = match stack {
        Some(name) => name,
        None => dir
            .file_name()
            .and_then(|n| n.to_str())
            .map(String::from)
            .context("スタック名を特定できません（--stack で指定してください）")?,
    };

    let compose_path = discovery::find_compose_file(&dir)?;
    debug!(stack = %stack, compose = %compose_path.display(), "Compose file discovered");
    let compose_content = std::fs::read_to_string(&compose_path)
        .with_context(|| format!("composeファイルを読み込めません: {}", compose_path.display()))?;
    let env_content = match discovery::find_env_file(&dir) {
        Some(path) => {
            debug!(env_file = %path.display(), "Env file discovered");
            Some(
                std::fs::read_to_string(&path)
                    .with_context(|| format!("envファイルを読み込めません: {}", path.display()))?,
            )
        }
        None => None,
    };

    let engine = DockerEngine::connect().await?;
    let orchestrator = Orchestrator::new(engine, MemoryStackStore::new(), Settings::default());
    orchestrator
        .create_stack(&stack, &compose_content, env_content.as_deref(), Some(dir))
        .await?;

    Ok(CliContext {
        stack,
        orchestrator,
    })
}

/// `-p` フラグの値をプロファイル集合に変換
pub fn profile_set(profiles: Vec<String>) -> BTreeSet<String> {
    profiles.into_iter().collect()
}

/// `KEY=VALUE` 形式のオーバーライドをパース
pub fn parse_env_overrides(pairs: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .with_context(|| format!("KEY=VALUE形式ではありません: '{}'", pair))
        })
        .collect()
}
