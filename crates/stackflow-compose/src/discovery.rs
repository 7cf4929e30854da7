//! compose / envファイルの発見
//!
//! 候補ファイル名を優先順に試す。暗黙の「最初にマッチしたもの勝ち」を
//! 明示的な候補リストとして公開し、探索対象ディレクトリは常に引数で
//! 受け取る（カレントディレクトリの変更はしない）。

use crate::error::{ComposeError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// composeファイルの候補名（優先順）
pub const COMPOSE_FILE_CANDIDATES: &[&str] = &[
    "compose.yaml",
    "compose.yml",
    "docker-compose.yml",
    "docker-compose.yaml",
];

/// envファイルの候補名（優先順）
pub const ENV_FILE_CANDIDATES: &[&str] = &[".env"];

/// ディレクトリからcomposeファイルを探す
///
/// 環境変数 `STACKFLOW_COMPOSE_FILE` が存在するファイルを指す場合は
/// それが最優先。
#[tracing::instrument]
pub fn find_compose_file(dir: &Path) -> Result<PathBuf> {
    if let Ok(path) = std::env::var("STACKFLOW_COMPOSE_FILE") {
        let path = PathBuf::from(path);
        if path.exists() {
            debug!(path = %path.display(), "Using compose file from STACKFLOW_COMPOSE_FILE");
            return Ok(path);
        }
    }

    for candidate in COMPOSE_FILE_CANDIDATES {
        let path = dir.join(candidate);
        if path.exists() {
            debug!(path = %path.display(), "Found compose file");
            return Ok(path);
        }
    }

    Err(ComposeError::ComposeFileNotFound {
        dir: dir.display().to_string(),
    })
}

/// ディレクトリからenvファイルを探す（任意）
pub fn find_env_file(dir: &Path) -> Option<PathBuf> {
    ENV_FILE_CANDIDATES
        .iter()
        .map(|candidate| dir.join(candidate))
        .find(|path| path.exists())
}
