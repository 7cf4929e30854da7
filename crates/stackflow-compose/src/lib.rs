//! composeドキュメントのモデル・パース・デプロイ計画
//!
//! composeファイル（実用サブセット）を型付きモデルに読み込み、
//! 変数置換・依存グラフ解決・プロファイルフィルタリング・設定ハッシュ
//! 計算までのデプロイ前処理を提供する。Docker Engineには触れない。

pub mod discovery;
pub mod envfile;
pub mod error;
pub mod graph;
pub mod hash;
pub mod interpolate;
pub mod model;
pub mod parser;
pub mod planner;

pub use error::{ComposeError, Result};
pub use graph::{DependencyEdge, DependencyGraph};
pub use hash::{OWNED_LABEL_PREFIX, config_hash};
pub use interpolate::VariableContext;
pub use model::*;
pub use planner::{DeploymentPlan, SkippedService};
