//! スタックデプロイのオーケストレーション
//!
//! composeドキュメントの解決からコンテナ投入・巻き戻しまでの
//! ライフサイクル全体を管理する。Docker操作は
//! `stackflow_engine::ContainerEngine` 越しに行うため、テストでは
//! モックエンジンに差し替えられる。

pub mod cache;
pub mod error;
pub mod orchestrator;
pub mod settings;
pub mod store;

pub use error::{DeployError, Result};
pub use orchestrator::{
    ChangeKind, DeployReport, Orchestrator, ServiceChange, StackView, ValidationMode,
    ValidationReport,
};
pub use settings::{PullPolicy, Settings};
pub use store::{MemoryStackStore, StackRecord, StackStatus, StackStore};
