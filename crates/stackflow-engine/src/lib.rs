//! Docker Engine統合
//!
//! composeモデルをDocker APIの呼び出しに落とす層。エンジン操作の
//! トレイト（[`client::ContainerEngine`]）、リソースのプロビジョニング、
//! コンテナ設定への変換、依存待機を提供する。

pub mod client;
pub mod converter;
pub mod error;
pub mod naming;
pub mod provision;
pub mod status;
pub mod testing;
pub mod waiter;

pub use client::{
    ContainerEngine, ContainerInfo, ContainerStateInfo, DockerEngine, HealthState, PullEvent,
};
pub use converter::{ContainerPlan, build_container_plan};
pub use error::{EngineError, Result};
pub use provision::{ProvisionReport, provision_stack_resources, remove_stack_resources};
pub use status::{RuntimeStatus, StackRuntime, stack_runtime};
pub use waiter::{WaitOptions, WaitOutcome, wait_for_dependency};
