//! スタックの実行時ステータス集計

use crate::client::{ContainerEngine, ContainerInfo};
use crate::error::Result;

/// スタックの実行時サマリ
#[derive(Debug, Clone, PartialEq)]
pub struct StackRuntime {
    /// スタックラベルを持つコンテナ数（停止中含む）
    pub container_count: usize,
    pub running_count: usize,
    pub status: RuntimeStatus,
    pub containers: Vec<ContainerRuntime>,
}

/// コンテナ1つ分のステータス
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerRuntime {
    pub name: String,
    pub service: Option<String>,
    pub running: bool,
}

/// スタック全体のステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeStatus {
    Running,
    PartiallyRunning,
    Stopped,
    /// コンテナが1つも存在しない
    Unknown,
}

impl RuntimeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::PartiallyRunning => "partially-running",
            Self::Stopped => "stopped",
            Self::Unknown => "unknown",
        }
    }
}

/// スタックの実行状態を集計する
pub async fn stack_runtime<E: ContainerEngine>(engine: &E, stack: &str) -> Result<StackRuntime> {
    let infos: Vec<ContainerInfo> = engine.list_stack_containers(stack).await?;

    let mut containers = Vec::with_capacity(infos.len());
    let mut running_count = 0;
    for info in &infos {
        let running = engine
            .container_state(&info.name)
            .await?
            .map(|s| s.running)
            .unwrap_or(false);
        if running {
            running_count += 1;
        }
        containers.push(ContainerRuntime {
            name: info.name.clone(),
            service: info.service().map(String::from),
            running,
        });
    }

    let status = if containers.is_empty() {
        RuntimeStatus::Unknown
    } else if running_count == containers.len() {
        RuntimeStatus::Running
    } else if running_count == 0 {
        RuntimeStatus::Stopped
    } else {
        RuntimeStatus::PartiallyRunning
    };

    Ok(StackRuntime {
        container_count: containers.len(),
        running_count,
        status,
        containers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ContainerStateInfo, HealthState};
    use crate::testing::MockEngine;

    fn running_state() -> ContainerStateInfo {
        ContainerStateInfo {
            running: true,
            exit_code: None,
            health: HealthState::None,
        }
    }

    #[tokio::test]
    async fn test_empty_stack_is_unknown() {
        let engine = MockEngine::new();
        let runtime = stack_runtime(&engine, "myapp").await.unwrap();
        assert_eq!(runtime.status, RuntimeStatus::Unknown);
        assert_eq!(runtime.container_count, 0);
    }

    #[tokio::test]
    async fn test_partial_running() {
        let engine = MockEngine::new();
        engine.add_stack_container("myapp", "web", "myapp_web_1");
        engine.add_stack_container("myapp", "db", "myapp_db_1");
        engine.set_container_state("myapp_web_1", running_state());

        let runtime = stack_runtime(&engine, "myapp").await.unwrap();
        assert_eq!(runtime.status, RuntimeStatus::PartiallyRunning);
        assert_eq!(runtime.running_count, 1);
        assert_eq!(runtime.container_count, 2);
    }

    #[tokio::test]
    async fn test_all_running() {
        let engine = MockEngine::new();
        engine.add_stack_container("myapp", "web", "myapp_web_1");
        engine.set_container_state("myapp_web_1", running_state());

        let runtime = stack_runtime(&engine, "myapp").await.unwrap();
        assert_eq!(runtime.status, RuntimeStatus::Running);
        assert_eq!(runtime.containers[0].service.as_deref(), Some("web"));
    }
}
