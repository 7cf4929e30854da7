//! 依存サービス待機モジュール
//!
//! depends_onの条件（started / healthy / completed_successfully）が
//! 満たされるまでポーリングする。タイムアウト時の扱いは条件により異なり、
//! service_startedだけは警告で継続する。

use crate::client::{ContainerEngine, ContainerStateInfo, HealthState};
use crate::error::{EngineError, Result};
use stackflow_compose::{Condition, DependencyEdge};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// 待機のポーリング設定
#[derive(Debug, Clone)]
pub struct WaitOptions {
    pub poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
        }
    }
}

/// 待機の結果
#[derive(Debug, Clone, PartialEq)]
pub enum WaitOutcome {
    /// 条件が満たされた
    Satisfied,
    /// service_startedがタイムアウトしたが継続する（警告付き）
    TimedOutWarning(String),
}

/// 1本の依存エッジが満たされるまで待機する
///
/// `container` は依存先サービスのコンテナ名。restartフラグが立っている
/// 場合、unhealthy／異常終了を検出したら依存先を再起動して待機を続ける。
pub async fn wait_for_dependency<E: ContainerEngine>(
    engine: &E,
    edge: &DependencyEdge,
    container: &str,
    options: &WaitOptions,
) -> Result<WaitOutcome> {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(edge.timeout_ms);

    loop {
        let state = engine.container_state(container).await?;

        match check_condition(edge.condition, state.as_ref()) {
            ConditionCheck::Satisfied => {
                debug!(
                    service = %edge.service,
                    depends_on = %edge.depends_on,
                    condition = edge.condition.as_str(),
                    "Dependency condition satisfied"
                );
                return Ok(WaitOutcome::Satisfied);
            }
            ConditionCheck::Pending => {}
            ConditionCheck::Degraded(reason) => {
                if edge.restart {
                    warn!(
                        container,
                        reason, "Dependency degraded, restarting before continuing to wait"
                    );
                    engine.restart_container(container).await?;
                } else {
                    debug!(container, reason, "Dependency degraded, waiting");
                }
            }
        }

        if tokio::time::Instant::now() >= deadline {
            if edge.condition.timeout_is_fatal() {
                return Err(EngineError::WaitTimeout {
                    service: edge.depends_on.clone(),
                    condition: edge.condition.as_str().to_string(),
                    timeout_ms: edge.timeout_ms,
                });
            }
            let message = format!(
                "サービス '{}' の起動待機が{}msでタイムアウトしました（続行します）",
                edge.depends_on, edge.timeout_ms
            );
            warn!(container, "Dependency wait timed out, continuing");
            return Ok(WaitOutcome::TimedOutWarning(message));
        }

        sleep(Duration::from_millis(options.poll_interval_ms)).await;
    }
}

enum ConditionCheck {
    Satisfied,
    Pending,
    /// unhealthyや異常終了など、待っても自然回復しない状態
    Degraded(&'static str),
}

fn check_condition(condition: Condition, state: Option<&ContainerStateInfo>) -> ConditionCheck {
    let Some(state) = state else {
        // コンテナ未作成はまだ起動前
        return ConditionCheck::Pending;
    };

    match condition {
        Condition::Started => {
            if state.running {
                ConditionCheck::Satisfied
            } else {
                ConditionCheck::Pending
            }
        }
        Condition::Healthy => match state.health {
            HealthState::Healthy => ConditionCheck::Satisfied,
            HealthState::Unhealthy => ConditionCheck::Degraded("container is unhealthy"),
            HealthState::Starting => ConditionCheck::Pending,
            // ヘルスチェック未定義はRunningで満たされたとみなす
            HealthState::None => {
                if state.running {
                    ConditionCheck::Satisfied
                } else {
                    ConditionCheck::Pending
                }
            }
        },
        Condition::CompletedSuccessfully => {
            if state.running {
                ConditionCheck::Pending
            } else {
                match state.exit_code {
                    Some(0) => ConditionCheck::Satisfied,
                    Some(_) => ConditionCheck::Degraded("container exited with non-zero code"),
                    None => ConditionCheck::Pending,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockEngine;
    use stackflow_compose::DependencyEdge;

    fn edge(condition: Condition, timeout_ms: u64) -> DependencyEdge {
        DependencyEdge {
            service: "web".to_string(),
            depends_on: "db".to_string(),
            condition,
            timeout_ms,
            restart: false,
        }
    }

    fn fast_options() -> WaitOptions {
        WaitOptions {
            poll_interval_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_started_satisfied_immediately() {
        let engine = MockEngine::new();
        engine.set_container_state(
            "myapp_db_1",
            ContainerStateInfo {
                running: true,
                exit_code: None,
                health: HealthState::None,
            },
        );

        let outcome = wait_for_dependency(
            &engine,
            &edge(Condition::Started, 1000),
            "myapp_db_1",
            &fast_options(),
        )
        .await
        .unwrap();
        assert_eq!(outcome, WaitOutcome::Satisfied);
    }

    #[tokio::test]
    async fn test_healthy_follows_health_sequence() {
        let engine = MockEngine::new();
        engine.set_container_state(
            "myapp_db_1",
            ContainerStateInfo {
                running: true,
                exit_code: None,
                health: HealthState::Starting,
            },
        );
        engine.script_health("myapp_db_1", &[HealthState::Starting, HealthState::Healthy]);

        let outcome = wait_for_dependency(
            &engine,
            &edge(Condition::Healthy, 5000),
            "myapp_db_1",
            &fast_options(),
        )
        .await
        .unwrap();
        assert_eq!(outcome, WaitOutcome::Satisfied);
    }

    #[tokio::test]
    async fn test_healthy_timeout_is_fatal() {
        let engine = MockEngine::new();
        engine.set_container_state(
            "myapp_db_1",
            ContainerStateInfo {
                running: true,
                exit_code: None,
                health: HealthState::Starting,
            },
        );

        let result = wait_for_dependency(
            &engine,
            &edge(Condition::Healthy, 10),
            "myapp_db_1",
            &fast_options(),
        )
        .await;
        assert!(matches!(result, Err(EngineError::WaitTimeout { .. })));
    }

    #[tokio::test]
    async fn test_started_timeout_is_warning() {
        let engine = MockEngine::new();
        engine.set_container_state(
            "myapp_db_1",
            ContainerStateInfo {
                running: false,
                exit_code: None,
                health: HealthState::None,
            },
        );

        let outcome = wait_for_dependency(
            &engine,
            &edge(Condition::Started, 10),
            "myapp_db_1",
            &fast_options(),
        )
        .await
        .unwrap();
        assert!(matches!(outcome, WaitOutcome::TimedOutWarning(_)));
    }

    #[tokio::test]
    async fn test_completed_successfully() {
        let engine = MockEngine::new();
        engine.set_container_state(
            "myapp_migrate_1",
            ContainerStateInfo {
                running: false,
                exit_code: Some(0),
                health: HealthState::None,
            },
        );

        let mut e = edge(Condition::CompletedSuccessfully, 1000);
        e.depends_on = "migrate".to_string();
        let outcome = wait_for_dependency(&engine, &e, "myapp_migrate_1", &fast_options())
            .await
            .unwrap();
        assert_eq!(outcome, WaitOutcome::Satisfied);
    }

    #[tokio::test]
    async fn test_restart_on_unhealthy() {
        let engine = MockEngine::new();
        engine.set_container_state(
            "myapp_db_1",
            ContainerStateInfo {
                running: true,
                exit_code: None,
                health: HealthState::Unhealthy,
            },
        );
        // 再起動後はhealthyになるシナリオ
        engine.script_health("myapp_db_1", &[HealthState::Unhealthy, HealthState::Healthy]);

        let mut e = edge(Condition::Healthy, 5000);
        e.restart = true;
        let outcome = wait_for_dependency(&engine, &e, "myapp_db_1", &fast_options())
            .await
            .unwrap();
        assert_eq!(outcome, WaitOutcome::Satisfied);
        assert!(
            engine
                .operations()
                .contains(&"restart_container:myapp_db_1".to_string())
        );
    }
}
