//! Docker Engineクライアント
//!
//! オーケストレータが消費するエンジン操作を`ContainerEngine`トレイトとして
//! 切り出し、bollard実装`DockerEngine`を提供する。テストでは
//! [`crate::testing::MockEngine`]に差し替えられる。

// Bollard 0.19.4 の非推奨APIを一時的に使用
#![allow(deprecated)]

use crate::error::{EngineError, Result};
use bollard::Docker;
use bollard::container::{Config, CreateContainerOptions, InspectContainerOptions};
use bollard::models::{
    EndpointSettings, HealthStatusEnum, NetworkConnectRequest, NetworkCreateRequest,
    VolumeCreateOptions,
};
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// stackflowがコンテナ・リソースに付与するラベルキー
pub mod labels {
    /// スタックID
    pub const STACK: &str = "club.chronista.stackflow.stack";
    /// サービス名
    pub const SERVICE: &str = "club.chronista.stackflow.service";
    /// サービス定義の設定ハッシュ
    pub const CONFIG_HASH: &str = "club.chronista.stackflow.config-hash";
    /// composeフォーマットのマーカー
    pub const FORMAT: &str = "club.chronista.stackflow.format";
    /// FORMATラベルの現行値
    pub const FORMAT_VERSION: &str = "compose.v1";
}

/// スタックに属するコンテナの要約
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub labels: HashMap<String, String>,
}

impl ContainerInfo {
    /// スタックIDラベル
    pub fn stack(&self) -> Option<&str> {
        self.labels.get(labels::STACK).map(String::as_str)
    }

    /// サービス名ラベル
    pub fn service(&self) -> Option<&str> {
        self.labels.get(labels::SERVICE).map(String::as_str)
    }

    /// 設定ハッシュラベル
    pub fn config_hash(&self) -> Option<&str> {
        self.labels.get(labels::CONFIG_HASH).map(String::as_str)
    }
}

/// コンテナの実行状態
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerStateInfo {
    pub running: bool,
    pub exit_code: Option<i64>,
    pub health: HealthState,
}

/// ヘルスチェックの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// ヘルスチェック未定義
    None,
    Starting,
    Healthy,
    Unhealthy,
}

/// イメージプルの進捗イベント
///
/// 有限ストリームで、終端イベント（CompletedまたはFailed）を必ず1つ流す。
#[derive(Debug, Clone, PartialEq)]
pub enum PullEvent {
    Progress {
        status: String,
        detail: Option<String>,
    },
    Completed,
    Failed(String),
}

/// Docker Engine操作のトレイト
#[allow(async_fn_in_trait)]
pub trait ContainerEngine {
    async fn ping(&self) -> Result<()>;

    /// スタックラベルの付いた全コンテナを列挙（停止中も含む）
    async fn list_stack_containers(&self, stack: &str) -> Result<Vec<ContainerInfo>>;

    /// スタックを問わず、スタックラベルを持つ全コンテナを列挙する
    async fn list_managed_containers(&self) -> Result<Vec<ContainerInfo>>;

    /// コンテナを作成してIDを返す
    async fn create_container(&self, name: &str, config: Config<String>) -> Result<String>;
    async fn start_container(&self, name_or_id: &str) -> Result<()>;
    async fn stop_container(&self, name_or_id: &str) -> Result<()>;
    async fn restart_container(&self, name_or_id: &str) -> Result<()>;
    async fn remove_container(&self, name_or_id: &str, force: bool) -> Result<()>;

    /// コンテナの状態を取得。存在しなければNone
    async fn container_state(&self, name_or_id: &str) -> Result<Option<ContainerStateInfo>>;

    /// ネットワークを作成（既存なら成功扱い）
    async fn create_network(&self, request: NetworkCreateRequest) -> Result<()>;
    async fn network_exists(&self, name: &str) -> Result<bool>;
    async fn remove_network(&self, name: &str) -> Result<()>;

    /// ボリュームを作成（既存なら成功扱い）
    async fn create_volume(&self, options: VolumeCreateOptions) -> Result<()>;
    async fn volume_exists(&self, name: &str) -> Result<bool>;
    async fn remove_volume(&self, name: &str, force: bool) -> Result<()>;

    /// イメージをプルし、進捗をイベントとして送出する
    async fn pull_image(&self, image: &str, events: mpsc::Sender<PullEvent>) -> Result<()>;
    async fn image_exists(&self, image: &str) -> Result<bool>;

    /// 作成済みコンテナを追加ネットワークに接続する
    async fn connect_network(
        &self,
        network: &str,
        container: &str,
        endpoint: EndpointSettings,
    ) -> Result<()>;
}

/// bollardによる`ContainerEngine`実装
#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// ローカルのDockerデーモンに接続し、疎通確認する
    pub async fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| EngineError::DockerConnectionFailed(e.to_string()))?;
        docker
            .ping()
            .await
            .map_err(|e| EngineError::DockerConnectionFailed(e.to_string()))?;
        info!("Connected to Docker daemon");
        Ok(Self { docker })
    }

    pub fn from_docker(docker: Docker) -> Self {
        Self { docker }
    }
}

fn summary_to_info(summary: bollard::models::ContainerSummary) -> ContainerInfo {
    ContainerInfo {
        id: summary.id.unwrap_or_default(),
        name: summary
            .names
            .unwrap_or_default()
            .first()
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_default(),
        labels: summary.labels.unwrap_or_default(),
    }
}

fn is_status(err: &bollard::errors::Error, code: u16) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError { status_code, .. }
            if *status_code == code
    )
}

impl ContainerEngine for DockerEngine {
    async fn ping(&self) -> Result<()> {
        self.docker.ping().await?;
        Ok(())
    }

    async fn list_stack_containers(&self, stack: &str) -> Result<Vec<ContainerInfo>> {
        let mut filters = HashMap::new();
        filters.insert(
            "label".to_string(),
            vec![format!("{}={}", labels::STACK, stack)],
        );
        let options = bollard::container::ListContainersOptions::<String> {
            all: true,
            filters,
            ..Default::default()
        };

        let summaries = self.docker.list_containers(Some(options)).await?;
        Ok(summaries.into_iter().map(summary_to_info).collect())
    }

    async fn list_managed_containers(&self) -> Result<Vec<ContainerInfo>> {
        // ラベルキーのみの指定で「値を問わずラベルを持つ」コンテナに絞る
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![labels::STACK.to_string()]);
        let options = bollard::container::ListContainersOptions::<String> {
            all: true,
            filters,
            ..Default::default()
        };

        let summaries = self.docker.list_containers(Some(options)).await?;
        Ok(summaries.into_iter().map(summary_to_info).collect())
    }

    async fn create_container(&self, name: &str, config: Config<String>) -> Result<String> {
        let options = CreateContainerOptions {
            name: name.to_string(),
            platform: None,
        };
        let response = self.docker.create_container(Some(options), config).await?;
        debug!(container = name, id = %response.id, "Container created");
        Ok(response.id)
    }

    async fn start_container(&self, name_or_id: &str) -> Result<()> {
        self.docker
            .start_container(
                name_or_id,
                None::<bollard::query_parameters::StartContainerOptions>,
            )
            .await?;
        Ok(())
    }

    async fn stop_container(&self, name_or_id: &str) -> Result<()> {
        match self
            .docker
            .stop_container(
                name_or_id,
                None::<bollard::query_parameters::StopContainerOptions>,
            )
            .await
        {
            Ok(()) => Ok(()),
            // 304: 既に停止済み
            Err(e) if is_status(&e, 304) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn restart_container(&self, name_or_id: &str) -> Result<()> {
        self.docker
            .restart_container(
                name_or_id,
                None::<bollard::query_parameters::RestartContainerOptions>,
            )
            .await?;
        Ok(())
    }

    async fn remove_container(&self, name_or_id: &str, force: bool) -> Result<()> {
        match self
            .docker
            .remove_container(
                name_or_id,
                Some(bollard::query_parameters::RemoveContainerOptions {
                    force,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_status(&e, 404) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn container_state(&self, name_or_id: &str) -> Result<Option<ContainerStateInfo>> {
        let inspection = match self
            .docker
            .inspect_container(name_or_id, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspection) => inspection,
            Err(e) if is_status(&e, 404) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let Some(state) = inspection.state else {
            return Ok(None);
        };

        let health = match state.health.and_then(|h| h.status) {
            Some(HealthStatusEnum::HEALTHY) => HealthState::Healthy,
            Some(HealthStatusEnum::UNHEALTHY) => HealthState::Unhealthy,
            Some(HealthStatusEnum::STARTING) => HealthState::Starting,
            _ => HealthState::None,
        };

        Ok(Some(ContainerStateInfo {
            running: state.running.unwrap_or(false),
            exit_code: state.exit_code,
            health,
        }))
    }

    async fn create_network(&self, request: NetworkCreateRequest) -> Result<()> {
        let name = request.name.clone();
        match self.docker.create_network(request).await {
            Ok(_) => {
                debug!(network = %name, "Network created");
                Ok(())
            }
            Err(e) if is_status(&e, 409) => {
                debug!(network = %name, "Network already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn network_exists(&self, name: &str) -> Result<bool> {
        match self
            .docker
            .inspect_network(
                name,
                None::<bollard::query_parameters::InspectNetworkOptions>,
            )
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_status(&e, 404) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        match self.docker.remove_network(name).await {
            Ok(()) => Ok(()),
            Err(e) if is_status(&e, 404) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_volume(&self, options: VolumeCreateOptions) -> Result<()> {
        // ボリューム作成は同名既存時もDockerが既存を返すため常に冪等
        self.docker.create_volume(options).await?;
        Ok(())
    }

    async fn volume_exists(&self, name: &str) -> Result<bool> {
        match self.docker.inspect_volume(name).await {
            Ok(_) => Ok(true),
            Err(e) if is_status(&e, 404) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_volume(&self, name: &str, force: bool) -> Result<()> {
        match self
            .docker
            .remove_volume(
                name,
                Some(bollard::query_parameters::RemoveVolumeOptions {
                    force,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_status(&e, 404) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn pull_image(&self, image: &str, events: mpsc::Sender<PullEvent>) -> Result<()> {
        let (image_name, tag) = parse_image_tag(image);

        let options = bollard::image::CreateImageOptions {
            from_image: image_name,
            tag,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(info) = stream.next().await {
            match info {
                Ok(bollard::models::CreateImageInfo {
                    status: Some(status),
                    progress,
                    ..
                }) => {
                    // 受信側が閉じていても プル自体は完走させる
                    let _ = events
                        .send(PullEvent::Progress {
                            status,
                            detail: progress,
                        })
                        .await;
                }
                Ok(_) => {}
                Err(e) => {
                    let message = e.to_string();
                    let _ = events.send(PullEvent::Failed(message.clone())).await;
                    return Err(EngineError::ImagePullFailed {
                        image: image.to_string(),
                        message,
                    });
                }
            }
        }

        let _ = events.send(PullEvent::Completed).await;
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) if is_status(&e, 404) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn connect_network(
        &self,
        network: &str,
        container: &str,
        endpoint: EndpointSettings,
    ) -> Result<()> {
        let request = NetworkConnectRequest {
            container: Some(container.to_string()),
            endpoint_config: Some(endpoint),
        };
        match self.docker.connect_network(network, request).await {
            Ok(()) => Ok(()),
            Err(e) if is_status(&e, 403) => {
                // 既に接続済み
                warn!(network, container, "Container already connected to network");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// イメージ名とタグを分離
/// 例: "redis:7-alpine" -> ("redis", "7-alpine")
///     "postgres" -> ("postgres", "latest")
pub fn parse_image_tag(image: &str) -> (&str, &str) {
    // レジストリのポート指定 (localhost:5000/app) と区別するため、
    // 最後の "/" より後にある ":" だけをタグ区切りとみなす
    let name_start = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    match image[name_start..].rfind(':') {
        Some(idx) => {
            let split = name_start + idx;
            (&image[..split], &image[split + 1..])
        }
        None => (image, "latest"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_image_tag() {
        assert_eq!(parse_image_tag("redis:7-alpine"), ("redis", "7-alpine"));
        assert_eq!(parse_image_tag("postgres"), ("postgres", "latest"));
        assert_eq!(
            parse_image_tag("ghcr.io/acme/app:1.2.3"),
            ("ghcr.io/acme/app", "1.2.3")
        );
        assert_eq!(
            parse_image_tag("localhost:5000/app"),
            ("localhost:5000/app", "latest")
        );
    }

    #[test]
    fn test_label_keys_share_prefix() {
        for key in [
            labels::STACK,
            labels::SERVICE,
            labels::CONFIG_HASH,
            labels::FORMAT,
        ] {
            assert!(key.starts_with(stackflow_compose::OWNED_LABEL_PREFIX));
        }
    }
}
