//! テスト用のインメモリエンジン実装
//!
//! Dockerデーモンなしで`ContainerEngine`を使うコードを検証するための
//! モック。状態遷移はスクリプトで制御でき、実行された操作はログとして
//! 参照できる。プロダクションコードからは使用しない。

use crate::client::{
    ContainerEngine, ContainerInfo, ContainerStateInfo, HealthState, PullEvent, labels,
};
use crate::error::{EngineError, Result};
use bollard::container::Config;
use bollard::models::{EndpointSettings, NetworkCreateRequest, VolumeCreateOptions};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use tokio::sync::mpsc;

#[derive(Default)]
struct MockState {
    containers: HashMap<String, MockContainer>,
    states: HashMap<String, ContainerStateInfo>,
    health_scripts: HashMap<String, VecDeque<HealthState>>,
    networks: HashSet<String>,
    volumes: HashSet<String>,
    images: HashSet<String>,
    fail_create: HashSet<String>,
    fail_pull: HashSet<String>,
    operations: Vec<String>,
}

struct MockContainer {
    labels: HashMap<String, String>,
    env: Vec<String>,
}

/// インメモリの`ContainerEngine`実装
#[derive(Default)]
pub struct MockEngine {
    state: Mutex<MockState>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// 既存ネットワークを登録する（external相当）
    pub fn add_network(&self, name: &str) {
        self.state.lock().unwrap().networks.insert(name.to_string());
    }

    /// 既存ボリュームを登録する（external相当）
    pub fn add_volume(&self, name: &str) {
        self.state.lock().unwrap().volumes.insert(name.to_string());
    }

    /// スタックラベル付きのコンテナを登録する
    pub fn add_stack_container(&self, stack: &str, service: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        let mut container_labels = HashMap::new();
        container_labels.insert(labels::STACK.to_string(), stack.to_string());
        container_labels.insert(labels::SERVICE.to_string(), service.to_string());
        state.containers.insert(
            name.to_string(),
            MockContainer {
                labels: container_labels,
                env: Vec::new(),
            },
        );
    }

    /// コンテナの状態を直接設定する
    pub fn set_container_state(&self, name: &str, info: ContainerStateInfo) {
        self.state
            .lock()
            .unwrap()
            .states
            .insert(name.to_string(), info);
    }

    /// container_state呼び出しごとに順に返すヘルス状態を設定する
    ///
    /// 最後の要素に達したら以降はそれを返し続ける。
    pub fn script_health(&self, name: &str, sequence: &[HealthState]) {
        self.state
            .lock()
            .unwrap()
            .health_scripts
            .insert(name.to_string(), sequence.iter().copied().collect());
    }

    /// 指定した名前のコンテナ作成を失敗させる
    pub fn fail_on_create(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_create
            .insert(name.to_string());
    }

    /// 指定したイメージのプルを失敗させる
    pub fn fail_on_pull(&self, image: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_pull
            .insert(image.to_string());
    }

    /// 実行された操作のログ
    pub fn operations(&self) -> Vec<String> {
        self.state.lock().unwrap().operations.clone()
    }

    /// 作成時に渡された環境変数（"KEY=value"形式）
    pub fn container_env(&self, name: &str) -> Option<Vec<String>> {
        self.state
            .lock()
            .unwrap()
            .containers
            .get(name)
            .map(|c| c.env.clone())
    }

    fn log(&self, op: String) {
        self.state.lock().unwrap().operations.push(op);
    }
}

impl ContainerEngine for MockEngine {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn list_stack_containers(&self, stack: &str) -> Result<Vec<ContainerInfo>> {
        let state = self.state.lock().unwrap();
        let mut infos: Vec<ContainerInfo> = state
            .containers
            .iter()
            .filter(|(_, c)| c.labels.get(labels::STACK).map(String::as_str) == Some(stack))
            .map(|(name, c)| ContainerInfo {
                id: name.clone(),
                name: name.clone(),
                labels: c.labels.clone(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    async fn list_managed_containers(&self) -> Result<Vec<ContainerInfo>> {
        let state = self.state.lock().unwrap();
        let mut infos: Vec<ContainerInfo> = state
            .containers
            .iter()
            .filter(|(_, c)| c.labels.contains_key(labels::STACK))
            .map(|(name, c)| ContainerInfo {
                id: name.clone(),
                name: name.clone(),
                labels: c.labels.clone(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    async fn create_container(&self, name: &str, config: Config<String>) -> Result<String> {
        self.log(format!("create_container:{}", name));
        let mut state = self.state.lock().unwrap();
        if state.fail_create.contains(name) {
            return Err(EngineError::DockerApiError(format!(
                "simulated create failure for {}",
                name
            )));
        }
        state.containers.insert(
            name.to_string(),
            MockContainer {
                labels: config.labels.unwrap_or_default(),
                env: config.env.unwrap_or_default(),
            },
        );
        state.states.insert(
            name.to_string(),
            ContainerStateInfo {
                running: false,
                exit_code: None,
                health: HealthState::None,
            },
        );
        Ok(name.to_string())
    }

    async fn start_container(&self, name_or_id: &str) -> Result<()> {
        self.log(format!("start_container:{}", name_or_id));
        let mut state = self.state.lock().unwrap();
        match state.states.get_mut(name_or_id) {
            Some(info) => {
                info.running = true;
                Ok(())
            }
            None => Err(EngineError::ContainerNotFound {
                container: name_or_id.to_string(),
            }),
        }
    }

    async fn stop_container(&self, name_or_id: &str) -> Result<()> {
        self.log(format!("stop_container:{}", name_or_id));
        let mut state = self.state.lock().unwrap();
        if let Some(info) = state.states.get_mut(name_or_id) {
            info.running = false;
            info.exit_code = Some(0);
        }
        Ok(())
    }

    async fn restart_container(&self, name_or_id: &str) -> Result<()> {
        self.log(format!("restart_container:{}", name_or_id));
        let mut state = self.state.lock().unwrap();
        if let Some(info) = state.states.get_mut(name_or_id) {
            info.running = true;
        }
        Ok(())
    }

    async fn remove_container(&self, name_or_id: &str, _force: bool) -> Result<()> {
        self.log(format!("remove_container:{}", name_or_id));
        let mut state = self.state.lock().unwrap();
        state.containers.remove(name_or_id);
        state.states.remove(name_or_id);
        Ok(())
    }

    async fn container_state(&self, name_or_id: &str) -> Result<Option<ContainerStateInfo>> {
        let mut state = self.state.lock().unwrap();
        let Some(mut info) = state.states.get(name_or_id).cloned() else {
            return Ok(None);
        };
        if let Some(script) = state.health_scripts.get_mut(name_or_id) {
            if let Some(next) = if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().copied()
            } {
                info.health = next;
            }
        }
        Ok(Some(info))
    }

    async fn create_network(&self, request: NetworkCreateRequest) -> Result<()> {
        self.log(format!("create_network:{}", request.name));
        self.state.lock().unwrap().networks.insert(request.name);
        Ok(())
    }

    async fn network_exists(&self, name: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().networks.contains(name))
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        self.log(format!("remove_network:{}", name));
        self.state.lock().unwrap().networks.remove(name);
        Ok(())
    }

    async fn create_volume(&self, options: VolumeCreateOptions) -> Result<()> {
        let name = options.name.unwrap_or_default();
        self.log(format!("create_volume:{}", name));
        self.state.lock().unwrap().volumes.insert(name);
        Ok(())
    }

    async fn volume_exists(&self, name: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().volumes.contains(name))
    }

    async fn remove_volume(&self, name: &str, _force: bool) -> Result<()> {
        self.log(format!("remove_volume:{}", name));
        self.state.lock().unwrap().volumes.remove(name);
        Ok(())
    }

    async fn pull_image(&self, image: &str, events: mpsc::Sender<PullEvent>) -> Result<()> {
        self.log(format!("pull_image:{}", image));
        let should_fail = self.state.lock().unwrap().fail_pull.contains(image);
        if should_fail {
            let _ = events
                .send(PullEvent::Failed("simulated pull failure".to_string()))
                .await;
            return Err(EngineError::ImagePullFailed {
                image: image.to_string(),
                message: "simulated pull failure".to_string(),
            });
        }
        self.state
            .lock()
            .unwrap()
            .images
            .insert(image.to_string());
        let _ = events.send(PullEvent::Completed).await;
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().images.contains(image))
    }

    async fn connect_network(
        &self,
        network: &str,
        container: &str,
        _endpoint: EndpointSettings,
    ) -> Result<()> {
        self.log(format!("connect_network:{}:{}", network, container));
        Ok(())
    }
}
