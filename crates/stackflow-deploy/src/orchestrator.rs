//! デプロイオーケストレータ
//!
//! スタックのライフサイクル操作を司る。デプロイは
//! 検証 → 解決 → プラン → プロビジョニング → プル → バッチ投入 → 稼働
//! の各フェーズを順に進み、途中で失敗した場合はこの試行で作成した
//! コンテナだけを巻き戻す。変更系操作はスタックごとのミューテックスで
//! 直列化される。

use crate::cache::TtlCache;
use crate::error::{DeployError, Result};
use crate::settings::{PullPolicy, Settings};
use crate::store::{StackRecord, StackStatus, StackStore};
use stackflow_compose::{
    ComposeDocument, DependencyEdge, DeploymentPlan, SkippedService, envfile, graph, parser,
    planner, VariableContext, config_hash,
};
use stackflow_engine::waiter::{WaitOptions, WaitOutcome, wait_for_dependency};
use stackflow_engine::{
    ContainerEngine, EngineError, RuntimeStatus, StackRuntime, build_container_plan, naming,
    provision_stack_resources, remove_stack_resources, stack_runtime,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

/// デプロイ結果
#[derive(Debug, Clone, Default)]
pub struct DeployReport {
    /// 依存順にデプロイされたサービス
    pub deployed: Vec<String>,
    pub skipped: Vec<SkippedService>,
    pub warnings: Vec<String>,
}

/// レコードと実行時状態をまとめたビュー
#[derive(Debug, Clone)]
pub struct StackView {
    pub record: StackRecord,
    pub runtime: StackRuntime,
    /// ストア未登録だがエンジン上にスタックラベル付きコンテナが存在する
    pub external: bool,
}

/// ドリフト検出の結果1件
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceChange {
    pub service: String,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// 定義にあるがコンテナが存在しない
    Added,
    /// コンテナはあるが定義から消えた
    Removed,
    /// 設定ハッシュが一致しない
    Updated,
}

/// バリデーション結果（エラーはResultで返すため警告のみ）
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub warnings: Vec<String>,
}

/// バリデーションの深さ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// パースと構造検証のみ
    Structure,
    /// 依存グラフの解決まで行い、警告も収集する
    #[default]
    Full,
}

pub struct Orchestrator<E: ContainerEngine, S: StackStore> {
    engine: E,
    store: S,
    settings: Settings,
    cache: TtlCache<StackView>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<E: ContainerEngine, S: StackStore> Orchestrator<E, S> {
    pub fn new(engine: E, store: S, settings: Settings) -> Self {
        let cache = TtlCache::new(settings.cache_ttl_ms);
        Self {
            engine,
            store,
            settings,
            cache,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// スタックを登録する（デプロイはしない）
    pub async fn create_stack(
        &self,
        name: &str,
        compose_content: &str,
        env_content: Option<&str>,
        project_dir: Option<PathBuf>,
    ) -> Result<StackRecord> {
        let mut record = StackRecord::new(name, compose_content);
        record.env_content = env_content.map(String::from);
        if let Some(dir) = project_dir {
            record.project_dir = dir;
        }

        // 登録前に内容を検証する
        self.resolve_document(&record, &[])?;

        self.store.save(record.clone()).await?;
        self.cache.invalidate(name);
        info!(stack = name, "Stack created");
        Ok(record)
    }

    /// composeとenvの内容を差し替える（次のデプロイから反映）
    pub async fn update_stack(
        &self,
        name: &str,
        compose_content: &str,
        env_content: Option<&str>,
    ) -> Result<()> {
        let _guard = self.lock_stack(name).await;
        let mut record = self.require(name).await?;
        record.compose_content = compose_content.to_string();
        record.env_content = env_content.map(String::from);
        self.resolve_document(&record, &[])?;

        self.store
            .update_content(name, record.compose_content, record.env_content)
            .await?;
        self.cache.invalidate(name);
        Ok(())
    }

    /// スタックをデプロイする
    ///
    /// 既存のスタックラベル付きコンテナは（停止中のものも含めて）
    /// 作成前にすべて削除される。
    pub async fn deploy_stack(
        &self,
        name: &str,
        profiles: &BTreeSet<String>,
        env_overrides: &[(String, String)],
    ) -> Result<DeployReport> {
        let _guard = self.lock_stack(name).await;
        self.deploy_locked(name, profiles, env_overrides).await
    }

    /// 前回と同じプロファイルで再デプロイする
    pub async fn redeploy_stack(&self, name: &str) -> Result<DeployReport> {
        let _guard = self.lock_stack(name).await;
        let record = self.require(name).await?;
        let profiles = record.active_profiles.clone();
        self.deploy_locked(name, &profiles, &[]).await
    }

    /// スタックを停止する
    ///
    /// 全コンテナを強制停止して削除し、スタック所有のネットワークも
    /// 削除する。ボリュームは保持され、定義はストアに残るため
    /// 再デプロイで復元できる。
    pub async fn stop_stack(&self, name: &str) -> Result<()> {
        let _guard = self.lock_stack(name).await;
        let record = self.require(name).await?;
        self.stop_locked(name, &record).await
    }

    /// スタックを再起動する（停止してから同じプロファイルで再デプロイ）
    pub async fn restart_stack(&self, name: &str) -> Result<DeployReport> {
        let _guard = self.lock_stack(name).await;
        let record = self.require(name).await?;
        self.stop_locked(name, &record).await?;

        let profiles = record.active_profiles.clone();
        self.deploy_locked(name, &profiles, &[]).await
    }

    /// スタック名を変更する
    ///
    /// 稼働中は拒否する。停止済みの旧名コンテナは（ラベルが旧名のままに
    /// なるため）削除される。
    pub async fn rename_stack(&self, old_name: &str, new_name: &str) -> Result<()> {
        let _guard = self.lock_stack(old_name).await;
        self.require(old_name).await?;

        let runtime = stack_runtime(&self.engine, old_name).await?;
        if runtime.running_count > 0 {
            return Err(DeployError::StackRunning(old_name.to_string()));
        }
        for container in self.engine.list_stack_containers(old_name).await? {
            self.engine.remove_container(&container.name, true).await?;
        }

        self.store.rename(old_name, new_name).await?;
        self.cache.invalidate(old_name);
        self.cache.invalidate(new_name);
        info!(old = old_name, new = new_name, "Stack renamed");
        Ok(())
    }

    /// スタックを破棄する
    ///
    /// コンテナと所有リソースを削除する。externalリソースは残す。
    pub async fn destroy_stack(
        &self,
        name: &str,
        remove_volumes: bool,
        remove_record: bool,
    ) -> Result<()> {
        let _guard = self.lock_stack(name).await;
        let record = self.require(name).await?;

        for container in self.engine.list_stack_containers(name).await? {
            self.engine.remove_container(&container.name, true).await?;
        }

        // 定義がパースできる場合のみリソースを特定して削除できる
        match self.resolve_document(&record, &[]) {
            Ok((document, _)) => {
                remove_stack_resources(&self.engine, name, &document, remove_volumes).await?;
            }
            Err(e) => {
                warn!(stack = name, error = %e, "Compose content unparsable, skipping resource removal");
            }
        }

        if remove_record {
            self.store.delete(name).await?;
        } else {
            self.store.update_status(name, StackStatus::Stopped).await?;
        }
        self.cache.invalidate(name);
        info!(stack = name, "Stack destroyed");
        Ok(())
    }

    /// レコードと実行時状態を返す（TTLキャッシュ付き）
    pub async fn get_stack(&self, name: &str) -> Result<StackView> {
        if let Some(view) = self.cache.get(name) {
            return Ok(view);
        }
        let record = self.require(name).await?;
        let runtime = stack_runtime(&self.engine, name).await?;
        let view = StackView {
            record,
            runtime,
            external: false,
        };
        self.cache.insert(name, view.clone());
        Ok(view)
    }

    /// 登録済みスタックを一覧する
    ///
    /// `include_external`を指定すると、ストア未登録だがエンジン上に
    /// スタックラベル付きコンテナが残っているスタック（別ホストで登録
    /// されたものや、レコードだけ消されたもの）も合成ビューで返す。
    pub async fn list_stacks(&self, include_external: bool) -> Result<Vec<StackView>> {
        let mut views = Vec::new();
        let mut known = BTreeSet::new();
        for record in self.store.list().await? {
            let name = record.name.clone();
            known.insert(name.clone());
            if let Some(view) = self.cache.get(&name) {
                views.push(view);
                continue;
            }
            let runtime = stack_runtime(&self.engine, &name).await?;
            let view = StackView {
                record,
                runtime,
                external: false,
            };
            self.cache.insert(&name, view.clone());
            views.push(view);
        }

        if include_external {
            let mut discovered = BTreeSet::new();
            for container in self.engine.list_managed_containers().await? {
                if let Some(stack) = container.stack() {
                    if !known.contains(stack) {
                        discovered.insert(stack.to_string());
                    }
                }
            }
            for name in discovered {
                let runtime = stack_runtime(&self.engine, &name).await?;
                let mut record = StackRecord::new(&name, "");
                record.status = match runtime.status {
                    RuntimeStatus::Running | RuntimeStatus::PartiallyRunning => {
                        StackStatus::Running
                    }
                    _ => StackStatus::Stopped,
                };
                // 定義を持たないためキャッシュには載せない
                views.push(StackView {
                    record,
                    runtime,
                    external: true,
                });
            }
        }
        Ok(views)
    }

    /// 定義と稼働中コンテナの差分を検出する（参考情報）
    ///
    /// 設定ハッシュの比較のみで、ランタイム側のドリフト（手動変更）は
    /// 検出対象外。
    pub async fn detect_stack_changes(&self, name: &str) -> Result<Vec<ServiceChange>> {
        let record = self.require(name).await?;
        let (document, _) = self.resolve_document(&record, &[])?;
        let plan = planner::plan(&document, &record.active_profiles)?;
        let active = plan.active_set();

        let mut live_hashes: BTreeMap<String, String> = BTreeMap::new();
        for container in self.engine.list_stack_containers(name).await? {
            if let (Some(service), Some(hash)) = (container.service(), container.config_hash()) {
                live_hashes.insert(service.to_string(), hash.to_string());
            }
        }

        let mut changes = Vec::new();
        for service in &active {
            let expected = config_hash(service, &document.services[service]);
            match live_hashes.get(service) {
                None => changes.push(ServiceChange {
                    service: service.clone(),
                    kind: ChangeKind::Added,
                }),
                Some(actual) if *actual != expected => changes.push(ServiceChange {
                    service: service.clone(),
                    kind: ChangeKind::Updated,
                }),
                Some(_) => {}
            }
        }
        for service in live_hashes.keys() {
            if !active.contains(service) {
                changes.push(ServiceChange {
                    service: service.clone(),
                    kind: ChangeKind::Removed,
                });
            }
        }
        Ok(changes)
    }

    /// 保存済みの定義を検証する（エンジンには触れない）
    pub async fn validate_stack_configuration(
        &self,
        name: &str,
        mode: ValidationMode,
    ) -> Result<ValidationReport> {
        let record = self.require(name).await?;
        let (document, _) = self.resolve_document(&record, &[])?;
        match mode {
            ValidationMode::Structure => Ok(ValidationReport::default()),
            ValidationMode::Full => {
                let resolved = graph::resolve(&document.services)?;
                Ok(ValidationReport {
                    warnings: resolved.warnings,
                })
            }
        }
    }

    /// 定義内で宣言されている全プロファイル
    pub async fn get_stack_profiles(&self, name: &str) -> Result<BTreeSet<String>> {
        let record = self.require(name).await?;
        let (document, _) = self.resolve_document(&record, &[])?;
        Ok(document.declared_profiles())
    }

    /// デプロイせずにプランだけを計算する
    pub async fn preview_stack_deployment(
        &self,
        name: &str,
        profiles: &BTreeSet<String>,
    ) -> Result<DeploymentPlan> {
        let record = self.require(name).await?;
        let (document, _) = self.resolve_document(&record, &[])?;
        Ok(planner::plan(&document, profiles)?)
    }

    // --- 内部実装 ---

    /// ロック取得済み前提の停止処理（restartからも呼ばれる）
    async fn stop_locked(&self, name: &str, record: &StackRecord) -> Result<()> {
        for container in self.engine.list_stack_containers(name).await? {
            self.engine.stop_container(&container.name).await?;
            self.engine.remove_container(&container.name, true).await?;
        }

        // 定義がパースできる場合のみネットワークを特定して削除できる。
        // ボリュームは停止では消さない
        match self.resolve_document(record, &[]) {
            Ok((document, _)) => {
                remove_stack_resources(&self.engine, name, &document, false).await?;
            }
            Err(e) => {
                warn!(stack = name, error = %e, "Compose content unparsable, skipping network removal");
            }
        }

        self.store.update_status(name, StackStatus::Stopped).await?;
        self.cache.invalidate(name);
        info!(stack = name, "Stack stopped");
        Ok(())
    }

    async fn deploy_locked(
        &self,
        name: &str,
        profiles: &BTreeSet<String>,
        env_overrides: &[(String, String)],
    ) -> Result<DeployReport> {
        let record = self.require(name).await?;

        info!(stack = name, phase = "validating", "Deploy started");
        let (document, container_env) = self.resolve_document(&record, env_overrides)?;

        info!(stack = name, phase = "planning", "Computing deployment plan");
        let plan = planner::plan(&document, profiles)?;
        if !plan.is_deployable() {
            return Err(DeployError::Plan(plan.errors.join("; ")));
        }
        let filtered = document.retain_services(&plan.active_set());
        let resolved = graph::resolve(&filtered.services)?;

        self.store.update_status(name, StackStatus::Deploying).await?;
        self.store.update_profiles(name, profiles.clone()).await?;
        self.cache.invalidate(name);

        let deadline = self
            .settings
            .deploy_deadline_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));

        let mut report = DeployReport {
            skipped: plan.skipped.clone(),
            warnings: plan.warnings.clone(),
            ..Default::default()
        };

        // クリーン再デプロイ: 既存のスタックコンテナは停止中も含めて削除
        info!(stack = name, phase = "provisioning", "Removing previous containers");
        let outcome: Result<()> = async {
            for container in self.engine.list_stack_containers(name).await? {
                self.engine.remove_container(&container.name, true).await?;
            }
            provision_stack_resources(&self.engine, name, &filtered).await?;
            Ok(())
        }
        .await;
        if let Err(e) = outcome {
            self.store.update_status(name, StackStatus::Failed).await?;
            self.cache.invalidate(name);
            return Err(e);
        }

        info!(stack = name, phase = "pulling", "Pulling images");
        self.pull_images(&filtered, &mut report.warnings).await;

        info!(stack = name, phase = "deploying", "Creating containers");
        let mut created: Vec<String> = Vec::new();
        let result = self
            .deploy_batches(
                name,
                &filtered,
                &plan,
                &resolved.edges,
                &container_env,
                &record.project_dir,
                deadline,
                &mut created,
                &mut report,
            )
            .await;

        match result {
            Ok(()) => {
                self.store.update_status(name, StackStatus::Running).await?;
                self.cache.invalidate(name);
                info!(
                    stack = name,
                    services = report.deployed.len(),
                    "Deploy complete"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(stack = name, error = %e, "Deploy failed, rolling back");
                // この試行で作成したコンテナだけを削除する
                for container in created.iter().rev() {
                    if let Err(remove_err) = self.engine.remove_container(container, true).await {
                        warn!(container = %container, error = %remove_err, "Rollback removal failed");
                    }
                }
                self.store.update_status(name, StackStatus::Failed).await?;
                self.cache.invalidate(name);
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn deploy_batches(
        &self,
        stack: &str,
        document: &ComposeDocument,
        plan: &DeploymentPlan,
        edges: &[DependencyEdge],
        container_env: &[(String, String)],
        project_dir: &std::path::Path,
        deadline: Option<Instant>,
        created: &mut Vec<String>,
        report: &mut DeployReport,
    ) -> Result<()> {
        let wait_options = WaitOptions {
            poll_interval_ms: self.settings.poll_interval_ms,
        };

        for batch in &plan.batches {
            for service in batch {
                let remaining = self.remaining_ms(deadline)?;

                for edge in edges.iter().filter(|e| e.service == *service) {
                    let dep_container = dependency_container_name(stack, document, &edge.depends_on);
                    // 全体の制限時間が依存タイムアウトより先に来るなら切り詰める
                    let mut edge = edge.clone();
                    if let Some(remaining) = remaining {
                        edge.timeout_ms = edge.timeout_ms.min(remaining);
                    }

                    let outcome =
                        wait_for_dependency(&self.engine, &edge, &dep_container, &wait_options)
                            .await
                            .map_err(|e| match e {
                                EngineError::WaitTimeout {
                                    service, condition, ..
                                } => {
                                    if deadline.is_some_and(|d| Instant::now() >= d) {
                                        DeployError::DeadlineExceeded {
                                            deadline_ms: self
                                                .settings
                                                .deploy_deadline_ms
                                                .unwrap_or_default(),
                                        }
                                    } else {
                                        DeployError::DependencyTimeout { service, condition }
                                    }
                                }
                                other => DeployError::Engine(other),
                            })?;
                    if let WaitOutcome::TimedOutWarning(message) = outcome {
                        report.warnings.push(message);
                    }
                }

                let spec = &document.services[service];
                let container_plan = build_container_plan(
                    stack,
                    service,
                    spec,
                    document,
                    container_env,
                    project_dir,
                )?;
                report.warnings.extend(container_plan.warnings.clone());

                self.engine
                    .create_container(&container_plan.name, container_plan.config.clone())
                    .await
                    .map_err(|e| DeployError::ContainerCreate {
                        service: service.clone(),
                        message: e.to_string(),
                    })?;
                created.push(container_plan.name.clone());

                for (network, endpoint) in &container_plan.extra_networks {
                    self.engine
                        .connect_network(network, &container_plan.name, endpoint.clone())
                        .await?;
                }

                self.engine.start_container(&container_plan.name).await?;
                report.deployed.push(service.clone());
            }
        }
        Ok(())
    }

    /// プル方針に従ってイメージを並行プルする。失敗は警告（作成時に顕在化）
    async fn pull_images(&self, document: &ComposeDocument, warnings: &mut Vec<String>) {
        if self.settings.pull_policy == PullPolicy::Never {
            return;
        }

        let images: BTreeSet<String> = document
            .services
            .values()
            .filter_map(|s| s.image.clone())
            .collect();

        let mut to_pull = Vec::new();
        for image in images {
            if self.settings.pull_policy == PullPolicy::IfNotPresent {
                match self.engine.image_exists(&image).await {
                    Ok(true) => continue,
                    Ok(false) => {}
                    Err(e) => {
                        warnings.push(format!("イメージ '{}' の確認に失敗しました: {}", image, e));
                        continue;
                    }
                }
            }
            to_pull.push(image);
        }

        let pulls = to_pull.iter().map(|image| async move {
            let (events, _drain) = mpsc::channel(8);
            self.engine
                .pull_image(image, events)
                .await
                .map_err(|e| (image.clone(), e))
        });

        for result in futures_util::future::join_all(pulls).await {
            if let Err((image, e)) = result {
                warnings.push(format!("イメージ '{}' のプルに失敗しました: {}", image, e));
            }
        }
    }

    fn resolve_document(
        &self,
        record: &StackRecord,
        env_overrides: &[(String, String)],
    ) -> Result<(ComposeDocument, Vec<(String, String)>)> {
        let env_file = record
            .env_content
            .as_deref()
            .map(envfile::parse)
            .unwrap_or_default();

        let ctx = VariableContext::from_process_env(
            env_file.iter().cloned(),
            env_overrides.iter().cloned(),
        );
        let document = parser::parse_with_context(&record.compose_content, &ctx)?;

        // コンテナ環境変数の優先順位（弱い順）:
        // プロセス環境 < envファイル < オーバーライド < サービス定義
        // （サービス定義はコンテナ計画の組み立て時に最後に重ねられる）
        let mut container_env: Vec<(String, String)> = std::env::vars().collect();
        container_env.extend(env_file);
        container_env.extend(env_overrides.iter().cloned());
        Ok((document, container_env))
    }

    fn remaining_ms(&self, deadline: Option<Instant>) -> Result<Option<u64>> {
        match deadline {
            None => Ok(None),
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    Err(DeployError::DeadlineExceeded {
                        deadline_ms: self.settings.deploy_deadline_ms.unwrap_or_default(),
                    })
                } else {
                    Ok(Some((deadline - now).as_millis() as u64))
                }
            }
        }
    }

    async fn require(&self, name: &str) -> Result<StackRecord> {
        self.store
            .get(name)
            .await?
            .ok_or_else(|| DeployError::StackNotFound(name.to_string()))
    }

    async fn lock_stack(&self, name: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap();
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// 依存先サービスのコンテナ名を解決する
fn dependency_container_name(stack: &str, document: &ComposeDocument, service: &str) -> String {
    document
        .services
        .get(service)
        .and_then(|s| s.container_name.clone())
        .unwrap_or_else(|| naming::container_name(stack, service))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStackStore;
    use stackflow_engine::testing::MockEngine;

    const COMPOSE: &str = r#"
services:
  db:
    image: postgres:16
  web:
    image: nginx:1.25
    depends_on:
      - db
  debugger:
    image: busybox
    profiles:
      - debug
"#;

    fn orchestrator() -> Orchestrator<MockEngine, MemoryStackStore> {
        Orchestrator::new(
            MockEngine::new(),
            MemoryStackStore::new(),
            Settings {
                poll_interval_ms: 1,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_create_and_get_round_trip() {
        let orch = orchestrator();
        orch.create_stack("myapp", COMPOSE, Some("TZ=UTC\n"), None)
            .await
            .unwrap();

        let view = orch.get_stack("myapp").await.unwrap();
        assert_eq!(view.record.compose_content, COMPOSE);
        assert_eq!(view.record.env_content.as_deref(), Some("TZ=UTC\n"));
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_compose() {
        let orch = orchestrator();
        let result = orch.create_stack("bad", "services: {}", None, None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_create_conflict() {
        let orch = orchestrator();
        orch.create_stack("myapp", COMPOSE, None, None).await.unwrap();
        let result = orch.create_stack("myapp", COMPOSE, None, None).await;
        assert!(matches!(result, Err(DeployError::StackConflict(_))));
    }

    #[tokio::test]
    async fn test_preview_does_not_touch_engine() {
        let orch = orchestrator();
        orch.create_stack("myapp", COMPOSE, None, None).await.unwrap();

        let plan = orch
            .preview_stack_deployment("myapp", &BTreeSet::new())
            .await
            .unwrap();
        assert_eq!(plan.deploy, vec!["db".to_string(), "web".to_string()]);
        assert_eq!(plan.skipped.len(), 1);
        assert!(orch.engine.operations().is_empty());
    }

    #[tokio::test]
    async fn test_get_stack_profiles() {
        let orch = orchestrator();
        orch.create_stack("myapp", COMPOSE, None, None).await.unwrap();

        let profiles = orch.get_stack_profiles("myapp").await.unwrap();
        assert_eq!(profiles, BTreeSet::from(["debug".to_string()]));
    }

    #[tokio::test]
    async fn test_unknown_stack() {
        let orch = orchestrator();
        let result = orch.get_stack("ghost").await;
        assert!(matches!(result, Err(DeployError::StackNotFound(_))));
    }

    #[tokio::test]
    async fn test_detect_changes_on_fresh_stack() {
        let orch = orchestrator();
        orch.create_stack("myapp", COMPOSE, None, None).await.unwrap();

        // コンテナが1つも無いので、アクティブな全サービスがAdded
        let changes = orch.detect_stack_changes("myapp").await.unwrap();
        let added: Vec<&str> = changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Added)
            .map(|c| c.service.as_str())
            .collect();
        assert_eq!(added, vec!["db", "web"]);
    }

    #[tokio::test]
    async fn test_validation_modes() {
        let orch = orchestrator();
        // webはdbのservice_healthyを待つが、dbにhealthcheckがない
        let compose = r#"
services:
  db:
    image: postgres:16
  web:
    image: nginx:1.25
    depends_on:
      db:
        condition: service_healthy
"#;
        orch.create_stack("myapp", compose, None, None).await.unwrap();

        // 構造検証のみでは警告を収集しない
        let report = orch
            .validate_stack_configuration("myapp", ValidationMode::Structure)
            .await
            .unwrap();
        assert!(report.warnings.is_empty());

        let report = orch
            .validate_stack_configuration("myapp", ValidationMode::Full)
            .await
            .unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("healthcheck"));
    }

    #[tokio::test]
    async fn test_rename_refused_while_running() {
        let orch = orchestrator();
        orch.create_stack("myapp", COMPOSE, None, None).await.unwrap();
        orch.deploy_stack("myapp", &BTreeSet::new(), &[]).await.unwrap();

        let result = orch.rename_stack("myapp", "renamed").await;
        assert!(matches!(result, Err(DeployError::StackRunning(_))));

        orch.stop_stack("myapp").await.unwrap();
        orch.rename_stack("myapp", "renamed").await.unwrap();
        assert!(orch.get_stack("renamed").await.is_ok());
    }
}
