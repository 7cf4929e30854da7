//! スタックレコードの保管
//!
//! composeテキストとenvテキストをバイト単位でそのまま保持する。
//! パース済みモデルは保存せず、必要になるたびに再パースする。

use crate::error::{DeployError, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tokio::sync::RwLock;

/// スタックのライフサイクル状態（永続側）
///
/// 実行時の詳細ステータスはコンテナの実態から毎回再計算される。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackStatus {
    Created,
    Deploying,
    Running,
    Stopped,
    Failed,
}

impl StackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Deploying => "deploying",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

/// 登録済みスタック
#[derive(Debug, Clone)]
pub struct StackRecord {
    pub name: String,
    /// composeファイルの内容（変数未展開の原文）
    pub compose_content: String,
    /// envファイルの内容（原文）
    pub env_content: Option<String>,
    /// バインドマウントの相対パス解決に使うディレクトリ
    pub project_dir: PathBuf,
    pub status: StackStatus,
    /// 直近のデプロイで要求されたプロファイル
    pub active_profiles: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StackRecord {
    pub fn new(name: impl Into<String>, compose_content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            compose_content: compose_content.into(),
            env_content: None,
            project_dir: PathBuf::from("."),
            status: StackStatus::Created,
            active_profiles: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// スタックレコードの保管先
#[allow(async_fn_in_trait)]
pub trait StackStore {
    async fn get(&self, name: &str) -> Result<Option<StackRecord>>;
    async fn list(&self) -> Result<Vec<StackRecord>>;
    /// 新規保存。同名が既に存在する場合は`StackConflict`
    async fn save(&self, record: StackRecord) -> Result<()>;
    async fn update_status(&self, name: &str, status: StackStatus) -> Result<()>;
    async fn update_content(
        &self,
        name: &str,
        compose_content: String,
        env_content: Option<String>,
    ) -> Result<()>;
    async fn update_profiles(&self, name: &str, profiles: BTreeSet<String>) -> Result<()>;
    async fn rename(&self, old_name: &str, new_name: &str) -> Result<()>;
    async fn delete(&self, name: &str) -> Result<()>;
}

/// インメモリのStackStore実装
#[derive(Default)]
pub struct MemoryStackStore {
    records: RwLock<BTreeMap<String, StackRecord>>,
}

impl MemoryStackStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StackStore for MemoryStackStore {
    async fn get(&self, name: &str) -> Result<Option<StackRecord>> {
        Ok(self.records.read().await.get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<StackRecord>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn save(&self, record: StackRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.name) {
            return Err(DeployError::StackConflict(record.name.clone()));
        }
        records.insert(record.name.clone(), record);
        Ok(())
    }

    async fn update_status(&self, name: &str, status: StackStatus) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(name)
            .ok_or_else(|| DeployError::StackNotFound(name.to_string()))?;
        record.status = status;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn update_content(
        &self,
        name: &str,
        compose_content: String,
        env_content: Option<String>,
    ) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(name)
            .ok_or_else(|| DeployError::StackNotFound(name.to_string()))?;
        record.compose_content = compose_content;
        record.env_content = env_content;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn update_profiles(&self, name: &str, profiles: BTreeSet<String>) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(name)
            .ok_or_else(|| DeployError::StackNotFound(name.to_string()))?;
        record.active_profiles = profiles;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn rename(&self, old_name: &str, new_name: &str) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(new_name) {
            return Err(DeployError::StackConflict(new_name.to_string()));
        }
        let mut record = records
            .remove(old_name)
            .ok_or_else(|| DeployError::StackNotFound(old_name.to_string()))?;
        record.name = new_name.to_string();
        record.updated_at = Utc::now();
        records.insert(new_name.to_string(), record);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let mut records = self.records.write().await;
        records
            .remove(name)
            .ok_or_else(|| DeployError::StackNotFound(name.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_get_round_trip() {
        let store = MemoryStackStore::new();
        let compose = "services:\n  web:\n    image: nginx\n";
        let mut record = StackRecord::new("myapp", compose);
        record.env_content = Some("TZ=Asia/Tokyo\n".to_string());
        store.save(record).await.unwrap();

        let loaded = store.get("myapp").await.unwrap().unwrap();
        // 保存したテキストはバイト単位で一致する
        assert_eq!(loaded.compose_content, compose);
        assert_eq!(loaded.env_content.as_deref(), Some("TZ=Asia/Tokyo\n"));
        assert_eq!(loaded.status, StackStatus::Created);
    }

    #[tokio::test]
    async fn test_duplicate_save_conflicts() {
        let store = MemoryStackStore::new();
        store
            .save(StackRecord::new("myapp", "services: {}"))
            .await
            .unwrap();
        let result = store.save(StackRecord::new("myapp", "services: {}")).await;
        assert!(matches!(result, Err(DeployError::StackConflict(_))));
    }

    #[tokio::test]
    async fn test_rename() {
        let store = MemoryStackStore::new();
        store
            .save(StackRecord::new("old", "services: {}"))
            .await
            .unwrap();
        store.rename("old", "new").await.unwrap();

        assert!(store.get("old").await.unwrap().is_none());
        assert_eq!(store.get("new").await.unwrap().unwrap().name, "new");
    }

    #[tokio::test]
    async fn test_delete_missing_stack() {
        let store = MemoryStackStore::new();
        let result = store.delete("ghost").await;
        assert!(matches!(result, Err(DeployError::StackNotFound(_))));
    }
}
