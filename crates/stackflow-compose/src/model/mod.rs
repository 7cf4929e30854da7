//! composeドキュメントモデル
//!
//! パース済みのcomposeファイルを型付きで表現する。ランタイムの形状に
//! 依存しないよう、必須の形から外れた入力はパース段階で拒否される。

pub mod network;
pub mod port;
pub mod service;
pub mod volume;

pub use network::{IpamSpec, NetworkAttachment, NetworkSpec};
pub use port::{PortSpec, Protocol};
pub use service::{
    BuildContext, Condition, DEFAULT_DEPENDENCY_TIMEOUT_MS, DependsOn, HealthCheck, LoggingSpec,
    RestartPolicy, ServiceSpec, Ulimit, cpus_to_nano, parse_duration_ms, parse_memory_bytes,
};
pub use volume::{MountSpec, VolumeSpec};

use crate::error::{ComposeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// パース済みcomposeドキュメント
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposeDocument {
    pub services: BTreeMap<String, ServiceSpec>,
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkSpec>,
    #[serde(default)]
    pub volumes: BTreeMap<String, VolumeSpec>,
}

impl ComposeDocument {
    /// 構造バリデーション
    ///
    /// - depends_onの参照先が存在すること
    /// - imageとbuildが排他であり、どちらかは必須であること
    /// - サービスが参照するネットワークが宣言されていること
    pub fn validate(&self) -> Result<()> {
        if self.services.is_empty() {
            return Err(ComposeError::InvalidConfig(
                "サービスが1つも定義されていません".to_string(),
            ));
        }

        for (name, service) in &self.services {
            match (&service.image, &service.build) {
                (None, None) => {
                    return Err(ComposeError::InvalidConfig(format!(
                        "サービス '{}' に image も build も指定されていません",
                        name
                    )));
                }
                (Some(_), Some(_)) => {
                    return Err(ComposeError::InvalidConfig(format!(
                        "サービス '{}' に image と build が両方指定されています（排他）",
                        name
                    )));
                }
                _ => {}
            }

            for target in service.depends_on.keys() {
                if !self.services.contains_key(target) {
                    return Err(ComposeError::UnknownDependency {
                        service: name.clone(),
                        target: target.clone(),
                    });
                }
            }

            for attachment in &service.networks {
                if !self.networks.contains_key(&attachment.network) {
                    return Err(ComposeError::InvalidConfig(format!(
                        "サービス '{}' が未宣言のネットワーク '{}' を参照しています",
                        name, attachment.network
                    )));
                }
            }
        }

        Ok(())
    }

    /// 指定したサービスだけを残したドキュメントを返す
    ///
    /// 除外されたサービスへのdepends_onエッジも取り除く。プロファイル
    /// フィルタ後のドキュメント書き換えに使用する。
    pub fn retain_services(&self, keep: &BTreeSet<String>) -> ComposeDocument {
        let services: BTreeMap<String, ServiceSpec> = self
            .services
            .iter()
            .filter(|(name, _)| keep.contains(*name))
            .map(|(name, spec)| {
                let mut spec = spec.clone();
                spec.depends_on.retain(|target, _| keep.contains(target));
                (name.clone(), spec)
            })
            .collect();

        ComposeDocument {
            services,
            networks: self.networks.clone(),
            volumes: self.volumes.clone(),
        }
    }

    /// サービスから参照されている名前付きボリューム名を列挙
    pub fn referenced_volumes(&self) -> BTreeSet<String> {
        self.services
            .values()
            .flat_map(|s| s.mounts.iter().filter_map(|m| m.volume_name()))
            .map(String::from)
            .collect()
    }

    /// ドキュメント内で宣言された全プロファイル名を列挙
    pub fn declared_profiles(&self) -> BTreeSet<String> {
        self.services
            .values()
            .flat_map(|s| s.profiles.iter().cloned())
            .collect()
    }
}
