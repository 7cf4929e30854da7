//! ネットワーク定義

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// トップレベルのネットワーク定義
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub driver: Option<String>,
    #[serde(default)]
    pub driver_opts: BTreeMap<String, String>,
    pub ipam: Option<IpamSpec>,
    /// external指定時の解決済みネットワーク名
    ///
    /// `external: true` はcomposeでのキー名、`external: {name: "foo"}` は
    /// 指定された名前に解決される。
    pub external: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl NetworkSpec {
    pub fn is_external(&self) -> bool {
        self.external.is_some()
    }
}

/// IPAM設定（サブネット・ゲートウェイ）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpamSpec {
    pub subnet: Option<String>,
    pub gateway: Option<String>,
}

/// サービスからネットワークへの接続定義
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkAttachment {
    pub network: String,
    pub ipv4_address: Option<String>,
    pub ipv6_address: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl NetworkAttachment {
    pub fn named(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            ..Default::default()
        }
    }
}
