//! オーケストレータの動作設定

/// イメージのプル方針
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PullPolicy {
    /// ローカルに無い場合のみプル
    #[default]
    IfNotPresent,
    /// 毎回プル
    Always,
    /// プルしない（ローカルに無ければ作成時に失敗）
    Never,
}

/// 動作設定のスナップショット
///
/// 構築時に確定し、以後は変更されない。
#[derive(Debug, Clone)]
pub struct Settings {
    pub pull_policy: PullPolicy,
    /// 依存待機のポーリング間隔（ミリ秒）
    pub poll_interval_ms: u64,
    /// デプロイ全体の制限時間（ミリ秒）。Noneなら無制限
    pub deploy_deadline_ms: Option<u64>,
    /// スタックビューのキャッシュTTL（ミリ秒）
    pub cache_ttl_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pull_policy: PullPolicy::IfNotPresent,
            poll_interval_ms: 1000,
            deploy_deadline_ms: None,
            cache_ttl_ms: 5_000,
        }
    }
}
