//! サービス定義

use super::network::NetworkAttachment;
use super::port::PortSpec;
use super::volume::MountSpec;
use crate::error::{ComposeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// 依存待機タイムアウトのデフォルト（ミリ秒）
pub const DEFAULT_DEPENDENCY_TIMEOUT_MS: u64 = 30_000;

/// サービス定義
///
/// composeファイルの1サービスを表す。imageとbuildは排他で、
/// buildは検出のみ対応（ビルド自体はスコープ外）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub image: Option<String>,
    pub build: Option<BuildContext>,
    pub command: Option<Vec<String>>,
    pub entrypoint: Option<Vec<String>>,
    /// 環境変数（宣言順を保持。同一キーは後勝ち）
    #[serde(default)]
    pub environment: Vec<(String, String)>,
    #[serde(default)]
    pub ports: Vec<PortSpec>,
    #[serde(default)]
    pub mounts: Vec<MountSpec>,
    #[serde(default)]
    pub networks: Vec<NetworkAttachment>,
    #[serde(default)]
    pub depends_on: BTreeMap<String, DependsOn>,
    pub healthcheck: Option<HealthCheck>,
    #[serde(default)]
    pub restart: RestartPolicy,
    /// メモリ上限（バイト）
    pub mem_limit: Option<i64>,
    /// CPU割当（NanoCpus）
    pub nano_cpus: Option<i64>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// 空集合は「常にアクティブ」を意味する
    #[serde(default)]
    pub profiles: BTreeSet<String>,
    pub container_name: Option<String>,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub cap_add: Vec<String>,
    #[serde(default)]
    pub cap_drop: Vec<String>,
    #[serde(default)]
    pub dns: Vec<String>,
    #[serde(default)]
    pub ulimits: Vec<Ulimit>,
    pub logging: Option<LoggingSpec>,
    pub user: Option<String>,
    pub working_dir: Option<String>,
}

impl ServiceSpec {
    /// プロファイル集合に対してアクティブかどうか
    ///
    /// profilesが空のサービスは常にアクティブ。宣言がある場合は
    /// 要求プロファイルと1つ以上交差すればアクティブ。
    pub fn is_active(&self, active_profiles: &BTreeSet<String>) -> bool {
        self.profiles.is_empty() || self.profiles.iter().any(|p| active_profiles.contains(p))
    }
}

/// ビルド設定（検出のみ）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildContext {
    pub context: String,
    pub dockerfile: Option<String>,
}

/// depends_onの1エントリ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependsOn {
    #[serde(default)]
    pub condition: Condition,
    /// unhealthy／異常終了時に依存先を再起動して待機を続けるか
    #[serde(default)]
    pub restart: bool,
    #[serde(default = "default_dependency_timeout")]
    pub timeout_ms: u64,
}

fn default_dependency_timeout() -> u64 {
    DEFAULT_DEPENDENCY_TIMEOUT_MS
}

impl Default for DependsOn {
    fn default() -> Self {
        Self {
            condition: Condition::Started,
            restart: false,
            timeout_ms: DEFAULT_DEPENDENCY_TIMEOUT_MS,
        }
    }
}

/// 依存待機の条件
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    #[default]
    Started,
    Healthy,
    CompletedSuccessfully,
}

impl Condition {
    /// compose表記からパース
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "service_started" => Some(Self::Started),
            "service_healthy" => Some(Self::Healthy),
            "service_completed_successfully" => Some(Self::CompletedSuccessfully),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "service_started",
            Self::Healthy => "service_healthy",
            Self::CompletedSuccessfully => "service_completed_successfully",
        }
    }

    /// タイムアウト時にデプロイ全体を失敗させるべき条件か
    ///
    /// service_startedだけは警告で継続する（ベストエフォート）。
    pub fn timeout_is_fatal(&self) -> bool {
        !matches!(self, Self::Started)
    }
}

/// 再起動ポリシー
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// 再起動しない（デフォルト）
    #[default]
    No,
    /// 常に再起動
    Always,
    /// 異常終了時のみ再起動
    OnFailure,
    /// 明示的に停止しない限り再起動
    UnlessStopped,
}

impl RestartPolicy {
    /// 文字列からパース
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "no" | "none" => Some(Self::No),
            "always" => Some(Self::Always),
            "on-failure" | "on_failure" => Some(Self::OnFailure),
            "unless-stopped" | "unless_stopped" => Some(Self::UnlessStopped),
            _ => None,
        }
    }

    /// Docker APIで使用する文字列に変換
    pub fn as_docker_str(&self) -> &'static str {
        match self {
            Self::No => "no",
            Self::Always => "always",
            Self::OnFailure => "on-failure",
            Self::UnlessStopped => "unless-stopped",
        }
    }
}

/// ヘルスチェック設定
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// テストコマンド（CMD / CMD-SHELL 形式）
    pub test: Vec<String>,
    /// チェック間隔（ミリ秒）
    pub interval_ms: u64,
    /// タイムアウト（ミリ秒）
    pub timeout_ms: u64,
    /// リトライ回数
    pub retries: u64,
    /// 起動猶予時間（ミリ秒）
    pub start_period_ms: u64,
}

/// ulimit定義
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ulimit {
    pub name: String,
    pub soft: i64,
    pub hard: i64,
}

/// ログドライバー設定
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingSpec {
    pub driver: Option<String>,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// メモリ指定文字列をバイト数に変換
///
/// `512m` `2g` `1024k` `100000b` および素の数値（バイト）に対応。
pub fn parse_memory_bytes(s: &str) -> Result<i64> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ComposeError::InvalidMemory(s.to_string()));
    }

    let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => s.split_at(idx),
        None => (s, ""),
    };

    let value: i64 = digits
        .parse()
        .map_err(|_| ComposeError::InvalidMemory(s.to_string()))?;

    let multiplier: i64 = match unit.to_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => 1024,
        "m" | "mb" => 1024 * 1024,
        "g" | "gb" => 1024 * 1024 * 1024,
        _ => return Err(ComposeError::InvalidMemory(s.to_string())),
    };

    Ok(value * multiplier)
}

/// CPU割当（コア数の小数）をDocker APIのNanoCpusに変換（切り捨て）
pub fn cpus_to_nano(cpus: f64) -> i64 {
    (cpus * 1e9) as i64
}

/// compose形式の時間指定をミリ秒に変換
///
/// `30s` `1m` `1m30s` `500ms` `1h` および素の数値（秒）に対応。
pub fn parse_duration_ms(s: &str) -> Result<u64> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ComposeError::InvalidDuration(s.to_string()));
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(secs * 1000);
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        if digits.is_empty() {
            return Err(ComposeError::InvalidDuration(s.to_string()));
        }
        let value: u64 = digits
            .parse()
            .map_err(|_| ComposeError::InvalidDuration(s.to_string()))?;
        digits.clear();

        let unit_ms: u64 = match c {
            'h' => 3_600_000,
            's' => 1000,
            'm' => {
                // "ms" と "m" の判別
                if chars.peek() == Some(&'s') {
                    chars.next();
                    1
                } else {
                    60_000
                }
            }
            _ => return Err(ComposeError::InvalidDuration(s.to_string())),
        };
        total += value * unit_ms;
    }

    if !digits.is_empty() {
        return Err(ComposeError::InvalidDuration(s.to_string()));
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_memory_bytes() {
        assert_eq!(parse_memory_bytes("512m").unwrap(), 512 * 1024 * 1024);
        assert_eq!(parse_memory_bytes("2g").unwrap(), 2 * 1024 * 1024 * 1024);
        assert_eq!(parse_memory_bytes("1024k").unwrap(), 1024 * 1024);
        assert_eq!(parse_memory_bytes("4096").unwrap(), 4096);
        assert_eq!(parse_memory_bytes("100b").unwrap(), 100);
        assert!(parse_memory_bytes("12x").is_err());
        assert!(parse_memory_bytes("").is_err());
    }

    #[test]
    fn test_cpus_to_nano() {
        assert_eq!(cpus_to_nano(0.5), 500_000_000);
        assert_eq!(cpus_to_nano(2.0), 2_000_000_000);
        // 切り捨て
        assert_eq!(cpus_to_nano(0.0000000015), 1);
    }

    #[test]
    fn test_parse_duration_ms() {
        assert_eq!(parse_duration_ms("30s").unwrap(), 30_000);
        assert_eq!(parse_duration_ms("1m").unwrap(), 60_000);
        assert_eq!(parse_duration_ms("1m30s").unwrap(), 90_000);
        assert_eq!(parse_duration_ms("500ms").unwrap(), 500);
        assert_eq!(parse_duration_ms("1h").unwrap(), 3_600_000);
        assert_eq!(parse_duration_ms("10").unwrap(), 10_000);
        assert!(parse_duration_ms("s30").is_err());
        assert!(parse_duration_ms("30x").is_err());
    }

    #[test]
    fn test_condition_parse() {
        assert_eq!(Condition::parse("service_started"), Some(Condition::Started));
        assert_eq!(Condition::parse("service_healthy"), Some(Condition::Healthy));
        assert_eq!(
            Condition::parse("service_completed_successfully"),
            Some(Condition::CompletedSuccessfully)
        );
        assert_eq!(Condition::parse("unknown"), None);
    }

    #[test]
    fn test_condition_timeout_fatality() {
        assert!(!Condition::Started.timeout_is_fatal());
        assert!(Condition::Healthy.timeout_is_fatal());
        assert!(Condition::CompletedSuccessfully.timeout_is_fatal());
    }

    #[test]
    fn test_restart_policy_parse() {
        assert_eq!(RestartPolicy::parse("unless-stopped"), Some(RestartPolicy::UnlessStopped));
        assert_eq!(RestartPolicy::parse("on_failure"), Some(RestartPolicy::OnFailure));
        assert_eq!(RestartPolicy::parse("invalid"), None);
    }

    #[test]
    fn test_profile_activity() {
        let mut service = ServiceSpec::default();
        let empty = BTreeSet::new();
        let debug: BTreeSet<String> = ["debug".to_string()].into();

        // profilesが空なら常にアクティブ
        assert!(service.is_active(&empty));
        assert!(service.is_active(&debug));

        service.profiles.insert("debug".to_string());
        assert!(!service.is_active(&empty));
        assert!(service.is_active(&debug));
    }
}
