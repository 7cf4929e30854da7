//! マウント定義とトップレベルボリューム定義

use crate::error::{ComposeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// サービスのマウント定義
///
/// compose の volumes 項目は名前付きボリューム・バインド・匿名ボリュームの
/// 3形態を取る。ホスト側が `/` `./` `../` `~` で始まる場合はバインド扱い。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MountSpec {
    /// 名前付きボリューム (`data:/var/lib/data`)
    Named {
        source: String,
        target: String,
        read_only: bool,
    },
    /// バインドマウント (`./conf:/etc/conf:ro`)
    Bind {
        source: String,
        target: String,
        read_only: bool,
    },
    /// 匿名ボリューム (`/var/cache`)
    Anonymous { target: String },
}

impl MountSpec {
    /// compose短縮記法をパース
    pub fn parse_short(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [target] => {
                if target.is_empty() {
                    return Err(ComposeError::InvalidMount(s.to_string()));
                }
                Ok(Self::Anonymous {
                    target: target.to_string(),
                })
            }
            [source, target] | [source, target, _] => {
                let read_only = matches!(parts.as_slice(), [_, _, "ro"]);
                if let [_, _, mode] = parts.as_slice() {
                    if *mode != "ro" && *mode != "rw" {
                        return Err(ComposeError::InvalidMount(s.to_string()));
                    }
                }
                if source.is_empty() || target.is_empty() {
                    return Err(ComposeError::InvalidMount(s.to_string()));
                }
                if is_host_path(source) {
                    Ok(Self::Bind {
                        source: source.to_string(),
                        target: target.to_string(),
                        read_only,
                    })
                } else {
                    Ok(Self::Named {
                        source: source.to_string(),
                        target: target.to_string(),
                        read_only,
                    })
                }
            }
            _ => Err(ComposeError::InvalidMount(s.to_string())),
        }
    }

    /// マウント先のコンテナパス
    pub fn target(&self) -> &str {
        match self {
            Self::Named { target, .. } | Self::Bind { target, .. } | Self::Anonymous { target } => {
                target
            }
        }
    }

    /// 名前付きボリュームの場合、そのボリューム名
    pub fn volume_name(&self) -> Option<&str> {
        match self {
            Self::Named { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn is_host_path(source: &str) -> bool {
    source.starts_with('/')
        || source.starts_with("./")
        || source.starts_with("../")
        || source.starts_with('~')
        || source.starts_with('.')
}

/// トップレベルのボリューム定義
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub driver: Option<String>,
    #[serde(default)]
    pub driver_opts: BTreeMap<String, String>,
    /// external指定時の解決済みボリューム名
    pub external: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl VolumeSpec {
    pub fn is_external(&self) -> bool {
        self.external.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_named_volume() {
        let mount = MountSpec::parse_short("pgdata:/var/lib/postgresql/data").unwrap();
        assert_eq!(
            mount,
            MountSpec::Named {
                source: "pgdata".to_string(),
                target: "/var/lib/postgresql/data".to_string(),
                read_only: false,
            }
        );
        assert_eq!(mount.volume_name(), Some("pgdata"));
    }

    #[test]
    fn test_parse_bind_mount_read_only() {
        let mount = MountSpec::parse_short("./conf:/etc/nginx/conf.d:ro").unwrap();
        assert_eq!(
            mount,
            MountSpec::Bind {
                source: "./conf".to_string(),
                target: "/etc/nginx/conf.d".to_string(),
                read_only: true,
            }
        );
    }

    #[test]
    fn test_parse_anonymous_volume() {
        let mount = MountSpec::parse_short("/var/cache").unwrap();
        assert_eq!(
            mount,
            MountSpec::Anonymous {
                target: "/var/cache".to_string()
            }
        );
        assert_eq!(mount.volume_name(), None);
    }

    #[test]
    fn test_parse_invalid_mode() {
        assert!(MountSpec::parse_short("data:/data:rx").is_err());
        assert!(MountSpec::parse_short("a:b:c:d").is_err());
        assert!(MountSpec::parse_short("").is_err());
    }
}
