//! ポート定義

use crate::error::{ComposeError, Result};
use serde::{Deserialize, Serialize};

/// ポート公開定義
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSpec {
    pub host: u16,
    pub container: u16,
    #[serde(default)]
    pub protocol: Protocol,
    pub host_ip: Option<String>,
}

/// プロトコル種別
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    /// 文字列からProtocolをパース
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "udp" => Protocol::Udp,
            _ => Protocol::Tcp,
        }
    }

    /// Docker APIで使用する文字列に変換
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

impl PortSpec {
    /// compose短縮記法をパース
    ///
    /// 対応形式:
    /// - `"80"` （ホスト＝コンテナ）
    /// - `"8080:80"`
    /// - `"8080:80/udp"`
    /// - `"127.0.0.1:8080:80"`
    pub fn parse_short(s: &str) -> Result<Self> {
        let (spec, protocol) = match s.split_once('/') {
            Some((spec, proto)) => (spec, Protocol::parse(proto)),
            None => (s, Protocol::Tcp),
        };

        let parts: Vec<&str> = spec.split(':').collect();
        let parse_port = |p: &str| -> Result<u16> {
            p.trim()
                .parse::<u16>()
                .map_err(|_| ComposeError::InvalidPort(s.to_string()))
        };

        match parts.as_slice() {
            [container] => {
                let port = parse_port(container)?;
                Ok(Self {
                    host: port,
                    container: port,
                    protocol,
                    host_ip: None,
                })
            }
            [host, container] => Ok(Self {
                host: parse_port(host)?,
                container: parse_port(container)?,
                protocol,
                host_ip: None,
            }),
            [ip, host, container] => Ok(Self {
                host: parse_port(host)?,
                container: parse_port(container)?,
                protocol,
                host_ip: Some(ip.to_string()),
            }),
            _ => Err(ComposeError::InvalidPort(s.to_string())),
        }
    }

    /// Docker APIのポートキー表現 (`80/tcp`)
    pub fn container_key(&self) -> String {
        format!("{}/{}", self.container, self.protocol.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_host_container() {
        let port = PortSpec::parse_short("8080:80").unwrap();
        assert_eq!(port.host, 8080);
        assert_eq!(port.container, 80);
        assert_eq!(port.protocol, Protocol::Tcp);
        assert_eq!(port.host_ip, None);
    }

    #[test]
    fn test_parse_short_with_udp() {
        let port = PortSpec::parse_short("53:53/udp").unwrap();
        assert_eq!(port.protocol, Protocol::Udp);
        assert_eq!(port.container_key(), "53/udp");
    }

    #[test]
    fn test_parse_short_with_host_ip() {
        let port = PortSpec::parse_short("127.0.0.1:5432:5432").unwrap();
        assert_eq!(port.host_ip, Some("127.0.0.1".to_string()));
        assert_eq!(port.host, 5432);
    }

    #[test]
    fn test_parse_short_container_only() {
        let port = PortSpec::parse_short("80").unwrap();
        assert_eq!(port.host, 80);
        assert_eq!(port.container, 80);
    }

    #[test]
    fn test_parse_short_invalid() {
        assert!(PortSpec::parse_short("abc:80").is_err());
        assert!(PortSpec::parse_short("1:2:3:4").is_err());
        assert!(PortSpec::parse_short("99999:80").is_err());
    }
}
