//! Sing-box outbound list
//!
//! JSON with a root `{"outbounds": [...]}`, 2-space indent, one object per
//! proxy carrying `type`, `tag`, `server`, `server_port` and the
//! protocol-specific credential fields.

use super::{FormatGenerator, GeneratorOptions};
use crate::error::Result;
use crate::models::{Proxy, ProxyProtocol};
use serde_json::{json, Value};

pub struct SingBox;

fn outbound(proxy: &Proxy) -> Option<Value> {
    let s = &proxy.settings;
    let security = s.get_str("security", "none");

    let mut entry = match proxy.protocol {
        ProxyProtocol::Vmess => json!({
            "type": "vmess",
            "tag": proxy.name,
            "server": proxy.host,
            "server_port": proxy.port,
            "uuid": s.get_str("uuid", ""),
            "security": s.get_str("cipher", "auto"),
            "alter_id": s.get_u64("alter_id", 0),
        }),
        ProxyProtocol::Vless => {
            let uuid = s.get_str("uuid", "");
            if uuid.is_empty() {
                return None;
            }
            let mut entry = json!({
                "type": "vless",
                "tag": proxy.name,
                "server": proxy.host,
                "server_port": proxy.port,
                "uuid": uuid,
            });
            let flow = s.get_str("flow", "");
            if !flow.is_empty() {
                entry["flow"] = json!(flow);
            }
            entry
        }
        ProxyProtocol::Trojan => {
            let password = s.get_str("password", "");
            if password.is_empty() {
                return None;
            }
            json!({
                "type": "trojan",
                "tag": proxy.name,
                "server": proxy.host,
                "server_port": proxy.port,
                "password": password,
            })
        }
        ProxyProtocol::Shadowsocks => {
            let method = s.get_str("method", "");
            let password = s.get_str("password", "");
            if method.is_empty() || password.is_empty() {
                return None;
            }
            json!({
                "type": "shadowsocks",
                "tag": proxy.name,
                "server": proxy.host,
                "server_port": proxy.port,
                "method": method,
                "password": password,
            })
        }
    };

    if security != "none" && proxy.protocol != ProxyProtocol::Shadowsocks {
        let mut tls = json!({ "enabled": true });
        let sni = s.get_str("sni", "");
        if !sni.is_empty() {
            tls["server_name"] = json!(sni);
        }
        if security == "reality" {
            tls["reality"] = json!({
                "enabled": true,
                "public_key": s.get_str("public_key", ""),
                "short_id": s.get_str("short_id", ""),
            });
            tls["utls"] = json!({ "enabled": true, "fingerprint": "chrome" });
        }
        entry["tls"] = tls;
    }

    let network = s.get_str("network", "tcp");
    if network == "ws" {
        let mut transport = json!({
            "type": "ws",
            "path": s.get_str("path", "/"),
        });
        let host = s.get_str("ws_host", "");
        if !host.is_empty() {
            transport["headers"] = json!({ "Host": host });
        }
        entry["transport"] = transport;
    } else if network == "grpc" {
        entry["transport"] = json!({
            "type": "grpc",
            "service_name": s.get_str("path", ""),
        });
    }

    Some(entry)
}

impl FormatGenerator for SingBox {
    fn generate(&self, proxies: &[Proxy], _options: &GeneratorOptions) -> Result<Vec<u8>> {
        let outbounds: Vec<Value> = proxies.iter().filter_map(outbound).collect();
        let doc = json!({ "outbounds": outbounds });
        Ok(serde_json::to_string_pretty(&doc)?.into_bytes())
    }

    fn content_type(&self) -> &'static str {
        "application/json; charset=utf-8"
    }

    fn file_extension(&self) -> &'static str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProxySettings;
    use chrono::Utc;

    fn proxy(name: &str, protocol: ProxyProtocol, settings: ProxySettings) -> Proxy {
        Proxy {
            id: 1,
            user_id: 1,
            name: name.to_string(),
            remark: None,
            protocol,
            host: "a.example".to_string(),
            port: 443,
            settings,
            enabled: true,
            node_id: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_root_shape_and_indent() {
        let body = SingBox
            .generate(&[], &GeneratorOptions::default())
            .unwrap();
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with("{\n  \"outbounds\": []"));
        let doc: Value = serde_json::from_str(&text).unwrap();
        assert!(doc["outbounds"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_vless_outbound_round_trip() {
        let mut settings = ProxySettings::new();
        settings
            .set("uuid", "U1")
            .set("security", "tls")
            .set("sni", "a.example")
            .set("flow", "xtls-rprx-vision");
        let body = SingBox
            .generate(
                &[proxy("edge", ProxyProtocol::Vless, settings)],
                &GeneratorOptions::default(),
            )
            .unwrap();
        let doc: Value = serde_json::from_slice(&body).unwrap();
        let outbound = &doc["outbounds"][0];
        assert_eq!(outbound["type"], "vless");
        assert_eq!(outbound["tag"], "edge");
        assert_eq!(outbound["server"], "a.example");
        assert_eq!(outbound["server_port"], 443);
        assert_eq!(outbound["uuid"], "U1");
        assert_eq!(outbound["flow"], "xtls-rprx-vision");
        assert_eq!(outbound["tls"]["enabled"], true);
        assert_eq!(outbound["tls"]["server_name"], "a.example");
    }

    #[test]
    fn test_shadowsocks_and_trojan_outbounds() {
        let mut ss = ProxySettings::new();
        ss.set("method", "aes-256-gcm").set("password", "pw");
        let mut trojan = ProxySettings::new();
        trojan.set("password", "P1").set("security", "tls");

        let body = SingBox
            .generate(
                &[
                    proxy("s", ProxyProtocol::Shadowsocks, ss),
                    proxy("t", ProxyProtocol::Trojan, trojan),
                ],
                &GeneratorOptions::default(),
            )
            .unwrap();
        let doc: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(doc["outbounds"][0]["method"], "aes-256-gcm");
        assert_eq!(doc["outbounds"][0]["password"], "pw");
        assert_eq!(doc["outbounds"][1]["type"], "trojan");
        assert_eq!(doc["outbounds"][1]["password"], "P1");
    }

    #[test]
    fn test_ws_transport() {
        let mut settings = ProxySettings::new();
        settings
            .set("uuid", "U1")
            .set("network", "ws")
            .set("path", "/ws")
            .set("ws_host", "cdn.example");
        let body = SingBox
            .generate(
                &[proxy("w", ProxyProtocol::Vmess, settings)],
                &GeneratorOptions::default(),
            )
            .unwrap();
        let doc: Value = serde_json::from_slice(&body).unwrap();
        let transport = &doc["outbounds"][0]["transport"];
        assert_eq!(transport["type"], "ws");
        assert_eq!(transport["path"], "/ws");
        assert_eq!(transport["headers"]["Host"], "cdn.example");
    }
}
