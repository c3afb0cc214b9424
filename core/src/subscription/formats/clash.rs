//! Clash / Clash.Meta YAML
//!
//! Mapping-rooted YAML 1.2 with the standard skeleton (`port`,
//! `socks-port`, `allow-lan`, `mode`, `log-level`) and one entry per proxy
//! following the de-facto Clash schema. Plain Clash predates VLESS and
//! Reality, so those proxies only appear in the Meta variant. Key order is
//! alphabetical within each mapping, which keeps the byte stream stable
//! for `If-Modified-Since`.

use super::{FormatGenerator, GeneratorOptions};
use crate::error::Result;
use crate::models::{Proxy, ProxyProtocol};
use serde_json::{json, Value};

pub struct Clash;
pub struct ClashMeta;

fn proxy_entry(proxy: &Proxy, meta: bool) -> Option<Value> {
    let s = &proxy.settings;
    let network = s.get_str("network", "tcp");
    let security = s.get_str("security", "none");

    let mut entry = match proxy.protocol {
        ProxyProtocol::Vmess => {
            let mut entry = json!({
                "name": proxy.name,
                "type": "vmess",
                "server": proxy.host,
                "port": proxy.port,
                "uuid": s.get_str("uuid", ""),
                "alterId": s.get_u64("alter_id", 0),
                "cipher": s.get_str("cipher", "auto"),
                "udp": true,
            });
            if security == "tls" {
                entry["tls"] = json!(true);
                let sni = s.get_str("sni", "");
                if !sni.is_empty() {
                    entry["servername"] = json!(sni);
                }
            }
            entry
        }
        ProxyProtocol::Vless => {
            if !meta {
                return None;
            }
            let mut entry = json!({
                "name": proxy.name,
                "type": "vless",
                "server": proxy.host,
                "port": proxy.port,
                "uuid": s.get_str("uuid", ""),
                "udp": true,
            });
            if security != "none" {
                entry["tls"] = json!(true);
            }
            let sni = s.get_str("sni", "");
            if !sni.is_empty() {
                entry["servername"] = json!(sni);
            }
            let flow = s.get_str("flow", "");
            if !flow.is_empty() {
                entry["flow"] = json!(flow);
            }
            if security == "reality" {
                entry["reality-opts"] = json!({
                    "public-key": s.get_str("public_key", ""),
                    "short-id": s.get_str("short_id", ""),
                });
                entry["client-fingerprint"] = json!("chrome");
            }
            entry
        }
        ProxyProtocol::Trojan => {
            let password = s.get_str("password", "");
            if password.is_empty() {
                return None;
            }
            let mut entry = json!({
                "name": proxy.name,
                "type": "trojan",
                "server": proxy.host,
                "port": proxy.port,
                "password": password,
                "udp": true,
            });
            let sni = s.get_str("sni", "");
            if !sni.is_empty() {
                entry["sni"] = json!(sni);
            }
            let alpn = s.get_str("alpn", "");
            if !alpn.is_empty() {
                entry["alpn"] = json!(alpn.split(',').collect::<Vec<_>>());
            }
            entry
        }
        ProxyProtocol::Shadowsocks => {
            let method = s.get_str("method", "");
            let password = s.get_str("password", "");
            if method.is_empty() || password.is_empty() {
                return None;
            }
            json!({
                "name": proxy.name,
                "type": "ss",
                "server": proxy.host,
                "port": proxy.port,
                "cipher": method,
                "password": password,
                "udp": true,
            })
        }
    };

    if network != "tcp"
        && matches!(proxy.protocol, ProxyProtocol::Vmess | ProxyProtocol::Vless)
    {
        entry["network"] = json!(network);
        if network == "ws" {
            let mut ws_opts = json!({ "path": s.get_str("path", "/") });
            let host = s.get_str("ws_host", "");
            if !host.is_empty() {
                ws_opts["headers"] = json!({ "Host": host });
            }
            entry["ws-opts"] = ws_opts;
        }
        if network == "grpc" {
            entry["grpc-opts"] = json!({
                "grpc-service-name": s.get_str("path", ""),
            });
        }
    }
    Some(entry)
}

fn generate(proxies: &[Proxy], options: &GeneratorOptions, meta: bool) -> Result<Vec<u8>> {
    let entries: Vec<Value> = proxies.iter().filter_map(|p| proxy_entry(p, meta)).collect();
    let names: Vec<Value> = entries.iter().map(|e| e["name"].clone()).collect();

    let mut doc = json!({
        "port": 7890,
        "socks-port": 7891,
        "allow-lan": false,
        "mode": "rule",
        "log-level": "info",
        "proxies": entries,
    });

    if options.include_proxy_groups {
        let mut select_members = vec![json!("Auto")];
        select_members.extend(names.iter().cloned());
        doc["proxy-groups"] = json!([
            {
                "name": "Proxy",
                "type": "select",
                "proxies": select_members,
            },
            {
                "name": "Auto",
                "type": "url-test",
                "url": "http://www.gstatic.com/generate_204",
                "interval": 300,
                "proxies": names,
            },
        ]);
        doc["rules"] = json!(["MATCH,Proxy"]);
    }

    Ok(serde_yaml::to_string(&doc)?.into_bytes())
}

impl FormatGenerator for Clash {
    fn generate(&self, proxies: &[Proxy], options: &GeneratorOptions) -> Result<Vec<u8>> {
        generate(proxies, options, false)
    }

    fn content_type(&self) -> &'static str {
        "text/yaml; charset=utf-8"
    }

    fn file_extension(&self) -> &'static str {
        "yaml"
    }
}

impl FormatGenerator for ClashMeta {
    fn generate(&self, proxies: &[Proxy], options: &GeneratorOptions) -> Result<Vec<u8>> {
        generate(proxies, options, true)
    }

    fn content_type(&self) -> &'static str {
        "text/yaml; charset=utf-8"
    }

    fn file_extension(&self) -> &'static str {
        "yaml"
    }
}
