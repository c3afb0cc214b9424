//! V2rayN share-link list (also served to Shadowrocket)
//!
//! One URI per proxy, newline-joined, then Base64 with the standard
//! alphabet. The URI shapes follow the de-facto share-link conventions:
//!
//! - `vmess://<base64(json)>`
//! - `vless://uuid@host:port?params#name`
//! - `trojan://password@host:port?params#name`
//! - `ss://base64url(method:password)@host:port#name`

use super::{encode_component, FormatGenerator, GeneratorOptions};
use crate::error::Result;
use crate::models::{Proxy, ProxyProtocol};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;

pub struct V2rayN;

/// Shadowrocket imports the same Base64 share-link list.
pub struct Shadowrocket;

/// Build the share URI for one proxy, `None` when the settings are too
/// incomplete to produce a usable link.
fn share_uri(proxy: &Proxy) -> Option<String> {
    match proxy.protocol {
        ProxyProtocol::Vmess => Some(vmess_uri(proxy)),
        ProxyProtocol::Vless => vless_uri(proxy),
        ProxyProtocol::Trojan => trojan_uri(proxy),
        ProxyProtocol::Shadowsocks => shadowsocks_uri(proxy),
    }
}

fn vmess_uri(proxy: &Proxy) -> String {
    let s = &proxy.settings;
    let security = s.get_str("security", "none");
    let payload = serde_json::json!({
        "v": "2",
        "ps": proxy.name,
        "add": proxy.host,
        "port": proxy.port.to_string(),
        "id": s.get_str("uuid", ""),
        "aid": s.get_u64("alter_id", 0).to_string(),
        "scy": s.get_str("cipher", "auto"),
        "net": s.get_str("network", "tcp"),
        "type": "none",
        "host": s.get_str("ws_host", ""),
        "path": s.get_str("path", ""),
        "tls": if security == "tls" { "tls" } else { "" },
        "sni": s.get_str("sni", ""),
    });
    format!("vmess://{}", STANDARD.encode(payload.to_string()))
}

fn vless_uri(proxy: &Proxy) -> Option<String> {
    let s = &proxy.settings;
    let uuid = s.get_str("uuid", "");
    if uuid.is_empty() {
        return None;
    }
    let mut params = vec![
        ("type", s.get_str("network", "tcp").to_string()),
        ("security", s.get_str("security", "none").to_string()),
    ];
    for (key, setting) in [
        ("sni", "sni"),
        ("host", "ws_host"),
        ("path", "path"),
        ("flow", "flow"),
        ("pbk", "public_key"),
        ("sid", "short_id"),
    ] {
        let value = s.get_str(setting, "");
        if !value.is_empty() {
            params.push((key, value.to_string()));
        }
    }
    let query: Vec<String> = params
        .iter()
        .map(|(k, v)| format!("{k}={}", encode_component(v)))
        .collect();
    Some(format!(
        "vless://{uuid}@{}:{}?{}#{}",
        proxy.host,
        proxy.port,
        query.join("&"),
        encode_component(&proxy.name)
    ))
}

fn trojan_uri(proxy: &Proxy) -> Option<String> {
    let s = &proxy.settings;
    let password = s.get_str("password", "");
    if password.is_empty() {
        return None;
    }
    let mut query = Vec::new();
    let sni = s.get_str("sni", "");
    if !sni.is_empty() {
        query.push(format!("sni={}", encode_component(sni)));
    }
    let alpn = s.get_str("alpn", "");
    if !alpn.is_empty() {
        query.push(format!("alpn={}", encode_component(alpn)));
    }
    let query = if query.is_empty() {
        String::new()
    } else {
        format!("?{}", query.join("&"))
    };
    Some(format!(
        "trojan://{}@{}:{}{query}#{}",
        encode_component(password),
        proxy.host,
        proxy.port,
        encode_component(&proxy.name)
    ))
}

fn shadowsocks_uri(proxy: &Proxy) -> Option<String> {
    let s = &proxy.settings;
    let method = s.get_str("method", "");
    let password = s.get_str("password", "");
    if method.is_empty() || password.is_empty() {
        return None;
    }
    let userinfo = URL_SAFE_NO_PAD.encode(format!("{method}:{password}"));
    Some(format!(
        "ss://{userinfo}@{}:{}#{}",
        proxy.host,
        proxy.port,
        encode_component(&proxy.name)
    ))
}

fn generate_list(proxies: &[Proxy]) -> Vec<u8> {
    let uris: Vec<String> = proxies.iter().filter_map(share_uri).collect();
    STANDARD.encode(uris.join("\n")).into_bytes()
}

impl FormatGenerator for V2rayN {
    fn generate(&self, proxies: &[Proxy], _options: &GeneratorOptions) -> Result<Vec<u8>> {
        Ok(generate_list(proxies))
    }

    fn content_type(&self) -> &'static str {
        "text/plain; charset=utf-8"
    }

    fn file_extension(&self) -> &'static str {
        "txt"
    }
}

impl FormatGenerator for Shadowrocket {
    fn generate(&self, proxies: &[Proxy], _options: &GeneratorOptions) -> Result<Vec<u8>> {
        Ok(generate_list(proxies))
    }

    fn content_type(&self) -> &'static str {
        "text/plain; charset=utf-8"
    }

    fn file_extension(&self) -> &'static str {
        "txt"
    }
}
