//! Quantumult X server lines
//!
//! One line per proxy in the `type=host:port, key=value, ..., tag=name`
//! shape. Quantumult X speaks vmess, trojan and shadowsocks; VLESS rows
//! are skipped.

use super::{FormatGenerator, GeneratorOptions};
use crate::error::Result;
use crate::models::{Proxy, ProxyProtocol};

pub struct QuantumultX;

fn proxy_line(proxy: &Proxy) -> Option<String> {
    let s = &proxy.settings;
    match proxy.protocol {
        ProxyProtocol::Vmess => {
            let uuid = s.get_str("uuid", "");
            if uuid.is_empty() {
                return None;
            }
            let mut line = format!(
                "vmess={}:{}, method=chacha20-poly1305, password={uuid}",
                proxy.host, proxy.port
            );
            let tls = s.get_str("security", "none") == "tls";
            if s.get_str("network", "tcp") == "ws" {
                line.push_str(if tls { ", obfs=wss" } else { ", obfs=ws" });
                line.push_str(&format!(", obfs-uri={}", s.get_str("path", "/")));
                let host = s.get_str("ws_host", "");
                if !host.is_empty() {
                    line.push_str(&format!(", obfs-host={host}"));
                }
            } else if tls {
                line.push_str(", obfs=over-tls");
            }
            line.push_str(&format!(", tag={}", proxy.name));
            Some(line)
        }
        ProxyProtocol::Trojan => {
            let password = s.get_str("password", "");
            if password.is_empty() {
                return None;
            }
            let mut line = format!(
                "trojan={}:{}, password={password}, over-tls=true",
                proxy.host, proxy.port
            );
            let sni = s.get_str("sni", "");
            if !sni.is_empty() {
                line.push_str(&format!(", tls-host={sni}"));
            }
            line.push_str(&format!(", tag={}", proxy.name));
            Some(line)
        }
        ProxyProtocol::Shadowsocks => {
            let method = s.get_str("method", "");
            let password = s.get_str("password", "");
            if method.is_empty() || password.is_empty() {
                return None;
            }
            Some(format!(
                "shadowsocks={}:{}, method={method}, password={password}, tag={}",
                proxy.host, proxy.port, proxy.name
            ))
        }
        ProxyProtocol::Vless => None,
    }
}

impl FormatGenerator for QuantumultX {
    fn generate(&self, proxies: &[Proxy], _options: &GeneratorOptions) -> Result<Vec<u8>> {
        let lines: Vec<String> = proxies.iter().filter_map(proxy_line).collect();
        let mut out = lines.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        Ok(out.into_bytes())
    }

    fn content_type(&self) -> &'static str {
        "text/plain; charset=utf-8"
    }

    fn file_extension(&self) -> &'static str {
        "conf"
    }
}
