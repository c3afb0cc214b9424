//! Surge proxy list
//!
//! A `[Proxy]` section with one line per proxy in the
//! `name = type, host, port, key=value, ...` shape. Surge has no VLESS
//! support, so those proxies are skipped.

use super::{FormatGenerator, GeneratorOptions};
use crate::error::Result;
use crate::models::{Proxy, ProxyProtocol};

pub struct Surge;

fn proxy_line(proxy: &Proxy) -> Option<String> {
    let s = &proxy.settings;
    match proxy.protocol {
        ProxyProtocol::Shadowsocks => {
            let method = s.get_str("method", "");
            let password = s.get_str("password", "");
            if method.is_empty() || password.is_empty() {
                return None;
            }
            Some(format!(
                "{} = ss, {}, {}, encrypt-method={method}, password={password}",
                proxy.name, proxy.host, proxy.port
            ))
        }
        ProxyProtocol::Trojan => {
            let password = s.get_str("password", "");
            if password.is_empty() {
                return None;
            }
            let mut line = format!(
                "{} = trojan, {}, {}, password={password}",
                proxy.name, proxy.host, proxy.port
            );
            let sni = s.get_str("sni", "");
            if !sni.is_empty() {
                line.push_str(&format!(", sni={sni}"));
            }
            Some(line)
        }
        ProxyProtocol::Vmess => {
            let uuid = s.get_str("uuid", "");
            if uuid.is_empty() {
                return None;
            }
            let mut line = format!(
                "{} = vmess, {}, {}, username={uuid}",
                proxy.name, proxy.host, proxy.port
            );
            if s.get_str("security", "none") == "tls" {
                line.push_str(", tls=true");
                let sni = s.get_str("sni", "");
                if !sni.is_empty() {
                    line.push_str(&format!(", sni={sni}"));
                }
            }
            if s.get_str("network", "tcp") == "ws" {
                line.push_str(&format!(", ws=true, ws-path={}", s.get_str("path", "/")));
                let host = s.get_str("ws_host", "");
                if !host.is_empty() {
                    line.push_str(&format!(", ws-headers=Host:{host}"));
                }
            }
            Some(line)
        }
        ProxyProtocol::Vless => None,
    }
}

impl FormatGenerator for Surge {
    fn generate(&self, proxies: &[Proxy], _options: &GeneratorOptions) -> Result<Vec<u8>> {
        let mut out = String::from("[Proxy]\n");
        for line in proxies.iter().filter_map(proxy_line) {
            out.push_str(&line);
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
    fn test_header_and_line_shapes() {
        let mut ss = ProxySettings::new();
        ss.set("method", "aes-256-gcm").set("password", "pw");
        let mut trojan = ProxySettings::new();
        trojan.set("password", "P1").set("sni", "a.example");

        let body = Surge
            .generate(
                &[
                    proxy("ss-node", ProxyProtocol::Shadowsocks, ss),
                    proxy("tj-node", ProxyProtocol::Trojan, trojan),
                ],
                &GeneratorOptions::default(),
            )
            .unwrap();
        let text = String::from_utf8(body).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "[Proxy]");
        assert_eq!(
            lines[1],
            "ss-node = ss, a.example, 443, encrypt-method=aes-256-gcm, password=pw"
        );
        assert_eq!(
            lines[2],
            "tj-node = trojan, a.example, 443, password=P1, sni=a.example"
        );
    }

    #[test]
    fn test_vless_skipped() {
        let mut settings = ProxySettings::new();
        settings.set("uuid", "U1");
        let body = Surge
            .generate(
                &[proxy("v", ProxyProtocol::Vless, settings)],
                &GeneratorOptions::default(),
            )
            .unwrap();
        assert_eq!(String::from_utf8(body).unwrap(), "[Proxy]\n");
    }

    #[test]
    fn test_vmess_ws_line() {
        let mut settings = ProxySettings::new();
        settings
            .set("uuid", "U1")
            .set("security", "tls")
            .set("network", "ws")
            .set("path", "/ws")
            .set("ws_host", "cdn.example");
        let body = Surge
            .generate(
                &[proxy("vm", ProxyProtocol::Vmess, settings)],
                &GeneratorOptions::default(),
            )
            .unwrap();
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains(
            "vm = vmess, a.example, 443, username=U1, tls=true, ws=true, ws-path=/ws, ws-headers=Host:cdn.example"
        ));
    }
}
