//! Per-client content generators
//!
//! Each generator is a pure function from a proxy list and options to
//! bytes, plus the content type and file extension the HTTP layer needs.
//! Proxy `settings` is an open map; generators read known keys through the
//! typed accessors and skip proxies the format cannot represent. An empty
//! proxy list produces the format's valid empty container.

pub mod clash;
pub mod quantumultx;
pub mod singbox;
pub mod surge;
pub mod v2rayn;

use super::detect::ClientFormat;
use crate::error::Result;
use crate::models::Proxy;

/// Options shared by every generator
#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    /// Shown as the profile title and used for the download filename
    pub subscription_name: String,
    /// Emit auto-generated select/url-test groups where the format has them
    pub include_proxy_groups: bool,
    /// Advertised refresh interval in hours
    pub update_interval: u32,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            subscription_name: "V Panel".to_string(),
            include_proxy_groups: true,
            update_interval: super::PROFILE_UPDATE_INTERVAL_HOURS,
        }
    }
}

/// A pure `(proxies, options) -> bytes` content generator
pub trait FormatGenerator: Send + Sync {
    fn generate(&self, proxies: &[Proxy], options: &GeneratorOptions) -> Result<Vec<u8>>;
    fn content_type(&self) -> &'static str;
    fn file_extension(&self) -> &'static str;
}

/// Resolve the generator for a detected or requested format.
#[must_use]
pub fn generator_for(format: ClientFormat) -> &'static dyn FormatGenerator {
    match format {
        ClientFormat::V2rayN => &v2rayn::V2rayN,
        ClientFormat::Shadowrocket => &v2rayn::Shadowrocket,
        ClientFormat::Clash => &clash::Clash,
        ClientFormat::ClashMeta => &clash::ClashMeta,
        ClientFormat::SingBox => &singbox::SingBox,
        ClientFormat::Surge => &surge::Surge,
        ClientFormat::QuantumultX => &quantumultx::QuantumultX,
    }
}

/// Percent-encode a URI component (fragment names, query values).
/// Unreserved characters pass through untouched.
#[must_use]
pub(crate) fn encode_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_component() {
        assert_eq!(encode_component("plain-name_1.2~x"), "plain-name_1.2~x");
        assert_eq!(encode_component("a b"), "a%20b");
        assert_eq!(encode_component("节点"), "%E8%8A%82%E7%82%B9");
        assert_eq!(encode_component("a#b?c"), "a%23b%3Fc");
    }

    #[test]
    fn test_generator_dispatch_content_types() {
        assert_eq!(
            generator_for(ClientFormat::Clash).content_type(),
            "text/yaml; charset=utf-8"
        );
        assert_eq!(
            generator_for(ClientFormat::SingBox).content_type(),
            "application/json; charset=utf-8"
        );
        assert_eq!(
            generator_for(ClientFormat::V2rayN).content_type(),
            "text/plain; charset=utf-8"
        );
        assert_eq!(generator_for(ClientFormat::Surge).file_extension(), "conf");
    }
}
