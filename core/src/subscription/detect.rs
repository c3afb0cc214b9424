//! Client detection from the `User-Agent` header
//!
//! Substring checks over the lower-cased UA, in a fixed priority order. An
//! explicit `?format=` query parameter always wins over detection; that
//! override is resolved by the caller before detection runs.

use serde::{Deserialize, Serialize};

/// The supported client configuration shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientFormat {
    V2rayN,
    Clash,
    ClashMeta,
    Shadowrocket,
    Surge,
    QuantumultX,
    SingBox,
}

impl ClientFormat {
    /// Name accepted by the `?format=` query parameter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V2rayN => "v2rayn",
            Self::Clash => "clash",
            Self::ClashMeta => "clashmeta",
            Self::Shadowrocket => "shadowrocket",
            Self::Surge => "surge",
            Self::QuantumultX => "quantumultx",
            Self::SingBox => "singbox",
        }
    }

    /// Parse a `?format=` value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "v2rayn" | "v2rayng" => Some(Self::V2rayN),
            "clash" => Some(Self::Clash),
            "clashmeta" | "clash-meta" => Some(Self::ClashMeta),
            "shadowrocket" => Some(Self::Shadowrocket),
            "surge" => Some(Self::Surge),
            "quantumultx" | "quantumult-x" => Some(Self::QuantumultX),
            "singbox" | "sing-box" => Some(Self::SingBox),
            _ => None,
        }
    }
}

/// Map a `User-Agent` to the best-fitting format.
///
/// Priority order matters: Clash derivatives identify themselves loudly
/// and must win over the generic fallthrough, and `mihomo` is ClashMeta
/// under a new name. Anything unrecognized gets the V2rayN share link
/// list, which every client can import.
#[must_use]
pub fn detect_client_format(user_agent: &str) -> ClientFormat {
    let ua = user_agent.to_lowercase();
    if ua.contains("clash") {
        if ua.contains("meta") {
            return ClientFormat::ClashMeta;
        }
        return ClientFormat::Clash;
    }
    if ua.contains("mihomo") {
        return ClientFormat::ClashMeta;
    }
    if ua.contains("shadowrocket") {
        return ClientFormat::Shadowrocket;
    }
    if ua.contains("surge") {
        return ClientFormat::Surge;
    }
    if ua.contains("quantumult") {
        return ClientFormat::QuantumultX;
    }
    if ua.contains("sing-box") || ua.contains("singbox") {
        return ClientFormat::SingBox;
    }
    ClientFormat::V2rayN
}
