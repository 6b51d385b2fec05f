//! Coarse device classification from the declared user-agent string.
//!
//! Not exact detection, a best-effort bucket. The rule table is closed and
//! data-driven so it can be extended without touching aggregation logic.

use serde::{Deserialize, Serialize};

/// Coarse device category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Desktop,
    Mobile,
    Tablet,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
            Self::Tablet => "tablet",
        }
    }
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered substring rules; first match wins. Tablet markers come before
/// mobile markers because tablet UAs usually carry both.
const UA_RULES: &[(&str, DeviceClass)] = &[
    ("iPad", DeviceClass::Tablet),
    ("Tablet", DeviceClass::Tablet),
    ("Kindle", DeviceClass::Tablet),
    ("Silk/", DeviceClass::Tablet),
    ("iPhone", DeviceClass::Mobile),
    ("Mobile", DeviceClass::Mobile),
    ("Android", DeviceClass::Mobile),
    ("Opera Mini", DeviceClass::Mobile),
    ("IEMobile", DeviceClass::Mobile),
];

/// Classifies a declared user agent into a coarse device bucket.
/// Missing or unmatched user agents default to desktop.
pub fn classify_user_agent(user_agent: Option<&str>) -> DeviceClass {
    let Some(ua) = user_agent else {
        return DeviceClass::Desktop;
    };
    for (marker, class) in UA_RULES {
        if ua.contains(marker) {
            return *class;
        }
    }
    DeviceClass::Desktop
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipad_is_tablet_not_mobile() {
        let ua = "Mozilla/5.0 (iPad; CPU OS 16_0 like Mac OS X) Mobile/15E148";
        assert_eq!(classify_user_agent(Some(ua)), DeviceClass::Tablet);
    }

    #[test]
    fn android_phone_is_mobile() {
        let ua = "Mozilla/5.0 (Linux; Android 13; Pixel 7) Mobile Safari/537.36";
        assert_eq!(classify_user_agent(Some(ua)), DeviceClass::Mobile);
    }

    #[test]
    fn unknown_defaults_to_desktop() {
        assert_eq!(classify_user_agent(None), DeviceClass::Desktop);
        assert_eq!(
            classify_user_agent(Some("Mozilla/5.0 (X11; Linux x86_64)")),
            DeviceClass::Desktop
        );
    }
}
