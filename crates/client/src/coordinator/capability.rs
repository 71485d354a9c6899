//! Environment probes: installed display mode, device class, touch handling.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static MOBILE_UA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Android|webOS|iPhone|iPad|iPod|BlackBerry|IEMobile|Opera Mini").expect("valid mobile pattern")
});
static ANDROID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)android").expect("valid android pattern"));
static IPAD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)ipad").expect("valid ipad pattern"));
static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)mobile|android|iphone").expect("valid phone pattern"));
static MOBILE_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)mobile").expect("valid mobile word pattern"));

/// Viewport content applied on mobile devices: pinch-zoom disabled.
pub const MOBILE_VIEWPORT: &str = "width=device-width, initial-scale=1, maximum-scale=1, user-scalable=no";

/// Display mode reported by the page's media query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayMode {
    #[default]
    Browser,
    MinimalUi,
    Standalone,
    Fullscreen,
}

/// What the page can tell about how it was launched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayContext {
    pub display_mode: DisplayMode,
    /// Legacy iOS home-screen flag.
    pub navigator_standalone: bool,
}

/// True when the app runs installed rather than in a browser tab.
pub fn is_standalone(context: &DisplayContext) -> bool {
    context.display_mode == DisplayMode::Standalone || context.navigator_standalone
}

pub fn is_mobile(user_agent: &str) -> bool {
    MOBILE_UA.is_match(user_agent)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Mobile,
    Tablet,
    Desktop,
}

impl DeviceClass {
    /// Classify a user-agent string.
    ///
    /// iPads and Android devices without a later `Mobile` token are tablets.
    pub fn from_user_agent(user_agent: &str) -> Self {
        if IPAD.is_match(user_agent) || is_android_tablet(user_agent) {
            DeviceClass::Tablet
        } else if PHONE.is_match(user_agent) {
            DeviceClass::Mobile
        } else {
            DeviceClass::Desktop
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Mobile => "mobile",
            DeviceClass::Tablet => "tablet",
            DeviceClass::Desktop => "desktop",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_android_tablet(user_agent: &str) -> bool {
    ANDROID
        .find_iter(user_agent)
        .any(|found| !MOBILE_WORD.is_match(&user_agent[found.end()..]))
}

/// Page adjustments for touch devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MobileOptimization {
    /// Replacement `<meta name="viewport">` content.
    pub viewport: &'static str,
    /// Whether multi-touch starts should be intercepted with [`suppress_touch_default`].
    pub guard_multi_touch: bool,
}

/// Adjustments for the given user agent, or `None` off mobile.
pub fn optimize_for_mobile(user_agent: &str) -> Option<MobileOptimization> {
    is_mobile(user_agent).then_some(MobileOptimization { viewport: MOBILE_VIEWPORT, guard_multi_touch: true })
}

/// Whether a touch start with this many touches should have its default
/// (pinch zoom) suppressed.
pub fn suppress_touch_default(touches: usize) -> bool {
    touches > 1
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 Mobile/15E148";
    const IPAD_UA: &str = "Mozilla/5.0 (iPad; CPU OS 16_6 like Mac OS X) AppleWebKit/605.1.15 Mobile/15E148";
    const ANDROID_PHONE: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 Chrome/120.0 Mobile Safari/537.36";
    const ANDROID_TABLET: &str = "Mozilla/5.0 (Linux; Android 13; SM-X700) AppleWebKit/537.36 Chrome/120.0 Safari/537.36";
    const DESKTOP: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 Chrome/120.0 Safari/537.36";

    #[test]
    fn test_device_class() {
        assert_eq!(DeviceClass::from_user_agent(IPHONE), DeviceClass::Mobile);
        assert_eq!(DeviceClass::from_user_agent(IPAD_UA), DeviceClass::Tablet);
        assert_eq!(DeviceClass::from_user_agent(ANDROID_PHONE), DeviceClass::Mobile);
        assert_eq!(DeviceClass::from_user_agent(ANDROID_TABLET), DeviceClass::Tablet);
        assert_eq!(DeviceClass::from_user_agent(DESKTOP), DeviceClass::Desktop);
        assert_eq!(DeviceClass::Tablet.to_string(), "tablet");
    }

    #[test]
    fn test_is_mobile() {
        assert!(is_mobile(IPHONE));
        assert!(is_mobile(IPAD_UA));
        assert!(is_mobile("Opera/9.80 (J2ME/MIDP; Opera Mini/9.80)"));
        assert!(!is_mobile(DESKTOP));
    }

    #[test]
    fn test_standalone() {
        assert!(!is_standalone(&DisplayContext::default()));
        assert!(is_standalone(&DisplayContext { display_mode: DisplayMode::Standalone, navigator_standalone: false }));
        assert!(is_standalone(&DisplayContext { display_mode: DisplayMode::Browser, navigator_standalone: true }));
        assert!(!is_standalone(&DisplayContext { display_mode: DisplayMode::Fullscreen, navigator_standalone: false }));
    }

    #[test]
    fn test_mobile_optimization() {
        let optimization = optimize_for_mobile(ANDROID_PHONE).unwrap();
        assert_eq!(optimization.viewport, MOBILE_VIEWPORT);
        assert!(optimization.guard_multi_touch);
        assert!(optimize_for_mobile(DESKTOP).is_none());

        assert!(!suppress_touch_default(1));
        assert!(suppress_touch_default(2));
    }
}
