//! Provider selection for one capability.
//!
//! ```text
//! requested provider ── registered & healthy? ──yes──► use it (Requested)
//!        │ no (reported as `overridden`)
//!        ▼
//! sticky provider ───── healthy? ──yes──► use it
//!        │ no / none
//!        ▼
//! first healthy provider in priority order (Unhealthy / Initial)
//!        │ none
//!        ▼
//! NoHealthyProvider
//! ```

use std::time::Duration;

use super::SwitchReason;
use crate::config::CapabilitySettings;
use crate::error::DispatchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Selection {
    pub(crate) provider: String,
    pub(crate) overridden: Option<String>,
    pub(crate) reason: SwitchReason,
}

/// Routing state of one capability, owned by its worker.
#[derive(Debug, Clone)]
pub(crate) struct CapabilityRoute {
    pub(crate) capability: String,
    /// Highest priority first.
    pub(crate) providers: Vec<String>,
    pub(crate) fallback: bool,
    pub(crate) timeout: Duration,
    pub(crate) sticky: Option<String>,
}

impl CapabilityRoute {
    pub(crate) fn new(capability: &str, settings: CapabilitySettings) -> Self {
        Self {
            capability: capability.to_string(),
            providers: settings.providers,
            fallback: settings.fallback,
            timeout: settings.timeout,
            sticky: None,
        }
    }

    pub(crate) fn has_provider(&self, provider: &str) -> bool {
        self.providers.iter().any(|p| p == provider)
    }

    pub(crate) fn select(
        &self,
        requested: Option<&str>,
        healthy: impl Fn(&str) -> bool,
    ) -> Result<Selection, DispatchError> {
        let mut overridden = None;
        if let Some(req) = requested {
            if self.has_provider(req) && healthy(req) {
                return Ok(Selection {
                    provider: req.to_string(),
                    overridden: None,
                    reason: SwitchReason::Requested,
                });
            }
            overridden = Some(req.to_string());
        }

        if let Some(sticky) = self.sticky.as_deref().filter(|s| healthy(*s)) {
            return Ok(Selection {
                provider: sticky.to_string(),
                overridden,
                reason: SwitchReason::Initial,
            });
        }

        let reason = if self.sticky.is_some() {
            SwitchReason::Unhealthy
        } else {
            SwitchReason::Initial
        };
        self.providers
            .iter()
            .find(|p| healthy(p.as_str()))
            .map(|p| Selection {
                provider: p.clone(),
                overridden,
                reason,
            })
            .ok_or_else(|| DispatchError::NoHealthyProvider {
                capability: self.capability.clone(),
            })
    }

    /// Highest-priority healthy provider other than `failed`.
    pub(crate) fn alternative(&self, failed: &str, healthy: impl Fn(&str) -> bool) -> Option<String> {
        self.providers
            .iter()
            .find(|p| p.as_str() != failed && healthy(p.as_str()))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn music() -> CapabilityRoute {
        CapabilityRoute::new(
            "music",
            CapabilitySettings {
                providers: vec!["streaming".into(), "local".into(), "radio".into()],
                fallback: true,
                timeout: Duration::from_secs(1),
            },
        )
    }

    fn all_healthy(_: &str) -> bool {
        true
    }

    #[test]
    fn highest_priority_wins_without_sticky() {
        let sel = music().select(None, all_healthy).expect("selection");
        assert_eq!(sel.provider, "streaming");
        assert_eq!(sel.reason, SwitchReason::Initial);
    }

    #[test]
    fn sticky_beats_priority_while_healthy() {
        let mut route = music();
        route.sticky = Some("local".into());
        assert_eq!(route.select(None, all_healthy).expect("sel").provider, "local");

        let sel = route.select(None, |p| p != "local").expect("sel");
        assert_eq!(sel.provider, "streaming");
        assert_eq!(sel.reason, SwitchReason::Unhealthy);
    }

    #[test]
    fn explicit_provider_is_overridden_when_unusable() {
        let route = music();
        let sel = route.select(Some("radio"), all_healthy).expect("sel");
        assert_eq!((sel.provider.as_str(), sel.overridden), ("radio", None));

        let sel = route.select(Some("radio"), |p| p != "radio").expect("sel");
        assert_eq!(sel.provider, "streaming");
        assert_eq!(sel.overridden.as_deref(), Some("radio"));

        let sel = route.select(Some("hue"), all_healthy).expect("sel");
        assert_eq!(sel.overridden.as_deref(), Some("hue"));
    }

    #[test]
    fn no_healthy_provider_is_an_error() {
        let err = music().select(None, |_| false).unwrap_err();
        assert_eq!(err.as_label(), "dispatch_no_healthy_provider");
    }

    #[test]
    fn alternative_skips_failed_and_unhealthy() {
        let route = music();
        assert_eq!(route.alternative("streaming", all_healthy).as_deref(), Some("local"));
        assert_eq!(route.alternative("streaming", |p| p != "local").as_deref(), Some("radio"));
        assert_eq!(route.alternative("streaming", |p| p == "streaming"), None);
    }
}
