//! Phase and state enums

use strum_macros::{AsRefStr, Display, EnumIter};

/// A hook method the lifecycle can dispatch
///
/// Displays as the method name used in logs and errors (`didLoad`, `willReady`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "camelCase")]
pub enum HookPhase {
    ConfigDidLoad,
    DidLoad,
    WillReady,
    DidReady,
    BeforeClose,
    ServerDidReady,
}

impl HookPhase {
    /// Whether the phase runs on a ready latch
    ///
    /// Latched phases propagate the first failure to overall readiness;
    /// every other phase is dispatched best-effort.
    pub fn is_latched(self) -> bool {
        matches!(self, Self::DidLoad | Self::WillReady)
    }

    /// Prefix of the timing span recorded around each hook invocation
    pub fn timing_prefix(self) -> &'static str {
        match self {
            Self::ConfigDidLoad => "Config Did Load",
            Self::DidLoad => "Did Load",
            Self::WillReady => "Will Ready",
            Self::DidReady => "Did Ready",
            Self::BeforeClose => "Before Close",
            Self::ServerDidReady => "Server Did Ready",
        }
    }
}

/// Where the lifecycle currently is
///
/// States only move forward, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, AsRefStr)]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
    LoadPhase,
    BootPhase,
    Ready,
    Closing,
    Closed,
}

impl LifecycleState {
    /// Whether `close()` has started
    pub fn is_closing(self) -> bool {
        self >= Self::Closing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_phase_names_match_hook_methods() {
        let names: Vec<String> = HookPhase::iter().map(|p| p.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "configDidLoad",
                "didLoad",
                "willReady",
                "didReady",
                "beforeClose",
                "serverDidReady"
            ]
        );
    }

    #[test]
    fn test_only_load_and_boot_phases_are_latched() {
        let latched: Vec<HookPhase> = HookPhase::iter().filter(|p| p.is_latched()).collect();
        assert_eq!(latched, vec![HookPhase::DidLoad, HookPhase::WillReady]);
    }

    #[test]
    fn test_states_are_ordered() {
        assert!(LifecycleState::Uninitialized < LifecycleState::Initialized);
        assert!(LifecycleState::BootPhase < LifecycleState::Ready);
        assert!(LifecycleState::Closing.is_closing());
        assert!(!LifecycleState::Ready.is_closing());
        assert_eq!(LifecycleState::LoadPhase.as_ref(), "LoadPhase");
    }
}
