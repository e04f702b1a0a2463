use std::fmt;

use serde::{Deserialize, Serialize};

/// The states of the cart picking task.
///
/// Nominal flow: NAVIGATING_TO_CART → APPROACHING_CART → DETECTING_TAGS_1 →
/// MOVING_SIDEWAYS → DETECTING_TAGS_2 → POSITION_ARM → PICK_ITEM → END.
/// DEBUG_STATE replaces the first five states on the bench.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    #[serde(rename = "DEBUG_STATE")]
    DebugState,
    #[serde(rename = "NAVIGATING_TO_CART")]
    NavigatingToCart,
    #[serde(rename = "APPROACHING_CART")]
    ApproachingCart,
    #[serde(rename = "DETECTING_TAGS_1")]
    DetectingTags1,
    #[serde(rename = "MOVING_SIDEWAYS")]
    MovingSideways,
    #[serde(rename = "DETECTING_TAGS_2")]
    DetectingTags2,
    #[serde(rename = "POSITION_ARM")]
    PositionArm,
    #[serde(rename = "PICK_ITEM")]
    PickItem,
    #[serde(rename = "END")]
    End,
}

impl TaskState {
    pub const ALL: [TaskState; 9] = [
        TaskState::DebugState,
        TaskState::NavigatingToCart,
        TaskState::ApproachingCart,
        TaskState::DetectingTags1,
        TaskState::MovingSideways,
        TaskState::DetectingTags2,
        TaskState::PositionArm,
        TaskState::PickItem,
        TaskState::End,
    ];

    /// Initial state, resolved once from the debug toggle.
    pub fn initial(debug: bool) -> Self {
        if debug {
            TaskState::DebugState
        } else {
            TaskState::NavigatingToCart
        }
    }

    pub fn is_terminal(self) -> bool {
        self == TaskState::End
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::DebugState => "DEBUG_STATE",
            TaskState::NavigatingToCart => "NAVIGATING_TO_CART",
            TaskState::ApproachingCart => "APPROACHING_CART",
            TaskState::DetectingTags1 => "DETECTING_TAGS_1",
            TaskState::MovingSideways => "MOVING_SIDEWAYS",
            TaskState::DetectingTags2 => "DETECTING_TAGS_2",
            TaskState::PositionArm => "POSITION_ARM",
            TaskState::PickItem => "PICK_ITEM",
            TaskState::End => "END",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_toggle_selects_initial_state() {
        assert_eq!(TaskState::initial(false), TaskState::NavigatingToCart);
        assert_eq!(TaskState::initial(true), TaskState::DebugState);
    }

    #[test]
    fn display_matches_serde_names() {
        for state in TaskState::ALL {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{state}\""));
        }
    }

    #[test]
    fn only_end_is_terminal() {
        let terminal: Vec<_> = TaskState::ALL.into_iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal, vec![TaskState::End]);
    }
}
