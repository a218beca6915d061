use liyaqa_core::{LiyaqaError, LiyaqaResult};
use serde::{Deserialize, Serialize};

use crate::types::CampaignStatus;

/// Describes a single valid state transition for a campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: CampaignStatus,
    pub to: CampaignStatus,
    pub trigger: String,
}

/// Guards the campaign lifecycle by enforcing a finite set of valid
/// state transitions.
#[derive(Debug, Clone)]
pub struct CampaignStateMachine {
    pub state: CampaignStatus,
    pub transitions: Vec<StateTransition>,
}

fn edge(from: CampaignStatus, to: CampaignStatus, trigger: &str) -> StateTransition {
    StateTransition {
        from,
        to,
        trigger: trigger.to_string(),
    }
}

impl CampaignStateMachine {
    /// Creates a state machine positioned at `state`.
    pub fn new(state: CampaignStatus) -> Self {
        use CampaignStatus::*;
        let transitions = vec![
            edge(Draft, Active, "activate"),
            edge(Paused, Active, "resume"),
            edge(Active, Paused, "pause"),
            edge(Active, Completed, "complete"),
            // Archived ->
            edge(Draft, Archived, "archive"),
            edge(Active, Archived, "archive"),
            edge(Paused, Archived, "archive"),
            edge(Completed, Archived, "archive"),
        ];

        Self { state, transitions }
    }

    /// Returns `true` if the given transition is allowed.
    pub fn can_transition(&self, from: &CampaignStatus, to: &CampaignStatus) -> bool {
        self.transitions
            .iter()
            .any(|t| t.from == *from && t.to == *to)
    }

    /// Attempts to move the state machine to `to`.
    pub fn transition(&mut self, to: CampaignStatus) -> LiyaqaResult<()> {
        if self.can_transition(&self.state, &to) {
            self.state = to;
            Ok(())
        } else {
            Err(LiyaqaError::InvalidState(format!(
                "Invalid campaign transition from {:?} to {:?}",
                self.state, to
            )))
        }
    }
}

impl Default for CampaignStateMachine {
    fn default() -> Self {
        Self::new(CampaignStatus::Draft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_lifecycle() {
        let mut sm = CampaignStateMachine::default();
        sm.transition(CampaignStatus::Active).unwrap();
        sm.transition(CampaignStatus::Paused).unwrap();
        sm.transition(CampaignStatus::Active).unwrap();
        sm.transition(CampaignStatus::Completed).unwrap();
        sm.transition(CampaignStatus::Archived).unwrap();
        assert_eq!(sm.state, CampaignStatus::Archived);
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut sm = CampaignStateMachine::default();
        assert!(sm.transition(CampaignStatus::Paused).is_err());
        assert!(sm.transition(CampaignStatus::Completed).is_err());

        let mut archived = CampaignStateMachine::new(CampaignStatus::Archived);
        assert!(archived.transition(CampaignStatus::Active).is_err());
        assert!(archived.transition(CampaignStatus::Archived).is_err());

        let completed = CampaignStateMachine::new(CampaignStatus::Completed);
        assert!(!completed.can_transition(&CampaignStatus::Completed, &CampaignStatus::Active));
    }
}
