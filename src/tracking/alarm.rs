//! Alarm State Machine
//!
//! Idle -> Active when the missing set becomes non-empty, Active -> Acknowledged
//! on operator acknowledge, back to Idle when every item is present again or on
//! a manual clear. Only transitions produce events; a missing set that changes
//! composition while raised just refreshes the set.

use super::types::{AlarmState, ClearReason, MissingItem};
use crate::error::{Error, Result};

/// Transition produced by the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum AlarmTransition {
    /// Idle -> Active, with the missing set at trigger time
    Triggered(Vec<MissingItem>),
    /// Active|Acknowledged -> Idle
    Cleared(ClearReason),
    /// Active -> Acknowledged, with the missing set being silenced
    Acknowledged(Vec<MissingItem>),
}

/// Alarm state plus the current missing set
#[derive(Debug, Clone, Default)]
pub struct AlarmStateMachine {
    state: AlarmState,
    missing: Vec<MissingItem>,
}

impl AlarmStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    /// `alarm_active`: Active or Acknowledged
    pub fn is_active(&self) -> bool {
        self.state.is_raised()
    }

    pub fn is_acknowledged(&self) -> bool {
        self.state == AlarmState::Acknowledged
    }

    pub fn missing(&self) -> &[MissingItem] {
        &self.missing
    }

    /// Feed the missing set computed after a cycle (or after a removal)
    pub fn reconcile(&mut self, missing: Vec<MissingItem>) -> Option<AlarmTransition> {
        let prev = self.state;
        self.missing = missing;

        match (prev, self.missing.is_empty()) {
            (AlarmState::Idle, false) => {
                self.state = AlarmState::Active;
                tracing::warn!(missing_count = self.missing.len(), "Alarm triggered");
                Some(AlarmTransition::Triggered(self.missing.clone()))
            }
            (AlarmState::Active | AlarmState::Acknowledged, true) => {
                self.state = AlarmState::Idle;
                tracing::info!(previous = ?prev, "Alarm cleared - all items present");
                Some(AlarmTransition::Cleared(ClearReason::Recovered))
            }
            (AlarmState::Active | AlarmState::Acknowledged, false) => {
                tracing::debug!(
                    state = ?prev,
                    missing_count = self.missing.len(),
                    "Missing set refreshed"
                );
                None
            }
            (AlarmState::Idle, true) => None,
        }
    }

    /// Operator acknowledge.
    ///
    /// Fails with `NotActive` when Idle; acknowledging twice is a silent success.
    pub fn acknowledge(&mut self) -> Result<Option<AlarmTransition>> {
        match self.state {
            AlarmState::Idle => Err(Error::NotActive("No active alarm to acknowledge".to_string())),
            AlarmState::Acknowledged => Ok(None),
            AlarmState::Active => {
                self.state = AlarmState::Acknowledged;
                tracing::info!(missing_count = self.missing.len(), "Alarm acknowledged");
                Ok(Some(AlarmTransition::Acknowledged(self.missing.clone())))
            }
        }
    }

    /// Force Idle (clear-all). Emits only when an alarm was raised.
    pub fn reset(&mut self) -> Option<AlarmTransition> {
        let was_raised = self.state.is_raised();
        self.state = AlarmState::Idle;
        self.missing.clear();

        if was_raised {
            tracing::info!("Alarm cleared manually");
            Some(AlarmTransition::Cleared(ClearReason::Manual))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn missing(id: &str) -> MissingItem {
        MissingItem {
            id: id.to_string(),
            label: format!("label-{}", id),
            class_id: 3,
            last_seen: Utc::now(),
        }
    }

    #[test]
    fn test_idle_to_active() {
        let mut alarm = AlarmStateMachine::new();
        let t = alarm.reconcile(vec![missing("a")]);

        assert!(matches!(t, Some(AlarmTransition::Triggered(ref m)) if m.len() == 1));
        assert_eq!(alarm.state(), AlarmState::Active);
        assert!(alarm.is_active());
        assert!(!alarm.is_acknowledged());
    }

    #[test]
    fn test_no_retrigger_while_missing() {
        let mut alarm = AlarmStateMachine::new();
        alarm.reconcile(vec![missing("a")]);

        assert_eq!(alarm.reconcile(vec![missing("a")]), None);
        assert_eq!(alarm.reconcile(vec![missing("a"), missing("b")]), None);
        assert_eq!(alarm.missing().len(), 2);
        assert_eq!(alarm.state(), AlarmState::Active);
    }

    #[test]
    fn test_recovered_clears() {
        let mut alarm = AlarmStateMachine::new();
        alarm.reconcile(vec![missing("a"), missing("b")]);

        let t = alarm.reconcile(vec![]);
        assert_eq!(t, Some(AlarmTransition::Cleared(ClearReason::Recovered)));
        assert_eq!(alarm.state(), AlarmState::Idle);
        assert!(!alarm.is_acknowledged());

        // Staying clear emits nothing
        assert_eq!(alarm.reconcile(vec![]), None);
    }

    #[test]
    fn test_acknowledge_when_idle_fails() {
        let mut alarm = AlarmStateMachine::new();
        assert!(matches!(alarm.acknowledge(), Err(Error::NotActive(_))));
        assert_eq!(alarm.state(), AlarmState::Idle);
    }

    #[test]
    fn test_acknowledged_new_item_does_not_retrigger() {
        let mut alarm = AlarmStateMachine::new();
        alarm.reconcile(vec![missing("a")]);

        let t = alarm.acknowledge().unwrap();
        assert!(matches!(t, Some(AlarmTransition::Acknowledged(_))));
        assert!(alarm.is_active());
        assert!(alarm.is_acknowledged());

        // A second acknowledge is a no-op
        assert_eq!(alarm.acknowledge().unwrap(), None);

        // A different item drops out: no trigger, but the set includes it
        assert_eq!(alarm.reconcile(vec![missing("a"), missing("b")]), None);
        assert_eq!(alarm.state(), AlarmState::Acknowledged);
        let ids: Vec<_> = alarm.missing().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_acknowledged_recovers_to_idle() {
        let mut alarm = AlarmStateMachine::new();
        alarm.reconcile(vec![missing("a")]);
        alarm.acknowledge().unwrap();

        let t = alarm.reconcile(vec![]);
        assert_eq!(t, Some(AlarmTransition::Cleared(ClearReason::Recovered)));
        assert!(!alarm.is_active());
        assert!(!alarm.is_acknowledged());
    }

    #[test]
    fn test_reset() {
        let mut alarm = AlarmStateMachine::new();
        assert_eq!(alarm.reset(), None);

        alarm.reconcile(vec![missing("a")]);
        assert_eq!(alarm.reset(), Some(AlarmTransition::Cleared(ClearReason::Manual)));
        assert_eq!(alarm.state(), AlarmState::Idle);
        assert!(alarm.missing().is_empty());
        assert_eq!(alarm.reset(), None);
    }
}
