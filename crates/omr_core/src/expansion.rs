use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{DetailRecord, GroupKey};

/// Per-group display state of the results table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExpansionState {
    #[default]
    Collapsed,
    Expanding,
    Expanded,
    CollapsedWithError(String),
}

/// What a toggle asks the caller to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The group entered `Expanding`; its records must be loaded.
    RequestLoad,
    /// Records were already held; the group is shown immediately.
    Expanded,
    Collapsed,
    /// A load is already in flight for this group.
    Ignored,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct GroupSlot {
    state: ExpansionState,
    records: Option<Arc<[DetailRecord]>>,
}

/// Maps toggle actions onto load requests, one independent state per group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpansionController {
    groups: BTreeMap<GroupKey, GroupSlot>,
    order: Vec<GroupKey>,
}

impl ExpansionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `Collapsed` slot for each unseen key. Known keys keep their state.
    pub fn register(&mut self, keys: impl IntoIterator<Item = GroupKey>) {
        for key in keys {
            self.slot_mut(key);
        }
    }

    pub fn toggle(&mut self, key: &GroupKey) -> ToggleOutcome {
        let slot = self.slot_mut(key.clone());
        match slot.state {
            ExpansionState::Collapsed if slot.records.is_some() => {
                slot.state = ExpansionState::Expanded;
                ToggleOutcome::Expanded
            }
            ExpansionState::Collapsed | ExpansionState::CollapsedWithError(_) => {
                slot.state = ExpansionState::Expanding;
                ToggleOutcome::RequestLoad
            }
            ExpansionState::Expanding => ToggleOutcome::Ignored,
            ExpansionState::Expanded => {
                slot.state = ExpansionState::Collapsed;
                ToggleOutcome::Collapsed
            }
        }
    }

    /// Applies a finished load. Returns `false` when the group was not
    /// waiting for one, in which case nothing changes.
    pub fn settle(&mut self, key: &GroupKey, result: Result<Arc<[DetailRecord]>, String>) -> bool {
        let Some(slot) = self.groups.get_mut(key) else {
            return false;
        };
        if slot.state != ExpansionState::Expanding {
            return false;
        }
        match result {
            Ok(records) => {
                slot.records = Some(records);
                slot.state = ExpansionState::Expanded;
            }
            Err(message) => slot.state = ExpansionState::CollapsedWithError(message),
        }
        true
    }

    pub fn state(&self, key: &GroupKey) -> Option<&ExpansionState> {
        self.groups.get(key).map(|slot| &slot.state)
    }

    pub fn records(&self, key: &GroupKey) -> Option<&Arc<[DetailRecord]>> {
        self.groups.get(key).and_then(|slot| slot.records.as_ref())
    }

    pub fn is_expanded(&self, key: &GroupKey) -> bool {
        matches!(self.state(key), Some(ExpansionState::Expanded))
    }

    /// Keys in registration order.
    pub fn keys(&self) -> &[GroupKey] {
        &self.order
    }

    fn slot_mut(&mut self, key: GroupKey) -> &mut GroupSlot {
        if !self.groups.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.groups.entry(key).or_default()
    }
}
