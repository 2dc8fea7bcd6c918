//! Conversation state and the per-conversation session store
//!
//! Drafts are deliberately in-process only: a restart drops in-flight
//! dialogs and the user starts again from the main menu. Nothing in a
//! draft is written to the persistent store before its confirmation
//! transition fires.

use dashmap::DashMap;
use std::sync::Arc;

use crate::database::{Medicine, ReminderEntry};

/// Where a conversation currently is in the guided flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialogState {
    #[default]
    Idle,
    SelectingTimezone,
    AddingName,
    AddingTime,
    AddingDosage,
    ConfirmingAdd,
    AddingMoreTimes,
    ChangingTimezone,
    SelectingMedicineForDeletion,
    SelectingReminderForDeletion,
    ConfirmingDeletion,
    ConfirmingDeleteAll,
    ConfirmingDeleteAllFinal,
}

/// What a pending deletion confirmation will remove
#[derive(Debug, Clone)]
pub enum DeletionTarget {
    WholeMedicine,
    SingleReminder(ReminderEntry),
}

/// Accumulated input of one in-progress flow
#[derive(Debug, Clone, Default)]
pub struct SessionDraft {
    pub state: DialogState,
    pub medicine_name: Option<String>,
    pub medicine_time: Option<String>,
    pub medicine_dosage: Option<String>,
    /// Set once the medicine row exists, so further times reuse it
    pub medicine_id: Option<i64>,
    /// Numbered list the user is currently choosing from
    pub deletion_candidates: Vec<Medicine>,
    pub selected_medicine: Option<Medicine>,
    pub pending_deletion: Option<DeletionTarget>,
}

impl SessionDraft {
    /// Drop the entry fields while keeping any medicine id already created
    pub fn clear_entry_fields(&mut self) {
        self.medicine_name = None;
        self.medicine_time = None;
        self.medicine_dosage = None;
    }
}

/// Session store keyed by conversation id.
///
/// Drafts are snapshotted out and stored back rather than mutated under
/// the map guard, so no lock is ever held across an await point.
#[derive(Clone, Default)]
pub struct SessionStore {
    drafts: Arc<DashMap<String, SessionDraft>>,
}

impl SessionStore {
    pub fn new() -> Self {
        SessionStore::default()
    }

    /// Current draft of a conversation, or a fresh Idle draft
    pub fn snapshot(&self, conversation_id: &str) -> SessionDraft {
        self.drafts
            .get(conversation_id)
            .map(|draft| draft.value().clone())
            .unwrap_or_default()
    }

    pub fn store(&self, conversation_id: &str, draft: SessionDraft) {
        self.drafts.insert(conversation_id.to_string(), draft);
    }

    pub fn clear(&self, conversation_id: &str) {
        self.drafts.remove(conversation_id);
    }

    pub fn state_of(&self, conversation_id: &str) -> DialogState {
        self.drafts
            .get(conversation_id)
            .map(|draft| draft.state)
            .unwrap_or_default()
    }
}
