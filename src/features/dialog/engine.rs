//! Dialog engine
//!
//! One dispatcher keyed by (state, intent). Each inbound message runs one
//! transition: validate, maybe touch the store (confirmation transitions
//! only), update the draft, reply. A persistence failure surfaces a
//! generic failure message and discards the draft.

use log::{error, info, warn};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::config::TimezoneChoice;
use crate::database::{Database, Medicine, ReminderEntry};
use crate::features::auth::AccessPolicy;

use super::format::{format_medicine_list, parse_selection_index, HELP_TEXT};
use super::intent::{captions, preset_time, Intent};
use super::state::{DeletionTarget, DialogState, SessionDraft, SessionStore};
use super::validate::{normalize_dosage, normalize_name, normalize_time};

/// One message from the transport collaborator
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_handle: Option<String>,
    pub text: String,
}

/// The engine's answer: text plus an ordered option set the transport
/// renders as quick-reply buttons
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub options: Option<Vec<String>>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Reply {
            text: text.into(),
            options: None,
        }
    }

    pub fn with_options(text: impl Into<String>, options: Vec<String>) -> Self {
        Reply {
            text: text.into(),
            options: Some(options),
        }
    }
}

pub struct DialogEngine {
    database: Database,
    sessions: SessionStore,
    access: Arc<dyn AccessPolicy>,
    timezones: Vec<TimezoneChoice>,
}

impl DialogEngine {
    pub fn new(
        database: Database,
        sessions: SessionStore,
        access: Arc<dyn AccessPolicy>,
        timezones: Vec<TimezoneChoice>,
    ) -> Self {
        DialogEngine {
            database,
            sessions,
            access,
            timezones,
        }
    }

    pub async fn handle_message(&self, msg: &InboundMessage) -> Reply {
        let request_id = Uuid::new_v4();
        info!(
            "[{request_id}] 📥 Message | conversation: {} | sender: {} | text: '{}'",
            msg.conversation_id,
            msg.sender_id,
            msg.text.chars().take(100).collect::<String>()
        );

        if !self
            .access
            .is_allowed(&msg.sender_id, msg.sender_handle.as_deref())
            .await
        {
            warn!(
                "[{request_id}] 🚫 Unauthorized access attempt from {} ({:?})",
                msg.sender_id, msg.sender_handle
            );
            return Reply::text(
                "❌ Sorry, access is restricted.\nContact the administrator to get access.",
            );
        }

        let intent = Intent::parse(&msg.text);
        let mut draft = self.sessions.snapshot(&msg.conversation_id);

        // "cancel" aborts any flow from any state
        if intent == Intent::Cancel {
            self.sessions.clear(&msg.conversation_id);
            return Self::main_menu();
        }

        let reply = match draft.state {
            DialogState::Idle => self.on_idle(request_id, msg, &intent, &mut draft).await,
            DialogState::SelectingTimezone => {
                self.on_timezone_selection(request_id, msg, &mut draft, false)
                    .await
            }
            DialogState::ChangingTimezone => {
                self.on_timezone_selection(request_id, msg, &mut draft, true)
                    .await
            }
            DialogState::AddingName => Self::on_adding_name(msg, &mut draft),
            DialogState::AddingTime => Self::on_adding_time(msg, &mut draft),
            DialogState::AddingDosage => Self::on_adding_dosage(msg, &mut draft),
            DialogState::ConfirmingAdd => {
                self.on_confirming_add(request_id, msg, &intent, &mut draft)
                    .await
            }
            DialogState::AddingMoreTimes => Self::on_adding_more_times(&intent, &mut draft),
            DialogState::SelectingMedicineForDeletion => {
                Self::on_medicine_selection(msg, &mut draft)
            }
            DialogState::SelectingReminderForDeletion => {
                Self::on_reminder_selection(msg, &mut draft)
            }
            DialogState::ConfirmingDeletion => {
                self.on_deletion_confirmation(request_id, msg, &intent, &mut draft)
                    .await
            }
            DialogState::ConfirmingDeleteAll => {
                self.on_delete_all_first(msg, &intent, &mut draft).await
            }
            DialogState::ConfirmingDeleteAllFinal => {
                self.on_delete_all_final(request_id, msg, &intent, &mut draft)
                    .await
            }
        };

        if draft.state == DialogState::Idle {
            self.sessions.clear(&msg.conversation_id);
        } else {
            self.sessions.store(&msg.conversation_id, draft);
        }
        reply
    }

    // ---- Idle -----------------------------------------------------------

    async fn on_idle(
        &self,
        _request_id: Uuid,
        msg: &InboundMessage,
        intent: &Intent,
        draft: &mut SessionDraft,
    ) -> Reply {
        match intent {
            Intent::Start => {
                if self.database.get_user(&msg.sender_id).await.is_some() {
                    Self::main_menu()
                } else {
                    draft.state = DialogState::SelectingTimezone;
                    Reply::with_options(
                        "🌍 Welcome to the Medicine Assistant!\n\nPick your timezone:",
                        self.timezone_options(None),
                    )
                }
            }
            Intent::AddMedicine => {
                if self.database.get_user(&msg.sender_id).await.is_none() {
                    // Reminders need a timezone, so onboarding comes first
                    draft.state = DialogState::SelectingTimezone;
                    return Reply::with_options(
                        "🌍 First, pick your timezone:",
                        self.timezone_options(None),
                    );
                }
                draft.clear_entry_fields();
                draft.medicine_id = None;
                draft.state = DialogState::AddingName;
                Self::name_prompt()
            }
            Intent::ListMedicines => {
                let medicines = self.database.list_medicines(&msg.sender_id).await;
                let mut options = vec![captions::ADD_MORE.to_string()];
                if !medicines.is_empty() {
                    options.push(captions::DELETE_MEDICINE.into());
                    options.push(captions::DELETE_ALL.into());
                }
                options.push(captions::MAIN_MENU.into());
                Reply::with_options(format_medicine_list(&medicines), options)
            }
            Intent::DeleteMedicine => {
                let medicines = self.database.list_medicines(&msg.sender_id).await;
                if medicines.is_empty() {
                    return Self::with_menu("❌ You have no saved medicines to delete.");
                }
                draft.deletion_candidates = medicines;
                draft.state = DialogState::SelectingMedicineForDeletion;
                Self::medicine_selection_prompt(draft)
            }
            Intent::DeleteAll => {
                let medicines = self.database.list_medicines(&msg.sender_id).await;
                if medicines.is_empty() {
                    return Self::with_menu("❌ You have no saved medicines to delete.");
                }
                let total_reminders: usize =
                    medicines.iter().map(|m| m.active_reminders().len()).sum();
                draft.state = DialogState::ConfirmingDeleteAll;
                Reply::with_options(
                    format!(
                        "⚠️ WARNING! DANGEROUS ACTION!\n\n\
                         You are about to DELETE ALL your medicines:\n\
                         📊 Medicines: {}\n\
                         📊 Reminders: {}\n\n\
                         ⚠️ THIS CANNOT BE UNDONE!\n\n\
                         Are you SURE you want to continue?",
                        medicines.len(),
                        total_reminders
                    ),
                    vec![
                        captions::DELETE_ALL_FIRST.into(),
                        captions::NO_CANCEL.into(),
                    ],
                )
            }
            Intent::ChangeTimezone => {
                let current = self
                    .database
                    .get_user(&msg.sender_id)
                    .await
                    .map(|user| user.timezone);
                draft.state = DialogState::ChangingTimezone;
                Reply::with_options(
                    "🌍 Changing timezone\n\n\
                     Pick a new timezone, or type any IANA name (e.g. Europe/Berlin):",
                    self.timezone_options(current.as_deref()),
                )
            }
            Intent::Help => Reply::with_options(HELP_TEXT, vec![captions::MAIN_MENU.into()]),
            Intent::MainMenu => Self::main_menu(),
            _ => Self::with_menu("❌ I don't understand that. Pick an action from the menu."),
        }
    }

    // ---- Timezone selection ---------------------------------------------

    async fn on_timezone_selection(
        &self,
        request_id: Uuid,
        msg: &InboundMessage,
        draft: &mut SessionDraft,
        changing: bool,
    ) -> Reply {
        let Some((label, tz)) = self.resolve_timezone(&msg.text) else {
            return Reply::with_options(
                "❌ Invalid choice. Pick one from the list or type an IANA name.",
                self.timezone_options(None),
            );
        };

        if self
            .database
            .upsert_user(&msg.sender_id, msg.sender_handle.as_deref(), &tz)
            .await
        {
            draft.state = DialogState::Idle;
            if changing {
                Self::with_menu(&format!(
                    "✅ Timezone changed to: {label}\n\n\
                     All your reminders now follow the new local time."
                ))
            } else {
                Self::with_menu(&format!("✅ Timezone set: {label}\n\nYou can use the bot now!"))
            }
        } else {
            error!(
                "[{request_id}] Failed to save timezone for user {}",
                msg.sender_id
            );
            draft.state = DialogState::Idle;
            Self::with_menu("❌ Failed to save. Please try again.")
        }
    }

    // ---- Add-medicine flow ----------------------------------------------

    fn on_adding_name(msg: &InboundMessage, draft: &mut SessionDraft) -> Reply {
        match normalize_name(&msg.text) {
            Some(name) => {
                draft.medicine_name = Some(name.clone());
                draft.state = DialogState::AddingTime;
                Self::time_prompt(
                    &name,
                    "Enter a time as HH:MM\nExamples: 08:00, 14:30, 20:15\n\nOr pick a preset:",
                )
            }
            None => Reply::with_options(
                "❌ Invalid medicine name. Please try again.\n\
                 The name must be 1 to 100 characters long.",
                vec![captions::CANCEL.into()],
            ),
        }
    }

    fn on_adding_time(msg: &InboundMessage, draft: &mut SessionDraft) -> Reply {
        let time = preset_time(&msg.text)
            .map(String::from)
            .or_else(|| normalize_time(&msg.text));

        match time {
            Some(time) => {
                let name = draft.medicine_name.clone().unwrap_or_default();
                draft.medicine_time = Some(time.clone());
                draft.state = DialogState::AddingDosage;
                Reply::with_options(
                    format!("💊 {name}\n🕐 {time}\n\nEnter the dosage (example: 1 tablet):"),
                    vec![captions::CANCEL.into()],
                )
            }
            None => Reply::with_options(
                "❌ Invalid time format. Please try again.\nExample: 08:00",
                Self::time_options(),
            ),
        }
    }

    fn on_adding_dosage(msg: &InboundMessage, draft: &mut SessionDraft) -> Reply {
        match normalize_dosage(&msg.text) {
            Some(dosage) => {
                draft.medicine_dosage = Some(dosage);
                draft.state = DialogState::ConfirmingAdd;
                Self::confirm_add_prompt(draft)
            }
            None => Reply::with_options(
                "❌ Invalid dosage format. Please try again.\n\
                 Example: 1 tablet, 2 capsules, 5 ml",
                vec![captions::CANCEL.into()],
            ),
        }
    }

    async fn on_confirming_add(
        &self,
        request_id: Uuid,
        msg: &InboundMessage,
        intent: &Intent,
        draft: &mut SessionDraft,
    ) -> Reply {
        match intent {
            Intent::Save => {
                let (Some(name), Some(time), Some(dosage)) = (
                    draft.medicine_name.clone(),
                    draft.medicine_time.clone(),
                    draft.medicine_dosage.clone(),
                ) else {
                    draft.state = DialogState::Idle;
                    return Self::with_menu("❌ Something went wrong. Please start again.");
                };

                let medicine_id = match draft.medicine_id {
                    Some(id) => Some(id),
                    None => self.database.add_medicine(&msg.sender_id, &name).await,
                };
                let Some(medicine_id) = medicine_id else {
                    error!(
                        "[{request_id}] Failed to persist medicine '{name}' for user {}",
                        msg.sender_id
                    );
                    draft.state = DialogState::Idle;
                    return Self::with_menu("❌ Failed to save. Please try again.");
                };

                if self.database.add_reminder(medicine_id, &time, &dosage).await {
                    draft.medicine_id = Some(medicine_id);
                    draft.medicine_time = None;
                    draft.medicine_dosage = None;
                    draft.state = DialogState::AddingMoreTimes;
                    Reply::with_options(
                        "✅ Medicine saved!\n\nAdd another time for this medicine?",
                        vec![
                            captions::YES.into(),
                            captions::NO.into(),
                            captions::MAIN_MENU.into(),
                        ],
                    )
                } else {
                    // The medicine row stays behind as a recognized orphan
                    error!(
                        "[{request_id}] Reminder write failed after medicine {medicine_id} \
                         was created for user {} - orphaned medicine left in store",
                        msg.sender_id
                    );
                    draft.state = DialogState::Idle;
                    Self::with_menu("❌ Failed to save. Please try again.")
                }
            }
            Intent::Edit => {
                draft.clear_entry_fields();
                draft.state = DialogState::AddingName;
                Self::name_prompt()
            }
            _ => Self::confirm_add_prompt(draft),
        }
    }

    fn on_adding_more_times(intent: &Intent, draft: &mut SessionDraft) -> Reply {
        match intent {
            Intent::Yes => {
                let name = draft.medicine_name.clone().unwrap_or_default();
                draft.state = DialogState::AddingTime;
                Self::time_prompt(&name, "Enter one more time:")
            }
            _ => {
                draft.state = DialogState::Idle;
                Self::main_menu()
            }
        }
    }

    // ---- Deletion flows -------------------------------------------------

    fn on_medicine_selection(msg: &InboundMessage, draft: &mut SessionDraft) -> Reply {
        let selected = parse_selection_index(&msg.text)
            .and_then(|index| draft.deletion_candidates.get(index - 1))
            .cloned();

        match selected {
            Some(medicine) => Self::begin_deletion_of(medicine, draft),
            None => {
                let mut reply = Self::medicine_selection_prompt(draft);
                reply.text = format!("❌ Invalid choice. Pick one from the list.\n\n{}", reply.text);
                reply
            }
        }
    }

    fn begin_deletion_of(medicine: Medicine, draft: &mut SessionDraft) -> Reply {
        let active: Vec<ReminderEntry> =
            medicine.active_reminders().into_iter().cloned().collect();

        // With at most one active reminder there is nothing to pick:
        // deletion always targets the whole medicine
        if active.len() <= 1 {
            let reply = Reply::with_options(
                format!(
                    "🗑 Confirm deletion\n\n\
                     You are about to delete:\n💊 {}\n\n\
                     This removes every reminder for this medicine.\n\n\
                     Confirm?",
                    medicine.name
                ),
                Self::deletion_confirm_options(),
            );
            draft.selected_medicine = Some(medicine);
            draft.pending_deletion = Some(DeletionTarget::WholeMedicine);
            draft.state = DialogState::ConfirmingDeletion;
            return reply;
        }

        let mut options = vec![format!("1. 🗑 Everything for '{}'", medicine.name)];
        for (i, reminder) in active.iter().enumerate() {
            options.push(format!("{}. 🕐 {} - {}", i + 2, reminder.time, reminder.dosage));
        }
        options.push(captions::CANCEL.into());

        let listing = active
            .iter()
            .map(|reminder| format!("🕐 {} - {}", reminder.time, reminder.dosage))
            .collect::<Vec<_>>()
            .join("\n");
        let reply = Reply::with_options(
            format!(
                "🗑 What should be deleted?\n\n\
                 💊 {} has {} reminders:\n\n{listing}\n\n\
                 Pick what to delete:",
                medicine.name,
                active.len()
            ),
            options,
        );
        draft.selected_medicine = Some(medicine);
        draft.state = DialogState::SelectingReminderForDeletion;
        reply
    }

    fn on_reminder_selection(msg: &InboundMessage, draft: &mut SessionDraft) -> Reply {
        let Some(medicine) = draft.selected_medicine.clone() else {
            draft.state = DialogState::Idle;
            return Self::main_menu();
        };
        let active: Vec<ReminderEntry> =
            medicine.active_reminders().into_iter().cloned().collect();

        match parse_selection_index(&msg.text) {
            Some(1) => {
                draft.pending_deletion = Some(DeletionTarget::WholeMedicine);
                draft.state = DialogState::ConfirmingDeletion;
                Reply::with_options(
                    format!(
                        "🗑 Confirm deletion\n\n\
                         You are about to delete ALL of:\n💊 {}\n\n\
                         This removes every reminder for this medicine.\n\n\
                         Confirm?",
                        medicine.name
                    ),
                    Self::deletion_confirm_options(),
                )
            }
            Some(index) if index >= 2 && index - 2 < active.len() => {
                let reminder = active[index - 2].clone();
                let reply = Reply::with_options(
                    format!(
                        "🗑 Confirm deletion\n\n\
                         You are about to delete the reminder:\n\
                         💊 {}\n🕐 {} - {}\n\n\
                         Confirm?",
                        medicine.name, reminder.time, reminder.dosage
                    ),
                    Self::deletion_confirm_options(),
                );
                draft.pending_deletion = Some(DeletionTarget::SingleReminder(reminder));
                draft.state = DialogState::ConfirmingDeletion;
                reply
            }
            _ => Reply::text("❌ Invalid choice. Pick one from the list."),
        }
    }

    async fn on_deletion_confirmation(
        &self,
        request_id: Uuid,
        msg: &InboundMessage,
        intent: &Intent,
        draft: &mut SessionDraft,
    ) -> Reply {
        if *intent != Intent::ConfirmDelete {
            return Reply::with_options(
                "❌ Invalid choice. Pick one from the list.",
                Self::deletion_confirm_options(),
            );
        }

        let medicine = draft.selected_medicine.clone();
        let target = draft.pending_deletion.clone();
        draft.state = DialogState::Idle;

        let (Some(medicine), Some(target)) = (medicine, target) else {
            return Self::with_menu("❌ Failed to process the request.");
        };

        match target {
            DeletionTarget::WholeMedicine => {
                if self.database.delete_medicine(medicine.id, &msg.sender_id).await {
                    Self::with_menu(&format!(
                        "✅ '{}' deleted!\nAll its reminders were removed as well.",
                        medicine.name
                    ))
                } else {
                    error!(
                        "[{request_id}] delete_medicine {} failed for user {}",
                        medicine.id, msg.sender_id
                    );
                    Self::with_menu("❌ Failed to delete the medicine.")
                }
            }
            DeletionTarget::SingleReminder(reminder) => {
                if self.database.delete_reminder(reminder.id, &msg.sender_id).await {
                    Self::with_menu(&format!(
                        "✅ Reminder deleted!\n💊 {}\n🕐 {} - {}",
                        medicine.name, reminder.time, reminder.dosage
                    ))
                } else {
                    error!(
                        "[{request_id}] delete_reminder {} failed for user {}",
                        reminder.id, msg.sender_id
                    );
                    Self::with_menu("❌ Failed to delete the reminder.")
                }
            }
        }
    }

    async fn on_delete_all_first(
        &self,
        msg: &InboundMessage,
        intent: &Intent,
        draft: &mut SessionDraft,
    ) -> Reply {
        match intent {
            Intent::ConfirmDeleteAllFirst => {
                // No deletion yet: the second, differently-worded warning
                // with an explicit confirmation token comes first
                let count = self.database.list_medicines(&msg.sender_id).await.len();
                draft.state = DialogState::ConfirmingDeleteAllFinal;
                Reply::with_options(
                    format!(
                        "🚨 FINAL CHECK!\n\n\
                         Do you really want to delete ALL {count} medicines?\n\n\
                         ⚠️ AFTER PRESSING '{}'\n\
                         EVERY MEDICINE AND REMINDER IS GONE FOR GOOD!\n\n\
                         This is your last chance to change your mind!",
                        captions::DELETE_ALL_TOKEN
                    ),
                    vec![
                        captions::DELETE_ALL_TOKEN.into(),
                        captions::KEEP_ALL.into(),
                    ],
                )
            }
            Intent::No => {
                draft.state = DialogState::Idle;
                Self::with_menu("✅ Cancelled. Your medicines are untouched.")
            }
            _ => Reply::with_options(
                "❌ Invalid choice. Pick one from the list.",
                vec![
                    captions::DELETE_ALL_FIRST.into(),
                    captions::NO_CANCEL.into(),
                ],
            ),
        }
    }

    async fn on_delete_all_final(
        &self,
        request_id: Uuid,
        msg: &InboundMessage,
        intent: &Intent,
        draft: &mut SessionDraft,
    ) -> Reply {
        match intent {
            Intent::ConfirmDeleteAllFinal => {
                draft.state = DialogState::Idle;
                let deleted = self.database.delete_all_medicines(&msg.sender_id).await;
                if deleted > 0 {
                    info!(
                        "[{request_id}] User {} deleted all {deleted} of their medicines",
                        msg.sender_id
                    );
                    Self::with_menu(&format!(
                        "✅ DELETION COMPLETE!\n\n\
                         🗑 Removed {deleted} medicines\n\
                         🗑 Removed all their reminders\n\n\
                         Your medicine list is now empty."
                    ))
                } else {
                    Self::with_menu("❌ Failed to delete the medicines.")
                }
            }
            Intent::No => {
                draft.state = DialogState::Idle;
                Self::with_menu("✅ Cancelled. Your medicines are safe!")
            }
            _ => Reply::with_options(
                "❌ Invalid choice. Pick one from the list.",
                vec![
                    captions::DELETE_ALL_TOKEN.into(),
                    captions::KEEP_ALL.into(),
                ],
            ),
        }
    }

    // ---- Prompt helpers -------------------------------------------------

    fn main_menu_options() -> Vec<String> {
        vec![
            captions::ADD_MEDICINE.into(),
            captions::MY_MEDICINES.into(),
            captions::DELETE_MEDICINE.into(),
            captions::CHANGE_TIMEZONE.into(),
            captions::HELP.into(),
        ]
    }

    fn main_menu() -> Reply {
        Reply::with_options("🏠 Main menu\n\nPick an action:", Self::main_menu_options())
    }

    fn with_menu(text: &str) -> Reply {
        Reply::with_options(
            format!("{text}\n\n🏠 Pick an action:"),
            Self::main_menu_options(),
        )
    }

    fn name_prompt() -> Reply {
        Reply::with_options(
            "💊 Adding a medicine\n\nEnter the medicine name:",
            vec![captions::CANCEL.into()],
        )
    }

    fn time_options() -> Vec<String> {
        vec![
            captions::PRESET_MORNING.into(),
            captions::PRESET_NOON.into(),
            captions::PRESET_EVENING.into(),
            captions::CANCEL.into(),
        ]
    }

    fn time_prompt(name: &str, line: &str) -> Reply {
        Reply::with_options(format!("💊 {name}\n\n{line}"), Self::time_options())
    }

    fn confirm_add_prompt(draft: &SessionDraft) -> Reply {
        Reply::with_options(
            format!(
                "Confirm adding:\n\n💊 {}\n🕐 {}\n💊 {}",
                draft.medicine_name.as_deref().unwrap_or_default(),
                draft.medicine_time.as_deref().unwrap_or_default(),
                draft.medicine_dosage.as_deref().unwrap_or_default()
            ),
            vec![
                captions::SAVE.into(),
                captions::EDIT.into(),
                captions::CANCEL.into(),
            ],
        )
    }

    fn medicine_selection_prompt(draft: &SessionDraft) -> Reply {
        let options: Vec<String> = draft
            .deletion_candidates
            .iter()
            .enumerate()
            .map(|(i, medicine)| {
                format!(
                    "{}. {} ({} reminders)",
                    i + 1,
                    medicine.name,
                    medicine.active_reminders().len()
                )
            })
            .chain([captions::CANCEL.to_string()])
            .collect();
        Reply::with_options(
            "🗑 Deleting medicines\n\nPick the medicine to delete:",
            options,
        )
    }

    fn deletion_confirm_options() -> Vec<String> {
        vec![captions::CONFIRM_DELETE.into(), captions::CANCEL.into()]
    }

    fn timezone_options(&self, current_tz: Option<&str>) -> Vec<String> {
        let mut options: Vec<String> = self
            .timezones
            .iter()
            .map(|choice| {
                if Some(choice.tz.as_str()) == current_tz {
                    format!("✅ {} (current)", choice.label)
                } else {
                    choice.label.clone()
                }
            })
            .collect();
        options.push(captions::CANCEL.into());
        options
    }

    /// Map a selection back to (label, IANA name): a listed choice, a
    /// listed choice marked as current, or a raw IANA name
    fn resolve_timezone(&self, input: &str) -> Option<(String, String)> {
        let cleaned = input
            .trim()
            .trim_start_matches("✅ ")
            .trim_end_matches(" (current)")
            .trim();

        if let Some(choice) = self.timezones.iter().find(|choice| choice.label == cleaned) {
            return Some((choice.label.clone(), choice.tz.clone()));
        }
        if cleaned.parse::<chrono_tz::Tz>().is_ok() {
            return Some((cleaned.to_string(), cleaned.to_string()));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::load_timezone_choices;
    use crate::features::auth::OpenAccess;
    use async_trait::async_trait;

    struct DenyAll;

    #[async_trait]
    impl AccessPolicy for DenyAll {
        async fn is_allowed(&self, _user_id: &str, _handle: Option<&str>) -> bool {
            false
        }
    }

    async fn test_engine() -> DialogEngine {
        let database = Database::new(":memory:").await.unwrap();
        DialogEngine::new(
            database,
            SessionStore::new(),
            Arc::new(OpenAccess),
            load_timezone_choices(None),
        )
    }

    fn message(text: &str) -> InboundMessage {
        InboundMessage {
            conversation_id: "c1".into(),
            sender_id: "42".into(),
            sender_handle: None,
            text: text.into(),
        }
    }

    async fn say(engine: &DialogEngine, text: &str) -> Reply {
        engine.handle_message(&message(text)).await
    }

    async fn onboard(engine: &DialogEngine) {
        let reply = say(engine, "/start").await;
        assert!(reply.text.contains("timezone"));
        let reply = say(engine, "Kyiv (UTC+2/+3)").await;
        assert!(reply.text.contains("Timezone set"));
    }

    async fn add_medicine(engine: &DialogEngine, name: &str, times: &[(&str, &str)]) {
        say(engine, captions::ADD_MEDICINE).await;
        say(engine, name).await;
        for (i, (time, dosage)) in times.iter().enumerate() {
            if i > 0 {
                say(engine, captions::YES).await;
            }
            say(engine, time).await;
            say(engine, dosage).await;
            let reply = say(engine, captions::SAVE).await;
            assert!(reply.text.contains("Medicine saved"), "{}", reply.text);
        }
        say(engine, captions::NO).await;
    }

    #[tokio::test]
    async fn test_add_flow_round_trip() {
        let engine = test_engine().await;
        onboard(&engine).await;
        add_medicine(&engine, "Aspirin", &[("8", "1 таблетка")]).await;

        let medicines = engine.database.list_medicines("42").await;
        assert_eq!(medicines.len(), 1);
        assert_eq!(medicines[0].name, "Aspirin");
        assert_eq!(medicines[0].reminders.len(), 1);
        assert_eq!(medicines[0].reminders[0].time, "08:00");
        assert_eq!(medicines[0].reminders[0].dosage, "1 таблетка");
        assert!(medicines[0].reminders[0].active);
    }

    #[tokio::test]
    async fn test_adding_more_times_reuses_medicine() {
        let engine = test_engine().await;
        onboard(&engine).await;
        add_medicine(
            &engine,
            "Aspirin",
            &[("08:00", "1 tablet"), ("2015", "1 tablet")],
        )
        .await;

        let medicines = engine.database.list_medicines("42").await;
        assert_eq!(medicines.len(), 1, "second time must reuse the medicine");
        assert_eq!(medicines[0].reminders.len(), 2);
        assert_eq!(medicines[0].reminders[1].time, "20:15");
    }

    #[tokio::test]
    async fn test_invalid_input_reprompts_without_mutation() {
        let engine = test_engine().await;
        onboard(&engine).await;

        say(&engine, captions::ADD_MEDICINE).await;
        let reply = say(&engine, &"n".repeat(101)).await;
        assert!(reply.text.contains("Invalid medicine name"));

        say(&engine, "Aspirin").await;
        let reply = say(&engine, "25:70").await;
        assert!(reply.text.contains("Invalid time format"));
        let reply = say(&engine, "830").await;
        assert!(reply.text.contains("08:30"), "valid retry must advance");

        // Nothing was persisted before the save transition
        assert!(engine.database.list_medicines("42").await.is_empty());
    }

    #[tokio::test]
    async fn test_edit_restarts_entry() {
        let engine = test_engine().await;
        onboard(&engine).await;

        say(&engine, captions::ADD_MEDICINE).await;
        say(&engine, "Asperin").await;
        say(&engine, "08:00").await;
        say(&engine, "1 tablet").await;
        let reply = say(&engine, captions::EDIT).await;
        assert!(reply.text.contains("Enter the medicine name"));

        say(&engine, "Aspirin").await;
        say(&engine, "08:00").await;
        say(&engine, "1 tablet").await;
        say(&engine, captions::SAVE).await;
        say(&engine, captions::NO).await;

        let medicines = engine.database.list_medicines("42").await;
        assert_eq!(medicines.len(), 1);
        assert_eq!(medicines[0].name, "Aspirin");
    }

    #[tokio::test]
    async fn test_cancel_aborts_any_flow() {
        let engine = test_engine().await;
        onboard(&engine).await;

        say(&engine, captions::ADD_MEDICINE).await;
        say(&engine, "Aspirin").await;
        let reply = say(&engine, captions::CANCEL).await;
        assert!(reply.text.contains("Main menu"));
        assert!(engine.database.list_medicines("42").await.is_empty());

        // The draft is gone: free text lands in Idle again
        let reply = say(&engine, "Aspirin").await;
        assert!(reply.text.contains("I don't understand"));
    }

    #[tokio::test]
    async fn test_single_reminder_deletion_skips_picker() {
        let engine = test_engine().await;
        onboard(&engine).await;
        add_medicine(&engine, "Aspirin", &[("08:00", "1 tablet")]).await;

        say(&engine, captions::DELETE_MEDICINE).await;
        let reply = say(&engine, "1").await;
        // Straight to the confirmation step, no reminder picker
        assert!(reply.text.contains("Confirm deletion"), "{}", reply.text);
        let options = reply.options.unwrap();
        assert!(options.contains(&captions::CONFIRM_DELETE.to_string()));

        let reply = say(&engine, captions::CONFIRM_DELETE).await;
        assert!(reply.text.contains("deleted"));
        assert!(engine.database.list_medicines("42").await.is_empty());
    }

    #[tokio::test]
    async fn test_multi_reminder_deletion_offers_choice() {
        let engine = test_engine().await;
        onboard(&engine).await;
        add_medicine(
            &engine,
            "Aspirin",
            &[("08:00", "1 tablet"), ("20:00", "2 tablets")],
        )
        .await;

        say(&engine, captions::DELETE_MEDICINE).await;
        let reply = say(&engine, "1").await;
        assert!(reply.text.contains("What should be deleted"));
        // Whole medicine + two reminders + cancel
        assert_eq!(reply.options.as_ref().unwrap().len(), 4);

        // "2." is the 08:00 reminder
        let reply = say(&engine, "2").await;
        assert!(reply.text.contains("08:00"));
        say(&engine, captions::CONFIRM_DELETE).await;

        let medicines = engine.database.list_medicines("42").await;
        assert_eq!(medicines.len(), 1);
        assert_eq!(medicines[0].reminders.len(), 1);
        assert_eq!(medicines[0].reminders[0].time, "20:00");
    }

    #[tokio::test]
    async fn test_delete_all_needs_two_confirmations() {
        let engine = test_engine().await;
        onboard(&engine).await;
        add_medicine(&engine, "Aspirin", &[("08:00", "1 tablet"), ("20:00", "1 tablet")]).await;
        add_medicine(&engine, "Ibuprofen", &[("12:00", "1 tablet"), ("18:00", "1 tablet")]).await;
        add_medicine(&engine, "Vitamin D", &[("09:00", "2 drops")]).await;

        let reply = say(&engine, captions::DELETE_ALL).await;
        assert!(reply.text.contains("Medicines: 3"));
        assert!(reply.text.contains("Reminders: 5"));
        assert_eq!(engine.database.list_medicines("42").await.len(), 3);

        let reply = say(&engine, captions::DELETE_ALL_FIRST).await;
        assert!(reply.text.contains("FINAL CHECK"));
        // Still nothing deleted after the first confirmation
        assert_eq!(engine.database.list_medicines("42").await.len(), 3);

        let reply = say(&engine, captions::DELETE_ALL_TOKEN).await;
        assert!(reply.text.contains("Removed 3 medicines"));
        assert!(engine.database.list_medicines("42").await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_all_requires_exact_token() {
        let engine = test_engine().await;
        onboard(&engine).await;
        add_medicine(&engine, "Aspirin", &[("08:00", "1 tablet")]).await;

        say(&engine, captions::DELETE_ALL).await;
        say(&engine, captions::DELETE_ALL_FIRST).await;
        let reply = say(&engine, "I CONFIRM THE DELETION").await;
        assert!(reply.text.contains("Invalid choice"));
        assert_eq!(engine.database.list_medicines("42").await.len(), 1);

        let reply = say(&engine, captions::KEEP_ALL).await;
        assert!(reply.text.contains("safe"));
        assert_eq!(engine.database.list_medicines("42").await.len(), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_sender_gets_refusal_and_no_state() {
        let database = Database::new(":memory:").await.unwrap();
        let sessions = SessionStore::new();
        let engine = DialogEngine::new(
            database.clone(),
            sessions.clone(),
            Arc::new(DenyAll),
            load_timezone_choices(None),
        );

        let reply = engine.handle_message(&message("/start")).await;
        assert!(reply.text.contains("access is restricted"));
        assert!(database.get_user("42").await.is_none());
        assert_eq!(sessions.state_of("c1"), DialogState::Idle);
    }

    #[tokio::test]
    async fn test_new_user_is_routed_through_timezone_selection() {
        let engine = test_engine().await;
        let reply = say(&engine, captions::ADD_MEDICINE).await;
        assert!(reply.text.contains("timezone"));

        let reply = say(&engine, "Seattle (UTC-8/-7)").await;
        assert!(reply.text.contains("Timezone set"));
        let user = engine.database.get_user("42").await.unwrap();
        assert_eq!(user.timezone, "America/Los_Angeles");
    }

    #[tokio::test]
    async fn test_change_timezone_accepts_raw_iana_name() {
        let engine = test_engine().await;
        onboard(&engine).await;

        let reply = say(&engine, captions::CHANGE_TIMEZONE).await;
        let options = reply.options.unwrap();
        assert!(options.iter().any(|o| o.contains("(current)")));

        let reply = say(&engine, "Europe/Berlin").await;
        assert!(reply.text.contains("Timezone changed"));
        let user = engine.database.get_user("42").await.unwrap();
        assert_eq!(user.timezone, "Europe/Berlin");
    }

    #[tokio::test]
    async fn test_change_timezone_rejects_unknown_zone() {
        let engine = test_engine().await;
        onboard(&engine).await;

        say(&engine, captions::CHANGE_TIMEZONE).await;
        let reply = say(&engine, "Atlantis/Central").await;
        assert!(reply.text.contains("Invalid choice"));
        let user = engine.database.get_user("42").await.unwrap();
        assert_eq!(user.timezone, "Europe/Kyiv");
    }

    #[tokio::test]
    async fn test_list_medicines_menu_depends_on_content() {
        let engine = test_engine().await;
        onboard(&engine).await;

        let reply = say(&engine, captions::MY_MEDICINES).await;
        assert!(reply.text.contains("no saved medicines"));
        assert!(!reply
            .options
            .as_ref()
            .unwrap()
            .contains(&captions::DELETE_ALL.to_string()));

        add_medicine(&engine, "Aspirin", &[("08:00", "1 tablet")]).await;
        let reply = say(&engine, captions::MY_MEDICINES).await;
        assert!(reply.text.contains("Aspirin"));
        assert!(reply
            .options
            .as_ref()
            .unwrap()
            .contains(&captions::DELETE_ALL.to_string()));
    }

    #[tokio::test]
    async fn test_conversations_are_independent() {
        let engine = test_engine().await;
        onboard(&engine).await;

        // First conversation is mid-flow
        say(&engine, captions::ADD_MEDICINE).await;
        say(&engine, "Aspirin").await;

        // A second conversation of another sender starts clean
        let other = InboundMessage {
            conversation_id: "c2".into(),
            sender_id: "43".into(),
            sender_handle: None,
            text: "/start".into(),
        };
        let reply = engine.handle_message(&other).await;
        assert!(reply.text.contains("Welcome"));

        // And the first one is still waiting for a time
        let reply = say(&engine, "08:00").await;
        assert!(reply.text.contains("dosage"));
    }
}
