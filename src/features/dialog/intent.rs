//! Presentation mapping: message text to structured intent
//!
//! Dialog logic never branches on display captions. This layer owns the
//! captions (the transport renders them as quick-reply buttons) and maps
//! whatever the user typed or tapped onto an [`Intent`]. Swapping the
//! display language touches only this file.

/// Button captions and command strings understood by the bot
pub mod captions {
    pub const ADD_MEDICINE: &str = "➕ Add medicine";
    pub const ADD_MORE: &str = "➕ Add more";
    pub const MY_MEDICINES: &str = "📋 My medicines";
    pub const DELETE_MEDICINE: &str = "🗑 Delete medicine";
    pub const DELETE_ALL: &str = "⚠️ Delete ALL medicines";
    pub const CHANGE_TIMEZONE: &str = "🌍 Change timezone";
    pub const HELP: &str = "❓ Help";
    pub const MAIN_MENU: &str = "🏠 Main menu";
    pub const CANCEL: &str = "❌ Cancel";
    pub const SAVE: &str = "✅ Save";
    pub const EDIT: &str = "✏️ Edit";
    pub const YES: &str = "Yes";
    pub const NO: &str = "No";
    pub const CONFIRM_DELETE: &str = "✅ Yes, delete";
    pub const DELETE_ALL_FIRST: &str = "⚠️ YES, delete everything";
    pub const NO_CANCEL: &str = "❌ No, cancel";
    pub const KEEP_ALL: &str = "❌ No, keep my medicines";
    /// Exact token required by the final delete-all confirmation
    pub const DELETE_ALL_TOKEN: &str = "🚨 I CONFIRM THE DELETION";

    pub const PRESET_MORNING: &str = "Morning 08:00";
    pub const PRESET_NOON: &str = "Noon 14:00";
    pub const PRESET_EVENING: &str = "Evening 20:00";
}

/// Normalized meaning of one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Start,
    AddMedicine,
    ListMedicines,
    DeleteMedicine,
    DeleteAll,
    ChangeTimezone,
    Help,
    MainMenu,
    Cancel,
    Save,
    Edit,
    Yes,
    No,
    ConfirmDelete,
    ConfirmDeleteAllFirst,
    ConfirmDeleteAllFinal,
    /// Anything else: free-form input for the current state to interpret
    Text(String),
}

impl Intent {
    pub fn parse(text: &str) -> Intent {
        let text = text.trim();
        match text {
            "/start" => Intent::Start,
            "/cancel" => Intent::Cancel,
            "/help" => Intent::Help,
            captions::ADD_MEDICINE | captions::ADD_MORE => Intent::AddMedicine,
            captions::MY_MEDICINES => Intent::ListMedicines,
            captions::DELETE_MEDICINE => Intent::DeleteMedicine,
            captions::DELETE_ALL => Intent::DeleteAll,
            captions::CHANGE_TIMEZONE => Intent::ChangeTimezone,
            captions::HELP => Intent::Help,
            captions::MAIN_MENU => Intent::MainMenu,
            captions::CANCEL => Intent::Cancel,
            captions::SAVE => Intent::Save,
            captions::EDIT => Intent::Edit,
            captions::YES => Intent::Yes,
            captions::NO | captions::NO_CANCEL | captions::KEEP_ALL => Intent::No,
            captions::CONFIRM_DELETE => Intent::ConfirmDelete,
            captions::DELETE_ALL_FIRST => Intent::ConfirmDeleteAllFirst,
            captions::DELETE_ALL_TOKEN => Intent::ConfirmDeleteAllFinal,
            _ => Intent::Text(text.to_string()),
        }
    }
}

/// Resolve a preset time caption to its canonical time
pub fn preset_time(text: &str) -> Option<&'static str> {
    match text.trim() {
        captions::PRESET_MORNING => Some("08:00"),
        captions::PRESET_NOON => Some("14:00"),
        captions::PRESET_EVENING => Some("20:00"),
        _ => None,
    }
}
