//! Display formatting for dialog replies and reminder texts

use crate::database::Medicine;

/// Render a user's medicines grouped per medicine, reminders sorted by time
pub fn format_medicine_list(medicines: &[Medicine]) -> String {
    if medicines.is_empty() {
        return "📋 You have no saved medicines yet.".to_string();
    }

    let mut result = String::from("📋 Your medicines:\n\n");
    for (i, medicine) in medicines.iter().enumerate() {
        result.push_str(&format!("{}. 💊 {}\n", i + 1, medicine.name));

        let mut active = medicine.active_reminders();
        active.sort_by(|a, b| a.time.cmp(&b.time));

        if active.is_empty() {
            result.push_str("   (no active reminders)\n");
        } else {
            for reminder in active {
                result.push_str(&format!("   🕐 {} - {}\n", reminder.time, reminder.dosage));
            }
        }
        result.push('\n');
    }
    result
}

/// The text a due reminder delivers to its owner
pub fn format_reminder_message(medicine_name: &str, dosage: &str, time: &str) -> String {
    format!("💊 {time} - time to take {medicine_name} ({dosage})")
}

/// Parse a numbered selection like "2. 💊 Aspirin (1 reminder)" or a bare "2".
/// Returns the 1-based index.
pub fn parse_selection_index(text: &str) -> Option<usize> {
    let leading: String = text
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    match leading.parse() {
        Ok(0) | Err(_) => None,
        Ok(index) => Some(index),
    }
}

pub const HELP_TEXT: &str = "❓ Medicine Assistant help\n\n\
📋 MAIN FUNCTIONS:\n\n\
➕ ADD MEDICINE\n\
• Adds a new medicine with reminders\n\
• Several times per medicine are fine\n\
• Flexible time formats are accepted\n\n\
📋 MY MEDICINES\n\
• Shows all saved medicines\n\
• Reminders grouped per medicine, sorted by time\n\n\
🗑 DELETE MEDICINE\n\
• Delete a single reminder or a whole medicine\n\
• Deleting ALL medicines asks for double confirmation\n\n\
🌍 CHANGE TIMEZONE\n\
• Pick a city from the list or type any IANA name\n\
• Reminders adapt automatically\n\n\
⏰ TIME FORMATS:\n\
• 8 → 08:00\n\
• 830 → 08:30\n\
• 1245 → 12:45\n\
• 08:00, 14:30, 20:15\n\n\
💊 DOSAGE FORMATS:\n\
• 1 tablet, 2 capsules\n\
• 5 ml, half a tablet, 1/2 tablet\n\n\
💊 Reminders arrive automatically at the given time in your timezone!";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::ReminderEntry;

    fn medicine(name: &str, reminders: Vec<ReminderEntry>) -> Medicine {
        Medicine {
            id: 1,
            name: name.to_string(),
            reminders,
        }
    }

    fn reminder(id: i64, time: &str, dosage: &str, active: bool) -> ReminderEntry {
        ReminderEntry {
            id,
            time: time.to_string(),
            dosage: dosage.to_string(),
            active,
        }
    }

    #[test]
    fn test_format_empty_list() {
        assert!(format_medicine_list(&[]).contains("no saved medicines"));
    }

    #[test]
    fn test_format_list_sorts_and_filters_reminders() {
        let medicines = vec![medicine(
            "Aspirin",
            vec![
                reminder(1, "20:00", "1 tablet", true),
                reminder(2, "08:00", "1 tablet", true),
                reminder(3, "12:00", "1 tablet", false),
            ],
        )];
        let text = format_medicine_list(&medicines);
        assert!(text.contains("1. 💊 Aspirin"));
        let morning = text.find("08:00").unwrap();
        let evening = text.find("20:00").unwrap();
        assert!(morning < evening);
        assert!(!text.contains("12:00"));
    }

    #[test]
    fn test_format_list_marks_medicines_without_reminders() {
        let medicines = vec![medicine("Aspirin", vec![])];
        assert!(format_medicine_list(&medicines).contains("(no active reminders)"));
    }

    #[test]
    fn test_format_reminder_message() {
        assert_eq!(
            format_reminder_message("Aspirin", "1 tablet", "08:00"),
            "💊 08:00 - time to take Aspirin (1 tablet)"
        );
    }

    #[test]
    fn test_parse_selection_index() {
        assert_eq!(parse_selection_index("2. 💊 Aspirin (1 reminder)"), Some(2));
        assert_eq!(parse_selection_index("10"), Some(10));
        assert_eq!(parse_selection_index(" 3 "), Some(3));
        assert_eq!(parse_selection_index("0"), None);
        assert_eq!(parse_selection_index("Aspirin"), None);
        assert_eq!(parse_selection_index(""), None);
    }
}
