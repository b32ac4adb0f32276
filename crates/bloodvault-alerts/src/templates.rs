//! Message templates for donor alerts.

use bloodvault_core::BloodGroup;

/// Sign-off used in every message.
pub const SENDER_NAME: &str = "BloodVault";

/// Urgent-need message for an eligible donor.
pub fn emergency_message(donor_name: &str, blood_group: BloodGroup, city: Option<&str>) -> String {
    let place = city
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("your area");
    format!(
        "Hi {},\nUrgent need for {} blood group in {}! Please contact {} if you can donate.",
        donor_name, blood_group, place, SENDER_NAME
    )
}

/// Reminder for a donor whose cooldown ends soon.
pub fn reminder_message(donor_name: &str, days_remaining: u32) -> String {
    let days = if days_remaining == 1 { "day" } else { "days" };
    format!(
        "Hi {},\nYou will be eligible to donate blood in {} {}! {} thanks you for your support.",
        donor_name, days_remaining, days, SENDER_NAME
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emergency_message_with_city() {
        let msg = emergency_message("Aisha", BloodGroup::ONeg, Some("Dubai"));
        assert_eq!(
            msg,
            "Hi Aisha,\nUrgent need for O- blood group in Dubai! Please contact BloodVault if you can donate."
        );
    }

    #[test]
    fn test_emergency_message_without_city() {
        let msg = emergency_message("Aisha", BloodGroup::AbPos, None);
        assert!(msg.contains("AB+ blood group in your area"));
        let msg = emergency_message("Aisha", BloodGroup::AbPos, Some("  "));
        assert!(msg.contains("in your area"));
    }

    #[test]
    fn test_reminder_message() {
        assert!(reminder_message("Omar", 5).contains("in 5 days!"));
        assert!(reminder_message("Omar", 1).contains("in 1 day!"));
    }
}
