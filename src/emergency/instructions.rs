//! Safety instructions returned with every report

use super::model::EmergencyType;

const COMMON: &[&str] = &[
    "Stay calm and move to a safe, visible spot if you can.",
    "Keep your phone on and with you; responders may call back.",
    "Share what you see with responders: landmarks, street names, people around you.",
];

fn specific(emergency_type: EmergencyType) -> &'static [&'static str] {
    match emergency_type {
        EmergencyType::Sos => &[
            "If you are in immediate danger, call 110 now.",
            "Make noise and draw the attention of people nearby.",
        ],
        EmergencyType::Medical => &[
            "Do not move if you suspect a serious injury.",
            "Tell responders about conditions, allergies or medication.",
        ],
        EmergencyType::Accident => &[
            "Get out of traffic if it is safe to do so.",
            "Note vehicle details and plates if you can.",
        ],
        EmergencyType::Harassment => &[
            "Head for a busy, well-lit place or an open shop.",
            "Do not engage; keep your distance.",
        ],
        EmergencyType::Suspicious => &[
            "Keep your distance and do not confront anyone.",
            "Note a description of the person or vehicle.",
        ],
    }
}

/// Common instructions followed by the type-specific ones
pub fn instructions_for(emergency_type: EmergencyType) -> Vec<String> {
    COMMON
        .iter()
        .chain(specific(emergency_type))
        .map(|line| line.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_lines_come_first() {
        let lines = instructions_for(EmergencyType::Sos);
        assert_eq!(lines.len(), COMMON.len() + 2);
        assert_eq!(lines[0], COMMON[0]);
        assert!(lines.last().unwrap().contains("attention"));
    }

    #[test]
    fn test_each_type_adds_its_own_lines() {
        let medical = instructions_for(EmergencyType::Medical);
        let accident = instructions_for(EmergencyType::Accident);
        assert_ne!(medical, accident);
        assert_eq!(medical[..COMMON.len()], accident[..COMMON.len()]);
    }
}
