// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text an agent is embedded from.

use twinlink_core::types::Agent;

/// Compose the embedding input for an agent: one labelled line per
/// non-empty persona field.
pub fn agent_profile_text(agent: &Agent) -> String {
    let mut lines = Vec::with_capacity(5);
    push_line(&mut lines, "Persona", &agent.persona_description);
    push_line(&mut lines, "Background", &agent.background_context);
    push_line(&mut lines, "Goals", &agent.goals.join(", "));
    push_line(&mut lines, "Interests", &agent.interests.join(", "));
    push_line(&mut lines, "Personality", &agent.personality_type);
    lines.join("\n")
}

fn push_line(lines: &mut Vec<String>, label: &str, value: &str) {
    let value = value.trim();
    if !value.is_empty() {
        lines.push(format!("{label}: {value}"));
    }
}

#[cfg(test)]
mod tests {
    use twinlink_storage::testing::agent;

    use super::*;

    #[test]
    fn includes_populated_fields_in_order() {
        let mut a = agent("a1", "u1");
        a.background_context = "Backend engineer".into();
        a.goals = vec!["find a cofounder".into(), "learn Rust".into()];
        a.interests = vec!["climbing".into()];

        assert_eq!(
            agent_profile_text(&a),
            "Persona: Curious and upbeat\n\
             Background: Backend engineer\n\
             Goals: find a cofounder, learn Rust\n\
             Interests: climbing\n\
             Personality: explorer"
        );
    }

    #[test]
    fn skips_blank_fields() {
        let mut a = agent("a1", "u1");
        a.persona_description = "   ".into();
        a.personality_type = String::new();
        assert_eq!(agent_profile_text(&a), "");
    }
}
