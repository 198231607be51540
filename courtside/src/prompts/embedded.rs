//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// User turn for every composite task: topic, date, dependency context
pub const RUN: &str = include_str!("../../prompts/run.pmt");

/// Critic system instruction wrapper
pub const CRITIC: &str = include_str!("../../prompts/critic.pmt");

/// Suffix appended to composite instructions
pub const REVISION_NOTE: &str = include_str!("../../prompts/revision-note.pmt");

pub const INACTIVE_PLAYERS: &str = include_str!("../../prompts/inactive-players.pmt");
pub const ODDS: &str = include_str!("../../prompts/odds.pmt");
pub const RIVALRY: &str = include_str!("../../prompts/rivalry.pmt");
pub const SCHEDULE: &str = include_str!("../../prompts/schedule.pmt");
pub const MATCH_PREDICTION: &str = include_str!("../../prompts/match-prediction.pmt");
pub const FAN_NARRATIVE: &str = include_str!("../../prompts/fan-narrative.pmt");
pub const WRITER: &str = include_str!("../../prompts/writer.pmt");
pub const RESEARCH_CRITIC: &str = include_str!("../../prompts/research-critic.pmt");
pub const WRITER_CRITIC: &str = include_str!("../../prompts/writer-critic.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    let prompt = match name {
        "run" => RUN,
        "critic" => CRITIC,
        "revision-note" => REVISION_NOTE,
        "inactive-players" => INACTIVE_PLAYERS,
        "odds" => ODDS,
        "rivalry" => RIVALRY,
        "schedule" => SCHEDULE,
        "match-prediction" => MATCH_PREDICTION,
        "fan-narrative" => FAN_NARRATIVE,
        "writer" => WRITER,
        "research-critic" => RESEARCH_CRITIC,
        "writer-critic" => WRITER_CRITIC,
        _ => {
            debug!("get_embedded: no match found");
            return None;
        }
    };
    Some(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_embedded_critics_reference_output_and_exit() {
        for name in ["research-critic", "writer-critic"] {
            let prompt = get_embedded(name).unwrap();
            assert!(prompt.contains("{{output}}"), "{} lacks output slot", name);
            assert!(prompt.contains("exit_loop"), "{} lacks exit signal", name);
        }
    }

    #[test]
    fn test_get_embedded_run_template() {
        let run = get_embedded("run").unwrap();
        assert!(run.contains("Topic: {{entity_a}} vs {{entity_b}}"));
        assert!(run.contains("CONTEXT:"));
    }

    #[test]
    fn test_get_embedded_unknown() {
        assert!(get_embedded("unknown-template").is_none());
    }
}
