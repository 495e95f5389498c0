use std::fmt::Write;
use trial_match_core::{SearchPhase, SearchState, Trial};

/// Plain-text view of a search, in the order the server ranked the trials.
pub fn render_state(state: &SearchState) -> String {
    let mut out = String::new();

    match state.phase {
        SearchPhase::Idle => {}
        SearchPhase::Validating | SearchPhase::InFlight => {
            let _ = writeln!(out, "Searching...");
        }
        SearchPhase::Failed => {
            let _ = writeln!(
                out,
                "error: {}",
                state.error_message.as_deref().unwrap_or_default()
            );
        }
        SearchPhase::EmptyResult => {
            let _ = writeln!(
                out,
                "info: {}",
                state.info_message.as_deref().unwrap_or_default()
            );
        }
        SearchPhase::Succeeded => {
            let trials = state.matches.as_deref().unwrap_or_default();
            let _ = writeln!(out, "Potential Matches ({})", trials.len());
            for (rank, trial) in trials.iter().enumerate() {
                out.push('\n');
                render_trial(&mut out, rank + 1, trial);
            }
        }
    }

    if state.phase.is_terminal() {
        if let Some(searched_at) = state.searched_at {
            let _ = writeln!(out, "searched_at={}", searched_at.to_rfc3339());
        }
    }

    out
}

fn render_trial(out: &mut String, rank: usize, trial: &Trial) {
    let _ = writeln!(out, "{rank}. {} ({})", trial.title, trial.trial_id);

    let marker = if trial.is_recruiting() { "*" } else { "-" };
    let _ = writeln!(
        out,
        "   [{marker} {}] Phase: {} | Condition: {}",
        trial.status, trial.phase, trial.condition
    );

    if !trial.locations().is_empty() {
        let _ = writeln!(out, "   Locations: {}", trial.locations().join(", "));
    }
    if let Some(contact) = &trial.contact_info {
        let _ = writeln!(out, "   Contact: {contact}");
    }
    if let Some(url) = &trial.details_url {
        let _ = writeln!(out, "   Details: {url}");
    }

    if !trial.match_rationale().is_empty() {
        let _ = writeln!(out, "   Match Rationale:");
        for reason in trial.match_rationale() {
            let _ = writeln!(out, "     + {reason}");
        }
    }
    if !trial.flags().is_empty() {
        let _ = writeln!(out, "   Flags / Potential Issues:");
        for flag in trial.flags() {
            let _ = writeln!(out, "     ! {flag}");
        }
    }
}
