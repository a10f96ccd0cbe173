//! Scripted consultations.
//!
//! Each scenario is a fixed sequence of patient messages replayed through one
//! session of a [`ClinicalRuntime`].  The demo binary prints them; the tests
//! pin their outcomes.

use tracing::debug;

use triage_contracts::{error::TriageResult, session::TriageResponse};

use crate::runtime::ClinicalRuntime;

/// A named, scripted consultation.
#[derive(Debug, Clone, Copy)]
pub struct Scenario {
    pub name: &'static str,
    pub summary: &'static str,
    /// Messages in order.  Replay stops at the first concluding response.
    pub messages: &'static [&'static str],
}

pub const THUNDERCLAP: Scenario = Scenario {
    name: "thunderclap",
    summary: "Sudden maximal headache, concluded on the first message",
    messages: &["Sudden headache, the worst headache of my life, it came on like a thunderclap an hour ago"],
};

pub const MENINGITIS: Scenario = Scenario {
    name: "meningitis",
    summary: "Fever with a stiff neck",
    messages: &["fever 39, stiff neck"],
};

pub const CHRONIC_STABLE: Scenario = Scenario {
    name: "chronic-stable",
    summary: "Long-standing daily headache the patient describes as unchanged",
    messages: &["I've had daily headaches for two years, same as usual"],
};

pub const CHRONIC_ASKED: Scenario = Scenario {
    name: "chronic-asked",
    summary: "Chronic headache where the engine asks about a recent change first",
    messages: &["Daily headaches for two years", "no"],
};

pub const PREGNANCY: Scenario = Scenario {
    name: "pregnancy",
    summary: "Thunderclap headache in pregnancy, imaging switched to non-ionizing studies",
    messages: &["I am 30 weeks pregnant and had a sudden thunderclap headache"],
};

pub const SUBACUTE: Scenario = Scenario {
    name: "subacute",
    summary: "Progressive tension-like headache cleared question by question",
    messages: &[
        "45 year old man, headache getting gradually worse for three weeks, pressing on both sides, 6/10",
        "no", "no", "no", "no", "no", "no", "no", "no", "no", "no",
    ],
};

pub const SCENARIOS: &[Scenario] = &[THUNDERCLAP, MENINGITIS, CHRONIC_STABLE, CHRONIC_ASKED, PREGNANCY, SUBACUTE];

/// Look a scenario up by name.
pub fn find(name: &str) -> Option<&'static Scenario> {
    SCENARIOS.iter().find(|s| s.name == name)
}

/// The outcome of replaying one scenario.
#[derive(Debug, Clone)]
pub struct ScenarioRun {
    pub name: &'static str,
    pub session_id: String,
    /// One response per message actually submitted.
    pub responses: Vec<TriageResponse>,
    /// Whether the session's audit chain verified after the replay.
    pub audit_intact: bool,
}

impl ScenarioRun {
    pub fn last(&self) -> Option<&TriageResponse> {
        self.responses.last()
    }

    pub fn concluded(&self) -> bool {
        self.last().is_some_and(|r| r.dialogue_complete)
    }
}

/// Replay `scenario` through a fresh session of `runtime`.
pub fn run(runtime: &ClinicalRuntime, scenario: &Scenario) -> TriageResult<ScenarioRun> {
    let engine = runtime.engine();
    let session_id = engine.open_session(None)?;
    let mut responses = Vec::with_capacity(scenario.messages.len());

    for message in scenario.messages {
        let response = engine.submit_message(Some(&session_id), message)?;
        debug!(
            scenario = scenario.name,
            next_question = ?response.next_question,
            complete = response.dialogue_complete,
            "scenario turn"
        );
        let complete = response.dialogue_complete;
        responses.push(response);
        if complete {
            break;
        }
    }

    Ok(ScenarioRun {
        name: scenario.name,
        audit_intact: runtime.audit().verify_integrity(&session_id),
        session_id,
        responses,
    })
}
