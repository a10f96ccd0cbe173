//! Headache Triage Demo CLI
//!
//! Drives the default triage engine from the terminal.
//!
//! Usage:
//!   cargo run -p demo -- chat
//!   cargo run -p demo -- extract "sudden headache, fever 39"
//!   cargo run -p demo -- decide '{"onset": "sudden-maximal"}'
//!   cargo run -p demo -- scenarios [NAME]
//!   cargo run -p demo -- validate-rules
//!
//! Build with `--features onnx` to let `[embedding] model_dir` in triage.toml
//! select a sentence-transformer encoder.
//!
//! Every subcommand accepts `--config DIR` to load the four tables from a
//! directory instead of the compiled-in copies.

use std::io::{self, BufRead, Read, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use triage_clinical::{scenarios, ClinicalConfig, ClinicalRuntime, SCENARIOS};
use triage_contracts::{
    case::ClinicalCase,
    error::{TriageError, TriageResult},
    session::TriageResponse,
};
use triage_core::traits::CaseExtractor;

// ── CLI definition ────────────────────────────────────────────────────────────

/// Headache triage: multi-turn questioning and imaging recommendation.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "Headache triage demo",
    long_about = "Runs the headache triage engine: free-text extraction, targeted\n\
                  follow-up questions, rule-based imaging decisions and audit chains."
)]
struct Cli {
    /// Directory holding vocabulary.toml, rules.toml, corpus.toml and triage.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive consultation on stdin.  `/info`, `/rx`, `/reset` and `/quit` are commands.
    Chat {
        /// Name printed on the prescription.
        #[arg(long, default_value = "Duty physician")]
        prescriber: String,
    },
    /// Print the case and metadata extracted from one message.
    Extract { text: String },
    /// Run the rule table on a JSON case (argument or stdin) and explain the match.
    Decide { case: Option<String> },
    /// Replay the scripted consultations, or only the one named.
    Scenarios { name: Option<String> },
    /// Report structural errors in the rule table.
    ValidateRules,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let result = load_runtime(cli.config.as_ref()).and_then(|runtime| match cli.command {
        Command::Chat { prescriber } => chat(&runtime, &prescriber),
        Command::Extract { text } => extract(&runtime, &text),
        Command::Decide { case } => decide(&runtime, case),
        Command::Scenarios { name } => run_scenarios(&runtime, name.as_deref()),
        Command::ValidateRules => validate_rules(&runtime),
    });

    if let Err(e) = result {
        eprintln!("Demo error: {}", e);
        std::process::exit(1);
    }
}

fn load_runtime(dir: Option<&PathBuf>) -> TriageResult<ClinicalRuntime> {
    let config = match dir {
        Some(dir) => {
            info!(dir = %dir.display(), "loading clinical tables from directory");
            ClinicalConfig::from_dir(dir)?
        }
        None => ClinicalConfig::shipped()?,
    };
    ClinicalRuntime::build(&config)
}

fn io_error(e: io::Error) -> TriageError {
    TriageError::InvalidInput {
        reason: format!("terminal I/O failed: {}", e),
    }
}

fn print_json(value: &impl serde::Serialize) -> TriageResult<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| TriageError::InvalidInput {
        reason: format!("output is not serializable: {}", e),
    })?;
    println!("{}", text);
    Ok(())
}

// ── Subcommands ───────────────────────────────────────────────────────────────

fn chat(runtime: &ClinicalRuntime, prescriber: &str) -> TriageResult<()> {
    let engine = runtime.engine();
    let mut session_id = engine.open_session(None)?;

    println!("Describe the headache.  /info, /rx, /reset, /quit");
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush().map_err(io_error)?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).map_err(io_error)? == 0 {
            break;
        }
        match line.trim() {
            "" => continue,
            "/quit" => break,
            "/info" => print_json(&engine.session_info(&session_id)?)?,
            "/rx" => match engine.prescription(&session_id, prescriber) {
                Ok(document) => println!("{}", document),
                Err(e) => println!("{}", e),
            },
            "/reset" => {
                engine.reset_session(&session_id);
                session_id = engine.open_session(None)?;
                println!("New session {}", session_id);
            }
            text => match engine.submit_message(Some(&session_id), text) {
                Ok(response) => print_response(&response),
                Err(TriageError::InvalidInput { reason }) => println!("{}", reason),
                Err(e) => return Err(e),
            },
        }
    }

    let intact = runtime.audit().verify_integrity(&session_id);
    println!("Audit chain for {}: {}", session_id, if intact { "intact" } else { "BROKEN" });
    Ok(())
}

fn extract(runtime: &ClinicalRuntime, text: &str) -> TriageResult<()> {
    let (case, metadata) = runtime.extractor().extract(text)?;
    print_json(&json!({ "case": case, "metadata": metadata }))
}

fn decide(runtime: &ClinicalRuntime, case: Option<String>) -> TriageResult<()> {
    let raw = match case {
        Some(raw) => raw,
        None => {
            let mut raw = String::new();
            io::stdin().read_to_string(&mut raw).map_err(io_error)?;
            raw
        }
    };
    let case: ClinicalCase = serde_json::from_str(&raw).map_err(|e| TriageError::InvalidInput {
        reason: format!("case is not valid JSON: {}", e),
    })?;
    print_json(&runtime.decision().explain(&case.normalized()))
}

fn run_scenarios(runtime: &ClinicalRuntime, name: Option<&str>) -> TriageResult<()> {
    let selected: Vec<&scenarios::Scenario> = match name {
        Some(name) => match scenarios::find(name) {
            Some(scenario) => vec![scenario],
            None => {
                return Err(TriageError::InvalidInput {
                    reason: format!(
                        "unknown scenario '{}'; known: {}",
                        name,
                        SCENARIOS.iter().map(|s| s.name).collect::<Vec<_>>().join(", ")
                    ),
                })
            }
        },
        None => SCENARIOS.iter().collect(),
    };

    for scenario in selected {
        println!("=== {}: {} ===", scenario.name, scenario.summary);
        let run = scenarios::run(runtime, scenario)?;
        for (message, response) in scenario.messages.iter().zip(&run.responses) {
            println!();
            println!("patient > {}", message);
            print_response(response);
        }
        println!();
        println!(
            "Audit chain for {}: {}",
            run.session_id,
            if run.audit_intact { "intact" } else { "BROKEN" }
        );
        println!();
    }
    Ok(())
}

fn validate_rules(runtime: &ClinicalRuntime) -> TriageResult<()> {
    let decision = runtime.decision();
    let errors = decision.validate();
    println!(
        "{} rules, {} imaging studies, {} errors",
        decision.rules().len(),
        decision.catalogue().len(),
        errors.len()
    );
    for error in &errors {
        println!("  {}", error);
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TriageError::ConfigError {
            reason: format!("{} invalid rules", errors.len()),
        })
    }
}

// ── Output ────────────────────────────────────────────────────────────────────

fn print_response(response: &TriageResponse) {
    println!("triage  > {}", response.message);
    if let Some(reason) = response.termination {
        println!("          [terminated: {}]", reason);
    }
}
