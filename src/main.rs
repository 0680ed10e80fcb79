use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use codepair::config::Config;
use codepair::llm::{extract, OllamaClient};
use codepair::logger::init_tracing;
use codepair::state::{PairResults, SessionState};
use codepair::store::{FixtureStore, JsonStore, OperationReport, ProblemId, ProblemStore};
use codepair::testgen::runner::render_results;
use codepair::testgen::{CandidatePair, CandidateSlot, HarnessRunner};

#[derive(Parser)]
#[command(
    name = "codepair",
    version,
    about = "Generate two candidate solutions, test them, and record which one a human prefers."
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    #[arg(long, global = true, help = "Config file (default: <config dir>/codepair/config.toml)")]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Store document overriding the configured one")]
    store: Option<PathBuf>,

    #[arg(long, global = true, help = "Directory for materialized harness files")]
    workdir: Option<PathBuf>,

    #[arg(long, global = true, help = "Kill a harness run after this many seconds")]
    timeout: Option<u64>,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Parse a saved generation body and print both candidates
    Extract {
        #[arg(help = "File holding the raw NDJSON body")]
        payload: PathBuf,
    },

    /// Run a problem's fixture against its stored or given candidates
    Run {
        #[arg(long)]
        problem: ProblemId,

        #[arg(long, num_args = 2, value_names = ["VERSION1", "VERSION2"], help = "Candidate source files")]
        candidates: Option<Vec<PathBuf>>,
    },

    /// Request a fresh pair from the model, then test it
    Generate {
        #[arg(long)]
        problem: ProblemId,

        #[arg(long, help = "Instruction placed before the problem description")]
        instruction: Option<String>,

        #[arg(long, default_value_t = false, help = "Persist the generated pair")]
        save: bool,
    },

    /// Record which version is better
    Prefer {
        #[arg(long)]
        problem: ProblemId,

        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=2))]
        version: u8,

        #[arg(long, default_value_t = false, help = "Also persist the stored code pair")]
        with_code: bool,
    },

    /// Show the first problem still waiting for a pair
    Next,
}

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    let cli = Cli::parse();
    let cfg = load_config(&cli.global)?;

    match cli.command {
        CliCommand::Extract { payload } => cmd_extract(&payload),
        CliCommand::Run {
            problem,
            candidates,
        } => cmd_run(&cfg, problem, candidates),
        CliCommand::Generate {
            problem,
            instruction,
            save,
        } => cmd_generate(&cfg, problem, instruction, save),
        CliCommand::Prefer {
            problem,
            version,
            with_code,
        } => cmd_prefer(&cfg, problem, version, with_code),
        CliCommand::Next => cmd_next(&cfg),
    }
}

fn load_config(args: &GlobalArgs) -> Result<Config, Box<dyn Error>> {
    let mut cfg = Config::load(args.config.as_deref())?;
    if let Some(store) = &args.store {
        cfg.store = store.clone();
    }
    if let Some(workdir) = &args.workdir {
        cfg.workdir = workdir.clone();
    }
    if args.timeout.is_some() {
        cfg.test_timeout_secs = args.timeout;
    }
    Ok(cfg)
}

fn runner(cfg: &Config) -> HarnessRunner {
    HarnessRunner::new(&cfg.workdir)
        .with_python(cfg.python.clone())
        .with_timeout(cfg.test_timeout())
}

fn session_at(store: &JsonStore, id: ProblemId) -> Result<SessionState, Box<dyn Error>> {
    let mut state = SessionState::new(store.problems(), 0);
    if !state.select_id(id) {
        return Err(format!("no problem with id {id}").into());
    }
    Ok(state)
}

/* ============================================================
   Commands
   ============================================================ */

fn cmd_extract(payload: &Path) -> Result<(), Box<dyn Error>> {
    let raw = fs::read_to_string(payload)?;
    let pair = extract(&raw)?;
    print_pair(&pair);
    Ok(())
}

fn cmd_run(
    cfg: &Config,
    id: ProblemId,
    candidates: Option<Vec<PathBuf>>,
) -> Result<(), Box<dyn Error>> {
    let store = JsonStore::open(&cfg.store)?;
    let mut state = session_at(&store, id)?;

    if let Some(files) = candidates {
        if let [a, b] = files.as_slice() {
            state.candidates = Some(CandidatePair::new(
                fs::read_to_string(a)?,
                fs::read_to_string(b)?,
            ));
        }
    }
    if state.candidates.is_none() {
        return Err(format!("problem {id} has no code pair; run `generate` first").into());
    }

    run_and_print(&store, &mut state, &runner(cfg))
}

fn cmd_generate(
    cfg: &Config,
    id: ProblemId,
    instruction: Option<String>,
    save: bool,
) -> Result<(), Box<dyn Error>> {
    let mut store = JsonStore::open(&cfg.store)?;
    let mut state = session_at(&store, id)?;
    let client = OllamaClient::from_config(cfg);
    let instruction = instruction.unwrap_or_else(|| cfg.instruction.clone());

    println!("requesting a pair from {}", client.model());
    let pair = state.generate(&client, &instruction)?;
    print_pair(&pair);

    if let Some(fixture) = store.load_fixture(id)? {
        let retargeted = state.retarget_fixture(&fixture);
        if retargeted.function_name != fixture.function_name {
            store.update_function_name(id, &retargeted.function_name)?;
        }
    }

    run_and_print(&store, &mut state, &runner(cfg))?;

    if save {
        print_report(&state.save_pair(&mut store));
    }
    Ok(())
}

fn cmd_prefer(
    cfg: &Config,
    id: ProblemId,
    version: u8,
    with_code: bool,
) -> Result<(), Box<dyn Error>> {
    let mut store = JsonStore::open(&cfg.store)?;
    let mut state = session_at(&store, id)?;
    let preference = CandidateSlot::from_number(version)
        .ok_or_else(|| format!("version must be 1 or 2, got {version}"))?;

    let report = if with_code {
        state.submit_code_and_preference(&mut store, preference)
    } else {
        state.submit_preference(&mut store, preference)
    };
    print_report(&report);

    if !report.is_success() {
        return Err(report.message.into());
    }
    Ok(())
}

fn cmd_next(cfg: &Config) -> Result<(), Box<dyn Error>> {
    let store = JsonStore::open(&cfg.store)?;
    let state = SessionState::new(store.problems(), store.first_unlabeled_index());

    match state.current() {
        Some(p) => {
            println!("{}. {} [{}]", p.id, p.title, p.difficulty);
            println!();
            println!("{}", p.description);
        }
        None => println!("store has no problems"),
    }
    Ok(())
}

/* ============================================================
   Output
   ============================================================ */

fn run_and_print(
    store: &JsonStore,
    state: &mut SessionState,
    runner: &HarnessRunner,
) -> Result<(), Box<dyn Error>> {
    let Some(id) = state.current_id() else {
        return Ok(());
    };
    let Some(fixture) = store.load_fixture(id)? else {
        println!("problem {id} has no unit tests");
        return Ok(());
    };

    if let Some(results) = state.run_tests(runner, &fixture) {
        print_results(results, fixture.len());
    }
    Ok(())
}

fn print_pair(pair: &CandidatePair) {
    for (slot, code) in pair.iter() {
        println!("--- {slot} ---");
        println!("{code}");
    }
}

fn print_results(results: &PairResults, rows: usize) {
    for slot in CandidateSlot::ALL {
        match results.get(slot) {
            Ok(report) => {
                let glyphs: String = report.outcomes.iter().map(|o| o.symbol()).collect();
                print!("{}", render_results(&report.outcomes, rows, slot.label()));
                println!(
                    "{glyphs} ({}/{} passed, {} failed)",
                    report.passed(),
                    rows,
                    report.failed()
                );
            }
            Err(e) => println!("`{slot}:` harness failed: {e}"),
        }
    }
}

fn print_report(report: &OperationReport) {
    if report.is_success() {
        println!("✅ {}", report.message);
    } else {
        eprintln!("🚨 {}", report.message);
    }
}
