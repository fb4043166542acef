use anyhow::{Context, Result};
use clap::Parser;
use polisim_core::{ledger, EngineConfig, JsonFileStore, RoundSession};
use polisim_data::Catalog;
use rand::rngs::StdRng;
use rand::SeedableRng;

mod loader;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the shared storage documents
    #[arg(long, default_value = "shared_data")]
    data_dir: String,

    /// Number of rounds to simulate
    #[arg(short, long, default_value_t = 3)]
    rounds: u32,

    /// RNG seed for deterministic replay
    #[arg(long, default_value_t = 12345)]
    seed: u64,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = std::str::FromStr::from_str(&args.log_level).unwrap_or(log::LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .init();

    log::info!("Starting polisim...");

    let catalog = Catalog::builtin();
    let config = EngineConfig::default();
    let store = JsonFileStore::new(&args.data_dir);
    let mut rng = StdRng::seed_from_u64(args.seed);

    let mut countries = loader::load_initial_states(catalog);
    for country in &mut countries {
        loader::randomize_policy(country, catalog, &mut rng);
    }

    for round in 1..=args.rounds {
        log::info!("=== Round {round} ===");

        let mut sessions: Vec<RoundSession> = countries
            .drain(..)
            .map(|country| RoundSession::new(&store, catalog, &config, round, country))
            .collect();

        // Policy phase: every session freezes its dials and persists them.
        for session in &mut sessions {
            let growth = session
                .confirm_policy()
                .with_context(|| format!("policy confirmation for {}", session.country.id))?;
            log::info!("{}: growth preview {growth} papers/round", session.country.id);
        }

        // Cooperation phase: submit every sheet, then confirm every sheet.
        let sheets: Vec<_> = sessions
            .iter()
            .map(|session| loader::scripted_sheet(catalog, &session.country.id))
            .collect::<Result<_>>()?;
        for (session, sheet) in sessions.iter().zip(&sheets) {
            session.submit_cooperation(sheet)?;
        }
        for (session, sheet) in sessions.iter().zip(&sheets) {
            let cost = session
                .confirm_cooperation(sheet)
                .with_context(|| format!("cooperation confirmation for {}", session.country.id))?;
            log::debug!("{}: cooperation cost {cost}", session.country.id);
        }

        // Event phase: private domestic draws, one intel sweep each, then
        // the shared international resolution.
        for session in &mut sessions {
            let event = session.draw_domestic(&mut rng)?;
            log::info!("{}: domestic event '{}'", session.country.id, event.title);

            match session.intel_random_sweep(&mut rng) {
                Ok(report) => log::debug!("{}: intel on {}", session.country.id, report.country),
                Err(e) if e.is_waiting() => {
                    log::debug!("{}: intel waiting ({e})", session.country.id)
                }
                Err(e) => return Err(e).context("intel sweep"),
            }
        }
        for (session, sheet) in sessions.iter_mut().zip(&sheets) {
            let entry = session.apply_events(sheet, &mut rng)?;
            log::info!(
                "{}: papers {:.0} ({:+} growth, {:+} domestic, {:+} international), models {:.2}",
                session.country.id,
                entry.papers,
                entry.breakdown.base_growth,
                entry.breakdown.domestic_papers,
                entry.breakdown.international_papers,
                entry.models,
            );
        }

        countries = sessions.into_iter().map(|s| s.country).collect();

        let ids: Vec<String> = countries.iter().map(|c| c.id.clone()).collect();
        let record = ledger::collect(
            &store,
            &catalog.scenario,
            &config.curve,
            round,
            &ids,
            &mut rng,
        )?;
        ledger::append(&store, &record)
            .with_context(|| format!("appending round {round} to the ledger"))?;
        log::info!(
            "Round {round} recorded (US {:.0} papers, China {:.0} papers, checksum {:016x})",
            record.superpowers.us_papers,
            record.superpowers.china_papers,
            record.checksum(),
        );
    }

    log::info!("Simulation finished after {} rounds", args.rounds);
    Ok(())
}
