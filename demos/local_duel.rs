//! Both players at one keyboard.
//!
//! ```text
//! cargo run --example local_duel -- --host Ada --guest Brook --rounds 3
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::io::{BufRead, Write};

use clap::Parser;
use year_duel::catalog::format_year;
use year_duel::prelude::*;

#[derive(Parser)]
struct Opt {
    #[arg(long)]
    host: String,
    #[arg(long)]
    guest: String,
    #[arg(short, long, default_value_t = 5)]
    rounds: u32,
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(tracing::Level::WARN)
            .finish(),
    )?;
    let opt = Opt::parse();

    let mut builder = SessionBuilder::new().with_total_rounds(opt.rounds);
    if let Some(seed) = opt.seed {
        builder = builder.with_seed(seed);
    }
    let mut session = builder.start_local_session()?;
    session.start_local_game(&opt.host, &opt.guest)?;

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    while session.state() != CoordinatorState::GameComplete {
        let Some(round) = session.round() else {
            break;
        };
        println!(
            "\nRound {}: when was the {} invented?",
            round.round_index(),
            round.item().name
        );
        for (role, name) in [(Role::Host, &opt.host), (Role::Guest, &opt.guest)] {
            loop {
                print!("{name}, your guess: ");
                std::io::stdout().flush()?;
                let Some(line) = lines.next() else {
                    return Ok(());
                };
                match session.submit_guess_input(role, &line?) {
                    Ok(_) => break,
                    Err(err) => println!("{err}"),
                }
            }
        }
        if let Some(result) = session.game().and_then(|game| game.history().last()) {
            println!(
                "{} appeared in {}. {}",
                result.item.name,
                format_year(result.correct_year),
                result.item.fun_fact
            );
            for (_, entry) in result.entries.iter() {
                println!("  {}: {} points", entry.name, entry.score);
            }
        }
        session.advance_round()?;
    }

    if let Some(summary) = session.summary() {
        let winner = match summary.winner {
            Some(Role::Host) => opt.host.as_str(),
            Some(Role::Guest) => opt.guest.as_str(),
            None => "nobody",
        };
        println!(
            "\nFinal: {} {} - {} {}. Winner: {winner}",
            opt.host, summary.scores.host, summary.scores.guest, opt.guest
        );
    }
    Ok(())
}
