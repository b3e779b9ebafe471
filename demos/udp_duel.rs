//! Two terminals, one duel.
//!
//! ```text
//! cargo run --example udp_duel -- host --name Ada --port 7000
//! cargo run --example udp_duel -- join --name Brook --room 127.0.0.1:7000
//! ```
//!
//! Type a year and press enter to guess. The host types `next` to move on
//! and `again` for a rematch; either side can type `reset`.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::io::BufRead;
use std::net::IpAddr;
use std::sync::mpsc;
use std::thread;

use clap::{Parser, Subcommand};
use web_time::Duration;
use year_duel::catalog::format_year;
use year_duel::prelude::*;

#[derive(Parser)]
struct Opt {
    #[command(subcommand)]
    command: Command,
    /// Log protocol details
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Open a room and wait for a guest
    Host {
        #[arg(short, long)]
        name: String,
        #[arg(short, long, default_value_t = 7000)]
        port: u16,
        /// IP to advertise in the room token
        #[arg(long)]
        advertise: Option<IpAddr>,
        #[arg(short, long, default_value_t = 5)]
        rounds: u32,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Join a room by its token (`ip:port`)
    Join {
        #[arg(short, long)]
        name: String,
        #[arg(long)]
        room: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opt = Opt::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(if opt.verbose {
                tracing::Level::DEBUG
            } else {
                tracing::Level::WARN
            })
            .finish(),
    )?;

    let builder = SessionBuilder::new().with_guess_timeout(Duration::from_secs(3));
    let (mut session, host_name) = match opt.command {
        Command::Host {
            name,
            port,
            advertise,
            rounds,
            seed,
        } => {
            let mut channel = UdpChannel::bind_to_port(port, ChannelConfig::default())?;
            if let Some(ip) = advertise {
                channel = channel.with_advertised_ip(ip);
            }
            let mut builder = builder.with_total_rounds(rounds);
            if let Some(seed) = seed {
                builder = builder.with_seed(seed);
            }
            let session = builder.start_host_session(channel)?;
            if let Some(token) = session.room_token() {
                println!("Room open. Tell your guest to join {token}");
            }
            (session, Some(name))
        },
        Command::Join { name, room } => {
            let channel = UdpChannel::bind_to_port(0, ChannelConfig::default())?;
            let mut session = builder.start_guest_session(channel, &RoomToken::new(room))?;
            session.join_as_guest(&name)?;
            println!("Joining as {name}...");
            (session, None)
        },
    };

    let (lines_tx, lines_rx) = mpsc::channel::<String>();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines().map_while(Result::ok) {
            if lines_tx.send(line).is_err() {
                break;
            }
        }
    });

    loop {
        session.poll();
        for event in session.events() {
            print_event(&event);
        }
        if let (Some(name), true) = (&host_name, session.coordinator().guest_joined()) {
            if session.state() == CoordinatorState::AwaitingPlayers {
                session.start_game(name)?;
            }
        }

        while let Ok(line) = lines_rx.try_recv() {
            let line = line.trim();
            let result = match line {
                "next" => session.advance_round().map(|_| ()),
                "again" => match &host_name {
                    Some(name) => session.start_game(name),
                    None => Ok(()),
                },
                "reset" => {
                    session.reset_game();
                    Ok(())
                },
                "quit" => return Ok(()),
                input => match session.local_role() {
                    Some(role) => session.submit_guess_input(role, input).map(|_| ()),
                    None => Ok(()),
                },
            };
            if let Err(err) = result {
                eprintln!("{err}");
            }
        }
        thread::sleep(std::time::Duration::from_millis(16));
    }
}

fn print_event(event: &GameEvent) {
    match event {
        GameEvent::PeerConnected => println!("Connected."),
        GameEvent::PeerDisconnected => println!("Your opponent left."),
        GameEvent::GuestJoined { guest_name } => println!("{guest_name} joined."),
        GameEvent::RoundStarted { round_index, item } => {
            println!("Round {round_index}: when was the {} invented?", item.name);
        },
        GameEvent::GuessRecorded { role, .. } => println!("{role} has guessed."),
        GameEvent::RoundResolved { result, scores } => {
            println!(
                "{} appeared in {}. {}",
                result.item.name,
                format_year(result.correct_year),
                result.item.fun_fact
            );
            for (role, entry) in result.entries.iter() {
                println!(
                    "  {} guessed {} for {} points (total {})",
                    entry.name,
                    format_year(entry.guess),
                    entry.score,
                    scores[role]
                );
            }
        },
        GameEvent::GameCompleted { summary } => match summary.winner {
            Some(role) => println!("Game over, {role} wins."),
            None => println!("Game over, it's a tie."),
        },
        GameEvent::GameReset => println!("Game reset."),
        GameEvent::PeerGuessOverdue { waited, .. } => {
            println!("Still waiting for your opponent ({}s)...", waited.as_secs());
        },
    }
}
