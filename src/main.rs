//! # dlc: Discreet Log Contract Oracle Tool
//!
//! Command-line front end for running an oracle, tracking other oracles'
//! events and preparing contract offers.
//!
//! ## Usage Examples
//!
//! ```bash
//! # Run an oracle and announce an event
//! dlc oracle generate olivia
//! dlc event generate olivia/election Republican_win Democrats_win other
//!
//! # Attest the realized outcome (prints the 32-byte attestation)
//! dlc event attest sign olivia/election Democrats_win
//! dlc event attest sign olivia/election Democrats_win --json > attestation.json
//!
//! # Track a third-party event and import its attestation
//! dlc oracle add remote 57caa081b0a0e9e9413cf4fb72ddc2630d609bdf6a912b98c4cfd358a4ce1496
//! dlc event add remote/election 92ba9892...6974692ea1 Republican_win Democrats_win other
//! dlc event attest add remote/election <attestation|attestation.json>
//!
//! # Build and review an offer
//! dlc offer create --event remote/election \
//!   --outcome Republican_win:10000sats --outcome Democrats_win:0 --outcome other:0.2 \
//!   --expiration 1000
//! dlc offer review offer.json --human
//! ```

use anyhow::{bail, Context, Result};
use bitcoin_dlc_oracle::config::Settings;
use bitcoin_dlc_oracle::contract::DlcMessage;
use bitcoin_dlc_oracle::oracle::OracleCommitment;
use bitcoin_dlc_oracle::repository::{
    AttestationReceipt, Event, EventFullName, FileRepository, KeyLeakAcknowledgement,
};
use bitcoin_dlc_oracle::services::{OfferRequest, OfferReview, OracleService, OracleSource};
use bitcoin_dlc_oracle::utils::{amount, display};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "dlc")]
#[command(about = "Discreet Log Contract oracle and offer tool")]
#[command(version)]
struct Cli {
    /// Network: mainnet, testnet, signet or regtest
    #[arg(long, global = true)]
    network: Option<String>,

    /// Data directory (default: ~/.dlc/<network>)
    #[arg(long, global = true)]
    datadir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the data directory and network in use
    Info,

    /// Manage oracles
    Oracle {
        #[command(subcommand)]
        command: OracleCommands,
    },

    /// Manage events
    Event {
        #[command(subcommand)]
        command: EventCommands,
    },

    /// Manage offers
    Offer {
        #[command(subcommand)]
        command: OfferCommands,
    },
}

#[derive(Subcommand)]
enum OracleCommands {
    /// Generate a new oracle (the private key is stored locally)
    Generate {
        /// Oracle name
        name: String,
    },
    /// Add a third-party oracle
    Add {
        /// Oracle name
        name: String,
        /// Oracle public key (32-byte x-only hex)
        pubkey: String,
    },
    /// Change the public key of an oracle
    Set {
        /// Oracle name
        name: String,
        /// Oracle public key (32-byte x-only hex)
        pubkey: String,
    },
    /// Remove an oracle and its events
    Remove {
        /// Oracle name
        name: String,
    },
    /// List oracles
    List,
    /// Show an oracle
    Show {
        /// Oracle name
        name: String,
        /// Show sensitive information (like private keys)
        #[arg(long)]
        show_sensitive: bool,
    },
}

#[derive(Subcommand)]
enum EventCommands {
    /// Generate a new event for an oracle you own
    Generate {
        /// Event full name, 'oraclename/eventname'
        name: String,
        /// Possible outcomes
        #[arg(required = true)]
        outcomes: Vec<String>,
        /// Print the commitment as a JSON message
        #[arg(long)]
        json: bool,
    },
    /// Add an event announced by an oracle
    Add {
        /// Event full name, 'oraclename/eventname'
        name: String,
        /// Event nonce, as published by the oracle
        nonce: String,
        /// Outcomes, as published by the oracle
        #[arg(required = true)]
        outcomes: Vec<String>,
    },
    /// List events
    List {
        /// Only list events of this oracle
        #[arg(long)]
        oracle: Option<String>,
    },
    /// Show details of an event
    Show {
        /// Event full name
        name: String,
    },
    /// Attest an event
    Attest {
        #[command(subcommand)]
        command: AttestCommands,
    },
}

#[derive(Subcommand)]
enum AttestCommands {
    /// Sign an outcome of an event you generated
    Sign {
        /// Event full name
        name: String,
        /// Outcome to attest
        outcome: String,
        /// Attest even though another outcome was already attested
        #[arg(short, long)]
        force: bool,
        /// Acknowledge that forcing reveals the oracle private key
        #[arg(long, requires = "force")]
        confirm_key_leak: bool,
        /// Print the attestation as a JSON message
        #[arg(long)]
        json: bool,
    },
    /// Add an attestation received from an oracle
    Add {
        /// Event full name
        name: String,
        /// Attestation (32-byte hex), attestation message JSON, or a file holding it
        attestation: String,
    },
}

#[derive(Subcommand)]
enum OfferCommands {
    /// Create a new offer
    Create {
        /// Oracle public key
        #[arg(long, alias = "oraclepubkey", requires = "nonce", conflicts_with = "event")]
        oracle_pubkey: Option<String>,
        /// Oracle nonce for this bet
        #[arg(long, requires = "oracle_pubkey")]
        nonce: Option<String>,
        /// Tracked event to take the commitment and outcomes from
        #[arg(long)]
        event: Option<String>,
        /// Payoff per outcome, 'label:payout' (payout in sats like '10000sats' or BTC like '0.2')
        #[arg(long = "outcome", required = true)]
        outcomes: Vec<String>,
        /// Locktime of the contract execution transactions
        #[arg(long, default_value_t = 0)]
        maturity: u32,
        /// Locktime of the refund transaction
        #[arg(long)]
        expiration: u32,
        /// Fee rate in sat/vB
        #[arg(long)]
        fee_rate: Option<u64>,
    },
    /// Review an offer
    Review {
        /// Offer JSON, or a path to a file containing it
        offer: String,
        /// Show the offer in a human readable way
        #[arg(long)]
        human: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if cli.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    let settings = Settings::resolve(cli.datadir, cli.network.as_deref())?;
    log::debug!("Using {:?}", settings);

    if let Commands::Info = cli.command {
        println!("Data directory: {}", settings.data_dir.display());
        println!("Network:        {}", settings.network);
        return Ok(());
    }

    let repo = FileRepository::open(&settings.data_dir, settings.network)
        .with_context(|| format!("Failed to open repository at {}", settings.data_dir.display()))?;
    let service = OracleService::new(repo);

    match cli.command {
        Commands::Info => Ok(()),
        Commands::Oracle { command } => run_oracle(&service, command),
        Commands::Event { command } => run_event(&service, command),
        Commands::Offer { command } => run_offer(&service, command),
    }
}

fn run_oracle(service: &OracleService<FileRepository>, command: OracleCommands) -> Result<()> {
    match command {
        OracleCommands::Generate { name } => {
            let oracle = service.generate_oracle(&name)?;
            println!("{}", hex::encode(oracle.pubkey.serialize()));
        }
        OracleCommands::Add { name, pubkey } => {
            service.add_oracle(&name, &pubkey)?;
        }
        OracleCommands::Set { name, pubkey } => {
            service.set_oracle(&name, &pubkey)?;
        }
        OracleCommands::Remove { name } => {
            service.remove_oracle(&name)?;
        }
        OracleCommands::List => {
            let oracles = service.list_oracles()?;
            if oracles.is_empty() {
                println!("No oracles");
            }
            for oracle in oracles {
                let pubkey = hex::encode(oracle.pubkey.serialize());
                let owned = if oracle.is_owned() { " (owned)" } else { "" };
                println!("{}\t{}{}", oracle.name, pubkey, owned);
            }
        }
        OracleCommands::Show { name, show_sensitive } => {
            let (oracle, secret) = service.show_oracle(&name, show_sensitive)?;
            println!("Name:        {}", oracle.name);
            println!("Public key:  {}", hex::encode(oracle.pubkey.serialize()));
            match &oracle.key_ref {
                Some(reference) => println!("Key path:    {}", reference),
                None => println!("Key path:    (not owned)"),
            }
            if let Some(secret) = secret {
                println!("Private key: {}", secret);
            }
        }
    }
    Ok(())
}

fn run_event(service: &OracleService<FileRepository>, command: EventCommands) -> Result<()> {
    match command {
        EventCommands::Generate { name, outcomes, json } => {
            let event = service.generate_event(&name.parse()?, &outcomes)?;
            if json {
                println!("{}", DlcMessage::OracleCommitment(event.commitment).to_json_pretty()?);
            } else {
                println!("{}", event.commitment);
            }
        }
        EventCommands::Add { name, nonce, outcomes } => {
            service.add_event(&name.parse()?, &nonce, &outcomes)?;
        }
        EventCommands::List { oracle } => {
            let events = service.list_events(oracle.as_deref())?;
            if events.is_empty() {
                println!("No events");
            }
            for event in events {
                println!("{}\t{}", event.name, state_label(&event));
            }
        }
        EventCommands::Show { name } => {
            let details = service.show_event(&name.parse()?)?;
            let event = &details.event;
            println!("Name:       {}", event.name);
            println!("Created:    {}", event.created_at.to_rfc3339());
            println!("Commitment: {}", event.commitment);
            println!("Nonce path: {}", event.nonce_key_ref.map(|r| r.to_string()).unwrap_or_else(|| "(not owned)".to_string()));
            println!("State:      {}", state_label(event));
            println!("Outcomes:");
            for (outcome, point) in &details.signature_points {
                println!("  {}", outcome);
                println!("    signature point: {}", point);
                if let Some(attestation) = event.attestations().get(outcome.label()) {
                    println!("    attestation:     {}", attestation);
                }
            }
        }
        EventCommands::Attest { command } => run_attest(service, command)?,
    }
    Ok(())
}

fn run_attest(service: &OracleService<FileRepository>, command: AttestCommands) -> Result<()> {
    match command {
        AttestCommands::Sign {
            name,
            outcome,
            force,
            confirm_key_leak,
            json,
        } => {
            if force && !confirm_key_leak {
                bail!(
                    "Attesting a second outcome reveals the oracle private key. \
                     Pass --confirm-key-leak together with --force to proceed."
                );
            }
            let ack = force.then(|| KeyLeakAcknowledgement::accept_key_leak("forced from the command line"));
            let name: EventFullName = name.parse()?;
            let signed = service.attest_sign(&name, &outcome, ack.as_ref())?;
            if let AttestationReceipt::UnsafeReattestation { previous, .. } = &signed.receipt {
                let previous: Vec<&str> = previous.iter().map(|o| o.label()).collect();
                eprintln!(
                    "⚠️  {} was already attested ({}). The private key of oracle '{}' is now public: stop using it.",
                    name,
                    previous.join(", "),
                    name.oracle()
                );
            }
            if json {
                println!("{}", signed.to_message().to_json_pretty()?);
            } else {
                println!("{}", signed.attestation);
            }
        }
        AttestCommands::Add { name, attestation } => {
            let input = if Path::new(&attestation).is_file() {
                read_argument(&attestation, "attestation")?
            } else {
                attestation
            };
            let outcome = service.attest_add(&name.parse()?, &input)?;
            println!("{}", outcome);
        }
    }
    Ok(())
}

fn run_offer(service: &OracleService<FileRepository>, command: OfferCommands) -> Result<()> {
    match command {
        OfferCommands::Create {
            oracle_pubkey,
            nonce,
            event,
            outcomes,
            maturity,
            expiration,
            fee_rate,
        } => {
            let oracle = match (oracle_pubkey, nonce, event) {
                (_, _, Some(event)) => OracleSource::Event(event.parse()?),
                (Some(pubkey), Some(nonce), None) => {
                    OracleSource::Commitment(OracleCommitment::from_parts(&pubkey, &nonce)?)
                }
                _ => bail!("Either --event or both --oracle-pubkey and --nonce are required"),
            };
            let offer = service.create_offer(&OfferRequest {
                oracle,
                outcomes,
                maturity,
                expiration,
                fee_rate,
            })?;
            println!("{}", DlcMessage::Offer(offer).to_json_pretty()?);
        }
        OfferCommands::Review { offer, human } => {
            let json = read_argument(&offer, "offer")?;
            let review = service.review_offer(&json)?;
            if human {
                print_review(&review);
            } else {
                println!("{}", serde_json::to_string_pretty(&review.offer)?);
            }
        }
    }
    Ok(())
}

/// Inline JSON, or the contents of the file it names
fn read_argument(input: &str, what: &str) -> Result<String> {
    let trimmed = input.trim_start();
    if trimmed.starts_with('{') {
        return Ok(input.to_string());
    }
    let path = Path::new(input);
    fs::read_to_string(path).with_context(|| format!("Failed to read {} from {}", what, path.display()))
}

fn state_label(event: &Event) -> String {
    let attested = event.attested_outcomes();
    match attested.len() {
        0 => "awaiting attestation".to_string(),
        1 => format!("attested '{}'", attested[0]),
        _ => format!(
            "attested {} outcomes, oracle key leaked",
            attested.len()
        ),
    }
}

fn print_review(review: &OfferReview) {
    let offer = &review.offer;
    println!("📋 Offer");
    println!("   Oracle:     {}", display::format_short(&hex::encode(offer.oracle_info.pubkey().serialize())));
    println!("   Nonce:      {}", display::format_short(&hex::encode(offer.oracle_info.nonce().serialize())));
    if let Some(event) = &review.event {
        println!("   Event:      {} ({})", event.name, state_label(event));
    } else if let Some(event_id) = &offer.event_id {
        println!("   Event:      {} (not tracked locally)", event_id);
    }
    println!("   Maturity:   {}", offer.timeouts.contract_maturity);
    println!("   Expiration: {}", offer.timeouts.contract_timeout);
    if let Some(fee_rate) = offer.fee_rate {
        println!("   Fee rate:   {} sat/vB", fee_rate);
    }
    println!();
    println!("💰 Payoffs:");
    for (info, (_, point)) in offer.contract_info.iter().zip(&review.signature_points) {
        println!("   {}: {}", info.outcome, amount::format_dual(info.payout));
        println!("      signature point: {}", point);
    }
    if !offer.extra.is_empty() {
        let fields: Vec<&str> = offer.extra.keys().map(String::as_str).collect();
        println!();
        println!("📎 Other fields: {}", fields.join(", "));
    }
}
