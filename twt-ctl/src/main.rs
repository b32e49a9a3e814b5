//! TWT control tool — entry point.
//!
//! ```text
//! twt-ctl gen-config [--write <path>]       Print (or write) the default config
//! twt-ctl setup --peer <mac> [...]          Build a setup command, print it as hex
//! twt-ctl teardown --peer <mac> [...]       Build a teardown command, print it as hex
//! twt-ctl decode-command <hex>              Decode a firmware command buffer
//! twt-ctl decode-event --kind <k> <hex>     Decode a setup/teardown completion event
//! twt-ctl decode-frame <hex>                Decode an S1G TWT action frame body
//! twt-ctl simulate --peer <mac> [...]       Run setup + teardown against a fake firmware
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use twt_core::{
    AUTO_ASSIGN_ID, EventKind, LinkId, MacAddr, NegotiationType, SessionKey, TwtActionFrame,
    TwtCommand, TwtError, TwtEvent, TwtOperation, TwtParameters, build_setup, build_teardown,
};
use twt_ctl::config::CtlConfig;
use twt_ctl::simulate::{ExchangeReport, Simulation};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "twt-ctl", about = "Target Wake Time session control tool")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "twt-ctl.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the default configuration, or write it to a file.
    GenConfig {
        #[arg(long)]
        write: Option<PathBuf>,
    },
    /// Build a setup command buffer.
    Setup(RequestArgs),
    /// Build a teardown command buffer.
    Teardown {
        #[command(flatten)]
        request: RequestArgs,
        /// Tear down every session with the peer.
        #[arg(long)]
        all: bool,
    },
    /// Decode a firmware command buffer.
    DecodeCommand {
        #[arg(value_name = "HEX")]
        data: String,
    },
    /// Decode a completion event buffer.
    DecodeEvent {
        /// "setup" or "teardown".
        #[arg(long)]
        kind: EventKind,
        #[arg(value_name = "HEX")]
        data: String,
    },
    /// Decode an S1G TWT action frame body (category onwards).
    DecodeFrame {
        #[arg(value_name = "HEX")]
        data: String,
    },
    /// Run a setup/teardown lifecycle against a simulated firmware.
    Simulate {
        #[command(flatten)]
        request: RequestArgs,
        /// Status the simulated peer answers the setup with.
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        peer_status: i32,
    },
}

#[derive(Args, Debug)]
struct RequestArgs {
    /// Peer address, e.g. 02:00:5e:10:20:30.
    #[arg(long)]
    peer: MacAddr,
    #[arg(long, default_value_t = 0)]
    ifidx: u8,
    #[arg(long, default_value_t = 0)]
    bsscfgidx: i32,
    /// individual, wake-tbtt, broadcast-in-beacon or broadcast.
    #[arg(long, value_parser = parse_negotiation)]
    negotiation: Option<NegotiationType>,
    /// Flow id; "auto" lets the peer assign it.
    #[arg(long, value_parser = parse_id)]
    flow_id: Option<u8>,
    /// Broadcast TWT id; "auto" lets the peer assign it.
    #[arg(long, value_parser = parse_id)]
    broadcast_id: Option<u8>,
    #[arg(long, default_value_t = 0)]
    dialog_token: u8,
    /// Absolute target wake time (TSF, µs).
    #[arg(long)]
    wake_time: Option<u64>,
    /// Target wake time relative to the current TSF (µs).
    #[arg(long)]
    wake_offset: Option<u64>,
    #[arg(long)]
    min_wake_duration: Option<u8>,
    #[arg(long)]
    exponent: Option<u8>,
    #[arg(long)]
    mantissa: Option<u16>,
    #[arg(long)]
    unannounced: bool,
    #[arg(long)]
    protection: bool,
}

impl RequestArgs {
    fn link(&self) -> LinkId {
        LinkId::new(self.ifidx, self.bsscfgidx, self.peer)
    }

    fn to_parameters(&self, config: &CtlConfig) -> TwtParameters {
        let mut params = config.request_template();
        if let Some(negotiation) = self.negotiation {
            params.negotiation_type = negotiation;
        }
        params.flow_id = self.flow_id.unwrap_or(params.flow_id);
        params.broadcast_id = self.broadcast_id.unwrap_or(params.broadcast_id);
        params.dialog_token = self.dialog_token;
        params.target_wake_time = self.wake_time.unwrap_or(0);
        params.wake_time_offset = self.wake_offset.unwrap_or(0);
        params.min_wake_duration = self.min_wake_duration.unwrap_or(params.min_wake_duration);
        params.exponent = self.exponent.unwrap_or(params.exponent);
        params.mantissa = self.mantissa.unwrap_or(params.mantissa);
        params.flow_type_unannounced |= self.unannounced;
        params.protection = self.protection;
        params
    }
}

fn parse_negotiation(s: &str) -> Result<NegotiationType, String> {
    match s {
        "individual" => Ok(NegotiationType::Individual),
        "wake-tbtt" => Ok(NegotiationType::WakeTbtt),
        "broadcast-in-beacon" => Ok(NegotiationType::BroadcastInBeacon),
        "broadcast" => Ok(NegotiationType::Broadcast),
        other => Err(format!("unknown negotiation type: {other}")),
    }
}

fn parse_id(s: &str) -> Result<u8, String> {
    if s == "auto" {
        return Ok(AUTO_ASSIGN_ID);
    }
    s.parse().map_err(|e| format!("bad id {s:?}: {e}"))
}

fn decode_hex(text: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let compact: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    hex::decode(compact)
}

fn print_exchange(step: &str, report: &ExchangeReport) {
    println!(
        "{step} command ({}): {}",
        report.command.command.name(),
        hex::encode(&report.command.wire)
    );
    println!("{step} event ({}): {}", report.event_kind, hex::encode(&report.event));
    println!("{step} outcome: {:?}", report.outcome);
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Command::GenConfig { write } = &cli.command {
        match write {
            Some(path) => {
                CtlConfig::write_default(path)?;
                println!("wrote {}", path.display());
            }
            None => println!("{}", toml::to_string_pretty(&CtlConfig::default())?),
        }
        return Ok(());
    }

    let config = CtlConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("twt-ctl v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::GenConfig { .. } => {}
        Command::Setup(request) => {
            let params = request.to_parameters(&config);
            let key = SessionKey::for_request(request.link(), &params);
            let command = build_setup(&key, &params)?;
            println!("{}", hex::encode(command.to_bytes()?));
        }
        Command::Teardown { request, all } => {
            let params = TwtParameters {
                operation: TwtOperation::Teardown,
                teardown_all: all,
                ..request.to_parameters(&config)
            };
            let key = SessionKey::for_request(request.link(), &params);
            let command = build_teardown(&key, &params)?;
            println!("{}", hex::encode(command.to_bytes()));
        }
        Command::DecodeCommand { data } => {
            let command = TwtCommand::from_bytes(&decode_hex(&data)?)?;
            println!("{command:#?}");
        }
        Command::DecodeEvent { kind, data } => {
            let event = TwtEvent::parse(kind, &decode_hex(&data)?)?;
            println!("{event:#?}");
        }
        Command::DecodeFrame { data } => {
            let frame = TwtActionFrame::decode(&decode_hex(&data)?)?;
            println!("{frame:#?}");
        }
        Command::Simulate {
            request,
            peer_status,
        } => {
            let link = request.link();
            let params = request.to_parameters(&config);
            let mut sim = Simulation::start(&config);
            match sim.run(link, params, peer_status).await {
                Ok((setup, teardown)) => {
                    print_exchange("setup", &setup);
                    print_exchange("teardown", &teardown);
                }
                Err(TwtError::PeerRejected { status }) => {
                    println!("setup rejected by peer (status {status})");
                }
                Err(e) => return Err(e.into()),
            }
            info!(sessions = sim.manager().session_count().await, "simulation finished");
        }
    }

    Ok(())
}
