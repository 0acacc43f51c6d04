//! Dynamic Attenuation Tool
//!
//! Runs a demo simulation host against the dynamic attenuation channel, and
//! doubles as a command-line client that reconfigures a running channel.

mod host;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use att_channel::{
    default_com_root, AttenuationChannel, BackgroundChannel, ChannelConfig, ChannelController,
    PairUpdate,
};
use att_client::AttenuationClient;
use att_protocol::Command;
use clap::{Args, Parser, Subcommand};
use host::{DemoHost, HostOptions};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "dynatt",
    version,
    about = "Dynamic attenuation channel host and client"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a demo host that queries the channel every tick
    Channel(ChannelArgs),
    /// Restore every path to the default attenuation
    Reset(ClientArgs),
    /// Set the attenuation between a device and all others
    SetAll {
        #[command(flatten)]
        client: ClientArgs,
        /// Attenuation in dB
        #[arg(long, allow_negative_numbers = true)]
        att: f64,
    },
    /// Set the attenuation between a device and one peer
    SetOne {
        #[command(flatten)]
        client: ClientArgs,
        /// Peer device
        #[arg(long)]
        peer: u16,
        /// Attenuation from the peer, in dB
        #[arg(long, allow_negative_numbers = true)]
        rx: f64,
        /// Attenuation towards the peer, in dB
        #[arg(long, allow_negative_numbers = true)]
        tx: f64,
    },
    /// Send a JSON list of commands
    Play {
        #[command(flatten)]
        client: ClientArgs,
        /// JSON file holding an array of commands
        #[arg(long)]
        script: PathBuf,
        /// Pause between commands
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
    },
}

#[derive(Args)]
struct ChannelArgs {
    /// Simulation id
    #[arg(short, long)]
    sim_id: Option<String>,
    /// Default attenuation in dB
    #[arg(long, allow_negative_numbers = true)]
    att: Option<f64>,
    /// Name of the command pipe
    #[arg(long)]
    fifo_name: Option<String>,
    /// Root of the simulation communication folders
    #[arg(long)]
    com_root: Option<PathBuf>,
    /// JSON channel configuration; flags override its fields
    #[arg(long)]
    config: Option<PathBuf>,
    /// Write SET_ATT_ONE Rx and Tx values to separate directions
    #[arg(long)]
    directional: bool,
    /// Number of simulated devices
    #[arg(short = 'n', long)]
    devices: usize,
    /// Ticks to run; 0 runs until an error
    #[arg(long, default_value_t = 600)]
    ticks: u64,
    /// Tick length in milliseconds
    #[arg(long, default_value_t = 100)]
    tick_ms: u64,
    /// Only query this receiver
    #[arg(long)]
    rx: Option<usize>,
    /// Apply commands from a background reader instead of at query time
    #[arg(long)]
    background: bool,
}

#[derive(Args)]
struct ClientArgs {
    /// Simulation id
    #[arg(short, long)]
    sim_id: String,
    /// Device the client speaks for
    #[arg(short, long, default_value_t = 0)]
    device: u16,
    /// Name of the command pipe
    #[arg(long)]
    fifo_name: Option<String>,
    /// Root of the simulation communication folders
    #[arg(long)]
    com_root: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "dynatt=info,att_protocol=info,att_channel=info,att_client=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let result = match cli.command {
        Commands::Channel(args) => run_channel(args),
        Commands::Reset(client) => send(&client, |c| c.reset()),
        Commands::SetAll { client, att } => send(&client, |c| c.set_attenuation_all(att)),
        Commands::SetOne {
            client,
            peer,
            rx,
            tx,
        } => send(&client, |c| c.set_attenuation_one(peer, rx, tx)),
        Commands::Play {
            client,
            script,
            interval_ms,
        } => play(&client, &script, Duration::from_millis(interval_ms)),
    };

    if let Err(e) = result {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn channel_config(args: &ChannelArgs) -> anyhow::Result<ChannelConfig> {
    let mut config = match (&args.config, &args.sim_id) {
        (Some(path), _) => ChannelConfig::load(path)?,
        (None, Some(sim_id)) => ChannelConfig::new(sim_id.clone()),
        (None, None) => bail!("either --sim-id or --config is required"),
    };

    if let Some(sim_id) = &args.sim_id {
        config.sim_id = sim_id.clone();
    }
    if let Some(att) = args.att {
        config.default_attenuation = att;
    }
    if let Some(name) = &args.fifo_name {
        config.pipe_name = name.clone();
    }
    if let Some(root) = &args.com_root {
        config.com_root = Some(root.clone());
    }
    if args.directional {
        config.pair_update = PairUpdate::Directional;
    }

    config.validate()?;
    Ok(config)
}

fn run_channel(args: ChannelArgs) -> anyhow::Result<()> {
    let config = channel_config(&args)?;
    if args.devices == 0 {
        bail!("--devices must be at least 1");
    }
    if let Some(rx) = args.rx {
        if rx >= args.devices {
            bail!("--rx {} is not below --devices {}", rx, args.devices);
        }
    }

    tracing::info!(
        "Starting dynamic attenuation host for simulation {} ({} devices)",
        config.sim_id,
        args.devices
    );
    tracing::info!("Command pipe: {}", config.pipe_path().display());

    let mut channel: Box<dyn AttenuationChannel> = if args.background {
        Box::new(BackgroundChannel::start(config, args.devices)?)
    } else {
        Box::new(ChannelController::open(config, args.devices)?)
    };

    let mut host = DemoHost::new(HostOptions {
        num_devices: args.devices,
        ticks: args.ticks,
        tick: Duration::from_millis(args.tick_ms),
        rx_device: args.rx,
    });
    let result = host.run(channel.as_mut());
    channel.close();

    let rx = args.rx.unwrap_or(0);
    let last: Vec<String> = (0..args.devices)
        .filter(|&tx| tx != rx)
        .filter_map(|tx| host.seen(tx, rx).map(|att| format!("{}={:.1}", tx, att)))
        .collect();
    tracing::info!("Last attenuations seen at device {}: {}", rx, last.join(" "));

    let ticks = result.context("channel failed")?;
    tracing::info!("Host finished after {} ticks", ticks);
    Ok(())
}

fn open_client(args: &ClientArgs) -> anyhow::Result<AttenuationClient> {
    let com_root = args.com_root.clone().unwrap_or_else(default_com_root);
    let client = AttenuationClient::open(
        &com_root,
        &args.sim_id,
        args.device,
        args.fifo_name.as_deref(),
    )?;
    Ok(client)
}

fn send(
    args: &ClientArgs,
    op: impl FnOnce(&mut AttenuationClient) -> Result<bool, att_client::ClientError>,
) -> anyhow::Result<()> {
    let mut client = open_client(args)?;
    if !op(&mut client)? {
        bail!("command was not fully written to {}", client.path().display());
    }
    client.close();
    Ok(())
}

fn play(args: &ClientArgs, script: &Path, interval: Duration) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(script)
        .with_context(|| format!("failed to read {}", script.display()))?;
    let commands: Vec<Command> = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse {}", script.display()))?;

    let mut client = open_client(args)?;
    for (i, cmd) in commands.iter().enumerate() {
        if !client.send(cmd)? {
            bail!("command {} ({}) was not fully written", i, cmd);
        }
        tracing::info!("Sent {}", cmd);
        if !interval.is_zero() && i + 1 < commands.len() {
            std::thread::sleep(interval);
        }
    }
    client.close();
    Ok(())
}
