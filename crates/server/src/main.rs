mod config;
mod players;
mod server;

use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use config::ServerConfig;
use jazz2_net::{PacketLossSimulation, PlayerType};
use server::GameServer;

#[derive(Parser)]
#[command(name = "jazz2-server")]
#[command(about = "Jazz2 multiplayer server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = jazz2_net::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = jazz2_net::DEFAULT_TICK_RATE)]
    tick_rate: u32,

    #[arg(short, long, default_value_t = 32)]
    max_clients: usize,

    #[arg(long, default_value = "jazz", value_parser = parse_player_type)]
    player_type: PlayerType,

    #[arg(short, long, help = "Shut down after this many seconds")]
    duration: Option<f32>,

    #[arg(long, help = "Enable global packet loss simulation")]
    simulate_packet_loss: bool,

    #[arg(long, default_value_t = 0.0, help = "Packet loss percentage (0-100)")]
    loss_percent: f32,
}

fn parse_player_type(value: &str) -> Result<PlayerType, String> {
    match value.to_ascii_lowercase().as_str() {
        "jazz" => Ok(PlayerType::Jazz),
        "spaz" => Ok(PlayerType::Spaz),
        "lori" => Ok(PlayerType::Lori),
        "frog" => Ok(PlayerType::Frog),
        other => Err(format!("unknown player type '{}'", other)),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let bind_addr = format!("{}:{}", args.bind, args.port);

    let global_packet_loss = args
        .simulate_packet_loss
        .then(|| PacketLossSimulation::new(args.loss_percent));

    let config = ServerConfig {
        tick_rate: args.tick_rate,
        max_clients: args.max_clients,
        player_type: args.player_type,
        global_packet_loss,
        ..Default::default()
    };

    let mut server = GameServer::new(&bind_addr, config)?;
    log::info!("Server started on {}", server.local_addr());

    if let Some(seconds) = args.duration {
        let running = server.running();
        thread::spawn(move || {
            thread::sleep(Duration::from_secs_f32(seconds));
            running.store(false, Ordering::SeqCst);
        });
    }

    server.run();
    log::info!("Server shutting down");

    Ok(())
}
