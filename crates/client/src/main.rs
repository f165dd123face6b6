mod config;
mod headless;

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;

use config::ClientConfig;
use headless::HeadlessLevel;
use jazz2_net::{
    ClientTransport, LevelInit, NetworkLevelHandler, PacketLossSimulation, PacketRouter,
    TransportEvent,
};

/// Frames per second the level handler's `time_mult` is relative to.
const REFERENCE_FRAME_RATE: f32 = 60.0;

#[derive(Parser)]
#[command(name = "jazz2-client")]
#[command(about = "Headless Jazz2 multiplayer client")]
struct Args {
    #[arg(
        short,
        long,
        help = "Server address to connect to (e.g., 127.0.0.1:10666)"
    )]
    server: Option<SocketAddr>,

    #[arg(short, long, help = "Disconnect after this many seconds")]
    duration: Option<f32>,

    #[arg(long, default_value_t = 60)]
    frame_rate: u32,

    #[arg(long, help = "Enable outgoing packet loss simulation")]
    simulate_packet_loss: bool,

    #[arg(long, default_value_t = 0.0, help = "Packet loss percentage (0-100)")]
    loss_percent: f32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let defaults = ClientConfig::default();
    let config = ClientConfig {
        server_addr: args.server.unwrap_or(defaults.server_addr),
        frame_rate: args.frame_rate,
        duration: args.duration.map(Duration::from_secs_f32),
        packet_loss: args
            .simulate_packet_loss
            .then(|| PacketLossSimulation::new(args.loss_percent)),
        ..defaults
    };

    run(&config)
}

fn run(config: &ClientConfig) -> Result<()> {
    let router = PacketRouter::shared();
    let level = HeadlessLevel::new(config.orbit_radius, config.orbit_speed);
    let mut handler = NetworkLevelHandler::new(level, Arc::clone(&router), LevelInit::default());
    let mut transport = ClientTransport::connect(config.server_addr, config.transport(), router)?;

    let frame = config.frame_duration();
    let started = Instant::now();
    let mut last_frame = started;
    let mut last_report = started;

    'running: loop {
        for event in transport.drain_events() {
            match event {
                TransportEvent::Connected { addr, .. } => {
                    log::info!("Joined {}", addr);
                    handler.on_connected();
                }
                TransportEvent::Disconnected { connection, reason } => {
                    log::info!("Left the server: {}", reason.as_str());
                    handler.on_disconnected(connection);
                    break 'running;
                }
                TransportEvent::DeliveryFailed { failure, .. } => {
                    log::debug!("Delivery failed: {:?}", failure);
                }
            }
        }

        let now = Instant::now();
        let dt = (now - last_frame).as_secs_f32();
        last_frame = now;

        let level = handler.state_mut().api_mut();
        level.advance(dt);
        if level.take_death() && handler.handle_player_died(&transport) {
            log::info!("Reported our death");
        }

        handler.on_update(dt * REFERENCE_FRAME_RATE, &transport);

        if now - last_report >= config.report_interval {
            last_report = now;
            log::info!("Session {}", handler.state().session().as_str());
            for line in handler.debug_lines(&transport) {
                log::info!("{}", line);
            }
            let level = handler.state().api();
            if let Some(pos) = level.local_pos() {
                log::info!("- Local Position: {} / Health: {}", pos, level.health());
            }
            log::info!(
                "- Remote Objects: {} / Corpses: {}",
                level.remote_object_count(),
                level.corpses()
            );
            for (index, actor) in level.remote_players() {
                log::info!("  player {} at {}", index, actor.pos);
            }
        }

        if config.duration.is_some_and(|limit| started.elapsed() >= limit) {
            log::info!("Time is up");
            break;
        }

        thread::sleep(frame);
    }

    transport.disconnect();
    Ok(())
}
