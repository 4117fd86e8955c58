//! MacMirror entry point.

mod args;
mod audio;
mod capture;
mod client;
mod config;
mod connection;
mod controller;
mod discovery;
mod encode;
mod error;
mod pipeline;
mod protocol;
mod server;
mod status;
mod stream_config;
mod web;
mod windows_displays;

use args::{exit_code, Args, Command};
use audio::{AudioPipeline, CpalAudioTap, NullAudioTap};
use capture::NullCapturer;
use clap::Parser;
use connection::ConnectionSet;
use encode::JpegEncoder;
use log::{error, info};
use parking_lot::Mutex;
use pipeline::Pipeline;
use server::Server;
use status::StatusBoard;
use std::sync::Arc;
use stream_config::StreamConfig;
use windows_displays::EmptyEnumerator;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let log_level = if args.verbose {
        "debug".to_string()
    } else {
        args.resolve_config().map(|c| c.logging.level).unwrap_or_else(|_| "info".to_string())
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let disable_audio = args.no_audio || std::env::var("DISABLE_AUDIO").as_deref() == Ok("1");

    let code = match args.command.clone().unwrap_or(Command::Serve) {
        Command::Serve => run_server(&args, disable_audio).await,
        Command::Client { host, port } => run_client(host, port).await,
    };

    std::process::exit(code);
}

async fn run_server(args: &Args, disable_audio: bool) -> i32 {
    let config = match args.resolve_config().map_err(|e| anyhow::anyhow!(e.to_string())) {
        Ok(c) => c,
        Err(e) => {
            error!("invalid configuration: {:#}", e);
            return exit_code::INVALID_CONFIGURATION;
        }
    };
    let disable_audio = disable_audio || !config.audio.enabled;

    let stream_config = Arc::new(Mutex::new(StreamConfig::from_mode(config.user_mode())));
    let connections = Arc::new(ConnectionSet::new());

    let encoder = match JpegEncoder::new() {
        Ok(e) => Arc::new(e),
        Err(e) => {
            error!("failed to initialize JPEG encoder: {}", e);
            return exit_code::INVALID_CONFIGURATION;
        }
    };

    let pipeline = Arc::new(Pipeline::new(Arc::new(NullCapturer), encoder, connections.clone()));

    let audio_pipeline = if disable_audio {
        Arc::new(AudioPipeline::new(Box::new(NullAudioTap::new())))
    } else {
        Arc::new(AudioPipeline::new(Box::new(CpalAudioTap::new(
            config.audio.sample_rate,
            config.audio.channels,
        ))))
    };

    let (status, _status_rx) = StatusBoard::new();
    let enumerator = Arc::new(EmptyEnumerator);

    let server = Arc::new(Server::new(
        pipeline,
        audio_pipeline,
        connections,
        stream_config,
        enumerator,
        status.clone(),
    ));

    tokio::spawn({
        let status = status.clone();
        let http_port = config.server.http_port;
        async move {
            if let Err(e) = web::run_status_server(http_port, status).await {
                error!("status endpoint failed: {}", e);
            }
        }
    });

    let port = config.server.port;
    let background = args.background || config.server.background;
    info!("starting MacMirror server on port {}", port);
    let result = tokio::select! {
        r = server.clone().run(port, background) => r,
        _ = tokio::signal::ctrl_c() => {
            info!("received interrupt, shutting down");
            server.shutdown();
            return exit_code::INTERRUPTED;
        }
    };

    match result {
        Ok(()) => exit_code::NORMAL,
        Err(e) => {
            error!("server exited with fatal error: {:#}", anyhow::Error::from(e));
            exit_code::LISTENER_FAILURE
        }
    }
}

async fn run_client(host: String, port: u16) -> i32 {
    let client = Arc::new(client::Client::new());
    info!("connecting to {}:{}", host, port);

    let result = tokio::select! {
        r = client.run_with_endpoint(host, port) => r,
        _ = tokio::signal::ctrl_c() => {
            client.cancel();
            return exit_code::INTERRUPTED;
        }
    };

    match result {
        Ok(()) => exit_code::NORMAL,
        Err(e) => {
            error!("client connection failed: {}", e);
            exit_code::LISTENER_FAILURE
        }
    }
}
