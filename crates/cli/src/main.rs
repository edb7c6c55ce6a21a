use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pointserve_core::{GlobalBounds, PointCloud, PointserveConfig, Variant};
use pool::PoolRegistry;
use protocol::RequestParams;
use server::{Dispatcher, HttpState, Server, run_http};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "pointserve")]
#[command(about = "Point-cloud transformation service with worker-process backends")]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run both listeners (persistent duplex + single-shot HTTP)
  Serve {
    /// Config file (TOML); defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Override the duplex listen address
    #[arg(long)]
    ws_addr: Option<String>,
    /// Override the single-shot listen address
    #[arg(long)]
    http_addr: Option<String>,
  },
  /// Compare backend variants on a synthetic cloud
  Bench {
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Synthetic cloud size in points
    #[arg(long, default_value = "100000")]
    points: usize,
    /// Requests per variant
    #[arg(long, default_value = "10")]
    requests: usize,
    #[arg(long, default_value = "0.5")]
    voxel_size: f32,
  },
}

fn init_tracing() {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
    .init();
}

#[tokio::main]
async fn main() -> Result<()> {
  init_tracing();
  let cli = Cli::parse();

  match cli.command {
    Commands::Serve { config, ws_addr, http_addr } => {
      let mut config = PointserveConfig::load_or_default(config.as_deref()).context("loading config")?;
      if let Some(addr) = ws_addr {
        config.server.ws_addr = addr;
      }
      if let Some(addr) = http_addr {
        config.server.http_addr = addr;
      }
      serve(config).await
    }
    Commands::Bench { config, points, requests, voxel_size } => {
      let config = PointserveConfig::load_or_default(config.as_deref()).context("loading config")?;
      bench(config, points, requests, voxel_size).await
    }
  }
}

async fn serve(config: PointserveConfig) -> Result<()> {
  let request_timeout = Duration::from_secs(config.server.request_timeout_secs);
  let registry = Arc::new(
    PoolRegistry::from_config(&config)
      .await
      .context("building process pools")?,
  );

  let srv = Server::new(Arc::clone(&registry), request_timeout);
  let shutdown = srv.shutdown_handle();

  let http_state = HttpState {
    dispatcher: Arc::new(Dispatcher::new(Arc::clone(&registry))),
    request_timeout,
  };

  let ws_listener = TcpListener::bind(&config.server.ws_addr)
    .await
    .with_context(|| format!("binding {}", config.server.ws_addr))?;
  let http_listener = TcpListener::bind(&config.server.http_addr)
    .await
    .with_context(|| format!("binding {}", config.server.http_addr))?;

  let http_shutdown = shutdown.subscribe();
  tokio::select! {
      result = srv.run(ws_listener) => result.context("duplex listener")?,
      result = run_http(http_listener, http_state, http_shutdown) => result.context("http listener")?,
      _ = tokio::signal::ctrl_c() => {
          info!("interrupt received, shutting down");
          shutdown.shutdown();
      }
  }

  Ok(())
}

/// The backend variants exist for throughput comparison; this runs the same
/// downsample across all of them and reports wall times.
async fn bench(config: PointserveConfig, points: usize, requests: usize, voxel_size: f32) -> Result<()> {
  let registry = Arc::new(
    PoolRegistry::from_config(&config)
      .await
      .context("building process pools")?,
  );
  let dispatcher = Dispatcher::new(registry);

  let cloud = synthetic_cloud(points);
  let bounds = GlobalBounds::from_flat_points(cloud.as_flat())
    .unwrap_or(GlobalBounds::new([0.0; 3], [0.0; 3]));
  let params = RequestParams::Downsample {
    voxel_size,
    global_bounds: Some(bounds),
  };

  println!("downsample, {points} points, voxel size {voxel_size}, {requests} requests per variant");
  for variant in Variant::ALL {
    let mut times = Vec::with_capacity(requests);
    let mut failed = None;
    for _ in 0..requests {
      let start = Instant::now();
      match dispatcher.execute(&params, variant, &cloud).await {
        Ok(_) => times.push(start.elapsed().as_secs_f64() * 1000.0),
        Err(err) => {
          failed = Some(err);
          break;
        }
      }
    }
    match failed {
      Some(err) => println!("  {variant:>9}: failed: {err}"),
      None if times.is_empty() => println!("  {variant:>9}: no requests run"),
      None => {
        let mean = times.iter().sum::<f64>() / times.len() as f64;
        let best = times.iter().cloned().fold(f64::INFINITY, f64::min);
        println!("  {variant:>9}: mean {mean:8.2} ms   best {best:8.2} ms");
      }
    }
  }

  Ok(())
}

/// Deterministic pseudo-random cloud in a 10 m cube.
fn synthetic_cloud(points: usize) -> PointCloud {
  let mut data = Vec::with_capacity(points * 3);
  let mut state = 0x9E3779B9u32;
  for _ in 0..points * 3 {
    state ^= state << 13;
    state ^= state >> 17;
    state ^= state << 5;
    data.push((state % 10_000) as f32 * 0.001);
  }
  PointCloud::from_flat(data).unwrap_or_default()
}
