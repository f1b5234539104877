//! dinput CLI: inspect the forwarding filters and exercise a client session.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dinput_client::setup::load_config;
use dinput_client::{ClientConfig, DistributedInputClient, ScreenFilter, WhiteListStore};
use dinput_ipc::mock::{MockServiceLocator, MockSinkService, MockSourceService};
use dinput_ipc::{PrepareCallback, RegisterCallback, SimulationEventListener, StartCallback};
use dinput_types::{
    BusinessEvent, DeviceId, DhId, EnableParams, InputTypeMask, SessionPeer, TouchEvent,
};
use tokio::sync::mpsc;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "dinput",
    about = "Share input hardware with a paired device",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a touch would be kept local.
    FilterTouch {
        /// Sink screen infos, e.g. `[[0,0,1920,1080]]`.
        #[arg(long)]
        screens: String,
        x: i32,
        y: i32,
    },

    /// Check whether a key event would be kept local.
    FilterKey {
        /// Whitelist, e.g. `[[[2072],2017,2]]`.
        #[arg(long)]
        whitelist: String,
        /// Sink device the whitelist belongs to.
        #[arg(long, default_value = "sink")]
        device: String,
        /// Keys held down, comma separated.
        #[arg(long, value_delimiter = ',')]
        pressed: Vec<i32>,
        #[arg(long)]
        key_code: i32,
        #[arg(long, default_value_t = 2)]
        key_action: i32,
    },

    /// Print the effective configuration.
    Config,

    /// Run a scripted session against in-process services.
    Demo,
}

fn verdict(filtered: bool) -> &'static str {
    if filtered {
        "local"
    } else {
        "forward"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.level)),
        )
        .init();

    match cli.command {
        Commands::FilterTouch { screens, x, y } => {
            let filter = ScreenFilter::new();
            filter.update(&screens).context("invalid screen infos")?;
            let filtered = filter.is_touch_event_need_filter_out(&TouchEvent::new(x, y));
            println!("{}", verdict(filtered));
        }
        Commands::FilterKey {
            whitelist,
            device,
            pressed,
            key_code,
            key_action,
        } => {
            let store = WhiteListStore::new();
            let device = DeviceId::new(device);
            store.add(&device, &whitelist).context("invalid whitelist")?;
            let event = BusinessEvent {
                pressed_keys: pressed,
                key_code,
                key_action,
            };
            println!("{}", verdict(store.is_need_filter_out(&device, &event)));
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Demo => demo(config).await?,
    }

    Ok(())
}

/// Forwards every completion to the demo's report channel.
struct Report(mpsc::UnboundedSender<String>);

impl RegisterCallback for Report {
    fn on_result(&self, device_id: &DeviceId, dh_id: &DhId, status: i32) {
        let _ = self.0.send(format!("register {device_id}/{dh_id}: {status}"));
    }
}

impl PrepareCallback for Report {
    fn on_result(&self, peer: &SessionPeer, status: i32) {
        let _ = self.0.send(format!("prepare {peer}: {status}"));
    }
}

impl StartCallback for Report {
    fn on_result(&self, peer: &SessionPeer, input_types: InputTypeMask, status: i32) {
        let _ = self.0.send(format!("start {peer} [{input_types}]: {status}"));
    }
}

impl SimulationEventListener for Report {
    fn on_simulation_event(&self, event_type: u32, code: u32, value: i32) {
        let _ = self
            .0
            .send(format!("simulation event {event_type}/{code}/{value}"));
    }
}

async fn expect_report(rx: &mut mpsc::UnboundedReceiver<String>) -> anyhow::Result<()> {
    let line = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .context("timed out waiting for a completion")?
        .context("report channel closed")?;
    println!("  {line}");
    Ok(())
}

async fn demo(config: ClientConfig) -> anyhow::Result<()> {
    let source = MockSourceService::new();
    let sink = MockSinkService::new();
    let locator = MockServiceLocator::with_services(source.clone(), sink.clone());
    let client = DistributedInputClient::new(Arc::new(locator.clone()), config);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let report = Arc::new(Report(tx));

    println!("initialising roles");
    client.init_source().await?;
    client.init_sink().await?;
    println!("  role: {}", client.server_role());

    let peer = DeviceId::new("sink-device");
    let keyboard = DhId::new("Input_keyboard");
    println!("registering and starting {keyboard}");
    client
        .register_distributed_hardware(&peer, &keyboard, &EnableParams::default(), report.clone())
        .await?;
    expect_report(&mut rx).await?;
    client.prepare_remote_input(&peer, report.clone()).await?;
    expect_report(&mut rx).await?;
    client
        .start_remote_input(&peer, InputTypeMask::ALL, report.clone())
        .await?;
    expect_report(&mut rx).await?;

    sink.set_sharing(&keyboard, true);
    println!(
        "  sharing {keyboard}: {}",
        client.is_start_distributed_input(&keyboard)
    );

    println!("filters");
    sink.push_screen_infos("[[0,0,1280,720]]");
    for (x, y) in [(640, 360), (1280, 720)] {
        let filtered = client.is_touch_event_need_filter_out(&TouchEvent::new(x, y));
        println!("  touch ({x},{y}): {}", verdict(filtered));
    }
    source.push_white_list(&peer, "[[[2072],2017,2]]");
    let copy = BusinessEvent {
        pressed_keys: vec![2072],
        key_code: 2017,
        key_action: 2,
    };
    let plain = BusinessEvent {
        pressed_keys: Vec::new(),
        ..copy.clone()
    };
    println!("  ctrl+c: {}", verdict(client.is_need_filter_out(&peer, &copy)));
    println!("  c: {}", verdict(client.is_need_filter_out(&peer, &plain)));

    let listener = client
        .register_simulation_event_listener(report.clone())
        .await?;
    println!("source service restart");
    locator.crash_source();
    let restarted = MockSourceService::new();
    locator.publish_source(restarted.clone());
    tokio::time::timeout(Duration::from_secs(5), async {
        while !restarted.simulation_listener_ids().contains(&listener) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .context("listener was not replayed")?;
    info!(listener = %listener, "listener replayed");
    restarted.emit_simulation_event(1, 30, 1);
    expect_report(&mut rx).await?;

    client.shutdown().await;
    println!("done");
    Ok(())
}
