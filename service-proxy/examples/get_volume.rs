use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use service_proxy::logging::{init_logging, LoggingMode};
use service_proxy::{
    Argument, HttpTransport, HttpTransportConfig, OutArgument, ProxyConfig, ServiceEndpoint,
    ServiceProxy, Transport, TypedValue, ValueType,
};
use tokio::sync::oneshot;
use tokio::task::LocalSet;

/// Read the volume of a UPnP renderer and optionally watch it change
#[derive(Parser, Debug)]
#[command(name = "get_volume")]
struct Args {
    /// Control URL of the RenderingControl service
    #[arg(long)]
    control_url: String,

    /// Event subscription URL of the RenderingControl service
    #[arg(long)]
    event_url: Option<String>,

    #[arg(long, default_value = "urn:schemas-upnp-org:service:RenderingControl:1")]
    service_type: String,

    /// Subscribe and print Volume/LastChange notifications
    #[arg(short, long)]
    subscribe: bool,

    /// How long to stay subscribed
    #[arg(long, default_value = "60")]
    seconds: u64,

    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(if args.debug {
        LoggingMode::Debug
    } else {
        LoggingMode::Development
    })?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    LocalSet::new().block_on(&runtime, run(args))
}

async fn run(args: Args) -> Result<()> {
    let transport = HttpTransport::start(HttpTransportConfig::default())
        .await
        .context("Failed to start HTTP transport")?;

    let mut endpoint = ServiceEndpoint::new(&args.service_type, "uuid:get-volume")
        .with_control_url(&args.control_url)?;
    if let Some(event_url) = &args.event_url {
        endpoint = endpoint.with_event_subscription_url(event_url)?;
    }

    let proxy = ServiceProxy::new(endpoint, transport as Rc<dyn Transport>, ProxyConfig::default())?;

    let (tx, rx) = oneshot::channel();
    proxy.begin_action(
        "GetVolume",
        &[
            Argument::new("InstanceID", 0u32),
            Argument::new("Channel", "Master"),
        ],
        move |proxy, handle| {
            let result =
                proxy.end_action(handle, &[OutArgument::new("CurrentVolume", ValueType::UInt)]);
            let _ = tx.send(result);
        },
    );

    let values = rx.await.context("action callback dropped")??;
    for (name, value) in &values {
        println!("{name}: {}", value.to_wire_string());
    }

    if !args.subscribe {
        return Ok(());
    }

    for variable in ["Volume", "LastChange"] {
        proxy.add_notify(variable, ValueType::String, |_, name, value: &TypedValue| {
            println!("{name} changed: {}", value.as_str().unwrap_or_default());
        })?;
    }
    proxy.connect_subscription_lost(|_, lost| eprintln!("subscription lost: {lost}"));
    proxy.set_subscribed(true);

    println!("Listening for {} seconds on {}", args.seconds, proxy.delivery_url());
    tokio::time::sleep(Duration::from_secs(args.seconds)).await;

    // Dropping the proxy sends UNSUBSCRIBE.
    Ok(())
}
