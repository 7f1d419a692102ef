use std::env;
use std::sync::Arc;

use myplace_bridge::accessory;
use myplace_bridge::{ControlLoop, DEFAULT_PORT, MyPlaceClient, channel, read_initial_state, status};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> myplace_bridge::Result<()> {
    tracing_subscriber::fmt::init();

    let host = env::var("AIRKIT_API_HOST").expect("AIRKIT_API_HOST must be set");
    let port = match env::var("AIRKIT_API_PORT") {
        Ok(p) => p.parse().expect("AIRKIT_API_PORT must be a port number"),
        Err(_) => DEFAULT_PORT,
    };
    let watch = env::args().any(|a| a == "--watch");

    let client = Arc::new(MyPlaceClient::builder(&host).port(port).build()?);

    if !watch {
        let system = client.read().await?;
        for ac in &system.aircons {
            println!("{}", status::format_aircon(ac));
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    println!("Connecting to {host}:{port}...");
    let system = read_initial_state(&client, &cancel).await?;
    for ac in &system.aircons {
        println!("{}", status::format_aircon(ac));
    }

    let bridge = accessory::bridge(&system, env!("CARGO_PKG_VERSION"));
    println!("{} [{}] {}", bridge.info.name, bridge.info.model, bridge.info.firmware);
    println!("Watching {} unit(s). Ctrl-C to stop.", system.aircons.len());

    // No reconcilers and nothing submitted: the loop only polls and reports.
    let (_commands, receiver) = channel(1);
    ControlLoop::builder(client, Vec::new(), receiver)
        .initial_state(system)
        .on_event(|event| println!("{event:?}"))
        .build()
        .run(cancel)
        .await;

    Ok(())
}
