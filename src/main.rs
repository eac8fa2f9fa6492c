use clap::Parser;
use netfanhub::{config::HubConfigCli, hub::FanHub};

/// Relay every WebSocket message to every connected client.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Arguments {
    #[command(flatten)]
    hub: HubConfigCli,
}

fn main() {
    let args = Arguments::parse();
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
        .block_on(async {
            FanHub::main(args.hub).await;
        });
}
