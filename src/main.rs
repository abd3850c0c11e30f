use std::env;
use std::sync::Arc;

use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use skillswap_engine::Engine;
use skillswap_engine::notify::TracingSink;
use skillswap_engine::script::{ScriptRunner, read_commands, write_balances};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let path = env::args()
        .nth(1)
        .expect("usage: skillswap-engine <scenario.csv>");

    if !path.ends_with(".csv") {
        warn!(path, "input file seems to not be a csv file");
    }

    let engine = Arc::new(Engine::new(Arc::new(TracingSink)));
    let mut runner = ScriptRunner::new(engine);
    let (cmd_sender, cmd_receiver) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        for result in read_commands(&path) {
            match result {
                Ok(command) => {
                    cmd_sender.send(command).await.unwrap();
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    runner.run(ReceiverStream::new(cmd_receiver)).await;

    write_balances(runner.balances().await);
}
