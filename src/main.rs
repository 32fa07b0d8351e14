// src/main.rs

use watchrun::{cli, run};

#[tokio::main]
async fn main() {
    if let Err(err) = run(cli::parse()).await {
        eprintln!("watchrun error: {err:?}");
        std::process::exit(1);
    }
}
