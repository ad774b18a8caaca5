// src/main.rs

use autopatcher::{cli, run};

#[tokio::main]
async fn main() {
    let args = cli::parse();
    let code = run(args).await;
    std::process::exit(code);
}
