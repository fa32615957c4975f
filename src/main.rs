use clap::Parser;
use dotenv::dotenv;
use log::error;
use product_chat::cli::Args;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match product_chat::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            for (depth, cause) in product_chat::error_chain(e.as_ref()).iter().enumerate() {
                if depth == 0 {
                    error!("❌ {}", cause);
                } else {
                    error!("   caused by: {}", cause);
                }
            }
            ExitCode::FAILURE
        }
    }
}
