mod commands;

use agentcore::policy::redaction::RedactingLogger;
use clap::Parser;
use commands::Args;

fn install_logger() {
    let env_logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).build();
    log::set_max_level(env_logger.filter());
    log::set_boxed_logger(Box::new(RedactingLogger::new(env_logger))).expect("logger already installed");
}

#[tokio::main]
async fn main() {
    install_logger();
    let args = Args::parse();
    let code = commands::run(args).await;
    std::process::exit(code);
}
