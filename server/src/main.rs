use clap::Parser;
use server::server::Server;
use std::path::PathBuf;

/// Parses command-line arguments and runs the dispatcher until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Address to bind to
        #[clap(short = 'H', long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[clap(short, long, default_value = "9001")]
        port: u16,
        /// Scenario to load at startup
        #[clap(short, long, default_value = "hexagon")]
        map: String,
        /// Directory containing scenario files
        #[clap(short, long, default_value = "scenario")]
        scenario_dir: PathBuf,
    }

    env_logger::init();
    let args = Args::parse();

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::bind(&address, &args.map, args.scenario_dir).await?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("received Ctrl+C, shutting down");
            Ok(())
        }
    }
}
