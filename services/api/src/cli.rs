use crate::demo::{run_demo, run_order_check, DemoArgs, OrderCheckArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use order_risk::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Order Risk Pipeline",
    about = "Score orders ahead of capture and watch approved orders for chargebacks",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service and the scheduled monitoring sweep (default command)
    Serve(ServeArgs),
    /// Offline tools for a single order
    Order {
        #[command(subcommand)]
        command: OrderCommand,
    },
    /// Walk two orders through scoring, review, monitoring, and a chargeback
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum OrderCommand {
    /// Score an order read from a JSON file without persisting anything
    Check(OrderCheckArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Disable the background monitoring sweep
    #[arg(long)]
    pub(crate) no_sweep: bool,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Order {
            command: OrderCommand::Check(args),
        } => run_order_check(args).await,
        Command::Demo(args) => run_demo(args).await,
    }
}
