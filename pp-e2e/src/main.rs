mod cases;
mod ibmcloud;
mod rolling_update;
mod run;
mod test_case;

use clap::{
    Parser,
    Subcommand,
    crate_version,
};
use pp_core::errors::*;
use pp_core::logging;
use tracing::*;

#[derive(Parser)]
#[command(about = "end-to-end tests for peer pods", version, propagate_version = true)]
struct PpCommandRoot {
    #[command(subcommand)]
    subcommand: PpSubcommand,

    #[arg(short, long, default_value = "info")]
    verbosity: String,
}

#[derive(Subcommand)]
enum PpSubcommand {
    #[command(about = "list the registered tests")]
    List,

    #[command(about = "run the e2e tests against the current cluster", visible_alias = "r")]
    Run(run::Args),

    #[command(about = "ppctl version")]
    Version,
}

async fn dispatch(args: PpCommandRoot) -> EmptyResult {
    match &args.subcommand {
        PpSubcommand::List => {
            for (name, _) in ibmcloud::IBMCLOUD_TESTS {
                println!("{name}");
            }
            Ok(())
        },
        PpSubcommand::Run(run_args) => {
            let client = kube::Client::try_default().await?;
            run::cmd(run_args, client).await
        },
        PpSubcommand::Version => {
            println!("ppctl {}", crate_version!());
            Ok(())
        },
    }
}

#[tokio::main]
async fn main() {
    let args = PpCommandRoot::parse();
    logging::setup_for_cli(&args.verbosity);
    if let Err(err) = dispatch(args).await {
        pperr!(err, "ppctl failed");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests;
