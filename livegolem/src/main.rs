use anyhow::{Context, Result};
use structopt::StructOpt;

mod discord;
mod golem;

#[derive(Debug, StructOpt)]
struct Opt {
    /// dhall file with the golem and plugins configuration
    #[structopt(long, default_value = "golem_config.dhall")]
    config: String,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    let opt = Opt::from_args();
    log::info!("Reading configuration from {}", opt.config);

    golem::Golem::new_from_config(&opt.config)
        .await?
        .run()
        .await
        .context("Plugin golem crashed")?;

    log::info!("golem stopped");
    Ok(())
}
