//! The `kiln dev` command: build, serve and rebuild on change.

use clap::Args;
use console::style;
use kiln_core::{BuildMode, Config, Kiln, Stage};

use super::build::{print_lint, print_summary, run_build};

/// Arguments for the `dev` command.
#[derive(Args, Debug, Default)]
pub struct DevArgs {
    /// Port to listen on (overrides server.port)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind (overrides server.host)
    #[arg(long)]
    pub host: Option<String>,

    /// Serve without injecting the live-reload client
    #[arg(long)]
    pub no_reload: bool,

    /// Build and serve the production directory
    #[arg(long)]
    pub production: bool,
}

/// Execute the dev command. Runs until Ctrl+C.
pub async fn execute(args: DevArgs, mut config: Config) -> anyhow::Result<()> {
    apply_overrides(&args, &mut config);

    let kiln = Kiln::new(config)?;
    let report = run_build(kiln.pipeline(), &Stage::ALL).await?;
    print_lint(&report);
    print_summary(&report);

    let server = kiln.serve().await?;
    let addr = server.local_addr()?;
    eprintln!(
        "\n  {} http://{}  {}\n",
        style("Serving").green().bold(),
        addr,
        style("(Ctrl+C to stop)").dim()
    );

    tokio::select! {
        result = server.run() => result?,
        result = kiln.watch() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }
    Ok(())
}

fn apply_overrides(args: &DevArgs, config: &mut Config) {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if args.no_reload {
        config.server.live_reload = false;
    }
    if args.production {
        config.project.mode = BuildMode::Production;
    }
}
