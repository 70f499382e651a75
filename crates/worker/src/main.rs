//! `panel-worker` – runs one docker or qemu action and prints one JSON
//! envelope on stdout.
//!
//! Handled failures still exit 0; the envelope says what went wrong. Only
//! unusable invocations exit 1.

mod args;
mod docker;
mod exec;
mod outcome;
mod qemu;

#[cfg(test)]
mod testing;

use args::Args;
use clap::Parser;
use engine::{AppContext, Service, WorkerEnvelope};
use outcome::{into_envelope, ActionResult};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "panel-worker",
    version,
    about = "Run one docker or qemu action and print a JSON envelope"
)]
struct Cli {
    /// Service: docker | qemu
    #[arg(long)]
    service: Service,
    /// Action name (e.g. "list_images", "stop_vm").
    #[arg(long)]
    action: String,
    /// JSON object of action arguments.
    #[arg(long)]
    args: Option<String>,
}

#[tokio::main]
async fn main() {
    // stdout is reserved for the envelope.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            emit(&WorkerEnvelope::fail(e.kind().to_string(), Some(e.to_string())));
            std::process::exit(1);
        }
    };

    let args = match Args::parse(cli.args.as_deref()) {
        Ok(args) => args,
        Err(message) => {
            emit(&WorkerEnvelope::fail(message, None));
            std::process::exit(1);
        }
    };

    let ctx = AppContext::default_platform();
    let result = dispatch(&ctx, cli.service, &cli.action, &args).await;
    if let Err(ref e) = result {
        tracing::info!(service = %cli.service, action = %cli.action, error = %e, "action failed");
    }
    emit(&into_envelope(result));
}

async fn dispatch(ctx: &AppContext, service: Service, action: &str, args: &Args) -> ActionResult {
    match service {
        Service::Docker => docker::dispatch(ctx, action, args).await,
        Service::Qemu => qemu::dispatch(ctx, action, args).await,
    }
}

fn emit(envelope: &WorkerEnvelope) {
    match serde_json::to_string(envelope) {
        Ok(line) => println!("{}", line),
        Err(e) => println!(r#"{{"success":false,"error":"cannot encode result: {}"}}"#, e),
    }
}
