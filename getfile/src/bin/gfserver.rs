//! gfserver: serve files over GETFILE with a fixed pool of worker threads.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{ArgAction, Parser};

use getfile::server::{self, ServerConfig, DEFAULT_CONTENT_MAP, DEFAULT_PORT, DEFAULT_WORKERS};

#[derive(Debug, Parser)]
#[command(name = "gfserver", version, about = "Serve files over GETFILE with a fixed pool of worker threads")]
struct Cli {
    /// Listen port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Number of worker threads, at least 1
    #[arg(short = 't', long = "nthreads", default_value_t = DEFAULT_WORKERS.get() as i64, allow_negative_numbers = true)]
    nthreads: i64,

    /// Content file mapping keys to content files
    #[arg(short = 'm', long = "content", default_value = DEFAULT_CONTENT_MAP)]
    content: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn config(&self) -> ServerConfig {
        let workers = usize::try_from(self.nthreads).ok().and_then(NonZeroUsize::new).unwrap_or(NonZeroUsize::MIN);

        ServerConfig {
            port: self.port,
            workers,
            content_map: self.content.clone(),
            ..Default::default()
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(1),
            };
        }
    };

    getfile::logging::init(cli.verbose);

    let server = match server::start(&cli.config()) {
        Ok(server) => server,
        Err(err @ server::Error::Spawn(_)) => {
            tracing::error!("{err}");
            return ExitCode::from(1);
        }
        Err(err) => {
            tracing::error!("{err}");
            return ExitCode::from(3);
        }
    };

    let stopper = server.stopper();
    if let Err(err) = ctrlc::set_handler(move || {
        tracing::info!("Received shutdown signal, exiting...");
        stopper.stop();
    }) {
        tracing::error!("Failed to set signal handler: {err}");
        return ExitCode::from(3);
    }

    // in-flight requests are not drained, they end with the process
    server.wait();

    ExitCode::SUCCESS
}
