//! gfclient: download a workload of paths from a GETFILE server with a fixed pool of worker threads.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::{ArgAction, Parser};
use url::Host;

use getfile::client::{self, ClientConfig, DEFAULT_PORT, DEFAULT_REQUESTS, DEFAULT_SERVER, DEFAULT_WORKERS, DEFAULT_WORKLOAD};

#[derive(Debug, Parser)]
#[command(name = "gfclient", version, about = "Download a workload of paths from a GETFILE server")]
struct Cli {
    /// Server address
    #[arg(short, long, default_value = DEFAULT_SERVER, value_parser = Host::parse)]
    server: Host,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Number of download threads
    #[arg(short = 't', long = "nthreads", default_value_t = DEFAULT_WORKERS)]
    nthreads: NonZeroUsize,

    /// Requests downloaded per thread, the default applies to non-positive values
    #[arg(short = 'n', long = "nrequests", default_value_t = DEFAULT_REQUESTS.get() as i64, allow_negative_numbers = true)]
    nrequests: i64,

    /// Path to workload file
    #[arg(short = 'w', long = "workload-path", default_value = DEFAULT_WORKLOAD)]
    workload: PathBuf,

    /// Directory to store downloaded files under
    #[arg(short = 'o', long = "output-dir", default_value = ".")]
    output_dir: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn config(&self) -> ClientConfig {
        let requests_per_worker = usize::try_from(self.nrequests).ok().and_then(NonZeroUsize::new).unwrap_or(DEFAULT_REQUESTS);

        ClientConfig {
            server: self.server.clone(),
            port: self.port,
            workers: self.nthreads,
            requests_per_worker,
            workload: self.workload.clone(),
            output_dir: self.output_dir.clone(),
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

    match client::run(&cli.config()) {
        Ok(outcomes) => {
            tracing::debug!("{} downloads performed", outcomes.len());
            ExitCode::SUCCESS
        }
        Err(err @ client::Error::Join(_)) => {
            tracing::error!("{err}");
            ExitCode::from(2)
        }
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::from(1)
        }
    }
}
