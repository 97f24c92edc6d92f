//! Ferry send client
//!
//! Uploads one file to a running `ferryd`.

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;

use ferry::cli::SendOpts;
use ferry::client::{self, ClientOptions};
use ferry::logging;

fn main() -> Result<()> {
    // Set up Ctrl-C handler
    ctrlc::set_handler(move || {
        eprintln!("\nStopping client...");
        // Exit immediately with 130 (128 + SIGINT)
        std::process::exit(130);
    })
    .context("Error setting Ctrl-C handler")?;

    let opts = SendOpts::parse();
    logging::init(opts.verbose);

    let client_opts = ClientOptions {
        metadata_width: opts.metadata_width,
        chunk_size: opts.chunk_size,
        quiet: opts.quiet,
        close_timeout: opts.close_timeout.map(Duration::from_secs),
    };
    let report = client::send_file(&opts.file_path, &opts.host, opts.port, &client_opts)
        .with_context(|| format!("Failed to send {}", opts.file_path.display()))?;

    if opts.quiet {
        println!(
            "{} {} {:.3}s",
            report.filename,
            report.bytes_sent,
            report.elapsed.as_secs_f64()
        );
    }
    Ok(())
}
