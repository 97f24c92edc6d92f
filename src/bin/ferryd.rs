use anyhow::{Context, Result};
use clap::Parser;

use ferry::cli::DaemonOpts;
use ferry::logging;
use ferry::Server;

fn main() -> Result<()> {
    let opts = DaemonOpts::parse();
    logging::init(opts.verbose);

    let config = opts.into_config()?;

    println!("Starting Ferry daemon:");
    println!("  Directory: {}", config.directory.display());
    println!("  Bind: {}:{}", config.host, config.port);
    println!(
        "  Framing: {}-byte length prefix, {}-byte reads",
        config.metadata_width, config.chunk_size
    );

    // Security warning for 0.0.0.0 binding
    if config.host == "0.0.0.0" {
        eprintln!("WARNING: Binding to 0.0.0.0 exposes the daemon to all network interfaces");
        eprintln!("   This protocol is UNENCRYPTED and UNAUTHENTICATED");
        eprintln!("   Only use on trusted networks (LAN)");
        eprintln!();
    }

    let mut server = Server::bind(config).context("Failed to start server")?;

    let handle = server.shutdown_handle();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted. Stopping server...");
        if handle.shutdown().is_err() {
            // Exit immediately with 130 (128 + SIGINT)
            std::process::exit(130);
        }
    })
    .context("Error setting Ctrl-C handler")?;

    server.run()
}
