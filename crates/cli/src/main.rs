//! monodep CLI application

// CLI binary needs to output to stdout/stderr
#![allow(clippy::print_stdout, clippy::print_stderr)]

use monodep_cli::cli::{self, EXIT_ANALYSIS, exit_code_for, render_error};
use monodep_cli::commands;
use monodep_cli::tracing::{self, TracingConfig, TracingFormat};
use tokio_util::sync::CancellationToken;

fn main() {
    // Tracing may be unusable during a panic.
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = cli::parse();

    let tracing_config = TracingConfig {
        format: if cli.json {
            TracingFormat::Json
        } else {
            cli.log_format
        },
        level: cli.level.into(),
        ..Default::default()
    };
    if let Err(e) = tracing::init_tracing(tracing_config) {
        eprintln!("{e:?}");
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Fatal error: Failed to create tokio runtime: {e}");
            std::process::exit(EXIT_ANALYSIS);
        }
    };

    let exit_code = runtime.block_on(run(cli));
    std::process::exit(exit_code);
}

async fn run(cli: cli::Cli) -> i32 {
    let json_mode = cli.json;
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ::tracing::warn!("Interrupted, stopping");
            interrupt.cancel();
        }
    });

    match commands::execute(cli.command, json_mode, cancel).await {
        Ok(output) => {
            print!("{}", output.text);
            if !output.text.ends_with('\n') {
                println!();
            }
            output.exit_code
        }
        Err(err) => {
            render_error(&err, json_mode);
            exit_code_for(&err)
        }
    }
}
