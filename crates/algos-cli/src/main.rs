use algos_core::logging;

mod cli;

#[tokio::main]
async fn main() {
    // Initialize logging as early as possible; a read-only state dir should not stop the CLI.
    if logging::init_logging("algos").is_err() {
        logging::init_logging_stderr();
    }

    match cli::run_from_args().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("algos error: {:#}", err);
            std::process::exit(1);
        }
    }
}
