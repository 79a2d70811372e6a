use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if it exists (optional - won't fail if missing)
    // This must happen before any config is read from environment
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    credplane::cli::run_cli().await
}
