use std::process::ExitCode;

fn main() -> ExitCode {
    stonequote_cli::run()
}
