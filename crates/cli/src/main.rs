use std::process::ExitCode;

fn main() -> ExitCode {
    imprest_cli::run()
}
