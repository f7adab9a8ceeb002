use std::process::ExitCode;

fn main() -> ExitCode {
    tenderflow_cli::run()
}
