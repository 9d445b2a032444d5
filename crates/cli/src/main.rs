use std::process::ExitCode;

fn main() -> ExitCode {
    liftlab_cli::run()
}
