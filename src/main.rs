use std::process::ExitCode;

fn main() -> ExitCode {
    deskwatch_lib::run()
}
