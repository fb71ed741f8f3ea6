use std::env;

fn main() -> anyhow::Result<()> {
    handctl::logging::init(env::args().any(|a| a == "--verbose" || a == "-v"));
    handctl::cli::run()
}
