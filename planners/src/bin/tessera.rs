use structopt::StructOpt;
use tessera_planners::{run, Opt};

fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    let opt = Opt::from_args();
    let exit_code = run(&opt);
    std::process::exit(exit_code.code());
}
