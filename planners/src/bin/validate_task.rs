//! Parses a SAS⁺ task, writes it back out and checks that the round trip is
//! stable. Mainly used to exercise the reader against task collections in CI.

use std::path::PathBuf;
use std::process::exit;
use structopt::StructOpt;
use tessera_planners::ExitCode;
use tessera_planning::sas;

#[derive(Debug, StructOpt)]
#[structopt(name = "validate-task", rename_all = "kebab-case")]
struct Opt {
    /// Paths of the preprocessed SAS⁺ tasks to check.
    tasks: Vec<PathBuf>,
    /// Print the re-serialized task to stdout (single task only).
    #[structopt(long)]
    dump: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    let opt = Opt::from_args();
    let mut failures = 0;
    for path in &opt.tasks {
        match sas::load_task(path) {
            Ok(task) => {
                let dumped = sas::write_task(&task);
                match sas::read_task(&dumped) {
                    Ok(reparsed) if reparsed == task => {
                        tracing::info!(
                            "{}: ok ({} variables, {} operators)",
                            path.display(),
                            task.num_variables(),
                            task.num_operators()
                        );
                        if opt.dump {
                            print!("{dumped}");
                        }
                    }
                    Ok(_) => {
                        tracing::error!("{}: round trip changed the task", path.display());
                        failures += 1;
                    }
                    Err(err) => {
                        tracing::error!("{}: round trip failed to parse: {err}", path.display());
                        failures += 1;
                    }
                }
            }
            Err(err) => {
                tracing::error!("{}: {err}", path.display());
                failures += 1;
            }
        }
    }
    if failures > 0 {
        exit(ExitCode::InputError.code());
    }
    exit(ExitCode::Success.code());
}
