use std::{io, process::ExitCode};

use nextfit::{program, Config, Heap, ProgramError, Region};

fn main() -> ExitCode {
    match try_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("nextfit: {err}");
            ExitCode::FAILURE
        }
    }
}

fn try_main() -> Result<(), ProgramError> {
    let config = Config::from_env()?;
    let region = Region::request(config.region_size)?;
    let mut heap = Heap::new(region);

    // A region too small for the cycle isn't fatal, appends just get dropped.
    if let Err(err) = heap.init() {
        tracing::warn!(%err, "heap unusable");
    }

    program::run(&mut heap, io::stdin().lock(), io::stdout().lock())?;

    Ok(())
}
