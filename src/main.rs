extern crate heatplan;

use clap::Parser;
use heatplan::output::{FileOutput, SinkOutput};
use heatplan::run_planning_cycle;
use std::ffi::OsStr;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[derive(Parser, Default, Debug)]
#[clap(author, version, about, long_about = None)]
struct PlanArgs {
    /// JSON scenario file with device parameters and the forecast, demand
    /// and surplus series
    scenario_file: String,
    /// Directory for the per-hour simulation log; no log is written when omitted
    #[arg(long, short)]
    log_directory: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = PlanArgs::parse();

    let scenario_file = args.scenario_file.as_str();
    let scenario_file_ext = Path::new(scenario_file).extension().and_then(OsStr::to_str);
    let scenario_file_stem = match scenario_file_ext {
        Some(ext) => &scenario_file[..(scenario_file.len() - ext.len() - 1)],
        None => scenario_file,
    };
    let file_prefix = format!(
        "{}-run-",
        Path::new(scenario_file_stem)
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or("scenario")
    );

    let scenario = BufReader::new(File::open(Path::new(scenario_file))?);

    let outcome = match args.log_directory {
        Some(directory) => {
            run_planning_cycle(scenario, FileOutput::new(directory, file_prefix))?
        }
        None => run_planning_cycle(scenario, SinkOutput)?,
    };

    let import_percent = if outcome.electricity_used > 0. {
        100. * outcome.electricity_imported / outcome.electricity_used
    } else {
        0.
    };
    println!(
        "Planned {} hours of heating, requiring {:.2}kWh of electricity of which {:.2}kWh ({:.0}%) was imported",
        outcome.schedule.active_hours(),
        outcome.electricity_used,
        outcome.electricity_imported,
        import_percent,
    );
    if !outcome.comfort_guaranteed {
        println!("Warning: comfort conditions could not be guaranteed over the horizon");
    }
    println!(
        "Heat pump for the coming hour: {}",
        if outcome.heat_now() { "ON" } else { "OFF" }
    );

    Ok(())
}
