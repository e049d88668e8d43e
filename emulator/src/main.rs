mod session;

use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use crossterm::style::Stylize;
use session::{Scenario, Session, TranscriptLine, TranscriptRole};

const USAGE: &str = "Usage: node-emulator [--scenario <nominal|sensor-absent|join-timeout|broker-down|publish-failure|invalid-reading>] [--cycles N] [--log <path>]";

struct Options {
    scenario: Scenario,
    cycles: u32,
    log: Option<PathBuf>,
}

fn main() -> io::Result<()> {
    let options = parse_options(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new(options.scenario, options.log.as_deref())?;

    writeln!(
        writer,
        "Telemetry node emulator: {} ({}), {} cycle(s).",
        options.scenario.tag(),
        options.scenario.header(),
        options.cycles
    )?;

    for cycle in 1..=options.cycles {
        for line in session.run_cycle(cycle)? {
            writeln!(writer, "{}", styled(&line))?;
        }
    }

    writeln!(
        writer,
        "Session closed after {} ms of virtual time.",
        session.elapsed().as_millis()
    )?;
    Ok(())
}

fn styled(line: &TranscriptLine) -> String {
    let rendered = line.render();
    match line.role {
        TranscriptRole::Cycle => rendered.cyan().to_string(),
        TranscriptRole::Service => rendered.dark_grey().to_string(),
        TranscriptRole::Diagnostic => rendered.yellow().to_string(),
        TranscriptRole::Failure => rendered.red().bold().to_string(),
    }
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<Options, String> {
    let mut options = Options {
        scenario: Scenario::Nominal,
        cycles: 1,
        log: None,
    };

    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
            None => (arg, None),
        };
        let mut value = || {
            inline
                .clone()
                .or_else(|| args.next())
                .ok_or_else(|| format!("Expected value after {flag}"))
        };

        match flag.as_str() {
            "--scenario" => options.scenario = Scenario::from_tag(&value()?)?,
            "--cycles" => {
                let raw = value()?;
                options.cycles = raw
                    .parse()
                    .ok()
                    .filter(|cycles| *cycles > 0)
                    .ok_or_else(|| format!("Invalid cycle count `{raw}`"))?;
            }
            "--log" => options.log = Some(PathBuf::from(value()?)),
            // A bare tag selects the scenario.
            other if !other.starts_with('-') => options.scenario = Scenario::from_tag(other)?,
            other => return Err(format!("Unknown option `{other}`")),
        }
    }

    Ok(options)
}
