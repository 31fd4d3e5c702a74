//! CLI entry point: a thin `clap` wrapper over `Driver`, grounded on the teacher's
//! own `main.rs` (`app_from_crate!()`, builder-style `Arg::with_name`).

#[macro_use]
extern crate clap;

use bassette::Driver;
use clap::Arg;
use std::process::ExitCode;

fn main() -> ExitCode {
    let matches = app_from_crate!()
        .arg(
            Arg::with_name("INPUT")
                .help("Sets the input source file to assemble")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .value_name("OUTPUT")
                .help("Pre-opens OUTPUT as the target file before assembly runs"),
        )
        .arg(
            Arg::with_name("define")
                .long("define")
                .takes_value(true)
                .value_name("NAME=VALUE")
                .multiple(true)
                .number_of_values(1)
                .help("Seeds a global define before assembly runs"),
        )
        .arg(
            Arg::with_name("constant")
                .long("constant")
                .takes_value(true)
                .value_name("NAME=VALUE")
                .multiple(true)
                .number_of_values(1)
                .help("Seeds a global constant, evaluated immediately"),
        )
        .arg(Arg::with_name("strict").long("strict").help("Promotes warnings to fatal errors"))
        .get_matches();

    let input = matches.value_of("INPUT").unwrap();
    let strict = matches.is_present("strict");

    let mut driver = Driver::new();

    if let Some(defines) = matches.values_of("define") {
        for pair in defines {
            match pair.split_once('=') {
                Some((name, value)) => driver.define(name, value),
                None => {
                    eprintln!("error: malformed --define, expected NAME=VALUE: {pair}");
                    return ExitCode::FAILURE;
                }
            }
        }
    }

    if let Some(constants) = matches.values_of("constant") {
        for pair in constants {
            match pair.split_once('=') {
                Some((name, value)) => driver.constant(name, value),
                None => {
                    eprintln!("error: malformed --constant, expected NAME=VALUE: {pair}");
                    return ExitCode::FAILURE;
                }
            }
        }
    }

    if let Some(output) = matches.value_of("output") {
        if driver.set_output_target(Some(output.into()), true).is_err() {
            return ExitCode::FAILURE;
        }
    }

    match driver.source(input) {
        Ok(true) => {}
        Ok(false) | Err(_) => return ExitCode::FAILURE,
    }

    if driver.assemble(strict) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
