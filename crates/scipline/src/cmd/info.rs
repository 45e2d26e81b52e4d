use std::time::Duration;

use scipline_engine::Engine;

use crate::cmd::{connect, millis, parse_duration, InfoArgs};
use crate::exit::{engine_error, CliError, CliResult, DATA_INVALID, SUCCESS, TIMEOUT};
use crate::output::{parse_properties, print_properties, OutputFormat, Property};

/// Version, parameter and status queries, in the order the device documents them.
const PROPERTY_COMMANDS: [&str; 3] = ["VV", "PP", "II"];

pub fn run(args: InfoArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let engine = connect(&args.device)?;

    let result = query_properties(&engine, timeout);
    engine.close();

    let properties = result?;
    print_properties(&properties, format);
    Ok(SUCCESS)
}

/// Run every property query and collect the `KEY:value` pairs.
pub fn query_properties(engine: &Engine, timeout: Duration) -> CliResult<Vec<Property>> {
    let mut properties = Vec::new();
    for command in PROPERTY_COMMANDS {
        let response = engine
            .transact(command, millis(timeout))
            .map_err(|err| engine_error(&format!("{command} failed"), err))?
            .ok_or_else(|| {
                CliError::new(TIMEOUT, format!("no reply to {command} within {timeout:?}"))
            })?;

        if response.status() != Some("00") {
            return Err(CliError::new(
                DATA_INVALID,
                format!(
                    "{command} failed with status {}",
                    response.status().unwrap_or("?")
                ),
            ));
        }
        properties.extend(parse_properties(command, &response));
    }
    Ok(properties)
}

/// Look up a property value by key.
pub fn property<'a>(properties: &'a [Property], key: &str) -> Option<&'a str> {
    properties
        .iter()
        .find(|p| p.key == key)
        .map(|p| p.value.as_str())
}
