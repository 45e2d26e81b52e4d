use crate::cmd::{connect, millis, parse_duration, SendArgs};
use crate::exit::{engine_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_response, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let engine = connect(&args.device)?;

    let response = engine
        .transact(&args.command, millis(timeout))
        .map_err(|err| engine_error("send failed", err))?;

    let result = match response {
        Some(response) => {
            print_response(&response, format);
            Ok(SUCCESS)
        }
        None => Err(CliError::new(
            TIMEOUT,
            format!("no reply to {} within {timeout:?}", args.command),
        )),
    };

    engine.close();
    result
}
