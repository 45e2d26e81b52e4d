use tracing::{info, warn};

use crate::cmd::{connect, millis, parse_duration, ResetArgs};
use crate::exit::{engine_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_response, OutputFormat};

pub fn run(args: ResetArgs, format: OutputFormat) -> CliResult<i32> {
    if args.attempts == 0 {
        return Err(CliError::new(USAGE, "--attempts must be at least 1"));
    }
    let timeout = parse_duration(&args.timeout)?;
    let engine = connect(&args.device)?;

    let mut reply = None;
    for attempt in 1..=args.attempts {
        match engine.transact("RS", millis(timeout)) {
            Ok(Some(response)) => {
                info!(attempt, "device reset");
                reply = Some(response);
                break;
            }
            Ok(None) => warn!(attempt, "no reply to RS, retrying"),
            Err(err) => {
                engine.close();
                return Err(engine_error("reset failed", err));
            }
        }
    }

    let Some(response) = reply else {
        engine.close();
        return Err(CliError::new(
            TIMEOUT,
            format!("device did not answer RS after {} attempts", args.attempts),
        ));
    };

    if args.scip2 {
        // Devices already in SCIP 2.0 mode answer with an error status.
        match engine.transact("SCIP2.0", millis(timeout)) {
            Ok(Some(mode)) => info!(status = ?mode.status(), "requested SCIP 2.0 mode"),
            Ok(None) => warn!("no reply to SCIP2.0"),
            Err(err) => {
                engine.close();
                return Err(engine_error("mode switch failed", err));
            }
        }
    }

    print_response(&response, format);
    engine.close();
    Ok(SUCCESS)
}
