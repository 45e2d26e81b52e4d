use scipline_frame::{CommandWriter, ResponseReader};
use scipline_transport::Endpoint;
use tracing::info;

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::Result;

/// Connect to a device by path or `tcp://host[:port]` URL.
pub fn connect(path_or_url: &str) -> Result<Engine> {
    let endpoint = Endpoint::parse(path_or_url)?;
    connect_with_config(&endpoint, EngineConfig::default())
}

/// Connect with explicit configuration.
pub fn connect_with_config(endpoint: &Endpoint, config: EngineConfig) -> Result<Engine> {
    let stream = scipline_transport::connect(endpoint)?;
    let reader_stream = stream.try_clone()?;

    let reader = ResponseReader::with_config_stream(reader_stream, config.frame.clone())?;
    let writer = CommandWriter::with_config_stream(stream, config.frame.clone())?;

    let engine = Engine::from_framed(reader, writer, config)?;
    info!(%endpoint, transport = endpoint.transport_name(), "engine started");
    Ok(engine)
}
