//! One probe run, from configured address to reported measurement.

use mailprobe_common::internal;
use mailprobe_smtp::{SessionDriver, SessionRecord};
use thiserror::Error;

use crate::{
    accumulator::{Accumulator, FieldValue, Fields, SinkError, Tags},
    config::ProbeConfig,
};

/// Name of the measurement every probe run reports.
pub const MEASUREMENT: &str = "smtp";

/// Host dialed when the address leaves the host empty.
const DEFAULT_HOST: &str = "localhost";

/// Errors that stop a probe before (or after) the session itself. Network
/// trouble is never one of them; it ends up in the measurement instead.
#[derive(Debug, Error)]
pub enum GatherError {
    #[error("address {address}: missing port in address")]
    MissingPort { address: String },

    #[error("address {address}: missing ']' in address")]
    MissingBracket { address: String },

    #[error("address {address}: too many colons in address")]
    TooManyColons { address: String },

    #[error("bad port in address {address}")]
    BadPort { address: String },

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Splits `host:port`, accepting bracketed IPv6 hosts.
///
/// The host may be empty; the port must be a number.
///
/// # Errors
///
/// Returns an error describing why the address has no usable port.
pub fn split_host_port(address: &str) -> Result<(&str, &str), GatherError> {
    let (host, port) = if let Some(bracketed) = address.strip_prefix('[') {
        let (host, rest) = bracketed
            .split_once(']')
            .ok_or_else(|| GatherError::MissingBracket {
                address: address.to_string(),
            })?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| GatherError::MissingPort {
                address: address.to_string(),
            })?;
        (host, port)
    } else {
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| GatherError::MissingPort {
                address: address.to_string(),
            })?;
        if host.contains(':') {
            return Err(GatherError::TooManyColons {
                address: address.to_string(),
            });
        }
        (host, port)
    };

    if port.parse::<u16>().is_err() {
        return Err(GatherError::BadPort {
            address: address.to_string(),
        });
    }

    Ok((host, port))
}

/// Runs one probe session and reports it to `acc`.
///
/// # Errors
///
/// Returns an error if the address is unusable, in which case no connection
/// is attempted, or if the sink rejects the measurement.
pub async fn gather(
    config: &ProbeConfig,
    acc: &mut dyn Accumulator,
) -> Result<SessionRecord, GatherError> {
    let (host, port) = split_host_port(&config.address)?;

    let dial_host = if host.is_empty() { DEFAULT_HOST } else { host };
    let dial_address = if dial_host.contains(':') {
        format!("[{dial_host}]:{port}")
    } else {
        format!("{dial_host}:{port}")
    };
    internal!(level = DEBUG, "Probing {} via {}", config.address, dial_address);

    let record = SessionDriver::new(config.session(dial_address)).run().await;

    let (fields, tags) = flatten(&record, host, port);
    acc.add_fields(MEASUREMENT, fields, tags)?;

    Ok(record)
}

/// Turns a record into measurement fields and tags. The `result` tag is laid
/// over the `server` and `port` tags.
#[must_use]
pub fn flatten(record: &SessionRecord, server: &str, port: &str) -> (Fields, Tags) {
    let mut tags = Tags::from([
        ("server".to_string(), server.to_string()),
        ("port".to_string(), port.to_string()),
    ]);
    tags.extend([("result".to_string(), record.result().as_str().to_string())]);

    let mut fields = Fields::from([
        (
            "result_code".to_string(),
            FieldValue::from(record.result_code()),
        ),
        (
            "connect_time".to_string(),
            FieldValue::from(record.connect_time().as_secs_f64()),
        ),
        (
            "total_time".to_string(),
            FieldValue::from(record.total_time().as_secs_f64()),
        ),
    ]);
    fields.extend(record.codes().map(|(operation, code)| {
        (
            operation.field_name().to_string(),
            FieldValue::from(i64::from(code)),
        )
    }));

    (fields, tags)
}
