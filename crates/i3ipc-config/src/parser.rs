//! KDL configuration parser

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::model::*;

/// Convert byte offset to line and column (1-indexed)
fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;

    for (i, ch) in source.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }

    (line, col)
}

/// Build an `Invalid` error pointing at the node that carried the bad value
fn invalid_value(node: &kdl::KdlNode, source: &str, expected: &str) -> ConfigError {
    let (line, column) = offset_to_line_col(source, node.name().span().offset());
    ConfigError::Invalid {
        message: format!(
            "{} expects {} (line {}, column {})",
            node.name().value(),
            expected,
            line,
            column
        ),
    }
}

/// Parse a configuration file from the given path
pub fn parse_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config_str(&content)
}

/// Parse configuration from a string
pub fn parse_config_str(content: &str) -> Result<Config, ConfigError> {
    let doc: kdl::KdlDocument = content.parse().map_err(|e: kdl::KdlError| {
        // kdl reports spans with its own miette version, so rebuild ours by hand
        let span = miette::SourceSpan::from((e.span.offset(), e.span.len()));
        ConfigError::ParseError {
            src: content.to_string(),
            span,
            source: e,
        }
    })?;

    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "connection" => {
                config.connection = parse_connection(node, content)?;
            }
            name => {
                tracing::warn!("Unknown top-level node: {}", name);
            }
        }
    }

    Ok(config)
}

fn parse_connection(node: &kdl::KdlNode, source: &str) -> Result<ConnectionConfig, ConfigError> {
    let mut connection = ConnectionConfig::default();

    let Some(children) = node.children() else {
        return Ok(connection);
    };

    for child in children.nodes() {
        match child.name().value() {
            "socket-path" => {
                let raw = first_string(child).ok_or_else(|| invalid_value(child, source, "a string"))?;
                connection.socket_path = Some(expand_path(raw)?);
            }
            "connect-retries" => {
                connection.connect_retries = first_integer(child, source)?;
            }
            "retry-delay-ms" => {
                connection.retry_delay_ms = first_integer(child, source)?;
            }
            "max-retry-delay-ms" => {
                connection.max_retry_delay_ms = first_integer(child, source)?;
            }
            "max-payload-size" => {
                connection.max_payload_size = first_integer(child, source)?;
                if connection.max_payload_size == 0 {
                    return Err(invalid_value(child, source, "a size greater than zero"));
                }
            }
            name => {
                tracing::warn!("Unknown connection option: {}", name);
            }
        }
    }

    if connection.max_retry_delay_ms < connection.retry_delay_ms {
        return Err(ConfigError::Invalid {
            message: format!(
                "max-retry-delay-ms ({}) is smaller than retry-delay-ms ({})",
                connection.max_retry_delay_ms, connection.retry_delay_ms
            ),
        });
    }

    Ok(connection)
}

fn first_string(node: &kdl::KdlNode) -> Option<&str> {
    node.entries().first().and_then(|entry| entry.value().as_string())
}

/// Read the node's first argument as a non-negative integer that fits `T`
fn first_integer<T>(node: &kdl::KdlNode, source: &str) -> Result<T, ConfigError>
where
    T: TryFrom<i64>,
{
    node.entries()
        .first()
        .and_then(|entry| entry.value().as_i64())
        .filter(|value| *value >= 0)
        .and_then(|value| T::try_from(value).ok())
        .ok_or_else(|| invalid_value(node, source, "a non-negative integer"))
}

/// Expand `~` and environment variables in a configured path
fn expand_path(raw: &str) -> Result<PathBuf, ConfigError> {
    shellexpand::full(raw)
        .map(|expanded| PathBuf::from(expanded.into_owned()))
        .map_err(|e| ConfigError::Invalid {
            message: format!("socket-path {:?}: {}", raw, e),
        })
}
