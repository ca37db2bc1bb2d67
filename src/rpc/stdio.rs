//! stdio transport: line-delimited JSON-RPC over stdin/stdout.
//! All diagnostic logging goes to stderr; stdout carries only protocol
//! frames.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::{dispatch, parse_request, RpcState};
use crate::pipeline::resource_manager::CancellationSignal;

pub async fn run(state: Arc<RpcState>, cancellation: CancellationSignal) -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        tokio::select! {
            _ = cancellation.cancelled() => {
                tracing::info!("stdio transport shutting down on cancellation signal");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }

                let response = match parse_request(&line) {
                    Ok(request) => dispatch(&state, request).await,
                    Err(error_response) => Some(error_response),
                };

                if let Some(response) = response {
                    let mut payload = serde_json::to_string(&response)?;
                    payload.push('\n');
                    stdout.write_all(payload.as_bytes()).await?;
                    stdout.flush().await?;
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::parse_request;

    #[test]
    fn malformed_line_yields_parse_error_with_null_id() {
        let err = parse_request("{not json").unwrap_err();
        assert_eq!(err.id, serde_json::Value::Null);
    }
}
