use qtalk_peer::{connect, Peer};
use serde_json::Value;
use tracing::debug;

use crate::cmd::{parse_duration, CallArgs};
use crate::exit::{peer_error, rpc_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_value, OutputFormat};

pub async fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let params = resolve_params(args.json.as_deref())?;

    match tokio::time::timeout(timeout, exchange(&args, &params, format)).await {
        Ok(result) => result,
        Err(_) => Err(CliError::new(
            TIMEOUT,
            format!("call timed out after {timeout:?}"),
        )),
    }
}

fn resolve_params(json: Option<&str>) -> CliResult<Value> {
    match json {
        Some(json) => serde_json::from_str(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}"))),
        None => Ok(Value::Null),
    }
}

async fn exchange(args: &CallArgs, params: &Value, format: OutputFormat) -> CliResult<i32> {
    let peer = connect(&args.path)
        .await
        .map_err(|err| peer_error("connect failed", err))?;
    let result = call_and_print(&peer, &args.selector, params, format).await;
    if let Err(err) = peer.close().await {
        debug!(error = %err, "close failed");
    }
    result
}

async fn call_and_print(
    peer: &Peer,
    selector: &str,
    params: &Value,
    format: OutputFormat,
) -> CliResult<i32> {
    let response = peer
        .call::<_, Value>(selector, params)
        .await
        .map_err(|err| peer_error("call failed", err))?;
    print_value(selector, 0, response.continues, &response.value, format);

    if response.continues {
        let mut index = 1;
        while let Some(value) = response
            .receive::<Value>()
            .await
            .map_err(|err| rpc_error("receive failed", err))?
        {
            print_value(selector, index, true, &value, format);
            index += 1;
        }
    }
    Ok(SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_default_to_null() {
        assert_eq!(resolve_params(None).unwrap(), Value::Null);
        assert_eq!(resolve_params(Some("[2,3]")).unwrap(), serde_json::json!([2, 3]));
    }

    #[test]
    fn invalid_json_is_a_usage_error() {
        let err = resolve_params(Some("{nope")).unwrap_err();
        assert_eq!(err.code, USAGE);
    }
}
