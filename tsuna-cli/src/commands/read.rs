use std::path::{Path, PathBuf};
use std::sync::Arc;

use alloy::dyn_abi::{DynSolValue, Specifier};
use alloy::json_abi::{Function, JsonAbi};
use alloy::primitives::{Address, hex};
use clap::Args;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};
use tsuna::config::load_config_from;
use tsuna::contracts::{ContractCall, ReadContractsParameters, ReadResult};

use crate::error::{CliError, Result};

/// Arguments for the read command.
#[derive(Args)]
pub struct ReadArgs {
    /// JSON file with an array of calls
    #[arg(long)]
    calls: PathBuf,

    /// Fail on the first reverted or failed call
    #[arg(long)]
    strict: bool,

    /// Chain for calls without `chainId` (defaults to the configured default)
    #[arg(long)]
    chain: Option<u64>,
}

/// One entry of the calls file.
///
/// ```json
/// {
///   "address": "0x6B175474E89094C44Da98b954EedeAC495271d0F",
///   "signature": "balanceOf(address) view returns (uint256)",
///   "args": ["0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"],
///   "chainId": 1
/// }
/// ```
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CallEntry {
    address: Address,
    signature: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    chain_id: Option<u64>,
}

impl CallEntry {
    fn into_call(self, index: usize) -> Result<ContractCall> {
        let signature = self.signature.trim();
        let signature = signature.strip_prefix("function ").unwrap_or(signature);
        let function = Function::parse(signature).map_err(|e| CliError::call(index, e.to_string()))?;
        if function.inputs.len() != self.args.len() {
            return Err(CliError::call(
                index,
                format!(
                    "{} expects {} arguments, got {}",
                    function.name,
                    function.inputs.len(),
                    self.args.len()
                ),
            ));
        }

        let args = function
            .inputs
            .iter()
            .zip(&self.args)
            .map(|(param, raw)| {
                param
                    .resolve()
                    .and_then(|ty| ty.coerce_str(raw))
                    .map_err(|e| CliError::call(index, format!("argument {}: {e}", param.name)))
            })
            .collect::<Result<Vec<_>>>()?;

        let name = function.name.clone();
        let mut abi = JsonAbi::new();
        abi.functions.entry(name.clone()).or_default().push(function);

        let call = ContractCall::new(Arc::new(abi), self.address, name).with_args(args);
        Ok(match self.chain_id {
            Some(chain_id) => call.on_chain(chain_id),
            None => call,
        })
    }
}

/// Parse a calls file into contract calls, defaulting to `chain`.
fn parse_calls(content: &str, chain: Option<u64>) -> Result<Vec<ContractCall>> {
    let entries: Vec<CallEntry> = serde_json::from_str(content)?;
    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let call = entry.into_call(index)?;
            Ok(match (call.chain_id, chain) {
                (None, Some(chain_id)) => call.on_chain(chain_id),
                _ => call,
            })
        })
        .collect()
}

/// Read every call and print one JSON result per call.
pub async fn read(args: ReadArgs, config_path: &Path) -> Result<()> {
    let config = load_config_from(config_path).await?;
    let client = config.builder()?.without_persistence().build()?;

    let content = tokio::fs::read_to_string(&args.calls)
        .await
        .map_err(|source| CliError::Io {
            path: args.calls.clone(),
            source,
        })?;
    let calls = parse_calls(&content, args.chain)?;
    debug!(calls = calls.len(), strict = args.strict, "parsed calls file");

    let mut params = ReadContractsParameters::new(calls);
    if args.strict {
        params = params.strict();
    }
    let results = client.read_contracts(params).await?;
    info!(
        succeeded = results.iter().filter(|r| matches!(r, Ok(Some(_)))).count(),
        total = results.len(),
        "read complete"
    );

    let output: Vec<Value> = results.iter().map(result_to_json).collect();
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn result_to_json(result: &ReadResult) -> Value {
    match result {
        Ok(Some(values)) => json!({
            "status": "success",
            "result": values.iter().map(value_to_json).collect::<Vec<_>>(),
        }),
        Ok(None) => json!({ "status": "failure" }),
        Err(e) => json!({ "status": "failure", "error": e.to_string() }),
    }
}

/// Render a decoded value as JSON. Integers become decimal strings.
fn value_to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::Int(i, _) => Value::String(i.to_string()),
        DynSolValue::Uint(u, _) => Value::String(u.to_string()),
        DynSolValue::Address(a) => Value::String(a.to_checksum(None)),
        DynSolValue::FixedBytes(word, size) => Value::String(hex::encode_prefixed(&word[..*size])),
        DynSolValue::Bytes(bytes) => Value::String(hex::encode_prefixed(bytes)),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(value_to_json).collect())
        }
        other => Value::String(format!("{other:?}")),
    }
}
