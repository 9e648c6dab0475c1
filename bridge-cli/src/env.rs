use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, bail};
use bridge_core::{HostValue, Scalar};
use serde_json::Value;

/// Load a host environment from a JSON object of `name -> value`.
///
/// Values are either in the tagged `HostValue` form (`{"scalar": {"int": 1}}`)
/// or plain JSON: numbers, strings, booleans, arrays of those, and objects
/// (read as text-keyed mappings).
pub fn load(path: &Path) -> anyhow::Result<BTreeMap<String, HostValue>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let root: Value =
        serde_json::from_str(&data).with_context(|| format!("invalid JSON in {}", path.display()))?;
    let Value::Object(entries) = root else {
        bail!("{} must contain a JSON object", path.display());
    };
    entries
        .into_iter()
        .map(|(name, value)| {
            let host = from_json(&value).with_context(|| format!("variable {name}"))?;
            Ok::<_, anyhow::Error>((name, host))
        })
        .collect()
}

fn from_json(value: &Value) -> anyhow::Result<HostValue> {
    if let Ok(tagged) = serde_json::from_value::<HostValue>(value.clone()) {
        return Ok(tagged);
    }
    match value {
        Value::Array(items) => Ok(HostValue::Sequence(
            items.iter().map(from_json).collect::<anyhow::Result<_>>()?,
        )),
        Value::Object(entries) => {
            let pairs = entries
                .iter()
                .map(|(k, v)| Ok((Scalar::text(k.as_str()), scalar(v)?)))
                .collect::<anyhow::Result<_>>()?;
            Ok(HostValue::Mapping(pairs))
        }
        other => Ok(HostValue::Scalar(scalar(other)?)),
    }
}

fn scalar(value: &Value) -> anyhow::Result<Scalar> {
    match value {
        Value::Bool(b) => Ok(Scalar::Bool(*b)),
        Value::String(s) => Ok(Scalar::text(s.as_str())),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Scalar::Int(i.into()))
            } else if let Some(u) = n.as_u64() {
                Ok(Scalar::Int(u.into()))
            } else if let Some(f) = n.as_f64() {
                // The parser has already turned an oversized integer into a float.
                if f.fract() == 0.0 && f.abs() >= 2f64.powi(63) {
                    bail!(
                        "{n} is outside the 64-bit integer range; \
                         use {{\"scalar\": {{\"float\": ...}}}} for a float"
                    );
                }
                Ok(Scalar::Float(f))
            } else {
                bail!("unsupported number {n}")
            }
        }
        Value::Null => bail!("null has no C++ representation"),
        _ => bail!("nested containers are not supported"),
    }
}
