use anyhow::{Context, Result, bail};

pub const DEFAULT_SEED: u64 = 1337;

/// Resolve CLI seed tokens into run seeds.
///
/// Accepts decimal integers (negative values use their magnitude) and
/// `0x`-prefixed hex. Duplicates are dropped, first occurrence wins.
pub fn resolve_seed_inputs(tokens: &[String]) -> Result<Vec<u64>> {
    let mut seeds: Vec<u64> = Vec::new();

    for token in tokens {
        if token.is_empty() {
            continue;
        }
        let seed = parse_seed(token)?;
        if !seeds.contains(&seed) {
            seeds.push(seed);
        }
    }

    if seeds.is_empty() {
        seeds.push(DEFAULT_SEED);
    }
    Ok(seeds)
}

fn parse_seed(token: &str) -> Result<u64> {
    if let Some(hex) = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16)
            .with_context(|| format!("invalid hex seed '{token}'"));
    }
    if let Ok(value) = token.parse::<i64>() {
        return Ok(value.unsigned_abs());
    }
    if let Ok(value) = token.parse::<u64>() {
        return Ok(value);
    }
    bail!("unrecognized seed '{token}'; use an integer or 0x-prefixed hex")
}
