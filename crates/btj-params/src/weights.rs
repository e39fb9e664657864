use crate::error::{ParamsError, Result};

const TOKEN_SEPARATOR: char = '-';
const WEIGHT_SEPARATOR: char = '_';

// Sums this close to 1.0 are left undivided so canonical output is a fixed point.
const NORMALIZED_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct WeightedCriterion {
    pub name: String,
    pub weight: f64,
}

pub fn parse_weight_set(raw: &str) -> Result<Vec<WeightedCriterion>> {
    if raw.trim().is_empty() {
        return Err(ParamsError::malformed(raw, "empty weight set"));
    }
    let mut out = Vec::new();
    for token in raw.split(TOKEN_SEPARATOR) {
        let (name, weight_raw) = token.rsplit_once(WEIGHT_SEPARATOR).ok_or_else(|| {
            ParamsError::malformed(raw, format!("token '{}' is not name_weight", token))
        })?;
        if name.is_empty() {
            return Err(ParamsError::malformed(
                raw,
                format!("token '{}' has an empty criterion name", token),
            ));
        }
        let weight: f64 = weight_raw.parse().map_err(|_| {
            ParamsError::malformed(raw, format!("weight '{}' is not a number", weight_raw))
        })?;
        if !weight.is_finite() || weight < 0.0 {
            return Err(ParamsError::malformed(
                raw,
                format!("weight '{}' must be finite and non-negative", weight_raw),
            ));
        }
        out.push(WeightedCriterion {
            name: name.to_string(),
            weight,
        });
    }
    Ok(out)
}

pub fn canonicalize_weight_set(raw: &str) -> Result<String> {
    let mut criteria = parse_weight_set(raw)?;
    criteria.sort_by(|a, b| a.name.cmp(&b.name));
    if let Some(pair) = criteria.windows(2).find(|w| w[0].name == w[1].name) {
        return Err(ParamsError::malformed(
            raw,
            format!("criterion '{}' appears more than once", pair[0].name),
        ));
    }
    // Summed in name order so token permutations round identically.
    let sum: f64 = criteria.iter().map(|c| c.weight).sum();
    if sum <= 0.0 {
        return Err(ParamsError::malformed(raw, "weights sum to zero"));
    }
    let already_normalized = (sum - 1.0).abs() <= NORMALIZED_TOLERANCE;
    let tokens: Vec<String> = criteria
        .iter()
        .map(|c| {
            let weight = if already_normalized {
                c.weight
            } else {
                c.weight / sum
            };
            format!("{}{}{}", c.name, WEIGHT_SEPARATOR, format_weight(weight))
        })
        .collect();
    Ok(tokens.join(&TOKEN_SEPARATOR.to_string()))
}

// No exponent notation: an `e-` would read as a token separator.
fn format_weight(weight: f64) -> String {
    let text = weight.to_string();
    if text.contains('.') {
        text
    } else {
        format!("{}.0", text)
    }
}

pub fn canonicalize_weight_sets<S: AsRef<str>>(raw_sets: &[S]) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(raw_sets.len());
    for raw in raw_sets {
        let canonical = canonicalize_weight_set(raw.as_ref())?;
        if !out.contains(&canonical) {
            out.push(canonical);
        }
    }
    Ok(out)
}
