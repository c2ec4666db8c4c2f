use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Score used when nothing can be recovered from the judge output
pub const NEUTRAL_SCORE: f64 = 0.5;

/// How a verdict was recovered from judge output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictSource {
    Json,
    Regex,
    Neutral,
}

/// Sub-scores recovered from one judge response
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeVerdict {
    pub scores: BTreeMap<String, f64>,
    pub source: VerdictSource,
    pub reasoning: Option<String>,
    pub warnings: Vec<String>,
}

impl JudgeVerdict {
    /// Parse judge output. Never fails: JSON first, then per-dimension regex, then neutral.
    pub fn parse(output: &str, dimensions: &[String]) -> Self {
        debug!(output_len = output.len(), "Parsing judge verdict");

        if let Some(object) = extract_json_object(output) {
            let scores = scores_from_json(&object, dimensions);
            if !scores.is_empty() {
                let reasoning = object
                    .get("reasoning")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                return Self::with_missing_warnings(
                    scores,
                    VerdictSource::Json,
                    reasoning,
                    dimensions,
                );
            }
        }

        let scores = scores_from_regex(output, dimensions);
        if !scores.is_empty() {
            debug!("Recovered judge scores via regex fallback");
            return Self::with_missing_warnings(scores, VerdictSource::Regex, None, dimensions);
        }

        Self {
            scores: BTreeMap::new(),
            source: VerdictSource::Neutral,
            reasoning: None,
            warnings: vec![format!(
                "judge output could not be parsed; using neutral score {}",
                NEUTRAL_SCORE
            )],
        }
    }

    fn with_missing_warnings(
        scores: BTreeMap<String, f64>,
        source: VerdictSource,
        reasoning: Option<String>,
        dimensions: &[String],
    ) -> Self {
        let warnings = dimensions
            .iter()
            .filter(|d| !scores.contains_key(d.as_str()))
            .map(|d| format!("judge omitted dimension '{}'", d))
            .collect();
        Self {
            scores,
            source,
            reasoning,
            warnings,
        }
    }

    /// Mean of the recovered sub-scores, or the neutral score when none were recovered
    pub fn score(&self) -> f64 {
        if self.scores.is_empty() {
            NEUTRAL_SCORE
        } else {
            self.scores.values().sum::<f64>() / self.scores.len() as f64
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.source == VerdictSource::Neutral
    }
}

fn extract_json_object(output: &str) -> Option<serde_json::Map<String, Value>> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(output.trim()) {
        return Some(map);
    }
    // Tolerate prose or code fences around the object
    let start = output.find('{')?;
    let end = output.rfind('}')?;
    if start >= end {
        return None;
    }
    match serde_json::from_str::<Value>(&output[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn scores_from_json(
    object: &serde_json::Map<String, Value>,
    dimensions: &[String],
) -> BTreeMap<String, f64> {
    dimensions
        .iter()
        .filter_map(|dimension| {
            let value = object.get(dimension.as_str()).or_else(|| {
                object
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(dimension))
                    .map(|(_, v)| v)
            })?;
            let number = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }?;
            number
                .is_finite()
                .then(|| (dimension.clone(), number.clamp(0.0, 1.0)))
        })
        .collect()
}

fn scores_from_regex(output: &str, dimensions: &[String]) -> BTreeMap<String, f64> {
    dimensions
        .iter()
        .filter_map(|dimension| {
            let pattern = format!(
                r#"(?i)"?{}"?\s*:\s*(-?\d+(?:\.\d+)?)"#,
                regex::escape(dimension)
            );
            let re = Regex::new(&pattern).ok()?;
            let number: f64 = re.captures(output)?.get(1)?.as_str().parse().ok()?;
            Some((dimension.clone(), number.clamp(0.0, 1.0)))
        })
        .collect()
}
