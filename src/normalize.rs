use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::features::FeatureStats;

const KEY_SIG_STR_LANDED: &str = "Sig. Str. Landed";
const KEY_STRIKING_ACCURACY: &str = "Striking accuracy";
const KEY_SUBMISSION_AVG: &str = "Submission avg";
const KEY_TAKEDOWN_AVG: &str = "Takedown avg";
const KEY_TAKEDOWN_ACCURACY: &str = "Takedown Accuracy";
const KEY_WINS_BY_KO: &str = "Wins by Knockout";
const KEY_WINS_BY_SUB: &str = "Wins by Submission";

/// One search candidate as returned by the stats provider. Values are kept
/// untyped; the provider mixes strings, numbers and nulls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderRecord {
    #[serde(default, rename = "Name", alias = "name")]
    pub name: Option<String>,
    #[serde(default, rename = "Records", deserialize_with = "lenient_map")]
    pub records: HashMap<String, Value>,
    #[serde(default, rename = "Win Stats", deserialize_with = "lenient_map")]
    pub win_stats: HashMap<String, Value>,
}

/// `null` or anything that is not an object reads as an empty section, so
/// one broken section does not cost the other its stats.
fn lenient_map<'de, D>(deserializer: D) -> Result<HashMap<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(map) => map.into_iter().collect(),
        _ => HashMap::new(),
    })
}

/// Maps a provider record onto the canonical schema. Anything missing or
/// unreadable becomes zero.
pub fn normalize(record: &ProviderRecord) -> FeatureStats {
    FeatureStats {
        avg_sig_str_landed: stat(&record.records, KEY_SIG_STR_LANDED),
        avg_sig_str_pct: stat(&record.records, KEY_STRIKING_ACCURACY),
        avg_sub_att: stat(&record.records, KEY_SUBMISSION_AVG),
        avg_td_landed: stat(&record.records, KEY_TAKEDOWN_AVG),
        avg_td_pct: stat(&record.records, KEY_TAKEDOWN_ACCURACY),
        wins_by_ko: count(&record.win_stats, KEY_WINS_BY_KO),
        wins_by_submission: count(&record.win_stats, KEY_WINS_BY_SUB),
    }
}

fn stat(map: &HashMap<String, Value>, key: &str) -> f64 {
    map.get(key).and_then(parse_stat_value).unwrap_or(0.0)
}

fn count(map: &HashMap<String, Value>, key: &str) -> u32 {
    let Some(v) = map.get(key).and_then(parse_stat_value) else {
        return 0;
    };
    if v >= u32::MAX as f64 {
        return u32::MAX;
    }
    v.trunc() as u32
}

/// Reads a provider value as a non-negative finite number.
pub fn parse_stat_value(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => parse_stat_str(s)?,
        _ => return None,
    };
    if n.is_finite() && n >= 0.0 { Some(n) } else { None }
}

/// `"55.3% of attempts"` -> 55.3, `"4.04"` -> 4.04, `"-"` -> None.
pub fn parse_stat_str(raw: &str) -> Option<f64> {
    let token = raw.split_whitespace().next()?;
    let token = token.trim_end_matches('%').replace(',', "");
    if token.is_empty() {
        return None;
    }
    token.parse::<f64>().ok()
}
