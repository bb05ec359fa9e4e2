//! Sentiment label extraction from raw provider output.

use echo_types::analysis::Sentiment;

const LABELS: [(&str, Sentiment); 3] = [
    ("positive", Sentiment::Positive),
    ("negative", Sentiment::Negative),
    ("neutral", Sentiment::Neutral),
];

/// Extract a sentiment label from a raw analysis string.
///
/// A JSON object with a string `sentiment` or `label` field wins. Otherwise
/// the label whose name appears earliest in the text is chosen. Returns
/// `None` when nothing matches.
pub fn parse_sentiment(raw: &str) -> Option<Sentiment> {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(raw) {
        for field in ["sentiment", "label"] {
            if let Some(label) = map.get(field).and_then(|v| v.as_str()) {
                if let Ok(sentiment) = label.parse() {
                    return Some(sentiment);
                }
            }
        }
    }

    let lowered = raw.to_lowercase();
    LABELS
        .iter()
        .filter_map(|(name, sentiment)| lowered.find(name).map(|pos| (pos, *sentiment)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, sentiment)| sentiment)
}
