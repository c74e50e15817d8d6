//! Fixed-vocabulary topic tagging

/// Topic vocabulary, in the order results are reported.
pub const TOPIC_VOCABULARY: [&str; 17] = [
    "anime",
    "sports",
    "technology",
    "music",
    "movies",
    "books",
    "food",
    "travel",
    "work",
    "school",
    "family",
    "friends",
    "gaming",
    "programming",
    "art",
    "science",
    "politics",
];

pub struct TopicExtractor;

impl TopicExtractor {
    /// Every vocabulary term that occurs as a substring of the lower-cased
    /// text. Substring matching is deliberate and coarse: "party" yields "art".
    pub fn extract_topics(text: &str) -> Vec<String> {
        let text_lower = text.to_lowercase();
        TOPIC_VOCABULARY
            .iter()
            .filter(|topic| text_lower.contains(*topic))
            .map(|topic| topic.to_string())
            .collect()
    }
}
